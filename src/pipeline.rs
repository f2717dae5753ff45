//! The real-time frame pipeline: one tick of work at a time, driven by an
//! external timer. Each tick walks capture → reconfigure-check → estimate →
//! filter → fan-out, and no new tick starts before the previous one settled.

use crate::config::ConfigStore;
use crate::estimator::{
    EstimateParams, Estimator, EstimatorLoader, EstimatorSlot, LoadError, Variant,
};
use crate::pose::Pose;
use crate::render::RenderSink;
use crate::source::MediaSource;
use crate::stream::{self, StreamSink};

/// What a single tick did. One report per tick; the driver's log line and the
/// tests' observation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    /// The tick was spent swapping the model variant.
    Reconfigured { variant: Variant },
    /// The swap failed; the previous model stays installed.
    ReconfigureFailed { variant: Variant },
    /// Detection is switched off; only the raw frame was drawn (if enabled).
    DetectionInactive,
    /// No frame has arrived yet.
    NoFrame,
    /// Inference failed; the tick was abandoned without drawing or sending.
    EstimateFailed,
    /// Full cycle: estimated, filtered, dispatched to both sinks.
    Dispatched { detected: usize, kept: usize },
}

/// Keep exactly the poses whose score clears the threshold. Membership is
/// decided by the predicate alone.
pub fn filter_poses(poses: Vec<Pose>, min_pose_score: f32) -> Vec<Pose> {
    poses
        .into_iter()
        .filter(|p| p.score >= min_pose_score)
        .collect()
}

pub struct FramePipeline<S, L: EstimatorLoader> {
    config: ConfigStore,
    source: S,
    loader: L,
    slot: EstimatorSlot<L::Handle>,
    render: RenderSink,
    stream: StreamSink,
}

impl<S: MediaSource, L: EstimatorLoader> FramePipeline<S, L> {
    /// Load the configured variant and assemble the pipeline. A failed
    /// initial load is fatal: there is no previous model to fall back to.
    pub async fn new(
        config: ConfigStore,
        source: S,
        loader: L,
        stream: StreamSink,
    ) -> Result<Self, LoadError> {
        let variant = config.snapshot().input.variant;
        let handle = loader.load_variant(variant).await?;
        let (width, height) = source.resolution();

        Ok(Self {
            config,
            source,
            loader,
            slot: EstimatorSlot::new(handle),
            render: RenderSink::new(width, height),
            stream,
        })
    }

    pub fn render_sink(&self) -> &RenderSink {
        &self.render
    }

    /// Run one tick. The caller (timer/vsync driver) must not invoke this
    /// again before the returned future completes.
    pub async fn tick(&mut self) -> TickReport {
        // A pending variant change consumes the whole tick: no frame is
        // captured or processed while the swap is in flight.
        if let Some(variant) = self.config.snapshot().pending_variant_change {
            let report = match self.loader.load_variant(variant).await {
                Ok(new) => {
                    // The old handle is released only after the new one is
                    // confirmed loaded and installed.
                    let old = self.slot.replace(new);
                    drop(old);
                    TickReport::Reconfigured { variant }
                }
                Err(e) => {
                    eprintln!("[pipeline] variant load failed ({variant}): {e}");
                    TickReport::ReconfigureFailed { variant }
                }
            };
            // Cleared on failure too; a rejected variant is not retried.
            self.config.clear_pending_change();
            return report;
        }

        let config = self.config.snapshot();

        if !config.detection.active {
            // Detection paused: keep showing the live video.
            if config.display.show_frame {
                let frame = self.source.latest_frame();
                self.render.draw(frame.as_ref(), &[], &config);
            }
            return TickReport::DetectionInactive;
        }

        let Some(frame) = self.source.latest_frame() else {
            return TickReport::NoFrame;
        };

        let params = EstimateParams::from_config(&config);
        let poses = match self.slot.get_mut().estimate(&frame, &params).await {
            Ok(poses) => poses,
            Err(e) => {
                eprintln!("[pipeline] estimation failed: {e}");
                return TickReport::EstimateFailed;
            }
        };

        let detected = poses.len();
        let kept = filter_poses(poses, config.detection.min_pose_score);

        // Both sinks receive the same filtered sequence; neither failure
        // reaches the other.
        self.render.draw(Some(&frame), &kept, &config);
        self.stream
            .send(&kept, (frame.width(), frame.height()), stream::timestamp_ms())
            .await;

        TickReport::Dispatched {
            detected,
            kept: kept.len(),
        }
    }
}
