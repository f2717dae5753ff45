//! Pose estimator adapter: model variants, the loading/inference traits the
//! pipeline drives, and the owned slot holding the single active estimator.

#[cfg(feature = "onnx")]
pub mod onnx;

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Configuration;
use crate::pose::{Point, Pose};
use crate::source::Frame;

/// PoseNet model variant (MobileNet width multiplier). 1.01 is the largest
/// and slowest, 0.50 the fastest and least accurate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    #[serde(rename = "0.50")]
    V050,
    #[serde(rename = "0.75")]
    V075,
    #[serde(rename = "1.00")]
    V100,
    #[serde(rename = "1.01")]
    V101,
}

impl Variant {
    pub const ALL: [Variant; 4] = [Variant::V050, Variant::V075, Variant::V100, Variant::V101];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::V050 => "0.50",
            Variant::V075 => "0.75",
            Variant::V100 => "1.00",
            Variant::V101 => "1.01",
        }
    }

    /// Parse the control-panel spelling ("0.50", "0.75", "1.00", "1.01").
    pub fn parse(s: &str) -> Option<Self> {
        Variant::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output stride of the network. Lower is more accurate but slower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[repr(u32)]
pub enum OutputStride {
    S8 = 8,
    S16 = 16,
    S32 = 32,
}

impl OutputStride {
    pub fn from_stride(stride: u32) -> Option<Self> {
        match stride {
            8 => Some(OutputStride::S8),
            16 => Some(OutputStride::S16),
            32 => Some(OutputStride::S32),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> u32 {
        *self as u32
    }
}

impl TryFrom<u32> for OutputStride {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        OutputStride::from_stride(value).ok_or_else(|| format!("invalid output stride: {value}"))
    }
}

impl From<OutputStride> for u32 {
    fn from(stride: OutputStride) -> u32 {
        stride.as_u32()
    }
}

/// Everything one `estimate` call needs, snapshotted from the configuration
/// at the start of the tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateParams {
    pub output_stride: OutputStride,
    pub image_scale_factor: f32,
    /// Frames come from a front-facing camera, so estimation runs on the
    /// mirrored image and keypoints land in mirrored coordinates.
    pub flip_horizontal: bool,
    pub max_poses: u32,
    pub min_part_score: f32,
    pub suppression_radius: f32,
}

impl EstimateParams {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            output_stride: config.input.output_stride,
            image_scale_factor: config.input.image_scale_factor,
            flip_horizontal: true,
            max_poses: config.detection.max_poses,
            min_part_score: config.detection.min_part_score,
            suppression_radius: config.detection.suppression_radius,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("backend rejected model: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("inference failed: {0}")]
    Inference(String),
}

/// One loaded model. Resources are owned by the handle and released on drop,
/// exactly once.
pub trait Estimator {
    /// Estimate poses for one frame. Never called while a previous call on
    /// the same handle is outstanding (the pipeline serializes ticks).
    async fn estimate(
        &mut self,
        frame: &Frame,
        params: &EstimateParams,
    ) -> Result<Vec<Pose>, EstimationError>;
}

/// Loads model variants. Loading fetches and compiles weights and can take
/// substantial wall-clock time; on failure the caller keeps its previous
/// handle.
pub trait EstimatorLoader {
    type Handle: Estimator;

    async fn load_variant(&self, variant: Variant) -> Result<Self::Handle, LoadError>;
}

/// Owned slot for the single active estimator. A new handle is only installed
/// once its load has completed; the displaced handle is returned so the
/// caller drops it after the swap.
pub struct EstimatorSlot<E> {
    current: E,
}

impl<E> EstimatorSlot<E> {
    pub fn new(estimator: E) -> Self {
        Self { current: estimator }
    }

    /// Install a loaded handle, returning the old one for disposal.
    pub fn replace(&mut self, new: E) -> E {
        std::mem::replace(&mut self.current, new)
    }

    pub fn get_mut(&mut self) -> &mut E {
        &mut self.current
    }
}

/// Rank candidate poses by score and greedily keep up to `max_poses`,
/// suppressing candidates whose center falls within `suppression_radius`
/// of an already kept pose.
pub fn select_poses(mut candidates: Vec<Pose>, params: &EstimateParams) -> Vec<Pose> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let max = params.max_poses.max(1) as usize;
    let radius_sq = params.suppression_radius * params.suppression_radius;
    let mut kept: Vec<Pose> = Vec::new();
    let mut centers: Vec<Point> = Vec::new();

    for pose in candidates {
        if kept.len() >= max {
            break;
        }
        let center = pose_center(&pose, params.min_part_score);
        let suppressed = centers.iter().any(|c| {
            let dx = c.x - center.x;
            let dy = c.y - center.y;
            dx * dx + dy * dy < radius_sq
        });
        if !suppressed {
            centers.push(center);
            kept.push(pose);
        }
    }

    kept
}

/// Mean position of the keypoints above `min_part_score`; falls back to the
/// mean over all keypoints when none qualify.
fn pose_center(pose: &Pose, min_part_score: f32) -> Point {
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut n = 0usize;
    for kp in pose.keypoints.iter().filter(|k| k.is_valid(min_part_score)) {
        sum_x += kp.position.x;
        sum_y += kp.position.y;
        n += 1;
    }
    if n == 0 {
        for kp in &pose.keypoints {
            sum_x += kp.position.x;
            sum_y += kp.position.y;
        }
        n = pose.keypoints.len();
    }
    Point {
        x: sum_x / n as f32,
        y: sum_y / n as f32,
    }
}
