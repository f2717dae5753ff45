//! Live overlay viewer: drives the frame pipeline and presents the render
//! canvas in a window. Local debugging aid; telemetry stays disconnected.

use anyhow::Result;
use minifb::{Key, Window, WindowOptions};
use std::time::{Duration, Instant};

use posecast::config::{AppSettings, ConfigStore};
use posecast::estimator::onnx::OnnxLoader;
use posecast::pipeline::{FramePipeline, TickReport};
use posecast::source::TestPatternSource;
use posecast::stream::StreamSink;

const SETTINGS_PATH: &str = "posecast.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let settings = AppSettings::load_or_default(SETTINGS_PATH);

    println!("posecast viewer");
    println!("Press ESC to exit");

    let source = TestPatternSource::start(
        settings.capture_width,
        settings.capture_height,
        settings.tick_rate,
    )?;

    let config = ConfigStore::new(settings.tuning.clone());
    let loader = OnnxLoader::new(&settings.model_dir);
    let mut pipeline =
        FramePipeline::new(config, source, loader, StreamSink::disconnected()).await?;
    println!("Model loaded");

    let width = settings.capture_width as usize;
    let height = settings.capture_height as usize;
    let mut window = Window::new(
        "posecast viewer",
        width,
        height,
        WindowOptions {
            resize: false,
            ..WindowOptions::default()
        },
    )?;

    let period = Duration::from_secs_f64(1.0 / settings.tick_rate.max(1) as f64);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut frame_count = 0u32;
    let mut fps_timer = Instant::now();

    while window.is_open() && !window.is_key_down(Key::Escape) {
        interval.tick().await;

        let report = pipeline.tick().await;
        if let TickReport::ReconfigureFailed { variant } = report {
            eprintln!("variant switch to {variant} failed, keeping previous model");
        }

        window.update_with_buffer(pipeline.render_sink().canvas().buffer(), width, height)?;

        frame_count += 1;
        let elapsed = fps_timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            println!("FPS: {:.1}", frame_count as f32 / elapsed);
            frame_count = 0;
            fps_timer = Instant::now();
        }
    }

    println!("Shutting down...");
    Ok(())
}
