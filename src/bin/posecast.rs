//! posecast: captures live frames, runs pose estimation on each one, draws
//! the skeleton overlay, and streams per-frame results to a downstream
//! consumer over a persistent TCP connection.
//!
//! Tunables are adjusted at runtime through stdin commands (type `help`).

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use posecast::config::{AppSettings, ConfigStore, Rgb};
use posecast::estimator::onnx::OnnxLoader;
use posecast::estimator::{OutputStride, Variant};
use posecast::pipeline::{FramePipeline, TickReport};
use posecast::source::TestPatternSource;
use posecast::stream::StreamSink;

const SETTINGS_PATH: &str = "posecast.toml";

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

type LogFile = Arc<Mutex<std::io::BufWriter<std::fs::File>>>;

fn open_log_file() -> Result<LogFile> {
    std::fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/posecast_{}.log", ts);
    let file = std::fs::File::create(&path)?;
    eprintln!("Log: {}", path);
    Ok(Arc::new(Mutex::new(std::io::BufWriter::new(file))))
}

macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
            let _ = f.flush();
        }
    }};
}

// ---------------------------------------------------------------------------
// Stdin control panel
// ---------------------------------------------------------------------------

const PANEL_HELP: &str = "\
commands:
  variant 0.50|0.75|1.00|1.01   switch model variant (applied next tick)
  stride 8|16|32                output stride
  scale <0.2-1.0>               image scale factor
  active on|off                 pause/resume detection
  maxposes <n>                  max detected poses per frame
  minpose <0.0-1.0>             pose score threshold
  minpart <0.0-1.0>             keypoint score threshold
  radius <px>                   pose suppression radius
  frame|skeleton|points on|off  overlay toggles
  color #RRGGBB                 overlay color
  width <px>                    skeleton line width
  help                          show this list
  q                             quit";

fn parse_toggle(s: &str) -> Option<bool> {
    match s {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Apply one panel command to the shared configuration. Returns the feedback
/// line printed to the operator, or None for unknown input.
fn apply_command(config: &ConfigStore, parts: &[&str]) -> Option<String> {
    match parts {
        ["variant", v] => {
            let variant = Variant::parse(v)?;
            config.request_variant_change(variant);
            Some(format!("variant change to {variant} requested"))
        }
        ["stride", s] => {
            let stride = s.parse().ok().and_then(OutputStride::from_stride)?;
            config.update(|c| c.input.output_stride = stride);
            Some(format!("output stride = {}", stride.as_u32()))
        }
        ["scale", s] => {
            let scale: f32 = s.parse().ok()?;
            if !(0.0..=1.0).contains(&scale) || scale == 0.0 {
                return None;
            }
            config.update(|c| c.input.image_scale_factor = scale);
            Some(format!("image scale factor = {scale}"))
        }
        ["active", s] => {
            let active = parse_toggle(s)?;
            config.update(|c| c.detection.active = active);
            Some(format!("detection active = {active}"))
        }
        ["maxposes", s] => {
            let n: u32 = s.parse().ok()?;
            if n == 0 {
                return None;
            }
            config.update(|c| c.detection.max_poses = n);
            Some(format!("max poses = {n}"))
        }
        ["minpose", s] => {
            let v: f32 = s.parse().ok()?;
            if !(0.0..=1.0).contains(&v) {
                return None;
            }
            config.update(|c| c.detection.min_pose_score = v);
            Some(format!("min pose score = {v}"))
        }
        ["minpart", s] => {
            let v: f32 = s.parse().ok()?;
            if !(0.0..=1.0).contains(&v) {
                return None;
            }
            config.update(|c| c.detection.min_part_score = v);
            Some(format!("min part score = {v}"))
        }
        ["radius", s] => {
            let v: f32 = s.parse().ok()?;
            if v < 0.0 {
                return None;
            }
            config.update(|c| c.detection.suppression_radius = v);
            Some(format!("suppression radius = {v}"))
        }
        ["frame", s] => {
            let on = parse_toggle(s)?;
            config.update(|c| c.display.show_frame = on);
            Some(format!("show frame = {on}"))
        }
        ["skeleton", s] => {
            let on = parse_toggle(s)?;
            config.update(|c| c.display.show_skeleton = on);
            Some(format!("show skeleton = {on}"))
        }
        ["points", s] => {
            let on = parse_toggle(s)?;
            config.update(|c| c.display.show_points = on);
            Some(format!("show points = {on}"))
        }
        ["color", s] => {
            let color = Rgb::from_hex(s)?;
            config.update(|c| c.display.color = color);
            Some(format!("overlay color = {}", color.to_hex()))
        }
        ["width", s] => {
            let v: f32 = s.parse().ok()?;
            if v <= 0.0 {
                return None;
            }
            config.update(|c| c.display.line_width = v);
            Some(format!("line width = {v}"))
        }
        _ => None,
    }
}

fn spawn_panel_thread(config: ConfigStore, shutdown: Arc<AtomicBool>, logfile: LogFile) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            if stdin.read_line(&mut line).is_err() {
                break;
            }
            let parts: Vec<&str> = line.trim().split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            match parts[0] {
                "q" | "quit" => {
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                "help" => eprintln!("{PANEL_HELP}"),
                _ => match apply_command(&config, &parts) {
                    Some(feedback) => log!(logfile, "[panel] {}", feedback),
                    None => eprintln!("[panel] unknown command: {}", line.trim()),
                },
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let settings = AppSettings::load_or_default(SETTINGS_PATH);
    let logfile = open_log_file()?;
    log!(logfile, "posecast ({})", env!("GIT_VERSION"));
    log!(
        logfile,
        "[config] stream_addr={}, tick_rate={}Hz, capture={}x{}, model_dir={}",
        settings.stream_addr,
        settings.tick_rate,
        settings.capture_width,
        settings.capture_height,
        settings.model_dir
    );

    // Media source is the only fatal startup error besides the initial
    // model load: without frames the pipeline never starts.
    let source = TestPatternSource::start(
        settings.capture_width,
        settings.capture_height,
        settings.tick_rate,
    )
    .context("media source unavailable")?;

    let stream = match StreamSink::connect(&settings.stream_addr).await {
        Ok(sink) => {
            log!(logfile, "[stream] connected to {}", settings.stream_addr);
            sink
        }
        Err(e) => {
            log!(
                logfile,
                "[stream] connect to {} failed ({e}), telemetry disabled",
                settings.stream_addr
            );
            StreamSink::disconnected()
        }
    };

    let config = ConfigStore::new(settings.tuning.clone());
    let loader = OnnxLoader::new(&settings.model_dir);
    let mut pipeline = FramePipeline::new(config.clone(), source, loader, stream)
        .await
        .context("initial model load failed")?;
    log!(
        logfile,
        "[model] loaded variant {}",
        settings.tuning.input.variant
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

    spawn_panel_thread(config, Arc::clone(&shutdown), logfile.clone());
    eprintln!("{PANEL_HELP}");

    // Tick loop: one tick fully completes (including the awaited inference)
    // before the next is scheduled.
    let period = Duration::from_secs_f64(1.0 / settings.tick_rate.max(1) as f64);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut ticks = 0u32;
    let mut dispatched = 0u32;
    let mut poses_kept = 0usize;
    let mut stats_timer = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        interval.tick().await;

        match pipeline.tick().await {
            TickReport::Reconfigured { variant } => {
                log!(logfile, "[model] switched to variant {}", variant);
            }
            TickReport::ReconfigureFailed { variant } => {
                log!(
                    logfile,
                    "[model] switch to variant {} failed, keeping previous model",
                    variant
                );
            }
            TickReport::Dispatched { kept, .. } => {
                dispatched += 1;
                poses_kept += kept;
            }
            TickReport::DetectionInactive | TickReport::NoFrame | TickReport::EstimateFailed => {}
        }

        ticks += 1;
        if stats_timer.elapsed() >= Duration::from_secs(1) {
            log!(
                logfile,
                "[fps] {} ticks, {} dispatched, {} poses",
                ticks,
                dispatched,
                poses_kept
            );
            ticks = 0;
            dispatched = 0;
            poses_kept = 0;
            stats_timer = Instant::now();
        }
    }

    log!(logfile, "Shutting down...");
    Ok(())
}
