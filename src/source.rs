use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;

/// キャプチャ済みフレーム 1 枚。ピクセルは 0x00RRGGBB パック。
/// クローンはピクセルバッファを共有するだけで安価
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: Arc<Vec<u32>>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(pixels: Vec<u32>, width: u32, height: u32) -> Self {
        assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            pixels: Arc::new(pixels),
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// 境界チェックなしのピクセル取得。x < width, y < height が前提
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    /// 起動時にソースが開けない。パイプラインは開始しない
    #[error("media source unavailable: {0}")]
    Unavailable(String),
}

/// フレーム供給源。キャプチャはデバイス固有レートで別スレッドが行い、
/// パイプラインは最新フレームだけを取得する (キューイングしない)
pub trait MediaSource {
    fn resolution(&self) -> (u32, u32);

    /// 新フレームが到着するたびにインクリメントされるカウンタ
    fn frame_id(&self) -> u64;

    /// 最新フレームを取得。初回フレーム到着前のみ None
    fn latest_frame(&self) -> Option<Frame>;
}

/// 最新フレーム 1 枚を保持する共有セル。書き手はキャプチャスレッド、
/// 読み手はパイプラインの 1 本のみ
pub struct FrameCell {
    latest: Arc<Mutex<Option<Frame>>>,
    frame_id: Arc<AtomicU64>,
    width: u32,
    height: u32,
}

/// FrameCell への書き込み側ハンドル
#[derive(Clone)]
pub struct FramePublisher {
    latest: Arc<Mutex<Option<Frame>>>,
    frame_id: Arc<AtomicU64>,
}

impl FrameCell {
    pub fn new(width: u32, height: u32) -> (Self, FramePublisher) {
        let latest = Arc::new(Mutex::new(None));
        let frame_id = Arc::new(AtomicU64::new(0));
        let publisher = FramePublisher {
            latest: Arc::clone(&latest),
            frame_id: Arc::clone(&frame_id),
        };
        (
            Self {
                latest,
                frame_id,
                width,
                height,
            },
            publisher,
        )
    }
}

impl FramePublisher {
    /// 最新フレームを差し替える。前のフレームは破棄される
    pub fn publish(&self, frame: Frame) {
        *self.latest.lock().unwrap() = Some(frame);
        self.frame_id.fetch_add(1, Ordering::Release);
    }
}

impl MediaSource for FrameCell {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.latest.lock().unwrap().clone()
    }
}

/// カメラ未接続環境向けのテストパターン供給源。
/// 動くグラデーションをデバイスレートで生成し続ける
pub struct TestPatternSource {
    cell: FrameCell,
}

impl TestPatternSource {
    pub fn start(width: u32, height: u32, fps: u32) -> Result<Self, MediaError> {
        if width == 0 || height == 0 {
            return Err(MediaError::Unavailable(format!(
                "invalid capture size {width}x{height}"
            )));
        }

        let (cell, publisher) = FrameCell::new(width, height);
        let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);

        thread::spawn(move || {
            let mut t: u32 = 0;
            loop {
                publisher.publish(test_pattern(width, height, t));
                t = t.wrapping_add(1);
                thread::sleep(interval);
            }
        });

        Ok(Self { cell })
    }
}

impl MediaSource for TestPatternSource {
    fn resolution(&self) -> (u32, u32) {
        self.cell.resolution()
    }

    fn frame_id(&self) -> u64 {
        self.cell.frame_id()
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.cell.latest_frame()
    }
}

/// 位相 t で流れる斜めグラデーションを生成する
fn test_pattern(width: u32, height: u32, t: u32) -> Frame {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x + t) % 256) as u32;
            let g = ((y + t) % 256) as u32;
            let b = ((x + y) % 256) as u32;
            pixels.push((r << 16) | (g << 8) | b);
        }
    }
    Frame::new(pixels, width, height)
}
