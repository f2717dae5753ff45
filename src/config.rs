use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::estimator::{OutputStride, Variant};

/// 描画色 (8bit RGB)。設定ファイルとコントロールパネルでは "#RRGGBB" 表記
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// "#RRGGBB" をパースする
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// フレームバッファ用に 0x00RRGGBB へパック
    pub fn packed(&self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Rgb::from_hex(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid color: {s}")))
    }
}

/// 推論入力のパラメータ。精度と速度への影響が最も大きい
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// モデルバリアント ("0.50" | "0.75" | "1.00" | "1.01")
    #[serde(default = "default_variant")]
    pub variant: Variant,
    /// 出力ストライド (8 | 16 | 32)
    #[serde(default = "default_output_stride")]
    pub output_stride: OutputStride,
    /// 推論前に画像へかける縮小率 (0.0〜1.0]
    #[serde(default = "default_image_scale_factor")]
    pub image_scale_factor: f32,
}

fn default_variant() -> Variant {
    Variant::V075
}
fn default_output_stride() -> OutputStride {
    OutputStride::S16
}
fn default_image_scale_factor() -> f32 {
    0.5
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            output_stride: default_output_stride(),
            image_scale_factor: default_image_scale_factor(),
        }
    }
}

/// 検出パラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// false の間は推論・配信を行わない (映像表示は継続)
    #[serde(default = "default_active")]
    pub active: bool,
    /// 1 フレームあたりの最大検出人数
    #[serde(default = "default_max_poses")]
    pub max_poses: u32,
    /// 姿勢全体のスコア閾値
    #[serde(default = "default_min_pose_score")]
    pub min_pose_score: f32,
    /// キーポイント単位のスコア閾値 (描画・消費側で適用)
    #[serde(default = "default_min_part_score")]
    pub min_part_score: f32,
    /// 近接姿勢の抑制半径 (ピクセル)
    #[serde(default = "default_suppression_radius")]
    pub suppression_radius: f32,
}

fn default_active() -> bool {
    true
}
fn default_max_poses() -> u32 {
    5
}
fn default_min_pose_score() -> f32 {
    0.15
}
fn default_min_part_score() -> f32 {
    0.1
}
fn default_suppression_radius() -> f32 {
    30.0
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            active: default_active(),
            max_poses: default_max_poses(),
            min_pose_score: default_min_pose_score(),
            min_part_score: default_min_part_score(),
            suppression_radius: default_suppression_radius(),
        }
    }
}

/// オーバーレイ表示のパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_show_frame")]
    pub show_frame: bool,
    #[serde(default = "default_show_skeleton")]
    pub show_skeleton: bool,
    #[serde(default = "default_show_points")]
    pub show_points: bool,
    #[serde(default = "default_color")]
    pub color: Rgb,
    #[serde(default = "default_line_width")]
    pub line_width: f32,
}

fn default_show_frame() -> bool {
    true
}
fn default_show_skeleton() -> bool {
    true
}
fn default_show_points() -> bool {
    true
}
fn default_color() -> Rgb {
    Rgb::new(0x00, 0xFF, 0xFF)
}
fn default_line_width() -> f32 {
    5.0
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_frame: default_show_frame(),
            show_skeleton: default_show_skeleton(),
            show_points: default_show_points(),
            color: default_color(),
            line_width: default_line_width(),
        }
    }
}

/// ライブ調整可能な設定一式。パイプラインは tick ごとにスナップショットを読む
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    /// 次 tick で切り替えるバリアント。設定ファイルには現れない
    #[serde(skip)]
    pub pending_variant_change: Option<Variant>,
}

/// コントロールパネル (書き手 1) とパイプライン (読み手 1) が共有する設定ストア
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<Mutex<Configuration>>,
}

impl ConfigStore {
    pub fn new(config: Configuration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(config)),
        }
    }

    /// 現在値のスナップショット
    pub fn snapshot(&self) -> Configuration {
        self.inner.lock().unwrap().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut Configuration)) {
        let mut guard = self.inner.lock().unwrap();
        f(&mut guard);
    }

    /// モデルバリアントの切り替えを要求する。実際の入れ替えは次 tick
    pub fn request_variant_change(&self, variant: Variant) {
        self.update(|c| c.pending_variant_change = Some(variant));
    }

    pub fn clear_pending_change(&self) {
        self.update(|c| c.pending_variant_change = None);
    }
}

/// アプリ設定 (posecast.toml)。起動時に 1 度だけ読む
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    /// 姿勢データの送出先
    #[serde(default = "default_stream_addr")]
    pub stream_addr: String,
    /// tick レート (Hz)。ディスプレイの垂直同期の代替
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
    #[serde(default = "default_capture_width")]
    pub capture_width: u32,
    #[serde(default = "default_capture_height")]
    pub capture_height: u32,
    /// ONNX モデルファイルの置き場所
    #[serde(default = "default_model_dir")]
    pub model_dir: String,
    /// 起動時の調整値
    #[serde(default)]
    pub tuning: Configuration,
}

fn default_stream_addr() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_tick_rate() -> u32 {
    30
}
fn default_capture_width() -> u32 {
    640
}
fn default_capture_height() -> u32 {
    480
}
fn default_model_dir() -> String {
    "models".to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            stream_addr: default_stream_addr(),
            tick_rate: default_tick_rate(),
            capture_width: default_capture_width(),
            capture_height: default_capture_height(),
            model_dir: default_model_dir(),
            tuning: Configuration::default(),
        }
    }
}

impl AppSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: AppSettings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// 読めない場合は警告してデフォルトを返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!(
                    "[config] {} を読めないためデフォルトを使用: {e}",
                    path.as_ref().display()
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_panel() {
        let config = Configuration::default();
        assert_eq!(config.input.variant, Variant::V075);
        assert_eq!(config.input.output_stride, OutputStride::S16);
        assert_eq!(config.input.image_scale_factor, 0.5);
        assert!(config.detection.active);
        assert_eq!(config.detection.max_poses, 5);
        assert_eq!(config.detection.min_pose_score, 0.15);
        assert_eq!(config.detection.min_part_score, 0.1);
        assert_eq!(config.detection.suppression_radius, 30.0);
        assert!(config.display.show_frame);
        assert!(config.display.show_skeleton);
        assert!(config.display.show_points);
        assert_eq!(config.display.color, Rgb::new(0x00, 0xFF, 0xFF));
        assert_eq!(config.display.line_width, 5.0);
        assert!(config.pending_variant_change.is_none());
    }

    #[test]
    fn test_rgb_hex_round_trip() {
        let color = Rgb::from_hex("#00ffee").unwrap();
        assert_eq!(color, Rgb::new(0x00, 0xFF, 0xEE));
        assert_eq!(color.to_hex(), "#00FFEE");
        assert_eq!(Rgb::from_hex("00FFEE"), None);
        assert_eq!(Rgb::from_hex("#00FFE"), None);
        assert_eq!(Rgb::from_hex("#00FFGG"), None);
    }

    #[test]
    fn test_rgb_packed() {
        assert_eq!(Rgb::new(0xAA, 0xBB, 0xCC).packed(), 0x00AABBCC);
    }

    #[test]
    fn test_store_snapshot_is_isolated() {
        let store = ConfigStore::new(Configuration::default());
        let mut snapshot = store.snapshot();
        snapshot.detection.max_poses = 99;
        assert_eq!(store.snapshot().detection.max_poses, 5);
    }

    #[test]
    fn test_store_pending_change_lifecycle() {
        let store = ConfigStore::new(Configuration::default());
        store.request_variant_change(Variant::V050);
        store.request_variant_change(Variant::V101);
        assert_eq!(
            store.snapshot().pending_variant_change,
            Some(Variant::V101)
        );
        store.clear_pending_change();
        assert!(store.snapshot().pending_variant_change.is_none());
    }

    #[test]
    fn test_settings_partial_toml() {
        let settings: AppSettings = toml::from_str(
            r##"
            stream_addr = "10.0.0.5:9000"

            [tuning.input]
            variant = "0.50"
            output_stride = 32

            [tuning.display]
            color = "#FF0000"
            "##,
        )
        .unwrap();
        assert_eq!(settings.stream_addr, "10.0.0.5:9000");
        assert_eq!(settings.tick_rate, 30);
        assert_eq!(settings.tuning.input.variant, Variant::V050);
        assert_eq!(settings.tuning.input.output_stride, OutputStride::S32);
        assert_eq!(settings.tuning.input.image_scale_factor, 0.5);
        assert_eq!(settings.tuning.display.color, Rgb::new(0xFF, 0x00, 0x00));
        assert_eq!(settings.tuning.detection.max_poses, 5);
    }
}
