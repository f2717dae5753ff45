use crate::config::Configuration;
use crate::pose::{adjacent_keypoints, Pose};
use crate::source::Frame;

/// キーポイントの描画半径 (ピクセル)
const KEYPOINT_RADIUS: i32 = 4;

/// 描画先フレームバッファ (0x00RRGGBB)
pub struct Canvas {
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            buffer: vec![0u32; width * height],
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }

    /// フレームを左右反転してコピーする (フロントカメラのミラー表示)。
    /// サイズが異なる場合は重なる範囲のみ
    pub fn blit_mirrored(&mut self, frame: &Frame) {
        let fw = frame.width() as usize;
        let fh = frame.height() as usize;

        for y in 0..self.height.min(fh) {
            for x in 0..self.width.min(fw) {
                let src_x = (fw - 1 - x) as u32;
                self.buffer[y * self.width + x] = frame.pixel(src_x, y as u32);
            }
        }
    }

    /// ピクセルをセット（境界チェック付き）
    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }

    /// 円を描画（塗りつぶし）
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Bresenhamのアルゴリズムで線を描画。line_width > 1 は各点に円をスタンプ
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, line_width: f32, color: u32) {
        let radius = ((line_width / 2.0).round() as i32).max(0);

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            if radius == 0 {
                self.set_pixel(x, y, color);
            } else {
                self.draw_circle(x, y, radius, color);
            }

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

/// 姿勢オーバーレイの描画シンク
pub struct RenderSink {
    canvas: Canvas,
}

impl RenderSink {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Canvas::new(width as usize, height as usize),
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// フィルタ済み姿勢を現在のフレームに重ねて描画する。
    /// 同じ入力に対して常に同じ出力 (呼び出し間で状態を持たない)
    pub fn draw(&mut self, frame: Option<&Frame>, poses: &[Pose], config: &Configuration) {
        self.canvas.clear();

        if config.display.show_frame {
            if let Some(frame) = frame {
                self.canvas.blit_mirrored(frame);
            }
        }

        let color = config.display.color.packed();
        let min_part_score = config.detection.min_part_score;

        for pose in poses {
            if config.display.show_points {
                for kp in pose.keypoints.iter().filter(|k| k.is_valid(min_part_score)) {
                    self.canvas.draw_circle(
                        kp.position.x as i32,
                        kp.position.y as i32,
                        KEYPOINT_RADIUS,
                        color,
                    );
                }
            }

            if config.display.show_skeleton {
                for (a, b) in adjacent_keypoints(pose, min_part_score) {
                    self.canvas.draw_line(
                        a.position.x as i32,
                        a.position.y as i32,
                        b.position.x as i32,
                        b.position.y as i32,
                        config.display.line_width,
                        color,
                    );
                }
            }
        }
    }
}
