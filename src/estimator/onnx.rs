use std::path::PathBuf;

use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::{
    select_poses, EstimateParams, EstimationError, Estimator, EstimatorLoader, LoadError, Variant,
};
use crate::pose::{Keypoint, Part, Pose};
use crate::source::Frame;

impl From<ort::Error> for LoadError {
    fn from(e: ort::Error) -> Self {
        LoadError::Backend(e.to_string())
    }
}

impl From<ort::Error> for EstimationError {
    fn from(e: ort::Error) -> Self {
        EstimationError::Inference(e.to_string())
    }
}

/// バリアントごとの ONNX モデルファイル名。
/// モデルは入力 "input" ([1, H, W, 3] f32)、出力 "output"
/// ([1, P, 17, 3] = 候補ごとの y, x, confidence) でエクスポートされている前提
fn model_file(variant: Variant) -> &'static str {
    match variant {
        Variant::V050 => "posenet_mobilenet_050.onnx",
        Variant::V075 => "posenet_mobilenet_075.onnx",
        Variant::V100 => "posenet_mobilenet_100.onnx",
        Variant::V101 => "posenet_mobilenet_101.onnx",
    }
}

/// モデルディレクトリからバリアントを読み込むローダー
pub struct OnnxLoader {
    model_dir: PathBuf,
}

impl OnnxLoader {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }
}

impl EstimatorLoader for OnnxLoader {
    type Handle = OnnxEstimator;

    async fn load_variant(&self, variant: Variant) -> Result<OnnxEstimator, LoadError> {
        let path = self.model_dir.join(model_file(variant));
        if !path.exists() {
            return Err(LoadError::ModelNotFound(path.display().to_string()));
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&path)?;

        Ok(OnnxEstimator { session })
    }
}

/// ONNX Runtime による姿勢推定器。セッションがモデル資源を所有し、
/// drop で解放される
pub struct OnnxEstimator {
    session: Session,
}

impl Estimator for OnnxEstimator {
    async fn estimate(
        &mut self,
        frame: &Frame,
        params: &EstimateParams,
    ) -> Result<Vec<Pose>, EstimationError> {
        let input = preprocess(frame, params);
        let input_tensor = Tensor::from_array(input)?;

        let outputs = self.session.run(ort::inputs!["input" => input_tensor])?;
        let output: ndarray::ArrayViewD<f32> = outputs["output"].try_extract_array()?;

        let shape = output.shape();
        if shape.len() != 4 || shape[2] != Part::COUNT || shape[3] != 3 {
            return Err(EstimationError::Inference(format!(
                "unexpected output shape: {shape:?}"
            )));
        }

        let width = frame.width() as f32;
        let height = frame.height() as f32;
        let mut candidates = Vec::with_capacity(shape[1]);

        for p in 0..shape[1] {
            let mut keypoints = [Keypoint::new(Part::Nose, 0.0, 0.0, 0.0); Part::COUNT];

            for i in 0..Part::COUNT {
                let y = output[[0, p, i, 0]];
                let x = output[[0, p, i, 1]];
                let confidence = output[[0, p, i, 2]];

                // 正規化座標 → フレーム座標。フロントカメラはミラー空間で返す
                let px = if params.flip_horizontal {
                    (1.0 - x) * width
                } else {
                    x * width
                };
                keypoints[i] = Keypoint::new(Part::ALL[i], px, y * height, confidence);
            }

            // 姿勢スコアはキーポイント信頼度の平均
            let mut pose = Pose::new(0.0, keypoints);
            pose.score = pose.average_score();
            candidates.push(pose);
        }

        Ok(select_poses(candidates, params))
    }
}

/// ストライドに合わせた有効入力サイズ (k * stride + 1)。
/// stride 以下の寸法はそのまま
fn valid_size(scaled: u32, stride: u32) -> u32 {
    if scaled <= stride {
        scaled.max(1)
    } else {
        (scaled / stride) * stride + 1
    }
}

/// フレームを縮小して [1, H, W, 3] の f32 テンソル (0.0〜1.0) に詰める。
/// 反転は座標の復元側で行うため、ここではそのままサンプリングする
fn preprocess(frame: &Frame, params: &EstimateParams) -> Array4<f32> {
    let scale = params.image_scale_factor.clamp(0.05, 1.0);
    let stride = params.output_stride.as_u32();
    let tw = valid_size((frame.width() as f32 * scale) as u32, stride) as usize;
    let th = valid_size((frame.height() as f32 * scale) as u32, stride) as usize;

    let mut tensor = Array4::<f32>::zeros((1, th, tw, 3));
    for y in 0..th {
        let src_y = (y as f32 / th as f32 * frame.height() as f32) as u32;
        for x in 0..tw {
            let src_x = (x as f32 / tw as f32 * frame.width() as f32) as u32;
            let pixel = frame.pixel(
                src_x.min(frame.width() - 1),
                src_y.min(frame.height() - 1),
            );
            tensor[[0, y, x, 0]] = ((pixel >> 16) & 0xFF) as f32 / 255.0;
            tensor[[0, y, x, 1]] = ((pixel >> 8) & 0xFF) as f32 / 255.0;
            tensor[[0, y, x, 2]] = (pixel & 0xFF) as f32 / 255.0;
        }
    }
    tensor
}
