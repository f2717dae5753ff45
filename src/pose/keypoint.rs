use serde::{Deserialize, Serialize};

/// PoseNet の 17 キーポイントインデックス。
/// 並び順はワイヤフォーマットおよび骨格エッジ参照で意味を持つ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(usize)]
pub enum Part {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Part {
    pub const COUNT: usize = 17;

    /// インデックス順の全部位
    pub const ALL: [Part; Part::COUNT] = [
        Part::Nose,
        Part::LeftEye,
        Part::RightEye,
        Part::LeftEar,
        Part::RightEar,
        Part::LeftShoulder,
        Part::RightShoulder,
        Part::LeftElbow,
        Part::RightElbow,
        Part::LeftWrist,
        Part::RightWrist,
        Part::LeftHip,
        Part::RightHip,
        Part::LeftKnee,
        Part::RightKnee,
        Part::LeftAnkle,
        Part::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Part::ALL.get(index).copied()
    }

    /// ワイヤフォーマット上の部位名 (PoseNet 互換の camelCase)
    pub fn name(&self) -> &'static str {
        match self {
            Part::Nose => "nose",
            Part::LeftEye => "leftEye",
            Part::RightEye => "rightEye",
            Part::LeftEar => "leftEar",
            Part::RightEar => "rightEar",
            Part::LeftShoulder => "leftShoulder",
            Part::RightShoulder => "rightShoulder",
            Part::LeftElbow => "leftElbow",
            Part::RightElbow => "rightElbow",
            Part::LeftWrist => "leftWrist",
            Part::RightWrist => "rightWrist",
            Part::LeftHip => "leftHip",
            Part::RightHip => "rightHip",
            Part::LeftKnee => "leftKnee",
            Part::RightKnee => "rightKnee",
            Part::LeftAnkle => "leftAnkle",
            Part::RightAnkle => "rightAnkle",
        }
    }
}

/// フレーム座標系の位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// 単一キーポイント
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub part: Part,
    /// フレーム座標 (ピクセル単位)
    pub position: Point,
    /// 信頼度スコア (0.0〜1.0)
    pub score: f32,
}

impl Keypoint {
    pub fn new(part: Part, x: f32, y: f32, score: f32) -> Self {
        Self {
            part,
            position: Point { x, y },
            score,
        }
    }

    /// スコアが閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.score >= threshold
    }
}

/// 検出された 1 人分の姿勢。キーポイントは部位順に 1 つずつ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub score: f32,
    pub keypoints: [Keypoint; Part::COUNT],
}

impl Pose {
    pub fn new(score: f32, keypoints: [Keypoint; Part::COUNT]) -> Self {
        Self { score, keypoints }
    }

    /// 部位でキーポイントを取得
    pub fn get(&self, part: Part) -> &Keypoint {
        &self.keypoints[part as usize]
    }

    /// 全キーポイントの平均スコア
    pub fn average_score(&self) -> f32 {
        let sum: f32 = self.keypoints.iter().map(|k| k.score).sum();
        sum / Part::COUNT as f32
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            score: 0.0,
            keypoints: std::array::from_fn(|i| Keypoint::new(Part::ALL[i], 0.0, 0.0, 0.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_count() {
        assert_eq!(Part::COUNT, 17);
        assert_eq!(Part::ALL.len(), 17);
    }

    #[test]
    fn test_part_from_index() {
        assert_eq!(Part::from_index(0), Some(Part::Nose));
        assert_eq!(Part::from_index(16), Some(Part::RightAnkle));
        assert_eq!(Part::from_index(17), None);
    }

    #[test]
    fn test_part_names_are_camel_case() {
        assert_eq!(Part::Nose.name(), "nose");
        assert_eq!(Part::LeftShoulder.name(), "leftShoulder");
        assert_eq!(Part::RightAnkle.name(), "rightAnkle");
    }

    #[test]
    fn test_part_serde_matches_name() {
        for part in Part::ALL {
            let json = serde_json::to_string(&part).unwrap();
            assert_eq!(json, format!("\"{}\"", part.name()));
        }
    }

    #[test]
    fn test_keypoint_is_valid() {
        let kp = Keypoint::new(Part::Nose, 10.0, 20.0, 0.7);
        assert!(kp.is_valid(0.5));
        assert!(kp.is_valid(0.7));
        assert!(!kp.is_valid(0.8));
    }

    #[test]
    fn test_pose_get() {
        let mut pose = Pose::default();
        pose.keypoints[Part::Nose as usize] = Keypoint::new(Part::Nose, 320.0, 120.0, 0.9);

        let nose = pose.get(Part::Nose);
        assert_eq!(nose.position.x, 320.0);
        assert_eq!(nose.position.y, 120.0);
        assert_eq!(nose.score, 0.9);
    }

    #[test]
    fn test_pose_average_score() {
        let keypoints = std::array::from_fn(|i| Keypoint::new(Part::ALL[i], 0.0, 0.0, 0.5));
        let pose = Pose::new(0.5, keypoints);
        assert!((pose.average_score() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_pose_default_keypoints_in_part_order() {
        let pose = Pose::default();
        for (i, kp) in pose.keypoints.iter().enumerate() {
            assert_eq!(kp.part, Part::ALL[i]);
        }
    }
}
