use crate::pose::{Keypoint, Part, Pose};

/// 骨格の接続定義 (開始キーポイント, 終了キーポイント)。
/// PoseNet の隣接部位リストと同一
pub const SKELETON_EDGES: [(Part, Part); 12] = [
    // 腕
    (Part::LeftShoulder, Part::LeftElbow),
    (Part::LeftElbow, Part::LeftWrist),
    (Part::RightShoulder, Part::RightElbow),
    (Part::RightElbow, Part::RightWrist),
    // 胴体
    (Part::LeftShoulder, Part::RightShoulder),
    (Part::LeftShoulder, Part::LeftHip),
    (Part::RightShoulder, Part::RightHip),
    (Part::LeftHip, Part::RightHip),
    // 脚
    (Part::LeftHip, Part::LeftKnee),
    (Part::LeftKnee, Part::LeftAnkle),
    (Part::RightHip, Part::RightKnee),
    (Part::RightKnee, Part::RightAnkle),
];

/// 両端のスコアが閾値以上の骨格エッジを列挙する
pub fn adjacent_keypoints(pose: &Pose, min_part_score: f32) -> Vec<(&Keypoint, &Keypoint)> {
    SKELETON_EDGES
        .iter()
        .map(|(a, b)| (pose.get(*a), pose.get(*b)))
        .filter(|(a, b)| a.is_valid(min_part_score) && b.is_valid(min_part_score))
        .collect()
}
