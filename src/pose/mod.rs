pub mod keypoint;
pub mod skeleton;

pub use keypoint::{Keypoint, Part, Point, Pose};
pub use skeleton::{adjacent_keypoints, SKELETON_EDGES};
