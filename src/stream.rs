//! Outbound telemetry: serializes per-tick pose results and pushes them onto
//! one persistent TCP connection with length-delimited framing. Delivery is
//! at-most-once: when the connection is absent or broken the message is
//! dropped, never buffered or replayed.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::SinkExt;
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::pose::Pose;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame dimensions attached to every outbound message.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// One message per tick where detection is active and succeeds.
#[derive(Debug, Serialize)]
pub struct PoseMessage<'a> {
    pub poses: &'a [Pose],
    pub image: ImageSize,
    #[serde(rename = "poseTime")]
    pub pose_time: u64,
}

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(1024 * 1024) // 1MB
        .new_codec();
    Framed::new(stream, codec)
}

/// Milliseconds since the Unix epoch.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Best-effort sink for the pose telemetry feed.
pub struct StreamSink {
    stream: Option<MessageStream>,
}

impl StreamSink {
    /// A sink with no connection; every send is silently dropped.
    pub fn disconnected() -> Self {
        Self { stream: None }
    }

    pub async fn connect(addr: &str) -> Result<Self, SinkError> {
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true)?;
        Ok(Self {
            stream: Some(message_stream(tcp)),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Serialize one tick's filtered poses and push them if connected.
    /// A failed push drops the message and the connection; nothing propagates
    /// to the caller.
    pub async fn send(&mut self, poses: &[Pose], frame_size: (u32, u32), timestamp_ms: u64) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let message = PoseMessage {
            poses,
            image: ImageSize {
                width: frame_size.0,
                height: frame_size.1,
            },
            pose_time: timestamp_ms,
        };

        let data = match serde_json::to_vec(&message) {
            Ok(data) => data,
            Err(e) => {
                eprintln!("[stream] serialize error: {e}");
                return;
            }
        };

        if let Err(e) = stream.send(Bytes::from(data)).await {
            eprintln!("[stream] send error: {e}, dropping connection");
            self.stream = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Keypoint, Part};
    use futures::StreamExt;
    use tokio::net::TcpListener;

    // 二進で正確に表せる値にしておく (JSON 経由の比較がぶれない)
    fn sample_pose() -> Pose {
        let keypoints =
            std::array::from_fn(|i| Keypoint::new(Part::ALL[i], i as f32, 2.0 * i as f32, 0.75));
        Pose::new(0.5, keypoints)
    }

    #[test]
    fn test_message_wire_shape() {
        let poses = vec![sample_pose()];
        let message = PoseMessage {
            poses: &poses,
            image: ImageSize {
                width: 640,
                height: 480,
            },
            pose_time: 1234567890,
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["image"]["width"], 640);
        assert_eq!(value["image"]["height"], 480);
        assert_eq!(value["poseTime"], 1234567890u64);

        let pose = &value["poses"][0];
        assert_eq!(pose["score"], 0.5);
        assert_eq!(pose["keypoints"].as_array().unwrap().len(), Part::COUNT);
        assert_eq!(pose["keypoints"][0]["part"], "nose");
        assert_eq!(pose["keypoints"][5]["part"], "leftShoulder");
        assert_eq!(pose["keypoints"][1]["position"]["x"], 1.0);
        assert_eq!(pose["keypoints"][1]["position"]["y"], 2.0);
        assert_eq!(pose["keypoints"][1]["score"], 0.75);
    }

    #[tokio::test]
    async fn test_disconnected_send_drops_message() {
        let mut sink = StreamSink::disconnected();
        assert!(!sink.is_connected());
        // 接続が無ければ何も起きない (キューイングもしない)
        sink.send(&[sample_pose()], (640, 480), timestamp_ms()).await;
        assert!(!sink.is_connected());
    }

    #[tokio::test]
    async fn test_send_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut stream = message_stream(tcp);
            stream.next().await.unwrap().unwrap()
        });

        let mut sink = StreamSink::connect(&addr.to_string()).await.unwrap();
        assert!(sink.is_connected());
        sink.send(&[sample_pose()], (640, 480), 42).await;
        assert!(sink.is_connected());

        let received = server.await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&received).unwrap();
        assert_eq!(value["poseTime"], 42);
        assert_eq!(value["poses"][0]["keypoints"][16]["part"], "rightAnkle");
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        // 接続先がいないポートへの connect は失敗として返る
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(StreamSink::connect(&addr.to_string()).await.is_err());
    }
}
