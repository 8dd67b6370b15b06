// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统 (Detection System)
///
/// - Detector: 目标检测 (YOLOv8 ONNX)
/// - Tracker:  目标追踪 (ByteTrack + 卡尔曼滤波)
pub mod bytetrack;
pub mod detector;
pub mod tracker;
pub mod types;

pub use bytetrack::ByteTracker;
pub use detector::{decode_yolo_output, Detector, YoloDetector};
pub use tracker::{compute_iou, KalmanBoxFilter, Track, Tracker};
pub use types::{class_name, BBox, DecodedFrame, Detection, FRAME_HEIGHT, FRAME_WIDTH};
