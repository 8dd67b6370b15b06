// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频输入系统 (Video Input System)
///
/// - CaptureBackend / VideoCapture: 采集接口
/// - FfmpegBackend: FFmpeg 解码后端 (视频文件 / 本地摄像头)
/// - DecodeFilter: 解码帧 → 有界通道
/// - SourceManager: 视频源管理器 (支持热切换)
pub mod camera;
pub mod capture;
pub mod decode_filter;
pub mod decoder;
pub mod source_manager;

pub use camera::{list_video_devices, VideoDevice};
pub use capture::{CaptureBackend, VideoCapture};
pub use decode_filter::{DecodeFilter, Delivery};
pub use decoder::{FfmpegBackend, FfmpegCapture};
pub use source_manager::{SourceConfig, SourceFrame, SourceManager, SourceMode};
