// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 采集接口 (Capture traits)
//!
//! `CaptureBackend` 负责打开视频源, `VideoCapture` 是已打开的句柄。
//! 视频源管理器只通过这两个接口与解码实现交互。

use std::path::Path;

use crate::detection::types::DecodedFrame;
use crate::error::SourceError;

/// 已打开的采集句柄
pub trait VideoCapture: Send {
    /// 读取下一帧; 流结束/超时/设备断开时返回 None
    fn read(&mut self) -> Option<DecodedFrame>;

    /// 释放底层资源 (可重复调用)
    fn release(&mut self);
}

/// 采集后端: 打开文件或摄像头
pub trait CaptureBackend: Send + Sync {
    fn open_file(&self, path: &Path) -> Result<Box<dyn VideoCapture>, SourceError>;

    fn open_camera(&self, index: u32) -> Result<Box<dyn VideoCapture>, SourceError>;
}
