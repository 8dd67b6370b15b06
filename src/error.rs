// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 错误类型 (配置类错误, 面向调用方)

use std::path::PathBuf;

use thiserror::Error;

/// 视频源错误: 切换失败时原视频源保持不变
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No video path provided")]
    EmptyPath,

    #[error("Video file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to open video source {source_name}: {reason}")]
    OpenFailed { source_name: String, reason: String },

    #[error("Camera {index} unavailable: {reason}")]
    CameraUnavailable { index: u32, reason: String },
}

impl SourceError {
    /// 调用方输入问题 (而非设备/解码故障)
    pub fn is_client_error(&self) -> bool {
        matches!(self, SourceError::EmptyPath | SourceError::FileNotFound(_))
    }
}

/// 区域存储错误
#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("Invalid zone index")]
    InvalidIndex(usize),

    #[error("Invalid coordinates")]
    InvalidCoordinates(String),

    #[error("zone file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("zone file serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ZoneError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ZoneError::InvalidIndex(_) | ZoneError::InvalidCoordinates(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_api_contract() {
        assert_eq!(ZoneError::InvalidIndex(3).to_string(), "Invalid zone index");
        assert_eq!(
            ZoneError::InvalidCoordinates("x1".into()).to_string(),
            "Invalid coordinates"
        );
        assert!(SourceError::FileNotFound(PathBuf::from("a.mp4"))
            .to_string()
            .contains("a.mp4"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(SourceError::EmptyPath.is_client_error());
        assert!(!SourceError::CameraUnavailable {
            index: 0,
            reason: "busy".into()
        }
        .is_client_error());
        assert!(ZoneError::InvalidIndex(0).is_client_error());
    }
}
