// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 摄像头输入模块
//!
//! 处理本地摄像头输入,支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)

use serde::Serialize;
use tracing::{info, warn};

/// 视频设备信息
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VideoDevice {
    pub name: String,
    pub index: u32,
}

/// 当前平台的摄像头输入格式
pub fn camera_format() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "dshow" // DirectShow
    }
    #[cfg(target_os = "macos")]
    {
        "avfoundation" // AVFoundation
    }
    #[cfg(target_os = "linux")]
    {
        "v4l2" // Video4Linux2
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        "video4linux2"
    }
}

/// 格式化摄像头URL - 根据平台选择
///
/// Windows 需要设备名, `device_name` 为空时回退到 `index`。
pub fn camera_url(index: u32, device_name: Option<&str>) -> String {
    #[cfg(target_os = "windows")]
    {
        match device_name {
            Some(name) => format!("video={}", name),
            None => format!("video={}", index),
        }
    }
    #[cfg(target_os = "linux")]
    {
        let _ = device_name;
        format!("/dev/video{}", index)
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        let _ = device_name;
        format!("{}", index)
    }
}

/// 获取可用的视频设备列表
pub fn list_video_devices() -> Vec<VideoDevice> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => {
            info!("🔍 找到 {} 个视频设备", devices.len());
            devices
                .into_iter()
                .enumerate()
                .map(|(index, name)| VideoDevice {
                    name,
                    index: index as u32,
                })
                .collect()
        }
        Err(e) => {
            warn!("⚠️  获取设备列表失败: {}", e);
            Vec::new()
        }
    }
}

/// 按序号查找设备名 (仅 Windows 的 dshow 需要)
pub fn device_name(index: u32) -> Option<String> {
    list_video_devices()
        .into_iter()
        .find(|d| d.index == index)
        .map(|d| d.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_camera_url() {
        assert_eq!(camera_url(0, None), "/dev/video0");
        assert_eq!(camera_url(2, Some("ignored")), "/dev/video2");
        assert_eq!(camera_format(), "v4l2");
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn test_windows_camera_url() {
        assert_eq!(camera_url(0, Some("USB Camera")), "video=USB Camera");
        assert_eq!(camera_format(), "dshow");
    }
}
