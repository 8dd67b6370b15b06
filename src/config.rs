// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 服务配置 - 通过JSON文件调整参数
//!
//! 配置文件不存在时写出默认值; 解析失败时告警并回退默认值。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "zonecount.json";

/// 检测模型参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: String,    // ONNX 模型路径
    pub input_size: u32,       // 模型输入边长
    pub conf_threshold: f32,   // 检测置信度阈值
    pub iou_threshold: f32,    // NMS IOU阈值
    pub use_cuda: bool,        // 是否启用 CUDA
    pub device_id: i32,        // GPU 设备号
    pub intra_threads: usize,  // ORT 线程数
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "yolov8n.onnx".to_string(),
            input_size: 640,
            conf_threshold: 0.5,
            iou_threshold: 0.45,
            use_cuda: false,
            device_id: 0,
            intra_threads: 4,
        }
    }
}

/// 跟踪器参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_age: u32,               // 确认轨迹最大丢失帧数
    pub n_init: u32,                // 确认所需连续命中次数
    pub high_score_threshold: f32,  // 高分阈值
    pub low_score_threshold: f32,   // 低分阈值
    pub high_iou_threshold: f32,    // 高分IOU阈值
    pub low_iou_threshold: f32,     // 低分IOU阈值
    pub kalman_process_noise: f32,  // 过程噪声 q
    pub kalman_obs_noise: f32,      // 观测噪声 r
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 15,
            n_init: 1,
            high_score_threshold: 0.4,
            low_score_threshold: 0.1,
            high_iou_threshold: 0.4,
            low_iou_threshold: 0.3,
            kalman_process_noise: 0.1,
            kalman_obs_noise: 0.5,
        }
    }
}

/// HTTP 监听参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 流水线参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    // === 数据源 ===
    pub zones_file: PathBuf,                 // 区域持久化文件
    pub media_root: PathBuf,                 // 视频相对路径的根目录
    pub default_video_path: Option<String>,  // 启动时打开的视频
    pub camera_index: u32,                   // 摄像头序号
    pub read_timeout_ms: u64,                // 单帧读取超时

    // === 处理 ===
    pub min_frame_interval_ms: u64,  // 两次处理的最小间隔
    pub frame_width: u32,            // 工作分辨率
    pub frame_height: u32,
    pub person_class: String,        // 计数的目标类别
    pub person_conf_threshold: f32,  // 进入跟踪的最低置信度
    pub zone_overlap_threshold: f64, // 区域命中的面积占比

    // === 历史 ===
    pub history_capacity: usize,      // 历史环形缓冲容量
    pub history_default_limit: usize, // 历史查询默认条数
    pub stats_interval_frames: u64,   // 统计日志输出间隔

    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub server: ServerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            zones_file: PathBuf::from("zones.json"),
            media_root: PathBuf::from("."),
            default_video_path: None,
            camera_index: 0,
            read_timeout_ms: 2000,

            min_frame_interval_ms: 50,
            frame_width: 640,
            frame_height: 480,
            person_class: "person".to_string(),
            person_conf_threshold: 0.3,
            zone_overlap_threshold: 0.3,

            history_capacity: 300,
            history_default_limit: 100,
            stats_interval_frames: 100,

            detector: DetectorConfig::default(),
            tracker: TrackerConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    error!("❌ 保存配置失败: {:#}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("写入 {} 失败", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 将相对视频路径解析到媒体根目录下 (去掉开头的 '/')
    pub fn resolve_media_path(&self, raw: &str) -> PathBuf {
        self.media_root.join(raw.trim_start_matches('/'))
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️  当前流水线配置:");
        info!("  工作分辨率: {}x{}", self.frame_width, self.frame_height);
        info!("  处理间隔: {} ms", self.min_frame_interval_ms);
        info!(
            "  检测置信度: {:.2} | 人员准入: {:.2}",
            self.detector.conf_threshold, self.person_conf_threshold
        );
        info!(
            "  跟踪: max_age={} n_init={}",
            self.tracker.max_age, self.tracker.n_init
        );
        info!("  区域命中占比: {:.2}", self.zone_overlap_threshold);
        info!("  区域文件: {}", self.zones_file.display());
        info!("  历史容量: {}", self.history_capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let config = PipelineConfig::load(&path);
        assert_eq!(config, PipelineConfig::default());
        assert!(path.exists());
        assert_eq!(PipelineConfig::load(&path), config);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(PipelineConfig::load(&path), PipelineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{"min_frame_interval_ms": 100, "tracker": {"max_age": 30}}"#).unwrap();
        let config = PipelineConfig::load(&path);
        assert_eq!(config.min_frame_interval_ms, 100);
        assert_eq!(config.tracker.max_age, 30);
        assert_eq!(config.tracker.n_init, 1);
        assert_eq!(config.history_capacity, 300);
    }

    #[test]
    fn test_resolve_media_path_strips_leading_slash() {
        let config = PipelineConfig {
            media_root: PathBuf::from("/srv/app"),
            ..PipelineConfig::default()
        };
        assert_eq!(
            config.resolve_media_path("/videos/a.mp4"),
            PathBuf::from("/srv/app/videos/a.mp4")
        );
        assert_eq!(
            config.resolve_media_path("videos/a.mp4"),
            PathBuf::from("/srv/app/videos/a.mp4")
        );
    }
}
