// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 服务配置参数
pub mod detection; // 检测与跟踪
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod pipeline; // 帧处理流水线
pub mod state; // 共享状态
pub mod web_api; // HTTP 接口
pub mod zones; // 区域存储与命中判定

pub use crate::config::{DetectorConfig, PipelineConfig, ServerConfig, TrackerConfig};
pub use crate::detection::{BBox, ByteTracker, DecodedFrame, Detection, Detector, Track, Tracker, YoloDetector};
pub use crate::error::{SourceError, ZoneError};
pub use crate::input::{CaptureBackend, FfmpegBackend, SourceConfig, SourceManager, SourceMode, VideoCapture};
pub use crate::pipeline::{Pipeline, TickOutcome, TickReport};
pub use crate::state::{StateStore, TrackedObject, ZoneCountSnapshot, ZoneCounts};
pub use crate::zones::{Zone, ZoneStore};

use crate::detection::tracker::compute_iou;

/// 按类别的非极大值抑制, 结果按置信度降序
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id != xs[index].class_id {
                continue;
            }
            let iou = compute_iou(&xs[prev_index].bbox, &xs[index].bbox);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 当前 Unix 时间戳 (秒, 微秒精度)
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, conf: f32, class_id: usize) -> Detection {
        Detection::new(BBox::new(x1, 0.0, x1 + 10.0, 10.0), conf, class_id)
    }

    #[test]
    fn test_nms_suppresses_overlaps_per_class() {
        let mut xs = vec![
            det(0.0, 0.6, 0),
            det(1.0, 0.9, 0),
            det(1.0, 0.8, 1),
            det(50.0, 0.7, 0),
        ];
        non_max_suppression(&mut xs, 0.45);
        let kept: Vec<(usize, f32)> = xs.iter().map(|d| (d.class_id, d.confidence)).collect();
        assert_eq!(kept, vec![(0, 0.9), (1, 0.8), (0, 0.7)]);
    }

    #[test]
    fn test_unix_timestamp_is_recent() {
        let ts = unix_timestamp();
        // 2020-01-01 之后
        assert!(ts > 1_577_836_800.0);
    }
}
