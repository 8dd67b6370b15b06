// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 区域命中判定
//!
//! 命中条件: 目标框与区域的交集面积 / 目标框面积 ≥ 阈值。
//! 多个区域互相独立, 一个目标可以同时计入多个区域。

use super::Zone;
use crate::state::{TrackedObject, ZoneCounts};

/// 默认命中占比
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.3;

/// 判断目标框是否落在区域内
pub fn is_match(bbox: [i32; 4], zone: &Zone, threshold: f64) -> bool {
    let [x1, y1, x2, y2] = bbox;

    let ix1 = x1.max(zone.x1);
    let iy1 = y1.max(zone.y1);
    let ix2 = x2.min(zone.x2);
    let iy2 = y2.min(zone.y2);
    if ix1 >= ix2 || iy1 >= iy2 {
        return false;
    }

    let bbox_area = (x2 as f64 - x1 as f64) * (y2 as f64 - y1 as f64);
    if bbox_area <= 0.0 {
        return false;
    }

    let intersection = (ix2 as f64 - ix1 as f64) * (iy2 as f64 - iy1 as f64);
    intersection / bbox_area >= threshold
}

/// 统计每个区域的人数 (所有区域名都会出现, 无人时为0)
pub fn count_zones(tracks: &[TrackedObject], zones: &[Zone], threshold: f64) -> ZoneCounts {
    let mut counts: ZoneCounts = zones.iter().map(|z| (z.name.clone(), 0)).collect();
    for track in tracks {
        for zone in zones {
            if is_match(track.bbox, zone, threshold) {
                if let Some(count) = counts.get_mut(&zone.name) {
                    *count += 1;
                }
            }
        }
    }
    counts
}
