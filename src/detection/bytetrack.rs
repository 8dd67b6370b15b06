// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ByteTrack 算法实现
//! ByteTrack: Simple and effective multi-object tracking
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先匹配 (IOU)
//! 3. 低分框救援丢失的轨迹
//! 4. 纯运动模型,无需外观特征
//!
//! 轨迹确认: 连续命中 `n_init` 帧后转为已确认; 确认前丢失即删除。

use anyhow::Result;

use super::tracker::{compute_iou, KalmanBoxFilter, Track, Tracker};
use super::types::{BBox, DecodedFrame, Detection};
use crate::config::TrackerConfig;

/// ByteTrack 跟踪对象
#[derive(Clone, Debug)]
struct ByteTrackedPerson {
    id: u32,

    /// 当前边界框 (卡尔曼滤波平滑后)
    bbox: BBox,

    kalman: KalmanBoxFilter,

    /// 连续丢失帧数
    frames_lost: u32,

    /// 命中次数
    hits: u32,

    /// 本帧检测置信度 (丢失时为 None)
    score: Option<f32>,

    class_name: String,
}

impl ByteTrackedPerson {
    fn new(id: u32, detection: &Detection, config: &TrackerConfig) -> Self {
        let kalman = KalmanBoxFilter::new(
            &detection.bbox,
            config.kalman_process_noise,
            config.kalman_obs_noise,
        );

        Self {
            id,
            bbox: kalman.state_bbox(),
            kalman,
            frames_lost: 0,
            hits: 1,
            score: Some(detection.confidence),
            class_name: detection.class_name.clone(),
        }
    }

    fn predict(&mut self) {
        self.kalman.predict();
        self.bbox = self.kalman.state_bbox();
    }

    fn update(&mut self, detection: &Detection) {
        self.kalman.update(&detection.bbox);
        self.bbox = self.kalman.state_bbox();
        self.frames_lost = 0;
        self.hits += 1;
        self.score = Some(detection.confidence);
        self.class_name = detection.class_name.clone();
    }

    fn mark_lost(&mut self) {
        self.frames_lost += 1;
        self.score = None;
    }

    fn is_confirmed(&self, n_init: u32) -> bool {
        self.hits >= n_init
    }

    fn to_track(&self, n_init: u32) -> Track {
        Track {
            id: self.id,
            bbox: self.bbox,
            class_name: Some(self.class_name.clone()),
            confidence: self.score,
            confirmed: self.is_confirmed(n_init),
        }
    }
}

/// ByteTrack 追踪器
pub struct ByteTracker {
    tracked_persons: Vec<ByteTrackedPerson>,

    /// 下一个分配的ID
    next_id: u32,

    config: TrackerConfig,
}

impl ByteTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracked_persons: Vec::new(),
            next_id: 1,
            config,
        }
    }

    /// 更新跟踪 (ByteTrack 三步匹配)
    pub fn step(&mut self, detections: &[Detection]) -> Vec<Track> {
        // 1. 所有轨迹先预测
        for tracked in &mut self.tracked_persons {
            tracked.predict();
        }

        // 2. 分离高低分检测框
        let mut high_dets: Vec<usize> = Vec::new();
        let mut low_dets: Vec<usize> = Vec::new();

        for (idx, det) in detections.iter().enumerate() {
            if det.confidence >= self.config.high_score_threshold {
                high_dets.push(idx);
            } else if det.confidence >= self.config.low_score_threshold {
                low_dets.push(idx);
            }
        }

        // 3. 第一轮匹配: 高分检测 + 所有轨迹
        let mut matched_det = vec![false; detections.len()];
        let mut matched_track = vec![false; self.tracked_persons.len()];

        let all_tracks: Vec<usize> = (0..self.tracked_persons.len()).collect();
        let assignments = self.match_detections_to_tracks(
            detections,
            &high_dets,
            &all_tracks,
            self.config.high_iou_threshold,
        );

        for (det_idx, track_idx) in assignments {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            self.tracked_persons[track_idx].update(&detections[det_idx]);
        }

        // 4. 第二轮匹配: 低分检测 + 未匹配的轨迹 (救援)
        let unmatched_tracks: Vec<usize> = (0..self.tracked_persons.len())
            .filter(|&idx| !matched_track[idx])
            .collect();

        let low_assignments = self.match_detections_to_tracks(
            detections,
            &low_dets,
            &unmatched_tracks,
            self.config.low_iou_threshold,
        );

        for (det_idx, track_idx) in low_assignments {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            self.tracked_persons[track_idx].update(&detections[det_idx]);
        }

        // 5. 未匹配的轨迹 → 标记丢失
        for (track_idx, &matched) in matched_track.iter().enumerate() {
            if !matched {
                self.tracked_persons[track_idx].mark_lost();
            }
        }

        // 6. 未匹配的高分检测 → 新建轨迹
        for &det_idx in &high_dets {
            if !matched_det[det_idx] {
                let tracked =
                    ByteTrackedPerson::new(self.next_id, &detections[det_idx], &self.config);
                self.tracked_persons.push(tracked);
                self.next_id += 1;
            }
        }

        // 7. 删除丢失太久的轨迹, 以及确认前就丢失的候选
        let n_init = self.config.n_init;
        let max_age = self.config.max_age;
        self.tracked_persons.retain(|t| {
            if t.frames_lost == 0 {
                true
            } else {
                t.is_confirmed(n_init) && t.frames_lost <= max_age
            }
        });

        self.tracked_persons
            .iter()
            .map(|t| t.to_track(n_init))
            .collect()
    }

    /// IOU 贪心匹配, 返回 (检测索引, 轨迹索引)
    fn match_detections_to_tracks(
        &self,
        detections: &[Detection],
        det_indices: &[usize],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        if det_indices.is_empty() || track_indices.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for &det_idx in det_indices {
            for &track_idx in track_indices {
                let track = &self.tracked_persons[track_idx];
                let iou = compute_iou(&detections[det_idx].bbox, &track.kalman.predicted_bbox());

                if iou >= iou_threshold {
                    candidates.push((1.0 - iou, det_idx, track_idx));
                }
            }
        }

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut assignments = Vec::new();
        let mut used_det = vec![false; detections.len()];
        let mut used_track = vec![false; self.tracked_persons.len()];

        for (_, det_idx, track_idx) in candidates {
            if !used_det[det_idx] && !used_track[track_idx] {
                assignments.push((det_idx, track_idx));
                used_det[det_idx] = true;
                used_track[track_idx] = true;
            }
        }

        assignments
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracker for ByteTracker {
    fn update(&mut self, detections: &[Detection], _frame: &DecodedFrame) -> Result<Vec<Track>> {
        Ok(self.step(detections))
    }

    fn reset(&mut self) {
        self.tracked_persons.clear();
        self.next_id = 1;
    }

    fn track_count(&self) -> usize {
        self.tracked_persons.len()
    }
}
