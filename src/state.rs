// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 共享状态 (State Store)
//!
//! 单写多读: 只有帧处理周期通过 `publish` 整体替换当前视图,
//! 视频源切换通过 `reset` 清空。读者总是看到完整的旧状态或新状态。

use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::debug;

use crate::unix_timestamp;

/// 区域名 → 人数
pub type ZoneCounts = BTreeMap<String, u32>;

/// 对外发布的跟踪目标
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackedObject {
    pub track_id: u32,
    pub bbox: [i32; 4],
    pub class_name: String,
    pub confidence: Option<f32>,
}

/// 某一时刻的区域计数
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZoneCountSnapshot {
    pub timestamp: f64,
    pub zone_counts: ZoneCounts,
}

/// 流水线状态聚合
#[derive(Clone, Debug, Default, Serialize)]
pub struct PipelineState {
    pub current_tracks: Vec<TrackedObject>,
    pub current_zone_counts: ZoneCounts,
    pub history: VecDeque<ZoneCountSnapshot>,
    pub frame_count: u64,
    pub last_update_time: Option<f64>,
    /// 当前视频源代数
    pub generation: u64,
}

/// 一次成功发布的结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Published {
    pub frame_count: u64,
    pub timestamp: f64,
}

pub struct StateStore {
    inner: RwLock<PipelineState>,
    capacity: usize,
    default_limit: usize,
}

impl StateStore {
    pub fn new(capacity: usize, default_limit: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(PipelineState {
                history: VecDeque::with_capacity(capacity),
                ..PipelineState::default()
            }),
            capacity,
            default_limit,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // 状态总是整体替换, 锁中毒后直接沿用内部数据
    fn read(&self) -> RwLockReadGuard<'_, PipelineState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PipelineState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 视频源切换: 清空当前目标/计数/历史, 记录新代数
    pub fn reset(&self, generation: u64) {
        let mut state = self.write();
        state.current_tracks.clear();
        state.current_zone_counts.clear();
        state.history.clear();
        state.generation = generation;
        debug!("🧹 状态已重置 (Gen: {})", generation);
    }

    /// 原子发布一帧的处理结果
    ///
    /// 代数与当前不一致 (处理期间视频源已切换) 时丢弃, 返回 None。
    pub fn publish(
        &self,
        generation: u64,
        tracks: Vec<TrackedObject>,
        zone_counts: ZoneCounts,
    ) -> Option<Published> {
        self.publish_at(generation, tracks, zone_counts, unix_timestamp())
    }

    pub fn publish_at(
        &self,
        generation: u64,
        tracks: Vec<TrackedObject>,
        zone_counts: ZoneCounts,
        timestamp: f64,
    ) -> Option<Published> {
        let mut state = self.write();
        if state.generation != generation {
            return None;
        }

        state.history.push_back(ZoneCountSnapshot {
            timestamp,
            zone_counts: zone_counts.clone(),
        });
        while state.history.len() > self.capacity {
            state.history.pop_front();
        }

        state.current_tracks = tracks;
        state.current_zone_counts = zone_counts;
        state.frame_count += 1;
        state.last_update_time = Some(timestamp);

        Some(Published {
            frame_count: state.frame_count,
            timestamp,
        })
    }

    pub fn current_tracks(&self) -> Vec<TrackedObject> {
        self.read().current_tracks.clone()
    }

    pub fn current_zone_counts(&self) -> ZoneCounts {
        self.read().current_zone_counts.clone()
    }

    /// 最近 `limit` 条历史 (时间正序); 默认条数可配置, 上限为容量
    pub fn query_history(&self, limit: Option<usize>) -> Vec<ZoneCountSnapshot> {
        let limit = limit.unwrap_or(self.default_limit).min(self.capacity);
        let state = self.read();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> PipelineState {
        self.read().clone()
    }

    pub fn frame_count(&self) -> u64 {
        self.read().frame_count
    }

    pub fn last_update_time(&self) -> Option<f64> {
        self.read().last_update_time
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(300, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u32)]) -> ZoneCounts {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn person(id: u32) -> TrackedObject {
        TrackedObject {
            track_id: id,
            bbox: [0, 0, 10, 10],
            class_name: "person".to_string(),
            confidence: Some(0.9),
        }
    }

    #[test]
    fn test_publish_replaces_current_view() {
        let store = StateStore::default();
        let published = store
            .publish_at(0, vec![person(1)], counts(&[("A", 1)]), 10.0)
            .unwrap();
        assert_eq!(published.frame_count, 1);
        assert_eq!(store.current_tracks(), vec![person(1)]);
        assert_eq!(store.current_zone_counts(), counts(&[("A", 1)]));
        assert_eq!(store.last_update_time(), Some(10.0));

        store.publish_at(0, vec![], counts(&[("A", 0)]), 11.0);
        assert!(store.current_tracks().is_empty());
        assert_eq!(store.frame_count(), 2);
    }

    #[test]
    fn test_history_evicts_oldest_fifo() {
        let store = StateStore::new(300, 100);
        for i in 0..310 {
            store.publish_at(0, vec![], counts(&[("A", i)]), i as f64);
        }
        let history = store.query_history(Some(1000));
        assert_eq!(history.len(), 300);
        assert_eq!(history[0].timestamp, 10.0);
        assert_eq!(history[299].timestamp, 309.0);
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_query_history_limits() {
        let store = StateStore::new(300, 100);
        for i in 0..150 {
            store.publish_at(0, vec![], ZoneCounts::new(), i as f64);
        }
        assert_eq!(store.query_history(None).len(), 100);
        assert_eq!(store.query_history(None)[0].timestamp, 50.0);
        let last3 = store.query_history(Some(3));
        assert_eq!(
            last3.iter().map(|s| s.timestamp).collect::<Vec<_>>(),
            vec![147.0, 148.0, 149.0]
        );
        assert!(store.query_history(Some(0)).is_empty());
        assert_eq!(store.query_history(Some(10_000)).len(), 150);
    }

    #[test]
    fn test_reset_clears_view_but_keeps_frame_count() {
        let store = StateStore::default();
        store.publish_at(0, vec![person(1)], counts(&[("A", 1)]), 1.0);
        store.reset(1);
        assert!(store.current_tracks().is_empty());
        assert!(store.current_zone_counts().is_empty());
        assert!(store.query_history(None).is_empty());
        assert_eq!(store.frame_count(), 1);
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_stale_generation_publish_is_rejected() {
        let store = StateStore::default();
        store.reset(2);
        assert!(store
            .publish_at(1, vec![person(1)], counts(&[("A", 1)]), 1.0)
            .is_none());
        assert!(store.current_tracks().is_empty());
        assert_eq!(store.frame_count(), 0);
        assert!(store.publish_at(2, vec![], ZoneCounts::new(), 2.0).is_some());
    }

    #[test]
    fn test_concurrent_readers_see_complete_states() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(StateStore::default());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..500u32 {
                    let tracks = (0..i % 5).map(person).collect::<Vec<_>>();
                    let n = tracks.len() as u32;
                    store.publish(0, tracks, counts(&[("A", n)]));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snap = store.snapshot();
                        let n = snap.current_zone_counts.get("A").copied().unwrap_or(0);
                        if snap.frame_count > 0 {
                            assert_eq!(n as usize, snap.current_tracks.len());
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(store.frame_count(), 500);
    }
}
