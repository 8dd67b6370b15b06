// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 帧处理流水线 (Frame Cycle Pipeline)
///
/// 每次 `tick` 完成一个处理周期:
/// 节流 → 读取区域 → 取帧 → 缩放 → 检测 → 人员过滤 → 跟踪 → 区域计数 → 发布
///
/// 周期由外部调用驱动, 不存在后台调度线程。
pub mod resize;
pub mod throttle;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::detection::detector::Detector;
use crate::detection::tracker::Tracker;
use crate::detection::types::{DecodedFrame, Detection};
use crate::error::SourceError;
use crate::input::capture::CaptureBackend;
use crate::input::source_manager::{SourceConfig, SourceFrame, SourceManager};
use crate::state::{StateStore, TrackedObject, ZoneCountSnapshot, ZoneCounts};
use crate::zones::{count_zones, ZoneStore};

pub use resize::FrameResizer;
pub use throttle::Throttle;

/// 处理期间视频源被切换
pub const SOURCE_CHANGED_MESSAGE: &str = "video source changed during processing";

/// 一次成功处理的结果
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TickReport {
    pub tracks: Vec<TrackedObject>,
    pub zone_counts: ZoneCounts,
    pub frame_count: u64,
    pub timestamp: f64,
    pub frame_width: u32,
    pub frame_height: u32,
}

/// 处理周期结果
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    Success(TickReport),
    /// 距上次处理过近, 或已有处理正在进行
    Throttled,
    /// 没有可用的视频帧
    NoActiveSource,
    /// 本次处理失败, 已发布状态保持不变
    ProcessingError(String),
}

/// 检测 + 跟踪 (同一时刻只允许一个处理周期持有)
struct Engine {
    detector: Box<dyn Detector>,
    tracker: Box<dyn Tracker>,
    /// 跟踪器当前服务的视频源代数
    tracker_generation: Option<u64>,
    resizer: FrameResizer,
    processed: u64,
    window_start: Instant,
}

impl Engine {
    fn process(&mut self, frame: &DecodedFrame, config: &PipelineConfig) -> Result<Vec<TrackedObject>> {
        let t0 = Instant::now();
        let resized = self.resizer.resize(frame)?;
        let resize_ms = t0.elapsed().as_secs_f64() * 1000.0;

        let t1 = Instant::now();
        let detections = self
            .detector
            .detect(&resized, config.detector.conf_threshold)?;
        let detect_ms = t1.elapsed().as_secs_f64() * 1000.0;

        let persons: Vec<Detection> = detections
            .into_iter()
            .filter(|d| {
                d.class_name == config.person_class && d.confidence >= config.person_conf_threshold
            })
            .collect();

        let t2 = Instant::now();
        let tracks = self.tracker.update(&persons, &resized)?;
        let track_ms = t2.elapsed().as_secs_f64() * 1000.0;

        let objects: Vec<TrackedObject> = tracks
            .into_iter()
            .filter(|t| t.confirmed)
            .map(|t| TrackedObject {
                track_id: t.id,
                bbox: t.bbox.to_pixels(),
                class_name: t.class_name.unwrap_or_else(|| "person".to_string()),
                confidence: t.confidence,
            })
            .collect();

        debug!(
            "⏱️ 缩放 {:.1}ms | 检测 {:.1}ms ({}人) | 跟踪 {:.1}ms ({}个) | 总计 {:.1}ms",
            resize_ms,
            detect_ms,
            persons.len(),
            track_ms,
            objects.len(),
            t0.elapsed().as_secs_f64() * 1000.0
        );

        Ok(objects)
    }

    fn record_stats(&mut self, interval: u64) {
        self.processed += 1;
        if interval == 0 || self.processed % interval != 0 {
            return;
        }
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            info!(
                "📊 已处理 {} 帧 | 近期 {:.1} 帧/秒",
                self.processed,
                interval as f64 / elapsed
            );
        }
        self.window_start = Instant::now();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    source: SourceManager,
    zones: ZoneStore,
    state: Arc<StateStore>,
    throttle: Throttle,
    engine: Mutex<Engine>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        backend: Box<dyn CaptureBackend>,
        detector: Box<dyn Detector>,
        tracker: Box<dyn Tracker>,
    ) -> Self {
        let state = Arc::new(StateStore::new(
            config.history_capacity,
            config.history_default_limit,
        ));
        let source = SourceManager::new(backend, config.camera_index, Arc::clone(&state));
        let zones = ZoneStore::new(config.zones_file.clone());
        let throttle = Throttle::new(Duration::from_millis(config.min_frame_interval_ms));
        let engine = Engine {
            detector,
            tracker,
            tracker_generation: None,
            resizer: FrameResizer::new(config.frame_width, config.frame_height),
            processed: 0,
            window_start: Instant::now(),
        };

        Self {
            config,
            source,
            zones,
            state,
            throttle,
            engine: Mutex::new(engine),
        }
    }

    /// 执行一个处理周期
    pub fn tick(&self) -> TickOutcome {
        // 已有处理在进行 → 立即拒绝, 不排队
        let mut guard = match self.engine.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return TickOutcome::Throttled,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        let engine = &mut *guard;

        if !self.throttle.try_acquire() {
            return TickOutcome::Throttled;
        }

        let zones = self.zones.load();

        let Some(SourceFrame { frame, generation }) = self.source.next_frame() else {
            return TickOutcome::NoActiveSource;
        };

        if engine.tracker_generation != Some(generation) {
            if engine.tracker_generation.is_some() {
                info!("🔄 视频源已切换 (Gen: {}), 重置跟踪器", generation);
            }
            engine.tracker.reset();
            engine.tracker_generation = Some(generation);
        }

        let processed =
            panic::catch_unwind(AssertUnwindSafe(|| engine.process(&frame, &self.config)));
        let tracks = match processed {
            Ok(Ok(tracks)) => tracks,
            Ok(Err(e)) => {
                warn!("❌ 帧处理失败: {:#}", e);
                return TickOutcome::ProcessingError(format!("{:#}", e));
            }
            Err(payload) => {
                let message = panic_message(payload);
                warn!("💥 检测/跟踪异常: {}, 重置跟踪器", message);
                engine.tracker.reset();
                return TickOutcome::ProcessingError(message);
            }
        };

        let zone_counts = count_zones(&tracks, &zones, self.config.zone_overlap_threshold);

        let Some(published) =
            self.state
                .publish(generation, tracks.clone(), zone_counts.clone())
        else {
            debug!("🗑️ 丢弃过期结果 (Gen: {})", generation);
            return TickOutcome::ProcessingError(SOURCE_CHANGED_MESSAGE.to_string());
        };

        engine.record_stats(self.config.stats_interval_frames);

        let (frame_width, frame_height) = engine.resizer.target();
        TickOutcome::Success(TickReport {
            tracks,
            zone_counts,
            frame_count: published.frame_count,
            timestamp: published.timestamp,
            frame_width,
            frame_height,
        })
    }

    /// 切换到视频文件 (路径相对媒体根目录解析)
    pub fn set_file_source(&self, video_path: &str) -> Result<SourceConfig, SourceError> {
        if video_path.trim().is_empty() {
            return Err(SourceError::EmptyPath);
        }
        let path: PathBuf = self.config.resolve_media_path(video_path);
        self.source.set_file_source(&path)
    }

    pub fn set_camera_mode(&self, enabled: bool) -> Result<SourceConfig, SourceError> {
        self.source.set_camera_mode(enabled)
    }

    pub fn source_config(&self) -> SourceConfig {
        self.source.config()
    }

    pub fn current_zone_counts(&self) -> ZoneCounts {
        self.state.current_zone_counts()
    }

    pub fn history(&self, limit: Option<usize>) -> Vec<ZoneCountSnapshot> {
        self.state.query_history(limit)
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn zones(&self) -> &ZoneStore {
        &self.zones
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 释放视频源 (服务退出时)
    pub fn shutdown(&self) {
        self.source.close();
    }
}
