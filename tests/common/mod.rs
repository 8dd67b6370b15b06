// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 集成测试公共组件: 内存采集后端与可编程检测器
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tempfile::TempDir;

use zonecount::{
    BBox, ByteTracker, CaptureBackend, DecodedFrame, Detection, Detector, Pipeline,
    PipelineConfig, SourceError, TrackerConfig, VideoCapture,
};

/// 无限输出纯色帧的采集句柄
pub struct SolidCapture {
    frame: DecodedFrame,
    remaining: Option<usize>,
}

impl VideoCapture for SolidCapture {
    fn read(&mut self) -> Option<DecodedFrame> {
        match &mut self.remaining {
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(self.frame.clone())
            }
            None => Some(self.frame.clone()),
        }
    }

    fn release(&mut self) {}
}

/// 内存采集后端
pub struct MemoryBackend {
    pub width: u32,
    pub height: u32,
    pub camera_available: bool,
    pub broken_files: Arc<Mutex<Vec<PathBuf>>>,
}

impl MemoryBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            camera_available: true,
            broken_files: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn capture(&self, shade: u8) -> Box<dyn VideoCapture> {
        Box::new(SolidCapture {
            frame: DecodedFrame::filled(self.width, self.height, [shade, shade, shade, 255]),
            remaining: None,
        })
    }
}

impl CaptureBackend for MemoryBackend {
    fn open_file(&self, path: &Path) -> Result<Box<dyn VideoCapture>, SourceError> {
        if self.broken_files.lock().unwrap().iter().any(|p| p == path) {
            return Err(SourceError::OpenFailed {
                source_name: path.display().to_string(),
                reason: "unsupported codec".to_string(),
            });
        }
        Ok(self.capture(100))
    }

    fn open_camera(&self, index: u32) -> Result<Box<dyn VideoCapture>, SourceError> {
        if !self.camera_available {
            return Err(SourceError::CameraUnavailable {
                index,
                reason: "device busy".to_string(),
            });
        }
        Ok(self.capture(200))
    }
}

/// 检测器行为
#[derive(Clone, Debug, PartialEq)]
pub enum Behavior {
    Normal,
    Fail,
    Panic,
}

pub type Hook = Box<dyn FnMut() + Send>;

/// 可编程检测器的共享控制面
#[derive(Default)]
pub struct Script {
    pub detections: Vec<Detection>,
    pub behavior: Option<Behavior>,
    pub calls: usize,
    pub frame_sizes: Vec<(u32, u32)>,
    pub delay_ms: u64,
    /// 检测过程中执行一次的回调
    pub during_detect: Option<Hook>,
}

pub struct ScriptedDetector {
    pub script: Arc<Mutex<Script>>,
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, frame: &DecodedFrame, conf_threshold: f32) -> Result<Vec<Detection>> {
        let (behavior, detections, delay, hook) = {
            let mut script = self.script.lock().unwrap();
            script.calls += 1;
            script.frame_sizes.push(frame.dimensions());
            (
                script.behavior.clone().unwrap_or(Behavior::Normal),
                script.detections.clone(),
                script.delay_ms,
                script.during_detect.take(),
            )
        };

        if delay > 0 {
            std::thread::sleep(std::time::Duration::from_millis(delay));
        }
        if let Some(mut hook) = hook {
            hook();
        }

        match behavior {
            Behavior::Normal => Ok(detections
                .into_iter()
                .filter(|d| d.confidence >= conf_threshold)
                .collect()),
            Behavior::Fail => Err(anyhow!("inference failed")),
            Behavior::Panic => panic!("detector crashed"),
        }
    }
}

pub fn person(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> Detection {
    Detection::new(BBox::new(x1, y1, x2, y2), conf, 0)
}

pub struct Harness {
    pub dir: TempDir,
    pub pipeline: Arc<Pipeline>,
    pub script: Arc<Mutex<Script>>,
    pub broken_files: Arc<Mutex<Vec<PathBuf>>>,
}

impl Harness {
    pub fn video(&self, name: &str) -> String {
        std::fs::write(self.dir.path().join(name), b"fake video").unwrap();
        name.to_string()
    }

    pub fn set_detections(&self, detections: Vec<Detection>) {
        self.script.lock().unwrap().detections = detections;
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        self.script.lock().unwrap().behavior = Some(behavior);
    }

    pub fn write_zones(&self, json: &str) {
        std::fs::write(self.dir.path().join("zones.json"), json).unwrap();
    }
}

pub fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        zones_file: dir.join("zones.json"),
        media_root: dir.to_path_buf(),
        min_frame_interval_ms: 0,
        ..PipelineConfig::default()
    }
}

pub fn harness_with(
    backend: MemoryBackend,
    configure: impl FnOnce(&mut PipelineConfig),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    configure(&mut config);

    let broken_files = Arc::clone(&backend.broken_files);
    let script = Arc::new(Mutex::new(Script::default()));
    let detector = ScriptedDetector {
        script: Arc::clone(&script),
    };
    let tracker = ByteTracker::new(TrackerConfig::default());
    let pipeline = Arc::new(Pipeline::new(
        config,
        Box::new(backend),
        Box::new(detector),
        Box::new(tracker),
    ));

    Harness {
        dir,
        pipeline,
        script,
        broken_files,
    }
}

pub fn harness() -> Harness {
    harness_with(MemoryBackend::new(640, 480), |_| {})
}
