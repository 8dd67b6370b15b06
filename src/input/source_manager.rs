// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 视频源管理器 - 支持文件/摄像头热切换
//!
//! 同一时刻只持有一个采集句柄。打开、关闭、读帧共用一把锁,
//! 切换请求与读帧互斥。每次成功切换视频源代数加一并重置共享状态。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

use super::capture::{CaptureBackend, VideoCapture};
use crate::detection::types::DecodedFrame;
use crate::error::SourceError;
use crate::state::StateStore;

/// 视频源模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    File,
    Camera,
}

/// 当前视频源配置
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceConfig {
    pub mode: SourceMode,
    pub file_path: Option<PathBuf>,
    pub is_open: bool,
}

/// 带视频源代数的帧
#[derive(Clone, Debug)]
pub struct SourceFrame {
    pub frame: DecodedFrame,
    pub generation: u64,
}

struct SourceSlot {
    mode: SourceMode,
    file_path: Option<PathBuf>,
    capture: Option<Box<dyn VideoCapture>>,
    generation: u64,
}

impl SourceSlot {
    fn config(&self) -> SourceConfig {
        SourceConfig {
            mode: self.mode,
            file_path: self.file_path.clone(),
            is_open: self.capture.is_some(),
        }
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }
    }
}

pub struct SourceManager {
    backend: Box<dyn CaptureBackend>,
    camera_index: u32,
    state: Arc<StateStore>,
    slot: Mutex<SourceSlot>,
}

impl SourceManager {
    pub fn new(backend: Box<dyn CaptureBackend>, camera_index: u32, state: Arc<StateStore>) -> Self {
        Self {
            backend,
            camera_index,
            state,
            slot: Mutex::new(SourceSlot {
                mode: SourceMode::File,
                file_path: None,
                capture: None,
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SourceSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 成功切换后: 代数加一, 清空共享状态
    fn commit_swap(&self, slot: &mut SourceSlot) {
        slot.generation += 1;
        self.state.reset(slot.generation);
    }

    /// 切换失败后按原模式重新打开旧视频源
    fn restore_previous(&self, slot: &mut SourceSlot, had_capture: bool) {
        if !had_capture {
            return;
        }
        let reopened = match (slot.mode, slot.file_path.as_deref()) {
            (SourceMode::Camera, _) => self.backend.open_camera(self.camera_index),
            (SourceMode::File, Some(path)) => self.backend.open_file(path),
            (SourceMode::File, None) => return,
        };
        match reopened {
            Ok(capture) => {
                info!("↩️ 已恢复原视频源");
                slot.capture = Some(capture);
            }
            Err(e) => warn!("⚠️ 原视频源恢复失败: {}", e),
        }
    }

    /// 切换到视频文件
    pub fn set_file_source(&self, path: &Path) -> Result<SourceConfig, SourceError> {
        if path.as_os_str().is_empty() {
            return Err(SourceError::EmptyPath);
        }
        if !path.is_file() {
            return Err(SourceError::FileNotFound(path.to_path_buf()));
        }

        let mut slot = self.lock();
        let had_capture = slot.capture.is_some();
        slot.release();

        match self.backend.open_file(path) {
            Ok(capture) => {
                slot.capture = Some(capture);
                slot.mode = SourceMode::File;
                slot.file_path = Some(path.to_path_buf());
                self.commit_swap(&mut slot);
                info!(
                    "🎬 视频源切换为文件: {} (Gen: {})",
                    path.display(),
                    slot.generation
                );
                Ok(slot.config())
            }
            Err(e) => {
                warn!("❌ 打开视频文件失败: {}", e);
                self.restore_previous(&mut slot, had_capture);
                Err(e)
            }
        }
    }

    /// 开启/关闭摄像头模式
    pub fn set_camera_mode(&self, enabled: bool) -> Result<SourceConfig, SourceError> {
        let mut slot = self.lock();

        if !enabled {
            // 仅关闭摄像头; 文件模式下保持现状
            if slot.mode != SourceMode::Camera {
                return Ok(slot.config());
            }
            slot.release();
            slot.mode = SourceMode::File;
            slot.file_path = None;
            self.commit_swap(&mut slot);
            info!("📷 摄像头已关闭 (Gen: {})", slot.generation);
            return Ok(slot.config());
        }

        let had_capture = slot.capture.is_some();
        slot.release();

        match self.backend.open_camera(self.camera_index) {
            Ok(capture) => {
                slot.capture = Some(capture);
                slot.mode = SourceMode::Camera;
                slot.file_path = None;
                self.commit_swap(&mut slot);
                info!(
                    "📷 视频源切换为摄像头 #{} (Gen: {})",
                    self.camera_index, slot.generation
                );
                Ok(slot.config())
            }
            Err(e) => {
                warn!("❌ 打开摄像头失败: {}", e);
                self.restore_previous(&mut slot, had_capture);
                Err(e)
            }
        }
    }

    /// 读取下一帧
    ///
    /// 文件播放到结尾时重新打开同一文件循环播放; 重开失败则本次返回 None,
    /// 下次调用再试。摄像头断开不自动重连。
    pub fn next_frame(&self) -> Option<SourceFrame> {
        let mut slot = self.lock();
        let generation = slot.generation;

        if slot.capture.is_none() {
            self.reopen_file(&mut slot)?;
        }

        if let Some(frame) = slot.capture.as_mut().and_then(|c| c.read()) {
            return Some(SourceFrame { frame, generation });
        }

        if slot.mode != SourceMode::File {
            return None;
        }

        // 文件结束 → 循环播放
        slot.release();
        self.reopen_file(&mut slot)?;
        slot.capture
            .as_mut()
            .and_then(|c| c.read())
            .map(|frame| SourceFrame { frame, generation })
    }

    fn reopen_file(&self, slot: &mut SourceSlot) -> Option<()> {
        if slot.mode != SourceMode::File {
            return None;
        }
        let path = slot.file_path.clone()?;
        match self.backend.open_file(&path) {
            Ok(capture) => {
                info!("🔁 视频文件循环播放: {}", path.display());
                slot.capture = Some(capture);
                Some(())
            }
            Err(e) => {
                warn!("⚠️ 视频文件重新打开失败: {}", e);
                None
            }
        }
    }

    pub fn config(&self) -> SourceConfig {
        self.lock().config()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// 释放当前句柄 (服务退出时)
    pub fn close(&self) {
        self.lock().release();
    }
}
