// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// FFmpeg解码过滤器模块
/// FFmpeg decode filter module
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use tracing::{debug, info, warn};

use crate::detection::types::DecodedFrame;

/// 帧投递策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// 阻塞投递, 不丢帧 (视频文件)
    Blocking,
    /// 队列满时丢弃新帧 (实时摄像头)
    DropWhenFull,
}

/// FFmpeg解码过滤器: 解码帧 (RGBA) → 有界通道
pub struct DecodeFilter {
    tx: Sender<DecodedFrame>,
    stop: Arc<AtomicBool>,
    delivery: Delivery,
    source_name: String,
    count: usize,
    last: Instant,
    pub current_fps: f64,
    pub dropped_frames: usize, // 丢弃的帧数
    pub total_frames: usize,   // 总帧数
}

impl DecodeFilter {
    pub fn new(
        tx: Sender<DecodedFrame>,
        stop: Arc<AtomicBool>,
        delivery: Delivery,
        source_name: String,
    ) -> Self {
        Self {
            tx,
            stop,
            delivery,
            source_name,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    /// 从 RGBA 平面逐行拷贝 (去掉行尾填充)
    fn copy_rgba(&mut self, frame: &Frame) -> Option<DecodedFrame> {
        unsafe {
            let raw = frame.as_ptr();
            if raw.is_null() || frame.is_empty() || frame.is_corrupt() {
                return None;
            }

            let w = (*raw).width;
            let h = (*raw).height;
            if w <= 0 || h <= 0 || w > 8192 || h > 8192 {
                if self.total_frames <= 10 {
                    warn!("⚠️ 丢弃帧 #{}: 非法分辨率 {}x{}", self.total_frames, w, h);
                }
                return None;
            }

            let plane = (*raw).data[0];
            let stride = (*raw).linesize[0];
            let row_bytes = w as usize * 4;
            if plane.is_null() || stride < row_bytes as i32 {
                if self.total_frames <= 10 {
                    warn!(
                        "⚠️ 丢弃帧 #{}: RGBA平面异常 stride={}",
                        self.total_frames, stride
                    );
                }
                return None;
            }

            let stride = stride as usize;
            let mut data = Vec::with_capacity(row_bytes * h as usize);
            for y in 0..h as usize {
                let row = std::slice::from_raw_parts(plane.add(y * stride), row_bytes);
                data.extend_from_slice(row);
            }

            DecodedFrame::new(data, w as u32, h as u32).ok()
        }
    }

    fn log_stats(&mut self) {
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 5.0 {
            self.current_fps = self.count as f64 / elapsed;
            let drop_rate = self.dropped_frames as f64 / self.total_frames.max(1) as f64 * 100.0;
            debug!(
                "📺 解码统计 [{}]: {:.1}fps | 总帧{} | 丢弃{} ({:.1}%)",
                self.source_name, self.current_fps, self.total_frames, self.dropped_frames, drop_rate
            );
            self.last = Instant::now();
            self.count = 0;
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 解码线程启动: {}", self.source_name);
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        // 句柄已释放 → 终止解码
        if self.stop.load(Ordering::Acquire) {
            return Err("capture released".to_string());
        }

        self.total_frames += 1;
        let Some(decoded) = self.copy_rgba(&frame) else {
            self.dropped_frames += 1;
            return Ok(None);
        };

        match self.delivery {
            Delivery::Blocking => {
                if self.tx.send(decoded).is_err() {
                    return Err("frame receiver dropped".to_string());
                }
            }
            Delivery::DropWhenFull => match self.tx.try_send(decoded) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => self.dropped_frames += 1,
                Err(TrySendError::Disconnected(_)) => {
                    return Err("frame receiver dropped".to_string());
                }
            },
        }

        self.count += 1;
        self.log_stats();
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!(
            "✅ 解码线程退出: {} (总帧{} | 丢弃{})",
            self.source_name, self.total_frames, self.dropped_frames
        );
    }
}
