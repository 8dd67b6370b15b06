// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// FFmpeg 解码后端 (视频文件 / 本地摄像头)
/// FFmpeg capture backend for files and local cameras
///
/// 每个已打开的句柄拥有一个解码线程, 解码帧经有界通道送出;
/// `read` 从通道拉取, `release` 通知线程退出并等待其结束。
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use tracing::{debug, info, warn};

use super::camera;
use super::capture::{CaptureBackend, VideoCapture};
use super::decode_filter::{DecodeFilter, Delivery};
use crate::detection::types::DecodedFrame;
use crate::error::SourceError;

/// 打开视频源的最长等待时间
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// 释放句柄时等待解码线程退出的时间
const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

/// 解码输入描述
#[derive(Clone, Debug)]
struct InputTarget {
    url: String,
    format: Option<&'static str>,
}

impl InputTarget {
    fn to_input(&self) -> Input {
        let input = Input::new(self.url.as_str());
        match self.format {
            Some(format) => input.set_format(format),
            None => input,
        }
    }
}

/// FFmpeg 采集句柄
pub struct FfmpegCapture {
    source_name: String,
    rx: Option<Receiver<DecodedFrame>>,
    stop: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    read_timeout: Duration,
    released: bool,
}

impl FfmpegCapture {
    /// 启动解码线程, 等待 FFmpeg 打开输入后返回
    fn spawn(
        target: InputTarget,
        delivery: Delivery,
        queue_capacity: usize,
        read_timeout: Duration,
    ) -> Result<Self, String> {
        let (tx, rx) = bounded::<DecodedFrame>(queue_capacity.max(1));
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let stop = Arc::new(AtomicBool::new(false));

        let source_name = target.url.clone();
        let thread_stop = Arc::clone(&stop);
        let thread_name = source_name.clone();

        thread::Builder::new()
            .name("zonecount-decode".to_string())
            .spawn(move || {
                let filter = DecodeFilter::new(tx, thread_stop, delivery, thread_name.clone());
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("decode", Box::new(filter));
                let out = create_null_output().add_frame_pipeline(pipe);

                let started = FfmpegContext::builder()
                    .input(target.to_input())
                    .filter_descs(["format=rgba"].into())
                    .output(out)
                    .build()
                    .map_err(|e| format!("构建失败: {}", e))
                    .and_then(|ctx| ctx.start().map_err(|e| format!("启动失败: {}", e)));

                match started {
                    Ok(sch) => {
                        let _ = ready_tx.send(Ok(()));
                        if let Err(e) = sch.wait() {
                            debug!("📹 解码结束 [{}]: {}", thread_name, e);
                        }
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
                let _ = done_tx.send(());
            })
            .map_err(|e| format!("无法创建解码线程: {}", e))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {
                info!("✅ 视频源已打开: {}", source_name);
                Ok(Self {
                    source_name,
                    rx: Some(rx),
                    stop,
                    done_rx,
                    read_timeout,
                    released: false,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                stop.store(true, Ordering::Release);
                Err("打开超时".to_string())
            }
        }
    }
}

impl VideoCapture for FfmpegCapture {
    fn read(&mut self) -> Option<DecodedFrame> {
        let rx = self.rx.as_ref()?;
        match rx.recv_timeout(self.read_timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) => {
                warn!("⏱️ 读取帧超时: {}", self.source_name);
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("📹 视频流结束: {}", self.source_name);
                None
            }
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.stop.store(true, Ordering::Release);
        // 关闭接收端, 解除阻塞中的投递
        self.rx = None;

        if self.done_rx.recv_timeout(RELEASE_TIMEOUT).is_err() {
            warn!("⚠️ 解码线程未及时退出: {}", self.source_name);
        } else {
            debug!("🛑 视频源已释放: {}", self.source_name);
        }
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.release();
    }
}

/// FFmpeg 采集后端
#[derive(Clone, Debug)]
pub struct FfmpegBackend {
    read_timeout: Duration,
    file_queue: usize,
    camera_queue: usize,
}

impl FfmpegBackend {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            file_queue: 4,
            camera_queue: 2,
        }
    }
}

impl CaptureBackend for FfmpegBackend {
    fn open_file(&self, path: &Path) -> Result<Box<dyn VideoCapture>, SourceError> {
        let url = path.to_string_lossy().into_owned();
        info!("🎬 打开视频文件: {}", url);

        let target = InputTarget {
            url: url.clone(),
            format: None,
        };
        FfmpegCapture::spawn(target, Delivery::Blocking, self.file_queue, self.read_timeout)
            .map(|capture| Box::new(capture) as Box<dyn VideoCapture>)
            .map_err(|reason| SourceError::OpenFailed {
                source_name: url,
                reason,
            })
    }

    fn open_camera(&self, index: u32) -> Result<Box<dyn VideoCapture>, SourceError> {
        let name = if cfg!(target_os = "windows") {
            camera::device_name(index)
        } else {
            None
        };
        let url = camera::camera_url(index, name.as_deref());
        info!("📷 打开摄像头 #{}: {} ({})", index, url, camera::camera_format());

        let target = InputTarget {
            url,
            format: Some(camera::camera_format()),
        };
        FfmpegCapture::spawn(
            target,
            Delivery::DropWhenFull,
            self.camera_queue,
            self.read_timeout,
        )
        .map(|capture| Box::new(capture) as Box<dyn VideoCapture>)
        .map_err(|reason| SourceError::CameraUnavailable { index, reason })
    }
}
