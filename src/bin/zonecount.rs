// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 区域人数统计服务 (Zone Occupancy Service)
///
/// 视频文件/摄像头 → YOLOv8 检测 → ByteTrack 跟踪 → 区域计数
/// 处理周期由 HTTP 调用驱动 (POST /tracking/update)
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zonecount::input::list_video_devices;
use zonecount::web_api::{create_router, AppState};
use zonecount::{ByteTracker, FfmpegBackend, Pipeline, PipelineConfig, YoloDetector};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// 服务参数 (覆盖配置文件中的同名项)
#[derive(Parser, Debug)]
#[command(author, version, about = "区域人数统计服务", long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = zonecount::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 启动时打开的视频文件
    #[arg(short, long)]
    video: Option<String>,

    /// 启动时打开摄像头
    #[arg(long, default_value_t = false)]
    camera: bool,

    /// ONNX 检测模型
    #[arg(short, long)]
    model: Option<String>,

    /// 区域文件
    #[arg(short, long)]
    zones: Option<PathBuf>,

    /// 列出可用摄像头后退出
    #[arg(long, default_value_t = false)]
    list_devices: bool,
}

impl Args {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(video) = &self.video {
            config.default_video_path = Some(video.clone());
        }
        if let Some(model) = &self.model {
            config.detector.model_path = model.clone();
        }
        if let Some(zones) = &self.zones {
            config.zones_file = zones.clone();
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("zonecount=info,tower_http=info,ort=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️ 无法监听退出信号: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 收到退出信号");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    if args.list_devices {
        for device in list_video_devices() {
            println!("[{}] {}", device.index, device.name);
        }
        return Ok(());
    }

    info!("🎯 区域人数统计服务启动");

    let mut config = PipelineConfig::load(&args.config);
    args.apply(&mut config);
    config.log_summary();

    let detector = YoloDetector::new(&config.detector)?;
    let tracker = ByteTracker::new(config.tracker.clone());
    let backend = FfmpegBackend::new(Duration::from_millis(config.read_timeout_ms));

    let bind_addr = config.server.bind_addr();
    let default_video = config.default_video_path.clone();
    let pipeline = Arc::new(Pipeline::new(
        config,
        Box::new(backend),
        Box::new(detector),
        Box::new(tracker),
    ));

    // 初始视频源 (失败不影响服务启动)
    let startup = Arc::clone(&pipeline);
    let use_camera = args.camera;
    tokio::task::spawn_blocking(move || {
        let result = if use_camera {
            startup.set_camera_mode(true).map(|_| ())
        } else if let Some(video) = default_video {
            startup.set_file_source(&video).map(|_| ())
        } else {
            Ok(())
        };
        if let Err(e) = result {
            warn!("⚠️ 初始视频源打开失败: {}", e);
        }
    })
    .await?;

    let app = create_router(AppState::new(Arc::clone(&pipeline)));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("无法监听 {}", bind_addr))?;
    info!("🌐 HTTP 服务已启动: http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP 服务异常退出")?;

    tokio::task::spawn_blocking(move || pipeline.shutdown()).await?;
    info!("👋 服务已退出");
    Ok(())
}
