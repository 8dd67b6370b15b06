// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器 (Detector)
//! 职责: 工作分辨率帧 → YOLO检测 → 检测框列表

use anyhow::{anyhow, Context, Result};
use image::imageops;
use ndarray::{s, ArrayViewD, Axis, IxDyn};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use tracing::{debug, info};

use super::types::{BBox, DecodedFrame, Detection};
use crate::config::DetectorConfig;
use crate::non_max_suppression;

/// 目标检测能力接口
///
/// 输入为工作分辨率的帧, 返回置信度不低于 `conf_threshold` 的检测框,
/// 坐标位于该帧的像素坐标系。
pub trait Detector: Send {
    fn detect(&mut self, frame: &DecodedFrame, conf_threshold: f32) -> Result<Vec<Detection>>;
}

const CXYWH_OFFSET: usize = 4;

/// YOLOv8 ONNX 检测器
pub struct YoloDetector {
    session: Session,
    input_size: u32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        info!("📦 加载检测模型: {}", config.model_path);

        let mut builder = Session::builder()?;
        if config.use_cuda {
            info!("⚡ 启用 CUDA 推理 (device {})", config.device_id);
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(config.device_id)
                .build()])?;
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("检测模型加载失败: {}", config.model_path))?;

        info!("✅ YOLOv8 检测模型加载成功");

        Ok(Self {
            session,
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
        })
    }

    /// 缩放比例 (保持长宽比, 左上角对齐)
    fn ratio(&self, w0: u32, h0: u32) -> f32 {
        let size = self.input_size as f32;
        (size / w0 as f32).min(size / h0 as f32)
    }

    /// 预处理: RGBA帧 → NCHW张量 (填充值 144/255)
    fn preprocess(&self, frame: &DecodedFrame) -> Result<Vec<f32>> {
        let size = self.input_size as usize;
        let plane = size * size;
        let mut xs = vec![144.0 / 255.0; 3 * plane];

        let img = frame.to_image()?;
        let ratio = self.ratio(frame.width, frame.height);
        let w_new = ((frame.width as f32 * ratio).round() as u32).clamp(1, self.input_size);
        let h_new = ((frame.height as f32 * ratio).round() as u32).clamp(1, self.input_size);
        let img = if (w_new, h_new) == (frame.width, frame.height) {
            img
        } else {
            imageops::resize(&img, w_new, h_new, imageops::FilterType::Triangle)
        };

        for (x, y, rgba) in img.enumerate_pixels() {
            let offset = y as usize * size + x as usize;
            let [r, g, b, _] = rgba.0;
            xs[offset] = (r as f32) / 255.0;
            xs[plane + offset] = (g as f32) / 255.0;
            xs[2 * plane + offset] = (b as f32) / 255.0;
        }

        Ok(xs)
    }

    fn infer(&mut self, xs: Vec<f32>) -> Result<(Vec<usize>, Vec<f32>)> {
        let size = self.input_size as usize;
        let shape = [1, 3, size, size];
        let input = Value::from_array((shape.as_slice(), xs.into_boxed_slice()))?;
        let outputs = self.session.run(ort::inputs!["images" => input])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims = shape.iter().map(|&d| d as usize).collect::<Vec<_>>();
        Ok((dims, data.to_vec()))
    }
}

/// 后处理: [1, 4 + nc, anchors] → 检测框 (坐标还原到原始帧)
pub fn decode_yolo_output(
    dims: &[usize],
    data: &[f32],
    frame_size: (u32, u32),
    input_size: u32,
    conf_threshold: f32,
    iou_threshold: f32,
) -> Result<Vec<Detection>> {
    let preds = ArrayViewD::from_shape(IxDyn(dims), data).context("模型输出形状异常")?;
    if preds.ndim() != 3 || dims[1] <= CXYWH_OFFSET {
        return Err(anyhow!("不支持的模型输出形状: {:?}", dims));
    }
    let nc = dims[1] - CXYWH_OFFSET;

    let (w0, h0) = frame_size;
    let width_original = w0 as f32;
    let height_original = h0 as f32;
    let ratio = (input_size as f32 / width_original).min(input_size as f32 / height_original);

    let mut detections = Vec::new();
    let anchor = preds.index_axis(Axis(0), 0);
    for pred in anchor.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);

        let Some((id, &confidence)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };

        if confidence < conf_threshold {
            continue;
        }

        let cx = bbox[0] / ratio;
        let cy = bbox[1] / ratio;
        let w = bbox[2] / ratio;
        let h = bbox[3] / ratio;
        let x1 = (cx - w / 2.).clamp(0.0, width_original);
        let y1 = (cy - h / 2.).clamp(0.0, height_original);
        let x2 = (cx + w / 2.).clamp(0.0, width_original);
        let y2 = (cy + h / 2.).clamp(0.0, height_original);

        detections.push(Detection::new(BBox::new(x1, y1, x2, y2), confidence, id));
    }

    non_max_suppression(&mut detections, iou_threshold);
    Ok(detections)
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &DecodedFrame, conf_threshold: f32) -> Result<Vec<Detection>> {
        let xs = self.preprocess(frame)?;
        let (dims, data) = self.infer(xs)?;
        let detections = decode_yolo_output(
            &dims,
            &data,
            frame.dimensions(),
            self.input_size,
            conf_threshold,
            self.iou_threshold,
        )?;
        debug!("🔍 原始检测: {}个", detections.len());
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造 [1, 4 + nc, anchors] 的输出张量
    fn fake_output(nc: usize, anchors: &[([f32; 4], usize, f32)]) -> (Vec<usize>, Vec<f32>) {
        let n = anchors.len();
        let rows = CXYWH_OFFSET + nc;
        let mut data = vec![0.0f32; rows * n];
        for (i, (cxywh, class_id, conf)) in anchors.iter().enumerate() {
            for (r, v) in cxywh.iter().enumerate() {
                data[r * n + i] = *v;
            }
            data[(CXYWH_OFFSET + class_id) * n + i] = *conf;
        }
        (vec![1, rows, n], data)
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        let (dims, data) = fake_output(
            3,
            &[
                ([100.0, 100.0, 40.0, 80.0], 0, 0.9),
                ([300.0, 200.0, 40.0, 80.0], 2, 0.4),
            ],
        );
        let dets = decode_yolo_output(&dims, &data, (640, 480), 640, 0.5, 0.45).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_name, "person");
        assert_eq!(dets[0].bbox, BBox::new(80.0, 60.0, 120.0, 140.0));
    }

    #[test]
    fn test_decode_rescales_letterboxed_coordinates() {
        // 1280x960 帧在 640 输入下缩放比例为 0.5
        let (dims, data) = fake_output(1, &[([100.0, 100.0, 20.0, 40.0], 0, 0.8)]);
        let dets = decode_yolo_output(&dims, &data, (1280, 960), 640, 0.5, 0.45).unwrap();
        assert_eq!(dets[0].bbox, BBox::new(180.0, 160.0, 220.0, 240.0));
    }

    #[test]
    fn test_decode_applies_nms() {
        let (dims, data) = fake_output(
            1,
            &[
                ([100.0, 100.0, 40.0, 80.0], 0, 0.9),
                ([101.0, 100.0, 40.0, 80.0], 0, 0.7),
            ],
        );
        let dets = decode_yolo_output(&dims, &data, (640, 480), 640, 0.5, 0.45).unwrap();
        assert_eq!(dets.len(), 1);
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        assert!(decode_yolo_output(&[1, 4, 2], &[0.0; 8], (640, 480), 640, 0.5, 0.45).is_err());
    }
}
