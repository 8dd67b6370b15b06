// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 多目标跟踪公共组件
//! Common components for multi-object tracking

use anyhow::Result;

use super::types::{BBox, DecodedFrame, Detection};

// ========== 公共数据结构 ==========

/// 跟踪输出 (统一的跟踪结果)
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    /// 唯一跟踪ID
    pub id: u32,

    /// 当前边界框 (滤波平滑后)
    pub bbox: BBox,

    /// 最近一次匹配的检测类别
    pub class_name: Option<String>,

    /// 本帧匹配到的检测置信度 (未匹配时为 None)
    pub confidence: Option<f32>,

    /// 是否已确认 (未确认的候选轨迹不对外报告)
    pub confirmed: bool,
}

// ========== 卡尔曼滤波器 ==========

/// 简化卡尔曼滤波器 (用于单个边界框的位置和尺寸平滑)
/// 状态向量: [x_center, y_center, width, height, vx, vy, vw, vh]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    /// 状态估计: [cx, cy, w, h, vx, vy, vw, vh]
    state: [f32; 8],

    /// 估计误差协方差 (简化为对角阵)
    p: [f32; 8],

    /// 过程噪声 (运动不确定性)
    q: f32,

    /// 观测噪声 (测量不确定性)
    r: f32,

    /// 速度衰减因子 (0.9-0.99)
    velocity_decay: f32,

    /// 静止阈值 (像素/帧)
    stationary_threshold: f32,

    /// 连续静止帧数计数器
    stationary_count: u32,
}

impl KalmanBoxFilter {
    /// 创建新的卡尔曼滤波器
    ///
    /// # 参数
    /// - `bbox`: 初始边界框
    /// - `q`: 过程噪声 (0.1-1.0, 越小越平滑)
    /// - `r`: 观测噪声 (越大越平滑)
    pub fn new(bbox: &BBox, q: f32, r: f32) -> Self {
        let (cx, cy) = bbox.center();

        Self {
            state: [cx, cy, bbox.width(), bbox.height(), 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q,
            r,
            velocity_decay: 0.95,
            stationary_threshold: 2.0,
            stationary_count: 0,
        }
    }

    /// 预测下一帧状态 (匀速运动模型 + 速度衰减)
    pub fn predict(&mut self) {
        let speed = (self.state[4] * self.state[4] + self.state[5] * self.state[5]).sqrt();
        let is_stationary = speed < self.stationary_threshold;

        if is_stationary {
            self.stationary_count += 1;
            // 连续静止3帧后大幅衰减速度
            let decay = if self.stationary_count > 3 {
                0.7
            } else {
                self.velocity_decay
            };
            for v in &mut self.state[4..8] {
                *v *= decay;
            }
        } else {
            self.stationary_count = 0;
            self.state[4] *= self.velocity_decay;
            self.state[5] *= self.velocity_decay;
            self.state[6] *= 0.98; // 尺寸变化更慢
            self.state[7] *= 0.98;
        }

        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }

        // P = P + Q (静止时减小过程噪声)
        let q_factor = if is_stationary { 0.5 } else { 1.0 };
        for p in &mut self.p {
            *p += self.q * q_factor;
        }
    }

    /// 更新 (融合观测值,自适应噪声调整)
    pub fn update(&mut self, bbox: &BBox) {
        let (cx, cy) = bbox.center();
        let y = [
            cx - self.state[0],
            cy - self.state[1],
            bbox.width() - self.state[2],
            bbox.height() - self.state[3],
        ];

        let residual_norm = (y[0] * y[0] + y[1] * y[1]).sqrt();
        let adaptive_r = if residual_norm < self.stationary_threshold {
            self.r * 0.3
        } else if residual_norm < 10.0 {
            self.r
        } else {
            // 大幅跳变:更信任预测值
            self.r * 3.0
        };

        // K = P / (P + R), 速度分量使用更大的观测噪声
        let mut k = [0.0f32; 8];
        for i in 0..8 {
            let r = if i < 4 { adaptive_r } else { adaptive_r * 10.0 };
            k[i] = self.p[i] / (self.p[i] + r);
        }

        for i in 0..4 {
            self.state[i] += k[i] * y[i];
        }

        let velocity_gain = if residual_norm < self.stationary_threshold {
            0.3
        } else {
            1.0
        };
        for i in 0..4 {
            self.state[i + 4] += k[i + 4] * y[i] * velocity_gain;
        }

        // P = (I - K) * P
        for i in 0..8 {
            self.p[i] *= 1.0 - k[i];
        }

        if residual_norm >= self.stationary_threshold {
            self.stationary_count = 0;
        }
    }

    /// 获取当前状态的边界框
    pub fn state_bbox(&self) -> BBox {
        let [cx, cy, w, h, ..] = self.state;
        Self::bbox_from(cx, cy, w, h)
    }

    /// 获取预测的边界框 (用于匹配)
    pub fn predicted_bbox(&self) -> BBox {
        Self::bbox_from(
            self.state[0] + self.state[4],
            self.state[1] + self.state[5],
            self.state[2] + self.state[6],
            self.state[3] + self.state[7],
        )
    }

    fn bbox_from(cx: f32, cy: f32, w: f32, h: f32) -> BBox {
        let w = w.max(1.0);
        let h = h.max(1.0);
        BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }
}

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
///
/// 所有跟踪算法都应实现此接口。跟踪器内部状态对调用方不透明,
/// 只通过 `update` 的输出 (含确认标记) 与 `reset` 交互。
pub trait Tracker: Send {
    /// 更新跟踪器
    ///
    /// # 参数
    /// - `detections`: 当前帧已通过准入过滤的检测框
    /// - `frame`: 当前帧 (工作分辨率, 供外观特征类跟踪器使用)
    ///
    /// # 返回
    /// 当前所有存活的轨迹 (含未确认的候选)
    fn update(&mut self, detections: &[Detection], frame: &DecodedFrame) -> Result<Vec<Track>>;

    /// 重置跟踪器 (清除所有跟踪, ID 重新分配)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

// ========== 工具函数 ==========

/// 计算两个边界框的IOU (Intersection over Union)
pub fn compute_iou(bbox1: &BBox, bbox2: &BBox) -> f32 {
    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = bbox1.area() + bbox2.area() - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((compute_iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(compute_iou(&a, &BBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_kalman_initial_state_matches_bbox() {
        let bbox = BBox::new(100.0, 50.0, 140.0, 150.0);
        let kf = KalmanBoxFilter::new(&bbox, 0.1, 0.5);
        let s = kf.state_bbox();
        assert!((s.x1 - 100.0).abs() < 1e-4);
        assert!((s.y2 - 150.0).abs() < 1e-4);
    }

    #[test]
    fn test_kalman_follows_motion() {
        let mut kf = KalmanBoxFilter::new(&BBox::new(0.0, 0.0, 20.0, 40.0), 0.1, 0.5);
        for step in 1..=10 {
            kf.predict();
            let dx = step as f32 * 5.0;
            kf.update(&BBox::new(dx, 0.0, dx + 20.0, 40.0));
        }
        let (cx, _) = kf.state_bbox().center();
        // 最后一次观测中心为 60
        assert!((cx - 60.0).abs() < 5.0, "cx = {}", cx);
        // 预测框应继续向右
        assert!(kf.predicted_bbox().center().0 > cx);
    }
}
