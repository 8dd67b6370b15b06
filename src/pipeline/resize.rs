// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 帧缩放: 任意分辨率 → 工作分辨率 (fast_image_resize, Bilinear)

use anyhow::{Context, Result};
use fast_image_resize as fr;

use crate::detection::types::DecodedFrame;

pub struct FrameResizer {
    resizer: fr::Resizer,
    width: u32,
    height: u32,
}

impl FrameResizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resizer: fr::Resizer::new(),
            width,
            height,
        }
    }

    pub fn target(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 缩放到工作分辨率 (尺寸一致时直接共享原帧)
    pub fn resize(&mut self, frame: &DecodedFrame) -> Result<DecodedFrame> {
        if frame.dimensions() == (self.width, self.height) {
            return Ok(frame.clone());
        }

        let src_image = fr::images::Image::from_vec_u8(
            frame.width,
            frame.height,
            frame.rgba_data.as_ref().clone(),
            fr::PixelType::U8x4,
        )
        .context("源图像创建失败")?;

        let mut dst_image = fr::images::Image::new(self.width, self.height, fr::PixelType::U8x4);

        self.resizer
            .resize(
                &src_image,
                &mut dst_image,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .context("帧缩放失败")?;

        DecodedFrame::new(dst_image.buffer().to_vec(), self.width, self.height)
    }
}
