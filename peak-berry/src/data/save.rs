//! 图像的持久化存储.

use crate::consts::gray::BLACK;
use crate::{ImageSlice, IntensityWindow, OwnedImage};
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 图像不会 "as is" 保存: 实数强度会先按图像自身的强度范围
/// ([`IntensityWindow::fit`]) 线性映射到 8-bit 灰度. 强度恒定的图像保存为全黑.
pub trait ImgWriteVis {
    /// 按照可视化规则将图片保存到 `path` 路径. 文件格式由扩展名决定.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

impl ImgWriteVis for ImageSlice<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let window = IntensityWindow::fit(self);
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &v) in self.indexed_iter() {
            let gray = window.and_then(|win| win.eval(v)).unwrap_or(BLACK);
            buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
        }
        buf.save(path)
    }
}

impl ImgWriteVis for OwnedImage {
    #[inline]
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        self.as_immutable().save(path)
    }
}
