//! 晶胞定位与裁剪.
//!
//! 用一个模板 (通常是手工选取的一个晶胞) 与原图做归一化互相关, 在相关峰处按模板尺寸裁剪,
//! 得到一个晶胞图像栈. 每个晶胞记录其裁剪原点, 以便把全图坐标系下的目标变换到晶胞内.

use crate::filter::normalized_cross_correlation;
use crate::peak::{correlation_peaks, Coordinate, Peak};
use crate::track::FrameOffset;
use crate::{ImageSlice, ImageStack, OwnedImage};
use ndarray::ArrayView2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 一个裁剪出的晶胞的来源信息.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellRecord {
    /// 来源图像的名字.
    pub parent: String,

    /// 来源图像在原图像栈中的下标.
    pub parent_index: usize,

    /// 在来源图像中的序号.
    pub local_index: usize,

    /// 裁剪原点, 即晶胞左上角在来源图像中的坐标 `(x, y)`.
    pub origin: Coordinate,

    /// 该处的互相关系数.
    pub score: f64,

    /// 是否在分析中排除.
    pub omit: bool,
}

impl CellRecord {
    /// 全图坐标系到该晶胞坐标系的平移.
    #[inline]
    pub fn offset(&self) -> FrameOffset {
        FrameOffset::from_origin(self.origin)
    }
}

/// 晶胞图像栈及每个晶胞的来源.
#[derive(Clone, Debug, PartialEq)]
pub struct CellStack {
    /// 晶胞图像, 名字为 `来源#序号`.
    pub cells: ImageStack,

    /// 与 `cells` 一一对应.
    pub records: Vec<CellRecord>,
}

impl CellStack {
    /// 晶胞个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否没有晶胞?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 每个晶胞的坐标系平移, 顺序与晶胞一致.
    pub fn offsets(&self) -> Vec<FrameOffset> {
        self.records.iter().map(CellRecord::offset).collect()
    }
}

/// 在图像中定位与 `template` 相似的区域.
///
/// 返回的 [`Peak`] 坐标为匹配区域的 **左上角**, 峰高为互相关系数.
/// 只保留系数位于闭区间 `height_range` 内的相关峰, 相关峰之间至少相隔模板短边的一半.
/// 按行优先排列.
pub fn locate_cells(image: ImageSlice, template: ArrayView2<f64>, height_range: (f64, f64)) -> Vec<Peak> {
    let (th, tw) = template.dim();
    let side = th.min(tw);
    if side == 0 {
        return vec![];
    }
    let corr = normalized_cross_correlation(image, template);
    let (lo, hi) = height_range;
    correlation_peaks(&corr, side, side as f64 / 2.0, 0.0)
        .into_iter()
        .filter(|p| lo <= p.height && p.height <= hi)
        .collect()
}

/// 对图像栈中每张图像定位晶胞并裁剪. 没有找到任何晶胞时返回 `None`.
///
/// 晶胞尺寸与模板一致, 且总是完整地落在来源图像内.
pub fn crop_cells(
    stack: &ImageStack,
    template: ArrayView2<f64>,
    height_range: (f64, f64),
) -> Option<CellStack> {
    let (th, tw) = template.dim();
    let mut images: Vec<(String, OwnedImage)> = Vec::new();
    let mut records = Vec::new();

    for (parent_index, image) in stack.slice_iter().enumerate() {
        let parent = stack.name_at(parent_index);
        let sites = locate_cells(image, template, height_range);
        log::debug!("{parent}: 找到 {} 个晶胞", sites.len());
        for (local_index, site) in sites.into_iter().enumerate() {
            let Some((top, left)) = site.position.to_pixel() else {
                continue;
            };
            images.push((
                format!("{parent}#{local_index}"),
                image.window((top, left), (th, tw)).to_owned(),
            ));
            records.push(CellRecord {
                parent: parent.to_string(),
                parent_index,
                local_index,
                origin: site.position,
                score: site.height,
                omit: false,
            });
        }
    }

    let cells = ImageStack::from_images(images)?;
    Some(CellStack { cells, records })
}
