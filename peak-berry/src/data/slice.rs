use super::iter::RectIter;
use crate::Idx2d;
use ndarray::iter::Iter;
use ndarray::{s, Array2, ArrayView2, Ix2};
use std::ops::Index;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 不可变、借用的二维强度图像.
///
/// 所有检测/表征算法都以该结构作为输入, 因而不会修改调用者的数据.
#[derive(Copy, Clone, Debug)]
pub struct ImageSlice<'a> {
    /// 底层数据的轻量级视图.
    ///
    /// 这里有意把代码写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, f64>,
}

impl Index<Idx2d> for ImageSlice<'_> {
    type Output = f64;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl<'a> From<ArrayView2<'a, f64>> for ImageSlice<'a> {
    #[inline]
    fn from(data: ArrayView2<'a, f64>) -> Self {
        Self::new(data)
    }
}

impl<'a> ImageSlice<'a> {
    /// 直接初始化.
    #[inline]
    pub fn new(data: ArrayView2<'a, f64>) -> Self {
        Self { data }
    }

    /// 获得数据的一份不可变 shallow copy. 生命周期与原图一致.
    #[inline]
    pub fn data(&self) -> ArrayView2<'a, f64> {
        self.data
    }

    /// 获取可以迭代图像像素的迭代器.
    #[inline]
    pub fn iter(&self) -> Iter<'_, f64, Ix2> {
        self.data.iter()
    }

    /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&f64> {
        self.data.get(pos)
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 图像高度 (行数).
    #[inline]
    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// 图像宽度 (列数).
    #[inline]
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    /// 图像的像素个数.
    #[inline]
    pub fn size(&self) -> usize {
        let (h, w) = self.shape();
        h * w
    }

    /// 图像是否不含任何像素?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// 判断一个索引是否合法 (未越界).
    #[inline]
    pub fn check(&self, (h, w): Idx2d) -> bool {
        let (h_len, w_len) = self.shape();
        h < h_len && w < w_len
    }

    /// 以行优先规则, 获取能迭代图像所有 `(索引, 强度)` 的迭代器.
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &f64)> {
        self.data.indexed_iter()
    }

    /// 以行优先规则迭代图像所有索引.
    #[inline]
    pub fn pos_iter(&self) -> RectIter {
        RectIter::new((0, 0), self.shape())
    }

    /// 图像最大强度. `NaN` 被忽略; 空图像返回 `f64::NEG_INFINITY`.
    pub fn max_value(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// 图像最小强度. `NaN` 被忽略; 空图像返回 `f64::INFINITY`.
    pub fn min_value(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// 图像平均强度. 空图像返回 0.
    pub fn mean(&self) -> f64 {
        self.data.mean().unwrap_or(0.0)
    }

    /// 在 `region` 内寻找强度最大的像素, 相同最大值取行优先序中的第一个.
    /// 区域内全部为 `NaN` 或区域为空时返回 `None`.
    pub fn argmax_within(&self, region: RectIter) -> Option<Idx2d> {
        let mut best: Option<(Idx2d, f64)> = None;
        for pos in region {
            let v = self.data[pos];
            match best {
                _ if v.is_nan() => {}
                Some((_, b)) if b >= v => {}
                _ => best = Some((pos, v)),
            }
        }
        best.map(|(pos, _)| pos)
    }

    /// 截取左上角为 `top_left`、大小为 `shape` 的子图.
    ///
    /// 当子图越界时 panic.
    pub fn window(&self, (top, left): Idx2d, (h, w): Idx2d) -> ImageSlice<'a> {
        assert!(
            top + h <= self.height() && left + w <= self.width(),
            "子图越界"
        );
        ImageSlice::new(self.data.slice_move(s![top..top + h, left..left + w]))
    }

    /// 截取以 `center` 为中心、边长为 `side` 的正方形子图.
    ///
    /// 子图越界时会整体平移回图像内部 (而不是截断), 以保持大小不变;
    /// 仅当图像本身小于 `side` 时, 该方向的边长才会缩小为图像尺寸.
    /// 返回子图的左上角和子图本身.
    pub fn clamped_window(&self, center: Idx2d, side: usize) -> (Idx2d, ImageSlice<'a>) {
        let (h_len, w_len) = self.shape();
        let (side_h, side_w) = (side.min(h_len), side.min(w_len));
        let top = center.0.saturating_sub(side / 2).min(h_len - side_h);
        let left = center.1.saturating_sub(side / 2).min(w_len - side_w);
        ((top, left), self.window((top, left), (side_h, side_w)))
    }

    /// 克隆自己, 获得一个拥有所有权的图像对象.
    pub fn to_owned(&self) -> OwnedImage {
        OwnedImage {
            data: self.data.to_owned(),
        }
    }
}

/// 拥有所有权的二维强度图像.
///
/// `OwnedImage` 仅提供到 `ImageSlice` 的轻量转换、底层数据移动和文件读取,
/// 不提供任何其它方法.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OwnedImage {
    data: Array2<f64>,
}

impl From<Array2<f64>> for OwnedImage {
    #[inline]
    fn from(data: Array2<f64>) -> Self {
        Self { data }
    }
}

impl OwnedImage {
    /// 创建给定大小 (高, 宽) 的全零图像.
    #[inline]
    pub fn zeros(shape: Idx2d) -> Self {
        Self {
            data: Array2::zeros(shape),
        }
    }

    /// 以灰度方式打开图像文件, 强度归一化到 `[0, 1]`.
    pub fn open<P: AsRef<Path>>(path: P) -> image::ImageResult<Self> {
        let gray = image::open(path)?.to_luma16();
        let (w, h) = gray.dimensions();
        let data = Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            f64::from(gray.get_pixel(x as u32, y as u32).0[0]) / f64::from(u16::MAX)
        });
        Ok(Self { data })
    }

    /// 获得不可变图像引用.
    #[inline]
    pub fn as_immutable(&self) -> ImageSlice<'_> {
        ImageSlice::new(self.data.view())
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<f64> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ramp(h: usize, w: usize) -> Array2<f64> {
        Array2::from_shape_fn((h, w), |(i, j)| (i * w + j) as f64)
    }

    #[test]
    fn test_clamped_window_shifts_instead_of_truncating() {
        let arr = ramp(10, 12);
        let img = ImageSlice::new(arr.view());

        let ((top, left), win) = img.clamped_window((0, 11), 4);
        assert_eq!((top, left), (0, 8));
        assert_eq!(win.shape(), (4, 4));
        assert_eq!(win[(0, 0)], arr[(0, 8)]);

        let ((top, left), win) = img.clamped_window((5, 5), 4);
        assert_eq!((top, left), (3, 3));
        assert_eq!(win[(2, 2)], arr[(5, 5)]);
    }

    #[test]
    fn test_clamped_window_smaller_image() {
        let arr = ramp(3, 20);
        let img = ImageSlice::new(arr.view());
        let ((top, left), win) = img.clamped_window((1, 10), 8);
        assert_eq!(win.shape(), (3, 8));
        assert_eq!((top, left), (0, 6));
    }

    #[test]
    fn test_statistics_and_argmax() {
        let mut arr = ramp(4, 5);
        arr[(1, 1)] = 100.0;
        arr[(3, 4)] = 100.0;
        arr[(0, 0)] = f64::NAN;
        let img = ImageSlice::new(arr.view());
        assert_eq!(img.max_value(), 100.0);
        assert_eq!(img.min_value(), 1.0);
        assert_eq!(img.argmax_within(img.pos_iter()), Some((1, 1)));
        assert_eq!(
            img.argmax_within(RectIter::new((2, 0), (2, 5))),
            Some((3, 4))
        );
        assert_eq!(img.argmax_within(RectIter::new((0, 0), (0, 5))), None);
    }

    #[test]
    fn test_owned_round_trip() {
        let arr = ramp(2, 3);
        let owned = ImageSlice::new(arr.view()).to_owned();
        assert_eq!(owned.shape(), (2, 3));
        assert_eq!(owned.as_immutable().mean(), 2.5);
        assert_eq!(owned.into_raw(), arr);
    }
}
