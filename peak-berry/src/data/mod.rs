//! 图像与图像栈.

mod iter;
mod save;
mod slice;
mod window;

pub use iter::RectIter;
pub use save::ImgWriteVis;
pub use slice::{ImageSlice, OwnedImage};
pub use window::IntensityWindow;

use crate::Idx2d;
use ndarray::{Array3, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 按序排列、形状一致的二维图像栈.
///
/// 第 `i` 张图像对应第 `i` 个名字 (源文件名或晶胞名), 顺序是有语义的.
/// 底层数据形状为 `(深度, 高, 宽)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageStack {
    names: Vec<String>,
    data: Array3<f64>,
}

impl ImageStack {
    /// 直接初始化.
    ///
    /// 若名字个数与深度不一致, 则程序 panic.
    pub fn new(names: Vec<String>, data: Array3<f64>) -> Self {
        assert_eq!(names.len(), data.len_of(Axis(0)), "名字个数与图像个数不一致");
        Self { names, data }
    }

    /// 由一系列 `(名字, 图像)` 堆叠成图像栈.
    ///
    /// 若迭代器为空则返回 `None`; 若图像形状不一致, 则程序 panic.
    pub fn from_images<I, S>(images: I) -> Option<Self>
    where
        I: IntoIterator<Item = (S, OwnedImage)>,
        S: Into<String>,
    {
        let (names, images): (Vec<String>, Vec<OwnedImage>) =
            images.into_iter().map(|(n, i)| (n.into(), i)).unzip();
        let (h, w) = images.first()?.shape();
        let mut data = Array3::zeros((images.len(), h, w));
        for (mut dst, img) in data.axis_iter_mut(Axis(0)).zip(images.iter()) {
            assert_eq!(img.shape(), (h, w), "图像栈中的图像形状不一致");
            dst.assign(&img.as_immutable().data());
        }
        Some(Self { names, data })
    }

    /// 获得底层数据.
    #[inline]
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// 图像个数.
    #[inline]
    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 每张图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        let (_, h, w) = self.data.dim();
        (h, w)
    }

    /// 所有名字.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 第 `index` 张图像的名字. 越界时 panic.
    #[inline]
    pub fn name_at(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// 获取第 `index` 张图像. 越界时 panic.
    #[inline]
    pub fn slice_at(&self, index: usize) -> ImageSlice<'_> {
        ImageSlice::new(self.data.index_axis(Axis(0), index))
    }

    /// 获取能按顺序迭代所有图像的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = ImageSlice<'_>> {
        self.data.axis_iter(Axis(0)).map(ImageSlice::new)
    }

    /// 逐像素平均图像. 空栈返回全零图像.
    pub fn average(&self) -> OwnedImage {
        match self.data.mean_axis(Axis(0)) {
            Some(avg) => OwnedImage::from(avg),
            None => OwnedImage::zeros(self.shape()),
        }
    }

    /// 将每张图像展平为一行, 得到形状为 `(深度, 高 * 宽)` 的观测矩阵.
    pub fn flatten(&self) -> ndarray::Array2<f64> {
        let (d, h, w) = self.data.dim();
        let mut out = ndarray::Array2::zeros((d, h * w));
        for (mut row, img) in out.axis_iter_mut(Axis(0)).zip(self.data.axis_iter(Axis(0))) {
            row.iter_mut().zip(img.iter()).for_each(|(o, &v)| *o = v);
        }
        out
    }

    /// 按顺序对每张图像实施 `op` 操作, 收集其结果.
    pub fn map_indexed<T, F>(&self, op: F) -> Vec<T>
    where
        F: Fn(usize, ImageSlice) -> T,
    {
        self.slice_iter().enumerate().map(|(i, s)| op(i, s)).collect()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl ImageStack {
    /// 借助 `rayon`, 并行地对每张图像实施 `op` 操作, 结果按图像顺序收集.
    pub fn par_map_indexed<T, F>(&self, op: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize, ImageSlice) -> T + Sync + Send,
    {
        self.data
            .axis_iter(Axis(0))
            .into_par_iter()
            .enumerate()
            .map(|(i, v)| op(i, ImageSlice::new(v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn stack() -> ImageStack {
        let a = OwnedImage::from(Array2::from_elem((2, 3), 1.0));
        let b = OwnedImage::from(Array2::from_shape_fn((2, 3), |(h, w)| (h * 3 + w) as f64));
        ImageStack::from_images([("a", a), ("b", b)]).unwrap()
    }

    #[test]
    fn test_from_images_and_access() {
        let s = stack();
        assert_eq!(s.depth(), 2);
        assert_eq!(s.shape(), (2, 3));
        assert_eq!(s.name_at(1), "b");
        assert_eq!(s.slice_at(1)[(1, 2)], 5.0);
        assert_eq!(s.slice_iter().len(), 2);
        assert!(ImageStack::from_images(Vec::<(String, OwnedImage)>::new()).is_none());
    }

    #[test]
    fn test_average_and_flatten() {
        let s = stack();
        let avg = s.average();
        assert_eq!(avg.as_immutable()[(0, 0)], 0.5);
        assert_eq!(avg.as_immutable()[(1, 2)], 3.0);

        let flat = s.flatten();
        assert_eq!(flat.dim(), (2, 6));
        assert_eq!(flat[(1, 4)], 4.0);
    }

    #[test]
    #[should_panic]
    fn test_shape_mismatch_panics() {
        let a = OwnedImage::zeros((2, 2));
        let b = OwnedImage::zeros((2, 3));
        ImageStack::from_images([("a", a), ("b", b)]);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_map_matches_serial() {
        let s = stack();
        let serial = s.map_indexed(|i, img| i as f64 + img.mean());
        let parallel = s.par_map_indexed(|i, img| i as f64 + img.mean());
        assert_eq!(serial, parallel);
    }
}
