use crate::{ImageSlice, OwnedImage, RectIter};
use ndarray::Array2;
use ordered_float::OrderedFloat;

/// 就地求 `buf` 的中位数. 偶数个元素时取下中位数, 空切片返回 `None`.
///
/// `NaN` 按 [`OrderedFloat`] 规则视为最大值. 调用后 `buf` 的顺序被打乱.
pub fn median_of(buf: &mut [f64]) -> Option<f64> {
    if buf.is_empty() {
        return None;
    }
    let mid = (buf.len() - 1) / 2;
    let (_, m, _) = buf.select_nth_unstable_by_key(mid, |v| OrderedFloat(*v));
    Some(*m)
}

/// 中值绝对偏差 (MAD) 及中位数. 空切片返回 `None`.
pub fn median_abs_deviation(values: &[f64]) -> Option<(f64, f64)> {
    let mut buf = values.to_vec();
    let median = median_of(&mut buf)?;
    buf.iter_mut().for_each(|v| *v = (*v - median).abs());
    let mad = median_of(&mut buf)?;
    Some((median, mad))
}

/// 方形窗口中值滤波, 窗口边长为 `2 * radius + 1`.
///
/// 边界处只统计落在图像内的像素. `radius == 0` 时返回原图副本.
pub fn median_filter(image: ImageSlice, radius: usize) -> OwnedImage {
    if radius == 0 {
        return image.to_owned();
    }
    let shape = image.shape();
    let side = 2 * radius + 1;
    let mut buf = Vec::with_capacity(side * side);
    let data = Array2::from_shape_fn(shape, |pos| {
        buf.clear();
        buf.extend(RectIter::around(pos, radius, shape).map(|p| image[p]));
        // 窗口至少包含 `pos` 自身, 因此不会为空.
        median_of(&mut buf).unwrap_or(image[pos])
    });
    OwnedImage::from(data)
}
