//! 峰宽 (峰直径) 自动估计.

use crate::consts::{DEFAULT_WINDOW_SIZE, WIDTH_LOW_FRACTION};
use crate::filter::blur_1d;
use crate::{Idx2d, ImageSlice, RectIter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 峰宽估计参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WidthOptions {
    /// 截取窗口边长.
    pub window_size: usize,

    /// 窗口中心 `(高, 宽)`. 为 `None` 时取去掉边缘后最亮的像素.
    pub center: Option<Idx2d>,

    /// 允许的最大峰宽. 为 `None` 时取 `window_size / 2`.
    pub max_width: Option<usize>,

    /// 低比例阈值, 相对于剖面 (去掉底部后) 的峰高.
    pub low_fraction: f64,

    /// 剖面平滑所用高斯核的标准差.
    pub smoothing_sigma: f64,
}

impl Default for WidthOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            center: None,
            max_width: None,
            low_fraction: WIDTH_LOW_FRACTION,
            smoothing_sigma: 1.0,
        }
    }
}

/// 以默认阈值估计峰宽. 返回 0 表示估计失败.
///
/// 见 [`estimate_width_with`].
pub fn estimate_width(image: ImageSlice, window_size: usize, center: Option<Idx2d>) -> usize {
    let opts = WidthOptions {
        window_size,
        center,
        ..Default::default()
    };
    estimate_width_with(image, &opts)
}

/// 估计峰宽 (峰的完整直径, 像素).
///
/// 取窗口中心所在行的强度剖面, 平滑后收集两类交叉点:
///
/// 1. 谷点, 即一阶差分由负变为非负的位置;
/// 2. 剖面穿过 `底部 + low_fraction * (峰高 - 底部)` 的位置 (线性插值到亚像素).
///
/// 取中心左右两侧最近的交叉点, 峰宽为二者之差 (四舍五入).
///
/// # 返回值
///
/// 任一侧不存在交叉点、峰宽小于 2 或超过最大峰宽时返回 0.
/// 0 只表示失败, 调用者不得将其当作真实峰宽. 本函数不会递归重试.
///
/// # 注意
///
/// `window_size` 小于 2 时程序 panic.
pub fn estimate_width_with(image: ImageSlice, opts: &WidthOptions) -> usize {
    assert!(opts.window_size >= 2, "窗口边长至少为 2");
    if image.is_empty() {
        return 0;
    }
    let max_width = opts.max_width.unwrap_or(opts.window_size / 2);
    let center = match opts.center {
        Some(c) if image.check(c) => c,
        Some(_) => return 0,
        None => match interior_argmax(&image, opts.window_size / 2) {
            Some(c) => c,
            None => return 0,
        },
    };

    let ((top, left), win) = image.clamped_window(center, opts.window_size);
    let profile: Vec<f64> = win.data().row(center.0 - top).to_vec();
    let smoothed = blur_1d(&profile, opts.smoothing_sigma);
    let mid = (center.1 - left) as f64;

    let crossings = valleys(&smoothed)
        .into_iter()
        .chain(level_crossings(&smoothed, opts.low_fraction));
    let (mut lo, mut hi) = (f64::NEG_INFINITY, f64::INFINITY);
    for c in crossings {
        if c < mid {
            lo = lo.max(c);
        } else if c > mid {
            hi = hi.min(c);
        }
    }
    if !lo.is_finite() || !hi.is_finite() {
        log::debug!("峰宽估计失败: 中心 {center:?} 一侧没有交叉点");
        return 0;
    }
    let width = (hi - lo).round() as usize;
    if width < 2 || width > max_width {
        log::debug!("峰宽估计失败: 估计值 {width} 不在 [2, {max_width}] 内");
        return 0;
    }
    width
}

/// 去掉 `margin` 宽的边缘后, 图像内部最亮的像素.
/// 边缘宽度会自动缩小, 以保证内部至少保留一行一列.
fn interior_argmax(image: &ImageSlice, margin: usize) -> Option<Idx2d> {
    let (h, w) = image.shape();
    let mh = margin.min((h - 1) / 2);
    let mw = margin.min((w - 1) / 2);
    image.argmax_within(RectIter::new((mh, mw), (h - 2 * mh, w - 2 * mw)))
}

/// 剖面的谷点位置 (一阶差分由负转为非负).
fn valleys(profile: &[f64]) -> Vec<f64> {
    profile
        .windows(3)
        .enumerate()
        .filter(|(_, v)| v[1] - v[0] < 0.0 && v[2] - v[1] >= 0.0)
        .map(|(i, _)| (i + 1) as f64)
        .collect()
}

/// 剖面穿过低比例阈值的亚像素位置.
fn level_crossings(profile: &[f64], fraction: f64) -> Vec<f64> {
    let floor = profile.iter().copied().fold(f64::INFINITY, f64::min);
    let top = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(top - floor).is_finite() || top <= floor {
        return vec![];
    }
    let level = floor + fraction * (top - floor);
    profile
        .windows(2)
        .enumerate()
        .filter_map(|(i, v)| {
            let (a, b) = (v[0] - level, v[1] - level);
            match (a < 0.0) != (b < 0.0) {
                true => Some(i as f64 + a / (a - b)),
                false => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::Lattice;
    use ndarray::Array2;

    #[test]
    fn test_lattice_width_is_generous() {
        let img = Lattice::square(256, 17).render();
        let w = estimate_width(img.as_immutable(), 64, None);
        // sigma = 5, 1/8 高度处的全宽约为 20.
        assert!((18..=23).contains(&w), "w = {w}");
    }

    #[test]
    fn test_explicit_center_and_max_width() {
        let img = Lattice::square(128, 17).render();
        let w = estimate_width(img.as_immutable(), 64, Some((48, 48)));
        assert!(w >= 18);

        let opts = WidthOptions {
            max_width: Some(10),
            center: Some((48, 48)),
            ..Default::default()
        };
        assert_eq!(estimate_width_with(img.as_immutable(), &opts), 0);

        let opts = WidthOptions {
            center: Some((500, 1)),
            ..Default::default()
        };
        assert_eq!(estimate_width_with(img.as_immutable(), &opts), 0);
    }

    #[test]
    fn test_flat_image_fails() {
        let flat = Array2::from_elem((80, 80), 3.0);
        assert_eq!(estimate_width(flat.view().into(), 64, None), 0);
        let empty = Array2::<f64>::zeros((0, 5));
        assert_eq!(estimate_width(empty.view().into(), 64, None), 0);
    }

    #[test]
    fn test_crossing_helpers() {
        let p = [4.0, 2.0, 1.0, 3.0, 5.0, 3.0, 0.0, 2.0];
        assert_eq!(valleys(&p), vec![2.0, 6.0]);
        let c = level_crossings(&[0.0, 0.0, 8.0, 8.0, 0.0], 0.5);
        assert_eq!(c, vec![1.5, 3.5]);
    }
}
