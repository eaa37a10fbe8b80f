//! 峰宽估计与峰定位.

mod locate;
mod spatial;
mod width;

pub use locate::{find_peaks, find_peaks_with, LocateOptions, PeakSet, Separation, WidthSource};
pub(crate) use locate::correlation_peaks;
pub use spatial::KdTree;
pub use width::{estimate_width, estimate_width_with, WidthOptions};

use crate::Idx2d;
use std::ops::{Add, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 图像像素坐标 `(x, y)`, 即 `(列, 行)`, 允许亚像素精度.
///
/// 同时也用作二维位移向量.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    /// 列方向坐标.
    pub x: f64,

    /// 行方向坐标.
    pub y: f64,
}

impl Coordinate {
    /// 直接初始化.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 所有分量都是 `NaN` 的坐标, 用作 "无意义位移" 的哨兵.
    #[inline]
    pub const fn nan() -> Self {
        Self::new(f64::NAN, f64::NAN)
    }

    /// 由 `(高, 宽)` 索引转换.
    #[inline]
    pub fn from_pixel((h, w): Idx2d) -> Self {
        Self::new(w as f64, h as f64)
    }

    /// 四舍五入到最近的 `(高, 宽)` 索引. 负数或非有限坐标返回 `None`.
    #[inline]
    pub fn to_pixel(&self) -> Option<Idx2d> {
        let (x, y) = (self.x.round(), self.y.round());
        if x.is_finite() && y.is_finite() && x >= 0.0 && y >= 0.0 {
            Some((y as usize, x as usize))
        } else {
            None
        }
    }

    /// 欧氏距离.
    #[inline]
    pub fn distance(&self, other: &Coordinate) -> f64 {
        (*self - *other).norm()
    }

    /// 作为向量的模长.
    #[inline]
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// 两个分量是否都是有限值?
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Coordinate {
    type Output = Coordinate;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Coordinate::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Coordinate {
    type Output = Coordinate;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Coordinate::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// 一个检测到的峰: 坐标及该处强度.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Peak {
    /// 峰坐标.
    pub position: Coordinate,

    /// 峰高, 即 (滤波后) 图像在最近像素处的强度.
    pub height: f64,
}

#[cfg(test)]
mod tests {
    use super::Coordinate;

    #[test]
    fn test_pixel_conversion() {
        let c = Coordinate::from_pixel((3, 7));
        assert_eq!(c, Coordinate::new(7.0, 3.0));
        assert_eq!(Coordinate::new(6.6, 2.4).to_pixel(), Some((2, 7)));
        assert_eq!(Coordinate::new(-0.6, 2.0).to_pixel(), None);
        assert_eq!(Coordinate::nan().to_pixel(), None);
    }

    #[test]
    fn test_vector_ops() {
        let a = Coordinate::new(1.0, 2.0);
        let b = Coordinate::new(4.0, 6.0);
        assert_eq!(b - a, Coordinate::new(3.0, 4.0));
        assert_eq!(a.distance(&b), 5.0);
        assert_eq!((a + b).x, 5.0);
        assert!(!Coordinate::nan().is_finite());
    }
}
