//! 图像矩.

use crate::ImageSlice;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 区域的原点矩 (一阶) 与中心矩 (二阶, 三阶).
///
/// `x` 为列方向, `y` 为行方向, 原点为区域左上角像素.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Moments {
    /// 零阶矩, 即总强度. 同时也是 `mu00`.
    pub m00: f64,
    /// 一阶原点矩 `Σ x·I`.
    pub m10: f64,
    /// 一阶原点矩 `Σ y·I`.
    pub m01: f64,
    /// 二阶中心矩 `Σ (x-x̄)(y-ȳ)·I`.
    pub mu11: f64,
    /// 二阶中心矩 `Σ (x-x̄)²·I`.
    pub mu20: f64,
    /// 二阶中心矩 `Σ (y-ȳ)²·I`.
    pub mu02: f64,
    /// 三阶中心矩 `Σ (x-x̄)³·I`.
    pub mu30: f64,
    /// 三阶中心矩 `Σ (y-ȳ)³·I`.
    pub mu03: f64,
}

impl Moments {
    /// 质心 `(x̄, ȳ)`, 由一阶原点矩得到.
    #[inline]
    pub fn centroid(&self) -> (f64, f64) {
        (self.m10 / self.m00, self.m01 / self.m00)
    }
}

/// 计算矩失败.
#[derive(Debug, Clone, PartialEq)]
pub enum MomentError {
    /// 区域为空, 或总强度不为正 (或不是有限值), 无法归一化.
    Degenerate,
}

impl fmt::Display for MomentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MomentError::Degenerate => write!(f, "区域退化, 无法计算矩"),
        }
    }
}

impl std::error::Error for MomentError {}

/// 矩计算结果.
pub type MomentResult<T> = Result<T, MomentError>;

/// 给定强度区域, 计算三阶以内的矩.
///
/// 实现必须在 `m00 <= 0` 时返回 [`MomentError::Degenerate`], 而不是做除法.
pub trait MomentPrimitive {
    /// 计算 `patch` 的矩.
    fn moments(&self, patch: ImageSlice) -> MomentResult<Moments>;
}

/// 直接逐像素累加的矩计算.
#[derive(Copy, Clone, Debug, Default)]
pub struct DirectMoments;

impl MomentPrimitive for DirectMoments {
    fn moments(&self, patch: ImageSlice) -> MomentResult<Moments> {
        let (mut m00, mut m10, mut m01) = (0.0, 0.0, 0.0);
        for ((r, c), &v) in patch.indexed_iter() {
            m00 += v;
            m10 += c as f64 * v;
            m01 += r as f64 * v;
        }
        if patch.is_empty() || !m00.is_finite() || m00 <= 0.0 {
            return Err(MomentError::Degenerate);
        }

        let (xc, yc) = (m10 / m00, m01 / m00);
        let mut m = Moments {
            m00,
            m10,
            m01,
            ..Default::default()
        };
        for ((r, c), &v) in patch.indexed_iter() {
            let (dx, dy) = (c as f64 - xc, r as f64 - yc);
            m.mu11 += dx * dy * v;
            m.mu20 += dx * dx * v;
            m.mu02 += dy * dy * v;
            m.mu30 += dx * dx * dx * v;
            m.mu03 += dy * dy * dy * v;
        }
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_single_pixel() {
        let mut a = Array2::<f64>::zeros((5, 7));
        a[(2, 4)] = 3.0;
        let m = DirectMoments.moments(a.view().into()).unwrap();
        assert_eq!(m.m00, 3.0);
        assert_eq!(m.centroid(), (4.0, 2.0));
        assert_eq!(m.mu20, 0.0);
        assert_eq!(m.mu02, 0.0);
    }

    #[test]
    fn test_known_moments() {
        let a = array![[0.0, 1.0, 0.0], [1.0, 0.0, 1.0], [0.0, 2.0, 0.0]];
        let m = DirectMoments.moments(a.view().into()).unwrap();
        assert_eq!(m.m00, 5.0);
        let (xc, yc) = m.centroid();
        assert!((xc - 1.0).abs() < 1e-12);
        assert!((yc - 1.2).abs() < 1e-12);
        // 只有 (1,0) 与 (1,2) 两点有 x 方向偏移.
        assert!((m.mu20 - 2.0).abs() < 1e-12);
        assert!(m.mu30.abs() < 1e-12);
        // y 方向偏向下方, 三阶矩为负 (重尾在上方).
        assert!(m.mu03 < 0.0);
    }

    #[test]
    fn test_degenerate() {
        let z = Array2::<f64>::zeros((4, 4));
        assert_eq!(DirectMoments.moments(z.view().into()), Err(MomentError::Degenerate));
        let e = Array2::<f64>::zeros((0, 4));
        assert_eq!(DirectMoments.moments(e.view().into()), Err(MomentError::Degenerate));
        let n = Array2::from_elem((2, 2), -1.0);
        assert!(DirectMoments.moments(n.view().into()).is_err());
    }
}
