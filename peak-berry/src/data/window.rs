use crate::consts::gray::{BLACK, WHITE};
use crate::ImageSlice;

/// 强度窗口, 由下限和上限组成, 用于将任意实数强度线性映射到 8-bit 灰度.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntensityWindow {
    lower: f64,
    upper: f64,
}

impl IntensityWindow {
    /// 构建强度窗口.
    ///
    /// `lower` 和 `upper` 必须有限且 `lower < upper`, 否则返回 `None`.
    pub fn new(lower: f64, upper: f64) -> Option<IntensityWindow> {
        if lower.is_finite() && upper.is_finite() && lower < upper {
            Some(Self { lower, upper })
        } else {
            None
        }
    }

    /// 构建恰好覆盖 `image` 强度范围的窗口.
    ///
    /// 图像为空、全为 `NaN` 或强度恒定时返回 `None`.
    pub fn fit(image: &ImageSlice) -> Option<IntensityWindow> {
        Self::new(image.min_value(), image.max_value())
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f64 {
        self.lower
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f64 {
        self.upper
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// 求在当前窗口设置下, 强度 `v` 对应的灰度图像素整数值 (0 <= value <= 255).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, v: f64) -> Option<u8> {
        if !v.is_finite() {
            return None;
        }
        if v <= self.lower {
            Some(BLACK)
        } else if v >= self.upper {
            Some(WHITE)
        } else {
            // 255, not 256.
            Some(((v - self.lower) / self.width() * 255.0) as u8)
        }
    }

    /// 将强度 `v` 线性映射到 `[lo, hi]`, 窗外的值被截断到端点.
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn normalize(&self, v: f64, lo: f64, hi: f64) -> Option<f64> {
        if !v.is_finite() {
            return None;
        }
        let t = ((v - self.lower) / self.width()).clamp(0.0, 1.0);
        Some(lo + t * (hi - lo))
    }
}

#[cfg(test)]
mod tests {
    use super::IntensityWindow;
    use ndarray::array;

    #[test]
    fn test_new_rejects_bad_ranges() {
        assert!(IntensityWindow::new(1.0, 1.0).is_none());
        assert!(IntensityWindow::new(2.0, 1.0).is_none());
        assert!(IntensityWindow::new(f64::NAN, 1.0).is_none());
        assert!(IntensityWindow::new(0.0, 1.0).is_some());
    }

    #[test]
    fn test_eval_and_normalize() {
        let arr = array![[-1.0, 0.0], [1.0, 3.0]];
        let win = IntensityWindow::fit(&arr.view().into()).unwrap();
        assert_eq!(win.width(), 4.0);
        assert_eq!(win.eval(-5.0), Some(0));
        assert_eq!(win.eval(3.0), Some(255));
        assert_eq!(win.eval(1.0), Some(127));
        assert_eq!(win.eval(f64::INFINITY), None);
        assert_eq!(win.normalize(1.0, 0.0, 1.0), Some(0.5));
        assert_eq!(win.normalize(9.0, 10.0, 20.0), Some(20.0));
    }
}
