use super::gauss_fit::{fit_gaussian, GaussGuess, LmConfig};
use super::moments::{DirectMoments, MomentPrimitive, Moments};
use super::outlier::flag_outliers;
use crate::consts::{DEFAULT_SMOOTHING_RADIUS, FIT_MIN_SIGMA, OUTLIER_MAD_FACTOR, OUTLIER_MAX_RATIO};
use crate::filter::median_filter;
use crate::peak::Coordinate;
use crate::{Idx2d, ImageSlice};
use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 形状刻画参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShapeOptions {
    /// 中值滤波半径, 0 表示不滤波.
    pub smoothing_radius: usize,

    /// 是否对 ROI 施加半径为峰宽一半的圆形掩码.
    pub circular_mask: bool,

    /// ROI 平均强度低于 `全图平均强度 * min_roi_mean_ratio` 时放弃刻画.
    pub min_roi_mean_ratio: f64,

    /// 是否用带约束的高斯拟合精化位置, 峰高和方向.
    pub fit_gaussian: bool,

    /// 高斯拟合的迭代参数.
    pub lm: LmConfig,

    /// 离群判定: 偏离中位数超过多少倍 MAD.
    pub mad_factor: f64,

    /// 离群判定: 超过图像最大值的多少倍.
    pub max_ratio: f64,
}

impl Default for ShapeOptions {
    fn default() -> Self {
        Self {
            smoothing_radius: DEFAULT_SMOOTHING_RADIUS,
            circular_mask: true,
            min_roi_mean_ratio: 0.1,
            fit_gaussian: false,
            lm: LmConfig::default(),
            mad_factor: OUTLIER_MAD_FACTOR,
            max_ratio: OUTLIER_MAX_RATIO,
        }
    }
}

/// 一行刻画结果的来源.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeStatus {
    /// 由矩得到.
    Moments,

    /// 由矩得到后, 经高斯拟合精化.
    Fitted,

    /// ROI 退化, 只记录了原始坐标, 形状量全为 0.
    Degenerate,

    /// 刻画成功, 但峰高在本图中离群.
    Outlier,
}

impl ShapeStatus {
    /// 是否是一次成功的测量 (矩或拟合)?
    #[inline]
    pub fn is_measured(&self) -> bool {
        matches!(self, ShapeStatus::Moments | ShapeStatus::Fitted)
    }
}

/// 单个峰的形状属性.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakAttributes {
    /// 列方向坐标 (全图坐标系).
    pub x: f64,
    /// 行方向坐标 (全图坐标系).
    pub y: f64,
    /// 峰高.
    pub height: f64,
    /// 强度分布协方差矩阵的较大特征值.
    pub long_axis: f64,
    /// 强度分布协方差矩阵的较小特征值.
    pub short_axis: f64,
    /// 长轴方向 (角度制). 接近圆形时不稳定.
    pub orientation: f64,
    /// 离心率, 位于 `[0, 1)`, 0 表示圆形.
    pub eccentricity: f64,
    /// x 方向偏度.
    pub skew_x: f64,
    /// y 方向偏度.
    pub skew_y: f64,
    /// 本行来源.
    pub status: ShapeStatus,
}

impl PeakAttributes {
    /// 退化行: 只保留原始坐标.
    #[inline]
    pub fn degenerate(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            height: 0.0,
            long_axis: 0.0,
            short_axis: 0.0,
            orientation: 0.0,
            eccentricity: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            status: ShapeStatus::Degenerate,
        }
    }

    /// 坐标.
    #[inline]
    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.x, self.y)
    }

    /// 由 ROI 内的矩导出形状量. `(top, left)` 为 ROI 左上角在全图中的索引.
    pub fn from_moments(m: &Moments, (top, left): Idx2d) -> Self {
        let (xc, yc) = m.centroid();
        let vxx = m.mu20 / m.m00;
        let vyy = m.mu02 / m.m00;
        let vxy = m.mu11 / m.m00;

        let half_trace = 0.5 * (vxx + vyy);
        let root = 0.5 * (4.0 * vxy * vxy + (vxx - vyy).powi(2)).sqrt();
        let mut long_axis = half_trace + root;
        let mut short_axis = (half_trace - root).abs();
        if short_axis > long_axis {
            std::mem::swap(&mut long_axis, &mut short_axis);
        }
        let eccentricity = match long_axis > 0.0 {
            true => (1.0 - short_axis / long_axis).abs().sqrt(),
            false => 0.0,
        };
        let orientation = 0.5 * (2.0 * m.mu11).atan2(m.mu20 - m.mu02).to_degrees();
        let skew = |mu3: f64, var: f64| match var > 0.0 {
            true => mu3 / (m.m00 * var.powf(1.5)),
            false => 0.0,
        };

        Self {
            x: left as f64 + xc,
            y: top as f64 + yc,
            height: 0.0,
            long_axis,
            short_axis,
            orientation,
            eccentricity,
            skew_x: skew(m.mu30, vxx),
            skew_y: skew(m.mu03, vyy),
            status: ShapeStatus::Moments,
        }
    }
}

/// 以默认参数刻画 `targets` 处的峰形状. 每个目标输出一行, 顺序与 `targets` 一致.
///
/// 见 [`characterize_with`].
pub fn characterize(
    image: ImageSlice,
    targets: &[Coordinate],
    peak_width: usize,
    smoothing_radius: usize,
) -> Vec<PeakAttributes> {
    let opts = ShapeOptions {
        smoothing_radius,
        ..Default::default()
    };
    characterize_with(image, targets, peak_width, &opts, &DirectMoments)
}

/// 刻画 `targets` 处的峰形状. 每个目标输出一行, 顺序与 `targets` 一致.
///
/// 单个目标的失败 (ROI 过暗, 矩退化, 目标坐标不是有限值) 只会产生一行
/// [`ShapeStatus::Degenerate`], 不影响其它目标.
/// 全部目标刻画完成后, 再做一次峰高离群标记.
///
/// # 注意
///
/// `peak_width` 为 0 时程序 panic.
pub fn characterize_with<M: MomentPrimitive>(
    image: ImageSlice,
    targets: &[Coordinate],
    peak_width: usize,
    opts: &ShapeOptions,
    primitive: &M,
) -> Vec<PeakAttributes> {
    assert_ne!(peak_width, 0, "峰宽不能为 0");
    let filtered = median_filter(image, opts.smoothing_radius);
    let imp = ShapeImp {
        image: filtered.as_immutable(),
        global_mean: filtered.as_immutable().mean(),
        peak_width,
        opts,
        primitive,
    };
    let mut rows: Vec<PeakAttributes> = targets.iter().map(|t| imp.one(*t)).collect();
    flag_outliers(
        &mut rows,
        imp.image.max_value(),
        opts.mad_factor,
        opts.max_ratio,
    );
    rows
}

/// 形状刻画实现.
struct ShapeImp<'a, M> {
    image: ImageSlice<'a>,
    global_mean: f64,
    peak_width: usize,
    opts: &'a ShapeOptions,
    primitive: &'a M,
}

impl<'a, M: MomentPrimitive> ShapeImp<'a, M> {
    /// 离目标最近的图像内像素.
    fn nearest_pixel(&self, target: Coordinate) -> Option<Idx2d> {
        let (h, w) = self.image.shape();
        if !target.is_finite() || h == 0 || w == 0 {
            return None;
        }
        let r = target.y.round().clamp(0.0, (h - 1) as f64) as usize;
        let c = target.x.round().clamp(0.0, (w - 1) as f64) as usize;
        Some((r, c))
    }

    fn one(&self, target: Coordinate) -> PeakAttributes {
        let Some(center) = self.nearest_pixel(target) else {
            log::debug!("目标 {target:?} 无法定位到图像内, 记为退化");
            return PeakAttributes::degenerate(target.x, target.y);
        };
        let ((top, left), roi) = self.image.clamped_window(center, self.peak_width);
        if roi.mean() < self.opts.min_roi_mean_ratio * self.global_mean {
            log::debug!("目标 {target:?} 处 ROI 过暗, 记为退化");
            return PeakAttributes::degenerate(target.x, target.y);
        }

        let patch = self.masked(roi, target, (top, left));
        let moments = match self.primitive.moments(patch.view().into()) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("目标 {target:?}: {e}");
                return PeakAttributes::degenerate(target.x, target.y);
            }
        };
        let mut attr = PeakAttributes::from_moments(&moments, (top, left));
        attr.height = self.height_at(attr.position()).unwrap_or(self.image[center]);

        if self.opts.fit_gaussian {
            let guess = GaussGuess {
                x: attr.x - left as f64,
                y: attr.y - top as f64,
                sigma_long: attr.long_axis.sqrt().max(FIT_MIN_SIGMA),
                sigma_short: attr.short_axis.sqrt().max(FIT_MIN_SIGMA),
                orientation: attr.orientation,
            };
            match fit_gaussian(patch.view().into(), &guess, self.global_mean, &self.opts.lm) {
                Some(fit) => {
                    attr.x = left as f64 + fit.x;
                    attr.y = top as f64 + fit.y;
                    attr.height = fit.amplitude;
                    attr.orientation = fit.orientation;
                    attr.status = ShapeStatus::Fitted;
                }
                None => log::debug!("目标 {target:?} 高斯拟合未收敛, 保留矩估计"),
            }
        }
        attr
    }

    /// ROI 副本. 启用圆形掩码时, 距目标超过峰宽一半的像素置 0.
    fn masked(&self, roi: ImageSlice, target: Coordinate, (top, left): Idx2d) -> Array2<f64> {
        let mut patch = roi.data().to_owned();
        if self.opts.circular_mask {
            let radius = self.peak_width as f64 / 2.0;
            let local = target - Coordinate::new(left as f64, top as f64);
            for ((r, c), v) in patch.indexed_iter_mut() {
                if Coordinate::from_pixel((r, c)).distance(&local) > radius {
                    *v = 0.0;
                }
            }
        }
        patch
    }

    fn height_at(&self, position: Coordinate) -> Option<f64> {
        self.image.get(position.to_pixel()?).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::Lattice;

    #[test]
    fn test_lattice_shapes() {
        let lattice = Lattice::square(256, 17);
        let img = lattice.render();
        let targets = lattice.centers();
        let rows = characterize(img.as_immutable(), &targets, 17, 3);

        assert_eq!(rows.len(), targets.len());
        for (row, t) in rows.iter().zip(targets.iter()) {
            assert_eq!(row.status, ShapeStatus::Moments);
            assert!(row.position().distance(t) < 1.0);
            assert!(row.eccentricity < 0.1, "{row:?}");
            assert!(row.short_axis <= row.long_axis);
            assert!(row.height > 0.5);
            assert!((row.height - rows[0].height).abs() < 1e-6);
        }
    }

    #[test]
    fn test_elongated_orientation() {
        let lattice = Lattice {
            sigma: 2.5,
            elongation: 2.0,
            blob_angle: 35f64.to_radians(),
            ..Lattice::square(128, 17)
        };
        let img = lattice.render();
        let targets = lattice.centers();
        let opts = ShapeOptions {
            smoothing_radius: 0,
            ..Default::default()
        };
        let rows = characterize_with(img.as_immutable(), &targets, 25, &opts, &DirectMoments);
        for row in rows.iter() {
            assert!((row.orientation - 35.0).abs() < 1.0, "{row:?}");
            assert!(row.eccentricity > 0.5 && row.eccentricity < 1.0);
            assert!(row.short_axis <= row.long_axis);
        }
    }

    #[test]
    fn test_gaussian_refinement() {
        let lattice = Lattice::square(128, 17).translated(Coordinate::new(0.4, -0.3));
        let img = lattice.render();
        let targets: Vec<Coordinate> = Lattice::square(128, 17).centers();
        let opts = ShapeOptions {
            smoothing_radius: 0,
            circular_mask: false,
            fit_gaussian: true,
            ..Default::default()
        };
        let rows = characterize_with(img.as_immutable(), &targets, 17, &opts, &DirectMoments);
        for (row, t) in rows.iter().zip(targets.iter()) {
            assert_eq!(row.status, ShapeStatus::Fitted);
            assert!((row.x - (t.x + 0.4)).abs() < 0.05, "{row:?}");
            assert!((row.y - (t.y - 0.3)).abs() < 0.05, "{row:?}");
            assert!((row.height - 1.0).abs() < 0.02);
        }
    }

    #[test]
    fn test_dark_roi_is_degenerate() {
        let lattice = Lattice {
            origin: 64.0,
            spacing: 1000.0,
            ..Lattice::square(128, 17)
        };
        let img = lattice.render();
        let targets = [
            Coordinate::new(64.0, 64.0),
            Coordinate::new(5.0, 120.0),
            Coordinate::nan(),
        ];
        let rows = characterize(img.as_immutable(), &targets, 17, 0);
        assert_eq!(rows[0].status, ShapeStatus::Moments);
        assert_eq!(rows[1], PeakAttributes::degenerate(5.0, 120.0));
        assert_eq!(rows[2].status, ShapeStatus::Degenerate);
        assert!(rows[2].x.is_nan());
    }
}
