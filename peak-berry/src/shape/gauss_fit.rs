//! 带约束的二维旋转高斯拟合 (Levenberg–Marquardt).
//!
//! 参数为 `[x0, y0, A, sx, sy, θ]`, 模型为
//! `A · exp(-(u² / 2sx² + v² / 2sy²))`, 其中
//! `u = cosθ·(x-x0) + sinθ·(y-y0)`, `v = -sinθ·(x-x0) + cosθ·(y-y0)`.

use crate::consts::{FIT_CENTER_SLACK, FIT_MAX_SIGMA, FIT_MIN_SIGMA};
use crate::ImageSlice;
use num::Float;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const N: usize = 6;

/// LM 迭代参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LmConfig {
    /// 最大迭代次数.
    pub max_iterations: usize,

    /// 参数增量的收敛阈值.
    pub convergence_threshold: f64,

    /// 初始阻尼.
    pub initial_lambda: f64,

    /// 失败一步后阻尼的放大倍数.
    pub lambda_up: f64,

    /// 成功一步后阻尼的缩小倍数.
    pub lambda_down: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 60,
            convergence_threshold: 1e-6,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

/// 拟合得到的高斯参数, 坐标相对于 ROI 左上角.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GaussFit {
    /// 中心 x (列).
    pub x: f64,
    /// 中心 y (行).
    pub y: f64,
    /// 峰高.
    pub amplitude: f64,
    /// 长轴方向标准差.
    pub sigma_long: f64,
    /// 短轴方向标准差.
    pub sigma_short: f64,
    /// 长轴方向 (角度制), 位于 `(-90, 90]`.
    pub orientation: f64,
}

/// 初始猜测, 通常来自矩估计.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GaussGuess {
    /// 中心 x (列), 相对于 ROI 左上角.
    pub x: f64,
    /// 中心 y (行), 相对于 ROI 左上角.
    pub y: f64,
    /// 长轴方向标准差.
    pub sigma_long: f64,
    /// 短轴方向标准差.
    pub sigma_short: f64,
    /// 长轴方向 (角度制).
    pub orientation: f64,
}

/// 参数盒约束.
struct Bounds {
    lower: [f64; N],
    upper: [f64; N],
}

impl Bounds {
    fn clamp(&self, params: &mut [f64; N]) {
        for ((p, lo), hi) in params.iter_mut().zip(self.lower).zip(self.upper) {
            *p = p.max(lo).min(hi);
        }
    }
}

struct RotatedGaussian;

impl RotatedGaussian {
    #[inline]
    fn parts(x: f64, y: f64, p: &[f64; N]) -> (f64, f64, f64, f64, f64) {
        let (sin, cos) = p[5].sin_cos();
        let (dx, dy) = (x - p[0], y - p[1]);
        let u = cos * dx + sin * dy;
        let v = -sin * dx + cos * dy;
        let e = (-(u * u / (2.0 * p[3] * p[3]) + v * v / (2.0 * p[4] * p[4]))).exp();
        (u, v, e, sin, cos)
    }

    #[inline]
    fn evaluate(x: f64, y: f64, p: &[f64; N]) -> f64 {
        let (_, _, e, _, _) = Self::parts(x, y, p);
        p[2] * e
    }

    fn jacobian_row(x: f64, y: f64, p: &[f64; N]) -> [f64; N] {
        let (u, v, e, sin, cos) = Self::parts(x, y, p);
        let (a, sx2, sy2) = (p[2], p[3] * p[3], p[4] * p[4]);
        let ae = a * e;
        [
            ae * (u * cos / sx2 - v * sin / sy2),
            ae * (u * sin / sx2 + v * cos / sy2),
            e,
            ae * u * u / (sx2 * p[3]),
            ae * v * v / (sy2 * p[4]),
            ae * u * v * (1.0 / sy2 - 1.0 / sx2),
        ]
    }
}

/// 高斯拟合实现.
struct FitImp<'a> {
    xs: Vec<f64>,
    ys: Vec<f64>,
    zs: Vec<f64>,
    bounds: Bounds,
    config: &'a LmConfig,
}

impl<'a> FitImp<'a> {
    fn chi2(&self, p: &[f64; N]) -> f64 {
        itertools::izip!(&self.xs, &self.ys, &self.zs)
            .map(|(&x, &y, &z)| {
                let r = z - RotatedGaussian::evaluate(x, y, p);
                r * r
            })
            .sum()
    }

    fn hessian_gradient(&self, p: &[f64; N]) -> ([[f64; N]; N], [f64; N]) {
        let mut hessian = [[0.0; N]; N];
        let mut gradient = [0.0; N];
        for (&x, &y, &z) in itertools::izip!(&self.xs, &self.ys, &self.zs) {
            let row = RotatedGaussian::jacobian_row(x, y, p);
            let r = z - RotatedGaussian::evaluate(x, y, p);
            for i in 0..N {
                gradient[i] += row[i] * r;
                for j in i..N {
                    hessian[i][j] += row[i] * row[j];
                }
            }
        }
        for i in 1..N {
            for j in 0..i {
                hessian[i][j] = hessian[j][i];
            }
        }
        (hessian, gradient)
    }

    /// 返回最终参数及是否收敛.
    fn optimize(&self, initial: [f64; N]) -> ([f64; N], bool) {
        let mut params = initial;
        self.bounds.clamp(&mut params);
        let mut lambda = self.config.initial_lambda;
        let mut chi2 = self.chi2(&params);
        if !chi2.is_finite() {
            return (params, false);
        }

        for _ in 0..self.config.max_iterations {
            let (mut hessian, gradient) = self.hessian_gradient(&params);
            // 圆形峰的 θ 列恒为 0, 加一个极小的对角项使方程组始终可解.
            let floor = 1e-10 * (0..N).fold(0.0f64, |acc, i| acc.max(hessian[i][i]));
            for (i, row) in hessian.iter_mut().enumerate() {
                row[i] = row[i] * (1.0 + lambda) + floor;
            }
            let Some(delta) = solve(&hessian, &gradient) else {
                return (params, false);
            };

            let mut next = params;
            for (p, d) in next.iter_mut().zip(delta) {
                *p += d;
            }
            self.bounds.clamp(&mut next);

            let next_chi2 = self.chi2(&next);
            if next_chi2 < chi2 {
                let max_delta = params
                    .iter()
                    .zip(next)
                    .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()));
                params = next;
                chi2 = next_chi2;
                lambda *= self.config.lambda_down;
                if max_delta < self.config.convergence_threshold {
                    return (params, true);
                }
            } else {
                lambda *= self.config.lambda_up;
                // 任何步长都无法再降低残差: 已处于 (约束下的) 极小点.
                if lambda > 1e10 {
                    return (params, true);
                }
            }
        }
        (params, false)
    }
}

/// 对 ROI 拟合旋转高斯. 未收敛或结果不是有限值时返回 `None`.
///
/// 约束: 中心在初始猜测 ±2 像素内; 峰高在 `[global_mean / 1.5, 1.2 * ROI 最大值]` 内;
/// 两个标准差在 `[0.1, 30]` 内.
pub fn fit_gaussian(
    roi: ImageSlice,
    guess: &GaussGuess,
    global_mean: f64,
    config: &LmConfig,
) -> Option<GaussFit> {
    if roi.is_empty() {
        return None;
    }
    let roi_max = roi.max_value();
    let amp_hi = 1.2 * roi_max;
    let amp_lo = (global_mean / 1.5).min(amp_hi);
    let theta = guess.orientation.to_radians();
    let bounds = Bounds {
        lower: [
            guess.x - FIT_CENTER_SLACK,
            guess.y - FIT_CENTER_SLACK,
            amp_lo,
            FIT_MIN_SIGMA,
            FIT_MIN_SIGMA,
            theta - std::f64::consts::PI,
        ],
        upper: [
            guess.x + FIT_CENTER_SLACK,
            guess.y + FIT_CENTER_SLACK,
            amp_hi,
            FIT_MAX_SIGMA,
            FIT_MAX_SIGMA,
            theta + std::f64::consts::PI,
        ],
    };

    let (xs, ys, zs) = roi.indexed_iter().fold(
        (Vec::new(), Vec::new(), Vec::new()),
        |(mut xs, mut ys, mut zs), ((r, c), &v)| {
            xs.push(c as f64);
            ys.push(r as f64);
            zs.push(v);
            (xs, ys, zs)
        },
    );
    let imp = FitImp {
        xs,
        ys,
        zs,
        bounds,
        config,
    };
    let initial = [
        guess.x,
        guess.y,
        roi_max,
        guess.sigma_long,
        guess.sigma_short,
        theta,
    ];
    let (p, converged) = imp.optimize(initial);
    if !converged || p.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let (long, short, angle) = match p[3] >= p[4] {
        true => (p[3], p[4], p[5]),
        false => (p[4], p[3], p[5] + std::f64::consts::FRAC_PI_2),
    };
    Some(GaussFit {
        x: p[0],
        y: p[1],
        amplitude: p[2],
        sigma_long: long,
        sigma_short: short,
        orientation: wrap_half_turn(angle.to_degrees()),
    })
}

/// 将角度规约到 `(-90, 90]`.
fn wrap_half_turn(deg: f64) -> f64 {
    let d = deg.rem_euclid(180.0);
    match d > 90.0 {
        true => d - 180.0,
        false => d,
    }
}

/// 部分主元高斯消元求解 `N × N` 线性方程组. 矩阵奇异时返回 `None`.
pub(crate) fn solve<F: Float, const M: usize>(a: &[[F; M]; M], b: &[F; M]) -> Option<[F; M]> {
    let mut matrix = *a;
    let mut rhs = *b;
    let eps = F::from(1e-12)?;

    for col in 0..M {
        let pivot = (col..M).max_by(|&i, &j| {
            matrix[i][col]
                .abs()
                .partial_cmp(&matrix[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if !(matrix[pivot][col].abs() > eps) {
            return None;
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in (col + 1)..M {
            let factor = matrix[row][col] / matrix[col][col];
            let pivot_row = matrix[col];
            for (j, m) in matrix[row].iter_mut().enumerate().skip(col) {
                *m = *m - factor * pivot_row[j];
            }
            rhs[row] = rhs[row] - factor * rhs[col];
        }
    }

    let mut x = [F::zero(); M];
    for i in (0..M).rev() {
        let mut sum = rhs[i];
        for (j, &xj) in x.iter().enumerate().skip(i + 1) {
            sum = sum - matrix[i][j] * xj;
        }
        x[i] = sum / matrix[i][i];
    }
    Some(x)
}
