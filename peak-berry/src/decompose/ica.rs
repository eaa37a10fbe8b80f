use super::svd::thin_svd;
use super::{check_dimensions, normalize_signs, DecomposeError, DecomposeResult, Decomposer, Decomposition};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{s, Array2, ArrayView2, Axis};

/// FastICA 的非线性对比函数.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Contrast {
    /// `g(u) = tanh(u)`. 通用, 对离群值稳健.
    #[default]
    LogCosh,

    /// `g(u) = u·exp(-u²/2)`. 适合高度超高斯的源.
    Exp,

    /// `g(u) = u³`.
    Cube,
}

impl Contrast {
    /// 逐元素计算 `g(u)` 与 `g'(u)`.
    fn apply(&self, u: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        match self {
            Contrast::LogCosh => {
                let g = u.mapv(f64::tanh);
                let dg = g.mapv(|t| 1.0 - t * t);
                (g, dg)
            }
            Contrast::Exp => {
                let e = u.mapv(|v| (-v * v / 2.0).exp());
                (u * &e, (1.0 - u * u) * &e)
            }
            Contrast::Cube => (u.mapv(|v| v * v * v), u.mapv(|v| 3.0 * v * v)),
        }
    }
}

/// 独立成分分析 (对称 FastICA).
///
/// 把每个观测看作沿特征方向采样的混合信号: `x = scores · factors`,
/// 因子是统计独立的源, 分数是各观测的混合系数.
/// 先逐观测去均值, 以薄 SVD 白化并降到目标维数, 再做不动点迭代求正交解混矩阵.
///
/// 因子为单位向量, 按分数能量降序排列, 绝对值最大的分量为正. 不提供解释方差.
///
/// # 注意
///
/// 迭代未收敛时只记录警告并返回当前结果.
#[derive(Clone, Debug, PartialEq)]
pub struct Ica {
    /// 对比函数.
    pub contrast: Contrast,

    /// 最大迭代轮数.
    pub max_iterations: usize,

    /// 解混矩阵相邻两轮的变化低于该值时认为收敛.
    pub tolerance: f64,

    /// 分解前沿特征方向做差分, 分解后再积分还原因子 (积分式 ICA).
    ///
    /// 适用于特征有自然顺序的数据 (谱或展平的图像).
    pub differentiate: bool,
}

impl Default for Ica {
    fn default() -> Self {
        Self {
            contrast: Contrast::LogCosh,
            max_iterations: 200,
            tolerance: 1e-4,
            differentiate: false,
        }
    }
}

impl Decomposer for Ica {
    fn name(&self) -> &'static str {
        "ica"
    }

    fn requires_tall(&self) -> bool {
        false
    }

    fn decompose(&self, matrix: ArrayView2<f64>, n_components: usize) -> DecomposeResult<Decomposition> {
        let n = check_dimensions(matrix, n_components, self.requires_tall())?;
        let mut x = match self.differentiate {
            true => differentiate(matrix),
            false => matrix.to_owned(),
        };
        if let Some(mean) = x.mean_axis(Axis(1)) {
            x -= &mean.insert_axis(Axis(1));
        }

        let svd = thin_svd(&x, true, f64::EPSILON, 0)?;
        let u = svd
            .u
            .ok_or_else(|| DecomposeError::Backend("SVD 没有给出左奇异向量".to_string()))?;
        let largest = svd.sigma.get(0).copied().unwrap_or(0.0);
        let rank = svd.sigma.iter().filter(|&&v| v > largest * 1e-10).count();
        if rank == 0 {
            return Err(DecomposeError::Backend("数据没有任何方差".to_string()));
        }
        if rank < n {
            log::debug!("数据的秩为 {rank}, 因子个数由 {n} 截断为 {rank}");
        }
        let n = n.min(rank);

        // 白化后每行方差为 1.
        let samples = x.ncols() as f64;
        let basis = svd.vt.slice(s![..n, ..]);
        let whitened = basis.mapv(|v| v * samples.sqrt());
        let w = self.unmix(&whitened)?;

        let mut factors = w.dot(&basis);
        let mut scores = (&u.slice(s![.., ..n]) * &svd.sigma.slice(s![..n])).dot(&w.t());
        if self.differentiate {
            factors = integrate(&factors);
            for (mut f, mut sc) in factors.rows_mut().into_iter().zip(scores.columns_mut()) {
                let norm = f.dot(&f).sqrt();
                if norm > 0.0 {
                    f /= norm;
                    sc *= norm;
                }
            }
        }
        sort_by_energy(&mut factors, &mut scores);
        normalize_signs(&mut factors, &mut scores);

        log::debug!("{}: {:?} -> {n} 个独立成分", self.name(), matrix.dim());
        Ok(Decomposition {
            factors,
            scores,
            eigenvalues: None,
        })
    }
}

impl Ica {
    /// 对称 FastICA. `z` 为白化信号, 形状 `(成分, 样本)`. 返回正交解混矩阵.
    fn unmix(&self, z: &Array2<f64>) -> DecomposeResult<Array2<f64>> {
        let (n, p) = z.dim();
        let init = Array2::from_shape_fn((n, n), |(i, j)| ((i * n + j + 1) as f64 * 0.618).sin());
        let mut w = decorrelate(&init)?;

        for round in 0..self.max_iterations {
            let (g, dg) = self.contrast.apply(&w.dot(z));
            let mut next = g.dot(&z.t()) / p as f64;
            for ((mut row, w_row), d) in next.rows_mut().into_iter().zip(w.rows()).zip(dg.rows()) {
                let mean = d.sum() / p as f64;
                row.scaled_add(-mean, &w_row);
            }
            let next = decorrelate(&next)?;
            let change = next
                .dot(&w.t())
                .diag()
                .iter()
                .map(|v| (v.abs() - 1.0).abs())
                .fold(0.0, f64::max);
            w = next;
            if change < self.tolerance {
                log::debug!("FastICA 在第 {} 轮收敛", round + 1);
                return Ok(w);
            }
        }
        log::warn!("FastICA 在 {} 轮后仍未收敛", self.max_iterations);
        Ok(w)
    }
}

/// 对称去相关 `w <- (w·wᵀ)^(-1/2)·w`, 使各行正交归一.
fn decorrelate(w: &Array2<f64>) -> DecomposeResult<Array2<f64>> {
    let n = w.nrows();
    let gram = w.dot(&w.t());
    let eig = SymmetricEigen::try_new(DMatrix::from_fn(n, n, |i, j| gram[(i, j)]), f64::EPSILON, 0)
        .ok_or_else(|| DecomposeError::Backend("解混矩阵特征分解未收敛".to_string()))?;
    if eig.eigenvalues.iter().any(|&l| !(l > 0.0)) {
        return Err(DecomposeError::Backend("解混矩阵退化".to_string()));
    }
    let (values, vectors) = (&eig.eigenvalues, &eig.eigenvectors);
    let inv_sqrt = Array2::from_shape_fn((n, n), |(i, j)| {
        (0..n)
            .map(|k| vectors[(i, k)] * vectors[(j, k)] / values[k].sqrt())
            .sum::<f64>()
    });
    Ok(inv_sqrt.dot(w))
}

/// 按分数列的平方和降序重排成分.
fn sort_by_energy(factors: &mut Array2<f64>, scores: &mut Array2<f64>) {
    let energy: Vec<f64> = scores.columns().into_iter().map(|c| c.dot(&c)).collect();
    let mut order: Vec<usize> = (0..energy.len()).collect();
    order.sort_by(|&a, &b| energy[b].total_cmp(&energy[a]));
    *factors = factors.select(Axis(0), &order);
    *scores = scores.select(Axis(1), &order);
}

/// 沿特征方向差分: `y[j] = x[j + 3] - x[j - 3]`, 越界部分视为 0.
pub(crate) fn differentiate(x: ArrayView2<f64>) -> Array2<f64> {
    const HALF: usize = 3;
    let p = x.ncols();
    Array2::from_shape_fn(x.dim(), |(i, j)| {
        let ahead = match j + HALF < p {
            true => x[(i, j + HALF)],
            false => 0.0,
        };
        let behind = match j >= HALF {
            true => x[(i, j - HALF)],
            false => 0.0,
        };
        ahead - behind
    })
}

/// 沿特征方向的累积梯形积分, 首项为 0, 长度不变.
pub(crate) fn integrate(x: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros(x.dim());
    for (src, mut dst) in x.rows().into_iter().zip(out.rows_mut()) {
        let mut acc = 0.0;
        for j in 1..src.len() {
            acc += (src[j - 1] + src[j]) / 2.0;
            dst[j] = acc;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn sources(p: usize) -> (Array1<f64>, Array1<f64>) {
        let a = Array1::from_shape_fn(p, |j| (j as f64 * 0.13).sin());
        let b = Array1::from_shape_fn(p, |j| ((j * 37) % 101) as f64 / 101.0 - 0.5);
        (a, b)
    }

    fn mixed(p: usize) -> Array2<f64> {
        let (a, b) = sources(p);
        Array2::from_shape_fn((6, p), |(i, j)| {
            let (wa, wb) = (1.0 + 0.3 * i as f64, 2.0 - 0.25 * i as f64);
            wa * a[j] + wb * b[j] + i as f64
        })
    }

    fn correlation(x: &[f64], y: &[f64]) -> f64 {
        let n = x.len() as f64;
        let (mx, my) = (x.iter().sum::<f64>() / n, y.iter().sum::<f64>() / n);
        let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
        for (a, b) in x.iter().zip(y) {
            sxy += (a - mx) * (b - my);
            sxx += (a - mx) * (a - mx);
            syy += (b - my) * (b - my);
        }
        sxy / (sxx * syy).sqrt()
    }

    #[test]
    fn test_separates_two_sources() {
        let p = 2000;
        let x = mixed(p);
        let d = Ica::default().decompose(x.view(), 2).unwrap();
        assert_eq!(d.factors.dim(), (2, p));
        assert_eq!(d.scores.dim(), (6, 2));
        assert!(d.eigenvalues.is_none());

        let (a, b) = sources(p);
        let (a, b) = (a.to_vec(), b.to_vec());
        let f0 = d.factors.row(0).to_vec();
        let f1 = d.factors.row(1).to_vec();
        let straight = correlation(&f0, &a).abs().min(correlation(&f1, &b).abs());
        let swapped = correlation(&f0, &b).abs().min(correlation(&f1, &a).abs());
        assert!(straight.max(swapped) > 0.95, "{straight} {swapped}");

        // 去均值后的数据由两个成分完全重建.
        let back = d.scores.dot(&d.factors);
        for (i, row) in x.rows().into_iter().enumerate() {
            let mean = row.sum() / p as f64;
            for j in 0..p {
                assert!((back[(i, j)] - (row[j] - mean)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_components_clamped_to_rank() {
        let d = Ica::default().decompose(mixed(500).view(), 4).unwrap();
        assert_eq!(d.components(), 2);
    }

    #[test]
    fn test_constant_rows_have_no_components() {
        let x = Array2::from_shape_fn((4, 50), |(i, _)| i as f64);
        assert!(matches!(
            Ica::default().decompose(x.view(), 2),
            Err(DecomposeError::Backend(_))
        ));
    }

    #[test]
    fn test_differentiate_and_integrate() {
        let ramp = array![[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]];
        let d = differentiate(ramp.view());
        assert_eq!(d[(0, 3)], 6.0);
        assert_eq!(d[(0, 6)], 6.0);
        assert_eq!(d[(0, 0)], 3.0);

        let ones = Array2::<f64>::ones((1, 5));
        assert_eq!(integrate(&ones), array![[0.0, 1.0, 2.0, 3.0, 4.0]]);
    }

    #[test]
    fn test_differentiated_ica() {
        let ica = Ica {
            differentiate: true,
            ..Default::default()
        };
        let d = ica.decompose(mixed(800).view(), 2).unwrap();
        assert_eq!(d.factors.dim(), (2, 800));
        assert!(d.factors.iter().all(|v| v.is_finite()));
        for f in d.factors.rows() {
            assert!((f.dot(&f) - 1.0).abs() < 1e-9);
        }
    }
}
