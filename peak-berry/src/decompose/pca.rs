use super::svd::thin_svd;
use super::{centered, check_dimensions, normalize_signs, DecomposeResult, Decomposer, Decomposition};
use ndarray::{s, ArrayView2};

/// 主成分分析, 纯 Rust 实现.
///
/// 对中心化矩阵做薄奇异值分解 (`nalgebra`), 右奇异向量即因子.
/// 不要求观测数不少于特征数, 整幅图像展平作为特征时同样可用.
#[derive(Clone, Debug, PartialEq)]
pub struct Pca {
    /// SVD 的收敛阈值.
    pub epsilon: f64,

    /// SVD 的最大迭代次数. 0 表示不限.
    pub max_iterations: usize,
}

impl Default for Pca {
    fn default() -> Self {
        Self {
            epsilon: f64::EPSILON,
            max_iterations: 0,
        }
    }
}

impl Decomposer for Pca {
    fn name(&self) -> &'static str {
        "pca"
    }

    fn requires_tall(&self) -> bool {
        false
    }

    fn decompose(&self, matrix: ArrayView2<f64>, n_components: usize) -> DecomposeResult<Decomposition> {
        let n = check_dimensions(matrix, n_components, self.requires_tall())?;
        let x = centered(matrix);
        let svd = thin_svd(&x, false, self.epsilon, self.max_iterations)?;

        let mut factors = svd.vt.slice(s![..n, ..]).to_owned();
        let mut scores = x.dot(&factors.t());
        normalize_signs(&mut factors, &mut scores);
        let dof = (x.nrows().max(2) - 1) as f64;
        let eigenvalues = svd.sigma.slice(s![..n]).mapv(|v| v * v / dof);

        log::debug!(
            "{}: {:?} -> {n} 个因子, 解释方差 {eigenvalues}",
            self.name(),
            matrix.dim()
        );
        Ok(Decomposition {
            factors,
            scores,
            eigenvalues: Some(eigenvalues),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::DecomposeError;
    use ndarray::Array2;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_pca_on_a_line() {
        // 观测分布在方向 (3, 4) / 5 上, 外加一个很小的正交扰动.
        let x = Array2::from_shape_fn((40, 2), |(i, j)| {
            let t = i as f64 - 20.0;
            let e = if i % 2 == 0 { 0.01 } else { -0.01 };
            match j {
                0 => 3.0 * t / 5.0 - 4.0 * e / 5.0 + 7.0,
                _ => 4.0 * t / 5.0 + 3.0 * e / 5.0 - 1.0,
            }
        });
        let d = Pca::default().decompose(x.view(), 1).unwrap();
        assert_eq!(d.factors.dim(), (1, 2));
        assert_eq!(d.scores.dim(), (40, 1));
        assert!((d.factors[(0, 0)] - 0.6).abs() < 1e-3);
        assert!((d.factors[(0, 1)] - 0.8).abs() < 1e-3);
        // 分数就是沿该方向的中心化坐标, t 的均值为 -0.5.
        assert!((d.scores[(0, 0)] + 19.5).abs() < 1e-2);
        let ev = d.eigenvalues.unwrap();
        assert!(ev[0] > 100.0);
    }

    #[test]
    fn test_components_are_sorted_and_clamped() {
        let x = Array2::from_shape_fn((30, 3), |(i, j)| {
            let t = i as f64;
            match j {
                0 => t,
                1 => (t * 0.7).sin() * 3.0,
                _ => (t * 1.3).cos() * 0.5,
            }
        });
        let d = Pca::default().decompose(x.view(), 10).unwrap();
        assert_eq!(d.components(), 3);
        let ev = d.eigenvalues.unwrap();
        assert!(ev[0] >= ev[1] && ev[1] >= ev[2]);
        // 因子两两正交且为单位向量.
        let g = d.factors.dot(&d.factors.t());
        for i in 0..3 {
            for j in 0..3 {
                assert!(close(g[(i, j)], if i == j { 1.0 } else { 0.0 }));
            }
        }
    }

    #[test]
    fn test_eigenvalues_sum_to_total_variance() {
        let x = Array2::from_shape_fn((25, 4), |(i, j)| ((i * (j + 1)) as f64 * 0.37).sin() + j as f64);
        let d = Pca::default().decompose(x.view(), 4).unwrap();
        let c = centered(x.view());
        let total = c.iter().map(|v| v * v).sum::<f64>() / 24.0;
        let ev = d.eigenvalues.unwrap();
        assert!((ev.sum() - total).abs() < 1e-9 * total.max(1.0));
    }

    #[test]
    fn test_wide_matrix() {
        // 12 个观测, 每个 256 维, 数据本身只有两个方向.
        let x = Array2::from_shape_fn((12, 256), |(i, j)| {
            let a = (i as f64 * 0.9).sin();
            let b = (i as f64 * 0.4).cos();
            a * (j as f64 * 0.05).sin() + b * (j % 7) as f64 + 3.0
        });
        let d = Pca::default().decompose(x.view(), 3).unwrap();
        assert_eq!(d.factors.dim(), (3, 256));
        assert_eq!(d.scores.dim(), (12, 3));
        let ev = d.eigenvalues.unwrap();
        assert!(ev[1] > 1e-6);
        assert!(ev[2] < 1e-9 * ev[0]);

        // 前两个因子即可完全重建中心化数据.
        let c = centered(x.view());
        let back = d.scores.slice(s![.., ..2]).dot(&d.factors.slice(s![..2, ..]));
        for (a, b) in back.iter().zip(c.iter()) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn test_empty_matrix() {
        let x = Array2::<f64>::zeros((0, 5));
        assert_eq!(
            Pca::default().decompose(x.view(), 2).unwrap_err(),
            DecomposeError::TooFewObservations((0, 5))
        );
    }
}
