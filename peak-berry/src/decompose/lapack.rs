use super::{centered, check_dimensions, normalize_signs, DecomposeError, DecomposeResult, Decomposer, Decomposition};
use ndarray::{s, ArrayView2};
use ndarray_linalg::SVD;

/// 基于 `ndarray-linalg` (LAPACK) 奇异值分解的主成分分析.
///
/// 结果与 [`super::Pca`] 一致, 矩阵很大时更快. 需要系统 LAPACK.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SvdPca;

impl Decomposer for SvdPca {
    fn name(&self) -> &'static str {
        "svd-pca"
    }

    fn requires_tall(&self) -> bool {
        false
    }

    fn decompose(&self, matrix: ArrayView2<f64>, n_components: usize) -> DecomposeResult<Decomposition> {
        let n = check_dimensions(matrix, n_components, self.requires_tall())?;
        let x = centered(matrix);
        let (_, sigma, vt) = x
            .svd(false, true)
            .map_err(|e| DecomposeError::Backend(e.to_string()))?;
        let vt = vt.ok_or_else(|| DecomposeError::Backend("SVD 没有给出右奇异向量".to_string()))?;

        let mut factors = vt.slice(s![..n, ..]).to_owned();
        let mut scores = x.dot(&factors.t());
        normalize_signs(&mut factors, &mut scores);
        let dof = (x.nrows().max(2) - 1) as f64;
        let eigenvalues = sigma.slice(s![..n]).mapv(|v| v * v / dof);
        Ok(Decomposition {
            factors,
            scores,
            eigenvalues: Some(eigenvalues),
        })
    }
}
