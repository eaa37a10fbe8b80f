//! 基于 `nalgebra` 的薄奇异值分解, 供各分解后端共用.

use super::{DecomposeError, DecomposeResult};
use nalgebra::{DMatrix, SVD};
use ndarray::{Array1, Array2};

/// 薄奇异值分解 `x = u · diag(sigma) · vt`, 奇异值降序排列.
#[derive(Clone, Debug)]
pub(crate) struct ThinSvd {
    /// 形状为 `(行, r)`, 仅在请求时计算.
    pub u: Option<Array2<f64>>,

    /// 长度为 `r = min(行, 列)`.
    pub sigma: Array1<f64>,

    /// 形状为 `(r, 列)`.
    pub vt: Array2<f64>,
}

/// 对 `x` 做薄奇异值分解.
///
/// `epsilon` 与 `max_iterations` 直接交给 `nalgebra`, 后者为 0 时不限迭代次数.
pub(crate) fn thin_svd(
    x: &Array2<f64>,
    compute_u: bool,
    epsilon: f64,
    max_iterations: usize,
) -> DecomposeResult<ThinSvd> {
    if x.iter().any(|v| !v.is_finite()) {
        return Err(DecomposeError::Backend("矩阵含非有限值".to_string()));
    }
    let (rows, cols) = x.dim();
    let m = DMatrix::from_fn(rows, cols, |i, j| x[(i, j)]);
    let svd = SVD::try_new(m, compute_u, true, epsilon, max_iterations)
        .ok_or_else(|| DecomposeError::Backend(format!("SVD 在 {max_iterations} 次迭代内未收敛")))?;
    let vt = svd
        .v_t
        .ok_or_else(|| DecomposeError::Backend("SVD 没有给出右奇异向量".to_string()))?;

    let sv = &svd.singular_values;
    let mut order: Vec<usize> = (0..sv.len()).collect();
    order.sort_by(|&a, &b| sv[b].total_cmp(&sv[a]));

    let sigma: Array1<f64> = order.iter().map(|&i| sv[i]).collect();
    let vt = Array2::from_shape_fn((order.len(), cols), |(r, j)| vt[(order[r], j)]);
    let u = svd
        .u
        .map(|u| Array2::from_shape_fn((rows, order.len()), |(i, r)| u[(i, order[r])]));
    Ok(ThinSvd { u, sigma, vt })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_thin_svd_reconstructs() {
        let x = array![[3.0, 1.0, 0.0, 2.0], [1.0, -2.0, 4.0, 0.5], [0.0, 1.0, 1.0, -1.0]];
        let svd = thin_svd(&x, true, f64::EPSILON, 0).unwrap();
        let u = svd.u.unwrap();
        assert_eq!(u.dim(), (3, 3));
        assert_eq!(svd.vt.dim(), (3, 4));
        assert!(svd.sigma[0] >= svd.sigma[1] && svd.sigma[1] >= svd.sigma[2]);

        let back = (&u * &svd.sigma).dot(&svd.vt);
        for (a, b) in back.iter().zip(x.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_non_finite_is_rejected() {
        let x = array![[1.0, f64::NAN], [0.0, 1.0]];
        assert!(matches!(
            thin_svd(&x, false, f64::EPSILON, 0),
            Err(DecomposeError::Backend(_))
        ));
    }
}
