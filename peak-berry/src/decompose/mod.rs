//! 特征矩阵的线性分解.
//!
//! 分解后端只看到一个 `观测 × 特征` 的稠密矩阵, 返回 `因子 × 特征` 的因子矩阵、
//! `观测 × 因子` 的分数矩阵, 以及 (若有) 每个因子解释的方差.
//! 结果如何重塑回图像或峰特征由 [`crate::feature::reshape`] 负责.
//!
//! 默认提供两个纯 Rust 后端: [`Pca`] 与 [`Ica`], 线性代数交给 `nalgebra`.
//! 打开 `linalg` feature 时另有基于 LAPACK 的 `SvdPca`.

mod ica;
#[cfg(feature = "linalg")]
mod lapack;
mod pca;
mod svd;

pub use ica::{Contrast, Ica};
#[cfg(feature = "linalg")]
pub use lapack::SvdPca;
pub use pca::Pca;

use crate::Idx2d;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::fmt;

/// 分解结果.
#[derive(Clone, Debug, PartialEq)]
pub struct Decomposition {
    /// 形状为 `(因子, 特征)`.
    pub factors: Array2<f64>,

    /// 形状为 `(观测, 因子)`.
    pub scores: Array2<f64>,

    /// 每个因子解释的方差, 降序排列. 不是所有后端都提供.
    pub eigenvalues: Option<Array1<f64>>,
}

impl Decomposition {
    /// 因子个数.
    #[inline]
    pub fn components(&self) -> usize {
        self.factors.nrows()
    }
}

/// 分解错误.
#[derive(Debug, Clone, PartialEq)]
pub enum DecomposeError {
    /// 观测数少于特征数 (或矩阵为空). 携带矩阵形状 `(观测, 特征)`.
    TooFewObservations(Idx2d),

    /// 请求的因子个数不合法.
    InvalidComponents(usize),

    /// 后端内部失败.
    Backend(String),
}

impl fmt::Display for DecomposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecomposeError::TooFewObservations((o, n)) => {
                write!(f, "矩阵形状为 ({o}, {n}), 观测数不能少于特征数")
            }
            DecomposeError::InvalidComponents(n) => write!(f, "因子个数 {n} 不合法"),
            DecomposeError::Backend(s) => write!(f, "分解后端失败: {s}"),
        }
    }
}

impl std::error::Error for DecomposeError {}

/// 分解结果.
pub type DecomposeResult<T> = Result<T, DecomposeError>;

/// 分解后端.
pub trait Decomposer {
    /// 后端名字, 用于日志.
    fn name(&self) -> &'static str;

    /// 是否要求观测数不少于特征数. 默认要求, 能处理宽矩阵的后端应覆盖该方法.
    fn requires_tall(&self) -> bool {
        true
    }

    /// 分解 `matrix` (`观测 × 特征`), 得到至多 `n_components` 个因子.
    ///
    /// 实现应先调用 [`check_dimensions`].
    fn decompose(&self, matrix: ArrayView2<f64>, n_components: usize) -> DecomposeResult<Decomposition>;
}

/// 检查矩阵形状并返回实际使用的因子个数 `min(请求, 观测, 特征)`.
///
/// 形状不满足要求时立刻失败, 不做任何重试.
pub fn check_dimensions(matrix: ArrayView2<f64>, n_components: usize, requires_tall: bool) -> DecomposeResult<usize> {
    let (obs, features) = matrix.dim();
    if n_components == 0 {
        return Err(DecomposeError::InvalidComponents(0));
    }
    if obs == 0 || features == 0 || (requires_tall && obs < features) {
        return Err(DecomposeError::TooFewObservations((obs, features)));
    }
    let n = n_components.min(obs).min(features);
    if n < n_components {
        log::debug!("因子个数由 {n_components} 截断为 {n}");
    }
    Ok(n)
}

/// 逐列减去均值, 返回中心化后的矩阵.
pub(crate) fn centered(matrix: ArrayView2<f64>) -> Array2<f64> {
    let mut x = matrix.to_owned();
    if let Some(mean) = matrix.mean_axis(Axis(0)) {
        x -= &mean;
    }
    x
}

/// 统一因子符号: 绝对值最大的分量为正. 分数同步翻转.
pub(crate) fn normalize_signs(factors: &mut Array2<f64>, scores: &mut Array2<f64>) {
    for (i, mut f) in factors.axis_iter_mut(Axis(0)).enumerate() {
        let pivot = f
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);
        if pivot < 0.0 {
            f.mapv_inplace(|v| -v);
            scores.column_mut(i).mapv_inplace(|v| -v);
        }
    }
}
