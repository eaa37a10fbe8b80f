//! 特征表: 观测 × (特征, 峰序号).
//!
//! 内部始终以 `(Characteristic, 峰序号)` 结构化地访问数值, 只有在存储边界才展开成
//! `x0, y0, dx0, ...` 形式的列名. 内部代码永远不需要把列名拆回去.

mod matrix;
mod reshape;
mod table;

pub use matrix::{ColumnOrder, DataKind, FeatureMatrix, FeatureSelection};
pub use reshape::{reshape, score_columns, score_rows, FeatureVector, Reshaped, ScoreRow};
pub use table::{FeatureLayout, FeatureOptions, FeatureRow, FeatureTable, RowKey};

use crate::Idx2d;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 每个峰的一项特征.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Characteristic {
    /// 列方向坐标.
    X,
    /// 行方向坐标.
    Y,
    /// 相对目标的列方向位移.
    Dx,
    /// 相对目标的行方向位移.
    Dy,
    /// 峰高.
    H,
    /// 方向 (角度制).
    O,
    /// 离心率.
    E,
    /// x 方向偏度.
    Sx,
    /// y 方向偏度.
    Sy,
}

impl Characteristic {
    /// 全部 9 项特征, 按列顺序排列.
    pub const ALL: [Characteristic; 9] = [
        Characteristic::X,
        Characteristic::Y,
        Characteristic::Dx,
        Characteristic::Dy,
        Characteristic::H,
        Characteristic::O,
        Characteristic::E,
        Characteristic::Sx,
        Characteristic::Sy,
    ];

    /// 分解默认使用的特征: 位移, 峰高, 方向, 离心率.
    pub const DECOMPOSITION: [Characteristic; 5] = [
        Characteristic::Dx,
        Characteristic::Dy,
        Characteristic::H,
        Characteristic::O,
        Characteristic::E,
    ];

    /// 列名前缀.
    pub fn code(&self) -> &'static str {
        match self {
            Characteristic::X => "x",
            Characteristic::Y => "y",
            Characteristic::Dx => "dx",
            Characteristic::Dy => "dy",
            Characteristic::H => "h",
            Characteristic::O => "o",
            Characteristic::E => "e",
            Characteristic::Sx => "sx",
            Characteristic::Sy => "sy",
        }
    }

    /// 是否是偏度特征?
    #[inline]
    pub fn is_skew(&self) -> bool {
        matches!(self, Characteristic::Sx | Characteristic::Sy)
    }

    /// 存储边界上的列名, 如 `dx3`.
    #[inline]
    pub fn column(&self, peak: usize) -> String {
        format!("{}{peak}", self.code())
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 特征表相关错误.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureError {
    /// 没有任何可用的行或列.
    Empty,

    /// 特征矩阵中出现了非有限值. 携带行键与列名.
    NonFinite {
        /// 出错的行.
        key: RowKey,
        /// 出错的列.
        column: String,
    },

    /// 数据个数与布局不符.
    ///
    /// 第一个参数为期望个数, 第二个参数为实际个数.
    LayoutMismatch(usize, usize),

    /// 选择了布局中不存在的特征 (如关闭偏度时选择了 `sx`).
    MissingCharacteristic(Characteristic),

    /// 选择了不存在的峰序号.
    PeakOutOfRange(usize),
}

impl fmt::Display for FeatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureError::Empty => write!(f, "特征矩阵为空"),
            FeatureError::NonFinite { key, column } => {
                write!(f, "行 {key} 的列 {column} 不是有限值")
            }
            FeatureError::LayoutMismatch(e, a) => write!(f, "期望 {e} 个值, 实际 {a} 个"),
            FeatureError::MissingCharacteristic(c) => write!(f, "布局中没有特征 {c}"),
            FeatureError::PeakOutOfRange(k) => write!(f, "峰序号 {k} 越界"),
        }
    }
}

impl std::error::Error for FeatureError {}

/// 特征表操作结果.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// 分解结果重塑时的形状不一致.
///
/// 下游的图像/向量重建会被悄悄破坏, 因此这是致命错误.
#[derive(Debug, Clone, PartialEq)]
pub enum ReshapeError {
    /// 因子矩阵形状不符. 期望形状, 实际形状.
    Factors(Idx2d, Idx2d),

    /// 分数矩阵形状不符. 期望形状, 实际形状.
    Scores(Idx2d, Idx2d),
}

impl fmt::Display for ReshapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReshapeError::Factors(e, a) => write!(f, "因子矩阵形状应为 {e:?}, 实际为 {a:?}"),
            ReshapeError::Scores(e, a) => write!(f, "分数矩阵形状应为 {e:?}, 实际为 {a:?}"),
        }
    }
}

impl std::error::Error for ReshapeError {}

/// 重塑结果.
pub type ReshapeResult<T> = Result<T, ReshapeError>;
