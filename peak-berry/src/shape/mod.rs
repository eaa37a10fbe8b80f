//! 峰形状刻画.
//!
//! 由峰邻域的图像矩导出位置, 轴长, 方向, 离心率和偏度, 可选地用带约束的高斯拟合精化,
//! 最后在整张图像内做一次峰高离群标记.

mod characterize;
mod gauss_fit;
mod moments;
mod outlier;

pub use characterize::{characterize, characterize_with, PeakAttributes, ShapeOptions, ShapeStatus};
pub use gauss_fit::{fit_gaussian, GaussFit, GaussGuess, LmConfig};
pub use moments::{DirectMoments, MomentError, MomentPrimitive, MomentResult, Moments};
pub use outlier::flag_outliers;
