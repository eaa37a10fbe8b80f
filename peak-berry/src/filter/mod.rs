//! 图像滤波: 中值滤波, 高斯平滑/模板, 归一化互相关.

mod gauss;
mod median;
mod xcorr;

pub use gauss::{blur_1d, gaussian_kernel_1d, gaussian_template};
pub use median::{median_abs_deviation, median_filter, median_of};
pub use xcorr::normalized_cross_correlation;
