//! 通用常量.

/// 峰宽估计窗口的默认边长.
pub const DEFAULT_WINDOW_SIZE: usize = 64;

/// 中值滤波的默认半径. 滤波窗口边长为 `2 * r + 1`.
pub const DEFAULT_SMOOTHING_RADIUS: usize = 3;

/// 峰宽估计失败时, 峰定位使用的保守默认峰宽.
pub const FALLBACK_PEAK_WIDTH: usize = 10;

/// 去重时两个峰之间的默认最小间距 (像素).
pub const DEFAULT_MIN_SEPARATION: f64 = 10.0;

/// 最近邻匹配中, 被邻域屏蔽的候选所使用的哨兵距离.
pub const FAR_DISTANCE: f64 = 10000.0;

/// 峰宽估计中, 低比例阈值占剖面峰高的比例.
pub const WIDTH_LOW_FRACTION: f64 = 0.125;

/// 模板高斯的标准差与峰宽之比.
pub const TEMPLATE_SIGMA_RATIO: f64 = 0.25;

/// 离群剔除: 高度偏离中位数超过多少倍 MAD 视为离群.
pub const OUTLIER_MAD_FACTOR: f64 = 10.0;

/// 离群剔除: 高度超过图像最大值多少倍视为离群.
pub const OUTLIER_MAX_RATIO: f64 = 1.3;

/// 高斯拟合: 中心相对矩估计允许偏移的最大像素数.
pub const FIT_CENTER_SLACK: f64 = 2.0;

/// 高斯拟合: 宽度上界 (像素).
pub const FIT_MAX_SIGMA: f64 = 30.0;

/// 高斯拟合: 宽度下界 (像素). 取正数以避免除零.
pub const FIT_MIN_SIGMA: f64 = 0.1;

/// 特征表中记录峰个数的属性名.
pub const NUMBER_OF_PEAKS: &str = "number_of_peaks";

/// 单通道颜色.
pub mod gray {
    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;
}
