//! 单张图像内的峰高离群标记.

use super::{PeakAttributes, ShapeStatus};
use crate::filter::median_abs_deviation;

/// 标记峰高离群的峰, 返回新标记的个数.
///
/// 只考虑状态为 [`ShapeStatus::Moments`] 或 [`ShapeStatus::Fitted`] 的行. 满足以下任一条件即视为离群:
///
/// 1. `|h - median| > mad_factor * MAD`;
/// 2. `h > max_ratio * image_max`.
///
/// 离群行只改状态, 不删除, 以保持行内峰下标不变.
/// MAD 的下限为 `1e-6 * |median|`, 峰高几乎一致时不会把数值误差判为离群.
pub fn flag_outliers(
    rows: &mut [PeakAttributes],
    image_max: f64,
    mad_factor: f64,
    max_ratio: f64,
) -> usize {
    let heights: Vec<f64> = rows
        .iter()
        .filter(|r| r.status.is_measured())
        .map(|r| r.height)
        .filter(|h| h.is_finite())
        .collect();
    let Some((median, mad)) = median_abs_deviation(&heights) else {
        return 0;
    };
    let spread = mad.max(1e-6 * median.abs());

    let mut flagged = 0;
    for row in rows.iter_mut().filter(|r| r.status.is_measured()) {
        let h = row.height;
        let off_median = (h - median).abs() > mad_factor * spread;
        let too_high = image_max.is_finite() && h > max_ratio * image_max;
        if !h.is_finite() || off_median || too_high {
            row.status = ShapeStatus::Outlier;
            flagged += 1;
        }
    }
    if flagged > 0 {
        log::debug!("{flagged} 个峰被标记为离群 (中位数 {median}, MAD {mad})");
    }
    flagged
}
