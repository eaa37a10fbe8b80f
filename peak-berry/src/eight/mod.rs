//! 8-邻域形态学操作.
//!
//! 结构元素固定为 3x3 方形 (即 8-邻接). 半径为 `k` 的方形邻域通过迭代 `k` 次得到.

mod morph;

pub use morph::{erode8, grey_dilate8, local_maxima8};

use crate::Idx2d;

/// 获得 `(h, w)` 的 8-邻居索引. 不检查越界.
///
/// 越界方向上的索引会变为 `usize::MAX` 附近的值 (或保持原值加一),
/// 调用者应通过 `check` 一类函数过滤它们.
#[inline]
pub(crate) fn neighbour8((h, w): Idx2d) -> [Idx2d; 8] {
    [
        (h.wrapping_sub(1), w.wrapping_sub(1)),
        (h.wrapping_sub(1), w),
        (h.wrapping_sub(1), w.saturating_add(1)),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
        (h.saturating_add(1), w.wrapping_sub(1)),
        (h.saturating_add(1), w),
        (h.saturating_add(1), w.saturating_add(1)),
    ]
}
