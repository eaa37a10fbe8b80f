//! 分析进度统计与取消.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 分析进度. 所有计数器都是原子的, 可在并行处理图像时同时更新.
#[derive(Debug)]
pub struct Progress {
    /// 已处理的图像数.
    images: AtomicUsize,

    /// 成功刻画 (非退化) 的峰数.
    peaks: AtomicUsize,

    /// 没有任何候选峰的图像数.
    failed: AtomicUsize,

    /// 本轮分析开始的时刻.
    since: Instant,
}

/// 某一时刻的进度快照.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// 已处理的图像数.
    pub images: usize,

    /// 成功刻画的峰数.
    pub peaks: usize,

    /// 没有任何候选峰的图像数.
    pub failed: usize,

    /// 已用时间.
    pub elapsed: Duration,
}

impl Progress {
    /// 初始化, 同时开始计时.
    pub fn new() -> Self {
        Self {
            images: AtomicUsize::new(0),
            peaks: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            since: Instant::now(),
        }
    }

    /// 记录一张处理完的图像.
    #[inline]
    pub fn count_image(&self, peaks: usize, failed: bool) {
        self.images.fetch_add(1, Ordering::Relaxed);
        self.peaks.fetch_add(peaks, Ordering::Relaxed);
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 已处理的图像数.
    #[inline]
    pub fn images(&self) -> usize {
        self.images.load(Ordering::Relaxed)
    }

    /// 当前快照.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            images: self.images(),
            peaks: self.peaks.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            elapsed: self.since.elapsed(),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// 取消标记. 克隆后的标记共享同一状态.
///
/// 分析只在两张图像之间检查该标记, 不会中断正在处理的图像.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// 初始化为未取消.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消.
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// 是否已请求取消?
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
