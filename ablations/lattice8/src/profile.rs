//! 算法运行统计.

use std::time::{Duration, Instant};

/// ablation/benchmark 计时器.
///
/// 该计时器支持 "中途中断" 与 "结束中断, 继续开始计时".
#[derive(Clone, Debug)]
struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 初始化计时器. 初始化时会视为已经开始计时.
    #[inline]
    fn new() -> Self {
        Self {
            consumed: Duration::from_secs(0),
            since: Instant::now(),
        }
    }

    /// 开始计时.
    #[inline]
    fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束计时, 并将这一区间的时间累加. 返回本轮计时时长.
    ///
    /// # 注意
    ///
    /// 上一次调用必须是 `self.start()`, 否则计算时间值无意义.
    #[inline]
    fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    /// 累计时间 (微秒).
    #[inline]
    fn total_us(&self) -> u64 {
        self.consumed.as_micros() as u64
    }
}

/// 一个定位变体在全部合成图像上的统计.
#[derive(Clone, Debug)]
pub struct Profile {
    /// 处理的图像数.
    images: u64,

    /// 可检出的真实斑点总数 (不含边缘剔除带内的斑点).
    truth: u64,

    /// 被检出的真实斑点数.
    hits: u64,

    /// 附近没有真实斑点的检测数.
    false_positives: u64,

    /// 被检出不止一次的真实斑点数.
    duplicates: u64,

    /// 定位本身花费的时间.
    locate_time: AccTimer,

    /// 最耗时的一张图像.
    most: Option<Duration>,
}

impl Profile {
    /// 初始化.
    pub fn new() -> Self {
        Self {
            images: 0,
            truth: 0,
            hits: 0,
            false_positives: 0,
            duplicates: 0,
            locate_time: AccTimer::new(),
            most: None,
        }
    }

    /// 开始一张图像的计时.
    #[inline]
    pub fn start(&mut self) {
        self.locate_time.start();
    }

    /// 结束一张图像的计时.
    #[inline]
    pub fn stop(&mut self) {
        let d = self.locate_time.elapsed();
        self.images += 1;
        self.most = Some(self.most.map_or(d, |m| m.max(d)));
    }

    /// 记录一张图像的比对结果.
    pub fn count(&mut self, truth: u64, hits: u64, false_positives: u64, duplicates: u64) {
        self.truth += truth;
        self.hits += hits;
        self.false_positives += false_positives;
        self.duplicates += duplicates;
    }

    /// 召回率. 没有可检出斑点时返回 `None`.
    pub fn recall(&self) -> Option<f64> {
        match self.truth {
            0 => None,
            t => Some(self.hits as f64 / t as f64),
        }
    }

    /// 图像数.
    #[inline]
    pub fn images(&self) -> u64 {
        self.images
    }

    /// 误检数.
    #[inline]
    pub fn false_positives(&self) -> u64 {
        self.false_positives
    }

    /// 重复检出数.
    #[inline]
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// 平均每张图像的定位时间 (微秒).
    pub fn avg_time_us(&self) -> Option<f64> {
        match self.images {
            0 => None,
            n => Some(self.locate_time.total_us() as f64 / n as f64),
        }
    }

    /// 最耗时的一张图像.
    #[inline]
    pub fn most_time_consuming(&self) -> Option<Duration> {
        self.most
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}
