//! 单张图像的峰定位.

use super::spatial::KdTree;
use super::{estimate_width_with, Coordinate, Peak, WidthOptions};
use crate::consts::{DEFAULT_MIN_SEPARATION, DEFAULT_SMOOTHING_RADIUS, FALLBACK_PEAK_WIDTH};
use crate::eight::{erode8, local_maxima8};
use crate::filter::{gaussian_template, median_filter, normalized_cross_correlation};
use crate::{ImageSlice, OwnedImage};
use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 去重时两峰之间的最小间距.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Separation {
    /// 固定像素数.
    Pixels(f64),

    /// 峰宽的一个比例.
    WidthFraction(f64),
}

impl Separation {
    /// 给定峰宽下的实际间距 (像素).
    #[inline]
    pub fn resolve(&self, peak_width: usize) -> f64 {
        match *self {
            Separation::Pixels(px) => px,
            Separation::WidthFraction(f) => f * peak_width as f64,
        }
    }
}

/// 峰定位参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocateOptions {
    /// 峰宽. 为 `None` 时自动估计.
    pub peak_width: Option<usize>,

    /// 中值滤波半径, 0 表示不滤波.
    pub smoothing_radius: usize,

    /// 去重最小间距.
    pub separation: Separation,

    /// 互相关下限. 不高于它的值一律视为背景.
    pub correlation_floor: f64,

    /// 剔除背景前是否先将背景掩码腐蚀一个像素.
    pub erode_background: bool,

    /// 峰宽估计失败时使用的保守峰宽.
    pub fallback_width: usize,

    /// 自动估计峰宽时的参数.
    pub width: WidthOptions,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            peak_width: None,
            smoothing_radius: DEFAULT_SMOOTHING_RADIUS,
            separation: Separation::Pixels(DEFAULT_MIN_SEPARATION),
            correlation_floor: 0.0,
            erode_background: true,
            fallback_width: FALLBACK_PEAK_WIDTH,
            width: WidthOptions::default(),
        }
    }
}

impl LocateOptions {
    /// 以给定峰宽 (若有) 和中值滤波半径构建, 其余参数取默认值.
    #[inline]
    pub fn new(peak_width: Option<usize>, smoothing_radius: usize) -> Self {
        Self {
            peak_width,
            smoothing_radius,
            ..Default::default()
        }
    }
}

/// 本次定位所用峰宽的来源.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WidthSource {
    /// 由调用者提供.
    Supplied,

    /// 由峰宽估计得到.
    Estimated,

    /// 峰宽估计失败, 使用了保守默认值. 结果置信度较低.
    Fallback,
}

/// 一次峰定位的结果.
#[derive(Clone, Debug, PartialEq)]
pub struct PeakSet {
    /// 检测到的峰. 顺序没有语义.
    pub peaks: Vec<Peak>,

    /// 本次使用的峰宽.
    pub width: usize,

    /// 峰宽来源.
    pub source: WidthSource,
}

impl PeakSet {
    /// 峰个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    /// 是否没有任何峰?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// 结果是否因峰宽估计失败而置信度较低?
    #[inline]
    pub fn is_low_confidence(&self) -> bool {
        self.source == WidthSource::Fallback
    }

    /// 所有峰坐标.
    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.peaks.iter().map(|p| p.position).collect()
    }
}

/// 以给定峰宽 (若有) 和中值滤波半径定位峰, 其余参数取默认值.
///
/// 见 [`find_peaks_with`].
#[inline]
pub fn find_peaks(image: ImageSlice, peak_width: Option<usize>, smoothing_radius: usize) -> PeakSet {
    find_peaks_with(image, &LocateOptions::new(peak_width, smoothing_radius))
}

/// 在单张图像上定位峰.
///
/// 依次执行中值滤波, 高斯模板归一化互相关, 局部极大值筛选, 背景剔除,
/// 去重, 边缘剔除, 以及互相关偏移补偿.
/// 没有任何峰时返回空集合, 这不是错误.
///
/// # 注意
///
/// 若提供的峰宽为 0, 程序 panic.
pub fn find_peaks_with(image: ImageSlice, opts: &LocateOptions) -> PeakSet {
    let (width, source) = match opts.peak_width {
        Some(w) => {
            assert_ne!(w, 0, "峰宽不能为 0");
            (w, WidthSource::Supplied)
        }
        None => match estimate_width_with(image, &opts.width) {
            0 => {
                log::warn!(
                    "峰宽估计失败, 使用保守峰宽 {} 继续定位, 结果置信度较低",
                    opts.fallback_width
                );
                (opts.fallback_width, WidthSource::Fallback)
            }
            w => (w, WidthSource::Estimated),
        },
    };
    let peaks = LocateImp::new(image, width, opts).locate();
    PeakSet {
        peaks,
        width,
        source,
    }
}

/// 峰定位实现.
struct LocateImp<'img, 'opt> {
    image: ImageSlice<'img>,
    width: usize,
    opts: &'opt LocateOptions,
}

impl<'img, 'opt> LocateImp<'img, 'opt> {
    fn new(image: ImageSlice<'img>, width: usize, opts: &'opt LocateOptions) -> Self {
        Self { image, width, opts }
    }

    fn locate(&self) -> Vec<Peak> {
        let smoothed = median_filter(self.image, self.opts.smoothing_radius);
        let filtered = smoothed.as_immutable();
        let corr = self.correlate(filtered);
        let candidates = self.candidates(&corr);
        let kept = self.deduplicate(&candidates);

        let (h, w) = self.image.shape();
        let half = self.width as f64 / 2.0;
        let offset = (self.width / 2) as f64;
        kept.into_iter()
            .map(|c| Coordinate::new(c.x + offset, c.y + offset))
            .filter(|c| {
                half <= c.x && c.x <= w as f64 - half && half <= c.y && c.y <= h as f64 - half
            })
            .filter_map(|position| {
                let height = filtered.get(position.to_pixel()?).copied()?;
                Some(Peak { position, height })
            })
            .collect()
    }

    /// 互相关图, 低于下限的值被抬升到下限.
    fn correlate(&self, filtered: ImageSlice) -> Array2<f64> {
        let template = gaussian_template(self.width);
        let floor = self.opts.correlation_floor;
        normalized_cross_correlation(filtered, template.view())
            .into_raw()
            .mapv_into(|v| v.max(floor))
    }

    /// 局部极大值中去掉背景后的候选点, 坐标位于互相关坐标系, 按行优先排列.
    ///
    /// 背景掩码先腐蚀一个像素再剔除, 避免在背景/前景交界处留下一圈伪峰.
    fn candidates(&self, corr: &Array2<f64>) -> Vec<Coordinate> {
        let radius = (self.width / 4).max(1);
        let maxima = local_maxima8(corr.view(), radius);
        let floor = self.opts.correlation_floor;
        let mut background = corr.mapv(|v| v <= floor);
        if self.opts.erode_background {
            background = erode8(background.view(), true);
        }

        maxima
            .indexed_iter()
            .filter(|(pos, &is_max)| is_max && !background[*pos])
            .map(|(pos, _)| Coordinate::from_pixel(pos))
            .collect()
    }

    /// 距离小于最小间距的两点只保留下标较小者.
    fn deduplicate(&self, candidates: &[Coordinate]) -> Vec<Coordinate> {
        let sep = self.opts.separation.resolve(self.width);
        let tree = KdTree::build(candidates);
        let mut removed = vec![false; candidates.len()];
        for (i, c) in candidates.iter().enumerate() {
            if removed[i] {
                continue;
            }
            for j in tree.within(*c, sep) {
                if j > i {
                    removed[j] = true;
                }
            }
        }
        candidates
            .iter()
            .zip(removed)
            .filter(|(_, r)| !r)
            .map(|(c, _)| *c)
            .collect()
    }
}

/// 在已算好的互相关图上提取去重后的局部极大值, 坐标位于互相关坐标系 (即模板左上角).
///
/// `side` 决定局部极大值邻域的大小, 不做边缘剔除和偏移补偿.
pub(crate) fn correlation_peaks(corr: &OwnedImage, side: usize, separation: f64, floor: f64) -> Vec<Peak> {
    let opts = LocateOptions {
        separation: Separation::Pixels(separation),
        correlation_floor: floor,
        ..Default::default()
    };
    let view = corr.as_immutable();
    let imp = LocateImp::new(view, side.max(1), &opts);
    let clipped = view.data().mapv(|v| v.max(floor));
    let candidates = imp.candidates(&clipped);
    imp.deduplicate(&candidates)
        .into_iter()
        .filter_map(|position| {
            let height = *view.get(position.to_pixel()?)?;
            Some(Peak { position, height })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::Lattice;
    use ndarray::Array2;

    #[test]
    fn test_lattice_scenario() {
        let lattice = Lattice::square(256, 17);
        let img = lattice.render();
        let set = find_peaks(img.as_immutable(), Some(17), 3);

        assert_eq!(set.source, WidthSource::Supplied);
        assert!((62..=66).contains(&set.len()), "found {}", set.len());
        let truth = lattice.centers();
        for p in set.peaks.iter() {
            let nearest = truth
                .iter()
                .map(|t| t.distance(&p.position))
                .fold(f64::INFINITY, f64::min);
            assert!(nearest <= 1.0, "{:?} is {nearest} px off", p.position);
        }
    }

    #[test]
    fn test_idempotent() {
        let img = Lattice::square(128, 11).render();
        let a = find_peaks(img.as_immutable(), Some(11), 2);
        let b = find_peaks(img.as_immutable(), Some(11), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_edge_exclusion_and_separation() {
        let lattice = Lattice {
            spacing: 14.0,
            origin: 3.0,
            ..Lattice::square(100, 9)
        };
        let img = lattice.render();
        let w = 9usize;
        let opts = LocateOptions {
            peak_width: Some(w),
            separation: Separation::WidthFraction(1.2),
            ..Default::default()
        };
        let set = find_peaks_with(img.as_immutable(), &opts);
        assert!(!set.is_empty());

        let (hh, ww) = img.shape();
        let half = w as f64 / 2.0;
        for c in set.coordinates() {
            assert!(half <= c.x && c.x <= ww as f64 - half);
            assert!(half <= c.y && c.y <= hh as f64 - half);
        }
        let coords = set.coordinates();
        let sep = opts.separation.resolve(w);
        for (i, a) in coords.iter().enumerate() {
            for b in coords.iter().skip(i + 1) {
                assert!(a.distance(b) >= sep);
            }
        }
    }

    #[test]
    fn test_blank_image_has_no_peaks() {
        let img = Array2::<f64>::zeros((64, 64));
        let set = find_peaks(img.view().into(), Some(9), 3);
        assert!(set.is_empty());
    }

    #[test]
    fn test_fallback_width_is_low_confidence() {
        let img = Array2::from_elem((40, 40), 1.0);
        let set = find_peaks(img.view().into(), None, 0);
        assert_eq!(set.source, WidthSource::Fallback);
        assert_eq!(set.width, FALLBACK_PEAK_WIDTH);
        assert!(set.is_low_confidence());
        assert!(set.is_empty());
    }

    #[test]
    fn test_estimated_width() {
        let img = Lattice::square(192, 17).render();
        let set = find_peaks(img.as_immutable(), None, 3);
        assert_eq!(set.source, WidthSource::Estimated);
        assert!(!set.is_empty());
    }
}
