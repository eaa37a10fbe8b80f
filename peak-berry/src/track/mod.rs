//! 跨图像的峰对应追踪.
//!
//! 每张图像独立定位峰, 再为目标集中的每个目标做邻域内最近邻匹配.
//! 目标集的顺序即峰的身份, 在整个分析过程中保持不变.

mod matching;

pub use matching::{best_match, match_targets, Match, MatchQuality};

use crate::peak::{find_peaks_with, Coordinate, LocateOptions, PeakSet, WidthSource};
use crate::{ImageSlice, ImageStack};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 对应追踪参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackOptions {
    /// 邻域半径 (像素). 为 `None` 时取每张图像所用峰宽的一半.
    pub neighborhood_radius: Option<f64>,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            neighborhood_radius: None,
        }
    }
}

impl TrackOptions {
    fn radius_for(&self, peak_width: usize) -> f64 {
        self.neighborhood_radius
            .unwrap_or(peak_width as f64 / 2.0)
    }
}

/// 从全图坐标系到某张局部图像 (如裁剪出的晶胞) 坐标系的平移.
///
/// 局部坐标 = 全图坐标 + `offset`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameOffset(pub Coordinate);

impl FrameOffset {
    /// 恒等变换.
    pub const IDENTITY: FrameOffset = FrameOffset(Coordinate::new(0.0, 0.0));

    /// 由裁剪原点 (局部图像左上角在全图中的坐标) 构建.
    #[inline]
    pub fn from_origin(origin: Coordinate) -> Self {
        Self(Coordinate::new(-origin.x, -origin.y))
    }

    /// 将全图坐标变换到局部坐标系.
    #[inline]
    pub fn to_local(&self, global: Coordinate) -> Coordinate {
        global + self.0
    }
}

/// 单张图像的追踪结果.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameTracks {
    /// 本图像使用的峰宽.
    pub width: usize,

    /// 峰宽来源.
    pub width_source: WidthSource,

    /// 本图像中检测到的候选个数.
    pub candidates: usize,

    /// 与目标集一一对应的匹配.
    pub matches: Vec<Match>,
}

impl FrameTracks {
    /// 非可信匹配的个数.
    pub fn unmatched(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| !m.quality.is_matched())
            .count()
    }
}

/// 整个图像栈的追踪结果, `frames[i].matches[k]` 对应第 `i` 张图像的第 `k` 个目标.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackTable {
    /// 按图像顺序排列.
    pub frames: Vec<FrameTracks>,
}

impl TrackTable {
    /// 图像张数.
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// 第 `image` 张图像中第 `target` 个目标的匹配. 越界返回 `None`.
    #[inline]
    pub fn get(&self, image: usize, target: usize) -> Option<&Match> {
        self.frames.get(image)?.matches.get(target)
    }

    /// 所有非可信匹配的个数.
    pub fn unmatched(&self) -> usize {
        self.frames.iter().map(FrameTracks::unmatched).sum()
    }
}

/// 对单张图像: 定位峰并匹配目标.
pub fn track_frame(
    image: ImageSlice,
    targets: &[Coordinate],
    offset: FrameOffset,
    opts: &TrackOptions,
    locate: &LocateOptions,
) -> FrameTracks {
    let set = find_peaks_with(image, locate);
    frame_from_peaks(&set, targets, offset, opts)
}

fn frame_from_peaks(
    set: &PeakSet,
    targets: &[Coordinate],
    offset: FrameOffset,
    opts: &TrackOptions,
) -> FrameTracks {
    let candidates = set.coordinates();
    let radius = opts.radius_for(set.width);
    let matches = match_targets(&candidates, targets, offset.0, radius);
    FrameTracks {
        width: set.width,
        width_source: set.source,
        candidates: candidates.len(),
        matches,
    }
}

/// 以给定邻域半径和默认定位参数追踪.
///
/// 见 [`track_with`].
pub fn track(stack: &ImageStack, targets: &[Coordinate], neighborhood_radius: f64) -> TrackTable {
    let opts = TrackOptions {
        neighborhood_radius: Some(neighborhood_radius),
    };
    track_with(stack, targets, &opts, &LocateOptions::default())
}

/// 在图像栈的每张图像中为每个目标寻找最佳匹配. 所有图像共用同一坐标系.
pub fn track_with(
    stack: &ImageStack,
    targets: &[Coordinate],
    opts: &TrackOptions,
    locate: &LocateOptions,
) -> TrackTable {
    track_in_frames(stack, targets, &vec![FrameOffset::IDENTITY; stack.depth()], opts, locate)
}

/// 在图像栈中追踪全图坐标系下的目标, 每张图像有各自的坐标系平移.
///
/// 目标先经 `offsets[i]` 变换到第 `i` 张图像的局部坐标系, 再做同样的最近邻匹配,
/// 位移在局部坐标系中计算.
///
/// # 注意
///
/// `offsets` 长度必须与图像栈深度一致, 否则程序 panic.
pub fn track_in_frames(
    stack: &ImageStack,
    targets: &[Coordinate],
    offsets: &[FrameOffset],
    opts: &TrackOptions,
    locate: &LocateOptions,
) -> TrackTable {
    assert_eq!(offsets.len(), stack.depth(), "每张图像都需要一个坐标系平移");
    let op = |i: usize, image: ImageSlice| track_frame(image, targets, offsets[i], opts, locate);

    #[cfg(feature = "rayon")]
    let frames = stack.par_map_indexed(op);
    #[cfg(not(feature = "rayon"))]
    let frames = stack.map_indexed(op);
    let table = TrackTable { frames };
    let unmatched = table.unmatched();
    if unmatched > 0 {
        log::warn!(
            "{} 张图像中共有 {unmatched} 个目标没有可信匹配",
            table.depth()
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::Lattice;
    use crate::OwnedImage;

    fn drifted_stack(base: &Lattice, drifts: &[Coordinate]) -> ImageStack {
        let images: Vec<(String, OwnedImage)> = drifts
            .iter()
            .enumerate()
            .map(|(i, d)| (format!("img{i}"), base.translated(*d).render()))
            .collect();
        ImageStack::from_images(images).unwrap()
    }

    #[test]
    fn test_track_drifting_stack() {
        let base = Lattice::square(160, 17);
        let drifts = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.4, 0.2),
            Coordinate::new(-0.3, 0.45),
            Coordinate::new(1.0, -1.0),
        ];
        let stack = drifted_stack(&base, &drifts);
        let targets = base.centers();
        let locate = LocateOptions::new(Some(17), 3);
        let opts = TrackOptions {
            neighborhood_radius: Some(4.0),
        };
        let table = track_with(&stack, &targets, &opts, &locate);

        assert_eq!(table.depth(), drifts.len());
        for (frame, drift) in table.frames.iter().zip(drifts.iter()) {
            assert_eq!(frame.matches.len(), targets.len());
            for (m, t) in frame.matches.iter().zip(targets.iter()) {
                if !m.quality.is_matched() {
                    // 贴近图像边缘的峰可能被边缘剔除.
                    assert!(t.x < 17.0 || t.y < 17.0 || t.x > 143.0 || t.y > 143.0);
                    continue;
                }
                // 同一目标始终对应同一个物理斑点.
                let truth = *t + *drift;
                assert!(m.coordinate.distance(&truth) <= 1.0);
                assert!(m.shift.norm() <= drift.norm() + 1.0);
            }
        }
    }

    #[test]
    fn test_track_in_cell_frames() {
        let base = Lattice::square(96, 17);
        let stack = drifted_stack(&base, &[Coordinate::default(), Coordinate::default()]);
        // 全图坐标系下的目标, 两张局部图像的原点分别为 (0, 0) 与 (-32, 0).
        let targets = [Coordinate::new(48.0, 48.0)];
        let offsets = [
            FrameOffset::IDENTITY,
            FrameOffset::from_origin(Coordinate::new(-32.0, 0.0)),
        ];
        let table = track_in_frames(
            &stack,
            &targets,
            &offsets,
            &TrackOptions::default(),
            &LocateOptions::new(Some(17), 3),
        );
        let a = table.get(0, 0).unwrap();
        let b = table.get(1, 0).unwrap();
        assert!(a.quality.is_matched());
        assert_eq!(a.coordinate, Coordinate::new(48.0, 48.0));
        assert!(b.quality.is_matched());
        assert_eq!(b.coordinate, Coordinate::new(80.0, 48.0));
        assert!(table.get(2, 0).is_none());
    }

    #[test]
    fn test_blank_frame_has_no_candidates() {
        let blank = OwnedImage::zeros((64, 64));
        let stack = ImageStack::from_images([("blank", blank)]).unwrap();
        let table = track(&stack, &[Coordinate::new(10.0, 10.0)], 5.0);
        let m = table.get(0, 0).unwrap();
        assert_eq!(m.quality, MatchQuality::NoCandidates);
        assert_eq!(table.unmatched(), 1);
    }
}
