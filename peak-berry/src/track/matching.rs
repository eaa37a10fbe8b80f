use crate::consts::FAR_DISTANCE;
use crate::peak::Coordinate;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 一次最近邻匹配的可信程度.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MatchQuality {
    /// 邻域内找到了候选.
    Matched,

    /// 图像中有候选, 但都在邻域之外. 位移无意义.
    OutsideNeighborhood,

    /// 图像中没有任何候选.
    NoCandidates,
}

impl MatchQuality {
    /// 是否是可信匹配?
    #[inline]
    pub fn is_matched(&self) -> bool {
        *self == MatchQuality::Matched
    }
}

/// 某个目标在一张图像中的匹配结果.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Match {
    /// 匹配到的候选坐标. 无候选时为 `NaN`.
    ///
    /// 质量为 [`MatchQuality::OutsideNeighborhood`] 时, 这里仍给出最近的候选, 仅供诊断.
    pub coordinate: Coordinate,

    /// `coordinate - target`. 只有可信匹配才是有限值, 否则为 `NaN`.
    pub shift: Coordinate,

    /// 到目标的真实欧氏距离. 无候选时为正无穷.
    pub distance: f64,

    /// 匹配质量.
    pub quality: MatchQuality,
}

impl Match {
    fn no_candidates() -> Self {
        Self {
            coordinate: Coordinate::nan(),
            shift: Coordinate::nan(),
            distance: f64::INFINITY,
            quality: MatchQuality::NoCandidates,
        }
    }
}

/// 在 `candidates` 中为 `target` 找到最近的候选.
///
/// 距离大于 `radius` 的候选被屏蔽为哨兵距离 [`FAR_DISTANCE`], 永远不会被选中;
/// 距离相同时取下标较小者. 若全部候选都被屏蔽, 结果标记为
/// [`MatchQuality::OutsideNeighborhood`], 位移为 `NaN`.
pub fn best_match(candidates: &[Coordinate], target: Coordinate, radius: f64) -> Match {
    let scored: Vec<(f64, f64)> = candidates
        .iter()
        .map(|c| {
            let d = c.distance(&target);
            match d <= radius {
                true => (d, d),
                false => (d, FAR_DISTANCE),
            }
        })
        .collect();
    // `min_by` 在相等时返回第一个元素.
    let Some((index, &(distance, _))) = scored
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.1.total_cmp(&b.1))
    else {
        return Match::no_candidates();
    };

    if !(distance <= radius) {
        let (index, &(distance, _)) = scored
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.0.total_cmp(&b.0))
            .unwrap_or((index, &(distance, FAR_DISTANCE)));
        log::debug!("目标 {target:?} 的邻域 {radius} 内没有候选, 最近候选距离 {distance}");
        return Match {
            coordinate: candidates[index],
            shift: Coordinate::nan(),
            distance,
            quality: MatchQuality::OutsideNeighborhood,
        };
    }
    let coordinate = candidates[index];
    Match {
        coordinate,
        shift: coordinate - target,
        distance,
        quality: MatchQuality::Matched,
    }
}

/// 为一组目标逐个匹配. `offset` 先加到每个目标上, 将其变换到候选所在的坐标系.
pub fn match_targets(
    candidates: &[Coordinate],
    targets: &[Coordinate],
    offset: Coordinate,
    radius: f64,
) -> Vec<Match> {
    targets
        .iter()
        .map(|t| best_match(candidates, *t + offset, radius))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_within_radius() {
        let cands = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(10.0, 10.0),
            Coordinate::new(11.0, 10.5),
        ];
        let m = best_match(&cands, Coordinate::new(10.5, 10.5), 3.0);
        assert_eq!(m.quality, MatchQuality::Matched);
        assert_eq!(m.coordinate, cands[2]);
        assert_eq!(m.shift, Coordinate::new(0.5, 0.0));
    }

    #[test]
    fn test_tie_keeps_lower_index() {
        let cands = [Coordinate::new(1.0, 0.0), Coordinate::new(-1.0, 0.0)];
        let m = best_match(&cands, Coordinate::default(), 2.0);
        assert_eq!(m.coordinate, cands[0]);
    }

    #[test]
    fn test_outside_neighborhood_is_flagged() {
        let cands = [Coordinate::new(50.0, 0.0), Coordinate::new(20.0, 0.0)];
        let m = best_match(&cands, Coordinate::default(), 5.0);
        assert_eq!(m.quality, MatchQuality::OutsideNeighborhood);
        assert_eq!(m.coordinate, cands[1]);
        assert_eq!(m.distance, 20.0);
        assert!(!m.shift.is_finite());
        assert!(!m.quality.is_matched());
    }

    #[test]
    fn test_no_candidates() {
        let m = best_match(&[], Coordinate::new(3.0, 3.0), 5.0);
        assert_eq!(m.quality, MatchQuality::NoCandidates);
        assert!(m.coordinate.x.is_nan());
        assert_eq!(m.distance, f64::INFINITY);
    }

    #[test]
    fn test_match_targets_with_offset() {
        let cands = [Coordinate::new(2.0, 3.0), Coordinate::new(12.0, 3.0)];
        let targets = [Coordinate::new(20.0, 20.0), Coordinate::new(30.0, 20.0)];
        let ms = match_targets(&cands, &targets, Coordinate::new(-18.0, -17.0), 2.0);
        assert_eq!(ms[0].coordinate, cands[0]);
        assert_eq!(ms[1].coordinate, cands[1]);
        assert!(ms.iter().all(|m| m.shift.norm() < 1e-12));
    }
}
