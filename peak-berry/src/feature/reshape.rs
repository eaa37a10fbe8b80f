use super::{Characteristic, DataKind, ReshapeError, ReshapeResult, RowKey};
use crate::peak::Coordinate;
use crate::OwnedImage;
use ndarray::{Array2, ArrayView2, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 峰类数据的一个分解因子, 以 `(特征, 峰序号)` 结构化存储.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureVector {
    /// `(特征, 峰序号, 载荷)`, 顺序与特征矩阵的列一致.
    pub entries: Vec<(Characteristic, usize, f64)>,
}

impl FeatureVector {
    /// 第 `peak` 个峰特征 `ch` 上的载荷. 未被选用时返回 `None`.
    pub fn get(&self, ch: Characteristic, peak: usize) -> Option<f64> {
        self.entries
            .iter()
            .find(|(c, k, _)| *c == ch && *k == peak)
            .map(|e| e.2)
    }

    /// 特征 `ch` 的载荷与对应目标坐标, 按峰序号排列. 便于叠加到图像上显示.
    pub fn at_targets(&self, targets: &[Coordinate], ch: Characteristic) -> Vec<(Coordinate, f64)> {
        let mut out: Vec<(usize, f64)> = self
            .entries
            .iter()
            .filter(|(c, k, _)| *c == ch && *k < targets.len())
            .map(|&(_, k, v)| (k, v))
            .collect();
        out.sort_by_key(|e| e.0);
        out.into_iter().map(|(k, v)| (targets[k], v)).collect()
    }
}

/// 重塑后的分解结果.
#[derive(Clone, Debug, PartialEq)]
pub enum Reshaped {
    /// 图像类数据: 每个因子是一张与输入同形状的图像.
    Image {
        /// 因子图像.
        factors: Vec<OwnedImage>,
        /// 形状为 `(观测, 因子)`.
        scores: Array2<f64>,
    },

    /// 峰类数据: 每个因子是一组按 `(特征, 峰序号)` 索引的载荷.
    Peaks {
        /// 因子向量.
        factors: Vec<FeatureVector>,
        /// 形状为 `(观测, 因子)`.
        scores: Array2<f64>,
    },
}

impl Reshaped {
    /// 因子个数.
    pub fn components(&self) -> usize {
        match self {
            Reshaped::Image { factors, .. } => factors.len(),
            Reshaped::Peaks { factors, .. } => factors.len(),
        }
    }

    /// 分数矩阵.
    pub fn scores(&self) -> ArrayView2<'_, f64> {
        match self {
            Reshaped::Image { scores, .. } | Reshaped::Peaks { scores, .. } => scores.view(),
        }
    }
}

/// 将分解得到的 `factors` (`因子 × 特征`) 与 `scores` (`观测 × 因子`)
/// 按数据来源重塑.
///
/// 形状与 `kind` 不符时返回错误, 绝不截断或填充.
pub fn reshape(factors: ArrayView2<f64>, scores: ArrayView2<f64>, kind: &DataKind) -> ReshapeResult<Reshaped> {
    let n = factors.nrows();
    let features = kind.features();
    if factors.ncols() != features {
        return Err(ReshapeError::Factors((n, features), factors.dim()));
    }
    if scores.ncols() != n {
        return Err(ReshapeError::Scores((scores.nrows(), n), scores.dim()));
    }

    let scores = scores.to_owned();
    let reshaped = match kind {
        DataKind::Image { shape } => {
            let mut images = Vec::with_capacity(n);
            for f in factors.axis_iter(Axis(0)) {
                let image = f
                    .to_owned()
                    .into_shape(*shape)
                    .map_err(|_| ReshapeError::Factors((n, features), factors.dim()))?;
                images.push(OwnedImage::from(image));
            }
            Reshaped::Image {
                factors: images,
                scores,
            }
        }
        DataKind::Peaks { columns } => {
            let factors = factors
                .axis_iter(Axis(0))
                .map(|f| FeatureVector {
                    entries: columns
                        .iter()
                        .zip(f.iter())
                        .map(|(&(c, k), &v)| (c, k, v))
                        .collect(),
                })
                .collect();
            Reshaped::Peaks { factors, scores }
        }
    };
    Ok(reshaped)
}

/// 一个观测的分数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoreRow {
    /// 观测标识.
    pub key: RowKey,

    /// 各因子上的分数, 列名见 [`score_columns`].
    pub scores: Vec<f64>,
}

/// 把分数矩阵的每一行按 `row_map` 还原为原表的行键.
///
/// 被排除的观测不在 `row_map` 中, 因此也不会出现在结果里.
pub fn score_rows(keys: &[RowKey], row_map: &[usize], scores: ArrayView2<f64>) -> ReshapeResult<Vec<ScoreRow>> {
    if row_map.len() != scores.nrows() || row_map.iter().any(|&i| i >= keys.len()) {
        return Err(ReshapeError::Scores((row_map.len(), scores.ncols()), scores.dim()));
    }
    Ok(row_map
        .iter()
        .zip(scores.axis_iter(Axis(0)))
        .map(|(&i, s)| ScoreRow {
            key: keys[i].clone(),
            scores: s.to_vec(),
        })
        .collect())
}

/// 分数列名 `c0, c1, ...`.
pub fn score_columns(components: usize) -> Vec<String> {
    (0..components).map(|i| format!("c{i}")).collect()
}

#[cfg(test)]
mod tests {
    use super::super::table::tests::synthetic;
    use super::super::FeatureSelection;
    use super::*;

    #[test]
    fn test_peaks_reshape_and_scores_skip_omitted() {
        let mut table = synthetic(20, 3);
        for i in [0, 9, 13] {
            table.set_omit(i, true);
        }
        let m = table.matrix(&FeatureSelection::default()).unwrap();
        let factors = Array2::from_shape_fn((2, m.features()), |(i, j)| (i * 100 + j) as f64);
        let scores = Array2::from_shape_fn((m.observations(), 2), |(i, j)| (i * 2 + j) as f64);
        let r = reshape(factors.view(), scores.view(), &m.kind).unwrap();

        assert_eq!(r.components(), 2);
        let Reshaped::Peaks { factors: fv, .. } = &r else {
            panic!("应为峰类数据");
        };
        // 默认按峰优先: 第 1 个峰的 h 位于第 5 + 2 = 7 列.
        assert_eq!(fv[1].get(Characteristic::H, 1), Some(107.0));
        assert_eq!(fv[0].get(Characteristic::Sx, 0), None);
        let at = fv[0].at_targets(&table.targets, Characteristic::Dx);
        assert_eq!(at.len(), 3);
        assert_eq!(at[2], (table.targets[2], 10.0));

        let keys: Vec<RowKey> = table.rows.iter().map(|r| r.key.clone()).collect();
        let rows = score_rows(&keys, &m.row_map, r.scores()).unwrap();
        assert_eq!(rows.len(), 17);
        for omitted in [0, 9, 13] {
            assert!(rows.iter().all(|r| r.key.index != omitted));
        }
        assert_eq!(rows[0].key, RowKey::new("file.png", 1));
        assert_eq!(rows[0].scores, vec![0.0, 1.0]);
        assert_eq!(score_columns(2), ["c0", "c1"]);
    }

    #[test]
    fn test_image_reshape() {
        let kind = DataKind::Image { shape: (2, 3) };
        let factors = Array2::from_shape_fn((1, 6), |(_, j)| j as f64);
        let scores = Array2::zeros((4, 1));
        let r = reshape(factors.view(), scores.view(), &kind).unwrap();
        let Reshaped::Image { factors, scores } = r else {
            panic!("应为图像类数据");
        };
        assert_eq!(factors[0].shape(), (2, 3));
        assert_eq!(factors[0].as_immutable()[(1, 0)], 3.0);
        assert_eq!(scores.dim(), (4, 1));
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let kind = DataKind::Image { shape: (2, 3) };
        let bad = Array2::zeros((2, 5));
        let scores = Array2::zeros((4, 2));
        assert_eq!(
            reshape(bad.view(), scores.view(), &kind).unwrap_err(),
            ReshapeError::Factors((2, 6), (2, 5))
        );
        let factors = Array2::zeros((2, 6));
        let bad_scores = Array2::zeros((4, 3));
        assert_eq!(
            reshape(factors.view(), bad_scores.view(), &kind).unwrap_err(),
            ReshapeError::Scores((4, 2), (4, 3))
        );
        let keys = [RowKey::new("a", 0)];
        assert!(score_rows(&keys, &[0, 1], Array2::zeros((2, 1)).view()).is_err());
    }
}
