use super::{Characteristic, FeatureError, FeatureLayout, FeatureResult, FeatureTable};
use crate::{Idx2d, ImageStack};
use ndarray::{Array2, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 特征矩阵的列顺序.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ColumnOrder {
    /// 先特征后峰: `dx0, dx1, ..., dy0, dy1, ...`.
    ByCharacteristic,

    /// 先峰后特征: `dx0, dy0, ..., dx1, dy1, ...`.
    ByPeak,
}

/// 参与分解的列.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureSelection {
    /// 选用的特征.
    pub chars: Vec<Characteristic>,

    /// 选用的峰序号. 为 `None` 时选用全部峰.
    pub peaks: Option<Vec<usize>>,

    /// 列顺序.
    pub order: ColumnOrder,
}

impl Default for FeatureSelection {
    fn default() -> Self {
        Self {
            chars: Characteristic::DECOMPOSITION.to_vec(),
            peaks: None,
            order: ColumnOrder::ByPeak,
        }
    }
}

impl FeatureSelection {
    /// 按布局解析出实际的列. 特征不在布局中或峰序号越界时报错.
    pub fn columns(&self, layout: &FeatureLayout) -> FeatureResult<Vec<(Characteristic, usize)>> {
        if let Some(&c) = self.chars.iter().find(|c| !layout.contains(**c)) {
            return Err(FeatureError::MissingCharacteristic(c));
        }
        let peaks = match &self.peaks {
            Some(p) => {
                if let Some(&k) = p.iter().find(|k| **k >= layout.peaks) {
                    return Err(FeatureError::PeakOutOfRange(k));
                }
                p.clone()
            }
            None => (0..layout.peaks).collect(),
        };

        let columns: Vec<_> = match self.order {
            ColumnOrder::ByCharacteristic => itertools::iproduct!(self.chars.iter().copied(), peaks)
                .collect(),
            ColumnOrder::ByPeak => itertools::iproduct!(peaks, self.chars.iter().copied())
                .map(|(k, c)| (c, k))
                .collect(),
        };
        match columns.is_empty() {
            true => Err(FeatureError::Empty),
            false => Ok(columns),
        }
    }
}

/// 特征矩阵中数据的来源, 决定分解结果如何重塑.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataKind {
    /// 每行是一张展平的图像.
    Image {
        /// 图像形状 `(高, 宽)`.
        shape: Idx2d,
    },

    /// 每行是特征表中的一行.
    Peaks {
        /// 每一列对应的 `(特征, 峰序号)`.
        columns: Vec<(Characteristic, usize)>,
    },
}

impl DataKind {
    /// 特征 (列) 个数.
    pub fn features(&self) -> usize {
        match self {
            DataKind::Image { shape: (h, w) } => h * w,
            DataKind::Peaks { columns } => columns.len(),
        }
    }
}

/// 观测 × 特征的稠密矩阵, 只包含未被排除的观测.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    /// 矩阵本体, 所有元素均为有限值.
    pub data: Array2<f64>,

    /// 第 `i` 行来自原表 (或原图像栈) 的第 `row_map[i]` 行.
    pub row_map: Vec<usize>,

    /// 数据来源.
    pub kind: DataKind,
}

impl FeatureMatrix {
    /// 观测个数.
    #[inline]
    pub fn observations(&self) -> usize {
        self.data.nrows()
    }

    /// 特征个数.
    #[inline]
    pub fn features(&self) -> usize {
        self.data.ncols()
    }

    /// 由特征表构建. 被排除的行不进入矩阵.
    ///
    /// 遇到非有限值时报错并给出行键与列名, 通常意味着还有未排除的非可信匹配,
    /// 见 [`FeatureTable::omit_unmatched`].
    pub fn from_table(table: &FeatureTable, selection: &FeatureSelection) -> FeatureResult<Self> {
        let columns = selection.columns(&table.layout)?;
        let row_map: Vec<usize> = table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.omit)
            .map(|(i, _)| i)
            .collect();
        if row_map.is_empty() {
            return Err(FeatureError::Empty);
        }

        let mut data = Array2::zeros((row_map.len(), columns.len()));
        for (mut out, &i) in data.axis_iter_mut(Axis(0)).zip(row_map.iter()) {
            let row = &table.rows[i];
            for (o, &(c, k)) in out.iter_mut().zip(columns.iter()) {
                match row.get(c, k) {
                    Some(v) if v.is_finite() => *o = v,
                    _ => {
                        return Err(FeatureError::NonFinite {
                            key: row.key.clone(),
                            column: c.column(k),
                        })
                    }
                }
            }
        }
        log::debug!(
            "特征矩阵: {} 个观测 ({} 个被排除), {} 列",
            row_map.len(),
            table.len() - row_map.len(),
            columns.len()
        );
        Ok(Self {
            data,
            row_map,
            kind: DataKind::Peaks { columns },
        })
    }

    /// 由图像栈构建, 每张图像展平为一行. `omit[i]` 为真的图像不进入矩阵.
    pub fn from_images(stack: &ImageStack, omit: &[bool]) -> FeatureResult<Self> {
        if omit.len() != stack.depth() {
            return Err(FeatureError::LayoutMismatch(stack.depth(), omit.len()));
        }
        let row_map: Vec<usize> = (0..stack.depth()).filter(|&i| !omit[i]).collect();
        let (h, w) = stack.shape();
        if row_map.is_empty() || h * w == 0 {
            return Err(FeatureError::Empty);
        }
        let data = stack.flatten().select(Axis(0), &row_map);
        if let Some((i, _)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            let (r, c) = i;
            return Err(FeatureError::NonFinite {
                key: super::RowKey::new(stack.name_at(row_map[r]), row_map[r]),
                column: format!("pixel{c}"),
            });
        }
        Ok(Self {
            data,
            row_map,
            kind: DataKind::Image { shape: (h, w) },
        })
    }
}

impl FeatureTable {
    /// 按 `selection` 构建特征矩阵, 见 [`FeatureMatrix::from_table`].
    #[inline]
    pub fn matrix(&self, selection: &FeatureSelection) -> FeatureResult<FeatureMatrix> {
        FeatureMatrix::from_table(self, selection)
    }
}

#[cfg(test)]
mod tests {
    use super::super::table::tests::synthetic;
    use super::super::RowKey;
    use super::*;
    use crate::shape::PeakAttributes;
    use crate::{Coordinate, OwnedImage};

    #[test]
    fn test_omitted_rows_are_absent() {
        let mut table = synthetic(20, 4);
        for i in [2, 7, 19] {
            assert!(table.set_omit(i, true));
        }
        let m = table.matrix(&FeatureSelection::default()).unwrap();
        assert_eq!(m.observations(), 17);
        assert_eq!(m.features(), 20);
        assert!(!m.row_map.contains(&7));
        assert_eq!(m.row_map[2], 3);
        // h 列: 行 3, 峰 0.
        assert_eq!(m.data[(2, 2)], 3.0);
    }

    #[test]
    fn test_column_order() {
        let table = synthetic(3, 2);
        let sel = |order| FeatureSelection {
            chars: vec![Characteristic::H, Characteristic::E],
            peaks: None,
            order,
        };
        let by_peak = table.matrix(&sel(ColumnOrder::ByPeak)).unwrap();
        let by_char = table.matrix(&sel(ColumnOrder::ByCharacteristic)).unwrap();
        let names = |m: &FeatureMatrix| match &m.kind {
            DataKind::Peaks { columns } => columns.iter().map(|(c, k)| c.column(*k)).collect::<Vec<_>>(),
            DataKind::Image { .. } => unreachable!(),
        };
        assert_eq!(names(&by_peak), ["h0", "e0", "h1", "e1"]);
        assert_eq!(names(&by_char), ["h0", "h1", "e0", "e1"]);
        assert_eq!(by_peak.data[(1, 2)], by_char.data[(1, 1)]);
    }

    #[test]
    fn test_selection_errors() {
        let table = synthetic(2, 2);
        let skew = FeatureSelection {
            chars: vec![Characteristic::Sx],
            ..Default::default()
        };
        assert_eq!(
            table.matrix(&skew).unwrap_err(),
            FeatureError::MissingCharacteristic(Characteristic::Sx)
        );
        let far = FeatureSelection {
            peaks: Some(vec![0, 5]),
            ..Default::default()
        };
        assert_eq!(table.matrix(&far).unwrap_err(), FeatureError::PeakOutOfRange(5));

        let mut all_omitted = table.clone();
        all_omitted.set_omit(0, true);
        all_omitted.set_omit(1, true);
        assert_eq!(
            all_omitted.matrix(&FeatureSelection::default()).unwrap_err(),
            FeatureError::Empty
        );
    }

    #[test]
    fn test_non_finite_reports_row_and_column() {
        let targets = [Coordinate::new(4.0, 4.0), Coordinate::new(12.0, 4.0)];
        let ok = vec![PeakAttributes::degenerate(4.0, 4.0); 2];
        let lost = vec![ok[0], PeakAttributes::degenerate(f64::NAN, f64::NAN)];
        let keys = vec![RowKey::new("a", 0), RowKey::new("a", 1), RowKey::new("a", 2)];
        let mut table =
            FeatureTable::build_rows(keys, &targets, &[ok.clone(), lost, ok], None, false).unwrap();

        let err = table.matrix(&FeatureSelection::default()).unwrap_err();
        assert_eq!(
            err,
            FeatureError::NonFinite {
                key: RowKey::new("a", 1),
                column: "dx1".to_string(),
            }
        );
        table.set_omit(1, true);
        assert_eq!(table.matrix(&FeatureSelection::default()).unwrap().observations(), 2);
    }

    #[test]
    fn test_from_images() {
        let a = OwnedImage::from(Array2::from_elem((2, 3), 1.0));
        let b = OwnedImage::from(Array2::from_elem((2, 3), 2.0));
        let c = OwnedImage::from(Array2::from_elem((2, 3), 3.0));
        let stack = ImageStack::from_images([("a", a), ("b", b), ("c", c)]).unwrap();
        let m = FeatureMatrix::from_images(&stack, &[false, true, false]).unwrap();
        assert_eq!(m.data.dim(), (2, 6));
        assert_eq!(m.row_map, vec![0, 2]);
        assert_eq!(m.data[(1, 0)], 3.0);
        assert_eq!(m.kind, DataKind::Image { shape: (2, 3) });
        assert_eq!(
            FeatureMatrix::from_images(&stack, &[false]).unwrap_err(),
            FeatureError::LayoutMismatch(3, 1)
        );
    }
}
