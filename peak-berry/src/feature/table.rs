use super::{Characteristic, FeatureError, FeatureResult, FeatureSelection};
use crate::cells::CellStack;
use crate::peak::Coordinate;
use crate::shape::PeakAttributes;
use crate::track::{MatchQuality, TrackTable};
use crate::ImageStack;
use ndarray::Array2;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 观测的标识: 来源文件名 + 在来源中的序号.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RowKey {
    /// 来源文件名.
    pub parent: String,

    /// 在来源中的序号.
    pub index: usize,
}

impl RowKey {
    /// 直接初始化.
    pub fn new<S: Into<String>>(parent: S, index: usize) -> Self {
        Self {
            parent: parent.into(),
            index,
        }
    }

    /// 图像栈中每张图像的行键: 名字 + 栈内下标.
    pub fn from_stack(stack: &ImageStack) -> Vec<RowKey> {
        stack
            .names()
            .iter()
            .enumerate()
            .map(|(i, n)| RowKey::new(n.as_str(), i))
            .collect()
    }

    /// 晶胞栈中每个晶胞的行键: 来源图像名 + 在来源图像中的序号.
    pub fn from_cells(cells: &CellStack) -> Vec<RowKey> {
        cells
            .records
            .iter()
            .map(|r| RowKey::new(r.parent.as_str(), r.local_index))
            .collect()
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.parent, self.index)
    }
}

/// 特征表布局: 启用的特征及峰个数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureLayout {
    /// 启用的特征, 按列顺序排列.
    pub chars: Vec<Characteristic>,

    /// 峰个数, 即目标集大小.
    pub peaks: usize,
}

impl FeatureLayout {
    /// `include_skew` 为假时去掉 `sx`, `sy` 两项.
    pub fn new(include_skew: bool, peaks: usize) -> Self {
        let chars = Characteristic::ALL
            .into_iter()
            .filter(|c| include_skew || !c.is_skew())
            .collect();
        Self { chars, peaks }
    }

    /// 是否包含特征 `ch`?
    #[inline]
    pub fn contains(&self, ch: Characteristic) -> bool {
        self.chars.contains(&ch)
    }

    /// 每行的值个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.chars.len() * self.peaks
    }

    /// 是否没有任何列?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按峰优先顺序展开的 `(特征, 峰序号)`, 即 `x0, y0, ..., x1, y1, ...`.
    pub fn entries(&self) -> impl Iterator<Item = (Characteristic, usize)> + '_ {
        itertools::iproduct!(0..self.peaks, self.chars.iter().copied()).map(|(k, c)| (c, k))
    }

    /// 存储边界上的完整列名.
    pub fn column_names(&self) -> Vec<String> {
        self.entries().map(|(c, k)| c.column(k)).collect()
    }
}

/// 一个观测 (一张图像或一个晶胞) 的特征.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureRow {
    /// 标识.
    pub key: RowKey,

    /// 是否在分析中排除. 只改标记, 不删除行.
    pub omit: bool,

    /// 形状为 `(峰个数, 9)`, 列顺序同 [`Characteristic::ALL`].
    values: Array2<f64>,

    /// 每个峰的匹配质量.
    quality: Vec<MatchQuality>,
}

impl FeatureRow {
    /// 第 `peak` 个峰的特征 `ch`. 峰序号越界时返回 `None`.
    #[inline]
    pub fn get(&self, ch: Characteristic, peak: usize) -> Option<f64> {
        self.values.get((peak, ch as usize)).copied()
    }

    /// 第 `peak` 个峰的匹配质量.
    #[inline]
    pub fn quality(&self, peak: usize) -> Option<MatchQuality> {
        self.quality.get(peak).copied()
    }

    /// 是否所有峰都是可信匹配?
    pub fn fully_matched(&self) -> bool {
        self.quality.iter().all(MatchQuality::is_matched)
    }

    /// 按布局展开为扁平的一行, 与 [`FeatureLayout::column_names`] 对应.
    pub fn flatten(&self, layout: &FeatureLayout) -> Vec<f64> {
        layout
            .entries()
            .map(|(c, k)| self.get(c, k).unwrap_or(f64::NAN))
            .collect()
    }
}

/// 特征表构建参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureOptions {
    /// 是否包含偏度两列.
    pub include_skew: bool,

    /// 构建分解矩阵时的列选择.
    pub selection: FeatureSelection,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            include_skew: true,
            selection: FeatureSelection::default(),
        }
    }
}

/// 整个图像栈的特征表.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureTable {
    /// 布局.
    pub layout: FeatureLayout,

    /// 目标集. 其顺序即峰的身份.
    pub targets: Vec<Coordinate>,

    /// 每个观测一行, 顺序与输入一致.
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// 由每个观测的形状属性构建特征表.
    ///
    /// `attributes[i][k]` 为第 `i` 个观测中第 `k` 个目标的形状属性.
    /// 若提供 `matches`, 位移 `dx, dy` 取自对应追踪的位移 (无可信匹配时为 `NaN`);
    /// 否则取形状属性坐标与目标之差.
    pub fn build_rows(
        keys: Vec<RowKey>,
        targets: &[Coordinate],
        attributes: &[Vec<PeakAttributes>],
        matches: Option<&TrackTable>,
        include_skew: bool,
    ) -> FeatureResult<Self> {
        let k = targets.len();
        if attributes.len() != keys.len() {
            return Err(FeatureError::LayoutMismatch(keys.len(), attributes.len()));
        }
        if let Some(t) = matches {
            if t.depth() != keys.len() {
                return Err(FeatureError::LayoutMismatch(keys.len(), t.depth()));
            }
        }

        let mut rows = Vec::with_capacity(keys.len());
        for (i, (key, attrs)) in keys.into_iter().zip(attributes).enumerate() {
            if attrs.len() != k {
                return Err(FeatureError::LayoutMismatch(k, attrs.len()));
            }
            let frame = matches.map(|t| &t.frames[i].matches);
            if let Some(f) = frame {
                if f.len() != k {
                    return Err(FeatureError::LayoutMismatch(k, f.len()));
                }
            }

            let mut values = Array2::zeros((k, Characteristic::ALL.len()));
            let mut quality = Vec::with_capacity(k);
            for (p, (a, t)) in attrs.iter().zip(targets).enumerate() {
                let (shift, q) = match frame {
                    Some(f) => (f[p].shift, f[p].quality),
                    None => (a.position() - *t, MatchQuality::Matched),
                };
                let row = [
                    a.x,
                    a.y,
                    shift.x,
                    shift.y,
                    a.height,
                    a.orientation,
                    a.eccentricity,
                    a.skew_x,
                    a.skew_y,
                ];
                values.row_mut(p).iter_mut().zip(row).for_each(|(d, v)| *d = v);
                quality.push(q);
            }
            rows.push(FeatureRow {
                key,
                omit: false,
                values,
                quality,
            });
        }

        Ok(Self {
            layout: FeatureLayout::new(include_skew, k),
            targets: targets.to_vec(),
            rows,
        })
    }

    /// 峰个数 (即 `number_of_peaks`).
    #[inline]
    pub fn number_of_peaks(&self) -> usize {
        self.targets.len()
    }

    /// 行数, 含被排除的行.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否没有任何行?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 未被排除的行数.
    pub fn active_count(&self) -> usize {
        self.rows.iter().filter(|r| !r.omit).count()
    }

    /// 设置第 `index` 行的排除标记. 越界时返回 `false`.
    pub fn set_omit(&mut self, index: usize, omit: bool) -> bool {
        match self.rows.get_mut(index) {
            Some(r) => {
                r.omit = omit;
                true
            }
            None => false,
        }
    }

    /// 排除所有含非可信匹配的行, 返回新排除的行数.
    pub fn omit_unmatched(&mut self) -> usize {
        let mut n = 0;
        for row in self.rows.iter_mut().filter(|r| !r.omit && !r.fully_matched()) {
            row.omit = true;
            n += 1;
        }
        if n > 0 {
            log::info!("排除了 {n} 个含非可信匹配的观测");
        }
        n
    }
}
