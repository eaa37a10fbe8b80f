use crate::feature::FeatureOptions;
use crate::peak::LocateOptions;
use crate::shape::ShapeOptions;
use crate::track::TrackOptions;

#[cfg(feature = "serde")]
use crate::store::{Store, StoreError, StoreResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 一次完整分析的全部参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalysisConfig {
    /// 峰定位参数. 同时用于平均图像上的目标确立和每张图像的候选检测.
    pub locate: LocateOptions,

    /// 峰形状刻画参数.
    pub shape: ShapeOptions,

    /// 对应追踪参数.
    pub track: TrackOptions,

    /// 特征表参数.
    pub feature: FeatureOptions,

    /// 分解的因子个数.
    pub components: usize,

    /// 是否自动排除含非可信匹配的观测.
    pub omit_unmatched: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            locate: LocateOptions::default(),
            shape: ShapeOptions::default(),
            track: TrackOptions::default(),
            feature: FeatureOptions::default(),
            components: 4,
            omit_unmatched: true,
        }
    }
}

#[cfg(feature = "serde")]
impl AnalysisConfig {
    const TABLE: &'static str = "config";

    /// 追加保存到 `store`.
    pub fn save<S: Store>(&self, store: &mut S) -> StoreResult<()> {
        store.append_rows(Self::TABLE, std::slice::from_ref(self))
    }

    /// 读取 `store` 中最近一次保存的参数.
    pub fn load<S: Store>(store: &S) -> StoreResult<Self> {
        store
            .read_rows::<Self>(Self::TABLE)?
            .pop()
            .ok_or_else(|| StoreError::Missing(Self::TABLE.to_string()))
    }
}
