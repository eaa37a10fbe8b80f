//! 端到端分析流程.
//!
//! 平均图像 -> 目标集 -> 逐图像 (追踪 + 形状刻画) -> 特征表 -> 分解 -> 重塑与分数回写.
//! 图像之间相互独立, 打开 `rayon` feature 时并行处理. 取消标记只在图像之间检查.

mod config;
mod progress;

pub use config::AnalysisConfig;
pub use progress::{CancelToken, Progress, ProgressSnapshot};

use crate::cells::CellStack;
use crate::decompose::{DecomposeError, Decomposer};
use crate::feature::{
    reshape, score_rows, FeatureError, FeatureMatrix, FeatureTable, ReshapeError, Reshaped, RowKey, ScoreRow,
};
use crate::peak::{find_peaks_with, Coordinate, PeakSet};
use crate::shape::{characterize_with, DirectMoments, PeakAttributes};
use crate::track::{track_frame, FrameOffset, FrameTracks, TrackTable};
use crate::{ImageSlice, ImageStack};
use ndarray::Array1;
use std::fmt;

#[cfg(feature = "serde")]
use crate::store::{Store, StoreError};

/// 分析错误.
#[derive(Debug)]
pub enum AnalysisError {
    /// 平均图像上没有检测到任何峰.
    NoTargets,

    /// 分析被取消. 携带已完成的图像数.
    Cancelled {
        /// 取消前已完成的图像数.
        completed: usize,
    },

    /// 特征表错误.
    Feature(FeatureError),

    /// 分解错误.
    Decompose(DecomposeError),

    /// 重塑错误.
    Reshape(ReshapeError),

    /// 存储错误.
    #[cfg(feature = "serde")]
    Store(StoreError),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::NoTargets => write!(f, "平均图像上没有检测到任何峰"),
            AnalysisError::Cancelled { completed } => write!(f, "分析在完成 {completed} 张图像后被取消"),
            AnalysisError::Feature(e) => write!(f, "{e}"),
            AnalysisError::Decompose(e) => write!(f, "{e}"),
            AnalysisError::Reshape(e) => write!(f, "{e}"),
            #[cfg(feature = "serde")]
            AnalysisError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<FeatureError> for AnalysisError {
    fn from(e: FeatureError) -> Self {
        AnalysisError::Feature(e)
    }
}

impl From<DecomposeError> for AnalysisError {
    fn from(e: DecomposeError) -> Self {
        AnalysisError::Decompose(e)
    }
}

impl From<ReshapeError> for AnalysisError {
    fn from(e: ReshapeError) -> Self {
        AnalysisError::Reshape(e)
    }
}

#[cfg(feature = "serde")]
impl From<StoreError> for AnalysisError {
    fn from(e: StoreError) -> Self {
        AnalysisError::Store(e)
    }
}

/// 分析结果.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// 逐图像分析的输出.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisOutput {
    /// 目标集确立时的定位结果 (坐标即目标集).
    pub targets: PeakSet,

    /// 每张图像的追踪结果.
    pub tracks: TrackTable,

    /// `attributes[i][k]` 为第 `i` 张图像中第 `k` 个目标的形状.
    pub attributes: Vec<Vec<PeakAttributes>>,

    /// 特征表.
    pub table: FeatureTable,
}

/// 分解并重塑后的结果.
#[derive(Clone, Debug, PartialEq)]
pub struct DecompositionOutput {
    /// 重塑后的因子与分数.
    pub reshaped: Reshaped,

    /// 每个未被排除的观测的分数.
    pub scores: Vec<ScoreRow>,

    /// 每个因子解释的方差.
    pub eigenvalues: Option<Array1<f64>>,
}

/// 单张图像的中间结果.
struct FrameOutput {
    tracks: FrameTracks,
    attributes: Vec<PeakAttributes>,
}

/// 一次分析. 持有参数, 进度与取消标记.
#[derive(Debug, Default)]
pub struct Analysis {
    config: AnalysisConfig,
    progress: Progress,
    cancel: CancelToken,
}

impl Analysis {
    /// 以 `config` 初始化.
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            progress: Progress::new(),
            cancel: CancelToken::new(),
        }
    }

    /// 使用外部提供的取消标记.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 参数.
    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// 进度.
    #[inline]
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// 取消标记的一个共享副本.
    #[inline]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 在图像栈的平均图像上定位峰, 作为目标集.
    pub fn establish_targets(&self, stack: &ImageStack) -> AnalysisResult<PeakSet> {
        let average = stack.average();
        let set = find_peaks_with(average.as_immutable(), &self.config.locate);
        if set.is_empty() {
            return Err(AnalysisError::NoTargets);
        }
        log::info!("平均图像上确立了 {} 个目标 (峰宽 {})", set.len(), set.width);
        Ok(set)
    }

    /// 对整个图像栈分析. 所有图像共用同一坐标系.
    pub fn run(&self, stack: &ImageStack) -> AnalysisResult<AnalysisOutput> {
        let targets = self.establish_targets(stack)?;
        let offsets = vec![FrameOffset::IDENTITY; stack.depth()];
        let keys = RowKey::from_stack(stack);
        self.run_in_frames(stack, targets, &offsets, keys, &[])
    }

    /// 对晶胞栈分析. 目标集在晶胞平均图像上确立, 即位于晶胞局部坐标系;
    /// 裁剪时被排除的晶胞在特征表中同样被排除.
    ///
    /// 目标集来自来源图像 (全图坐标系) 时使用 [`Analysis::run_cells_with_targets`].
    pub fn run_cells(&self, cells: &CellStack) -> AnalysisResult<AnalysisOutput> {
        let targets = self.establish_targets(&cells.cells)?;
        let offsets = vec![FrameOffset::IDENTITY; cells.len()];
        self.run_cell_frames(cells, targets, &offsets)
    }

    /// 以来源图像坐标系下的目标集分析晶胞栈.
    ///
    /// 每个晶胞上的目标先按其裁剪原点平移到局部坐标系再匹配,
    /// 位移相对于平移后的目标计算. 特征表中记录的目标坐标仍是全图坐标.
    pub fn run_cells_with_targets(&self, parent_targets: &PeakSet, cells: &CellStack) -> AnalysisResult<AnalysisOutput> {
        if parent_targets.is_empty() {
            return Err(AnalysisError::NoTargets);
        }
        log::info!(
            "以 {} 个全图目标分析 {} 个晶胞",
            parent_targets.len(),
            cells.len()
        );
        self.run_cell_frames(cells, parent_targets.clone(), &cells.offsets())
    }

    fn run_cell_frames(&self, cells: &CellStack, targets: PeakSet, offsets: &[FrameOffset]) -> AnalysisResult<AnalysisOutput> {
        let omit: Vec<bool> = cells.records.iter().map(|r| r.omit).collect();
        self.run_in_frames(&cells.cells, targets, offsets, RowKey::from_cells(cells), &omit)
    }

    /// 以给定目标集分析图像栈. 第 `i` 张图像上的目标先经 `offsets[i]` 变换到局部坐标系.
    ///
    /// `omit` 为空时不排除任何行, 否则长度必须与图像栈深度一致.
    ///
    /// # 注意
    ///
    /// `offsets`, `keys` 长度必须与图像栈深度一致, 否则程序 panic.
    pub fn run_in_frames(
        &self,
        stack: &ImageStack,
        targets: PeakSet,
        offsets: &[FrameOffset],
        keys: Vec<RowKey>,
        omit: &[bool],
    ) -> AnalysisResult<AnalysisOutput> {
        assert_eq!(offsets.len(), stack.depth(), "每张图像都需要一个坐标系平移");
        assert_eq!(keys.len(), stack.depth(), "每张图像都需要一个行键");
        let coordinates = targets.coordinates();

        let op = |i: usize, image: ImageSlice| -> Option<FrameOutput> {
            if self.cancel.is_cancelled() {
                return None;
            }
            let out = self.frame(image, &coordinates, offsets[i]);
            let measured = out.attributes.iter().filter(|a| a.status.is_measured()).count();
            self.progress.count_image(measured, out.tracks.candidates == 0);
            Some(out)
        };
        #[cfg(feature = "rayon")]
        let frames = stack.par_map_indexed(op);
        #[cfg(not(feature = "rayon"))]
        let frames = stack.map_indexed(op);

        let Some(frames) = frames.into_iter().collect::<Option<Vec<_>>>() else {
            let completed = self.progress.images();
            log::warn!("分析被取消, 已完成 {completed} 张图像");
            return Err(AnalysisError::Cancelled { completed });
        };

        let (tracks, attributes): (Vec<_>, Vec<_>) = frames.into_iter().map(|f| (f.tracks, f.attributes)).unzip();
        let tracks = TrackTable { frames: tracks };
        let mut table = FeatureTable::build_rows(
            keys,
            &coordinates,
            &attributes,
            Some(&tracks),
            self.config.feature.include_skew,
        )?;
        for (row, &o) in table.rows.iter_mut().zip(omit) {
            row.omit |= o;
        }
        if self.config.omit_unmatched {
            table.omit_unmatched();
        }

        let p = self.progress.snapshot();
        log::info!(
            "处理了 {} 张图像, 刻画了 {} 个峰, {} 张图像没有候选, 用时 {:?}",
            p.images,
            p.peaks,
            p.failed,
            p.elapsed
        );
        Ok(AnalysisOutput {
            targets,
            tracks,
            attributes,
            table,
        })
    }

    /// 单张图像: 追踪目标, 再在匹配位置 (无可信匹配时在目标位置) 刻画形状.
    fn frame(&self, image: ImageSlice, targets: &[Coordinate], offset: FrameOffset) -> FrameOutput {
        let tracks = track_frame(image, targets, offset, &self.config.track, &self.config.locate);
        let positions: Vec<Coordinate> = tracks
            .matches
            .iter()
            .zip(targets)
            .map(|(m, t)| match m.quality.is_matched() {
                true => m.coordinate,
                false => offset.to_local(*t),
            })
            .collect();
        let attributes = characterize_with(image, &positions, tracks.width, &self.config.shape, &DirectMoments);
        FrameOutput { tracks, attributes }
    }

    /// 按参数中的列选择分解特征表, 并重塑结果、回写分数.
    pub fn decompose<D: Decomposer>(&self, output: &AnalysisOutput, decomposer: &D) -> AnalysisResult<DecompositionOutput> {
        let matrix = output.table.matrix(&self.config.feature.selection)?;
        let keys: Vec<RowKey> = output.table.rows.iter().map(|r| r.key.clone()).collect();
        self.decompose_matrix(&matrix, &keys, decomposer)
    }

    /// 把每张 (未被排除的) 图像展平后整体分解.
    pub fn decompose_images<D: Decomposer>(
        &self,
        stack: &ImageStack,
        omit: &[bool],
        decomposer: &D,
    ) -> AnalysisResult<DecompositionOutput> {
        let matrix = FeatureMatrix::from_images(stack, omit)?;
        self.decompose_matrix(&matrix, &RowKey::from_stack(stack), decomposer)
    }

    fn decompose_matrix<D: Decomposer>(
        &self,
        matrix: &FeatureMatrix,
        keys: &[RowKey],
        decomposer: &D,
    ) -> AnalysisResult<DecompositionOutput> {
        let d = decomposer.decompose(matrix.data.view(), self.config.components)?;
        let reshaped = reshape(d.factors.view(), d.scores.view(), &matrix.kind)?;
        let scores = score_rows(keys, &matrix.row_map, d.scores.view())?;
        log::info!(
            "{}: {} 个观测, {} 个特征, {} 个因子",
            decomposer.name(),
            matrix.observations(),
            matrix.features(),
            reshaped.components()
        );
        Ok(DecompositionOutput {
            reshaped,
            scores,
            eigenvalues: d.eigenvalues,
        })
    }
}

#[cfg(feature = "serde")]
impl Analysis {
    /// 保存参数, 目标集与特征表.
    ///
    /// 目标集存为 `(K, 2)` 数组 `targets`; 峰个数记入表 `meta`;
    /// 特征表布局与各行分别存入表 `layout` 和 `features`.
    pub fn persist<S: Store>(&self, output: &AnalysisOutput, store: &mut S) -> AnalysisResult<()> {
        self.config.save(store)?;
        let targets = &output.table.targets;
        let array = ndarray::Array2::from_shape_fn((targets.len(), 2), |(k, j)| match j {
            0 => targets[k].x,
            _ => targets[k].y,
        });
        store.write_array("targets", array.view())?;
        store.append_rows(
            "meta",
            &[(crate::consts::NUMBER_OF_PEAKS.to_string(), targets.len() as u64)],
        )?;
        store.append_rows("layout", std::slice::from_ref(&output.table.layout))?;
        store.append_rows("features", &output.table.rows)?;
        Ok(())
    }

    /// 保存分解结果: 分数行存入表 `scores`, 峰类因子存入表 `factors`,
    /// 图像类因子存为数组 `factor{i}`, 解释方差存为数组 `eigenvalues`.
    pub fn persist_decomposition<S: Store>(&self, output: &DecompositionOutput, store: &mut S) -> AnalysisResult<()> {
        store.append_rows("scores", &output.scores)?;
        match &output.reshaped {
            Reshaped::Peaks { factors, .. } => store.append_rows("factors", factors)?,
            Reshaped::Image { factors, .. } => {
                for (i, f) in factors.iter().enumerate() {
                    store.write_array(&format!("factor{i}"), f.as_immutable().data())?;
                }
            }
        }
        if let Some(ev) = &output.eigenvalues {
            store.write_array("eigenvalues", ev.view())?;
        }
        Ok(())
    }
}
