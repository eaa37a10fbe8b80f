//! 常用类型与函数.

pub use crate::cells::{crop_cells, locate_cells, CellRecord, CellStack};
pub use crate::decompose::{Decomposer, Decomposition, Ica, Pca};
pub use crate::feature::{Characteristic, FeatureSelection, FeatureTable, Reshaped, RowKey};
pub use crate::peak::{estimate_width, find_peaks, find_peaks_with, LocateOptions, PeakSet};
pub use crate::pipeline::{Analysis, AnalysisConfig, AnalysisError, CancelToken};
pub use crate::shape::{characterize, characterize_with, PeakAttributes, ShapeOptions};
pub use crate::track::{track, track_with, FrameOffset, MatchQuality, TrackOptions};
pub use crate::{Coordinate, Idx2d, ImageSlice, ImageStack, OwnedImage, Peak};

#[cfg(feature = "linalg")]
pub use crate::decompose::SvdPca;

#[cfg(feature = "serde")]
pub use crate::store::{DirStore, Store};
