//! 持久化存储.
//!
//! 核心只需要: 追加行, 读取 (全部或经过滤的) 行, 写入/读取命名数组, 读取二维数组的一个矩形区域.
//! 需要打开 `serde` feature.

mod dir;

pub use dir::DirStore;

use crate::Idx2d;
use ndarray::{s, Array, Array2, ArrayView, Dimension, Ix2};
use ndarray_npy::{ReadNpyError, WriteNpyError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// 存储错误.
#[derive(Debug)]
pub enum StoreError {
    /// 底层 I/O 错误.
    Io(std::io::Error),

    /// 读取 npy 文件错误.
    ReadNpy(ReadNpyError),

    /// 写入 npy 文件错误.
    WriteNpy(WriteNpyError),

    /// 行表编解码错误.
    Codec(bincode::Error),

    /// 不存在的表或数组.
    Missing(String),

    /// 非法的表名或数组名 (空, 或含路径分隔符).
    InvalidName(String),

    /// 读取区域超出数组范围. 数组形状, 区域左上角, 区域形状.
    OutOfBounds(Idx2d, Idx2d, Idx2d),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O 错误: {e}"),
            StoreError::ReadNpy(e) => write!(f, "读取 npy 失败: {e}"),
            StoreError::WriteNpy(e) => write!(f, "写入 npy 失败: {e}"),
            StoreError::Codec(e) => write!(f, "行表编解码失败: {e}"),
            StoreError::Missing(n) => write!(f, "{n} 不存在"),
            StoreError::InvalidName(n) => write!(f, "非法名字 {n:?}"),
            StoreError::OutOfBounds(sh, tl, wh) => {
                write!(f, "区域 {tl:?} + {wh:?} 超出了形状为 {sh:?} 的数组")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<ReadNpyError> for StoreError {
    fn from(e: ReadNpyError) -> Self {
        StoreError::ReadNpy(e)
    }
}

impl From<WriteNpyError> for StoreError {
    fn from(e: WriteNpyError) -> Self {
        StoreError::WriteNpy(e)
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Codec(e)
    }
}

/// 存储操作结果.
pub type StoreResult<T> = Result<T, StoreError>;

/// 行表与命名数组的存储.
pub trait Store {
    /// 向表 `table` 追加若干行. 表不存在时创建.
    fn append_rows<T: Serialize>(&mut self, table: &str, rows: &[T]) -> StoreResult<()>;

    /// 按追加顺序读取表 `table` 的全部行.
    fn read_rows<T: DeserializeOwned>(&self, table: &str) -> StoreResult<Vec<T>>;

    /// 读取表 `table` 中满足 `predicate` 的行.
    fn read_rows_where<T, P>(&self, table: &str, predicate: P) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned,
        P: Fn(&T) -> bool,
    {
        let mut rows = self.read_rows(table)?;
        rows.retain(|r| predicate(r));
        Ok(rows)
    }

    /// 写入 (覆盖) 名为 `name` 的数组.
    fn write_array<D: Dimension>(&mut self, name: &str, array: ArrayView<f64, D>) -> StoreResult<()>;

    /// 读取名为 `name` 的数组. 维数必须与写入时一致.
    fn read_array<D: Dimension>(&self, name: &str) -> StoreResult<Array<f64, D>>;

    /// 读取二维数组 `name` 中左上角为 `top_left`, 形状为 `shape` 的区域.
    fn read_slice(&self, name: &str, top_left: Idx2d, shape: Idx2d) -> StoreResult<Array2<f64>> {
        let full = self.read_array::<Ix2>(name)?;
        let ((top, left), (h, w)) = (top_left, shape);
        let (fh, fw) = full.dim();
        if top + h > fh || left + w > fw {
            return Err(StoreError::OutOfBounds((fh, fw), top_left, shape));
        }
        Ok(full.slice(s![top..top + h, left..left + w]).to_owned())
    }

    /// 是否存在名为 `name` 的表或数组?
    fn contains(&self, name: &str) -> bool;
}

/// 检查表名或数组名是否可以安全地映射到文件名.
pub(crate) fn check_name(name: &str) -> StoreResult<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(|c: char| c == '/' || c == '\\' || c.is_control());
    match bad {
        true => Err(StoreError::InvalidName(name.to_string())),
        false => Ok(()),
    }
}
