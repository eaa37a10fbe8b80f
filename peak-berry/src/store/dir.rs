use super::{check_name, Store, StoreError, StoreResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::{Array, ArrayView, Dimension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// 基于目录的存储.
///
/// 数组存为 `{name}.npy`; 行表存为 `{table}.rows`, 每次追加写入一个
/// `8 字节小端长度 + zlib 压缩的 bincode` 块.
#[derive(Clone, Debug)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// 打开目录 `root`, 不存在时创建.
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// 默认存储目录 `{用户主目录}/peak-berry`.
    pub fn home_dir() -> Option<PathBuf> {
        let mut ans = dirs::home_dir()?;
        ans.push("peak-berry");
        Some(ans)
    }

    /// 打开默认存储目录下的子目录 `project`.
    pub fn open_home(project: &str) -> StoreResult<Self> {
        check_name(project)?;
        let mut root = Self::home_dir().ok_or_else(|| StoreError::Missing("用户主目录".to_string()))?;
        root.push(project);
        Self::open(root)
    }

    /// 存储根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn rows_path(&self, table: &str) -> StoreResult<PathBuf> {
        check_name(table)?;
        Ok(self.root.join(format!("{table}.rows")))
    }

    fn array_path(&self, name: &str) -> StoreResult<PathBuf> {
        check_name(name)?;
        Ok(self.root.join(format!("{name}.npy")))
    }
}

impl Store for DirStore {
    fn append_rows<T: Serialize>(&mut self, table: &str, rows: &[T]) -> StoreResult<()> {
        let path = self.rows_path(table)?;
        let raw = bincode::serialize(rows)?;
        let mut e = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2 + 8), Compression::best());
        e.write_all(&raw)?;
        let block = e.finish()?;

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&(block.len() as u64).to_le_bytes())?;
        file.write_all(&block)?;
        log::debug!("表 {table}: 追加 {} 行", rows.len());
        Ok(())
    }

    fn read_rows<T: DeserializeOwned>(&self, table: &str) -> StoreResult<Vec<T>> {
        let path = self.rows_path(table)?;
        if !path.is_file() {
            return Err(StoreError::Missing(table.to_string()));
        }
        let bytes = fs::read(path)?;
        let mut ans = Vec::new();
        let mut rest = bytes.as_slice();
        while !rest.is_empty() {
            if rest.len() < 8 {
                return Err(truncated(table));
            }
            let (head, tail) = rest.split_at(8);
            let len = <[u8; 8]>::try_from(head).map_err(|_| truncated(table))?;
            let len = u64::from_le_bytes(len) as usize;
            if tail.len() < len {
                return Err(truncated(table));
            }
            let (block, tail) = tail.split_at(len);
            let mut raw = Vec::with_capacity(len * 2);
            ZlibDecoder::new(block).read_to_end(&mut raw)?;
            ans.extend(bincode::deserialize::<Vec<T>>(&raw)?);
            rest = tail;
        }
        Ok(ans)
    }

    fn write_array<D: Dimension>(&mut self, name: &str, array: ArrayView<f64, D>) -> StoreResult<()> {
        let path = self.array_path(name)?;
        ndarray_npy::write_npy(path, &array)?;
        Ok(())
    }

    fn read_array<D: Dimension>(&self, name: &str) -> StoreResult<Array<f64, D>> {
        let path = self.array_path(name)?;
        if !path.is_file() {
            return Err(StoreError::Missing(name.to_string()));
        }
        Ok(ndarray_npy::read_npy(path)?)
    }

    fn contains(&self, name: &str) -> bool {
        match (self.rows_path(name), self.array_path(name)) {
            (Ok(r), Ok(a)) => r.is_file() || a.is_file(),
            _ => false,
        }
    }
}

fn truncated(table: &str) -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("表 {table} 的数据块不完整"),
    ))
}
