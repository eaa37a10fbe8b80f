#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 在二维显微图像中检测周期性峰 (原子柱或其它重复结构), 表征峰形,
//! 并在图像栈中追踪固定的一组峰, 最终产出供 PCA/ICA 分解使用的特征矩阵.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 所有图像均以 `f64` 强度存储, 索引约定为 `(高, 宽)` 即 `(行, 列)`;
//!   坐标约定为 `(x, y)` 即 `(列, 行)`. 两者的转换见 [`Coordinate`].
//! 2. 在非期望的调用方式 (如峰宽为 0) 下, 程序会直接 panic;
//!   单个峰或单张图像的数值退化不会 panic, 而是以哨兵值或标记返回.
//!
//! # 开发计划
//!
//! ### 峰宽估计 ✅
//!
//! 在最亮像素附近截取窗口, 取一行强度剖面, 平滑后由谷点/低比例阈值交叉点估计峰直径.
//! 估计失败时返回 0, 不递归重试.
//!
//! 实现位于 `peak-berry/src/peak/width.rs`.
//!
//! ### 峰定位 ✅
//!
//! 中值滤波 -> 高斯模板归一化互相关 -> 8-邻域局部极大 -> 腐蚀后的背景剔除
//! -> k-d 树去重 -> 边缘剔除 -> 互相关偏移补偿.
//!
//! 实现位于 `peak-berry/src/peak/locate.rs`.
//!
//! ### 峰形表征 ✅
//!
//! 基于图像矩的位置/高度/长短轴/方向/离心率/偏度, 可选带盒约束的二维高斯拟合
//! (Levenberg-Marquardt), 以及基于 MAD 的逐图离群标记.
//!
//! 实现位于 `peak-berry/src/shape/*`.
//!
//! ### 跨图像对应追踪 ✅
//!
//! 对每张图像独立检测, 在邻域半径内做最近邻匹配. 邻域内无候选时不再静默接受,
//! 而是返回带低置信度标记、位移为 `NaN` 的匹配.
//!
//! 实现位于 `peak-berry/src/track`.
//!
//! ### 晶胞裁剪 ✅
//!
//! 模板互相关定位晶胞, 按模板尺寸裁剪并记录裁剪原点, 用于局部坐标系下的对应追踪.
//!
//! 实现位于 `peak-berry/src/cells.rs`.
//!
//! ### 特征表与分解 ✅
//!
//! 1. 以 `(特征, 峰序号)` 结构化存储每个观测的特征, 只在存储边界展开为 `x0, y0, ...` 列名. ✅
//! 2. `omit` 标记的行不进入特征矩阵, 分数回写时保持缺席. ✅
//! 3. 图像/峰两类数据的分解结果重塑. ✅
//! 4. 基于 `nalgebra` 的纯 Rust PCA 与 FastICA 后端 (可选差分/积分预处理),
//!   以及可选的基于 `ndarray-linalg` 的 SVD 后端. ✅
//!
//! 实现位于 `peak-berry/src/feature` 和 `peak-berry/src/decompose`.
//!
//! ### 持久化存储 ✅
//!
//! 数组以 npy 存储, 行表以 zlib 压缩的 bincode 存储.
//!
//! 实现位于 `peak-berry/src/store`.
//!
//! ### 小功能 ✅
//!
//! 1. 可视化友好的灰度图保存. ✅
//! 2. 合成高斯点阵, 供测试与消融实验使用. ✅
//! 3. 进度计数与图像间粒度的取消. ✅

#[cfg(all(feature = "linalg", target_os = "macos", target_arch = "aarch64"))]
extern crate blas_src;

/// 二维索引 `(高, 宽)`, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 基础图像数据结构.
mod data;

pub use data::{ImageSlice, ImageStack, ImgWriteVis, IntensityWindow, OwnedImage, RectIter};

pub mod consts;

pub mod eight;

pub mod filter;

pub mod peak;

pub use peak::{Coordinate, Peak};

pub mod shape;

pub mod track;

pub mod cells;

pub mod feature;

pub mod decompose;

#[cfg(feature = "serde")]
pub mod store;

pub mod pipeline;

pub mod synth;

pub mod prelude;
