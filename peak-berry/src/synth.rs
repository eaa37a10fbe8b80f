//! 合成高斯点阵. 用于单元测试和消融实验, 不依赖任何外部文件.

use crate::peak::Coordinate;
use crate::{Idx2d, OwnedImage};
use ndarray::Array2;

/// 一个由相同高斯斑点组成的二维点阵.
///
/// 点阵格点为 `origin + k * spacing` (两个方向相同), 随后绕图像中心旋转 `rotation`
/// (弧度), 最后整体平移 `offset`. 每个斑点沿 `blob_angle` 方向的标准差为
/// `sigma * elongation`, 垂直方向为 `sigma`.
#[derive(Clone, Debug, PartialEq)]
pub struct Lattice {
    /// 图像形状 `(高, 宽)`.
    pub shape: Idx2d,

    /// 格点间距 (像素).
    pub spacing: f64,

    /// 第一个格点的坐标 (两个方向相同).
    pub origin: f64,

    /// 斑点标准差.
    pub sigma: f64,

    /// 斑点沿 `blob_angle` 方向的拉伸倍数. 1 表示圆形.
    pub elongation: f64,

    /// 斑点长轴方向 (弧度).
    pub blob_angle: f64,

    /// 斑点峰高.
    pub amplitude: f64,

    /// 背景强度.
    pub background: f64,

    /// 点阵绕图像中心的旋转角 (弧度).
    pub rotation: f64,

    /// 点阵整体平移.
    pub offset: Coordinate,
}

impl Lattice {
    /// 边长为 `size` 的正方形图像上, 峰宽为 `peak_width` 的规则点阵.
    ///
    /// 第一个格点位于 16, 间距 32, 标准差为 `peak_width / 4 + 1` (整数除法).
    pub fn square(size: usize, peak_width: usize) -> Self {
        Self {
            shape: (size, size),
            spacing: 32.0,
            origin: 16.0,
            sigma: (peak_width / 4 + 1) as f64,
            elongation: 1.0,
            blob_angle: 0.0,
            amplitude: 1.0,
            background: 0.0,
            rotation: 0.0,
            offset: Coordinate::default(),
        }
    }

    /// 平移后的副本.
    pub fn translated(&self, by: Coordinate) -> Self {
        Self {
            offset: self.offset + by,
            ..self.clone()
        }
    }

    /// 所有格点坐标, 包括中心落在图像外的格点.
    fn all_centers(&self) -> Vec<Coordinate> {
        let (h, w) = self.shape;
        if self.spacing <= 0.0 {
            return vec![];
        }
        let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
        let (sin, cos) = self.rotation.sin_cos();
        // 旋转后仍可能落入图像的格点范围.
        let reach = (h.max(w) as f64 * 1.5 / self.spacing).ceil() as i64 + 1;
        let mut centers = Vec::new();
        for j in -reach..=reach {
            for i in -reach..=reach {
                let gx = self.origin + i as f64 * self.spacing - cx;
                let gy = self.origin + j as f64 * self.spacing - cy;
                centers.push(Coordinate::new(
                    cos * gx - sin * gy + cx + self.offset.x,
                    sin * gx + cos * gy + cy + self.offset.y,
                ));
            }
        }
        centers
    }

    /// 中心位于图像内 (`0 <= x < 宽`, `0 <= y < 高`) 的格点, 按行优先排列.
    pub fn centers(&self) -> Vec<Coordinate> {
        let (h, w) = self.shape;
        let mut centers: Vec<Coordinate> = self
            .all_centers()
            .into_iter()
            .filter(|c| 0.0 <= c.x && c.x < w as f64 && 0.0 <= c.y && c.y < h as f64)
            .collect();
        centers.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
        centers
    }

    /// 渲染为图像.
    pub fn render(&self) -> OwnedImage {
        let (h, w) = self.shape;
        let mut data = Array2::from_elem((h, w), self.background);
        let sx = self.sigma * self.elongation;
        let sy = self.sigma;
        if sx <= 0.0 || sy <= 0.0 {
            return data.into();
        }
        let (sin, cos) = self.blob_angle.sin_cos();
        let reach = 6.0 * sx.max(sy);
        for c in self.all_centers() {
            if c.x < -reach || c.y < -reach || c.x > w as f64 + reach || c.y > h as f64 + reach {
                continue;
            }
            let r0 = (c.y - reach).floor().max(0.0) as usize;
            let r1 = ((c.y + reach).ceil().max(0.0) as usize).min(h);
            let c0 = (c.x - reach).floor().max(0.0) as usize;
            let c1 = ((c.x + reach).ceil().max(0.0) as usize).min(w);
            for r in r0..r1 {
                for col in c0..c1 {
                    let (dx, dy) = (col as f64 - c.x, r as f64 - c.y);
                    let u = cos * dx + sin * dy;
                    let v = -sin * dx + cos * dy;
                    let e = (u * u) / (2.0 * sx * sx) + (v * v) / (2.0 * sy * sy);
                    data[(r, col)] += self.amplitude * (-e).exp();
                }
            }
        }
        data.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_lattice() {
        let lattice = Lattice::square(256, 17);
        assert_eq!(lattice.sigma, 5.0);
        let centers = lattice.centers();
        assert_eq!(centers.len(), 64);
        assert_eq!(centers[0], Coordinate::new(16.0, 16.0));
        assert_eq!(centers[1], Coordinate::new(48.0, 16.0));

        let img = lattice.render();
        assert_eq!(img.shape(), (256, 256));
        let data = img.as_immutable();
        assert!((data[(16, 16)] - 1.0).abs() < 1e-6);
        assert!(data[(32, 32)] < 0.05);
    }

    #[test]
    fn test_translated() {
        let base = Lattice::square(128, 9);
        let moved = base.translated(Coordinate::new(1.5, -0.5));
        let a = base.centers();
        let b = moved.centers();
        assert_eq!(a.len(), b.len());
        for (p, q) in a.iter().zip(b.iter()) {
            assert!(((*q - *p) - Coordinate::new(1.5, -0.5)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_rotation_keeps_spacing() {
        let lattice = Lattice {
            rotation: 0.3,
            ..Lattice::square(200, 9)
        };
        let centers = lattice.centers();
        assert!(!centers.is_empty());
        let nearest = centers[1..]
            .iter()
            .map(|c| c.distance(&centers[0]))
            .fold(f64::INFINITY, f64::min);
        assert!((nearest - 32.0).abs() < 1e-9);
    }
}
