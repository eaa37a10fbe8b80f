use super::neighbour8;
use crate::Idx2d;
use ndarray::{Array2, ArrayView2};

#[inline]
fn inside((h, w): Idx2d, (h_len, w_len): Idx2d) -> bool {
    h < h_len && w < w_len
}

/// 灰度膨胀 (局部最大值滤波), 迭代 `iterations` 次 3x3 方形结构元素.
///
/// 越界邻居不参与比较. `iterations == 0` 时返回原图副本.
pub fn grey_dilate8(image: ArrayView2<f64>, iterations: usize) -> Array2<f64> {
    let shape = image.dim();
    let mut cur = image.to_owned();
    for _ in 0..iterations {
        let prev = cur.clone();
        for ((h, w), dst) in cur.indexed_iter_mut() {
            *dst = neighbour8((h, w))
                .into_iter()
                .filter(|p| inside(*p, shape))
                .fold(prev[(h, w)], |acc, p| acc.max(prev[p]));
        }
    }
    cur
}

/// 二值腐蚀, 3x3 方形结构元素, 迭代一次.
///
/// 像素保持为 `true` 当且仅当它和所有 8-邻居均为 `true`;
/// 越界的邻居视为 `border_value`.
pub fn erode8(mask: ArrayView2<bool>, border_value: bool) -> Array2<bool> {
    let shape = mask.dim();
    Array2::from_shape_fn(shape, |pos| {
        mask[pos]
            && neighbour8(pos).into_iter().all(|p| match inside(p, shape) {
                true => mask[p],
                false => border_value,
            })
    })
}

/// 局部极大值掩码: 与半径 `radius` 的方形邻域内最大值相等的像素为 `true`.
///
/// `NaN` 像素永远不是极大值.
pub fn local_maxima8(image: ArrayView2<f64>, radius: usize) -> Array2<bool> {
    let dilated = grey_dilate8(image, radius);
    ndarray::Zip::from(&image)
        .and(&dilated)
        .map_collect(|&v, &m| !v.is_nan() && v >= m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_dilate_grows_square() {
        let mut img = Array2::<f64>::zeros((7, 7));
        img[(3, 3)] = 1.0;
        let once = grey_dilate8(img.view(), 1);
        assert_eq!(once.iter().filter(|v| **v == 1.0).count(), 9);
        let twice = grey_dilate8(img.view(), 2);
        assert_eq!(twice.iter().filter(|v| **v == 1.0).count(), 25);
        assert_eq!(twice[(1, 1)], 1.0);
        assert_eq!(twice[(0, 0)], 0.0);
        assert_eq!(grey_dilate8(img.view(), 0), img);
    }

    #[test]
    fn test_erode_border_value() {
        let mask = Array2::from_elem((4, 4), true);
        let inner = erode8(mask.view(), false);
        assert_eq!(inner.iter().filter(|v| **v).count(), 4);
        let all = erode8(mask.view(), true);
        assert!(all.iter().all(|v| *v));

        let mut holed = mask.clone();
        holed[(0, 0)] = false;
        let e = erode8(holed.view(), true);
        assert!(!e[(1, 1)]);
        assert!(e[(2, 2)]);
    }

    #[test]
    fn test_local_maxima_plateau() {
        let img = array![
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 2.0, 2.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let m = local_maxima8(img.view(), 1);
        assert!(m[(1, 1)] && m[(1, 2)]);
        assert!(!m[(2, 3)]);
        assert!(!m[(0, 0)]);
    }
}
