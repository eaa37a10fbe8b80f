use crate::{ImageSlice, OwnedImage};
use ndarray::{Array2, ArrayView2};

/// 积分图 (summed-area table), 同时保存一次方和二次方的累加.
struct Integral {
    sum: Array2<f64>,
    sq: Array2<f64>,
}

impl Integral {
    fn new(image: ArrayView2<f64>) -> Self {
        let (h, w) = image.dim();
        let mut sum = Array2::zeros((h + 1, w + 1));
        let mut sq = Array2::zeros((h + 1, w + 1));
        for i in 0..h {
            let (mut row_sum, mut row_sq) = (0.0, 0.0);
            for j in 0..w {
                let v = image[(i, j)];
                row_sum += v;
                row_sq += v * v;
                sum[(i + 1, j + 1)] = sum[(i, j + 1)] + row_sum;
                sq[(i + 1, j + 1)] = sq[(i, j + 1)] + row_sq;
            }
        }
        Self { sum, sq }
    }

    /// 左上角 `(i, j)`、大小 `(th, tw)` 区域的 (和, 平方和).
    #[inline]
    fn rect(&self, (i, j): (usize, usize), (th, tw): (usize, usize)) -> (f64, f64) {
        let f = |t: &Array2<f64>| t[(i + th, j + tw)] - t[(i, j + tw)] - t[(i + th, j)] + t[(i, j)];
        (f(&self.sum), f(&self.sq))
    }
}

/// 归一化互相关 (相关系数形式, 即 `CCOEFF_NORMED`).
///
/// 输出大小为 `(H - th + 1, W - tw + 1)`, 位置 `(i, j)` 对应左上角为 `(i, j)` 的图块;
/// 若图像小于模板, 则输出为空图. 方差为零的图块 (或模板) 的相关系数记为 0.
/// 结果被截断到 `[-1, 1]`.
pub fn normalized_cross_correlation(image: ImageSlice, template: ArrayView2<f64>) -> OwnedImage {
    let (h, w) = image.shape();
    let (th, tw) = template.dim();
    if th == 0 || tw == 0 || th > h || tw > w {
        return OwnedImage::zeros((0, 0));
    }
    let n = (th * tw) as f64;
    let t_mean = template.sum() / n;
    let t_zero = template.mapv(|v| v - t_mean);
    let t_var: f64 = t_zero.iter().map(|v| v * v).sum();

    let data = image.data();
    let integral = Integral::new(data);
    let out_shape = (h - th + 1, w - tw + 1);

    let coeff = |(i, j): (usize, usize)| -> f64 {
        let (s, ss) = integral.rect((i, j), (th, tw));
        let var = ss - s * s / n;
        if t_var <= 0.0 || var <= 1e-12 * ss.abs().max(f64::MIN_POSITIVE) {
            return 0.0;
        }
        let mut cross = 0.0;
        for a in 0..th {
            for b in 0..tw {
                cross += data[(i + a, j + b)] * t_zero[(a, b)];
            }
        }
        (cross / (var * t_var).sqrt()).clamp(-1.0, 1.0)
    };

    #[cfg(feature = "rayon")]
    let out = {
        let mut out = Array2::zeros(out_shape);
        ndarray::Zip::indexed(&mut out).par_for_each(|pos, o| *o = coeff(pos));
        out
    };
    #[cfg(not(feature = "rayon"))]
    let out = Array2::from_shape_fn(out_shape, coeff);

    OwnedImage::from(out)
}
