use crate::consts::TEMPLATE_SIGMA_RATIO;
use ndarray::Array2;

/// 归一化 (和为 1) 的一维高斯核, 半径为 `ceil(3 * sigma)`.
///
/// `sigma <= 0` 时返回 `[1.0]`, 即恒等核.
pub fn gaussian_kernel_1d(sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 || !sigma.is_finite() {
        return vec![1.0];
    }
    let radius = (3.0 * sigma).ceil() as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// 一维高斯平滑. 越界位置按最近边界值延拓.
pub fn blur_1d(profile: &[f64], sigma: f64) -> Vec<f64> {
    let n = profile.len() as isize;
    if n == 0 {
        return vec![];
    }
    let kernel = gaussian_kernel_1d(sigma);
    let radius = (kernel.len() / 2) as isize;
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, &c)| {
                    let j = (i + k as isize - radius).clamp(0, n - 1);
                    c * profile[j as usize]
                })
                .sum::<f64>()
        })
        .collect()
}

/// 边长为 `side` 的对称二维高斯模板, 峰值为 1.
///
/// 峰心位于 `(side / 2, side / 2)` (整数除法), 与峰定位中补偿的互相关偏移一致.
/// 标准差为 `side * TEMPLATE_SIGMA_RATIO`.
pub fn gaussian_template(side: usize) -> Array2<f64> {
    let sigma = (side as f64 * TEMPLATE_SIGMA_RATIO).max(0.5);
    let c = (side / 2) as f64;
    Array2::from_shape_fn((side, side), |(h, w)| {
        let (dy, dx) = (h as f64 - c, w as f64 - c);
        (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_kernel_normalized_and_symmetric() {
        let k = gaussian_kernel_1d(1.5);
        assert_eq!(k.len(), 11);
        assert!(float_eq(k.iter().sum::<f64>(), 1.0));
        assert!(float_eq(k[0], k[10]));
        assert_eq!(gaussian_kernel_1d(0.0), vec![1.0]);
    }

    #[test]
    fn test_blur_keeps_constant_and_spreads_spike() {
        let flat = blur_1d(&[2.0; 7], 1.0);
        assert!(flat.iter().all(|v| float_eq(*v, 2.0)));

        let mut spike = [0.0; 9];
        spike[4] = 1.0;
        let out = blur_1d(&spike, 1.0);
        assert!(out[4] < 1.0 && out[3] > 0.0);
        assert!(float_eq(out[3], out[5]));
        assert!(blur_1d(&[], 1.0).is_empty());
    }

    #[test]
    fn test_template_peak_location() {
        let t = gaussian_template(17);
        assert_eq!(t[(8, 8)], 1.0);
        assert!(float_eq(t[(0, 8)], t[(16, 8)]));

        let even = gaussian_template(6);
        assert_eq!(even[(3, 3)], 1.0);
    }
}
