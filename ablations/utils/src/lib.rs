//! 消融实验依赖的通用组件.

use peak_berry::synth::Lattice;
use peak_berry::{Coordinate, OwnedImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 简单分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 带高斯噪声与随机亚像素漂移的合成点阵.
#[derive(Clone, Debug)]
pub struct NoisyLattice {
    /// 无噪声的点阵.
    pub lattice: Lattice,

    /// 噪声标准差, 与斑点峰高同量纲.
    pub noise: f64,

    /// 漂移在每个方向上的最大幅度 (像素).
    pub max_drift: f64,
}

/// 一张合成图像及其真实斑点中心.
pub struct Sample {
    /// 图像.
    pub image: OwnedImage,

    /// 落在图像内的真实中心, 行优先排列.
    pub truth: Vec<Coordinate>,
}

impl NoisyLattice {
    /// 在边长为 `size` 的图像上, 峰宽为 `peak_width` 的点阵, 噪声标准差为 `noise`.
    pub fn new(size: usize, peak_width: usize, noise: f64) -> Self {
        Self {
            lattice: Lattice::square(size, peak_width),
            noise,
            max_drift: 1.0,
        }
    }

    /// 以种子 `seed` 生成 `count` 张图像. 同一种子总是给出同样的结果.
    pub fn samples(&self, seed: u64, count: usize) -> Vec<Sample> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count).map(|_| self.sample(&mut rng)).collect()
    }

    fn sample(&self, rng: &mut StdRng) -> Sample {
        let d = self.max_drift;
        let drift = match d > 0.0 {
            true => Coordinate::new(rng.random_range(-d..d), rng.random_range(-d..d)),
            false => Coordinate::default(),
        };
        let lattice = self.lattice.translated(drift);
        let mut image = lattice.render().into_raw();
        match Normal::new(0.0, self.noise) {
            Ok(normal) if self.noise > 0.0 => image.mapv_inplace(|v| v + rng.sample(normal)),
            _ => {}
        }
        Sample {
            image: OwnedImage::from(image),
            truth: lattice.centers(),
        }
    }
}
