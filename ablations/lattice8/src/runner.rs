//! 程序运行函数.

use crate::profile::Profile;
use crate::result::AblationResult;
use peak_berry::peak::{find_peaks_with, KdTree, LocateOptions};
use peak_berry::Coordinate;
use std::thread;
use utils::{NoisyLattice, Sample};

const SIZE: usize = 256;
const PEAK_WIDTH: usize = 17;
const NOISE: f64 = 0.08;
const IMAGES: usize = 32;
const SEED: u64 = 2024;

/// 检测与真实中心之间的容差 (像素).
const TOLERANCE: f64 = 2.0;

/// 参与比较的定位变体: 名字, 中值滤波半径, 是否腐蚀背景掩码.
const VARIANTS: [(&str, usize, bool); 4] = [
    ("median+erode", 3, true),
    ("median", 3, false),
    ("raw+erode", 0, true),
    ("raw", 0, false),
];

/// 实际运行.
pub fn run() -> AblationResult {
    let samples = NoisyLattice::new(SIZE, PEAK_WIDTH, NOISE).samples(SEED, IMAGES);
    println!(
        "Running ablation studies on {IMAGES} synthetic {SIZE}x{SIZE} lattices ({} cpus)...",
        utils::cpus()
    );

    thread::scope(|s| {
        let samples = &samples;
        let handles = VARIANTS.map(|(_, radius, erode)| {
            s.spawn(move || {
                let opts = LocateOptions {
                    erode_background: erode,
                    ..LocateOptions::new(Some(PEAK_WIDTH), radius)
                };
                evaluate(samples, &opts)
            })
        });

        VARIANTS
            .iter()
            .map(|v| v.0)
            .zip(handles.into_iter().map(|th| th.join().expect("Thread joining error")))
            .collect()
    })
}

/// 在全部样本上运行一个变体.
fn evaluate(samples: &[Sample], opts: &LocateOptions) -> Profile {
    let mut profile = Profile::new();
    for sample in samples {
        profile.start();
        let set = find_peaks_with(sample.image.as_immutable(), opts);
        profile.stop();

        let (h, w) = sample.image.shape();
        let half = PEAK_WIDTH as f64 / 2.0;
        let inside = |c: &Coordinate| {
            half <= c.x && c.x <= w as f64 - half && half <= c.y && c.y <= h as f64 - half
        };
        let truth: Vec<Coordinate> = sample.truth.iter().copied().filter(inside).collect();
        let found = set.coordinates();

        let found_tree = KdTree::build(&found);
        let truth_tree = KdTree::build(&truth);
        let (mut hits, mut duplicates) = (0, 0);
        for t in truth.iter() {
            match found_tree.within(*t, TOLERANCE).len() {
                0 => {}
                1 => hits += 1,
                _ => {
                    hits += 1;
                    duplicates += 1;
                }
            }
        }
        let false_positives = found
            .iter()
            .filter(|f| truth_tree.within(**f, TOLERANCE).is_empty())
            .count() as u64;
        profile.count(truth.len() as u64, hits, false_positives, duplicates);
    }
    profile
}
