//! 比较峰定位中两个预处理步骤 (中值滤波, 背景掩码腐蚀) 对检出质量与速度的影响.

mod profile;
mod result;
mod runner;

fn main() -> std::io::Result<()> {
    simple_logger::init_with_level(log::Level::Warn).ok();

    let result = runner::run();
    result.analyze()
}
