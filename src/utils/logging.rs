/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use std::path::Path;

use tracing::info;

use crate::config::Config;
use crate::models::work_unit::Stage;

/// 记录程序启动信息
pub fn log_startup(config: &Config, dof_count: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 输运优化模式");
    info!("📂 运行目录: {}", config.paths.root.display());
    info!("📊 最大并发作业数: {}", config.scheduler.max_concurrent);
    info!(
        "🧮 网格: {} 个磁面 × {} 种粒子",
        config.grid.surface_count(),
        config.grid.species_count()
    );
    info!("🎯 自由度个数: {}", dof_count);
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `stage`: 模拟阶段
/// - `wave_num`: 波次编号
/// - `total_waves`: 波次总数
/// - `start`: 起始目录编号
/// - `end`: 结束目录编号
/// - `total`: 目录总数
pub fn log_wave_start(
    stage: Stage,
    wave_num: usize,
    total_waves: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("{}", "=".repeat(60));
    info!("📦 [{}] 开始提交第 {}/{} 波", stage, wave_num, total_waves);
    info!("📄 本波目录: {}-{} / 共 {} 个", start, end, total);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_wave_complete(stage: Stage, wave_num: usize, finished: usize, total: usize) {
    info!("{}", "─".repeat(60));
    info!(
        "✓ [{}] 第 {} 波结束: 已完成 {}/{}",
        stage, wave_num, finished, total
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(iterations: usize, best: f64, evaluations: usize, log_file_path: &Path) {
    info!("{}", "=".repeat(60));
    info!("📊 优化完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("🔁 迭代次数: {}", iterations);
    info!("🧪 目标函数求值次数: {}", evaluations);
    info!("✅ 最优目标函数值: {}", best);
    info!("{}", "=".repeat(60));
    info!("日志已保存至: {}", log_file_path.display());
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
