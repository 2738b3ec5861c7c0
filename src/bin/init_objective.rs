//! 打印初始平衡（`prep` 目录）的目标函数值

use anyhow::Result;
use transport_opt::utils::dir_arg;
use transport_opt::workflow::evaluator::{collect_values, normalize_values, weighted_objective};
use transport_opt::{logger, Config, H5DumpReader};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_with_default("warn");

    let config = Config::from_env()?;
    let objective = &config.objective;
    let reader = H5DumpReader::from_config(&config.paths, objective);
    let prep = dir_arg().join(&config.paths.prep_dir);

    let raw = collect_values(&reader, &prep, objective.sentinel).await?;
    let targets = objective.flat_targets();
    let values = normalize_values(&raw, targets.len(), objective.sentinel);
    let j = weighted_objective(&values, &targets, &objective.flat_weights());

    println!("初始目标函数值为 {}。", j);
    Ok(())
}
