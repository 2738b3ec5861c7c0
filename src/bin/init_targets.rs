//! 打印初始平衡（`prep` 目录）每个磁面第一种粒子的 L11，用于设定目标值

use anyhow::{bail, Result};
use transport_opt::utils::dir_arg;
use transport_opt::workflow::evaluator::collect_values;
use transport_opt::{logger, Config, H5DumpReader};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_with_default("warn");

    let config = Config::from_env()?;
    let objective = &config.objective;
    let reader = H5DumpReader::from_config(&config.paths, objective);
    let prep = dir_arg().join(&config.paths.prep_dir);

    let values = collect_values(&reader, &prep, objective.sentinel).await?;
    let expected = config.grid.len() * objective.entries.len();
    if values.len() != expected {
        bail!(
            "{} 中提取到 {} 个值，应为 {} 个",
            prep.display(),
            values.len(),
            expected
        );
    }

    let stride = config.grid.species_count() * objective.entries.len();
    let l11: Vec<String> = (0..config.grid.surface_count())
        .map(|surface| values[surface * stride].to_string())
        .collect();
    println!("按磁面顺序的初始 L11: {}", l11.join(" "));
    Ok(())
}
