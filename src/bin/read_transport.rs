//! 打印一个 SFINCS 目录中配置的输运矩阵元素（默认 L11 与 L31）

use anyhow::Result;
use transport_opt::utils::dir_arg;
use transport_opt::{logger, ArtifactReader, Config, H5DumpReader};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_with_default("warn");

    let config = Config::from_env()?;
    let reader = H5DumpReader::from_config(&config.paths, &config.objective);
    let values = reader.read(&dir_arg()).await?;

    let joined = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    println!("{}", joined);
    Ok(())
}
