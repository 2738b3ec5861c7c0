//! 打印目录当前的作业状态，例如 `VMECDONE`

use anyhow::Result;
use transport_opt::services::StatusClassifier;
use transport_opt::utils::dir_arg;
use transport_opt::{logger, Config, SlurmScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_with_default("warn");

    let config = Config::from_env()?;
    let dir = dir_arg();
    let scheduler = SlurmScheduler::new();
    let classifier = StatusClassifier::new(&scheduler, config.scheduler.user.clone());

    println!("{}", classifier.classify(&dir).await?);
    Ok(())
}
