//! 取消目录中正在排队 / 运行的作业

use anyhow::Result;
use transport_opt::services::StatusClassifier;
use transport_opt::utils::dir_arg;
use transport_opt::{logger, Config, Scheduler, SlurmScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_with_default("warn");

    let config = Config::from_env()?;
    let dir = dir_arg();
    let scheduler = SlurmScheduler::new();
    let classifier = StatusClassifier::new(&scheduler, config.scheduler.user.clone());

    match classifier.job_queued_in_dir(&dir).await? {
        Some(job_id) => {
            scheduler.cancel(&job_id).await?;
            println!("已取消作业 {} ({})", job_id, dir.display());
        }
        None => println!("目录中没有排队的作业: {}", dir.display()),
    }
    Ok(())
}
