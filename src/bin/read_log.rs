//! 打印优化日志中最小的目标函数值及其迭代编号

use anyhow::{bail, Result};
use transport_opt::services::run_log::best_record;
use transport_opt::services::RunLog;
use transport_opt::utils::dir_arg;
use transport_opt::{logger, Config};

fn main() -> Result<()> {
    logger::init_with_default("warn");

    let config = Config::from_env()?;
    let log = RunLog::with_path(dir_arg().join(&config.paths.log_file));
    let records = log.read()?;

    let Some(best) = best_record(&records) else {
        bail!("日志中没有记录: {}", log.path().display());
    };
    println!(
        "最小目标函数值 {} 出现在第 {} 次迭代。",
        best.objective, best.iteration
    );
    Ok(())
}
