use anyhow::Result;
use tracing::error;
use transport_opt::{logger, App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    // 加载配置
    let config = Config::from_env()?;

    // 初始化并运行应用
    let outcome = match App::initialize(config).await {
        Ok(app) => app.run().await,
        Err(e) => Err(e),
    };

    if let Err(e) = &outcome {
        error!("❌ 运行终止: {:#}", e);
    }
    outcome.map(|_| ())
}
