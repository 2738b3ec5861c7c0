use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化日志：`RUST_LOG` 优先，默认 `info`
pub fn init() {
    init_with_default("info");
}

/// 指定默认过滤级别初始化日志（重复初始化时静默忽略）
pub fn init_with_default(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .try_init();
}
