use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{AppError, AppResult, FileError};

/// 从 TOML 文件加载运行配置
pub fn load_config_file(toml_file_path: &Path) -> AppResult<Config> {
    let content = fs::read_to_string(toml_file_path)
        .map_err(|e| AppError::file_read_failed(toml_file_path, e))?;

    let config: Config = toml::from_str(&content).map_err(|source| {
        AppError::File(FileError::TomlParseFailed {
            path: toml_file_path.to_path_buf(),
            source,
        })
    })?;

    tracing::info!("已加载配置文件: {}", toml_file_path.display());

    Ok(config)
}

/// 读取文本文件，不存在时返回 [`FileError::NotFound`]
pub fn read_text(path: &Path) -> AppResult<String> {
    if !path.exists() {
        return Err(AppError::File(FileError::NotFound {
            path: path.to_path_buf(),
        }));
    }
    fs::read_to_string(path).map_err(|e| AppError::file_read_failed(path, e))
}
