//! 结果快照服务 - 业务能力层
//!
//! 只负责"把自由度名称和最终结果写成 JSON"，不关心优化过程

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::{AppError, AppResult, FileError};

pub const DOF_NAMES_FILE: &str = "dof_names.json";
pub const X_FILE: &str = "x.json";
pub const FUN_FILE: &str = "fun.json";
pub const ITERATIONS_FILE: &str = "iterations.json";

/// 快照写入服务
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 优化开始前立即保存自由度名称，中途退出也能对照日志
    pub fn save_dof_names(&self, names: &[String]) -> AppResult<PathBuf> {
        self.write_json(DOF_NAMES_FILE, &names)
    }

    /// 保存最终结果
    pub fn save_result(&self, x: &[f64], fun: f64, iterations: usize) -> AppResult<()> {
        self.write_json(X_FILE, &x)?;
        self.write_json(FUN_FILE, &fun)?;
        self.write_json(ITERATIONS_FILE, &iterations)?;
        info!("💾 最终结果已保存至 {}", self.root.display());
        Ok(())
    }

    pub fn load_dof_names(&self) -> AppResult<Vec<String>> {
        self.read_json(DOF_NAMES_FILE)
    }

    pub fn load_x(&self) -> AppResult<Vec<f64>> {
        self.read_json(X_FILE)
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> AppResult<PathBuf> {
        let path = self.root.join(name);
        let text =
            serde_json::to_string_pretty(value).map_err(|source| json_failed(&path, source))?;
        fs::write(&path, text).map_err(|e| AppError::file_write_failed(&path, e))?;
        Ok(path)
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> AppResult<T> {
        let path = self.root.join(name);
        let text = fs::read_to_string(&path).map_err(|e| AppError::file_read_failed(&path, e))?;
        serde_json::from_str(&text).map_err(|source| json_failed(&path, source))
    }
}

fn json_failed(path: &Path, source: serde_json::Error) -> AppError {
    AppError::File(FileError::JsonFailed {
        path: path.to_path_buf(),
        source,
    })
}
