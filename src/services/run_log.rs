//! 优化日志服务 - 业务能力层
//!
//! 只负责"写 / 读 log.txt"能力，不关心流程
//!
//! 格式：首行表头 `iter, DOFvals, Lvals, J`，之后每次目标函数求值追加一行，
//! 四个字段以 `, ` 分隔，数组字段内部以空格分隔。

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AppError, AppResult, FileError};

/// 日志表头
pub const LOG_HEADER: &str = "iter, DOFvals, Lvals, J";

/// 一次求值的记录
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub iteration: usize,
    pub x: Vec<f64>,
    pub values: Vec<f64>,
    pub objective: f64,
}

impl LogRecord {
    /// 渲染为一行（不含换行符）
    pub fn to_line(&self) -> String {
        format!(
            "{}, {}, {}, {}",
            self.iteration,
            join_values(&self.x),
            join_values(&self.values),
            self.objective
        )
    }

    /// 解析一行
    pub fn parse_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        let [iteration, x, values, objective] = fields.as_slice() else {
            return None;
        };
        Some(Self {
            iteration: iteration.parse().ok()?,
            x: split_values(x)?,
            values: split_values(values)?,
            objective: objective.parse().ok()?,
        })
    }
}

fn join_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_values(field: &str) -> Option<Vec<f64>> {
    field
        .split_whitespace()
        .map(|v| v.parse().ok())
        .collect()
}

/// 优化日志写入服务
///
/// 职责：
/// - 启动时创建日志并写入表头
/// - 每次求值追加一条记录
/// - 不缓存文件句柄，每次写入都重新以追加模式打开
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// 使用已存在的日志文件
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 创建（截断）日志文件并写入表头
    pub fn create(path: impl Into<PathBuf>) -> AppResult<Self> {
        let log = Self::with_path(path);
        fs::write(&log.path, format!("{}\n", LOG_HEADER))
            .map_err(|e| AppError::file_write_failed(&log.path, e))?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录
    pub fn append(&self, record: &LogRecord) -> AppResult<()> {
        debug!(
            "写入日志: 迭代 {} | J = {}",
            record.iteration, record.objective
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::file_write_failed(&self.path, e))?;

        writeln!(file, "{}", record.to_line())
            .map_err(|e| AppError::file_write_failed(&self.path, e))?;

        Ok(())
    }

    /// 读取全部记录（跳过表头和无法解析的行）
    pub fn read(&self) -> AppResult<Vec<LogRecord>> {
        if !self.path.exists() {
            return Err(AppError::File(FileError::NotFound {
                path: self.path.clone(),
            }));
        }
        let text =
            fs::read_to_string(&self.path).map_err(|e| AppError::file_read_failed(&self.path, e))?;
        Ok(parse_log(&text))
    }
}

/// 解析日志文本
pub fn parse_log(text: &str) -> Vec<LogRecord> {
    text.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(LogRecord::parse_line)
        .collect()
}

/// 目标函数最小的记录（相同值取最早的一条）
pub fn best_record(records: &[LogRecord]) -> Option<&LogRecord> {
    records.iter().fold(None, |best: Option<&LogRecord>, r| match best {
        Some(b) if b.objective <= r.objective => Some(b),
        _ => Some(r),
    })
}
