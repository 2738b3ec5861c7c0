//! 输运矩阵读取服务 - 业务能力层
//!
//! 只负责"从一个第二阶段目录读出需要的矩阵元素"，不关心哨兵值与目标函数

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::{ObjectiveConfig, PathsConfig};
use crate::error::{AppResult, ExtractionError, SchedulerError};

/// 结果读取能力
#[async_trait]
pub trait ArtifactReader: Send + Sync {
    /// 读取目录中的结果文件，按配置顺序返回矩阵元素
    async fn read(&self, dir: &Path) -> AppResult<Vec<f64>>;
}

/// 二维数据集
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMatrix {
    pub rows: usize,
    pub cols: usize,
    data: Vec<f64>,
}

impl TransportMatrix {
    pub fn get(&self, row: usize, col: usize) -> Result<f64, ExtractionError> {
        if row >= self.rows || col >= self.cols {
            return Err(ExtractionError::OutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(self.data[row * self.cols + col])
    }

    /// 依次取出多个元素
    pub fn pick(&self, entries: &[[usize; 2]]) -> Result<Vec<f64>, ExtractionError> {
        entries.iter().map(|[r, c]| self.get(*r, *c)).collect()
    }
}

/// 解析 `h5dump -y -w 0 -d <dataset>` 的输出
pub fn parse_h5dump(text: &str, path: &Path) -> Result<TransportMatrix, ExtractionError> {
    let malformed = |reason: &str| ExtractionError::Malformed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let dataspace = text
        .find("DATASPACE")
        .map(|i| &text[i..])
        .ok_or_else(|| malformed("缺少 DATASPACE"))?;
    let open = dataspace.find('(').ok_or_else(|| malformed("缺少维度"))?;
    let close = dataspace[open..]
        .find(')')
        .ok_or_else(|| malformed("维度未闭合"))?;
    let dims = dataspace[open + 1..open + close]
        .split(',')
        .map(|d| d.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed("无法解析维度"))?;

    let (rows, cols) = match dims.as_slice() {
        [] => return Err(malformed("标量数据集")),
        [n] => (1, *n),
        [r, rest @ ..] => (*r, rest.iter().product()),
    };

    let data_start = text
        .find("DATA {")
        .map(|i| i + "DATA {".len())
        .ok_or_else(|| malformed("缺少 DATA"))?;
    let data_end = text[data_start..]
        .find('}')
        .map(|i| data_start + i)
        .ok_or_else(|| malformed("DATA 未闭合"))?;
    let data = text[data_start..data_end]
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| token.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed("无法解析数值"))?;

    if data.len() != rows * cols {
        return Err(malformed(&format!(
            "数值个数 {} 与维度 {}x{} 不符",
            data.len(),
            rows,
            cols
        )));
    }

    Ok(TransportMatrix { rows, cols, data })
}

/// 通过 `h5dump` 读取 SFINCS 的 HDF5 结果
#[derive(Debug, Clone)]
pub struct H5DumpReader {
    program: String,
    file_name: String,
    dataset: String,
    entries: Vec<[usize; 2]>,
}

impl H5DumpReader {
    pub fn new(
        file_name: impl Into<String>,
        dataset: impl Into<String>,
        entries: Vec<[usize; 2]>,
    ) -> Self {
        Self {
            program: "h5dump".to_string(),
            file_name: file_name.into(),
            dataset: dataset.into(),
            entries,
        }
    }

    pub fn from_config(paths: &PathsConfig, objective: &ObjectiveConfig) -> Self {
        Self::new(
            paths.sfincs_output.clone(),
            objective.dataset.clone(),
            objective.entries.clone(),
        )
    }

    /// 使用其它可执行文件（例如非 PATH 中的 h5dump）
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn artifact_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }
}

#[async_trait]
impl ArtifactReader for H5DumpReader {
    async fn read(&self, dir: &Path) -> AppResult<Vec<f64>> {
        let path = self.artifact_path(dir);
        if !path.is_file() {
            return Err(ExtractionError::MissingArtifact { path }.into());
        }

        debug!("读取结果: {} {}", self.program, path.display());
        let output = Command::new(&self.program)
            .args(["-y", "-w", "0", "-d", self.dataset.as_str()])
            .arg(&path)
            .output()
            .await
            .map_err(|source| SchedulerError::SpawnFailed {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Malformed {
                path,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let matrix = parse_h5dump(&text, &path)?;
        Ok(matrix.pick(&self.entries)?)
    }
}
