//! 目标函数求值 - 流程层
//!
//! 核心职责：把"一个候选向量"变成"一个标量"
//!
//! 流程顺序：
//! 1. 建立 `{iter:05}_000` 目录并写入第一阶段输入
//! 2. 运行两阶段流水线
//! 3. 按路径排序读取所有第二阶段结果
//! 4. 数量不符时整体替换为哨兵值，计算加权平方和
//! 5. 追加日志，迭代计数加一
//!
//! 只有致命错误和输入文件写入失败会向上传播，其余失败都折算为哨兵值。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::Scheduler;
use crate::models::boundary::DofSpace;
use crate::models::namelist::Namelist;
use crate::models::work_unit::iteration_dir_name;
use crate::services::{ArtifactReader, InputWriter, LogRecord, RunLog};
use crate::workflow::pipeline::Pipeline;

/// 可变运行状态，由驱动层独占
#[derive(Debug)]
pub struct RunState {
    /// 下一个候选向量使用的迭代编号
    pub iteration: usize,
    pub log: RunLog,
}

impl RunState {
    pub fn new(log: RunLog) -> Self {
        Self { iteration: 0, log }
    }
}

/// 目标函数求值器
pub struct Evaluator {
    config: Arc<Config>,
    pipeline: Pipeline,
    reader: Arc<dyn ArtifactReader>,
    dofs: DofSpace,
    stripped_vmec: Namelist,
}

impl Evaluator {
    pub fn new(
        config: Arc<Config>,
        scheduler: Arc<dyn Scheduler>,
        reader: Arc<dyn ArtifactReader>,
        dofs: DofSpace,
        stripped_vmec: Namelist,
    ) -> Self {
        Self {
            pipeline: Pipeline::new(config.clone(), scheduler),
            config,
            reader,
            dofs,
            stripped_vmec,
        }
    }

    pub fn dofs(&self) -> &DofSpace {
        &self.dofs
    }

    /// 求值一个候选向量
    pub async fn evaluate(&self, state: &mut RunState, x: &[f64]) -> AppResult<f64> {
        let dir = self
            .config
            .paths
            .resolve(iteration_dir_name(state.iteration, 0));

        let (boundary, phiedge) = self.dofs.apply(x);
        let created = InputWriter::new(&self.config)
            .prepare_equilibrium_dir(&dir, &self.stripped_vmec, &boundary, phiedge)
            .await?;
        if !created {
            info!("[迭代 {}] 目录已存在: {}", state.iteration, dir.display());
        }

        match self.pipeline.run(std::slice::from_ref(&dir)).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("⚠️ [迭代 {}] 流水线出错，按已有结果计算: {}", state.iteration, e),
        }

        let raw = self.collect_values(&dir).await?;
        let objective = &self.config.objective;
        let targets = objective.flat_targets();
        let values = normalize_values(&raw, targets.len(), objective.sentinel);
        let j = weighted_objective(&values, &targets, &objective.flat_weights());

        if self.config.verbose_logging {
            info!("[迭代 {}] 自由度: {:?}", state.iteration, x);
        }
        info!("[迭代 {}] L 值: {:?}", state.iteration, raw);
        info!("[迭代 {}] 目标函数值: {}", state.iteration, j);

        state.log.append(&LogRecord {
            iteration: state.iteration,
            x: x.to_vec(),
            values: raw,
            objective: j,
        })?;
        state.iteration += 1;

        Ok(j)
    }

    /// 按路径排序读取 `<dir>/*/*/` 下的全部结果
    ///
    /// 单个目录读取失败时贡献一个哨兵值。
    pub async fn collect_values(&self, dir: &Path) -> AppResult<Vec<f64>> {
        collect_values(self.reader.as_ref(), dir, self.config.objective.sentinel).await
    }
}

/// 读取一个第一阶段目录下所有第二阶段结果
pub async fn collect_values(
    reader: &dyn ArtifactReader,
    dir: &Path,
    sentinel: f64,
) -> AppResult<Vec<f64>> {
    let mut values = Vec::new();
    for sub in transport_dirs(dir).await? {
        match reader.read(&sub).await {
            Ok(v) => values.extend(v),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("⚠️ 无法提取结果 {}: {}", sub.display(), e);
                values.push(sentinel);
            }
        }
    }
    Ok(values)
}

/// `<dir>/*/*/`，按路径排序
pub async fn transport_dirs(dir: &Path) -> AppResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for surface in sorted_subdirs(dir).await? {
        found.extend(sorted_subdirs(&surface).await?);
    }
    Ok(found)
}

async fn sorted_subdirs(dir: &Path) -> AppResult<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AppError::file_read_failed(dir, e)),
    };
    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::file_read_failed(dir, e))?
    {
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// 数量与目标不符时整体替换为哨兵值（不做部分替换）
pub fn normalize_values(values: &[f64], expected: usize, sentinel: f64) -> Vec<f64> {
    if values.len() == expected {
        values.to_vec()
    } else {
        vec![sentinel; expected]
    }
}

/// Σ wₖ (vₖ − tₖ)²
pub fn weighted_objective(values: &[f64], targets: &[f64], weights: &[f64]) -> f64 {
    values
        .iter()
        .zip(targets)
        .zip(weights)
        .map(|((v, t), w)| w * (v - t).powi(2))
        .sum()
}
