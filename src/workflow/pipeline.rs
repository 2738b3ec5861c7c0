//! 两阶段流水线 - 流程层
//!
//! 核心职责：定义"一组第一阶段目录"的完整处理流程
//!
//! 流程顺序：
//! 1. 判断每个目录的 VMEC 状态，需要（重新）运行的进入第一阶段批次
//! 2. 第一阶段分波提交（可选超时，可选多轮）
//! 3. VMEC 完成的目录展开为 磁面 × 粒子种类 个第二阶段目录
//! 4. 新建的第二阶段目录作为一个批次提交（不设超时）
//!
//! 已存在的目录视为"已经算过"，永远不会被重新提交。

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, JobError};
use crate::infrastructure::{ResourceRequest, Scheduler};
use crate::models::status::Status;
use crate::models::work_unit::{Stage, WorkUnit};
use crate::services::{InputWriter, StatusClassifier};
use crate::utils::absolute;
use crate::workflow::dispatcher::{BatchReport, Dispatcher};

/// 一次流水线运行的汇总
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// 每一轮第一阶段提交
    pub stage1: Vec<BatchReport>,
    /// 本次新建的第二阶段目录
    pub stage2_dirs: Vec<PathBuf>,
    pub stage2: BatchReport,
}

impl PipelineReport {
    /// 两个阶段的提交总数
    pub fn launches(&self) -> usize {
        self.stage1.iter().map(BatchReport::launched).sum::<usize>() + self.stage2.launched()
    }
}

/// 两阶段流水线
///
/// - 编排第一阶段 → 展开 → 第二阶段
/// - 决定哪些目录需要提交、哪些跳过
/// - 只依赖业务能力（services）和提交器
pub struct Pipeline {
    config: Arc<Config>,
    scheduler: Arc<dyn Scheduler>,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, scheduler: Arc<dyn Scheduler>) -> Self {
        let dispatcher = Dispatcher::new(
            scheduler.clone(),
            config.scheduler.max_concurrent,
            ResourceRequest::from_config(&config.scheduler),
            config.scheduler.job_tag(),
        );
        Self {
            config,
            scheduler,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn classifier(&self) -> StatusClassifier<'_> {
        StatusClassifier::new(self.scheduler.as_ref(), self.config.scheduler.user.clone())
    }

    fn task(&self, name: &str) -> PathBuf {
        absolute(&self.config.paths.resolve(name))
    }

    /// 运行完整流水线
    pub async fn run(&self, dirs: &[PathBuf]) -> AppResult<PipelineReport> {
        let mut report = PipelineReport {
            stage1: self.run_stage1(dirs).await?,
            ..Default::default()
        };

        report.stage2_dirs = self.create_stage2_dirs(dirs).await?;
        if report.stage2_dirs.is_empty() {
            info!("没有新的 SFINCS 目录需要提交");
            return Ok(report);
        }

        info!("🚀 提交 {} 个 SFINCS 作业", report.stage2_dirs.len());
        report.stage2 = self
            .dispatcher
            .run_batch(
                Stage::Transport,
                &self.task(&self.config.paths.stage2_task),
                &report.stage2_dirs,
                None,
            )
            .await?;
        Ok(report)
    }

    /// 第一阶段：最多 `stage1_attempts` 轮，直到没有需要提交的目录
    pub async fn run_stage1(&self, dirs: &[PathBuf]) -> AppResult<Vec<BatchReport>> {
        let task = self.task(&self.config.paths.stage1_task);
        let attempts = self.config.scheduler.stage1_attempts.max(1);
        let mut reports = Vec::new();

        for attempt in 1..=attempts {
            let to_run = self.stage1_dirs_to_run(dirs).await?;
            if to_run.is_empty() {
                break;
            }
            if attempt > 1 {
                info!("🔁 第 {}/{} 轮重新提交 VMEC: {} 个目录", attempt, attempts, to_run.len());
            }
            let report = self
                .dispatcher
                .for_attempt(attempt)
                .run_batch(
                    Stage::Equilibrium,
                    &task,
                    &to_run,
                    self.config.scheduler.stage1_timeout(),
                )
                .await?;
            reports.push(report);
        }

        Ok(reports)
    }

    /// 需要（重新）运行 VMEC 的目录
    pub async fn stage1_dirs_to_run(&self, dirs: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
        let classifier = self.classifier();
        let mut to_run = Vec::new();

        for dir in dirs {
            let status = classifier.classify(dir).await?;
            abort_on_step_limit(dir, status)?;
            if status.is_resubmittable() {
                to_run.push(dir.clone());
            } else {
                info!("跳过 VMEC: {} (状态: {})", dir.display(), status);
            }
        }

        Ok(to_run)
    }

    /// VMEC 完成的目录展开为第二阶段目录，只返回本次新建的目录
    pub async fn create_stage2_dirs(&self, dirs: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
        let classifier = self.classifier();
        let writer = InputWriter::new(&self.config);
        let grid = &self.config.grid;
        let mut created = Vec::new();

        for dir in dirs {
            let status = classifier.classify(dir).await?;
            info!("目录 {} 的 VMEC 状态: {}", dir.display(), status);
            abort_on_step_limit(dir, status)?;
            if status != Status::VmecDone {
                continue;
            }

            for surface in 0..grid.surface_count() {
                for species in 0..grid.species_count() {
                    let unit = WorkUnit::transport(dir, surface, species);
                    if unit.exists() {
                        debug!("SFINCS 目录已存在: {}", unit.dir.display());
                        continue;
                    }
                    match writer.prepare_transport_dir(dir, &unit).await {
                        Ok(()) => created.push(unit.dir),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => warn!("⚠️ 无法准备 SFINCS 目录 {}: {}", unit.dir.display(), e),
                    }
                }
            }
        }

        Ok(created)
    }
}

fn abort_on_step_limit(dir: &std::path::Path, status: Status) -> AppResult<()> {
    if status == Status::StepLimit {
        error!("❌ 作业步数达到上限，终止运行: {}", dir.display());
        return Err(JobError::StepLimit {
            dir: dir.to_path_buf(),
        }
        .into());
    }
    Ok(())
}
