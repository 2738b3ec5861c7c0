//! 分波提交器 - 流程层
//!
//! 核心职责：把一组目录按"每波最多 C 个"提交给调度器
//!
//! 流程顺序：
//! 1. 检查本波所有目录都存在（否则致命错误）
//! 2. 逐个提交，完成信号交给 `tokio::spawn`
//! 3. 等待整波结束（可选超时），再开始下一波
//!
//! 超时只结束等待，不结束作业：被放弃的作业继续在集群上运行，也不再被跟踪。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::error::{AppResult, JobError};
use crate::infrastructure::{LaunchRequest, ResourceRequest, Scheduler};
use crate::models::work_unit::{JobRecord, Stage};
use crate::utils::logging::{log_wave_complete, log_wave_start, truncate_text};

/// 单个作业的结局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// 作业进程结束（被信号终止时退出码为 `None`）
    Exited(Option<i32>),
    /// 超时后不再等待
    Abandoned,
    /// 提交失败
    LaunchFailed(String),
    /// 等待过程出错
    WaitFailed(String),
}

/// 单个目录的提交记录
#[derive(Debug, Clone)]
pub struct JobReport {
    pub dir: PathBuf,
    pub outcome: JobOutcome,
}

/// 一次分波提交的汇总
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub jobs: Vec<JobReport>,
    pub waves: usize,
}

impl BatchReport {
    /// 成功提交到调度器的作业数
    pub fn launched(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| !matches!(j.outcome, JobOutcome::LaunchFailed(_)))
            .count()
    }

    pub fn abandoned(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Abandoned))
    }

    pub fn finished(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Exited(_)))
    }

    fn count(&self, pred: impl Fn(&JobOutcome) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(&j.outcome)).count()
    }
}

/// 分波提交器
///
/// - 只关心并发上限和等待，不判断作业状态
/// - 退出码只记录，不参与状态判断
#[derive(Clone)]
pub struct Dispatcher {
    scheduler: Arc<dyn Scheduler>,
    max_concurrent: usize,
    resources: ResourceRequest,
    job_tag: String,
}

pub type PendingJob = (PathBuf, JoinHandle<std::io::Result<Option<i32>>>);

impl Dispatcher {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        max_concurrent: usize,
        resources: ResourceRequest,
        job_tag: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            max_concurrent: max_concurrent.max(1),
            resources,
            job_tag: job_tag.into(),
        }
    }

    pub fn job_tag(&self) -> &str {
        &self.job_tag
    }

    /// 第 `attempt` 轮提交使用的提交器：第一轮沿用原标签，之后为 `<标签>_<轮次>`，
    /// 避免重新提交的输出追加到上一轮的文件中
    pub fn for_attempt(&self, attempt: usize) -> Dispatcher {
        let mut dispatcher = self.clone();
        if attempt > 1 {
            dispatcher.job_tag = format!("{}_{}", self.job_tag, attempt);
        }
        dispatcher
    }

    /// 分波提交并等待
    pub async fn run_batch(
        &self,
        stage: Stage,
        task: &Path,
        dirs: &[PathBuf],
        timeout: Option<Duration>,
    ) -> AppResult<BatchReport> {
        let total = dirs.len();
        let mut report = BatchReport::default();
        if total == 0 {
            return Ok(report);
        }
        let total_waves = total.div_ceil(self.max_concurrent);

        for (wave_idx, wave) in dirs.chunks(self.max_concurrent).enumerate() {
            let wave_num = wave_idx + 1;
            let start = wave_idx * self.max_concurrent;

            // 先检查整波，再提交任何一个
            if let Some(missing) = wave.iter().find(|dir| !dir.is_dir()) {
                error!("❌ 目录不存在，无法提交: {}", missing.display());
                return Err(JobError::MissingDirectory {
                    dir: missing.clone(),
                }
                .into());
            }

            log_wave_start(
                stage,
                wave_num,
                total_waves,
                start + 1,
                start + wave.len(),
                total,
            );

            let mut pending: Vec<PendingJob> = Vec::with_capacity(wave.len());
            for dir in wave {
                match self.launch(task, dir).await {
                    Ok(handle) => pending.push((dir.clone(), handle)),
                    Err(e) => {
                        warn!(
                            "⚠️ 提交失败 {}: {}",
                            dir.display(),
                            truncate_text(&e.to_string(), 200)
                        );
                        report.jobs.push(JobReport {
                            dir: dir.clone(),
                            outcome: JobOutcome::LaunchFailed(e.to_string()),
                        });
                    }
                }
            }

            let outcomes = Self::await_wave(pending, timeout).await;
            let finished = outcomes
                .iter()
                .filter(|j| matches!(j.outcome, JobOutcome::Exited(_)))
                .count();
            log_wave_complete(stage, wave_num, finished, wave.len());

            report.jobs.extend(outcomes);
            report.waves += 1;
        }

        Ok(report)
    }

    async fn launch(
        &self,
        task: &Path,
        dir: &Path,
    ) -> AppResult<JoinHandle<std::io::Result<Option<i32>>>> {
        let record = JobRecord::new(dir, self.job_tag.clone());
        let request = LaunchRequest {
            work_dir: dir.to_path_buf(),
            task: task.to_path_buf(),
            resources: self.resources.clone(),
            stdout: record.stdout,
            stderr: record.stderr,
        };
        let handle = self.scheduler.submit(&request).await?;
        let (_, completion) = handle.into_parts();
        Ok(tokio::spawn(completion))
    }

    /// 等待一整波作业，所有作业共享同一个截止时间
    pub async fn await_wave(
        pending: Vec<PendingJob>,
        timeout: Option<Duration>,
    ) -> Vec<JobReport> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut reports = Vec::with_capacity(pending.len());

        for (dir, handle) in pending {
            let joined = match deadline {
                Some(deadline) => match timeout_at(deadline, handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("⏰ 等待超时，放弃等待: {}", dir.display());
                        reports.push(JobReport {
                            dir,
                            outcome: JobOutcome::Abandoned,
                        });
                        continue;
                    }
                },
                None => handle.await,
            };

            let outcome = match joined {
                Ok(Ok(code)) => {
                    info!("作业结束: {} (退出码: {:?})", dir.display(), code);
                    JobOutcome::Exited(code)
                }
                Ok(Err(e)) => {
                    warn!("⚠️ 等待作业失败 {}: {}", dir.display(), e);
                    JobOutcome::WaitFailed(e.to_string())
                }
                Err(e) => {
                    error!("任务执行失败 {}: {}", dir.display(), e);
                    JobOutcome::WaitFailed(e.to_string())
                }
            };
            reports.push(JobReport { dir, outcome });
        }

        reports
    }
}
