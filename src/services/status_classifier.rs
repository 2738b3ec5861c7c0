//! 作业状态分类服务 - 业务能力层
//!
//! 只负责"判断一个目录当前处于什么状态"，不关心流程
//!
//! ## 判断顺序
//! 1. 找到目录最新的作业ID：调度器中正在排队/运行的作业优先，
//!    否则取 `out.<ID>` 文件中数值最大的后缀
//! 2. 没有ID → `NOOUT`；有ID但还没有输出文件 → `QUEUED`（在队列中）或 `NOOUT`
//! 3. 读取 stdout / stderr，按 [`RULES`](crate::models::status::RULES) 顺序匹配

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{AppResult, JobError};
use crate::infrastructure::Scheduler;
use crate::models::status::{match_rules, Status};
use crate::models::work_unit::{JobRecord, STDOUT_PREFIX};

/// 作业状态分类服务
///
/// 职责：
/// - 解析目录对应的最新作业
/// - 对捕获的输出文本做有序子串匹配
/// - 每次调用都重新计算，不缓存
pub struct StatusClassifier<'a> {
    scheduler: &'a dyn Scheduler,
    user: String,
}

impl<'a> StatusClassifier<'a> {
    /// 创建新的分类服务
    pub fn new(scheduler: &'a dyn Scheduler, user: impl Into<String>) -> Self {
        Self {
            scheduler,
            user: user.into(),
        }
    }

    /// 查找工作目录为 `dir` 的排队/运行中作业
    ///
    /// 调度器不可用时只记录警告并视为队列为空，状态退回到磁盘上的历史输出。
    pub async fn job_queued_in_dir(&self, dir: &Path) -> AppResult<Option<String>> {
        let Ok(target) = dir.canonicalize() else {
            return Ok(None);
        };

        let ids = match self.scheduler.queued_job_ids(&self.user).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("⚠️ 无法查询调度队列，仅根据输出文件判断: {}", e);
                return Ok(None);
            }
        };

        for id in ids {
            let work_dir = match self.scheduler.job_work_dir(&id).await {
                Ok(Some(work_dir)) => work_dir,
                Ok(None) => continue,
                Err(e) => {
                    warn!("⚠️ 无法查询作业 {} 的工作目录: {}", id, e);
                    continue;
                }
            };
            if work_dir
                .canonicalize()
                .map(|w| w == target)
                .unwrap_or(false)
            {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// 目录最新的作业ID（队列中的作业优先）
    pub async fn latest_job_id(&self, dir: &Path) -> AppResult<Option<String>> {
        if let Some(id) = self.job_queued_in_dir(dir).await? {
            return Ok(Some(id));
        }
        Ok(latest_job_id_on_disk(dir))
    }

    /// 判断目录当前状态
    pub async fn classify(&self, dir: &Path) -> AppResult<Status> {
        let queued = self.job_queued_in_dir(dir).await?;
        let job_id = queued.clone().or_else(|| latest_job_id_on_disk(dir));

        if let Some(id) = job_id {
            let record = JobRecord::new(dir, id);
            if record.stdout.is_file() {
                return classify_record(&record);
            }
        }

        let status = if queued.is_some() {
            Status::Queued
        } else {
            Status::NoOut
        };
        debug!("目录 {} 状态: {}", dir.display(), status);
        Ok(status)
    }
}

/// 扫描 `out.<ID>` 文件，返回数值最大的ID
///
/// ID 可以带 `_<轮次>` 后缀（同一次运行内的重新提交），按 (ID, 轮次) 比较。
pub fn latest_job_id_on_disk(dir: &Path) -> Option<String> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let suffix = name.strip_prefix(STDOUT_PREFIX)?;
            job_id_key(suffix).map(|key| (key, suffix.to_string()))
        })
        .max_by_key(|(key, _)| *key)
        .map(|(_, id)| id)
}

/// `123` → (123, 0)，`123_2` → (123, 2)，其它 → None
fn job_id_key(id: &str) -> Option<(i64, u32)> {
    match id.split_once('_') {
        Some((base, attempt)) => Some((base.parse().ok()?, attempt.parse().ok()?)),
        None => Some((id.parse().ok()?, 0)),
    }
}

/// 读取作业的两个输出流并分类
///
/// 已有作业ID却读不到日志属于内部一致性错误，直接返回致命错误。
pub fn classify_record(record: &JobRecord) -> AppResult<Status> {
    let read = |path: &Path| {
        fs::read(path).map_err(|source| JobError::UnreadableLogs {
            job_id: record.job_id.clone(),
            stdout: record.stdout.clone(),
            stderr: record.stderr.clone(),
            source,
        })
    };
    let stdout = String::from_utf8_lossy(&read(&record.stdout)?).into_owned();
    let stderr = String::from_utf8_lossy(&read(&record.stderr)?).into_owned();

    Ok(classify_text(&stdout, &stderr).unwrap_or_else(|| {
        warn!(
            "⚠️ 无法识别的状态，输出为空，按运行中处理: {}",
            record.stdout.display()
        );
        Status::Running
    }))
}

/// 对捕获文本分类
pub fn classify_text(stdout: &str, stderr: &str) -> Option<Status> {
    match_rules(stdout, stderr)
}
