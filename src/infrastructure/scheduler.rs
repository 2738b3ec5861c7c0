//! 集群调度器 - 基础设施层
//!
//! 持有唯一的稀缺资源（集群），只暴露"提交 / 查询队列 / 查询工作目录 / 取消"
//! 四种能力。不认识 VMEC / SFINCS，也不判断作业状态。

use std::fs::OpenOptions;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::error::{AppResult, SchedulerError};

/// 每个作业的资源请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    /// 进程数
    pub processes: u32,
    /// 每个 CPU 的内存，例如 `2G`
    pub mem_per_cpu: String,
    /// 节点数（可选）
    pub nodes: Option<u32>,
}

impl ResourceRequest {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            processes: config.processes,
            mem_per_cpu: config.mem_per_cpu.clone(),
            nodes: config.nodes,
        }
    }
}

/// 一次作业提交
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// 作业工作目录
    pub work_dir: PathBuf,
    /// 要执行的包装脚本
    pub task: PathBuf,
    pub resources: ResourceRequest,
    /// stdout 重定向目标（追加写入）
    pub stdout: PathBuf,
    /// stderr 重定向目标（追加写入）
    pub stderr: PathBuf,
}

/// 作业结束时的退出码（被信号终止时为 `None`）
pub type ExitFuture = BoxFuture<'static, std::io::Result<Option<i32>>>;

/// 已提交作业的句柄
pub struct JobHandle {
    pub work_dir: PathBuf,
    completion: ExitFuture,
}

impl JobHandle {
    pub fn new<F>(work_dir: impl Into<PathBuf>, completion: F) -> Self
    where
        F: Future<Output = std::io::Result<Option<i32>>> + Send + 'static,
    {
        Self {
            work_dir: work_dir.into(),
            completion: completion.boxed(),
        }
    }

    pub fn into_parts(self) -> (PathBuf, ExitFuture) {
        (self.work_dir, self.completion)
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

/// 批处理调度器能力
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 按资源请求提交作业，返回可等待的句柄
    async fn submit(&self, request: &LaunchRequest) -> AppResult<JobHandle>;

    /// 查询用户在队列中（排队或运行）的作业ID
    async fn queued_job_ids(&self, user: &str) -> AppResult<Vec<String>>;

    /// 查询作业的工作目录
    async fn job_work_dir(&self, job_id: &str) -> AppResult<Option<PathBuf>>;

    /// 取消作业
    async fn cancel(&self, job_id: &str) -> AppResult<()>;
}

/// Slurm 实现：`srun` / `squeue` / `scontrol` / `scancel`
#[derive(Debug, Clone, Default)]
pub struct SlurmScheduler;

impl SlurmScheduler {
    pub fn new() -> Self {
        Self
    }
}

/// `srun --exclusive -n <p> [-N <nodes>] --mem-per-cpu=<m> <task>` 的参数
pub fn srun_args(resources: &ResourceRequest, task: &Path) -> Vec<String> {
    let mut args = vec![
        "--exclusive".to_string(),
        "-n".to_string(),
        resources.processes.to_string(),
    ];
    if let Some(nodes) = resources.nodes {
        args.push("-N".to_string());
        args.push(nodes.to_string());
    }
    args.push(format!("--mem-per-cpu={}", resources.mem_per_cpu));
    args.push(task.to_string_lossy().into_owned());
    args
}

/// 解析 `squeue -h -o %i` 的输出
pub fn parse_job_ids(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// 从 `scontrol show job` 的输出中取出 `WorkDir=`
pub fn parse_work_dir(output: &str) -> Option<PathBuf> {
    output
        .split_whitespace()
        .find_map(|token| token.strip_prefix("WorkDir="))
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

fn open_append(path: &Path) -> AppResult<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| {
            SchedulerError::RedirectFailed {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
}

async fn run_command(program: &str, args: &[&str]) -> AppResult<String> {
    debug!("执行命令: {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| SchedulerError::SpawnFailed {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(SchedulerError::CommandFailed {
            program: program.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl Scheduler for SlurmScheduler {
    async fn submit(&self, request: &LaunchRequest) -> AppResult<JobHandle> {
        let stdout = open_append(&request.stdout)?;
        let stderr = open_append(&request.stderr)?;
        let args = srun_args(&request.resources, &request.task);

        debug!(
            "提交作业: srun {} (目录: {})",
            args.join(" "),
            request.work_dir.display()
        );

        let mut child = Command::new("srun")
            .args(&args)
            .current_dir(&request.work_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| SchedulerError::SpawnFailed {
                program: "srun".to_string(),
                source,
            })?;

        Ok(JobHandle::new(request.work_dir.clone(), async move {
            child.wait().await.map(|status| status.code())
        }))
    }

    async fn queued_job_ids(&self, user: &str) -> AppResult<Vec<String>> {
        let output = run_command("squeue", &["-h", "-u", user, "-o", "%i"]).await?;
        Ok(parse_job_ids(&output))
    }

    async fn job_work_dir(&self, job_id: &str) -> AppResult<Option<PathBuf>> {
        let output = run_command("scontrol", &["show", "job", job_id]).await?;
        Ok(parse_work_dir(&output))
    }

    async fn cancel(&self, job_id: &str) -> AppResult<()> {
        run_command("scancel", &[job_id]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srun_args_with_nodes() {
        let resources = ResourceRequest {
            processes: 120,
            mem_per_cpu: "2G".to_string(),
            nodes: Some(3),
        };
        assert_eq!(
            srun_args(&resources, Path::new("/run/taskSFINCS.sh")),
            vec![
                "--exclusive",
                "-n",
                "120",
                "-N",
                "3",
                "--mem-per-cpu=2G",
                "/run/taskSFINCS.sh"
            ]
        );
    }

    #[test]
    fn test_srun_args_without_nodes() {
        let resources = ResourceRequest {
            processes: 40,
            mem_per_cpu: "200MB".to_string(),
            nodes: None,
        };
        let args = srun_args(&resources, Path::new("taskVMEC.sh"));
        assert!(!args.contains(&"-N".to_string()));
        assert_eq!(args.last().unwrap(), "taskVMEC.sh");
    }

    #[test]
    fn test_parse_job_ids() {
        assert_eq!(parse_job_ids("123\n  456 \n\n"), vec!["123", "456"]);
        assert!(parse_job_ids("").is_empty());
    }

    #[test]
    fn test_parse_work_dir() {
        let output = "JobId=123 JobName=opt\n   UserId=lebra(1000) GroupId=x\n   WorkDir=/scratch/run/00001_000\n   StdErr=/scratch/run/slurm.err";
        assert_eq!(
            parse_work_dir(output),
            Some(PathBuf::from("/scratch/run/00001_000"))
        );
        assert_eq!(parse_work_dir("JobId=1 WorkDir="), None);
    }

    #[tokio::test]
    async fn test_job_handle_resolves() {
        let handle = JobHandle::new("d", async { Ok(Some(0)) });
        let (dir, completion) = handle.into_parts();
        assert_eq!(dir, PathBuf::from("d"));
        assert_eq!(completion.await.unwrap(), Some(0));
    }
}
