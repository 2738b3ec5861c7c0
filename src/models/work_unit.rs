use std::fmt;
use std::path::{Path, PathBuf};

/// stdout 文件前缀，完整文件名为 `out.<作业ID>`
pub const STDOUT_PREFIX: &str = "out.";
/// stderr 文件前缀，完整文件名为 `err.<作业ID>`
pub const STDERR_PREFIX: &str = "err.";

/// 模拟阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// 第一阶段：VMEC 平衡求解
    Equilibrium,
    /// 第二阶段：SFINCS 输运求解
    Transport,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Equilibrium => "VMEC",
            Stage::Transport => "SFINCS",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 以目录为地址的工作单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// 目录路径（唯一键）
    pub dir: PathBuf,
    pub stage: Stage,
    /// 第二阶段的 (面索引, 粒子种类索引)
    pub grid_point: Option<(usize, usize)>,
}

impl WorkUnit {
    /// 第一阶段工作单元
    pub fn equilibrium(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stage: Stage::Equilibrium,
            grid_point: None,
        }
    }

    /// 第二阶段工作单元，目录为 `<第一阶段目录>/<面:03>/<种类:02>`
    pub fn transport(parent: &Path, surface: usize, species: usize) -> Self {
        Self {
            dir: parent
                .join(format!("{:03}", surface))
                .join(format!("{:02}", species)),
            stage: Stage::Transport,
            grid_point: Some((surface, species)),
        }
    }

    pub fn exists(&self) -> bool {
        self.dir.exists()
    }
}

/// 顶层目录名：`<迭代:05>_<序号:03>`
pub fn iteration_dir_name(iteration: usize, n: usize) -> String {
    format!("{:05}_{:03}", iteration, n)
}

/// 工作单元最近一次作业的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: String,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl JobRecord {
    pub fn new(dir: &Path, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        Self {
            stdout: dir.join(format!("{}{}", STDOUT_PREFIX, job_id)),
            stderr: dir.join(format!("{}{}", STDERR_PREFIX, job_id)),
            job_id,
        }
    }
}
