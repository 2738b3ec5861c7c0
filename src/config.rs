use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult, ConfigError};
use crate::models::grid::TransportGrid;
use crate::models::loaders::load_config_file;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "optimizer.toml";

/// 程序配置
///
/// 运行期间不可变，由驱动层以 `Arc<Config>` 共享给各层。
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub scheduler: SchedulerConfig,
    pub grid: TransportGrid,
    pub objective: ObjectiveConfig,
    pub optimizer: OptimizerConfig,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

/// 文件与目录
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// 运行根目录，所有迭代目录都建在这里
    pub root: PathBuf,
    /// SFINCS 基础输入（分辨率、计算模式等）
    pub base_sfincs_input: String,
    /// 指定初始平衡的完整 VMEC 输入
    pub full_vmec_input: String,
    /// 删去边界系数后的 VMEC 输入；不存在时由完整输入自动生成
    pub stripped_vmec_input: String,
    /// 优化日志
    pub log_file: String,
    /// 第一阶段包装脚本
    pub stage1_task: String,
    /// 第二阶段包装脚本
    pub stage2_task: String,
    /// 第二阶段结果文件
    pub sfincs_output: String,
    /// 初始平衡的预计算目录（辅助工具使用）
    pub prep_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            base_sfincs_input: "input.namelist".to_string(),
            full_vmec_input: "input.vmec".to_string(),
            stripped_vmec_input: "stripped_input.vmec".to_string(),
            log_file: "log.txt".to_string(),
            stage1_task: "taskVMEC.sh".to_string(),
            stage2_task: "taskSFINCS.sh".to_string(),
            sfincs_output: "sfincsOutput.h5".to_string(),
            prep_dir: "prep".to_string(),
        }
    }
}

impl PathsConfig {
    /// 相对运行根目录解析路径
    pub fn resolve(&self, name: impl AsRef<Path>) -> PathBuf {
        self.root.join(name)
    }

    /// VMEC 输出文件名：`input.vmec` 对应 `wout_vmec.nc`
    pub fn wout_name(&self) -> String {
        let ext = self
            .full_vmec_input
            .rsplit('.')
            .next()
            .unwrap_or(&self.full_vmec_input)
            .trim();
        format!("wout_{}.nc", ext)
    }
}

/// 调度与资源
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 查询队列时使用的用户名
    pub user: String,
    /// 同时在运行的作业上限
    pub max_concurrent: usize,
    /// 每个作业的节点数
    pub nodes: Option<u32>,
    /// 每个作业的进程数
    pub processes: u32,
    /// 每个 CPU 的内存
    pub mem_per_cpu: String,
    /// 第一阶段每一波的等待上限（秒）
    pub stage1_timeout_secs: Option<u64>,
    /// 第一阶段最多提交几轮
    pub stage1_attempts: usize,
    /// 输出文件后缀（默认取 SLURM_JOB_ID）
    pub job_tag: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            max_concurrent: 6,
            nodes: Some(3),
            processes: 120,
            mem_per_cpu: "2G".to_string(),
            stage1_timeout_secs: None,
            stage1_attempts: 1,
            job_tag: None,
        }
    }
}

impl SchedulerConfig {
    pub fn stage1_timeout(&self) -> Option<Duration> {
        self.stage1_timeout_secs.map(Duration::from_secs)
    }

    /// 作业标签，没有配置时使用当前时间戳
    pub fn job_tag(&self) -> String {
        self.job_tag
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().timestamp().to_string())
    }
}

/// 目标函数
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ObjectiveConfig {
    /// 目标输运系数：[磁面][种类][系数]
    pub targets: Vec<Vec<Vec<f64>>>,
    /// 权重，维度与 targets 相同
    pub weights: Vec<Vec<Vec<f64>>>,
    /// 模拟失败时替代的哨兵值
    pub sentinel: f64,
    /// HDF5 数据集
    pub dataset: String,
    /// 每个结果文件提取的矩阵元素 (行, 列)，默认 L11 与 L31
    pub entries: Vec<[usize; 2]>,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            targets: vec![
                vec![vec![-0.00016516411764600346, 0.0], vec![0.0, 0.0]],
                vec![vec![-0.0005159076261538864, 0.0], vec![0.0, 0.0]],
                vec![vec![-0.0015055649421042677, 0.0], vec![0.0, 0.0]],
            ],
            weights: vec![
                vec![vec![1.0, 1.0], vec![1.0, 1.0]],
                vec![vec![1.0, 1.0], vec![1.0, 1.0]],
                vec![vec![1.0, 1.0], vec![1.0, 1.0]],
            ],
            sentinel: 1e3,
            dataset: "/transportMatrix".to_string(),
            entries: vec![[0, 0], [2, 0]],
        }
    }
}

impl ObjectiveConfig {
    pub fn flat_targets(&self) -> Vec<f64> {
        self.targets.iter().flatten().flatten().copied().collect()
    }

    pub fn flat_weights(&self) -> Vec<f64> {
        self.weights.iter().flatten().flatten().copied().collect()
    }
}

/// 全局优化器
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// 把主半径 RBC(0,0) 纳入优化空间
    pub unfix_major_radius: bool,
    /// 把 PHIEDGE 纳入优化空间
    pub unfix_phiedge: bool,
    /// 搜索区间为 [(1 - autobound)x, (1 + autobound)x]
    pub autobound: f64,
    pub maxiter: usize,
    pub popsize: usize,
    pub tol: f64,
    pub atol: f64,
    /// 变异系数抖动区间
    pub mutation: [f64; 2],
    pub recombination: f64,
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            unfix_major_radius: false,
            unfix_phiedge: false,
            autobound: 0.1,
            maxiter: 1000,
            popsize: 1,
            tol: 1e-2,
            atol: 0.0,
            mutation: [0.6, 1.0],
            recombination: 0.7,
            seed: None,
        }
    }
}

fn env_override<T: FromStr>(var_name: &str, expected_type: &str) -> AppResult<Option<T>> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            AppError::Config(ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            })
        }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// 加载配置：配置文件（`OPTIMIZER_CONFIG`，默认 `optimizer.toml`）+ 环境变量覆盖
    pub fn from_env() -> AppResult<Self> {
        let path = std::env::var("OPTIMIZER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let mut config = Self::load(Path::new(&path))?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载；文件不存在时使用默认值
    pub fn load(path: &Path) -> AppResult<Self> {
        if path.exists() {
            load_config_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// 环境变量覆盖
    pub fn apply_env(&mut self) -> AppResult<()> {
        if let Some(n) = env_override::<usize>("MAX_CONCURRENT_JOBS", "usize")? {
            self.scheduler.max_concurrent = n;
        }
        if let Some(v) = env_override::<bool>("VERBOSE_LOGGING", "bool")? {
            self.verbose_logging = v;
        }
        if let Ok(user) = std::env::var("SLURM_USER") {
            self.scheduler.user = user;
        } else if self.scheduler.user.is_empty() {
            self.scheduler.user = std::env::var("USER").unwrap_or_default();
        }
        if let Ok(job_id) = std::env::var("SLURM_JOB_ID") {
            self.scheduler.job_tag = Some(job_id);
        }
        Ok(())
    }

    /// 检查配置是否自洽
    pub fn validate(&self) -> AppResult<()> {
        if self.scheduler.max_concurrent == 0 {
            return Err(AppError::invalid_config(
                "scheduler.max_concurrent",
                "必须至少为 1",
            ));
        }
        if self.scheduler.processes == 0 {
            return Err(AppError::invalid_config(
                "scheduler.processes",
                "必须至少为 1",
            ));
        }
        if self.scheduler.stage1_attempts == 0 {
            return Err(AppError::invalid_config(
                "scheduler.stage1_attempts",
                "必须至少为 1",
            ));
        }
        if let Some(field) = self.grid.shape_mismatch() {
            return Err(AppError::invalid_config(
                field,
                "维度必须是 [磁面][粒子种类]",
            ));
        }
        let expected = self.grid.len() * self.objective.entries.len();
        if self.objective.flat_targets().len() != expected {
            return Err(AppError::invalid_config(
                "objective.targets",
                format!("需要 {} 个目标值", expected),
            ));
        }
        if self.objective.flat_weights().len() != expected {
            return Err(AppError::invalid_config(
                "objective.weights",
                format!("需要 {} 个权重", expected),
            ));
        }
        if !(0.0..1.0).contains(&self.optimizer.autobound) {
            return Err(AppError::invalid_config(
                "optimizer.autobound",
                "必须在 [0, 1) 之间",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.objective.flat_targets().len(), 12);
        assert_eq!(config.paths.wout_name(), "wout_vmec.nc");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.scheduler.max_concurrent = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_target_count_must_match_grid() {
        let mut config = Config::default();
        config.objective.entries = vec![[0, 0]];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [scheduler]
            max_concurrent = 2
            nodes = 1

            [optimizer]
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.max_concurrent, 2);
        assert_eq!(config.scheduler.nodes, Some(1));
        assert_eq!(config.scheduler.processes, 120);
        assert_eq!(config.optimizer.seed, Some(7));
        assert_eq!(config.grid.surfaces, vec![0.25, 0.5, 0.75]);
    }
}
