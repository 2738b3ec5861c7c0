//! 优化驱动 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责初始化和全局资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：读取 VMEC 输入，建立优化空间与搜索区间，创建日志
//! 2. **资源管理**：唯一持有调度器、结果读取器和可变运行状态
//! 3. **全局优化**：把求值器交给差分进化，逐个求值候选向量
//! 4. **结果保存**：写出最终快照和统计信息
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个目录的细节
//! - **向下委托**：委托 workflow::Evaluator 求值单个候选向量

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{Scheduler, SlurmScheduler};
use crate::models::boundary::{auto_bounds, Boundary, DofSpace};
use crate::models::loaders::read_text;
use crate::models::namelist::Namelist;
use crate::orchestrator::minimizer::{DifferentialEvolution, MinimizeResult, Minimizer, Objective};
use crate::services::input_writer::VMEC_GROUP;
use crate::services::{ArtifactReader, H5DumpReader, RunLog, SnapshotStore};
use crate::utils::logging::{log_startup, print_final_stats};
use crate::workflow::{Evaluator, RunState};

/// 应用主结构
pub struct App {
    config: Arc<Config>,
    evaluator: Evaluator,
    state: RunState,
    bounds: Vec<(f64, f64)>,
    snapshots: SnapshotStore,
    minimizer: DifferentialEvolution,
}

/// 求值器 + 运行状态，作为优化器看到的目标函数
struct Session<'a> {
    evaluator: &'a Evaluator,
    state: &'a mut RunState,
}

#[async_trait]
impl Objective for Session<'_> {
    async fn evaluate(&mut self, x: &[f64]) -> AppResult<f64> {
        self.evaluator.evaluate(&mut *self.state, x).await
    }
}

impl App {
    /// 初始化应用（Slurm 调度器 + h5dump 读取器）
    pub async fn initialize(config: Config) -> Result<Self> {
        let reader = H5DumpReader::from_config(&config.paths, &config.objective);
        Self::with_components(config, Arc::new(SlurmScheduler::new()), Arc::new(reader)).await
    }

    /// 使用指定的调度器和结果读取器初始化
    pub async fn with_components(
        config: Config,
        scheduler: Arc<dyn Scheduler>,
        reader: Arc<dyn ArtifactReader>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let paths = &config.paths;

        let full_path = paths.resolve(&paths.full_vmec_input);
        let full_text = read_text(&full_path)
            .with_context(|| format!("无法读取 VMEC 输入: {}", full_path.display()))?;

        let boundary = Boundary::parse(&full_text);
        if boundary.is_empty() {
            return Err(AppError::invalid_config(
                "paths.full_vmec_input",
                format!("{} 中没有边界系数", full_path.display()),
            )
            .into());
        }

        let phiedge = if config.optimizer.unfix_phiedge {
            Some(Namelist::parse(&full_text)?.get_real(VMEC_GROUP, "PHIEDGE")?)
        } else {
            None
        };

        let stripped = Namelist::parse(&load_stripped_input(&config, &full_text).await?)?;
        let dofs = DofSpace::new(boundary, config.optimizer.unfix_major_radius, phiedge);
        if dofs.is_empty() {
            return Err(AppError::invalid_config(
                "optimizer",
                format!("{} 中没有可优化的自由度", full_path.display()),
            )
            .into());
        }
        let bounds = auto_bounds(&dofs.initial(), config.optimizer.autobound);

        let snapshots = SnapshotStore::new(paths.root.clone());
        snapshots.save_dof_names(&dofs.names())?;

        let log = RunLog::create(paths.resolve(&paths.log_file))?;
        log_startup(&config, dofs.len());

        let minimizer = DifferentialEvolution::new(&config.optimizer);
        let evaluator = Evaluator::new(config.clone(), scheduler, reader, dofs, stripped);

        Ok(Self {
            config,
            evaluator,
            state: RunState::new(log),
            bounds,
            snapshots,
            minimizer,
        })
    }

    pub fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    /// 运行应用主逻辑
    pub async fn run(mut self) -> Result<MinimizeResult> {
        info!("🔍 开始全局优化，共 {} 个自由度", self.bounds.len());

        let mut session = Session {
            evaluator: &self.evaluator,
            state: &mut self.state,
        };
        let result = self.minimizer.minimize(&mut session, &self.bounds).await?;

        self.snapshots
            .save_result(&result.x, result.fun, result.nit)?;
        print_final_stats(result.nit, result.fun, result.nfev, self.state.log.path());
        if !result.converged {
            info!("⚠️ 达到最大代数 {}，未满足收敛判据", self.config.optimizer.maxiter);
        }

        Ok(result)
    }
}

/// 读取剥离后的 VMEC 输入；不存在时从完整输入生成并保存
async fn load_stripped_input(config: &Config, full_text: &str) -> AppResult<String> {
    let path: PathBuf = config.paths.resolve(&config.paths.stripped_vmec_input);
    if path.is_file() {
        return read_text(&path);
    }

    let stripped = Boundary::strip(full_text);
    fs::write(&path, &stripped)
        .await
        .map_err(|e| AppError::file_write_failed(&path, e))?;
    info!("已生成剥离边界系数的 VMEC 输入: {}", path.display());
    Ok(stripped)
}
