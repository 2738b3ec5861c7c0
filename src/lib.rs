//! # Transport Opt
//!
//! 在 Slurm 集群上驱动"VMEC 平衡 → SFINCS 输运"两阶段模拟的优化程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（集群），只暴露能力
//! - `Scheduler` - 提交 / 查询队列 / 查询工作目录 / 取消
//! - `SlurmScheduler` - `srun` / `squeue` / `scontrol` / `scancel` 实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个目录
//! - `StatusClassifier` - 根据作业输出判断状态
//! - `InputWriter` - 写第一 / 第二阶段输入文件
//! - `ArtifactReader` - 读取 SFINCS 输运矩阵
//! - `RunLog` / `SnapshotStore` - 写日志和结果快照
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个候选向量"的完整处理流程
//! - `Dispatcher` - 按并发上限分波提交
//! - `Pipeline` - 第一阶段 → 展开 → 第二阶段
//! - `Evaluator` - 候选向量 → 目标函数值
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/driver` - 应用生命周期与全局优化循环
//! - `orchestrator/minimizer` - 差分进化
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{Scheduler, SlurmScheduler};
pub use models::{Status, WorkUnit};
pub use orchestrator::App;
pub use services::{ArtifactReader, H5DumpReader, StatusClassifier};
pub use workflow::{Dispatcher, Evaluator, Pipeline, RunState};
