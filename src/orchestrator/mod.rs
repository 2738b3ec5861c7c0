//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责全局优化循环，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `driver` - 优化驱动
//! - 管理应用生命周期（初始化、运行、保存结果）
//! - 持有调度器、结果读取器和运行状态（迭代计数、日志）
//! - 输出全局统计信息
//!
//! ### `minimizer` - 全局优化器
//! - `Objective` / `Minimizer` 两个接口
//! - 差分进化实现
//!
//! ## 层次关系
//!
//! ```text
//! driver (全局优化循环)
//!     ↓
//! workflow::Evaluator (处理单个候选向量)
//!     ↓
//! workflow::Pipeline → workflow::Dispatcher
//!     ↓
//! services (能力层：状态判断 / 输入写入 / 结果读取 / 日志)
//!     ↓
//! infrastructure (基础设施：Scheduler)
//! ```

pub mod driver;
pub mod minimizer;

// 重新导出主要类型
pub use driver::App;
pub use minimizer::{DifferentialEvolution, MinimizeResult, Minimizer, Objective};
