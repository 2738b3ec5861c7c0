use std::path::PathBuf;
use thiserror::Error;

/// 应用程序错误类型
///
/// 只有 [`JobError`] 属于致命错误（步数上限、目录缺失、日志不可读），
/// 其余错误都会在目标函数边界被转换为哨兵惩罚值。
#[derive(Debug, Error)]
pub enum AppError {
    /// 作业相关的致命错误
    #[error("作业错误: {0}")]
    Job(#[from] JobError),
    /// 调度器调用错误
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 结果提取错误
    #[error("提取错误: {0}")]
    Extraction(#[from] ExtractionError),
    /// namelist 解析错误
    #[error("namelist 错误: {0}")]
    Namelist(#[from] NamelistError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

impl AppError {
    /// 是否为不可重试、必须立即终止整个运行的错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Job(_))
    }
}

/// 作业错误（全部为致命错误）
#[derive(Debug, Error)]
pub enum JobError {
    /// 作业达到步数上限
    #[error("目录 {} 中的作业达到步数上限 (Step limit reached for this job)", dir.display())]
    StepLimit { dir: PathBuf },
    /// 派发前目录不存在
    #[error("目录 '{}' 不存在!", dir.display())]
    MissingDirectory { dir: PathBuf },
    /// 已有作业ID但日志无法读取
    #[error("作业 {job_id} 的输出无法读取: {} {}", stdout.display(), stderr.display())]
    UnreadableLogs {
        job_id: String,
        stdout: PathBuf,
        stderr: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 调度器错误
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// 命令启动失败
    #[error("无法启动命令 {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// 命令返回非零退出码
    #[error("命令 {program} 执行失败 (退出码 {code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    /// 无法打开输出重定向文件
    #[error("无法打开输出文件 {}: {source}", path.display())]
    RedirectFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {}", path.display())]
    NotFound { path: PathBuf },
    /// 读取文件失败
    #[error("读取文件失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({}): {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 复制文件失败
    #[error("复制文件失败 ({} -> {}): {source}", from.display(), to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 创建目录失败
    #[error("创建目录失败 ({}): {source}", path.display())]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({}): {source}", path.display())]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// JSON 序列化失败
    #[error("JSON序列化失败 ({}): {source}", path.display())]
    JsonFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 结果提取错误
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// 结果文件不存在
    #[error("结果文件不存在: {}", path.display())]
    MissingArtifact { path: PathBuf },
    /// 结果文件格式错误
    #[error("结果文件格式错误 ({}): {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
    /// 请求的矩阵元素超出范围
    #[error("矩阵元素 ({row}, {col}) 超出范围 {rows}x{cols}")]
    OutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
}

/// namelist 解析错误
#[derive(Debug, Error)]
pub enum NamelistError {
    /// 组未闭合
    #[error("namelist 组 &{group} 没有以 '/' 结束")]
    UnterminatedGroup { group: String },
    /// 找不到组
    #[error("namelist 中找不到组 &{group}")]
    MissingGroup { group: String },
    /// 找不到变量
    #[error("namelist 组 &{group} 中找不到变量 {key}")]
    MissingKey { group: String, key: String },
    /// 数值解析失败
    #[error("无法解析 {key} 的值 '{value}'")]
    BadValue { key: String, value: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值无效
    #[error("配置项 {field} 无效: {reason}")]
    Invalid { field: String, reason: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建目录创建错误
    pub fn create_dir_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::File(FileError::CreateDirFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件复制错误
    pub fn copy_failed(
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        AppError::File(FileError::CopyFailed {
            from: from.into(),
            to: to.into(),
            source,
        })
    }

    /// 创建配置无效错误
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_job_errors_are_fatal() {
        let fatal: AppError = JobError::StepLimit {
            dir: PathBuf::from("00000_000"),
        }
        .into();
        assert!(fatal.is_fatal());

        let missing: AppError = JobError::MissingDirectory {
            dir: PathBuf::from("00001_000"),
        }
        .into();
        assert!(missing.is_fatal());

        let extraction: AppError = ExtractionError::MissingArtifact {
            path: PathBuf::from("sfincsOutput.h5"),
        }
        .into();
        assert!(!extraction.is_fatal());
        assert!(!AppError::Other("x".to_string()).is_fatal());
    }

    #[test]
    fn test_step_limit_message_mentions_marker() {
        let err = JobError::StepLimit {
            dir: PathBuf::from("00003_000"),
        };
        assert!(err.to_string().contains("Step limit reached for this job"));
    }
}
