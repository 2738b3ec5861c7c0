//! 作业状态
//!
//! 状态完全由作业捕获的 stdout / stderr 文本推导，规则按优先级顺序匹配，
//! 第一个命中的规则决定结果。

use std::fmt;
use std::str::FromStr;

/// 作业生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Status {
    /// 从未运行过作业
    NoOut,
    /// 作业在调度器中排队
    Queued,
    /// 有输出但没有终止标记
    Running,
    /// SFINCS 成功完成
    Done,
    /// VMEC 成功完成（允许展开第二阶段）
    VmecDone,
    /// VMEC 数值失败
    VmecFail,
    /// SFINCS 数值失败
    SfincsFail,
    /// 超过墙钟时间上限
    Time,
    /// 超过步数上限（致命）
    StepLimit,
    /// 内存不足
    Oom,
    /// 段错误
    Segfault,
    /// 作业被取消
    Cancelled,
}

impl Status {
    pub const ALL: [Status; 12] = [
        Status::NoOut,
        Status::Queued,
        Status::Running,
        Status::Done,
        Status::VmecDone,
        Status::VmecFail,
        Status::SfincsFail,
        Status::Time,
        Status::StepLimit,
        Status::Oom,
        Status::Segfault,
        Status::Cancelled,
    ];

    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            Status::NoOut => "NOOUT",
            Status::Queued => "QUEUED",
            Status::Running => "RUNNING",
            Status::Done => "DONE",
            Status::VmecDone => "VMECDONE",
            Status::VmecFail => "VMECFAIL",
            Status::SfincsFail => "SFINCSFAIL",
            Status::Time => "TIME",
            Status::StepLimit => "STEPLIMIT",
            Status::Oom => "OOM",
            Status::Segfault => "SEGFAULT",
            Status::Cancelled => "CANCELLED",
        }
    }

    /// 第一阶段是否应重新提交
    pub fn is_resubmittable(self) -> bool {
        matches!(
            self,
            Status::NoOut | Status::Time | Status::Cancelled | Status::StepLimit
        )
    }

    /// 是否为数值失败类终止状态（记录但不重试）
    pub fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            Status::VmecFail | Status::SfincsFail | Status::Oom | Status::Segfault
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Status::ALL
            .iter()
            .copied()
            .find(|status| status.name() == upper)
            .ok_or_else(|| format!("未知的作业状态: {}", s))
    }
}

/// 规则检查的输出流
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// 匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// 区分大小写的子串
    Contains(&'static str),
    /// 对小写化后的文本匹配（模式本身必须是小写）
    ContainsLower(&'static str),
    /// 文本非空
    NonEmpty,
}

/// 一条分类规则
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub stream: Stream,
    pub pattern: Pattern,
    pub status: Status,
}

const fn rule(stream: Stream, pattern: Pattern, status: Status) -> Rule {
    Rule {
        stream,
        pattern,
        status,
    }
}

/// 按优先级排列的分类规则表
///
/// 顺序有意义：部分失败信息是其他信息的子串（`killed` 与 `oom-kill`），
/// 而 stderr 中的完成标记可能与之后出现的通用错误信息并存。
pub const RULES: &[Rule] = &[
    rule(
        Stream::Stdout,
        Pattern::Contains("ARNORM OR AZNORM EQUAL ZERO IN BCOVAR"),
        Status::VmecFail,
    ),
    rule(
        Stream::Stdout,
        Pattern::Contains("Try increasing NITER"),
        Status::VmecFail,
    ),
    rule(Stream::Stdout, Pattern::Contains("ELAPSED TIME"), Status::Done),
    rule(
        Stream::Stdout,
        Pattern::Contains("Linear solve did not converge"),
        Status::SfincsFail,
    ),
    rule(
        Stream::Stderr,
        Pattern::Contains("Step limit reached for this job"),
        Status::StepLimit,
    ),
    rule(Stream::Stderr, Pattern::ContainsLower("oom-kill"), Status::Oom),
    rule(
        Stream::Stderr,
        Pattern::ContainsLower("bus error, possibly illegal memory access"),
        Status::Oom,
    ),
    rule(Stream::Stderr, Pattern::ContainsLower("time limit"), Status::Time),
    rule(Stream::Stderr, Pattern::ContainsLower("killed"), Status::Oom),
    rule(
        Stream::Stdout,
        Pattern::Contains("EXECUTION TERMINATED NORMALLY"),
        Status::VmecDone,
    ),
    rule(
        Stream::Stderr,
        Pattern::Contains(" CANCELLED AT "),
        Status::Cancelled,
    ),
    rule(
        Stream::Stderr,
        Pattern::Contains("Job step aborted"),
        Status::Cancelled,
    ),
    rule(
        Stream::Stderr,
        Pattern::ContainsLower("segmentation fault"),
        Status::Segfault,
    ),
    rule(Stream::Stdout, Pattern::NonEmpty, Status::Running),
];

/// 对一对捕获文本应用规则表
///
/// 返回命中的状态；没有规则命中（stdout 为空）时返回 `None`。
pub fn match_rules(stdout: &str, stderr: &str) -> Option<Status> {
    let stderr_lower = stderr.to_lowercase();
    RULES.iter().find_map(|rule| {
        let (text, lower) = match rule.stream {
            Stream::Stdout => (stdout, None),
            Stream::Stderr => (stderr, Some(stderr_lower.as_str())),
        };
        let hit = match rule.pattern {
            Pattern::Contains(needle) => text.contains(needle),
            Pattern::ContainsLower(needle) => lower
                .map(|l| l.contains(needle))
                .unwrap_or_else(|| text.to_lowercase().contains(needle)),
            Pattern::NonEmpty => !text.is_empty(),
        };
        hit.then_some(rule.status)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names_roundtrip() {
        for status in Status::ALL {
            assert_eq!(status.name().parse::<Status>().unwrap(), status);
        }
        assert_eq!("vmecdone".parse::<Status>().unwrap(), Status::VmecDone);
        assert!("FINISHED".parse::<Status>().is_err());
    }

    #[test]
    fn test_lower_patterns_are_lowercase() {
        for rule in RULES {
            if let Pattern::ContainsLower(needle) = rule.pattern {
                assert_eq!(needle, needle.to_lowercase());
            }
        }
    }

    #[test]
    fn test_vmec_fail_beats_done() {
        let out = "ARNORM OR AZNORM EQUAL ZERO IN BCOVAR\nELAPSED TIME 10s";
        assert_eq!(match_rules(out, ""), Some(Status::VmecFail));
    }

    #[test]
    fn test_done_beats_errors_in_stderr() {
        // 完成标记出现后 stderr 中仍可能有超时信息
        let out = "... ELAPSED TIME = 120 s";
        let err = "slurmstepd: error: *** STEP CANCELLED AT 2024 DUE TO TIME LIMIT ***";
        assert_eq!(match_rules(out, err), Some(Status::Done));
    }

    #[test]
    fn test_oom_kill_beats_time_limit() {
        let err = "Some of your processes may have been killed by the cgroup out-of-memory handler (OOM-Kill). time limit";
        assert_eq!(match_rules("running", err), Some(Status::Oom));
    }

    #[test]
    fn test_time_limit_beats_plain_killed() {
        let err = "srun: Job step aborted. DUE TO TIME LIMIT; processes Killed";
        assert_eq!(match_rules("x", err), Some(Status::Time));
    }

    #[test]
    fn test_killed_is_oom() {
        assert_eq!(match_rules("x", "process Killed"), Some(Status::Oom));
    }

    #[test]
    fn test_step_limit_from_stderr() {
        let err = "srun: error: Step limit reached for this job";
        assert_eq!(match_rules("", err), Some(Status::StepLimit));
    }

    #[test]
    fn test_vmec_done_beats_cancelled() {
        let out = "EXECUTION TERMINATED NORMALLY";
        let err = "srun: Job step aborted: Waiting up to 32 seconds";
        assert_eq!(match_rules(out, err), Some(Status::VmecDone));
    }

    #[test]
    fn test_cancelled_markers() {
        assert_eq!(
            match_rules("partial", "*** JOB 123 CANCELLED AT 2024-01-01 ***"),
            Some(Status::Cancelled)
        );
        assert_eq!(
            match_rules("partial", "srun: Job step aborted"),
            Some(Status::Cancelled)
        );
    }

    #[test]
    fn test_segfault_case_insensitive() {
        assert_eq!(
            match_rules("partial", "Segmentation Fault (core dumped)"),
            Some(Status::Segfault)
        );
    }

    #[test]
    fn test_running_and_empty() {
        assert_eq!(match_rules("iteration 3", ""), Some(Status::Running));
        assert_eq!(match_rules("", ""), None);
        assert_eq!(match_rules("", "some warning"), None);
    }

    #[test]
    fn test_resubmittable_states() {
        let eligible: Vec<Status> = Status::ALL
            .iter()
            .copied()
            .filter(|s| s.is_resubmittable())
            .collect();
        assert_eq!(
            eligible,
            vec![
                Status::NoOut,
                Status::Time,
                Status::StepLimit,
                Status::Cancelled
            ]
        );
    }
}
