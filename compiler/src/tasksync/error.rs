//! Task-sync errors and rejection reasons

use super::analyzer::SyncPattern;
use crate::hlir::{BlockId, InstId, IrError, ValueId, VerifyIssue};
use miette::Diagnostic;
use thiserror::Error;

/// Fatal task-sync error
///
/// Any of these aborts the pass run. A function that merely does not fit the
/// supported shape is not an error; see [`Ineligible`].
#[derive(Debug, Error, Diagnostic)]
pub enum TaskSyncError {
    #[error("loop header value {value} in `{function}` is not a phi node")]
    #[diagnostic(
        code(hip_task_sync::missing_phi),
        help("the region header was modified between loop construction and closing")
    )]
    MissingPhi { function: String, value: ValueId },

    #[error("region around {sync} in `{function}` is malformed: {reason}")]
    #[diagnostic(code(hip_task_sync::malformed_region))]
    MalformedRegion {
        function: String,
        sync: InstId,
        reason: String,
    },

    #[error(transparent)]
    #[diagnostic(code(hip_task_sync::ir))]
    Ir(#[from] IrError),

    #[error("`{function}` failed verification after task sync: {}", format_issues(.issues))]
    #[diagnostic(
        code(hip_task_sync::verify),
        help("this is a bug in the task-sync rewrite; please report the input kernel")
    )]
    Verify {
        function: String,
        issues: Vec<VerifyIssue>,
    },

    #[error("unknown pass `{0}` in pipeline")]
    #[diagnostic(code(hip_task_sync::unknown_pass), help("available passes: hip-task-sync"))]
    UnknownPass(String),

    #[error("invalid task-sync configuration: {0}")]
    #[diagnostic(code(hip_task_sync::config))]
    Config(String),
}

fn format_issues(issues: &[VerifyIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for task-sync operations.
pub type TaskSyncResult<T> = Result<T, TaskSyncError>;

/// Why a kernel was left untouched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("function has no blocks")]
    EmptyFunction,

    #[error("entry block has no thread-rank query")]
    NoThreadRankQuery,

    #[error("entry block has no group-size query")]
    NoGroupSizeQuery,

    #[error("sync call {sync} precedes the group queries")]
    SyncBeforeInit { sync: InstId },

    #[error("no cooperative-group sync calls")]
    NoSyncCalls,

    #[error("path {path} visits {visited} of {total} sync blocks")]
    PartialSyncVisitation {
        path: usize,
        visited: usize,
        total: usize,
    },

    #[error("path {path} reaches the sync calls in a different order")]
    SyncOrderMismatch { path: usize },

    #[error("no path visits every sync block")]
    NoSyncPath,

    #[error("more than {limit} control-flow paths")]
    TooManyPaths { limit: usize },

    #[error("sync call {inst} in {block} is {pattern}")]
    UnsupportedPattern {
        inst: InstId,
        block: BlockId,
        pattern: SyncPattern,
    },

    #[error("{value} is defined before sync call {sync} and used after it")]
    ValueLiveAcrossSync { value: ValueId, sync: InstId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_error_lists_issues() {
        let err = TaskSyncError::Verify {
            function: "k".to_string(),
            issues: vec![
                VerifyIssue::EmptyFunction,
                VerifyIssue::DuplicateBlock(BlockId(2)),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("`k` failed verification"));
        assert!(msg.contains("function has no blocks; block id bb2"));
    }

    #[test]
    fn test_ir_error_converts() {
        let err: TaskSyncError = IrError::UnknownBlock(BlockId(4)).into();
        assert_eq!(err.to_string(), "unknown block bb4");
        assert_eq!(
            err.code().map(|c| c.to_string()),
            Some("hip_task_sync::ir".to_string())
        );
    }

    #[test]
    fn test_ineligible_messages() {
        let reason = Ineligible::PartialSyncVisitation {
            path: 1,
            visited: 1,
            total: 2,
        };
        assert_eq!(reason.to_string(), "path 1 visits 1 of 2 sync blocks");
        assert_eq!(
            Ineligible::UnsupportedPattern {
                inst: InstId(3),
                block: BlockId(1),
                pattern: SyncPattern::InLoopBody,
            }
            .to_string(),
            "sync call #3 in bb1 is in a loop body"
        );
        assert_eq!(
            Ineligible::ValueLiveAcrossSync {
                value: ValueId(4),
                sync: InstId(5),
            }
            .to_string(),
            "%4 is defined before sync call #5 and used after it"
        );
    }
}
