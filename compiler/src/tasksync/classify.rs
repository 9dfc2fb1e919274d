//! Cooperative-group call classification
//!
//! Decides whether an instruction is a thread-rank query, a group-size query,
//! a group barrier, or anything else. Only direct calls are considered, and
//! argument types are not checked.

use super::config::MatchRule;
use crate::hlir::IrInstr;

/// What a call means to the task-sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    ThreadRank,
    GroupSize,
    GroupSync,
    Other,
}

/// Versioned set of recognised cooperative-group entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntrinsicTable {
    /// Device-library entry points plus mangled `cooperative_groups` members
    #[default]
    V1,
}

impl IntrinsicTable {
    const V1_THREAD_RANK: &'static str = "__hip_cg_thread_rank";
    const V1_GROUP_SIZE: &'static str = "__hip_cg_group_size";
    const V1_SYNC: &'static str = "__hip_cg_sync";

    /// Namespace prefixes for (const) member functions of `cooperative_groups`
    const MANGLED_PREFIXES: [&'static str; 2] =
        ["_ZN18cooperative_groups", "_ZNK18cooperative_groups"];

    /// Look up a callee name
    pub fn lookup(self, name: &str) -> CallKind {
        match self {
            IntrinsicTable::V1 => match name {
                Self::V1_THREAD_RANK => CallKind::ThreadRank,
                Self::V1_GROUP_SIZE => CallKind::GroupSize,
                Self::V1_SYNC => CallKind::GroupSync,
                _ => Self::lookup_mangled(name),
            },
        }
    }

    fn lookup_mangled(name: &str) -> CallKind {
        let Some(rest) = Self::MANGLED_PREFIXES
            .iter()
            .find_map(|prefix| name.strip_prefix(prefix))
        else {
            return CallKind::Other;
        };
        // Member name is the last nested-name component, closed by `E` and an
        // empty `v` parameter list
        if rest.ends_with("11thread_rankEv") {
            CallKind::ThreadRank
        } else if rest.ends_with("4sizeEv") {
            CallKind::GroupSize
        } else if rest.ends_with("4syncEv") {
            CallKind::GroupSync
        } else {
            CallKind::Other
        }
    }
}

/// Classifies instructions under one [`MatchRule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncCallClassifier {
    rule: MatchRule,
    table: IntrinsicTable,
}

impl SyncCallClassifier {
    pub fn new(rule: MatchRule) -> Self {
        Self {
            rule,
            table: IntrinsicTable::default(),
        }
    }

    pub fn rule(&self) -> MatchRule {
        self.rule
    }

    pub fn classify(&self, instr: &IrInstr) -> CallKind {
        match instr.callee() {
            Some(name) => self.classify_name(name),
            None => CallKind::Other,
        }
    }

    /// Classify a callee name directly
    pub fn classify_name(&self, name: &str) -> CallKind {
        match self.rule {
            MatchRule::Intrinsics => self.table.lookup(name),
            MatchRule::Substring => classify_substring(name),
        }
    }

    pub fn is_sync_call(&self, instr: &IrInstr) -> bool {
        self.classify(instr) == CallKind::GroupSync
    }

    pub fn is_thread_rank_query(&self, instr: &IrInstr) -> bool {
        self.classify(instr) == CallKind::ThreadRank
    }

    pub fn is_group_size_query(&self, instr: &IrInstr) -> bool {
        self.classify(instr) == CallKind::GroupSize
    }
}

/// Keyword search starting at byte 1: a keyword only at the very start of the
/// name does not count.
fn classify_substring(name: &str) -> CallKind {
    let Some(tail) = name.get(1..) else {
        return CallKind::Other;
    };
    if tail.contains("thread_rank") {
        CallKind::ThreadRank
    } else if tail.contains("size") {
        CallKind::GroupSize
    } else if tail.contains("sync") {
        CallKind::GroupSync
    } else {
        CallKind::Other
    }
}
