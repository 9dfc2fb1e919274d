//! Cooperative-group synchronization lowering ("task sync")
//!
//! Targets without cooperative-group hardware cannot execute a group barrier
//! directly. This pass rewrites every barrier of a kernel into explicit
//! control flow: the code between two barriers becomes a counting loop over
//! the members of the group, so each member runs the region in turn.
//!
//! # Architecture
//!
//! ```text
//! IrModule
//!    │  kernels only
//!    ▼
//! ┌──────────────────────────┐
//! │ CooperativeGroupAnalyzer │  ← init point, paths, sync order, patterns
//! └──────────────────────────┘
//!    │  SyncPlan
//!    ▼
//! ┌──────────────────────────┐
//! │    build_regions         │  ← isolate queries and barriers
//! └──────────────────────────┘
//!    │  Vec<Region>
//!    ▼
//! ┌──────────────────────────┐
//! │   RegionTransformer      │  ← header / tail / induction phi
//! └──────────────────────────┘
//! ```
//!
//! A kernel that does not fit the supported shape is skipped unmodified with
//! an [`Ineligible`] reason. Only structural failures are errors.

pub mod analyzer;
pub mod classify;
pub mod config;
pub mod error;
pub mod paths;
pub mod region;
pub mod registry;

pub use analyzer::{CooperativeGroupAnalyzer, SyncPattern, SyncPlan, SyncRecord};
pub use classify::{CallKind, IntrinsicTable, SyncCallClassifier};
pub use config::{MatchRule, TaskSyncConfig, TurnGuard};
pub use error::{Ineligible, TaskSyncError, TaskSyncResult};
pub use paths::{
    ControlFlowGraph, DEFAULT_MAX_PATHS, Path, PathEnd, PathEnumerator, PathId,
    PathLimitExceeded, PathSet,
};
pub use region::{LoopBlocks, Region, RegionTransformer, build_regions};
pub use registry::{ModulePass, PassRegistry};

use crate::hlir::{IrError, IrModule, verify_function};

/// Pipeline name of the pass
pub const PASS_ID: &str = "hip-task-sync";

/// What happened to one kernel
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionOutcome {
    /// Every region was rewritten into a loop, in execution order
    Transformed { loops: Vec<LoopBlocks> },
    /// Left unmodified
    Skipped(Ineligible),
}

impl FunctionOutcome {
    pub fn is_transformed(&self) -> bool {
        matches!(self, FunctionOutcome::Transformed { .. })
    }
}

/// Per-kernel result
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionReport {
    pub name: String,
    pub outcome: FunctionOutcome,
}

/// Result of running the pass over a module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub functions: Vec<FunctionReport>,
}

impl PassReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any kernel was rewritten
    pub fn changed(&self) -> bool {
        self.functions.iter().any(|f| f.outcome.is_transformed())
    }

    pub fn transformed(&self) -> impl Iterator<Item = &FunctionReport> {
        self.functions.iter().filter(|f| f.outcome.is_transformed())
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &Ineligible)> {
        self.functions.iter().filter_map(|f| match &f.outcome {
            FunctionOutcome::Skipped(reason) => Some((f.name.as_str(), reason)),
            FunctionOutcome::Transformed { .. } => None,
        })
    }

    pub fn outcome(&self, name: &str) -> Option<&FunctionOutcome> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.outcome)
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        let mut s = String::new();
        let loops: usize = self
            .functions
            .iter()
            .map(|f| match &f.outcome {
                FunctionOutcome::Transformed { loops } => loops.len(),
                FunctionOutcome::Skipped(_) => 0,
            })
            .sum();
        s.push_str(&format!(
            "task sync: {} kernel(s), {} transformed, {} loop(s)\n",
            self.functions.len(),
            self.transformed().count(),
            loops
        ));
        for (name, reason) in self.skipped() {
            s.push_str(&format!("  skipped {}: {}\n", name, reason));
        }
        s
    }
}

/// The task-sync module pass
///
/// Holds only configuration; every kernel is analyzed with fresh state.
#[derive(Debug, Clone, Default)]
pub struct TaskSyncPass {
    config: TaskSyncConfig,
}

impl TaskSyncPass {
    /// Create a pass with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pass with specific configuration
    pub fn with_config(config: TaskSyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TaskSyncConfig {
        &self.config
    }

    /// Run over every kernel of the module
    ///
    /// Non-kernel functions are not inspected. A skipped kernel never affects
    /// its siblings; a structural error aborts the run.
    pub fn run(&self, module: &mut IrModule) -> TaskSyncResult<PassReport> {
        let analyzer = CooperativeGroupAnalyzer::new(self.config.clone());
        let mut report = PassReport::new();

        for func in module.functions.iter_mut().filter(|f| f.is_kernel()) {
            tracing::info!(function = %func.name, "task sync in {}", func.name);
            let outcome = analyzer.run(func)?;

            if outcome.is_transformed() && self.config.verify_after {
                verify_function(func).map_err(|e| match e {
                    IrError::Invalid { function, issues } => {
                        TaskSyncError::Verify { function, issues }
                    }
                    other => TaskSyncError::Ir(other),
                })?;
            }
            if let FunctionOutcome::Transformed { loops } = &outcome {
                tracing::debug!(function = %func.name, loops = loops.len(), "task sync applied");
            }

            report.functions.push(FunctionReport {
                name: func.name.clone(),
                outcome,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hlir::{CallingConv, FunctionBuilder, IrFunction, IrType};

    fn sync_kernel(name: &str, conv: CallingConv) -> IrFunction {
        let mut func = IrFunction::new(name, conv, IrType::Void);
        let entry = func.create_block("entry");
        let mut b = FunctionBuilder::new(&mut func, entry);
        b.build_call("__hip_cg_thread_rank", vec![], IrType::I32)
            .unwrap();
        b.build_call("__hip_cg_group_size", vec![], IrType::I32)
            .unwrap();
        b.build_call_void("__hip_cg_sync", vec![]).unwrap();
        b.build_return(None).unwrap();
        func
    }

    fn make_test_module() -> IrModule {
        let mut module = IrModule::new("test");
        module.add_function(sync_kernel("kernel_a", CallingConv::SpirKernel));
        module.add_function(sync_kernel("helper", CallingConv::SpirFunc));
        let mut plain = IrFunction::kernel("kernel_b");
        let entry = plain.create_block("entry");
        FunctionBuilder::new(&mut plain, entry)
            .build_return(None)
            .unwrap();
        module.add_function(plain);
        module
    }

    #[test]
    fn test_run_reports_kernels_only() {
        let mut module = make_test_module();
        let helper_before = module.find_function("helper").cloned();

        let report = TaskSyncPass::new().run(&mut module).unwrap();

        assert!(report.changed());
        assert_eq!(report.functions.len(), 2);
        assert!(report.outcome("kernel_a").unwrap().is_transformed());
        assert_eq!(
            report.outcome("kernel_b"),
            Some(&FunctionOutcome::Skipped(Ineligible::NoSyncCalls))
        );
        assert!(report.outcome("helper").is_none());
        assert_eq!(module.find_function("helper").cloned(), helper_before);
    }

    #[test]
    fn test_unchanged_module_reports_no_change() {
        let mut module = IrModule::new("empty");
        module.add_function(sync_kernel("helper", CallingConv::SpirFunc));
        let report = TaskSyncPass::new().run(&mut module).unwrap();
        assert!(!report.changed());
        assert!(report.functions.is_empty());
    }

    #[test]
    fn test_summary() {
        let mut module = make_test_module();
        let report = TaskSyncPass::new().run(&mut module).unwrap();
        let summary = report.summary();
        assert!(summary.contains("2 kernel(s), 1 transformed, 1 loop(s)"));
        assert!(summary.contains("skipped kernel_b: no cooperative-group sync calls"));
    }

    #[test]
    fn test_erase_sync_calls() {
        let mut module = make_test_module();
        let config = TaskSyncConfig {
            erase_sync_calls: true,
            ..TaskSyncConfig::default()
        };
        TaskSyncPass::with_config(config).run(&mut module).unwrap();

        let kernel = module.find_function("kernel_a").unwrap();
        let classifier = SyncCallClassifier::default();
        assert!(kernel
            .blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .all(|i| !classifier.is_sync_call(i)));
    }
}
