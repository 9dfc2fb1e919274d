//! Property-based integration tests for the task-sync pass
//!
//! Generates kernels of varying shape and checks path enumeration and
//! rewrite invariants.

use hip_task_sync::hlir::{check_function, BlockId, FunctionBuilder, IrFunction, IrModule, IrType};
use hip_task_sync::tasksync::{
    FunctionOutcome, Ineligible, PathEnd, PathEnumerator, PathLimitExceeded, TaskSyncConfig,
    TaskSyncPass, TurnGuard,
};
use proptest::prelude::*;

// ============================================================================
// Kernel Generators
// ============================================================================

/// Strategy for straight-line kernels: work items before each barrier
fn arb_segments() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..4usize, 0..6)
}

/// Strategy for small arbitrary CFGs as adjacency lists
fn arb_graph() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..8usize).prop_flat_map(|n| prop::collection::vec(prop::collection::vec(0..n, 0..3), n))
}

fn linear_kernel(segments: &[usize]) -> IrFunction {
    let mut func = IrFunction::kernel("linear");
    let entry = func.create_block("entry");
    let mut b = FunctionBuilder::new(&mut func, entry);
    b.build_call("__hip_cg_thread_rank", vec![], IrType::I32)
        .unwrap();
    b.build_call("__hip_cg_group_size", vec![], IrType::I32)
        .unwrap();
    for &work in segments {
        for i in 0..work {
            b.build_i32(i as i64).unwrap();
        }
        b.build_call_void("__hip_cg_sync", vec![]).unwrap();
    }
    b.build_return(None).unwrap();
    func
}

/// `k` sequential diamonds followed by one barrier
fn diamond_chain(k: usize) -> IrFunction {
    let mut func = IrFunction::kernel("diamonds");
    let entry = func.create_block("entry");
    let mut b = FunctionBuilder::new(&mut func, entry);
    let rank = b.build_call("__hip_cg_thread_rank", vec![], IrType::I32)
        .unwrap();
    b.build_call("__hip_cg_group_size", vec![], IrType::I32)
        .unwrap();
    let zero = b.build_i32(0).unwrap();
    let flag = b.build_eq(rank, zero).unwrap();

    for i in 0..k {
        let left = b.create_block(format!("left{}", i));
        let right = b.create_block(format!("right{}", i));
        let join = b.create_block(format!("join{}", i));
        b.build_cond_branch(flag, left, right).unwrap();
        b.switch_to_block(left);
        b.build_branch(join).unwrap();
        b.switch_to_block(right);
        b.build_branch(join).unwrap();
        b.switch_to_block(join);
    }
    b.build_call_void("__hip_cg_sync", vec![]).unwrap();
    b.build_return(None).unwrap();
    func
}

/// Kernel with the given successor lists; barriers in the blocks flagged
fn graph_kernel(graph: &[Vec<usize>], sync_blocks: &[bool]) -> IrFunction {
    let mut func = IrFunction::kernel("graph");
    let ids: Vec<BlockId> = (0..graph.len())
        .map(|i| func.create_block(format!("b{}", i)))
        .collect();

    let mut b = FunctionBuilder::new(&mut func, ids[0]);
    b.build_call("__hip_cg_thread_rank", vec![], IrType::I32)
        .unwrap();
    b.build_call("__hip_cg_group_size", vec![], IrType::I32)
        .unwrap();

    for (i, succs) in graph.iter().enumerate() {
        b.switch_to_block(ids[i]);
        if sync_blocks.get(i).copied().unwrap_or(false) {
            b.build_call_void("__hip_cg_sync", vec![]).unwrap();
        }
        match succs.as_slice() {
            [] => b.build_return(None).unwrap(),
            [only] => b.build_branch(ids[*only]).unwrap(),
            [first, second, ..] => {
                let flag = b.build_bool(true).unwrap();
                b.build_cond_branch(flag, ids[*first], ids[*second])
                    .unwrap()
            }
        }
    }
    func
}

fn run_one(func: IrFunction, config: TaskSyncConfig) -> (IrFunction, FunctionOutcome) {
    let mut module = IrModule::new("prop");
    module.add_function(func);
    let report = TaskSyncPass::with_config(config).run(&mut module).unwrap();
    let outcome = report.functions[0].outcome.clone();
    (module.functions.remove(0), outcome)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn linear_kernels_get_one_loop_per_sync(segments in arb_segments(), corrected in any::<bool>()) {
        let config = TaskSyncConfig {
            turn_guard: if corrected { TurnGuard::RankEqualsIteration } else { TurnGuard::RankAndSize },
            ..TaskSyncConfig::default()
        };
        let (func, outcome) = run_one(linear_kernel(&segments), config);

        match outcome {
            FunctionOutcome::Transformed { loops } => {
                prop_assert_eq!(loops.len(), segments.len());
                for pair in loops.windows(2) {
                    prop_assert_eq!(pair[1].pred, pair[0].succ);
                }
                prop_assert!(check_function(&func).is_empty());
            }
            FunctionOutcome::Skipped(reason) => {
                prop_assert!(segments.is_empty());
                prop_assert_eq!(reason, Ineligible::NoSyncCalls);
            }
        }
    }

    #[test]
    fn diamond_chains_have_two_to_the_k_paths(k in 0..8usize) {
        let func = diamond_chain(k);
        let paths = PathEnumerator::new(&func).enumerate().unwrap();
        prop_assert_eq!(paths.len(), 1usize << k);
        prop_assert!(paths.values().all(|p| p.end == PathEnd::Exit));

        let (after, outcome) = run_one(func, TaskSyncConfig::default());
        prop_assert!(outcome.is_transformed());
        prop_assert!(check_function(&after).is_empty());
    }

    #[test]
    fn path_limit_is_reported(k in 2..8usize) {
        let func = diamond_chain(k);
        let limit = (1usize << k) - 1;
        prop_assert_eq!(
            PathEnumerator::with_limit(&func, limit).enumerate(),
            Err(PathLimitExceeded { limit })
        );
    }

    #[test]
    fn enumeration_terminates_on_arbitrary_graphs(graph in arb_graph()) {
        let func = graph_kernel(&graph, &[]);
        let paths = PathEnumerator::new(&func).enumerate().unwrap();
        prop_assert!(!paths.is_empty());

        let entry = func.entry_id().unwrap();
        for (id, path) in &paths {
            prop_assert_eq!(*id, path.id);
            prop_assert_eq!(path.nodes[0], entry);
            let mut seen = path.nodes.clone();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), path.nodes.len());

            let last = *path.nodes.last().unwrap();
            match path.end {
                PathEnd::Exit => prop_assert!(func.successors(last).is_empty()),
                PathEnd::BackEdge => prop_assert!(func
                    .successors(last)
                    .iter()
                    .any(|s| path.nodes.contains(s))),
            }
        }
    }

    #[test]
    fn pass_output_verifies_or_is_unchanged(
        graph in arb_graph(),
        syncs in prop::collection::vec(any::<bool>(), 8),
    ) {
        let func = graph_kernel(&graph, &syncs);
        let before = func.clone();
        let (after, outcome) = run_one(func, TaskSyncConfig::default());

        if outcome.is_transformed() {
            prop_assert!(check_function(&after).is_empty());
        } else {
            prop_assert_eq!(after, before);
        }
    }
}
