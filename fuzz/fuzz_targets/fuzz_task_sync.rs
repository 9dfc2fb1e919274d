//! Fuzz target for the task-sync pass
//!
//! Builds kernels with arbitrary control-flow shapes and barrier placements.
//! The pass must never panic, and every kernel it rewrites must verify.

#![no_main]

use arbitrary::Arbitrary;
use hip_task_sync::hlir::{check_function, BlockId, FunctionBuilder, IrFunction, IrModule, IrType};
use hip_task_sync::tasksync::{MatchRule, TaskSyncConfig, TaskSyncPass, TurnGuard};
use libfuzzer_sys::fuzz_target;

const MAX_BLOCKS: usize = 12;

/// Structured input describing one kernel
#[derive(Debug, Arbitrary)]
struct FuzzInput {
    blocks: Vec<BlockShape>,
    corrected_guard: bool,
    legacy_matching: bool,
    erase_sync_calls: bool,
}

#[derive(Debug, Arbitrary)]
struct BlockShape {
    ops: Vec<Instr>,
    exit: Exit,
}

#[derive(Debug, Arbitrary)]
enum Instr {
    Rank,
    Size,
    Sync,
    MangledSync,
    Work(i8),
}

#[derive(Debug, Arbitrary)]
enum Exit {
    Return,
    Jump(u8),
    Branch(u8, u8),
    Switch(u8, Vec<u8>),
}

fn build_kernel(input: &FuzzInput) -> Option<IrFunction> {
    let shapes = &input.blocks[..input.blocks.len().min(MAX_BLOCKS)];
    if shapes.is_empty() {
        return None;
    }

    let mut func = IrFunction::kernel("fuzz");
    let ids: Vec<BlockId> = (0..shapes.len())
        .map(|i| func.create_block(format!("b{}", i)))
        .collect();
    let target = |t: &u8| ids[*t as usize % ids.len()];

    for (shape, &id) in shapes.iter().zip(&ids) {
        let mut b = FunctionBuilder::new(&mut func, id);
        for op in shape.ops.iter().take(16) {
            match op {
                Instr::Rank => {
                    b.build_call("__hip_cg_thread_rank", vec![], IrType::I32).ok()?;
                }
                Instr::Size => {
                    b.build_call("__hip_cg_group_size", vec![], IrType::I32).ok()?;
                }
                Instr::Sync => {
                    b.build_call_void("__hip_cg_sync", vec![]).ok()?;
                }
                Instr::MangledSync => {
                    b.build_call_void("_ZN18cooperative_groups12thread_group4syncEv", vec![])
                        .ok()?;
                }
                Instr::Work(v) => {
                    b.build_i32(*v as i64).ok()?;
                }
            }
        }
        match &shape.exit {
            Exit::Return => b.build_return(None).ok()?,
            Exit::Jump(t) => b.build_branch(target(t)).ok()?,
            Exit::Branch(t, e) => {
                let flag = b.build_bool(true).ok()?;
                b.build_cond_branch(flag, target(t), target(e)).ok()?;
            }
            Exit::Switch(d, cases) => {
                let key = b.build_i32(0).ok()?;
                let cases = cases
                    .iter()
                    .take(4)
                    .enumerate()
                    .map(|(i, t)| (i as i64, target(t)))
                    .collect();
                b.build_switch(key, target(d), cases).ok()?;
            }
        }
    }
    Some(func)
}

fuzz_target!(|input: FuzzInput| {
    let Some(kernel) = build_kernel(&input) else {
        return;
    };
    let original = kernel.clone();

    let config = TaskSyncConfig {
        match_rule: if input.legacy_matching {
            MatchRule::Substring
        } else {
            MatchRule::Intrinsics
        },
        turn_guard: if input.corrected_guard {
            TurnGuard::RankEqualsIteration
        } else {
            TurnGuard::RankAndSize
        },
        max_paths: 256,
        verify_after: false,
        erase_sync_calls: input.erase_sync_calls,
    };

    let mut module = IrModule::new("fuzz");
    module.add_function(kernel);
    let Ok(report) = TaskSyncPass::with_config(config).run(&mut module) else {
        return;
    };

    let after = &module.functions[0];
    if report.changed() {
        let issues = check_function(after);
        assert!(issues.is_empty(), "{:?}\n{}", issues, after);
    } else {
        assert_eq!(after, &original);
    }
});
