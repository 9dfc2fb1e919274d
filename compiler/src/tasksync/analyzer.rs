//! Cooperative-group synchronization analysis
//!
//! Proves that every barrier of a kernel is reached along one linear,
//! unambiguous sequence before any rewriting happens. The analysis is pure:
//! it reads the function and either produces a [`SyncPlan`] or an
//! [`Ineligible`] reason. Only [`CooperativeGroupAnalyzer::run`] mutates.

use super::classify::{CallKind, SyncCallClassifier};
use super::config::TaskSyncConfig;
use super::error::{Ineligible, TaskSyncResult};
use super::paths::{PathEnumerator, PathLimitExceeded};
use super::region::{RegionTransformer, build_regions};
use super::FunctionOutcome;
use crate::hlir::{BlockId, InstId, IrFunction, IrType, Op, ValueId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::fmt;
use std::ops::ControlFlow;

/// Shape of the control flow around one sync call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPattern {
    /// Not yet resolved
    Unsolved,
    /// On every exit path, outside any cycle
    Simple,
    /// Skipped by at least one exit path
    InBranchBody,
    /// Block lies on a cycle
    InLoopBody,
    /// Missing from the reference sync sequence
    Unsupported,
}

impl fmt::Display for SyncPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPattern::Unsolved => write!(f, "unsolved"),
            SyncPattern::Simple => write!(f, "simple"),
            SyncPattern::InBranchBody => write!(f, "in a branch body"),
            SyncPattern::InLoopBody => write!(f, "in a loop body"),
            SyncPattern::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// A sync call and its resolved pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRecord {
    pub inst: InstId,
    pub block: BlockId,
    pub pattern: SyncPattern,
}

/// Everything the rewrite needs, produced by a successful analysis
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    /// Last thread-rank query in the entry block
    pub init: InstId,
    /// Later of the thread-rank and group-size queries
    pub anchor: InstId,
    pub thread_rank: ValueId,
    pub group_size: ValueId,
    /// Type of the thread-rank value
    pub rank_ty: IrType,
    /// Type of the group-size value, used for the induction variable
    pub value_ty: IrType,
    /// Sync calls in execution order
    pub sync_calls: Vec<InstId>,
    pub records: Vec<SyncRecord>,
    pub paths_examined: usize,
}

struct InitPoint {
    init: InstId,
    anchor: InstId,
    thread_rank: ValueId,
    group_size: ValueId,
    rank_ty: IrType,
    value_ty: IrType,
}

/// Path facts gathered while checking sync visitation
struct PathSummary {
    reference: Vec<InstId>,
    exit_paths: usize,
    exit_visits: FxHashMap<BlockId, usize>,
    paths_examined: usize,
}

/// Analyzes and rewrites one kernel at a time
#[derive(Debug, Clone)]
pub struct CooperativeGroupAnalyzer {
    classifier: SyncCallClassifier,
    config: TaskSyncConfig,
}

impl CooperativeGroupAnalyzer {
    pub fn new(config: TaskSyncConfig) -> Self {
        Self {
            classifier: SyncCallClassifier::new(config.match_rule),
            config,
        }
    }

    pub fn classifier(&self) -> &SyncCallClassifier {
        &self.classifier
    }

    /// Check eligibility and plan the rewrite without touching the function
    pub fn analyze(&self, func: &IrFunction) -> Result<SyncPlan, Ineligible> {
        if func.blocks.is_empty() {
            return Err(Ineligible::EmptyFunction);
        }

        let sync_map = self.collect_sync_calls(func);
        if sync_map.is_empty() {
            return Err(Ineligible::NoSyncCalls);
        }

        let init = self.locate_init(func)?;
        let summary = self.check_paths(func, &sync_map)?;

        let mut records: Vec<SyncRecord> = func
            .blocks
            .iter()
            .filter_map(|b| sync_map.get(&b.id).map(|calls| (b.id, calls)))
            .flat_map(|(block, calls)| {
                calls.iter().map(move |&inst| SyncRecord {
                    inst,
                    block,
                    pattern: SyncPattern::Unsolved,
                })
            })
            .collect();
        for record in &mut records {
            record.pattern = resolve_pattern(func, record, &summary);
        }
        if let Some(bad) = records.iter().find(|r| r.pattern != SyncPattern::Simple) {
            return Err(Ineligible::UnsupportedPattern {
                inst: bad.inst,
                block: bad.block,
                pattern: bad.pattern,
            });
        }
        self.check_region_locality(func, init.anchor, &summary.reference)?;

        Ok(SyncPlan {
            init: init.init,
            anchor: init.anchor,
            thread_rank: init.thread_rank,
            group_size: init.group_size,
            rank_ty: init.rank_ty,
            value_ty: init.value_ty,
            sync_calls: summary.reference,
            records,
            paths_examined: summary.paths_examined,
        })
    }

    /// Analyze, then rewrite every sync region into a serializing loop
    ///
    /// An ineligible function is returned unmodified as
    /// [`FunctionOutcome::Skipped`].
    pub fn run(&self, func: &mut IrFunction) -> TaskSyncResult<FunctionOutcome> {
        let plan = match self.analyze(func) {
            Ok(plan) => plan,
            Err(reason) => {
                tracing::debug!(function = %func.name, %reason, "task sync skipped");
                return Ok(FunctionOutcome::Skipped(reason));
            }
        };
        tracing::debug!(
            function = %func.name,
            syncs = plan.sync_calls.len(),
            paths = plan.paths_examined,
            "task sync plan ready"
        );

        let regions = build_regions(func, &plan)?;
        let transformer = RegionTransformer::new(self.config.turn_guard);
        let mut loops = Vec::with_capacity(regions.len());
        for region in &regions {
            loops.push(transformer.transform(func, region, &plan)?);
        }

        if self.config.erase_sync_calls {
            for &sync in &plan.sync_calls {
                func.remove_instr(sync)?;
            }
        }

        Ok(FunctionOutcome::Transformed { loops })
    }

    /// Sync calls of every block, reachable or not, in block order
    fn collect_sync_calls(&self, func: &IrFunction) -> FxHashMap<BlockId, Vec<InstId>> {
        let mut map: FxHashMap<BlockId, Vec<InstId>> = FxHashMap::default();
        for block in &func.blocks {
            for instr in &block.instructions {
                if self.classifier.is_sync_call(instr) {
                    map.entry(block.id).or_default().push(instr.id);
                }
            }
        }
        map
    }

    fn locate_init(&self, func: &IrFunction) -> Result<InitPoint, Ineligible> {
        let entry = func.entry_block().ok_or(Ineligible::EmptyFunction)?;

        let mut rank = None;
        let mut size = None;
        for (index, instr) in entry.instructions.iter().enumerate() {
            let Some(value) = instr.result else { continue };
            match self.classifier.classify(instr) {
                CallKind::ThreadRank => rank = Some((index, instr.id, value, instr.ty.clone())),
                CallKind::GroupSize => size = Some((index, instr.id, value, instr.ty.clone())),
                _ => {}
            }
        }
        let (rank_index, init, thread_rank, rank_ty) = rank.ok_or(Ineligible::NoThreadRankQuery)?;
        let (size_index, size_inst, group_size, value_ty) =
            size.ok_or(Ineligible::NoGroupSizeQuery)?;

        let (anchor_index, anchor) = if size_index > rank_index {
            (size_index, size_inst)
        } else {
            (rank_index, init)
        };
        if let Some(sync) = entry.instructions[..anchor_index]
            .iter()
            .find(|i| self.classifier.is_sync_call(i))
        {
            return Err(Ineligible::SyncBeforeInit { sync: sync.id });
        }

        Ok(InitPoint {
            init,
            anchor,
            thread_rank,
            group_size,
            rank_ty,
            value_ty,
        })
    }

    /// Walk every path, requiring the sync blocks to be visited all-or-none
    /// and in one consistent order
    fn check_paths(
        &self,
        func: &IrFunction,
        sync_map: &FxHashMap<BlockId, Vec<InstId>>,
    ) -> Result<PathSummary, Ineligible> {
        let total = sync_map.len();
        let mut summary = PathSummary {
            reference: Vec::new(),
            exit_paths: 0,
            exit_visits: FxHashMap::default(),
            paths_examined: 0,
        };
        let mut have_reference = false;

        let enumerator = PathEnumerator::with_limit(func, self.config.max_paths);
        let flow = enumerator.try_for_each_path(|path| {
            summary.paths_examined += 1;
            let visited: Vec<BlockId> = path
                .nodes
                .iter()
                .copied()
                .filter(|b| sync_map.contains_key(b))
                .collect();

            if path.is_exit() {
                summary.exit_paths += 1;
                for b in &visited {
                    *summary.exit_visits.entry(*b).or_default() += 1;
                }
            }
            // Exit paths must reach every barrier; a path cut by a back edge
            // may also have stopped before the first one
            let partial = if path.is_exit() {
                visited.len() < total
            } else {
                !visited.is_empty() && visited.len() < total
            };
            if partial {
                return ControlFlow::Break(Ineligible::PartialSyncVisitation {
                    path: path.id,
                    visited: visited.len(),
                    total,
                });
            }
            if visited.is_empty() {
                return ControlFlow::Continue(());
            }

            let sequence: Vec<InstId> = visited
                .iter()
                .flat_map(|b| sync_map[b].iter().copied())
                .collect();
            if !have_reference {
                tracing::debug!(function = %func.name, path = path.id, ?sequence, "reference sync sequence");
                summary.reference = sequence;
                have_reference = true;
            } else if sequence != summary.reference {
                // Paths never repeat a block and every one reaching here visits
                // all sync blocks, so only the order can differ
                debug_assert_eq!(sequence.len(), summary.reference.len());
                return ControlFlow::Break(Ineligible::SyncOrderMismatch { path: path.id });
            }
            ControlFlow::Continue(())
        });

        match flow {
            Err(PathLimitExceeded { limit }) => return Err(Ineligible::TooManyPaths { limit }),
            Ok(ControlFlow::Break(reason)) => return Err(reason),
            Ok(ControlFlow::Continue(())) => {}
        }
        if !have_reference {
            return Err(Ineligible::NoSyncPath);
        }
        Ok(summary)
    }

    /// Require every value defined between two barriers to be used only there
    ///
    /// The loop built around a region can skip the region body, so a
    /// definition inside it would not dominate a use past the barrier.
    /// Program points are staged: 0 up to the group queries, 2k-1 for the
    /// code leading to sync call k, 2k for the call itself, and 2n+1 after
    /// the last one. Even stages dominate everything that follows them.
    fn check_region_locality(
        &self,
        func: &IrFunction,
        anchor: InstId,
        sequence: &[InstId],
    ) -> Result<(), Ineligible> {
        let Some(entry) = func.entry_id() else {
            return Err(Ineligible::EmptyFunction);
        };
        let position: FxHashMap<InstId, usize> = sequence
            .iter()
            .enumerate()
            .map(|(i, &sync)| (sync, i + 1))
            .collect();

        let mut start_stage: FxHashMap<BlockId, usize> = FxHashMap::default();
        let mut end_stage: FxHashMap<BlockId, usize> = FxHashMap::default();
        let mut defined_at: FxHashMap<ValueId, usize> = FxHashMap::default();
        let mut uses: Vec<(ValueId, usize)> = Vec::new();
        let mut phi_uses: Vec<(ValueId, BlockId)> = Vec::new();

        start_stage.insert(entry, 0);
        let mut queue = VecDeque::from([entry]);
        while let Some(id) = queue.pop_front() {
            let Some(block) = func.get_block(id) else {
                continue;
            };
            let mut stage = start_stage.get(&id).copied().unwrap_or_default();
            for instr in &block.instructions {
                let sync = position.get(&instr.id).copied();
                let at = sync.map_or(stage, |k| 2 * k);
                match &instr.op {
                    Op::Phi { incoming } => {
                        phi_uses.extend(incoming.iter().map(|&(from, value)| (value, from)));
                    }
                    op => uses.extend(op.operands().into_iter().map(|value| (value, at))),
                }
                if let Some(value) = instr.result {
                    defined_at.insert(value, at);
                }
                if let Some(k) = sync {
                    stage = 2 * k + 1;
                } else if instr.id == anchor {
                    stage = 1;
                }
            }
            uses.extend(block.terminator.operands().into_iter().map(|value| (value, stage)));
            end_stage.insert(id, stage);

            for succ in func.successors(id) {
                if !start_stage.contains_key(&succ) {
                    start_stage.insert(succ, stage);
                    queue.push_back(succ);
                }
            }
        }
        // A phi reads its operand at the end of the incoming block
        uses.extend(
            phi_uses
                .into_iter()
                .filter_map(|(value, from)| end_stage.get(&from).map(|&stage| (value, stage))),
        );

        for (value, at) in uses {
            let Some(&def) = defined_at.get(&value) else {
                continue;
            };
            if def % 2 == 0 || def == at {
                continue;
            }
            if let Some(&sync) = sequence.get(def / 2) {
                return Err(Ineligible::ValueLiveAcrossSync { value, sync });
            }
        }
        Ok(())
    }
}

impl Default for CooperativeGroupAnalyzer {
    fn default() -> Self {
        Self::new(TaskSyncConfig::default())
    }
}

fn resolve_pattern(func: &IrFunction, record: &SyncRecord, summary: &PathSummary) -> SyncPattern {
    if on_cycle(func, record.block) {
        return SyncPattern::InLoopBody;
    }
    let visits = summary.exit_visits.get(&record.block).copied().unwrap_or(0);
    if visits < summary.exit_paths {
        return SyncPattern::InBranchBody;
    }
    if !summary.reference.contains(&record.inst) {
        return SyncPattern::Unsupported;
    }
    SyncPattern::Simple
}

/// Whether `block` can reach itself
fn on_cycle(func: &IrFunction, block: BlockId) -> bool {
    let mut seen = FxHashSet::default();
    let mut stack = func.successors(block);
    while let Some(b) = stack.pop() {
        if b == block {
            return true;
        }
        if seen.insert(b) {
            stack.extend(func.successors(b));
        }
    }
    false
}
