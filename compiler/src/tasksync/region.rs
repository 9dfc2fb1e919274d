//! Region construction and loop synthesis
//!
//! Each barrier closes a region: the code between the previous barrier (or
//! the group queries, for the first one) and the barrier itself. The region is
//! wrapped in a counting loop so the members of the group run it one after
//! another:
//!
//! ```text
//!   pred ──► header ──turn──► start … exit ──► tail ──done──► succ
//!              ▲  └──────── not our turn ──────►─┘  │
//!              └────────────── next member ─────────┘
//! ```

use super::analyzer::SyncPlan;
use super::config::TurnGuard;
use super::error::{TaskSyncError, TaskSyncResult};
use crate::hlir::{BlockId, FunctionBuilder, InstId, IrError, IrFunction, ValueId};

// ============================================================================
// Regions
// ============================================================================

/// The blocks around one sync call's loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Sync call closing the region
    pub key: InstId,
    /// Block holding the group queries or the previous sync call
    pub pred: BlockId,
    /// First block of the region body
    pub start: BlockId,
    /// Last block of the region body
    pub exit: BlockId,
    /// Block holding the sync call
    pub succ: BlockId,
}

/// Split `first..=last` out of their block into a block of their own
fn isolate(
    func: &mut IrFunction,
    first: InstId,
    last: InstId,
    label: &str,
) -> TaskSyncResult<BlockId> {
    let (block, index) = func.locate(first).ok_or(IrError::UnknownInstr(first))?;
    func.split_block_before(block, index)?;
    let (block, index) = func.locate(last).ok_or(IrError::UnknownInstr(last))?;
    Ok(func.split_block_labeled(block, index + 1, label)?)
}

fn malformed(func: &IrFunction, sync: InstId, reason: String) -> TaskSyncError {
    TaskSyncError::MalformedRegion {
        function: func.name.clone(),
        sync,
        reason,
    }
}

/// Split the function so every sync call and the group queries sit in blocks
/// of their own, then describe one region per sync call in execution order
pub fn build_regions(func: &mut IrFunction, plan: &SyncPlan) -> TaskSyncResult<Vec<Region>> {
    let init_block = isolate(func, plan.init, plan.anchor, "cg.init")?;
    let mut sync_blocks = Vec::with_capacity(plan.sync_calls.len());
    for &sync in &plan.sync_calls {
        sync_blocks.push(isolate(func, sync, sync, "cg.sync")?);
    }

    let mut regions = Vec::with_capacity(sync_blocks.len());
    let mut pred = init_block;
    for (&key, &succ) in plan.sync_calls.iter().zip(&sync_blocks) {
        let start = match func.successors(pred).as_slice() {
            [only] => *only,
            other => {
                return Err(malformed(func, key, format!("{} has successors {:?}", pred, other)));
            }
        };
        if func.predecessors(start) != [pred] {
            return Err(malformed(func, key, format!("{} is entered from outside the region", start)));
        }
        let exit = match func.predecessors(succ).as_slice() {
            [only] => *only,
            other => {
                return Err(malformed(func, key, format!("{} has predecessors {:?}", succ, other)));
            }
        };

        let region = Region {
            key,
            pred,
            start,
            exit,
            succ,
        };
        tracing::debug!(function = %func.name, ?region, "region");
        regions.push(region);
        pred = succ;
    }

    Ok(regions)
}

// ============================================================================
// Loop synthesis
// ============================================================================

/// Blocks and values of one generated loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBlocks {
    pub key: InstId,
    pub pred: BlockId,
    pub header: BlockId,
    pub body: BlockId,
    pub tail: BlockId,
    pub succ: BlockId,
    /// Induction variable phi in the header
    pub induction: ValueId,
    /// Stack slot initialised to zero in the predecessor
    pub slot: ValueId,
}

/// Wraps regions in serializing loops
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionTransformer {
    guard: TurnGuard,
}

impl RegionTransformer {
    pub fn new(guard: TurnGuard) -> Self {
        Self { guard }
    }

    pub fn transform(
        &self,
        func: &mut IrFunction,
        region: &Region,
        plan: &SyncPlan,
    ) -> TaskSyncResult<LoopBlocks> {
        let ty = plan.value_ty.clone();
        let rank = plan.thread_rank;
        let size = plan.group_size;

        let mut b = FunctionBuilder::new(func, region.pred);
        let zero = b.build_int(0, ty.clone())?;
        let slot = b.build_alloca(ty.clone())?;
        b.build_store(slot, zero)?;

        // Header takes over the pred -> start edge, tail the exit -> succ edge
        let header = func.split_block_labeled(region.start, 0, "cg.header")?;
        let tail = func.split_block_labeled(region.succ, 0, "cg.tail")?;

        let mut b = FunctionBuilder::new(func, header);
        let induction = b.build_phi(vec![(region.pred, zero)], ty.clone())?;
        // The guard compares at the group-size width
        let rank = if plan.rank_ty == ty {
            rank
        } else {
            b.build_cast(rank, ty.clone())?
        };
        let turn = match self.guard {
            TurnGuard::RankAndSize => {
                let masked = b.build_and(rank, size, ty.clone())?;
                b.build_eq(masked, zero)?
            }
            TurnGuard::RankEqualsIteration => b.build_eq(rank, induction)?,
        };
        b.build_cond_branch(turn, region.start, tail)?;

        b.switch_to_block(tail);
        let one = b.build_int(1, ty.clone())?;
        let next = b.build_add(induction, one, ty)?;

        func.add_phi_incoming(induction, tail, next)
            .map_err(|e| match e {
                IrError::NotAPhi(value) | IrError::UnknownValue(value) => TaskSyncError::MissingPhi {
                    function: func.name.clone(),
                    value,
                },
                other => other.into(),
            })?;

        let mut b = FunctionBuilder::new(func, tail);
        let done = b.build_uge(next, size)?;
        b.build_cond_branch(done, region.succ, header)?;

        Ok(LoopBlocks {
            key: region.key,
            pred: region.pred,
            header,
            body: region.start,
            tail,
            succ: region.succ,
            induction,
            slot,
        })
    }
}
