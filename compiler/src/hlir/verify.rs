//! Structural verifier for HLIR functions
//!
//! Run after every rewrite of a kernel. The checks are structural only: block
//! and value references resolve, phi nodes sit at block start and agree with
//! the predecessor list, and every definition dominates its uses. Types are
//! not checked.

use super::ir::*;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// A single verifier finding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyIssue {
    #[error("function has no blocks")]
    EmptyFunction,

    #[error("block id {0} is used by more than one block")]
    DuplicateBlock(BlockId),

    #[error("{from} branches to missing block {target}")]
    UnknownTarget { from: BlockId, target: BlockId },

    #[error("phi {inst} in {block} follows a non-phi instruction")]
    MisplacedPhi { block: BlockId, inst: InstId },

    #[error("phi {inst} in {block} has incoming {incoming:?}, predecessors are {preds:?}")]
    PhiIncomingMismatch {
        block: BlockId,
        inst: InstId,
        incoming: Vec<BlockId>,
        preds: Vec<BlockId>,
    },

    #[error("{value} is defined more than once")]
    DuplicateDefinition { value: ValueId },

    #[error("{value} used in {block} is never defined")]
    UndefinedValue { block: BlockId, value: ValueId },

    #[error("definition of {value} does not dominate its use in {block}")]
    NotDominated { block: BlockId, value: ValueId },
}

/// Dominator sets of the blocks reachable from the entry
#[derive(Debug, Clone, Default)]
pub struct Dominators {
    sets: FxHashMap<BlockId, FxHashSet<BlockId>>,
}

impl Dominators {
    /// Iterative dataflow: dom(b) = {b} ∪ ⋂ dom(p) over the predecessors of b
    pub fn compute(func: &IrFunction) -> Self {
        let Some(entry) = func.entry_id() else {
            return Self::default();
        };

        let mut reachable = vec![entry];
        let mut seen: FxHashSet<BlockId> = reachable.iter().copied().collect();
        let mut stack = vec![entry];
        while let Some(block) = stack.pop() {
            for succ in func.successors(block) {
                if func.get_block(succ).is_some() && seen.insert(succ) {
                    reachable.push(succ);
                    stack.push(succ);
                }
            }
        }

        let mut preds: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for &block in &reachable {
            for succ in func.successors(block) {
                preds.entry(succ).or_default().push(block);
            }
        }

        let mut sets: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();
        for &block in &reachable {
            let init = if block == entry {
                [entry].into_iter().collect()
            } else {
                seen.clone()
            };
            sets.insert(block, init);
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &block in &reachable {
                if block == entry {
                    continue;
                }
                let Some((first, rest)) = preds.get(&block).and_then(|p| p.split_first()) else {
                    continue;
                };
                let mut new_dom = sets.get(first).cloned().unwrap_or_default();
                for pred in rest {
                    if let Some(pred_dom) = sets.get(pred) {
                        new_dom.retain(|b| pred_dom.contains(b));
                    }
                }
                new_dom.insert(block);

                if sets.get(&block) != Some(&new_dom) {
                    sets.insert(block, new_dom);
                    changed = true;
                }
            }
        }

        Self { sets }
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.sets.contains_key(&block)
    }

    /// Whether every path from the entry to `block` passes through `dom`
    ///
    /// Unreachable blocks are dominated by every block.
    pub fn dominates(&self, dom: BlockId, block: BlockId) -> bool {
        self.sets.get(&block).map_or(true, |set| set.contains(&dom))
    }
}

/// Collect every structural issue in a function
pub fn check_function(func: &IrFunction) -> Vec<VerifyIssue> {
    let mut issues = Vec::new();

    if func.blocks.is_empty() {
        issues.push(VerifyIssue::EmptyFunction);
        return issues;
    }

    let mut block_ids = FxHashSet::default();
    for block in &func.blocks {
        if !block_ids.insert(block.id) {
            issues.push(VerifyIssue::DuplicateBlock(block.id));
        }
    }

    // Predecessor lists, sorted for comparison against phi incoming edges
    let mut preds: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
    for block in &func.blocks {
        for target in block.terminator.successors() {
            if !block_ids.contains(&target) {
                issues.push(VerifyIssue::UnknownTarget {
                    from: block.id,
                    target,
                });
                continue;
            }
            let list = preds.entry(target).or_default();
            if !list.contains(&block.id) {
                list.push(block.id);
            }
        }
    }
    for list in preds.values_mut() {
        list.sort();
    }

    let mut defined: FxHashSet<ValueId> = func.params.iter().map(|p| p.value).collect();
    for instr in func.blocks.iter().flat_map(|b| b.instructions.iter()) {
        if let Some(value) = instr.result {
            if !defined.insert(value) {
                issues.push(VerifyIssue::DuplicateDefinition { value });
            }
        }
    }

    check_dominance(func, &mut issues);

    for block in &func.blocks {
        let phi_count = block.phi_count();
        let block_preds = preds.get(&block.id).cloned().unwrap_or_default();

        for (index, instr) in block.instructions.iter().enumerate() {
            if let Op::Phi { incoming } = &instr.op {
                if index >= phi_count {
                    issues.push(VerifyIssue::MisplacedPhi {
                        block: block.id,
                        inst: instr.id,
                    });
                }
                let mut from: Vec<BlockId> = incoming.iter().map(|(b, _)| *b).collect();
                from.sort();
                if from != block_preds {
                    issues.push(VerifyIssue::PhiIncomingMismatch {
                        block: block.id,
                        inst: instr.id,
                        incoming: from,
                        preds: block_preds.clone(),
                    });
                }
            }

            for value in instr.op.operands() {
                if !defined.contains(&value) {
                    issues.push(VerifyIssue::UndefinedValue {
                        block: block.id,
                        value,
                    });
                }
            }
        }

        for value in block.terminator.operands() {
            if !defined.contains(&value) {
                issues.push(VerifyIssue::UndefinedValue {
                    block: block.id,
                    value,
                });
            }
        }
    }

    issues
}

/// Every use must be dominated by its definition; a phi operand is used at
/// the end of its incoming block. Parameters dominate everything, and uses in
/// unreachable blocks are not checked.
fn check_dominance(func: &IrFunction, issues: &mut Vec<VerifyIssue>) {
    let doms = Dominators::compute(func);

    let mut def_site: FxHashMap<ValueId, (BlockId, usize)> = FxHashMap::default();
    for block in &func.blocks {
        for (index, instr) in block.instructions.iter().enumerate() {
            if let Some(value) = instr.result {
                def_site.entry(value).or_insert((block.id, index));
            }
        }
    }
    // `at` is the position of the use inside `block`; None means its end
    let dominated = |value: ValueId, block: BlockId, at: Option<usize>| match def_site.get(&value) {
        None => true,
        Some(&(def_block, def_index)) if def_block == block => at.map_or(true, |i| def_index < i),
        Some(&(def_block, _)) => doms.dominates(def_block, block),
    };

    for block in func.blocks.iter().filter(|b| doms.is_reachable(b.id)) {
        for (index, instr) in block.instructions.iter().enumerate() {
            match &instr.op {
                Op::Phi { incoming } => {
                    for &(from, value) in incoming {
                        if !dominated(value, from, None) {
                            issues.push(VerifyIssue::NotDominated { block: from, value });
                        }
                    }
                }
                op => {
                    for value in op.operands() {
                        if !dominated(value, block.id, Some(index)) {
                            issues.push(VerifyIssue::NotDominated {
                                block: block.id,
                                value,
                            });
                        }
                    }
                }
            }
        }
        for value in block.terminator.operands() {
            if !dominated(value, block.id, None) {
                issues.push(VerifyIssue::NotDominated {
                    block: block.id,
                    value,
                });
            }
        }
    }
}

/// Verify a function, failing with every issue found
pub fn verify_function(func: &IrFunction) -> IrResult<()> {
    let issues = check_function(func);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(IrError::Invalid {
            function: func.name.clone(),
            issues,
        })
    }
}

/// Verify every function of a module, stopping at the first invalid one
pub fn verify_module(module: &IrModule) -> IrResult<()> {
    module.functions.iter().try_for_each(verify_function)
}
