//! HLIR IR definitions - SSA-based intermediate representation
//!
//! This module defines the core IR types the task-sync pass runs on: a module
//! of device functions, each an ordered list of basic blocks in SSA form with
//! explicit terminators. Blocks, values and instructions are addressed by
//! stable id handles, so graph edits never invalidate what an analysis holds.

use super::verify::VerifyIssue;
use thiserror::Error;

/// Errors raised by IR queries and edits
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrError {
    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    #[error("unknown instruction {0}")]
    UnknownInstr(InstId),

    #[error("value {0} is not defined by any instruction")]
    UnknownValue(ValueId),

    #[error("value {0} is not a phi node")]
    NotAPhi(ValueId),

    #[error("split index {index} is out of range for {block} ({len} instructions)")]
    SplitOutOfRange {
        block: BlockId,
        index: usize,
        len: usize,
    },

    #[error("cannot split {block} at {index}: index falls inside the leading phi group")]
    SplitBeforePhi { block: BlockId, index: usize },

    #[error("function `{function}` failed verification ({} issue(s))", .issues.len())]
    Invalid {
        function: String,
        issues: Vec<VerifyIssue>,
    },
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;

/// HLIR module - top-level compilation unit
#[derive(Debug, Clone, PartialEq)]
pub struct IrModule {
    pub name: String,
    pub functions: Vec<IrFunction>,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn add_function(&mut self, func: IrFunction) {
        self.functions.push(func);
    }

    pub fn find_function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

}

/// Calling convention of a device function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallingConv {
    /// Ordinary device function
    SpirFunc,
    /// Kernel entry point, launched by the device dispatch mechanism
    SpirKernel,
}

/// HLIR function
#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub calling_conv: CallingConv,
    pub params: Vec<IrParam>,
    pub return_type: IrType,
    /// Basic blocks; the first one is the entry block
    pub blocks: Vec<IrBlock>,
    next_block_id: u32,
    next_value_id: u32,
    next_inst_id: u32,
}

impl IrFunction {
    pub fn new(name: impl Into<String>, calling_conv: CallingConv, return_type: IrType) -> Self {
        Self {
            name: name.into(),
            calling_conv,
            params: Vec::new(),
            return_type,
            blocks: Vec::new(),
            next_block_id: 0,
            next_value_id: 0,
            next_inst_id: 0,
        }
    }

    /// Create an empty kernel entry point returning void
    pub fn kernel(name: impl Into<String>) -> Self {
        Self::new(name, CallingConv::SpirKernel, IrType::Void)
    }

    pub fn is_kernel(&self) -> bool {
        self.calling_conv == CallingConv::SpirKernel
    }

    /// Add a parameter, returning the SSA value bound to it
    pub fn add_param(&mut self, name: impl Into<String>, ty: IrType) -> ValueId {
        let value = self.fresh_value();
        self.params.push(IrParam {
            value,
            name: name.into(),
            ty,
        });
        value
    }

    /// Append a new empty block
    pub fn create_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = self.fresh_block_id();
        self.blocks.push(IrBlock::new(id, label));
        id
    }

    pub fn fresh_block_id(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        id
    }

    pub fn fresh_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        id
    }

    pub fn fresh_inst_id(&mut self) -> InstId {
        let id = InstId(self.next_inst_id);
        self.next_inst_id += 1;
        id
    }

    pub fn entry_block(&self) -> Option<&IrBlock> {
        self.blocks.first()
    }

    pub fn entry_id(&self) -> Option<BlockId> {
        self.blocks.first().map(|b| b.id)
    }

    pub fn get_block(&self, id: BlockId) -> Option<&IrBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> Option<&mut IrBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    /// Position of a block in the block list
    pub fn block_index(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    /// Distinct successors of a block, in terminator order
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        let mut succs = Vec::new();
        if let Some(block) = self.get_block(id) {
            for target in block.terminator.successors() {
                if !succs.contains(&target) {
                    succs.push(target);
                }
            }
        }
        succs
    }

    /// Distinct predecessors of a block, in block order
    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| b.terminator.successors().contains(&id))
            .map(|b| b.id)
            .collect()
    }

    /// Find the block holding an instruction and its index in that block
    pub fn locate(&self, inst: InstId) -> Option<(BlockId, usize)> {
        self.blocks.iter().find_map(|b| {
            b.instructions
                .iter()
                .position(|i| i.id == inst)
                .map(|index| (b.id, index))
        })
    }

    pub fn instr(&self, inst: InstId) -> Option<&IrInstr> {
        self.blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .find(|i| i.id == inst)
    }

    /// The instruction defining an SSA value
    pub fn defining_instr(&self, value: ValueId) -> Option<&IrInstr> {
        self.blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .find(|i| i.result == Some(value))
    }

    /// Split `block` so that the instructions before `index` move into a new
    /// block placed immediately in front of it.
    ///
    /// The new block ends with an unconditional branch to `block`, and every
    /// edge that targeted `block` now targets the new block. Leading phi nodes
    /// travel with the prefix, so `index` may not fall inside the phi group.
    /// Splitting the entry block yields a new entry block.
    pub fn split_block_before(&mut self, block: BlockId, index: usize) -> IrResult<BlockId> {
        let label = self
            .get_block(block)
            .map(|b| format!("{}.split", b.label))
            .ok_or(IrError::UnknownBlock(block))?;
        self.split_block_labeled(block, index, label)
    }

    /// [`split_block_before`](Self::split_block_before), naming the new block
    pub fn split_block_labeled(
        &mut self,
        block: BlockId,
        index: usize,
        label: impl Into<String>,
    ) -> IrResult<BlockId> {
        let pos = self
            .block_index(block)
            .ok_or(IrError::UnknownBlock(block))?;
        let (len, phis) = {
            let b = &self.blocks[pos];
            (b.instructions.len(), b.phi_count())
        };
        if index > len {
            return Err(IrError::SplitOutOfRange { block, index, len });
        }
        if index < phis {
            return Err(IrError::SplitBeforePhi { block, index });
        }

        let new_id = self.fresh_block_id();
        for b in &mut self.blocks {
            b.terminator.retarget(block, new_id);
        }

        let prefix: Vec<IrInstr> = self.blocks[pos].instructions.drain(..index).collect();
        let mut new_block = IrBlock::new(new_id, label);
        new_block.instructions = prefix;
        new_block.terminator = IrTerminator::Branch(block);
        self.blocks.insert(pos, new_block);

        tracing::trace!(function = %self.name, %block, index, new = %new_id, "split block");
        Ok(new_id)
    }

    /// Append an incoming edge to the phi node defining `phi`
    pub fn add_phi_incoming(&mut self, phi: ValueId, from: BlockId, value: ValueId) -> IrResult<()> {
        let instr = self
            .blocks
            .iter_mut()
            .flat_map(|b| b.instructions.iter_mut())
            .find(|i| i.result == Some(phi))
            .ok_or(IrError::UnknownValue(phi))?;
        match &mut instr.op {
            Op::Phi { incoming } => {
                incoming.push((from, value));
                Ok(())
            }
            _ => Err(IrError::NotAPhi(phi)),
        }
    }

    /// Remove an instruction, returning it
    pub fn remove_instr(&mut self, inst: InstId) -> IrResult<IrInstr> {
        let (block, index) = self.locate(inst).ok_or(IrError::UnknownInstr(inst))?;
        let b = self
            .get_block_mut(block)
            .ok_or(IrError::UnknownBlock(block))?;
        Ok(b.instructions.remove(index))
    }
}

/// Block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Value identifier (SSA value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Instruction identifier, stable across block splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

/// HLIR parameter
#[derive(Debug, Clone, PartialEq)]
pub struct IrParam {
    pub value: ValueId,
    pub name: String,
    pub ty: IrType,
}

/// HLIR type
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
    F64,
    Ptr(Box<IrType>),
    Array(Box<IrType>, usize),
    Struct(String),
}

/// HLIR basic block
#[derive(Debug, Clone, PartialEq)]
pub struct IrBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<IrInstr>,
    pub terminator: IrTerminator,
}

impl IrBlock {
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            instructions: Vec::new(),
            terminator: IrTerminator::Unreachable,
        }
    }

    /// Number of phi nodes at the top of the block
    pub fn phi_count(&self) -> usize {
        self.instructions.iter().take_while(|i| i.is_phi()).count()
    }
}

/// HLIR instruction
#[derive(Debug, Clone, PartialEq)]
pub struct IrInstr {
    pub id: InstId,
    pub result: Option<ValueId>,
    pub op: Op,
    pub ty: IrType,
}

impl IrInstr {
    /// Callee name for direct calls
    pub fn callee(&self) -> Option<&str> {
        match &self.op {
            Op::CallDirect { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.op, Op::Phi { .. })
    }
}

/// HLIR operation
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Constant value
    Const(IrConstant),
    /// Binary operation
    Binary {
        op: BinaryOp,
        left: ValueId,
        right: ValueId,
    },
    /// Direct function call by name
    CallDirect { name: String, args: Vec<ValueId> },
    /// Load from memory
    Load { ptr: ValueId },
    /// Store to memory
    Store { ptr: ValueId, value: ValueId },
    /// Get pointer to array element
    GetElementPtr { base: ValueId, index: ValueId },
    /// Allocate stack memory
    Alloca { ty: IrType },
    /// Type cast
    Cast { value: ValueId, target: IrType },
    /// Phi node (SSA)
    Phi { incoming: Vec<(BlockId, ValueId)> },
}

impl Op {
    /// SSA values read by this operation
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Op::Const(_) | Op::Alloca { .. } => Vec::new(),
            Op::Binary { left, right, .. } => vec![*left, *right],
            Op::CallDirect { args, .. } => args.clone(),
            Op::Load { ptr } => vec![*ptr],
            Op::Store { ptr, value } => vec![*ptr, *value],
            Op::GetElementPtr { base, index } => vec![*base, *index],
            Op::Cast { value, .. } => vec![*value],
            Op::Phi { incoming } => incoming.iter().map(|(_, v)| *v).collect(),
        }
    }
}

/// HLIR constant
#[derive(Debug, Clone, PartialEq)]
pub enum IrConstant {
    Bool(bool),
    Int(i64, IrType),
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Integer arithmetic
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    // Float arithmetic
    FAdd,
    FSub,
    FMul,
    FDiv,
    // Bitwise
    And,
    Or,
    Xor,
    Shl,
    AShr,
    LShr,
    // Integer comparison
    Eq,
    Ne,
    SLt,
    SLe,
    SGt,
    SGe,
    ULt,
    ULe,
    UGt,
    UGe,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::SLt
                | BinaryOp::SLe
                | BinaryOp::SGt
                | BinaryOp::SGe
                | BinaryOp::ULt
                | BinaryOp::ULe
                | BinaryOp::UGt
                | BinaryOp::UGe
        )
    }
}

/// Block terminator
#[derive(Debug, Clone, PartialEq)]
pub enum IrTerminator {
    /// Return from function
    Return(Option<ValueId>),
    /// Unconditional branch
    Branch(BlockId),
    /// Conditional branch
    CondBranch {
        condition: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Switch on integer value
    Switch {
        value: ValueId,
        default: BlockId,
        cases: Vec<(i64, BlockId)>,
    },
    /// Unreachable code
    Unreachable,
}

impl IrTerminator {
    /// Branch targets in operand order (may repeat)
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            IrTerminator::Return(_) | IrTerminator::Unreachable => Vec::new(),
            IrTerminator::Branch(target) => vec![*target],
            IrTerminator::CondBranch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            IrTerminator::Switch { default, cases, .. } => std::iter::once(*default)
                .chain(cases.iter().map(|(_, b)| *b))
                .collect(),
        }
    }

    /// Redirect every edge to `from` so it goes to `to`
    pub fn retarget(&mut self, from: BlockId, to: BlockId) {
        let swap = |b: &mut BlockId| {
            if *b == from {
                *b = to;
            }
        };
        match self {
            IrTerminator::Return(_) | IrTerminator::Unreachable => {}
            IrTerminator::Branch(target) => swap(target),
            IrTerminator::CondBranch {
                then_block,
                else_block,
                ..
            } => {
                swap(then_block);
                swap(else_block);
            }
            IrTerminator::Switch { default, cases, .. } => {
                swap(default);
                for (_, b) in cases.iter_mut() {
                    swap(b);
                }
            }
        }
    }

    /// SSA values read by this terminator
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            IrTerminator::Return(Some(v)) => vec![*v],
            IrTerminator::CondBranch { condition, .. } => vec![*condition],
            IrTerminator::Switch { value, .. } => vec![*value],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(func: &mut IrFunction, name: &str) -> IrInstr {
        IrInstr {
            id: func.fresh_inst_id(),
            result: None,
            op: Op::CallDirect {
                name: name.to_string(),
                args: Vec::new(),
            },
            ty: IrType::Void,
        }
    }

    #[test]
    fn test_split_entry_block_becomes_new_entry() {
        let mut func = IrFunction::kernel("k");
        let entry = func.create_block("entry");
        let a = call(&mut func, "a");
        let b = call(&mut func, "b");
        let b_id = b.id;
        let block = func.get_block_mut(entry).unwrap();
        block.instructions = vec![a, b];
        block.terminator = IrTerminator::Return(None);

        let pre = func.split_block_before(entry, 1).unwrap();

        assert_eq!(func.entry_id(), Some(pre));
        assert_eq!(func.get_block(pre).unwrap().instructions.len(), 1);
        assert_eq!(
            func.get_block(pre).unwrap().terminator,
            IrTerminator::Branch(entry)
        );
        assert_eq!(func.locate(b_id), Some((entry, 0)));
        assert_eq!(func.get_block(pre).unwrap().label, "entry.split");
    }

    #[test]
    fn test_split_labeled_names_the_prefix() {
        let mut func = IrFunction::kernel("k");
        let entry = func.create_block("entry");
        func.get_block_mut(entry).unwrap().terminator = IrTerminator::Return(None);

        let head = func.split_block_labeled(entry, 0, "cg.header").unwrap();

        assert_eq!(func.get_block(head).unwrap().label, "cg.header");
        assert_eq!(func.get_block(entry).unwrap().label, "entry");
        assert_eq!(
            func.split_block_labeled(BlockId(40), 0, "x"),
            Err(IrError::UnknownBlock(BlockId(40)))
        );
    }

    #[test]
    fn test_split_retargets_predecessors() {
        let mut func = IrFunction::kernel("k");
        let entry = func.create_block("entry");
        let body = func.create_block("body");
        let exit = func.create_block("exit");
        let flag = func.fresh_value();
        func.get_block_mut(entry).unwrap().terminator = IrTerminator::Branch(body);
        func.get_block_mut(body).unwrap().terminator = IrTerminator::CondBranch {
            condition: flag,
            then_block: body,
            else_block: exit,
        };
        func.get_block_mut(exit).unwrap().terminator = IrTerminator::Return(None);

        let pre = func.split_block_before(body, 0).unwrap();

        assert_eq!(func.successors(entry), vec![pre]);
        // The self loop now re-enters through the new block
        assert_eq!(func.successors(body), vec![pre, exit]);
        assert_eq!(func.predecessors(body), vec![pre]);
        assert_eq!(func.block_index(pre), Some(1));
    }

    #[test]
    fn test_split_rejects_phi_group_and_out_of_range() {
        let mut func = IrFunction::kernel("k");
        let entry = func.create_block("entry");
        let v = func.fresh_value();
        let phi = IrInstr {
            id: func.fresh_inst_id(),
            result: Some(v),
            op: Op::Phi {
                incoming: Vec::new(),
            },
            ty: IrType::I32,
        };
        func.get_block_mut(entry).unwrap().instructions.push(phi);

        assert_eq!(
            func.split_block_before(entry, 0),
            Err(IrError::SplitBeforePhi {
                block: entry,
                index: 0
            })
        );
        assert!(matches!(
            func.split_block_before(entry, 5),
            Err(IrError::SplitOutOfRange { len: 1, .. })
        ));
        assert!(func.split_block_before(entry, 1).is_ok());
    }

    #[test]
    fn test_add_phi_incoming_requires_phi() {
        let mut func = IrFunction::kernel("k");
        let entry = func.create_block("entry");
        let v = func.fresh_value();
        let id = func.fresh_inst_id();
        func.get_block_mut(entry).unwrap().instructions.push(IrInstr {
            id,
            result: Some(v),
            op: Op::Const(IrConstant::Int(0, IrType::I32)),
            ty: IrType::I32,
        });

        assert_eq!(
            func.add_phi_incoming(v, entry, v),
            Err(IrError::NotAPhi(v))
        );
        assert_eq!(
            func.add_phi_incoming(ValueId(99), entry, v),
            Err(IrError::UnknownValue(ValueId(99)))
        );
    }

    #[test]
    fn test_switch_successors_and_retarget() {
        let mut term = IrTerminator::Switch {
            value: ValueId(0),
            default: BlockId(1),
            cases: vec![(0, BlockId(2)), (1, BlockId(1))],
        };
        assert_eq!(term.successors(), vec![BlockId(1), BlockId(2), BlockId(1)]);
        term.retarget(BlockId(1), BlockId(7));
        assert_eq!(term.successors(), vec![BlockId(7), BlockId(2), BlockId(7)]);
    }
}
