//! HLIR Builder - convenient API for constructing HLIR
//!
//! The builder appends instructions to one block of an existing function,
//! managing SSA value and instruction numbering automatically. It is used both
//! to construct kernels and by the task-sync transformer to emit loop code.

use super::ir::*;

/// Instruction builder positioned at the end of a block
pub struct FunctionBuilder<'f> {
    func: &'f mut IrFunction,
    current_block: BlockId,
}

impl<'f> FunctionBuilder<'f> {
    pub fn new(func: &'f mut IrFunction, block: BlockId) -> Self {
        Self {
            func,
            current_block: block,
        }
    }

    /// Create a new basic block at the end of the function
    pub fn create_block(&mut self, label: impl Into<String>) -> BlockId {
        self.func.create_block(label)
    }

    /// Switch to building a different block
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    /// Get the current block ID
    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    /// Add a function parameter
    pub fn add_param(&mut self, name: impl Into<String>, ty: IrType) -> ValueId {
        self.func.add_param(name, ty)
    }

    fn current_block_mut(&mut self) -> IrResult<&mut IrBlock> {
        let id = self.current_block;
        self.func.get_block_mut(id).ok_or(IrError::UnknownBlock(id))
    }

    fn push(&mut self, result: Option<ValueId>, op: Op, ty: IrType) -> IrResult<InstId> {
        // Check the block before minting ids so a failed emit leaves no trace
        self.current_block_mut()?;
        let id = self.func.fresh_inst_id();
        let instr = IrInstr { id, result, op, ty };
        self.current_block_mut()?.instructions.push(instr);
        Ok(id)
    }

    fn emit(&mut self, op: Op, ty: IrType) -> IrResult<ValueId> {
        self.current_block_mut()?;
        let result = self.func.fresh_value();
        self.push(Some(result), op, ty)?;
        Ok(result)
    }

    fn emit_void(&mut self, op: Op) -> IrResult<InstId> {
        self.push(None, op, IrType::Void)
    }

    // ==================== Instruction Builders ====================

    /// Build a constant instruction
    pub fn build_const(&mut self, constant: IrConstant, ty: IrType) -> IrResult<ValueId> {
        self.emit(Op::Const(constant), ty)
    }

    /// Build an integer constant of the given type
    pub fn build_int(&mut self, value: i64, ty: IrType) -> IrResult<ValueId> {
        self.build_const(IrConstant::Int(value, ty.clone()), ty)
    }

    /// Build a 32-bit integer constant
    pub fn build_i32(&mut self, value: i64) -> IrResult<ValueId> {
        self.build_int(value, IrType::I32)
    }

    /// Build a boolean constant
    pub fn build_bool(&mut self, value: bool) -> IrResult<ValueId> {
        self.build_const(IrConstant::Bool(value), IrType::Bool)
    }

    /// Build a binary operation
    pub fn build_binary(
        &mut self,
        op: BinaryOp,
        left: ValueId,
        right: ValueId,
        ty: IrType,
    ) -> IrResult<ValueId> {
        let ty = if op.is_comparison() { IrType::Bool } else { ty };
        self.emit(Op::Binary { op, left, right }, ty)
    }

    /// Build an integer add
    pub fn build_add(&mut self, left: ValueId, right: ValueId, ty: IrType) -> IrResult<ValueId> {
        self.build_binary(BinaryOp::Add, left, right, ty)
    }

    /// Build a bitwise and
    pub fn build_and(&mut self, left: ValueId, right: ValueId, ty: IrType) -> IrResult<ValueId> {
        self.build_binary(BinaryOp::And, left, right, ty)
    }

    /// Build an equality comparison
    pub fn build_eq(&mut self, left: ValueId, right: ValueId) -> IrResult<ValueId> {
        self.build_binary(BinaryOp::Eq, left, right, IrType::Bool)
    }

    /// Build a signed less-than comparison
    pub fn build_slt(&mut self, left: ValueId, right: ValueId) -> IrResult<ValueId> {
        self.build_binary(BinaryOp::SLt, left, right, IrType::Bool)
    }

    /// Build an unsigned greater-or-equal comparison
    pub fn build_uge(&mut self, left: ValueId, right: ValueId) -> IrResult<ValueId> {
        self.build_binary(BinaryOp::UGe, left, right, IrType::Bool)
    }

    /// Build a direct function call that produces a value
    pub fn build_call(
        &mut self,
        name: impl Into<String>,
        args: Vec<ValueId>,
        ret_ty: IrType,
    ) -> IrResult<ValueId> {
        self.emit(
            Op::CallDirect {
                name: name.into(),
                args,
            },
            ret_ty,
        )
    }

    /// Build a direct call to a void function
    pub fn build_call_void(
        &mut self,
        name: impl Into<String>,
        args: Vec<ValueId>,
    ) -> IrResult<InstId> {
        self.emit_void(Op::CallDirect {
            name: name.into(),
            args,
        })
    }

    /// Build a load from memory
    pub fn build_load(&mut self, ptr: ValueId, ty: IrType) -> IrResult<ValueId> {
        self.emit(Op::Load { ptr }, ty)
    }

    /// Build a store to memory
    pub fn build_store(&mut self, ptr: ValueId, value: ValueId) -> IrResult<InstId> {
        self.emit_void(Op::Store { ptr, value })
    }

    /// Build a stack allocation
    pub fn build_alloca(&mut self, ty: IrType) -> IrResult<ValueId> {
        let ptr_ty = IrType::Ptr(Box::new(ty.clone()));
        self.emit(Op::Alloca { ty }, ptr_ty)
    }

    /// Build an element pointer
    pub fn build_elem_ptr(
        &mut self,
        base: ValueId,
        index: ValueId,
        elem_ty: IrType,
    ) -> IrResult<ValueId> {
        let ptr_ty = IrType::Ptr(Box::new(elem_ty));
        self.emit(Op::GetElementPtr { base, index }, ptr_ty)
    }

    /// Build a type cast
    pub fn build_cast(&mut self, value: ValueId, target: IrType) -> IrResult<ValueId> {
        self.emit(
            Op::Cast {
                value,
                target: target.clone(),
            },
            target,
        )
    }

    /// Build a phi node
    pub fn build_phi(&mut self, incoming: Vec<(BlockId, ValueId)>, ty: IrType) -> IrResult<ValueId> {
        self.emit(Op::Phi { incoming }, ty)
    }

    // ==================== Terminator Builders ====================

    fn set_terminator(&mut self, term: IrTerminator) -> IrResult<()> {
        self.current_block_mut()?.terminator = term;
        Ok(())
    }

    /// Build a return
    pub fn build_return(&mut self, value: Option<ValueId>) -> IrResult<()> {
        self.set_terminator(IrTerminator::Return(value))
    }

    /// Build an unconditional branch
    pub fn build_branch(&mut self, target: BlockId) -> IrResult<()> {
        self.set_terminator(IrTerminator::Branch(target))
    }

    /// Build a conditional branch
    pub fn build_cond_branch(
        &mut self,
        condition: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    ) -> IrResult<()> {
        self.set_terminator(IrTerminator::CondBranch {
            condition,
            then_block,
            else_block,
        })
    }

    /// Build a switch
    pub fn build_switch(
        &mut self,
        value: ValueId,
        default: BlockId,
        cases: Vec<(i64, BlockId)>,
    ) -> IrResult<()> {
        self.set_terminator(IrTerminator::Switch {
            value,
            default,
            cases,
        })
    }
}
