//! Textual listing of HLIR
//!
//! Produces an LLVM-flavoured listing used in debug logs and test failure
//! messages. There is no parser for this format.

use super::ir::*;
use std::fmt;

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for CallingConv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallingConv::SpirFunc => write!(f, "spir_func"),
            CallingConv::SpirKernel => write!(f, "spir_kernel"),
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::F16 => write!(f, "half"),
            IrType::F32 => write!(f, "float"),
            IrType::F64 => write!(f, "double"),
            IrType::Ptr(inner) => write!(f, "{}*", inner),
            IrType::Array(elem, n) => write!(f, "[{} x {}]", n, elem),
            IrType::Struct(name) => write!(f, "%{}", name),
        }
    }
}

impl fmt::Display for IrConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrConstant::Bool(b) => write!(f, "{}", b),
            IrConstant::Int(v, _) => write!(f, "{}", v),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SRem => "srem",
            BinaryOp::URem => "urem",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::AShr => "ashr",
            BinaryOp::LShr => "lshr",
            BinaryOp::Eq => "icmp eq",
            BinaryOp::Ne => "icmp ne",
            BinaryOp::SLt => "icmp slt",
            BinaryOp::SLe => "icmp sle",
            BinaryOp::SGt => "icmp sgt",
            BinaryOp::SGe => "icmp sge",
            BinaryOp::ULt => "icmp ult",
            BinaryOp::ULe => "icmp ule",
            BinaryOp::UGt => "icmp ugt",
            BinaryOp::UGe => "icmp uge",
        };
        f.write_str(name)
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &[ValueId]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", v)?;
    }
    Ok(())
}

impl fmt::Display for IrInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result {
            write!(f, "{} = ", result)?;
        }
        match &self.op {
            Op::Const(c) => write!(f, "const {} {}", self.ty, c),
            Op::Binary { op, left, right } => write!(f, "{} {}, {}", op, left, right),
            Op::CallDirect { name, args } => {
                write!(f, "call {} @{}(", self.ty, name)?;
                write_values(f, args)?;
                write!(f, ")")
            }
            Op::Load { ptr } => write!(f, "load {}, {}", self.ty, ptr),
            Op::Store { ptr, value } => write!(f, "store {}, {}", ptr, value),
            Op::GetElementPtr { base, index } => write!(f, "gep {}, {}", base, index),
            Op::Alloca { ty } => write!(f, "alloca {}", ty),
            Op::Cast { value, target } => write!(f, "cast {} to {}", value, target),
            Op::Phi { incoming } => {
                write!(f, "phi {} ", self.ty)?;
                for (i, (block, value)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{}, {}]", value, block)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for IrTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrTerminator::Return(None) => write!(f, "ret void"),
            IrTerminator::Return(Some(v)) => write!(f, "ret {}", v),
            IrTerminator::Branch(target) => write!(f, "br {}", target),
            IrTerminator::CondBranch {
                condition,
                then_block,
                else_block,
            } => write!(f, "br {}, {}, {}", condition, then_block, else_block),
            IrTerminator::Switch {
                value,
                default,
                cases,
            } => {
                write!(f, "switch {}, {} [", value, default)?;
                for (i, (case, target)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", case, target)?;
                }
                write!(f, "]")
            }
            IrTerminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for IrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:  ; {}", self.id, self.label)?;
        for instr in &self.instructions {
            writeln!(f, "  {}", instr)?;
        }
        writeln!(f, "  {}", self.terminator)
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define {} {} @{}(", self.calling_conv, self.return_type, self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", p.ty, p.value)?;
        }
        writeln!(f, ") {{")?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}
