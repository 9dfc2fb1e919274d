//! High-Level IR (HLIR) - SSA-based intermediate representation
//!
//! HLIR is the in-memory program form the task-sync pass analyzes and
//! rewrites. It features:
//! - Static Single Assignment (SSA) form
//! - Basic blocks with explicit control flow
//! - Stable handles for blocks, values and instructions
//! - A single block-splitting primitive for graph edits

pub mod builder;
pub mod display;
pub mod ir;
pub mod verify;

// Re-export main types
pub use builder::FunctionBuilder;
pub use ir::*;
pub use verify::{check_function, verify_function, verify_module, Dominators, VerifyIssue};
