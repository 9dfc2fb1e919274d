//! HIP cooperative-group task synchronization
//!
//! An IR-to-IR pass that lowers cooperative-group barriers inside GPU kernels
//! into explicit loop-based control flow, for targets that have no native
//! cooperative-group support. The code between two barriers becomes a loop
//! that runs each logical thread of the group through it in turn.
//!
//! # Architecture
//!
//! ```text
//! IrModule → kernels → analyze (paths, sync order) → regions → loops → verify
//! ```
//!
//! # Example
//!
//! ```
//! use hip_task_sync::hlir::{FunctionBuilder, IrFunction, IrModule, IrType};
//! use hip_task_sync::tasksync::TaskSyncPass;
//!
//! let mut kernel = IrFunction::kernel("reduce");
//! let entry = kernel.create_block("entry");
//! let mut b = FunctionBuilder::new(&mut kernel, entry);
//! b.build_call("__hip_cg_thread_rank", vec![], IrType::I32)?;
//! b.build_call("__hip_cg_group_size", vec![], IrType::I32)?;
//! b.build_call_void("__hip_cg_sync", vec![])?;
//! b.build_return(None)?;
//!
//! let mut module = IrModule::new("demo");
//! module.add_function(kernel);
//!
//! let report = TaskSyncPass::new().run(&mut module)?;
//! assert!(report.changed());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod hlir;
pub mod tasksync;

pub use tasksync::{PASS_ID, PassRegistry, TaskSyncConfig, TaskSyncPass};
