//! The incremental evaluation core for a canvas of script-bearing nodes.
//!
//! Nodes carry a snippet of code. Edges wire one node's outputs into another
//! node's inputs. The [`Controller`] keeps a per-node [`Record`] of the latest
//! outputs, logs and errors, and re-evaluates exactly the nodes affected by
//! each edit along with everything downstream of them.

pub use config::Config;
pub use controller::{Completion, Controller, SyncReport};
pub use controls::{ControlsCache, MemoryCache, NoCache};
pub use delta::Delta;
pub use exec::{ExecError, ExecutionResult, Executor};
pub use graph::{Edge, Index, Topology};
pub use node::{Control, ControlKind, ErrorInfo, Record};
pub use store::{Store, View, Watch};

pub mod config;
pub mod controller;
pub mod controls;
pub mod delta;
mod eval;
pub mod exec;
pub mod graph;
pub mod node;
pub mod store;

/// The message used when an executor reports failure without describing it.
pub const UNKNOWN_ERROR: &str = "Unknown execution error";
