//! Opcode execution modules
//!
//! Each module holds the `execute_*` functions for one category of
//! instructions. They take the VM explicitly and reach into its registers
//! directly.

mod components;
mod control_flow;
mod dom;
mod lists;
mod scope;

pub use components::*;
pub use control_flow::*;
pub use dom::*;
pub use lists::*;
pub use scope::*;
