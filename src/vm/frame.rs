//! Frame management for the rendering VM
//!
//! A frame is one block being executed: the template it belongs to, its
//! compiled instructions, and a program counter into them.

use super::opcode::{OpId, OpSeq};
use crate::blocks::TopLevelBlock;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Frame {
    /// Template whose nested blocks `Evaluate` refers to
    pub unit: Arc<TopLevelBlock>,
    pub ops: Arc<OpSeq>,
    /// Next instruction; `None` once the block has run to completion
    pub pc: Option<OpId>,
    /// Whether the scope pushed for this frame is dropped when it returns
    pub pops_scope: bool,
}

impl Frame {
    pub fn new(unit: Arc<TopLevelBlock>, ops: Arc<OpSeq>, pops_scope: bool) -> Self {
        let pc = ops.head();
        Self {
            unit,
            ops,
            pc,
            pops_scope,
        }
    }

    /// A frame positioned at `start` instead of the first instruction
    pub fn at(unit: Arc<TopLevelBlock>, ops: Arc<OpSeq>, start: OpId) -> Self {
        Self {
            unit,
            ops,
            pc: Some(start),
            pops_scope: false,
        }
    }

    /// Fetch the current instruction and advance past it
    #[inline]
    pub fn fetch(&mut self) -> Option<(OpId, Arc<OpSeq>)> {
        let pc = self.pc?;
        self.pc = self.ops.next(pc);
        Some((pc, self.ops.clone()))
    }

    #[inline]
    pub fn jump_to(&mut self, target: OpId) {
        self.pc = Some(target);
    }
}
