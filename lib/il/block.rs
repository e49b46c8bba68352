//! A `Block` is a non-empty, address-ordered run of REIL instructions.
//!
//! Unlike native basic blocks, a REIL block is constructed whole, once the
//! instructions of a linear run are known. Its address is the address of
//! its first instruction, and it serves as the block's vertex index inside
//! a `ReilGraph`.

use crate::graph;
use crate::il::*;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A REIL basic block.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Block {
    instructions: Vec<Instruction>,
}

impl Block {
    /// Create a new `Block` from a run of instructions.
    /// # Errors
    /// Error if `instructions` is empty; a block must have an address.
    pub fn new(instructions: Vec<Instruction>) -> Result<Block, Error> {
        if instructions.is_empty() {
            return Err("a REIL block must contain at least one instruction".into());
        }
        Ok(Block { instructions })
    }

    /// The address of this block, which is the address of its first
    /// instruction.
    pub fn address(&self) -> u64 {
        self.instructions[0].address()
    }

    /// Get this block's instructions.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Get a mutable reference to this block's instructions.
    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Get the instruction with the given REIL address.
    pub fn instruction(&self, address: u64) -> Option<&Instruction> {
        self.instructions
            .iter()
            .find(|instruction| instruction.address() == address)
    }

    /// Get the last instruction of this block.
    pub fn last_instruction(&self) -> &Instruction {
        // non-empty by construction
        self.instructions.last().unwrap()
    }

    /// Returns true if this block ends in a jump.
    pub fn ends_in_jump(&self) -> bool {
        self.last_instruction().is_jump()
    }
}

impl graph::Vertex for Block {
    fn index(&self) -> u64 {
        self.address()
    }
    fn dot_label(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[ Block: 0x{:x} ]", self.address())?;
        for instruction in self.instructions() {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}
