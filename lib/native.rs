//! Abstractions over the native instruction stream this crate consumes.
//!
//! The translation core never decodes machine code itself. The embedding
//! application disassembles with whatever it pleases and hands the core
//! pre-decoded instructions: an address, a mnemonic, textual operands,
//! and the raw bytes, which are carried through untouched for
//! diagnostics. A `NativeFunction` mirrors the native control-flow graph
//! only as far as the translator needs it: basic blocks seed the
//! assembler's block-start hints, while REIL control flow is recomputed
//! at REIL granularity.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single pre-decoded native instruction.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct NativeInstruction {
    address: u64,
    mnemonic: String,
    operands: Vec<String>,
    bytes: Vec<u8>,
}

impl NativeInstruction {
    pub fn new<S, O>(address: u64, mnemonic: S, operands: Vec<O>, bytes: Vec<u8>) -> NativeInstruction
    where
        S: Into<String>,
        O: Into<String>,
    {
        NativeInstruction {
            address,
            mnemonic: mnemonic.into(),
            operands: operands.into_iter().map(|o| o.into()).collect(),
            bytes,
        }
    }

    /// The address of this instruction.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// The mnemonic of this instruction.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// The ordered operand list of this instruction.
    pub fn operands(&self) -> &[String] {
        &self.operands
    }

    /// Get an operand by position.
    pub fn operand(&self, index: usize) -> Result<&str, Error> {
        self.operands
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::Custom(format!(
                    "`{}` is missing operand {}",
                    self,
                    index + 1
                ))
            })
    }

    /// The raw bytes of this instruction, uninterpreted by this crate.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for NativeInstruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08x} {}", self.address, self.mnemonic)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.join(", "))?;
        }
        Ok(())
    }
}

/// A native basic block: a non-empty, ordered run of instructions.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct NativeBlock {
    instructions: Vec<NativeInstruction>,
}

impl NativeBlock {
    /// Create a new `NativeBlock`.
    /// # Errors
    /// Error if `instructions` is empty.
    pub fn new(instructions: Vec<NativeInstruction>) -> Result<NativeBlock, Error> {
        if instructions.is_empty() {
            return Err("a native block must contain at least one instruction".into());
        }
        Ok(NativeBlock { instructions })
    }

    /// The address of this block, which is the address of its first
    /// instruction.
    pub fn address(&self) -> u64 {
        self.instructions[0].address()
    }

    /// The instructions of this block.
    pub fn instructions(&self) -> &[NativeInstruction] {
        &self.instructions
    }
}

impl fmt::Display for NativeBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

/// A native function: an entry address and its basic blocks.
///
/// Edges of the native control-flow graph are not represented; the REIL
/// assembler rebuilds control flow from the translated instructions and
/// uses only the block start addresses as partitioning hints.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct NativeFunction {
    address: u64,
    blocks: Vec<NativeBlock>,
}

impl NativeFunction {
    /// Create a new `NativeFunction`.
    /// # Errors
    /// Error if `blocks` is empty.
    pub fn new(address: u64, blocks: Vec<NativeBlock>) -> Result<NativeFunction, Error> {
        if blocks.is_empty() {
            return Err("a native function must contain at least one block".into());
        }
        Ok(NativeFunction { address, blocks })
    }

    /// The entry address of this function.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// The basic blocks of this function.
    pub fn blocks(&self) -> &[NativeBlock] {
        &self.blocks
    }

    /// Every instruction of this function, in block order.
    pub fn instructions(&self) -> impl Iterator<Item = &NativeInstruction> {
        self.blocks.iter().flat_map(|block| block.instructions())
    }
}
