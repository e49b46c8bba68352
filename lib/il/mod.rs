//! The Reverse Engineering Intermediate Language.
//!
//! # An Introduction
//!
//! REIL is a small, side-effect-explicit, three-operand intermediate
//! language used as a uniform target for multiple native architectures.
//!
//! * **Small** - REIL has 17 instruction opcodes (plus two internal
//!   liveness markers), minimizing the work required to implement
//!   analyses.
//! * **Side-effect-explicit** - Every effect of a native instruction,
//!   including flag computation and memory access width, is spelled out
//!   as explicit REIL instructions. Nothing is implicit in an opcode.
//! * **Three-operand** - Each instruction has exactly three operand
//!   slots. The opcode's arity class determines which slots are used;
//!   unused slots hold the empty operand.
//!
//! ## Components of the IL
//!
//! ### `Operand`
//!
//! An immutable (size, value) pair. The operand's type (integer literal,
//! register, sub-address, or empty) is always derived from the value
//! text, never stated independently, so a type can never disagree with
//! its value. Registers prefixed with `t` are REIL-internal temporaries
//! with no native counterpart.
//!
//! ### `Instruction`
//!
//! An address, an `Opcode`, three `Operand`s, and a string-keyed
//! metadata map. Built through per-opcode factories which pin the
//! correct arity. The address is the only mutable field, and only
//! through the explicit `set_address` re-basing step.
//!
//! ### Addresses
//!
//! One native instruction expands to many REIL instructions. The
//! `address` module maps the native instruction at address `a` to the
//! REIL address range starting at `a * 0x100`; the i-th emitted REIL
//! instruction lives at `a * 0x100 + i`.
//!
//! ### `Block`, `Edge`, and `ReilGraph`
//!
//! A `Block` is a non-empty run of instructions, addressed by its first
//! instruction. An `Edge` is a typed connection between two blocks; the
//! `EdgeType` distinguishes taken from not-taken conditional control
//! flow. A `ReilGraph` holds blocks and edges, with `link` as the single
//! operation that connects two blocks and updates both endpoints'
//! adjacency together.

pub mod address;
mod block;
mod edge;
mod graph;
mod instruction;
mod opcode;
mod operand;

pub use self::block::*;
pub use self::edge::*;
pub use self::graph::*;
pub use self::instruction::*;
pub use self::opcode::*;
pub use self::operand::*;

/// A convenience function to create a new register operand.
///
/// This is the preferred way to create a register `Operand`.
pub fn register<S>(name: S, size: OperandSize) -> Operand
where
    S: Into<String>,
{
    Operand::register(name, size)
}

/// A convenience function to create a new integer literal operand.
///
/// This is the preferred way to create a literal `Operand`.
pub fn literal(value: u64, size: OperandSize) -> Operand {
    Operand::literal(value, size)
}

/// A convenience function to create a temporary register operand.
pub fn temporary(index: usize, size: OperandSize) -> Operand {
    Operand::register(format!("{}{}", TEMPORARY_PREFIX, index), size)
}
