//! The fixed, closed REIL opcode set.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A REIL opcode.
///
/// The set is closed. Seventeen opcodes carry instruction semantics;
/// `Consume` and `Define` are internal opcodes used by some architecture
/// translators for liveness bookkeeping and never express program
/// behavior themselves.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Opcode {
    Add,
    And,
    Bisz,
    Bsh,
    Div,
    Jcc,
    Ldm,
    Mod,
    Mul,
    Nop,
    Or,
    Stm,
    Str,
    Sub,
    Undef,
    Unknown,
    Xor,
    Consume,
    Define,
}

/// Which operand slots an opcode uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperandArity {
    /// Uses no operands.
    Nullary,
    /// Uses only the first operand.
    FirstOnly,
    /// Uses only the third operand.
    ThirdOnly,
    /// Uses the first and third operands.
    FirstAndThird,
    /// Uses all three operands.
    Trinary,
}

pub(crate) const OPCODES: &[Opcode] = &[
    Opcode::Add,
    Opcode::And,
    Opcode::Bisz,
    Opcode::Bsh,
    Opcode::Div,
    Opcode::Jcc,
    Opcode::Ldm,
    Opcode::Mod,
    Opcode::Mul,
    Opcode::Nop,
    Opcode::Or,
    Opcode::Stm,
    Opcode::Str,
    Opcode::Sub,
    Opcode::Undef,
    Opcode::Unknown,
    Opcode::Xor,
    Opcode::Consume,
    Opcode::Define,
];

impl Opcode {
    /// The canonical mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::And => "and",
            Opcode::Bisz => "bisz",
            Opcode::Bsh => "bsh",
            Opcode::Div => "div",
            Opcode::Jcc => "jcc",
            Opcode::Ldm => "ldm",
            Opcode::Mod => "mod",
            Opcode::Mul => "mul",
            Opcode::Nop => "nop",
            Opcode::Or => "or",
            Opcode::Stm => "stm",
            Opcode::Str => "str",
            Opcode::Sub => "sub",
            Opcode::Undef => "undef",
            Opcode::Unknown => "unknown",
            Opcode::Xor => "xor",
            Opcode::Consume => "consume",
            Opcode::Define => "define",
        }
    }

    /// Look an opcode up by mnemonic.
    /// # Errors
    /// `Error::UnknownMnemonic` for any string outside the opcode set.
    pub fn from_mnemonic(mnemonic: &str) -> Result<Opcode, Error> {
        OPCODES
            .iter()
            .find(|opcode| opcode.mnemonic() == mnemonic)
            .copied()
            .ok_or_else(|| Error::UnknownMnemonic(mnemonic.to_string()))
    }

    /// The operand slots this opcode uses.
    pub fn arity(&self) -> OperandArity {
        match self {
            Opcode::Add
            | Opcode::And
            | Opcode::Bsh
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Mul
            | Opcode::Or
            | Opcode::Sub
            | Opcode::Xor => OperandArity::Trinary,
            Opcode::Bisz | Opcode::Jcc | Opcode::Ldm | Opcode::Stm | Opcode::Str => {
                OperandArity::FirstAndThird
            }
            Opcode::Nop | Opcode::Undef | Opcode::Unknown => OperandArity::Nullary,
            Opcode::Consume => OperandArity::FirstOnly,
            Opcode::Define => OperandArity::ThirdOnly,
        }
    }

    /// Returns true if instructions with this opcode use their first
    /// operand.
    pub fn uses_first_operand(&self) -> bool {
        matches!(
            self.arity(),
            OperandArity::FirstOnly | OperandArity::FirstAndThird | OperandArity::Trinary
        )
    }

    /// Returns true if instructions with this opcode use their second
    /// operand.
    pub fn uses_second_operand(&self) -> bool {
        matches!(self.arity(), OperandArity::Trinary)
    }

    /// Returns true if instructions with this opcode use their third
    /// operand.
    pub fn uses_third_operand(&self) -> bool {
        matches!(
            self.arity(),
            OperandArity::ThirdOnly | OperandArity::FirstAndThird | OperandArity::Trinary
        )
    }
}

impl FromStr for Opcode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Opcode, Error> {
        Opcode::from_mnemonic(s)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}
