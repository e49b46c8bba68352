//! A REIL `Instruction` is an address, an opcode, three operands, and a
//! string-keyed metadata map.
//!
//! Instructions are built through the per-opcode factory functions
//! (`Instruction::add`, `Instruction::jcc`, ...), which pin the correct
//! operand arity by filling unused slots with the empty operand. The
//! validating constructors reject operands which are incompatible with
//! their slot, so a well-formed `Instruction` can always be executed or
//! analyzed without re-checking its shape.

use crate::il::*;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key marking an instruction as a function call.
pub const ISCALL: &str = "isCall";
/// Metadata key marking an instruction as sitting in a branch delay slot.
pub const BRANCH_DELAY: &str = "branch_delay";
/// Metadata key marking the taken-branch copy of a delay slot instruction.
pub const BRANCH_DELAY_TRUE: &str = "branch_delay_true";

/// A REIL instruction.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Instruction {
    address: u64,
    opcode: Opcode,
    operands: [Operand; 3],
    metadata: BTreeMap<String, String>,
}

impl Instruction {
    /// Create a new `Instruction`, validating the operands against the
    /// opcode's arity class.
    /// # Errors
    /// `Error::InvalidOperand` if a used slot holds the empty operand, an
    /// unused slot holds a non-empty operand, or an arithmetic operand has
    /// no byte width.
    pub fn new(
        address: u64,
        opcode: Opcode,
        first: Operand,
        second: Operand,
        third: Operand,
    ) -> Result<Instruction, Error> {
        let operands = [first, second, third];

        for (i, operand) in operands.iter().enumerate() {
            let used = match i {
                0 => opcode.uses_first_operand(),
                1 => opcode.uses_second_operand(),
                _ => opcode.uses_third_operand(),
            };
            if !used && !operand.is_empty() {
                return Err(Error::InvalidOperand(format!(
                    "{} does not use operand {}, but got `{}`",
                    opcode,
                    i + 1,
                    operand
                )));
            }
            // jcc's condition slot is empty for unconditional jumps
            if used && operand.is_empty() && !(opcode == Opcode::Jcc && i == 0) {
                return Err(Error::InvalidOperand(format!(
                    "{} requires operand {}",
                    opcode,
                    i + 1
                )));
            }
        }

        if opcode.arity() == OperandArity::Trinary {
            for operand in &operands {
                if operand.size().width_in_bytes().is_err() {
                    return Err(Error::InvalidOperand(format!(
                        "{} requires sized operands, but got `{}`",
                        opcode, operand
                    )));
                }
            }
        }

        Ok(Instruction {
            address,
            opcode,
            operands,
            metadata: BTreeMap::new(),
        })
    }

    /// Create a new `Instruction` from a mnemonic string.
    /// # Errors
    /// `Error::UnknownMnemonic` if the mnemonic is outside the REIL opcode
    /// set, or any error `Instruction::new` returns.
    pub fn from_mnemonic(
        address: u64,
        mnemonic: &str,
        first: Operand,
        second: Operand,
        third: Operand,
    ) -> Result<Instruction, Error> {
        Instruction::new(
            address,
            Opcode::from_mnemonic(mnemonic)?,
            first,
            second,
            third,
        )
    }

    pub fn add(
        address: u64,
        augend: Operand,
        addend: Operand,
        sum: Operand,
    ) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Add, augend, addend, sum)
    }

    pub fn and(
        address: u64,
        lhs: Operand,
        rhs: Operand,
        result: Operand,
    ) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::And, lhs, rhs, result)
    }

    /// `bisz` writes 1 to `result` if `value` is zero, else 0.
    pub fn bisz(address: u64, value: Operand, result: Operand) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Bisz, value, Operand::empty(), result)
    }

    /// `bsh` shifts `value` left by `amount` bits; a negative `amount`
    /// shifts right.
    pub fn bsh(
        address: u64,
        value: Operand,
        amount: Operand,
        result: Operand,
    ) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Bsh, value, amount, result)
    }

    pub fn div(
        address: u64,
        dividend: Operand,
        divisor: Operand,
        quotient: Operand,
    ) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Div, dividend, divisor, quotient)
    }

    /// `jcc` jumps to `target` if `condition` is non-zero. An empty
    /// `condition` makes the jump unconditional.
    pub fn jcc(address: u64, condition: Operand, target: Operand) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Jcc, condition, Operand::empty(), target)
    }

    /// `ldm` loads from memory at `source`; the width of the load is the
    /// size of `destination`.
    pub fn ldm(address: u64, source: Operand, destination: Operand) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Ldm, source, Operand::empty(), destination)
    }

    pub fn modulo(
        address: u64,
        dividend: Operand,
        divisor: Operand,
        remainder: Operand,
    ) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Mod, dividend, divisor, remainder)
    }

    pub fn mul(
        address: u64,
        multiplicand: Operand,
        multiplier: Operand,
        product: Operand,
    ) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Mul, multiplicand, multiplier, product)
    }

    pub fn nop(address: u64) -> Instruction {
        Instruction {
            address,
            opcode: Opcode::Nop,
            operands: [Operand::empty(), Operand::empty(), Operand::empty()],
            metadata: BTreeMap::new(),
        }
    }

    pub fn or(
        address: u64,
        lhs: Operand,
        rhs: Operand,
        result: Operand,
    ) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Or, lhs, rhs, result)
    }

    /// `stm` stores `value` to memory at `destination`; the width of the
    /// store is the size of `value`. The third operand is a source here,
    /// not a destination.
    pub fn stm(address: u64, value: Operand, destination: Operand) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Stm, value, Operand::empty(), destination)
    }

    /// `str` copies `source` into `destination`, truncating or
    /// zero-extending to the destination size.
    pub fn str(address: u64, source: Operand, destination: Operand) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Str, source, Operand::empty(), destination)
    }

    pub fn sub(
        address: u64,
        minuend: Operand,
        subtrahend: Operand,
        difference: Operand,
    ) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Sub, minuend, subtrahend, difference)
    }

    pub fn undef(address: u64) -> Instruction {
        Instruction {
            address,
            opcode: Opcode::Undef,
            operands: [Operand::empty(), Operand::empty(), Operand::empty()],
            metadata: BTreeMap::new(),
        }
    }

    pub fn unknown(address: u64) -> Instruction {
        Instruction {
            address,
            opcode: Opcode::Unknown,
            operands: [Operand::empty(), Operand::empty(), Operand::empty()],
            metadata: BTreeMap::new(),
        }
    }

    pub fn xor(
        address: u64,
        lhs: Operand,
        rhs: Operand,
        result: Operand,
    ) -> Result<Instruction, Error> {
        Instruction::new(address, Opcode::Xor, lhs, rhs, result)
    }

    /// Internal liveness marker: `value` is consumed here.
    pub fn consume(address: u64, value: Operand) -> Result<Instruction, Error> {
        Instruction::new(
            address,
            Opcode::Consume,
            value,
            Operand::empty(),
            Operand::empty(),
        )
    }

    /// Internal liveness marker: `register` is defined here.
    pub fn define(address: u64, register: Operand) -> Result<Instruction, Error> {
        Instruction::new(
            address,
            Opcode::Define,
            Operand::empty(),
            Operand::empty(),
            register,
        )
    }

    /// Get the REIL address of this `Instruction`.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Re-base this `Instruction` to a new REIL address.
    ///
    /// This is the second phase of the two-phase construction some
    /// translators need when a multi-step expansion is only positioned
    /// after it has been emitted. Everything but the address is immutable.
    pub fn set_address(&mut self, address: u64) {
        self.address = address;
    }

    /// Get the `Opcode` of this `Instruction`.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn first_operand(&self) -> &Operand {
        &self.operands[0]
    }

    pub fn second_operand(&self) -> &Operand {
        &self.operands[1]
    }

    pub fn third_operand(&self) -> &Operand {
        &self.operands[2]
    }

    /// Get the metadata map for this `Instruction`.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Get the metadata value for the given key.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Attach a metadata key/value pair to this `Instruction`.
    pub fn set_metadata<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata.insert(key.into(), value.into());
    }

    /// Mark this instruction as a function call.
    pub fn set_call_flag(&mut self) {
        self.set_metadata(ISCALL, "true");
    }

    /// Returns true if this instruction is marked as a function call.
    pub fn is_function_call(&self) -> bool {
        self.metadata_value(ISCALL) == Some("true")
    }

    /// Returns true if this is a `jcc` guarded by a register condition.
    ///
    /// An empty or literal condition operand marks an unconditional jump.
    pub fn is_conditional_jump(&self) -> bool {
        self.opcode == Opcode::Jcc && self.operands[0].type_() == OperandType::Register
    }

    /// Returns true if this is a `jcc` which is always taken.
    pub fn is_unconditional_jump(&self) -> bool {
        self.opcode == Opcode::Jcc && !self.is_conditional_jump()
    }

    /// Returns true if this instruction is any jump.
    pub fn is_jump(&self) -> bool {
        self.opcode == Opcode::Jcc
    }

    pub fn uses_first_operand(&self) -> bool {
        self.opcode.uses_first_operand()
    }

    pub fn uses_second_operand(&self) -> bool {
        self.opcode.uses_second_operand()
    }

    pub fn uses_third_operand(&self) -> bool {
        self.opcode.uses_third_operand()
    }

    /// Returns true if this instruction writes the given register.
    ///
    /// The third operand is a destination for every opcode that uses it
    /// except `stm` and `jcc`, whose third operand is a source.
    pub fn sets_value(&self, register: &str) -> bool {
        if !self.uses_third_operand() {
            return false;
        }
        if self.opcode == Opcode::Stm || self.opcode == Opcode::Jcc {
            return false;
        }
        let third = &self.operands[2];
        third.type_() == OperandType::Register && third.value() == register
    }

    /// Returns true if this instruction reads the given register.
    ///
    /// Reads are the first and second operands, plus the third operand of
    /// `stm` and `jcc` only.
    pub fn uses_value(&self, register: &str) -> bool {
        let reads_register = |operand: &Operand| {
            operand.type_() == OperandType::Register && operand.value() == register
        };

        if self.uses_first_operand() && reads_register(&self.operands[0]) {
            return true;
        }
        if self.uses_second_operand() && reads_register(&self.operands[1]) {
            return true;
        }
        (self.opcode == Opcode::Stm || self.opcode == Opcode::Jcc)
            && reads_register(&self.operands[2])
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:x}.{:02x}: {} [{}, {}, {}]",
            address::to_native_address(self.address),
            self.address % address::INSTRUCTION_MULTIPLIER,
            self.opcode,
            self.operands[0],
            self.operands[1],
            self.operands[2]
        )?;
        if self.is_function_call() {
            write!(f, " ; call")?;
        }
        Ok(())
    }
}
