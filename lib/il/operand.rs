//! A REIL `Operand` is an immutable (size, value) pair. The type of an
//! operand is always derived from its value text, so a type can never
//! disagree with the value it describes.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The prefix which marks a register as a REIL-internal temporary.
pub const TEMPORARY_PREFIX: &str = "t";

/// The size of a REIL operand.
///
/// `Address` is the size of a code location and carries no byte width;
/// asking for its width is an error.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Default,
)]
pub enum OperandSize {
    #[default]
    Empty,
    Byte,
    Word,
    Dword,
    Qword,
    Oword,
    Address,
}

impl OperandSize {
    /// The width of this size in bytes.
    pub fn width_in_bytes(&self) -> Result<usize, Error> {
        match self {
            OperandSize::Byte => Ok(1),
            OperandSize::Word => Ok(2),
            OperandSize::Dword => Ok(4),
            OperandSize::Qword => Ok(8),
            OperandSize::Oword => Ok(16),
            OperandSize::Empty | OperandSize::Address => Err(Error::InvalidOperand(format!(
                "operand size {:?} has no byte width",
                self
            ))),
        }
    }

    /// The width of this size in bits.
    pub fn width_in_bits(&self) -> Result<usize, Error> {
        Ok(self.width_in_bytes()? * 8)
    }

    /// The smallest sized `OperandSize` which holds at least twice this
    /// size, used when an arithmetic result needs room for a carry.
    pub fn doubled(&self) -> Result<OperandSize, Error> {
        match self {
            OperandSize::Byte => Ok(OperandSize::Word),
            OperandSize::Word => Ok(OperandSize::Dword),
            OperandSize::Dword => Ok(OperandSize::Qword),
            OperandSize::Qword => Ok(OperandSize::Oword),
            _ => Err(Error::InvalidOperand(format!(
                "operand size {:?} cannot be doubled",
                self
            ))),
        }
    }
}

impl FromStr for OperandSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<OperandSize, Error> {
        match s {
            "" => Ok(OperandSize::Empty),
            "byte" => Ok(OperandSize::Byte),
            "word" => Ok(OperandSize::Word),
            "dword" => Ok(OperandSize::Dword),
            "qword" => Ok(OperandSize::Qword),
            "oword" => Ok(OperandSize::Oword),
            "address" => Ok(OperandSize::Address),
            _ => Err(Error::InvalidOperand(format!("unknown operand size {}", s))),
        }
    }
}

impl fmt::Display for OperandSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            OperandSize::Empty => "",
            OperandSize::Byte => "byte",
            OperandSize::Word => "word",
            OperandSize::Dword => "dword",
            OperandSize::Qword => "qword",
            OperandSize::Oword => "oword",
            OperandSize::Address => "address",
        };
        write!(f, "{}", s)
    }
}

/// The type of a REIL operand, derived from its value text.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum OperandType {
    Empty,
    IntegerLiteral,
    Register,
    SubAddress,
}

impl OperandType {
    /// Derive the type of an operand from its value text.
    pub fn of(value: &str) -> OperandType {
        if value.is_empty() {
            OperandType::Empty
        } else if value.contains('.') {
            OperandType::SubAddress
        } else if is_integer_literal(value) {
            OperandType::IntegerLiteral
        } else {
            OperandType::Register
        }
    }
}

fn is_integer_literal(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// A REIL operand.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Default)]
pub struct Operand {
    size: OperandSize,
    value: String,
}

impl Operand {
    /// Create a new `Operand` with the given size and value. The type is
    /// derived from the value.
    pub fn new<S>(size: OperandSize, value: S) -> Operand
    where
        S: Into<String>,
    {
        Operand {
            size,
            value: value.into(),
        }
    }

    /// The canonical empty operand, used to fill unused operand slots.
    pub fn empty() -> Operand {
        Operand {
            size: OperandSize::Empty,
            value: String::new(),
        }
    }

    /// Create a register operand.
    pub fn register<S>(name: S, size: OperandSize) -> Operand
    where
        S: Into<String>,
    {
        Operand::new(size, name)
    }

    /// Create an integer literal operand.
    pub fn literal(value: u64, size: OperandSize) -> Operand {
        Operand::new(size, value.to_string())
    }

    /// Create a sub-address operand referring to REIL instruction
    /// `offset` within the expansion of the native instruction at `base`.
    pub fn sub_address(base: u64, offset: u64) -> Operand {
        Operand::new(OperandSize::Address, format!("{}.{}", base, offset))
    }

    /// Get the size of this `Operand`.
    pub fn size(&self) -> OperandSize {
        self.size
    }

    /// Get the value of this `Operand`.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the type of this `Operand`, derived from its value.
    pub fn type_(&self) -> OperandType {
        OperandType::of(&self.value)
    }

    /// Returns true if this is the empty operand.
    pub fn is_empty(&self) -> bool {
        self.type_() == OperandType::Empty
    }

    /// Returns true if this operand is a register which exists on the
    /// native architecture.
    pub fn is_native_register(&self) -> bool {
        self.type_() == OperandType::Register && !self.value.starts_with(TEMPORARY_PREFIX)
    }

    /// Returns true if this operand is a REIL-internal temporary register.
    pub fn is_temporary_register(&self) -> bool {
        self.type_() == OperandType::Register && self.value.starts_with(TEMPORARY_PREFIX)
    }

    /// If this operand is an integer literal, get its value.
    pub fn literal_value(&self) -> Option<i64> {
        if self.type_() == OperandType::IntegerLiteral {
            self.value.parse().ok()
        } else {
            None
        }
    }

    /// If this operand is a sub-address, get its (base, offset) parts.
    pub fn sub_address_value(&self) -> Option<(u64, u64)> {
        if self.type_() != OperandType::SubAddress {
            return None;
        }
        let (base, offset) = self.value.split_once('.')?;
        Some((base.parse().ok()?, offset.parse().ok()?))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            write!(f, "_")
        } else {
            write!(f, "{} {}", self.size, self.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_type_is_derived_from_value() {
        assert_eq!(OperandType::of(""), OperandType::Empty);
        assert_eq!(OperandType::of("4096.2"), OperandType::SubAddress);
        assert_eq!(OperandType::of("123"), OperandType::IntegerLiteral);
        assert_eq!(OperandType::of("-123"), OperandType::IntegerLiteral);
        assert_eq!(OperandType::of("eax"), OperandType::Register);
        assert_eq!(OperandType::of("t0"), OperandType::Register);
        // a lone minus sign is not an integer
        assert_eq!(OperandType::of("-"), OperandType::Register);
    }

    #[test]
    fn size_string_mapping_is_bidirectional() {
        for size in [
            OperandSize::Empty,
            OperandSize::Byte,
            OperandSize::Word,
            OperandSize::Dword,
            OperandSize::Qword,
            OperandSize::Oword,
            OperandSize::Address,
        ] {
            assert_eq!(size.to_string().parse::<OperandSize>().unwrap(), size);
        }
        assert!("xyzzy".parse::<OperandSize>().is_err());
    }

    #[test]
    fn address_size_has_no_width() {
        assert!(OperandSize::Address.width_in_bytes().is_err());
        assert!(OperandSize::Empty.width_in_bytes().is_err());
        assert_eq!(OperandSize::Dword.width_in_bytes().unwrap(), 4);
    }

    #[test]
    fn temporary_registers_are_distinguished_from_native() {
        let temp = Operand::register("t17", OperandSize::Dword);
        let native = Operand::register("eax", OperandSize::Dword);
        let literal = Operand::literal(5, OperandSize::Byte);

        assert!(temp.is_temporary_register());
        assert!(!temp.is_native_register());
        assert!(native.is_native_register());
        assert!(!native.is_temporary_register());
        assert!(!literal.is_native_register());
        assert!(!literal.is_temporary_register());
    }

    #[test]
    fn sub_address_round_trip() {
        let operand = Operand::sub_address(0x1000, 3);
        assert_eq!(operand.type_(), OperandType::SubAddress);
        assert_eq!(operand.sub_address_value(), Some((0x1000, 3)));
    }
}
