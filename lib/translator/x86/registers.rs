//! The 32-bit x86 register catalog.

use crate::il::OperandSize;
use std::collections::BTreeMap;

/// The stack pointer register.
pub const STACK_POINTER: &str = "esp";

/// Status flags, held in single-byte REIL registers.
pub const ZF: &str = "ZF";
pub const SF: &str = "SF";
pub const CF: &str = "CF";
pub const OF: &str = "OF";

const GENERAL_PURPOSE: &[&str] = &[
    "eax", "ebx", "ecx", "edx", "esi", "edi", "ebp", "esp", "eip",
];

const FLAGS: &[&str] = &[ZF, SF, CF, OF];

/// The register catalog handed to the translation environment. Flags are
/// modeled as byte-sized registers holding 0 or 1.
pub fn catalog() -> BTreeMap<String, OperandSize> {
    let mut registers = BTreeMap::new();
    for register in GENERAL_PURPOSE {
        registers.insert(register.to_string(), OperandSize::Dword);
    }
    for flag in FLAGS {
        registers.insert(flag.to_string(), OperandSize::Byte);
    }
    registers
}
