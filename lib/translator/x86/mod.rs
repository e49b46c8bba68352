//! Translator for 32-bit x86.
//!
//! Instructions arrive pre-decoded as mnemonic and operand text; this
//! module parses the operand forms it supports (registers, immediates,
//! and `[base +/- displacement]` memory references) and expands each
//! instruction into explicit REIL semantics, flag computation included.

use crate::native::NativeInstruction;
use crate::translator::{TranslationEnvironment, Translator};
use crate::Error;

pub mod registers;
mod semantics;

#[cfg(test)]
mod test;

/// The 32-bit x86 translator.
#[derive(Clone, Debug, Default)]
pub struct X86Translator;

impl X86Translator {
    pub fn new() -> X86Translator {
        X86Translator
    }
}

impl Translator for X86Translator {
    fn translate_instruction(
        &self,
        environment: &TranslationEnvironment,
        instruction: &NativeInstruction,
    ) -> Result<Vec<crate::il::Instruction>, Error> {
        semantics::translate(environment, instruction)
    }
}
