//! Capabilities for supported architectures.

use crate::il;
use crate::translator::{TranslationEnvironment, Translator};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// An architecture's endianness.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Endian {
    Big,
    Little,
}

/// An architecture the translation core knows how to lift.
///
/// Implementations bundle the static facts about an architecture with a
/// factory for its translator. Everything downstream of the
/// `TranslatorRegistry` works in terms of this trait, so adding an
/// architecture never touches the driver or the assembler.
pub trait Architecture: Debug + Send + Sync {
    /// The name of this architecture, as used for registry lookup.
    fn name(&self) -> &'static str;
    /// The endianness of this architecture.
    fn endian(&self) -> Endian;
    /// The size of a native address on this architecture.
    fn address_size(&self) -> il::OperandSize;
    /// Create a translator for this architecture.
    fn translator(&self) -> Box<dyn Translator>;
    /// The environment translators for this architecture run under.
    fn environment(&self) -> TranslationEnvironment;
}

/// The 32-bit x86 architecture.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct X86 {}

impl X86 {
    pub fn new() -> X86 {
        X86 {}
    }
}

impl Default for X86 {
    fn default() -> X86 {
        X86::new()
    }
}

impl Architecture for X86 {
    fn name(&self) -> &'static str {
        "x86"
    }

    fn endian(&self) -> Endian {
        Endian::Little
    }

    fn address_size(&self) -> il::OperandSize {
        il::OperandSize::Dword
    }

    fn translator(&self) -> Box<dyn Translator> {
        Box::new(crate::translator::x86::X86Translator::new())
    }

    fn environment(&self) -> TranslationEnvironment {
        TranslationEnvironment::new(
            self.name(),
            self.endian(),
            self.address_size(),
            crate::translator::x86::registers::catalog(),
        )
    }
}
