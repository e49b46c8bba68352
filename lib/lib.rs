//! REIL is a library for translating native instructions into the Reverse
//! Engineering Intermediate Language, and for assembling the translated
//! instructions into control-flow graphs.
//!
//! # Quick start
//!
//! ```
//! use reil::native::{NativeBlock, NativeInstruction};
//! use reil::translator::{Driver, TranslatorRegistry};
//!
//! # fn example() -> Result<(), reil::Error> {
//! let registry = TranslatorRegistry::default();
//! let driver = Driver::from_registry(&registry, "x86")?;
//!
//! let block = NativeBlock::new(vec![
//!     NativeInstruction::new(0x1000, "mov", vec!["eax", "1"], vec![]),
//!     NativeInstruction::new(0x1005, "add", vec!["eax", "ebx"], vec![]),
//! ])?;
//!
//! let graph = driver.translate_block(&block)?;
//! for block in graph.blocks() {
//!     println!("{}", block);
//! }
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod architecture;
pub mod graph;
pub mod il;
pub mod native;
pub mod translator;

use crate::native::NativeInstruction;

/// The error type for all fallible operations in this crate.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// A mnemonic outside the fixed REIL opcode set was given.
    #[error("unknown mnemonic: {0}")]
    UnknownMnemonic(String),

    /// An operand was missing, or incompatible with its opcode slot.
    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    /// An architecture translator could not produce REIL for a native
    /// instruction. Carries the offending native instruction.
    #[error("failed to translate `{instruction}`: {reason}")]
    Translation {
        instruction: Box<NativeInstruction>,
        reason: String,
    },

    /// No translator is registered for the requested architecture.
    #[error("no translator registered for architecture {0}")]
    UnsupportedArchitecture(String),

    /// A vertex was not found in a graph.
    #[error("vertex 0x{0:x} does not exist in graph")]
    GraphVertexNotFound(u64),

    /// An edge was not found in a graph.
    #[error("edge 0x{0:x} -> 0x{1:x} does not exist in graph")]
    GraphEdgeNotFound(u64, u64),

    /// A resolvable branch target did not correspond to any block start.
    #[error("branch target 0x{0:x} is not the start of any block")]
    InvalidBranchTarget(u64),

    #[error("{0}")]
    Custom(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}

impl Error {
    /// If this is a translation failure, get the native instruction which
    /// failed to translate.
    pub fn failing_instruction(&self) -> Option<&NativeInstruction> {
        match self {
            Error::Translation { instruction, .. } => Some(instruction),
            _ => None,
        }
    }
}
