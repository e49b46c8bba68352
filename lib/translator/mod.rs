//! Translators for various native architectures to REIL.
//!
//! A translator lifts one native instruction at a time. Translation of a
//! single instruction is a pure function of the instruction, the
//! translation environment, and the registered extensions; no state is
//! shared between instructions, which is what makes per-instruction
//! testing and retry possible, and what makes whole-module translation
//! safely parallelizable across independent functions.
//!
//! The `Driver` funnels all three entry shapes (instruction, block,
//! function) through the same per-instruction path, then hands the flat
//! instruction stream to the `assembler`, which partitions it back into
//! basic blocks and rebuilds typed control-flow edges at REIL
//! granularity.
//!
//! A translation failure anywhere aborts the whole requested unit. The
//! error carries the offending native instruction, so callers can point
//! at exactly the native line that failed without re-deriving it.

use crate::architecture::{Architecture, Endian};
use crate::il;
use crate::native::{NativeBlock, NativeFunction, NativeInstruction};
use crate::Error;
use log::debug;
use std::collections::BTreeMap;

pub mod assembler;
pub mod x86;

/// Architecture-wide constants supplied to a translator.
///
/// The environment is immutable for the duration of a translation run;
/// translators hold no global state.
#[derive(Clone, Debug)]
pub struct TranslationEnvironment {
    architecture: String,
    endian: Endian,
    address_size: il::OperandSize,
    registers: BTreeMap<String, il::OperandSize>,
}

impl TranslationEnvironment {
    pub fn new<S>(
        architecture: S,
        endian: Endian,
        address_size: il::OperandSize,
        registers: BTreeMap<String, il::OperandSize>,
    ) -> TranslationEnvironment
    where
        S: Into<String>,
    {
        TranslationEnvironment {
            architecture: architecture.into(),
            endian,
            address_size,
            registers,
        }
    }

    /// The name of the architecture this environment describes.
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// The endianness of the architecture.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// The size of a native address.
    pub fn address_size(&self) -> il::OperandSize {
        self.address_size
    }

    /// The register catalog of the architecture.
    pub fn registers(&self) -> &BTreeMap<String, il::OperandSize> {
        &self.registers
    }

    /// The size of the given native register, if it exists.
    pub fn register_size(&self, name: &str) -> Option<il::OperandSize> {
        self.registers.get(name).copied()
    }
}

/// A cross-cutting instrumentation hook, consulted by the `Driver` at
/// fixed points around every translated native instruction.
///
/// Extensions let an embedder inject extra REIL instructions without
/// touching any architecture translator. Appended instructions may use
/// placeholder addresses; the driver re-bases the combined sequence so
/// the address-doubling scheme holds for the final expansion.
pub trait TranslationExtension: Sync {
    /// Called before the translator runs. Appended instructions precede
    /// the instruction's own translation.
    fn prologue(
        &self,
        _environment: &TranslationEnvironment,
        _instruction: &NativeInstruction,
        _instructions: &mut Vec<il::Instruction>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called after the translator runs. Appended instructions follow
    /// the instruction's own translation.
    fn epilogue(
        &self,
        _environment: &TranslationEnvironment,
        _instruction: &NativeInstruction,
        _instructions: &mut Vec<il::Instruction>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// A generic translation trait, implemented by various architectures.
pub trait Translator: Sync {
    /// Translates a single native instruction into an ordered sequence
    /// of REIL instructions implementing its semantics.
    ///
    /// Emitted addresses follow the address-doubling scheme: the i-th
    /// instruction emitted for the native instruction at address `a`
    /// has REIL address `a * 0x100 + i`.
    fn translate_instruction(
        &self,
        environment: &TranslationEnvironment,
        instruction: &NativeInstruction,
    ) -> Result<Vec<il::Instruction>, Error>;
}

/// A capability lookup from architecture name to its implementation.
///
/// New architectures register here; nothing else in the crate changes
/// when one is added.
pub struct TranslatorRegistry {
    architectures: BTreeMap<String, Box<dyn Architecture>>,
}

impl TranslatorRegistry {
    /// Create an empty registry.
    pub fn new() -> TranslatorRegistry {
        TranslatorRegistry {
            architectures: BTreeMap::new(),
        }
    }

    /// Register an architecture by its name.
    pub fn register(&mut self, architecture: Box<dyn Architecture>) {
        self.architectures
            .insert(architecture.name().to_string(), architecture);
    }

    /// Get a registered architecture by name.
    pub fn architecture(&self, name: &str) -> Result<&dyn Architecture, Error> {
        self.architectures
            .get(name)
            .map(|architecture| architecture.as_ref())
            .ok_or_else(|| Error::UnsupportedArchitecture(name.to_string()))
    }

    /// The names of every registered architecture.
    pub fn names(&self) -> Vec<&str> {
        self.architectures.keys().map(String::as_str).collect()
    }
}

impl Default for TranslatorRegistry {
    fn default() -> TranslatorRegistry {
        let mut registry = TranslatorRegistry::new();
        registry.register(Box::new(crate::architecture::X86::new()));
        registry
    }
}

/// Drives translation of instructions, blocks, and functions for one
/// architecture.
pub struct Driver {
    environment: TranslationEnvironment,
    translator: Box<dyn Translator>,
    extensions: Vec<Box<dyn TranslationExtension>>,
}

impl Driver {
    pub fn new(environment: TranslationEnvironment, translator: Box<dyn Translator>) -> Driver {
        Driver {
            environment,
            translator,
            extensions: Vec::new(),
        }
    }

    /// Create a `Driver` for the named architecture from a registry.
    pub fn from_registry(registry: &TranslatorRegistry, name: &str) -> Result<Driver, Error> {
        let architecture = registry.architecture(name)?;
        Ok(Driver::new(
            architecture.environment(),
            architecture.translator(),
        ))
    }

    /// Attach a `TranslationExtension` to this driver.
    pub fn add_extension(&mut self, extension: Box<dyn TranslationExtension>) {
        self.extensions.push(extension);
    }

    /// The environment this driver translates under.
    pub fn environment(&self) -> &TranslationEnvironment {
        &self.environment
    }

    /// Translate one native instruction.
    ///
    /// Extension prologues run first, then the architecture translator,
    /// then extension epilogues. The combined sequence is re-based so
    /// the i-th instruction of the expansion has REIL address
    /// `instruction.address() * 0x100 + i`.
    pub fn translate_instruction(
        &self,
        instruction: &NativeInstruction,
    ) -> Result<Vec<il::Instruction>, Error> {
        let mut instructions = Vec::new();

        for extension in &self.extensions {
            extension
                .prologue(&self.environment, instruction, &mut instructions)
                .map_err(|error| translation_error(instruction, error))?;
        }

        let translated = self
            .translator
            .translate_instruction(&self.environment, instruction)
            .map_err(|error| translation_error(instruction, error))?;

        // A prologue shifts the translation within its expansion, which
        // would silently re-aim any sub-address the translator pointed
        // at its own expansion.
        if !instructions.is_empty()
            && translated
                .iter()
                .any(|reil| references_expansion(reil, instruction.address()))
        {
            return Err(translation_error(
                instruction,
                "extension prologues cannot be combined with intra-expansion branch targets"
                    .into(),
            ));
        }
        instructions.extend(translated);

        for extension in &self.extensions {
            extension
                .epilogue(&self.environment, instruction, &mut instructions)
                .map_err(|error| translation_error(instruction, error))?;
        }

        if instructions.is_empty() {
            return Err(translation_error(
                instruction,
                "translator emitted no instructions".into(),
            ));
        }
        if instructions.len() as u64 > il::address::INSTRUCTION_MULTIPLIER {
            return Err(translation_error(
                instruction,
                format!(
                    "expansion of {} instructions exceeds the {} REIL addresses \
                     reserved per native instruction",
                    instructions.len(),
                    il::address::INSTRUCTION_MULTIPLIER
                )
                .into(),
            ));
        }

        let base = il::address::to_reil_address(instruction.address())
            .map_err(|error| translation_error(instruction, error))?;
        for (offset, reil_instruction) in instructions.iter_mut().enumerate() {
            reil_instruction.set_address(base + offset as u64);
        }

        Ok(instructions)
    }

    /// Translate a native basic block into a `ReilGraph`.
    ///
    /// Per-instruction results are concatenated in instruction order and
    /// handed to the assembler. Any single failing instruction aborts
    /// the whole block; no partial result is returned.
    pub fn translate_block(&self, block: &NativeBlock) -> Result<il::ReilGraph, Error> {
        debug!(
            "translating block at 0x{:x} ({} instructions)",
            block.address(),
            block.instructions().len()
        );

        let mut instructions = Vec::new();
        for native_instruction in block.instructions() {
            instructions.extend(self.translate_instruction(native_instruction)?);
        }

        assembler::assemble(&instructions, &[])
    }

    /// Translate a whole native function into a `ReilGraph`.
    ///
    /// Native block boundaries are preserved as block-start hints for
    /// the assembler; REIL control flow is still recomputed at REIL
    /// granularity. Any single failing instruction aborts the whole
    /// function.
    pub fn translate_function(&self, function: &NativeFunction) -> Result<il::ReilGraph, Error> {
        debug!(
            "translating function at 0x{:x} ({} blocks)",
            function.address(),
            function.blocks().len()
        );

        let mut instructions = Vec::new();
        let mut hints = Vec::new();
        for block in function.blocks() {
            hints.push(il::address::to_reil_address(block.address())?);
            for native_instruction in block.instructions() {
                instructions.extend(self.translate_instruction(native_instruction)?);
            }
        }

        assembler::assemble(&instructions, &hints)
    }
}

/// Returns true if any operand of the REIL instruction is a sub-address
/// into the expansion of the native instruction at `address`.
fn references_expansion(reil: &il::Instruction, address: u64) -> bool {
    [
        reil.first_operand(),
        reil.second_operand(),
        reil.third_operand(),
    ]
    .into_iter()
    .any(|operand| {
        operand
            .sub_address_value()
            .map(|(base, _)| base == address)
            .unwrap_or(false)
    })
}

/// Wraps an error into a translation failure carrying the offending
/// native instruction, unless it already is one.
fn translation_error(instruction: &NativeInstruction, error: Error) -> Error {
    match error {
        error @ Error::Translation { .. } => error,
        error => Error::Translation {
            instruction: Box::new(instruction.clone()),
            reason: error.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    /// Translates `nop` to a REIL nop and fails everything else.
    struct NopOnly;

    impl Translator for NopOnly {
        fn translate_instruction(
            &self,
            _environment: &TranslationEnvironment,
            instruction: &NativeInstruction,
        ) -> Result<Vec<Instruction>, Error> {
            if instruction.mnemonic() == "nop" {
                Ok(vec![Instruction::nop(address::to_reil_address(
                    instruction.address(),
                )?)])
            } else {
                Err(format!("unsupported mnemonic {}", instruction.mnemonic()).into())
            }
        }
    }

    fn test_driver() -> Driver {
        Driver::new(
            TranslationEnvironment::new(
                "test",
                Endian::Little,
                OperandSize::Dword,
                BTreeMap::new(),
            ),
            Box::new(NopOnly),
        )
    }

    #[test]
    fn failure_aborts_whole_block_and_names_the_instruction() {
        let block = NativeBlock::new(vec![
            NativeInstruction::new(0x1000, "nop", Vec::<String>::new(), vec![]),
            NativeInstruction::new(0x1001, "nop", Vec::<String>::new(), vec![]),
            NativeInstruction::new(0x1002, "bogus", Vec::<String>::new(), vec![]),
            NativeInstruction::new(0x1003, "nop", Vec::<String>::new(), vec![]),
            NativeInstruction::new(0x1004, "nop", Vec::<String>::new(), vec![]),
        ])
        .unwrap();

        let error = test_driver().translate_block(&block).unwrap_err();
        let failing = error.failing_instruction().expect("translation error");
        assert_eq!(failing.address(), 0x1002);
        assert_eq!(failing.mnemonic(), "bogus");
    }

    #[test]
    fn extensions_wrap_the_translation_and_addresses_are_rebased() {
        struct Bracket;

        impl TranslationExtension for Bracket {
            fn prologue(
                &self,
                _environment: &TranslationEnvironment,
                instruction: &NativeInstruction,
                instructions: &mut Vec<Instruction>,
            ) -> Result<(), Error> {
                instructions.push(Instruction::undef(address::to_reil_address(
                    instruction.address(),
                )?));
                Ok(())
            }

            fn epilogue(
                &self,
                _environment: &TranslationEnvironment,
                instruction: &NativeInstruction,
                instructions: &mut Vec<Instruction>,
            ) -> Result<(), Error> {
                instructions.push(Instruction::unknown(address::to_reil_address(
                    instruction.address(),
                )?));
                Ok(())
            }
        }

        let mut driver = test_driver();
        driver.add_extension(Box::new(Bracket));

        let native = NativeInstruction::new(0x1000, "nop", Vec::<String>::new(), vec![]);
        let instructions = driver.translate_instruction(&native).unwrap();

        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[0].opcode(), Opcode::Undef);
        assert_eq!(instructions[1].opcode(), Opcode::Nop);
        assert_eq!(instructions[2].opcode(), Opcode::Unknown);
        for (i, instruction) in instructions.iter().enumerate() {
            assert_eq!(instruction.address(), 0x1000 * 0x100 + i as u64);
        }
    }

    #[test]
    fn addresses_past_the_doubling_limit_fail_as_translation_errors() {
        let native = NativeInstruction::new(u64::MAX, "nop", Vec::<String>::new(), vec![]);
        let error = test_driver().translate_instruction(&native).unwrap_err();
        assert_eq!(error.failing_instruction().unwrap().address(), u64::MAX);
    }

    #[test]
    fn prologues_reject_intra_expansion_branch_targets() {
        /// Emits a branch into its own expansion, as a multi-step
        /// expansion with an internal skip would.
        struct SelfBranching;

        impl Translator for SelfBranching {
            fn translate_instruction(
                &self,
                _environment: &TranslationEnvironment,
                instruction: &NativeInstruction,
            ) -> Result<Vec<Instruction>, Error> {
                let base = address::to_reil_address(instruction.address())?;
                Ok(vec![
                    Instruction::jcc(
                        base,
                        Operand::register("t0", OperandSize::Byte),
                        Operand::sub_address(instruction.address(), 2),
                    )?,
                    Instruction::nop(base + 1),
                    Instruction::nop(base + 2),
                ])
            }
        }

        struct Prefix;

        impl TranslationExtension for Prefix {
            fn prologue(
                &self,
                _environment: &TranslationEnvironment,
                instruction: &NativeInstruction,
                instructions: &mut Vec<Instruction>,
            ) -> Result<(), Error> {
                instructions.push(Instruction::nop(address::to_reil_address(
                    instruction.address(),
                )?));
                Ok(())
            }
        }

        let environment = TranslationEnvironment::new(
            "test",
            Endian::Little,
            OperandSize::Dword,
            BTreeMap::new(),
        );
        let native = NativeInstruction::new(0x1000, "skip", Vec::<String>::new(), vec![]);

        // without the prologue the sub-address expansion is fine
        let plain = Driver::new(environment.clone(), Box::new(SelfBranching));
        assert!(plain.translate_instruction(&native).is_ok());

        let mut driver = Driver::new(environment, Box::new(SelfBranching));
        driver.add_extension(Box::new(Prefix));
        let error = driver.translate_instruction(&native).unwrap_err();
        assert_eq!(error.failing_instruction().unwrap().address(), 0x1000);
    }

    #[test]
    fn unknown_architecture_is_an_error() {
        let registry = TranslatorRegistry::default();
        assert!(matches!(
            Driver::from_registry(&registry, "m68k"),
            Err(Error::UnsupportedArchitecture(_))
        ));
        assert!(Driver::from_registry(&registry, "x86").is_ok());
    }
}
