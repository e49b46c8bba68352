use crate::architecture::{Architecture, X86};
use crate::il::*;
use crate::native::{NativeBlock, NativeInstruction};
use crate::translator::{Driver, Translator, TranslatorRegistry};
use crate::Error;

fn translate(mnemonic: &str, operands: Vec<&str>, bytes: Vec<u8>) -> Vec<Instruction> {
    try_translate(mnemonic, operands, bytes).unwrap()
}

fn try_translate(
    mnemonic: &str,
    operands: Vec<&str>,
    bytes: Vec<u8>,
) -> Result<Vec<Instruction>, Error> {
    let architecture = X86::new();
    let instruction = NativeInstruction::new(0x1000, mnemonic, operands, bytes);
    architecture
        .translator()
        .translate_instruction(&architecture.environment(), &instruction)
}

fn opcodes(instructions: &[Instruction]) -> Vec<Opcode> {
    instructions
        .iter()
        .map(|instruction| instruction.opcode())
        .collect()
}

#[test]
fn mov_register_to_register_is_a_single_str() {
    let instructions = translate("mov", vec!["eax", "ebx"], vec![0x89, 0xd8]);

    assert_eq!(instructions.len(), 1);
    assert_eq!(instructions[0].opcode(), Opcode::Str);
    assert_eq!(instructions[0].first_operand().value(), "ebx");
    assert_eq!(instructions[0].third_operand().value(), "eax");
    assert_eq!(instructions[0].address(), 0x1000 * 0x100);
}

#[test]
fn expansions_occupy_consecutive_doubled_addresses() {
    let instructions = translate("add", vec!["eax", "ebx"], vec![0x01, 0xd8]);

    for (i, instruction) in instructions.iter().enumerate() {
        assert_eq!(instruction.address(), 0x1000 * 0x100 + i as u64);
    }
}

#[test]
fn add_writes_the_destination_and_all_four_flags() {
    let instructions = translate("add", vec!["eax", "ebx"], vec![0x01, 0xd8]);

    for register in ["eax", "ZF", "SF", "CF", "OF"] {
        assert!(
            instructions
                .iter()
                .any(|instruction| instruction.sets_value(register)),
            "no instruction writes {}",
            register
        );
    }
    assert_eq!(instructions.last().unwrap().third_operand().value(), "eax");
}

#[test]
fn cmp_sets_flags_without_writing_a_register() {
    let instructions = translate("cmp", vec!["eax", "ebx"], vec![0x39, 0xd8]);

    assert!(!instructions
        .iter()
        .any(|instruction| instruction.sets_value("eax") || instruction.sets_value("ebx")));
    for flag in ["ZF", "SF", "CF", "OF"] {
        assert!(instructions
            .iter()
            .any(|instruction| instruction.sets_value(flag)));
    }
}

#[test]
fn inc_leaves_the_carry_flag_alone() {
    let instructions = translate("inc", vec!["eax"], vec![0x40]);

    assert!(instructions
        .iter()
        .any(|instruction| instruction.sets_value("OF")));
    assert!(!instructions
        .iter()
        .any(|instruction| instruction.sets_value("CF")));
}

#[test]
fn memory_source_emits_address_computation_and_a_load() {
    let instructions = translate("mov", vec!["eax", "[ebp-8]"], vec![0x8b, 0x45, 0xf8]);

    assert_eq!(instructions[0].opcode(), Opcode::Sub);
    assert_eq!(instructions[0].first_operand().value(), "ebp");
    assert_eq!(instructions[1].opcode(), Opcode::Ldm);
    let last = instructions.last().unwrap();
    assert_eq!(last.opcode(), Opcode::Str);
    assert_eq!(last.third_operand().value(), "eax");
}

#[test]
fn absolute_memory_operands_need_no_address_computation() {
    let instructions = translate("mov", vec!["eax", "[0x804a000]"], vec![0xa1, 0, 0xa0, 4, 8]);

    assert_eq!(instructions[0].opcode(), Opcode::Ldm);
    assert_eq!(
        instructions[0].first_operand().literal_value(),
        Some(0x804a000)
    );
}

#[test]
fn push_decrements_esp_before_storing() {
    let instructions = translate("push", vec!["eax"], vec![0x50]);

    assert_eq!(
        opcodes(&instructions),
        vec![Opcode::Sub, Opcode::Str, Opcode::Stm]
    );
    assert_eq!(instructions[1].third_operand().value(), "esp");
    assert_eq!(instructions[2].first_operand().value(), "eax");
    assert_eq!(instructions[2].third_operand().value(), "esp");
}

#[test]
fn pop_loads_before_adjusting_esp() {
    let instructions = translate("pop", vec!["ebx"], vec![0x5b]);

    assert_eq!(
        opcodes(&instructions),
        vec![Opcode::Ldm, Opcode::Add, Opcode::Str, Opcode::Str]
    );
    assert_eq!(instructions[0].first_operand().value(), "esp");
    assert_eq!(instructions.last().unwrap().third_operand().value(), "ebx");
}

#[test]
fn call_pushes_the_return_address_and_marks_the_jump() {
    let instructions = translate("call", vec!["0x2000"], vec![0xe8, 0xfb, 0x0f, 0, 0]);

    // the return address is the address past the five call bytes
    assert!(instructions.iter().any(|instruction| {
        instruction.opcode() == Opcode::Stm
            && instruction.first_operand().literal_value() == Some(0x1005)
    }));

    let last = instructions.last().unwrap();
    assert!(last.is_unconditional_jump());
    assert!(last.is_function_call());
    assert_eq!(last.third_operand().literal_value(), Some(0x2000));
    assert_eq!(last.third_operand().size(), OperandSize::Address);
}

#[test]
fn call_without_bytes_is_rejected() {
    assert!(try_translate("call", vec!["0x2000"], vec![]).is_err());
}

#[test]
fn ret_is_an_indirect_jump_through_the_stack() {
    let instructions = translate("ret", vec![], vec![0xc3]);

    assert_eq!(instructions[0].opcode(), Opcode::Ldm);
    let last = instructions.last().unwrap();
    assert!(last.is_unconditional_jump());
    assert!(last.third_operand().is_temporary_register());
}

#[test]
fn je_branches_on_the_zero_flag() {
    let instructions = translate("je", vec!["0x1010"], vec![0x74, 0x0e]);

    assert_eq!(instructions.len(), 1);
    assert!(instructions[0].is_conditional_jump());
    assert_eq!(instructions[0].first_operand().value(), "ZF");
    assert_eq!(instructions[0].third_operand().literal_value(), Some(0x1010));
}

#[test]
fn jne_branches_on_the_inverted_zero_flag() {
    let instructions = translate("jne", vec!["0x1010"], vec![0x75, 0x0e]);

    assert_eq!(instructions[0].opcode(), Opcode::Bisz);
    assert_eq!(instructions[0].first_operand().value(), "ZF");
    assert!(instructions[1].is_conditional_jump());
    assert_eq!(
        instructions[1].first_operand(),
        instructions[0].third_operand()
    );
}

#[test]
fn register_jump_targets_stay_unresolved() {
    let instructions = translate("jmp", vec!["eax"], vec![0xff, 0xe0]);

    let last = instructions.last().unwrap();
    assert!(last.is_unconditional_jump());
    assert_eq!(last.third_operand().value(), "eax");
}

#[test]
fn bitwise_instructions_write_their_destination() {
    for (mnemonic, opcode, bytes) in [
        ("and", Opcode::And, vec![0x21, 0xd8]),
        ("or", Opcode::Or, vec![0x09, 0xd8]),
        ("xor", Opcode::Xor, vec![0x31, 0xd8]),
    ] {
        let instructions = translate(mnemonic, vec!["eax", "ebx"], bytes);

        assert_eq!(instructions[0].opcode(), opcode, "{}", mnemonic);
        assert_eq!(instructions[0].first_operand().value(), "eax");
        assert_eq!(instructions[0].second_operand().value(), "ebx");
        assert_eq!(
            instructions.last().unwrap().third_operand().value(),
            "eax",
            "{} does not write its destination",
            mnemonic
        );
    }
}

#[test]
fn test_sets_flags_without_writing_a_register() {
    let instructions = translate("test", vec!["eax", "ebx"], vec![0x85, 0xd8]);

    assert_eq!(instructions[0].opcode(), Opcode::And);
    assert!(!instructions
        .iter()
        .any(|instruction| instruction.sets_value("eax") || instruction.sets_value("ebx")));
    for flag in ["ZF", "SF", "CF", "OF"] {
        assert!(instructions
            .iter()
            .any(|instruction| instruction.sets_value(flag)));
    }
}

#[test]
fn bitwise_instructions_clear_carry_and_overflow() {
    let instructions = translate("xor", vec!["eax", "eax"], vec![0x31, 0xc0]);

    for flag in ["CF", "OF"] {
        assert!(instructions.iter().any(|instruction| {
            instruction.opcode() == Opcode::Str
                && instruction.first_operand().literal_value() == Some(0)
                && instruction.third_operand().value() == flag
        }));
    }
}

#[test]
fn shl_masks_the_count_and_sets_the_carry() {
    let instructions = translate("shl", vec!["eax", "ecx"], vec![0xd3, 0xe0]);

    assert!(instructions.iter().any(|instruction| {
        instruction.opcode() == Opcode::And
            && instruction.second_operand().literal_value() == Some(0x1f)
    }));
    assert!(instructions
        .iter()
        .any(|instruction| instruction.sets_value("CF")));
    assert_eq!(instructions.last().unwrap().third_operand().value(), "eax");
}

#[test]
fn lea_computes_an_address_without_touching_memory() {
    let instructions = translate("lea", vec!["eax", "[ebp+12]"], vec![0x8d, 0x45, 0x0c]);

    assert!(!instructions
        .iter()
        .any(|instruction| matches!(instruction.opcode(), Opcode::Ldm | Opcode::Stm)));
    assert_eq!(opcodes(&instructions), vec![Opcode::Add, Opcode::Str]);
    assert_eq!(instructions[1].third_operand().value(), "eax");
}

#[test]
fn temporaries_restart_for_every_native_instruction() {
    let first = translate("add", vec!["eax", "ebx"], vec![0x01, 0xd8]);
    let second = translate("sub", vec!["ecx", "edx"], vec![0x29, 0xd1]);

    assert_eq!(first[0].third_operand().value(), "t0");
    assert_eq!(second[0].third_operand().value(), "t0");
}

#[test]
fn unknown_mnemonics_fail_with_the_offending_instruction() {
    let error = try_translate("vfmadd132ps", vec!["xmm0", "xmm1"], vec![]).unwrap_err();

    let instruction = error
        .failing_instruction()
        .expect("translation errors carry the native instruction");
    assert_eq!(instruction.address(), 0x1000);
    assert_eq!(instruction.mnemonic(), "vfmadd132ps");
}

#[test]
fn a_compare_and_branch_block_becomes_a_typed_graph() {
    let registry = TranslatorRegistry::default();
    let driver = Driver::from_registry(&registry, "x86").unwrap();

    let block = NativeBlock::new(vec![
        NativeInstruction::new(0x1000, "cmp", vec!["eax", "ebx"], vec![0x39, 0xd8]),
        NativeInstruction::new(0x1002, "je", vec!["0x1005"], vec![0x74, 0x01]),
        NativeInstruction::new(0x1004, "inc", vec!["eax"], vec![0x40]),
        NativeInstruction::new(0x1005, "ret", Vec::<&str>::new(), vec![0xc3]),
    ])
    .unwrap();

    let graph = driver.translate_block(&block).unwrap();

    // the branch splits the stream at its target and its fallthrough
    assert!(graph.has_block(0x1004 * 0x100));
    assert!(graph.has_block(0x1005 * 0x100));
    assert_eq!(
        graph.edge(0x1000 * 0x100, 0x1005 * 0x100).unwrap().type_(),
        EdgeType::JumpConditionalTrue
    );
    assert_eq!(
        graph.edge(0x1000 * 0x100, 0x1004 * 0x100).unwrap().type_(),
        EdgeType::JumpConditionalFalse
    );
    // ret ends its block with no outgoing edge
    assert!(graph.edges_out(0x1005 * 0x100).unwrap().is_empty());
}
