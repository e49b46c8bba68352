//! Partitions a flat, address-ordered REIL instruction stream into basic
//! blocks and rebuilds typed control-flow edges.
//!
//! The resulting graph is isomorphic in spirit to the native control-flow
//! graph, but expressed at REIL granularity: one native conditional jump
//! becomes a block boundary in the middle of the native instruction's
//! expansion, with distinctly typed taken/not-taken edges.

use crate::il::*;
use crate::Error;
use log::debug;
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;

/// Assemble a flat, address-ordered sequence of REIL instructions into a
/// `ReilGraph`.
///
/// `block_start_hints` are additional REIL addresses at which a block
/// must begin, typically the translated start addresses of native basic
/// blocks; hints which do not name an instruction in `instructions` are
/// ignored.
///
/// # Errors
/// Error if `instructions` is empty, or if a resolvable branch target
/// does not correspond to any computed block start
/// (`Error::InvalidBranchTarget`) - that indicates either a translator
/// defect or an unsupported jump pattern.
pub fn assemble(
    instructions: &[Instruction],
    block_start_hints: &[u64],
) -> Result<ReilGraph, Error> {
    if instructions.is_empty() {
        return Err("cannot assemble an empty instruction sequence".into());
    }

    let addresses: FxHashSet<u64> = instructions
        .iter()
        .map(|instruction| instruction.address())
        .collect();

    // Pass one: compute the addresses where a block must begin. These are
    // the first address of the unit, every address following a jump, and
    // every in-unit jump target.
    let mut block_starts: BTreeSet<u64> = BTreeSet::new();
    block_starts.insert(instructions[0].address());

    for hint in block_start_hints {
        if addresses.contains(hint) {
            block_starts.insert(*hint);
        }
    }

    for (i, instruction) in instructions.iter().enumerate() {
        if !instruction.is_jump() {
            continue;
        }
        if let Some(next) = instructions.get(i + 1) {
            block_starts.insert(next.address());
        }
        if let Some(target) = branch_target(instruction)? {
            if addresses.contains(&target) {
                block_starts.insert(target);
            }
        }
    }

    // Pass two: partition the sequence into maximal runs between
    // consecutive block starts.
    let mut graph = ReilGraph::new();
    let mut block_order: Vec<u64> = Vec::new();
    let mut run: Vec<Instruction> = Vec::new();

    for instruction in instructions {
        if !run.is_empty() && block_starts.contains(&instruction.address()) {
            let block = Block::new(std::mem::take(&mut run))?;
            block_order.push(block.address());
            graph.add_block(block)?;
        }
        run.push(instruction.clone());
    }
    let block = Block::new(run)?;
    block_order.push(block.address());
    graph.add_block(block)?;

    debug!(
        "assembled {} instructions into {} blocks",
        instructions.len(),
        block_order.len()
    );

    // Pass three: edges.
    for (i, &block_address) in block_order.iter().enumerate() {
        let next = block_order.get(i + 1).copied();
        let last = graph.block(block_address)?.last_instruction().clone();

        if !last.is_jump() {
            // a linear run flows into whatever follows
            if let Some(next) = next {
                graph.link(block_address, next, EdgeType::Fallthrough)?;
            }
            continue;
        }

        if last.is_function_call() {
            // calls are not followed into the callee; control returns to
            // the next block
            if let Some(next) = next {
                graph.link(block_address, next, EdgeType::Fallthrough)?;
            }
            continue;
        }

        let target = branch_target(&last)?;

        if last.is_conditional_jump() {
            match target {
                Some(target) if graph.has_block(target) => {
                    graph.link(block_address, target, EdgeType::JumpConditionalTrue)?;
                }
                Some(target) => return Err(Error::InvalidBranchTarget(target)),
                // conditional jump to a computed target; the taken side
                // leaves the unit
                None => {}
            }
            if let Some(next) = next {
                graph.link(block_address, next, EdgeType::JumpConditionalFalse)?;
            }
        } else {
            match target {
                Some(target) if graph.has_block(target) => {
                    graph.link(block_address, target, EdgeType::JumpUnconditional)?;
                }
                Some(target) => return Err(Error::InvalidBranchTarget(target)),
                // computed jump or function return; control leaves the
                // unit and no edge is produced
                None => {}
            }
        }
    }

    Ok(graph)
}

/// The REIL address a jump instruction transfers to, when it is
/// resolvable. Integer literal targets are native addresses; sub-address
/// targets name a REIL instruction within a native expansion. Register
/// targets are computed at runtime and yield `None`.
/// # Errors
/// Error if a literal target is negative or the target does not fit the
/// REIL address space.
fn branch_target(instruction: &Instruction) -> Result<Option<u64>, Error> {
    let target = instruction.third_operand();
    match target.type_() {
        OperandType::IntegerLiteral => match target.literal_value() {
            Some(value) if value >= 0 => Ok(Some(address::to_reil_address(value as u64)?)),
            Some(value) => Err(Error::InvalidOperand(format!(
                "negative branch target {}",
                value
            ))),
            None => Ok(None),
        },
        OperandType::SubAddress => match target.sub_address_value() {
            Some((base, offset)) => address::to_reil_address(base)?
                .checked_add(offset)
                .ok_or_else(|| {
                    Error::InvalidOperand(format!(
                        "branch target {} does not fit the REIL address space",
                        target.value()
                    ))
                })
                .map(Some),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jump_to(address: u64, target_native: u64) -> Instruction {
        Instruction::jcc(
            address,
            Operand::empty(),
            Operand::new(OperandSize::Address, target_native.to_string()),
        )
        .unwrap()
    }

    fn branch_to(address: u64, target_native: u64) -> Instruction {
        Instruction::jcc(
            address,
            Operand::register("t0", OperandSize::Byte),
            Operand::new(OperandSize::Address, target_native.to_string()),
        )
        .unwrap()
    }

    #[test]
    fn linear_run_is_one_block() {
        // three native instructions, each expanding to a couple of REIL
        // instructions, no branches
        let instructions = vec![
            Instruction::nop(0x1000 * 0x100),
            Instruction::nop(0x1000 * 0x100 + 1),
            Instruction::nop(0x1001 * 0x100),
            Instruction::nop(0x1002 * 0x100),
            Instruction::nop(0x1002 * 0x100 + 1),
        ];

        let graph = assemble(&instructions, &[]).unwrap();

        assert_eq!(graph.num_blocks(), 1);
        assert_eq!(graph.num_edges(), 0);
        let block = graph.block(0x1000 * 0x100).unwrap();
        assert_eq!(block.instructions().len(), 5);
        let addresses: Vec<u64> = block
            .instructions()
            .iter()
            .map(|instruction| instruction.address())
            .collect();
        let mut sorted = addresses.clone();
        sorted.sort_unstable();
        assert_eq!(addresses, sorted);
    }

    #[test]
    fn conditional_branch_produces_true_and_false_edges() {
        // 0x1000: conditional branch to 0x1002
        // 0x1001: fallthrough path
        // 0x1002: branch target
        let instructions = vec![
            branch_to(0x1000 * 0x100, 0x1002),
            Instruction::nop(0x1001 * 0x100),
            Instruction::nop(0x1002 * 0x100),
        ];

        let graph = assemble(&instructions, &[]).unwrap();

        assert_eq!(graph.num_blocks(), 3);
        assert_eq!(
            graph.edge(0x1000 * 0x100, 0x1002 * 0x100).unwrap().type_(),
            EdgeType::JumpConditionalTrue
        );
        assert_eq!(
            graph.edge(0x1000 * 0x100, 0x1001 * 0x100).unwrap().type_(),
            EdgeType::JumpConditionalFalse
        );
        assert_eq!(graph.edges_out(0x1000 * 0x100).unwrap().len(), 2);
    }

    #[test]
    fn unconditional_jump_produces_one_edge() {
        let instructions = vec![
            jump_to(0x1000 * 0x100, 0x1002),
            Instruction::nop(0x1001 * 0x100),
            Instruction::nop(0x1002 * 0x100),
        ];

        let graph = assemble(&instructions, &[]).unwrap();

        let edges = graph.edges_out(0x1000 * 0x100).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].type_(), EdgeType::JumpUnconditional);
        assert_eq!(edges[0].tail(), 0x1002 * 0x100);
    }

    #[test]
    fn sub_address_targets_resolve_within_an_expansion() {
        // a branch into the middle of the expansion at 0x1000
        let instructions = vec![
            Instruction::nop(0x1000 * 0x100),
            Instruction::jcc(
                0x1000 * 0x100 + 1,
                Operand::register("t0", OperandSize::Byte),
                Operand::sub_address(0x1000, 3),
            )
            .unwrap(),
            Instruction::nop(0x1000 * 0x100 + 2),
            Instruction::nop(0x1000 * 0x100 + 3),
        ];

        let graph = assemble(&instructions, &[]).unwrap();

        assert!(graph.has_block(0x1000 * 0x100 + 3));
        assert_eq!(
            graph
                .edge(0x1000 * 0x100, 0x1000 * 0x100 + 3)
                .unwrap()
                .type_(),
            EdgeType::JumpConditionalTrue
        );
    }

    #[test]
    fn dangling_branch_target_fails_loudly() {
        let instructions = vec![
            jump_to(0x1000 * 0x100, 0x9999),
            Instruction::nop(0x1001 * 0x100),
        ];

        assert!(matches!(
            assemble(&instructions, &[]),
            Err(Error::InvalidBranchTarget(target)) if target == 0x9999 * 0x100
        ));
    }

    #[test]
    fn calls_fall_through_to_the_next_block() {
        let mut call = jump_to(0x1000 * 0x100, 0x400000);
        call.set_call_flag();
        let instructions = vec![call, Instruction::nop(0x1001 * 0x100)];

        let graph = assemble(&instructions, &[]).unwrap();

        let edges = graph.edges_out(0x1000 * 0x100).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].type_(), EdgeType::Fallthrough);
        assert_eq!(edges[0].tail(), 0x1001 * 0x100);
    }

    #[test]
    fn indirect_jump_ends_its_block_without_an_edge() {
        // a function return: jump to a register target
        let instructions = vec![
            Instruction::jcc(
                0x1000 * 0x100,
                Operand::empty(),
                Operand::register("t0", OperandSize::Dword),
            )
            .unwrap(),
            Instruction::nop(0x1001 * 0x100),
        ];

        let graph = assemble(&instructions, &[]).unwrap();

        assert_eq!(graph.num_blocks(), 2);
        assert!(graph.edges_out(0x1000 * 0x100).unwrap().is_empty());
    }

    #[test]
    fn hints_split_blocks_at_native_boundaries() {
        let instructions = vec![
            Instruction::nop(0x1000 * 0x100),
            Instruction::nop(0x1001 * 0x100),
        ];

        let graph = assemble(&instructions, &[0x1001 * 0x100]).unwrap();

        assert_eq!(graph.num_blocks(), 2);
        assert_eq!(
            graph.edge(0x1000 * 0x100, 0x1001 * 0x100).unwrap().type_(),
            EdgeType::Fallthrough
        );
    }

    #[test]
    fn negative_branch_targets_are_rejected() {
        let instructions = vec![
            Instruction::jcc(
                0x1000 * 0x100,
                Operand::empty(),
                Operand::new(OperandSize::Address, "-4"),
            )
            .unwrap(),
            Instruction::nop(0x1001 * 0x100),
        ];

        assert!(matches!(
            assemble(&instructions, &[]),
            Err(Error::InvalidOperand(_))
        ));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(assemble(&[], &[]).is_err());
    }
}
