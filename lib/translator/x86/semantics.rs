//! REIL semantics for the supported x86 instructions.
//!
//! Every native instruction is expanded by a `Stream`, which owns the
//! per-instruction temporary counter and hands out consecutive REIL
//! addresses. Temporaries restart at `t0` for every native instruction,
//! so a given native instruction always expands to the same REIL
//! sequence regardless of what was translated before it.
//!
//! Flag semantics follow the usual REIL scheme: arithmetic is performed
//! in a register wide enough to hold the carry, and each flag is
//! computed as an explicit instruction sequence over that result.

use crate::il::{self, Instruction, Operand, OperandSize, OperandType};
use crate::native::NativeInstruction;
use crate::translator::x86::registers;
use crate::translator::TranslationEnvironment;
use crate::Error;

/// Translate one native x86 instruction into its REIL expansion.
pub(crate) fn translate(
    environment: &TranslationEnvironment,
    instruction: &NativeInstruction,
) -> Result<Vec<Instruction>, Error> {
    let mut stream = Stream::new(environment, instruction);

    match instruction.mnemonic().to_lowercase().as_str() {
        "add" => add(&mut stream)?,
        "and" => and(&mut stream)?,
        "call" => call(&mut stream)?,
        "cmp" => cmp(&mut stream)?,
        "dec" => dec(&mut stream)?,
        "inc" => inc(&mut stream)?,
        "jae" | "jnb" => conditional_jump(&mut stream, registers::CF, true)?,
        "jb" | "jc" => conditional_jump(&mut stream, registers::CF, false)?,
        "je" | "jz" => conditional_jump(&mut stream, registers::ZF, false)?,
        "jmp" => jmp(&mut stream)?,
        "jne" | "jnz" => conditional_jump(&mut stream, registers::ZF, true)?,
        "lea" => lea(&mut stream)?,
        "mov" => mov(&mut stream)?,
        "nop" => nop(&mut stream)?,
        "or" => or(&mut stream)?,
        "pop" => pop(&mut stream)?,
        "push" => push(&mut stream)?,
        "ret" => ret(&mut stream)?,
        "shl" | "sal" => shl(&mut stream)?,
        "shr" => shr(&mut stream)?,
        "sub" => sub(&mut stream)?,
        "test" => test(&mut stream)?,
        "xor" => xor(&mut stream)?,
        mnemonic => {
            return Err(Error::Translation {
                instruction: Box::new(instruction.clone()),
                reason: format!("unsupported x86 mnemonic `{}`", mnemonic),
            })
        }
    }

    Ok(stream.into_instructions())
}

/// The emitter for one native instruction's expansion.
///
/// Addresses follow the doubling scheme: the i-th emitted instruction
/// gets REIL address `native_address * 0x100 + i`.
struct Stream<'t> {
    environment: &'t TranslationEnvironment,
    instruction: &'t NativeInstruction,
    instructions: Vec<Instruction>,
    temporaries: usize,
}

impl<'t> Stream<'t> {
    fn new(environment: &'t TranslationEnvironment, instruction: &'t NativeInstruction) -> Stream<'t> {
        Stream {
            environment,
            instruction,
            instructions: Vec::new(),
            temporaries: 0,
        }
    }

    fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    fn next_address(&self) -> Result<u64, Error> {
        let base = il::address::to_reil_address(self.instruction.address())?;
        Ok(base + self.instructions.len() as u64)
    }

    fn temporary(&mut self, size: OperandSize) -> Operand {
        let temporary = il::temporary(self.temporaries, size);
        self.temporaries += 1;
        temporary
    }

    fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn add(&mut self, augend: Operand, addend: Operand, size: OperandSize) -> Result<Operand, Error> {
        let result = self.temporary(size);
        let instruction = Instruction::add(self.next_address()?, augend, addend, result.clone())?;
        self.push(instruction);
        Ok(result)
    }

    fn sub(
        &mut self,
        minuend: Operand,
        subtrahend: Operand,
        size: OperandSize,
    ) -> Result<Operand, Error> {
        let result = self.temporary(size);
        let instruction = Instruction::sub(self.next_address()?, minuend, subtrahend, result.clone())?;
        self.push(instruction);
        Ok(result)
    }

    fn and(&mut self, lhs: Operand, rhs: Operand, size: OperandSize) -> Result<Operand, Error> {
        let result = self.temporary(size);
        let instruction = Instruction::and(self.next_address()?, lhs, rhs, result.clone())?;
        self.push(instruction);
        Ok(result)
    }

    fn or(&mut self, lhs: Operand, rhs: Operand, size: OperandSize) -> Result<Operand, Error> {
        let result = self.temporary(size);
        let instruction = Instruction::or(self.next_address()?, lhs, rhs, result.clone())?;
        self.push(instruction);
        Ok(result)
    }

    fn xor(&mut self, lhs: Operand, rhs: Operand, size: OperandSize) -> Result<Operand, Error> {
        let result = self.temporary(size);
        let instruction = Instruction::xor(self.next_address()?, lhs, rhs, result.clone())?;
        self.push(instruction);
        Ok(result)
    }

    fn bsh(&mut self, value: Operand, amount: Operand, size: OperandSize) -> Result<Operand, Error> {
        let result = self.temporary(size);
        let instruction = Instruction::bsh(self.next_address()?, value, amount, result.clone())?;
        self.push(instruction);
        Ok(result)
    }

    fn bisz(&mut self, value: Operand) -> Result<Operand, Error> {
        let result = self.temporary(OperandSize::Byte);
        let instruction = Instruction::bisz(self.next_address()?, value, result.clone())?;
        self.push(instruction);
        Ok(result)
    }

    /// Copy a value into a register.
    fn copy(&mut self, source: Operand, destination: Operand) -> Result<(), Error> {
        let instruction = Instruction::str(self.next_address()?, source, destination)?;
        self.push(instruction);
        Ok(())
    }

    fn load_memory(&mut self, address: Operand, size: OperandSize) -> Result<Operand, Error> {
        let result = self.temporary(size);
        let instruction = Instruction::ldm(self.next_address()?, address, result.clone())?;
        self.push(instruction);
        Ok(result)
    }

    fn store_memory(&mut self, value: Operand, address: Operand) -> Result<(), Error> {
        let instruction = Instruction::stm(self.next_address()?, value, address)?;
        self.push(instruction);
        Ok(())
    }

    /// Get the i-th native operand, parsed.
    fn operand(&self, index: usize) -> Result<ParsedOperand, Error> {
        parse_operand(self.environment, self.instruction.operand(index)?)
    }

    /// Load the value of the i-th native operand, emitting address
    /// computation and a memory load as needed.
    fn load_operand(&mut self, index: usize) -> Result<Operand, Error> {
        match self.operand(index)? {
            ParsedOperand::Value(operand) => Ok(operand),
            ParsedOperand::Memory { base, displacement } => {
                let address = self.effective_address(base, displacement)?;
                self.load_memory(address, OperandSize::Dword)
            }
        }
    }

    /// Store a value into the i-th native operand.
    fn store_operand(&mut self, index: usize, value: Operand) -> Result<(), Error> {
        match self.operand(index)? {
            ParsedOperand::Value(operand) if operand.type_() == OperandType::Register => {
                self.copy(value, operand)
            }
            ParsedOperand::Value(operand) => Err(Error::InvalidOperand(format!(
                "cannot store into `{}`",
                operand.value()
            ))),
            ParsedOperand::Memory { base, displacement } => {
                let address = self.effective_address(base, displacement)?;
                self.store_memory(value, address)
            }
        }
    }

    /// Compute the address of a memory operand, emitting arithmetic for
    /// a non-zero displacement.
    fn effective_address(
        &mut self,
        base: Option<Operand>,
        displacement: i64,
    ) -> Result<Operand, Error> {
        match base {
            None => Ok(il::literal(displacement as u64, OperandSize::Dword)),
            Some(base) if displacement == 0 => Ok(base),
            Some(base) if displacement > 0 => self.add(
                base,
                il::literal(displacement as u64, OperandSize::Dword),
                OperandSize::Dword,
            ),
            Some(base) => self.sub(
                base,
                il::literal(-displacement as u64, OperandSize::Dword),
                OperandSize::Dword,
            ),
        }
    }

    /// Resolve the i-th native operand as a jump target. Immediates
    /// become address-sized literals pointing at a native instruction;
    /// register and memory targets are computed values the assembler
    /// cannot resolve statically.
    fn branch_target(&mut self, index: usize) -> Result<Operand, Error> {
        match self.operand(index)? {
            ParsedOperand::Value(operand) if operand.type_() == OperandType::IntegerLiteral => {
                Ok(Operand::new(OperandSize::Address, operand.value()))
            }
            ParsedOperand::Value(operand) => Ok(operand),
            ParsedOperand::Memory { base, displacement } => {
                let address = self.effective_address(base, displacement)?;
                self.load_memory(address, OperandSize::Dword)
            }
        }
    }

    fn set_zf(&mut self, result: Operand) -> Result<(), Error> {
        let instruction = Instruction::bisz(self.next_address()?, result, flag(registers::ZF))?;
        self.push(instruction);
        Ok(())
    }

    fn set_sf(&mut self, result: Operand) -> Result<(), Error> {
        let bits = result.size().width_in_bits()?;
        self.set_flag_from_bit(registers::SF, result, bits - 1)
    }

    /// Set a flag to the given bit of `source`.
    fn set_flag_from_bit(&mut self, name: &str, source: Operand, bit: usize) -> Result<(), Error> {
        let shifted = self.bsh(
            source,
            signed_literal(-(bit as i64), OperandSize::Byte),
            OperandSize::Qword,
        )?;
        let instruction = Instruction::and(
            self.next_address()?,
            shifted,
            il::literal(1, OperandSize::Byte),
            flag(name),
        )?;
        self.push(instruction);
        Ok(())
    }

    fn clear_flag(&mut self, name: &str) -> Result<(), Error> {
        self.copy(il::literal(0, OperandSize::Byte), flag(name))
    }

    /// Set OF for an addition of `lhs` and `rhs` with the given masked
    /// result: overflow is the sign bit of `!(lhs ^ rhs) & (lhs ^ result)`.
    fn set_of_add(&mut self, lhs: Operand, rhs: Operand, result: Operand) -> Result<(), Error> {
        let size = result.size();
        let bits = size.width_in_bits()?;
        let same_sign = self.xor(lhs.clone(), rhs, size)?;
        let same_sign = self.xor(same_sign, signed_literal(-1, size), size)?;
        let changed = self.xor(lhs, result, size)?;
        let overflow = self.and(same_sign, changed, size)?;
        self.set_flag_from_bit(registers::OF, overflow, bits - 1)
    }

    /// Set OF for a subtraction of `rhs` from `lhs` with the given masked
    /// result: overflow is the sign bit of `(lhs ^ rhs) & (lhs ^ result)`.
    fn set_of_sub(&mut self, lhs: Operand, rhs: Operand, result: Operand) -> Result<(), Error> {
        let size = result.size();
        let bits = size.width_in_bits()?;
        let differing_sign = self.xor(lhs.clone(), rhs, size)?;
        let changed = self.xor(lhs, result, size)?;
        let overflow = self.and(differing_sign, changed, size)?;
        self.set_flag_from_bit(registers::OF, overflow, bits - 1)
    }

    /// Mask a wide arithmetic result back down to its operand width.
    fn mask_result(&mut self, wide: Operand, size: OperandSize) -> Result<Operand, Error> {
        let bits = size.width_in_bits()?;
        let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
        self.and(wide, il::literal(mask, size), size)
    }
}

/// A flag register operand.
fn flag(name: &str) -> Operand {
    Operand::register(name, OperandSize::Byte)
}

/// An integer literal operand which may be negative.
fn signed_literal(value: i64, size: OperandSize) -> Operand {
    Operand::new(size, value.to_string())
}

fn stack_pointer() -> Operand {
    Operand::register(registers::STACK_POINTER, OperandSize::Dword)
}

/// A parsed native operand: a directly usable value, or a memory
/// reference whose address still needs computing.
enum ParsedOperand {
    Value(Operand),
    Memory {
        base: Option<Operand>,
        displacement: i64,
    },
}

fn parse_operand(
    environment: &TranslationEnvironment,
    text: &str,
) -> Result<ParsedOperand, Error> {
    let text = text.trim();
    let text = text
        .strip_prefix("dword ptr ")
        .or_else(|| text.strip_prefix("dword "))
        .unwrap_or(text)
        .trim();

    if text.starts_with("byte") || text.starts_with("word") || text.starts_with("qword") {
        return Err(Error::InvalidOperand(format!(
            "unsupported operand width in `{}`",
            text
        )));
    }

    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return parse_memory(environment, inner.trim());
    }

    if let Some(register) = parse_register(environment, text) {
        return Ok(ParsedOperand::Value(register));
    }
    if let Some(immediate) = parse_immediate(text) {
        return Ok(ParsedOperand::Value(signed_literal(
            immediate,
            OperandSize::Dword,
        )));
    }

    Err(Error::InvalidOperand(text.to_string()))
}

fn parse_memory(environment: &TranslationEnvironment, inner: &str) -> Result<ParsedOperand, Error> {
    if let Some(base) = parse_register(environment, inner) {
        return Ok(ParsedOperand::Memory {
            base: Some(base),
            displacement: 0,
        });
    }
    if let Some(displacement) = parse_immediate(inner) {
        return Ok(ParsedOperand::Memory {
            base: None,
            displacement,
        });
    }

    // base register followed by a signed displacement
    if let Some(split) = inner.rfind(|c| c == '+' || c == '-') {
        let (base_text, rest) = inner.split_at(split);
        let base = parse_register(environment, base_text.trim())
            .ok_or_else(|| Error::InvalidOperand(format!("[{}]", inner)))?;
        let displacement = parse_immediate(rest.trim())
            .ok_or_else(|| Error::InvalidOperand(format!("[{}]", inner)))?;
        return Ok(ParsedOperand::Memory {
            base: Some(base),
            displacement,
        });
    }

    Err(Error::InvalidOperand(format!("[{}]", inner)))
}

fn parse_register(environment: &TranslationEnvironment, text: &str) -> Option<Operand> {
    environment
        .register_size(text)
        .map(|size| Operand::register(text, size))
}

fn parse_immediate(text: &str) -> Option<i64> {
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, text),
    };
    let text = text.strip_prefix('+').unwrap_or(text).trim();
    let value = if let Some(hex) = text.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        text.parse().ok()?
    };
    Some(if negative { -value } else { value })
}

fn mov(stream: &mut Stream) -> Result<(), Error> {
    let value = stream.load_operand(1)?;
    stream.store_operand(0, value)
}

fn lea(stream: &mut Stream) -> Result<(), Error> {
    match stream.operand(1)? {
        ParsedOperand::Memory { base, displacement } => {
            let address = stream.effective_address(base, displacement)?;
            stream.store_operand(0, address)
        }
        ParsedOperand::Value(operand) => Err(Error::InvalidOperand(format!(
            "lea requires a memory operand, got `{}`",
            operand.value()
        ))),
    }
}

fn add(stream: &mut Stream) -> Result<(), Error> {
    let lhs = stream.load_operand(0)?;
    let rhs = stream.load_operand(1)?;
    let wide = stream.add(lhs.clone(), rhs.clone(), OperandSize::Qword)?;
    let result = stream.mask_result(wide.clone(), OperandSize::Dword)?;
    stream.set_zf(result.clone())?;
    stream.set_sf(result.clone())?;
    stream.set_flag_from_bit(registers::CF, wide, 32)?;
    stream.set_of_add(lhs, rhs, result.clone())?;
    stream.store_operand(0, result)
}

fn sub(stream: &mut Stream) -> Result<(), Error> {
    let result = subtract_and_set_flags(stream)?;
    stream.store_operand(0, result)
}

fn cmp(stream: &mut Stream) -> Result<(), Error> {
    subtract_and_set_flags(stream)?;
    Ok(())
}

/// The shared core of `sub` and `cmp`: subtract in a wide register and
/// derive all four flags from the wide and masked results.
fn subtract_and_set_flags(stream: &mut Stream) -> Result<Operand, Error> {
    let lhs = stream.load_operand(0)?;
    let rhs = stream.load_operand(1)?;
    let wide = stream.sub(lhs.clone(), rhs.clone(), OperandSize::Qword)?;
    let result = stream.mask_result(wide.clone(), OperandSize::Dword)?;
    stream.set_zf(result.clone())?;
    stream.set_sf(result.clone())?;
    // the borrow lands in bit 32 of the wide difference
    stream.set_flag_from_bit(registers::CF, wide, 32)?;
    stream.set_of_sub(lhs, rhs, result.clone())?;
    Ok(result)
}

fn inc(stream: &mut Stream) -> Result<(), Error> {
    let lhs = stream.load_operand(0)?;
    let one = il::literal(1, OperandSize::Dword);
    let wide = stream.add(lhs.clone(), one.clone(), OperandSize::Qword)?;
    let result = stream.mask_result(wide, OperandSize::Dword)?;
    stream.set_zf(result.clone())?;
    stream.set_sf(result.clone())?;
    // inc leaves CF alone
    stream.set_of_add(lhs, one, result.clone())?;
    stream.store_operand(0, result)
}

fn dec(stream: &mut Stream) -> Result<(), Error> {
    let lhs = stream.load_operand(0)?;
    let one = il::literal(1, OperandSize::Dword);
    let wide = stream.sub(lhs.clone(), one.clone(), OperandSize::Qword)?;
    let result = stream.mask_result(wide, OperandSize::Dword)?;
    stream.set_zf(result.clone())?;
    stream.set_sf(result.clone())?;
    // dec leaves CF alone
    stream.set_of_sub(lhs, one, result.clone())?;
    stream.store_operand(0, result)
}

fn and(stream: &mut Stream) -> Result<(), Error> {
    let result = bitwise(stream, |stream, lhs, rhs, size| stream.and(lhs, rhs, size))?;
    stream.store_operand(0, result)
}

fn or(stream: &mut Stream) -> Result<(), Error> {
    let result = bitwise(stream, |stream, lhs, rhs, size| stream.or(lhs, rhs, size))?;
    stream.store_operand(0, result)
}

fn xor(stream: &mut Stream) -> Result<(), Error> {
    let result = bitwise(stream, |stream, lhs, rhs, size| stream.xor(lhs, rhs, size))?;
    stream.store_operand(0, result)
}

fn test(stream: &mut Stream) -> Result<(), Error> {
    bitwise(stream, |stream, lhs, rhs, size| stream.and(lhs, rhs, size))?;
    Ok(())
}

/// The shared core of the bitwise instructions: apply the operation,
/// set ZF and SF from the result, and clear CF and OF.
fn bitwise(
    stream: &mut Stream,
    operation: impl Fn(&mut Stream, Operand, Operand, OperandSize) -> Result<Operand, Error>,
) -> Result<Operand, Error> {
    let lhs = stream.load_operand(0)?;
    let rhs = stream.load_operand(1)?;
    let result = operation(stream, lhs, rhs, OperandSize::Dword)?;
    stream.set_zf(result.clone())?;
    stream.set_sf(result.clone())?;
    stream.clear_flag(registers::CF)?;
    stream.clear_flag(registers::OF)?;
    Ok(result)
}

fn shl(stream: &mut Stream) -> Result<(), Error> {
    let value = stream.load_operand(0)?;
    let count = stream.load_operand(1)?;
    let count = stream.and(count, il::literal(0x1f, OperandSize::Byte), OperandSize::Byte)?;
    let wide = stream.bsh(value, count, OperandSize::Qword)?;
    let result = stream.mask_result(wide.clone(), OperandSize::Dword)?;
    // the last bit shifted out lands in bit 32 of the wide result
    stream.set_flag_from_bit(registers::CF, wide, 32)?;
    stream.set_zf(result.clone())?;
    stream.set_sf(result.clone())?;
    // the hardware defines OF only for a shift of one; CF ^ SF matches
    // that case
    let of = Instruction::xor(
        stream.next_address()?,
        flag(registers::CF),
        flag(registers::SF),
        flag(registers::OF),
    )?;
    stream.push(of);
    stream.store_operand(0, result)
}

fn shr(stream: &mut Stream) -> Result<(), Error> {
    let value = stream.load_operand(0)?;
    let count = stream.load_operand(1)?;
    let count = stream.and(count, il::literal(0x1f, OperandSize::Byte), OperandSize::Byte)?;
    // the last bit shifted out is bit count-1 of the original value
    let count_minus_one = stream.sub(
        count.clone(),
        il::literal(1, OperandSize::Byte),
        OperandSize::Byte,
    )?;
    let down_to_last = stream.sub(
        il::literal(0, OperandSize::Byte),
        count_minus_one,
        OperandSize::Byte,
    )?;
    let last_out = stream.bsh(value.clone(), down_to_last, OperandSize::Dword)?;
    stream.set_flag_from_bit(registers::CF, last_out, 0)?;

    let negated = stream.sub(il::literal(0, OperandSize::Byte), count, OperandSize::Byte)?;
    let result = stream.bsh(value.clone(), negated, OperandSize::Dword)?;
    stream.set_zf(result.clone())?;
    stream.set_sf(result.clone())?;
    // the hardware defines OF only for a shift of one, where it is the
    // original sign bit
    stream.set_flag_from_bit(registers::OF, value, 31)?;
    stream.store_operand(0, result)
}

fn push(stream: &mut Stream) -> Result<(), Error> {
    let value = stream.load_operand(0)?;
    push_value(stream, value)
}

fn push_value(stream: &mut Stream, value: Operand) -> Result<(), Error> {
    let esp = stack_pointer();
    let moved = stream.sub(esp.clone(), il::literal(4, OperandSize::Dword), OperandSize::Dword)?;
    stream.copy(moved, esp.clone())?;
    stream.store_memory(value, esp)
}

fn pop(stream: &mut Stream) -> Result<(), Error> {
    let esp = stack_pointer();
    let value = stream.load_memory(esp.clone(), OperandSize::Dword)?;
    let moved = stream.add(esp.clone(), il::literal(4, OperandSize::Dword), OperandSize::Dword)?;
    stream.copy(moved, esp)?;
    stream.store_operand(0, value)
}

fn jmp(stream: &mut Stream) -> Result<(), Error> {
    let target = stream.branch_target(0)?;
    let instruction = Instruction::jcc(stream.next_address()?, Operand::empty(), target)?;
    stream.push(instruction);
    Ok(())
}

fn conditional_jump(stream: &mut Stream, name: &str, negate: bool) -> Result<(), Error> {
    let target = stream.branch_target(0)?;
    let condition = if negate {
        stream.bisz(flag(name))?
    } else {
        flag(name)
    };
    let instruction = Instruction::jcc(stream.next_address()?, condition, target)?;
    stream.push(instruction);
    Ok(())
}

fn call(stream: &mut Stream) -> Result<(), Error> {
    if stream.instruction.bytes().is_empty() {
        return Err(Error::InvalidOperand(
            "cannot compute a return address for a call without instruction bytes".to_string(),
        ));
    }
    let return_address = stream.instruction.address() + stream.instruction.bytes().len() as u64;

    let target = stream.branch_target(0)?;
    push_value(
        stream,
        il::literal(return_address, OperandSize::Dword),
    )?;
    let mut instruction = Instruction::jcc(stream.next_address()?, Operand::empty(), target)?;
    instruction.set_call_flag();
    stream.push(instruction);
    Ok(())
}

fn ret(stream: &mut Stream) -> Result<(), Error> {
    let esp = stack_pointer();
    let target = stream.load_memory(esp.clone(), OperandSize::Dword)?;
    let moved = stream.add(esp.clone(), il::literal(4, OperandSize::Dword), OperandSize::Dword)?;
    stream.copy(moved, esp)?;
    let instruction = Instruction::jcc(stream.next_address()?, Operand::empty(), target)?;
    stream.push(instruction);
    Ok(())
}

fn nop(stream: &mut Stream) -> Result<(), Error> {
    let instruction = Instruction::nop(stream.next_address()?);
    stream.push(instruction);
    Ok(())
}
