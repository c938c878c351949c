//! Instruction decoding for a single method's code array.
//!
//! [`DecodeState`] is the only mutable state of a decode. It holds the
//! current instruction, the operand caches derived from it, and the rolling
//! window of recent opcodes. One state belongs to one method decode at a time.

use serde::Serialize;

use crate::constant_pool::{ConstantPool, ConstantPoolEntry};
use crate::error::{DecodeError, NotAvailable};
use crate::opcodes;
use crate::operands::{
    self, OperandMeaning, OperandShape, OperandSpec, OperandWidth, wide_operand_specs,
};
use crate::reader::{ByteReader, UnexpectedEof};

/// Number of opcodes remembered for lookback.
pub const HISTORY_CAPACITY: usize = 32;

/// One operand as read from the code array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Operand {
    pub meaning: OperandMeaning,
    pub width: OperandWidth,
    /// Raw value, sign- or zero-extended according to `meaning`.
    pub value: i32,
    /// Absolute target for branch operands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwitchKind {
    Table { low: i32, high: i32 },
    Lookup { npairs: i32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SwitchEntry {
    /// Match value, or `low + position` for a tableswitch.
    pub key: i32,
    pub offset: i32,
    pub target: i32,
}

/// Jump table of a `tableswitch` or `lookupswitch`, entries sorted by target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SwitchTable {
    pub kind: SwitchKind,
    /// Alignment bytes skipped after the opcode.
    pub padding: u8,
    pub default_offset: i32,
    pub default_target: i32,
    pub entries: Vec<SwitchEntry>,
}

/// One decoded instruction. A `wide` prefix is folded into the instruction
/// it modifies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecodedInstruction {
    pub pc: u32,
    pub opcode: u8,
    pub operands: Vec<Operand>,
    pub is_wide: bool,
    pub next_pc: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch: Option<SwitchTable>,
}

impl DecodedInstruction {
    pub fn mnemonic(&self) -> String {
        opcodes::display_name(self.opcode)
    }

    /// Encoded size in bytes, including any prefix and switch padding.
    pub fn byte_len(&self) -> u32 {
        self.next_pc - self.pc
    }
}

/// Fixed-capacity ring of the most recent opcodes of the current method.
#[derive(Clone, Debug, Default)]
pub struct OpcodeHistory {
    slots: [u8; HISTORY_CAPACITY],
    /// Slot holding the most recent opcode.
    head: usize,
    /// Opcodes pushed since the last reset, saturating at capacity.
    len: usize,
}

impl OpcodeHistory {
    pub fn reset(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    pub fn push(&mut self, opcode: u8) {
        if self.len > 0 {
            self.head = (self.head + 1) % HISTORY_CAPACITY;
        }
        self.slots[self.head] = opcode;
        self.len = (self.len + 1).min(HISTORY_CAPACITY);
    }

    /// Whether `offset` positions back is inside the recorded history.
    pub fn is_valid(&self, offset: usize) -> bool {
        offset < self.len
    }

    /// Opcode `offset` positions back, where 0 is the most recent one.
    /// History before the method start reads as `nop`.
    pub fn get(&self, offset: usize) -> u8 {
        if !self.is_valid(offset) {
            return opcodes::NOP;
        }
        self.slots[(self.head + HISTORY_CAPACITY - offset) % HISTORY_CAPACITY]
    }
}

/// Current instruction and its derived operand facts.
#[derive(Clone, Debug, Default)]
pub struct DecodeState<'a> {
    current: Option<DecodedInstruction>,
    branch_offset: Option<i32>,
    branch_target: Option<i32>,
    branch_fall_through: Option<u32>,
    register: Option<u16>,
    is_register_load: bool,
    is_register_store: bool,
    int_constant: Option<i32>,
    long_constant: Option<i64>,
    float_constant: Option<f32>,
    double_constant: Option<f64>,
    string_constant: Option<&'a str>,
    class_constant: Option<&'a str>,
    name_constant: Option<&'a str>,
    sig_constant: Option<&'a str>,
    constant_ref: Option<(u16, &'a ConstantPoolEntry)>,
    ref_field_is_static: Option<bool>,
    history: OpcodeHistory,
}

impl<'a> DecodeState<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares for a new method: clears the current instruction and history.
    pub fn reset(&mut self) {
        self.clear_operands();
        self.current = None;
        self.history.reset();
    }

    fn clear_operands(&mut self) {
        let history = std::mem::take(&mut self.history);
        *self = Self {
            history,
            ..Self::default()
        };
    }

    /// Decodes the instruction starting at `pc`, making it current.
    pub fn decode_at(
        &mut self,
        code: &[u8],
        pc: u32,
        pool: &'a ConstantPool,
    ) -> Result<&DecodedInstruction, DecodeError> {
        self.clear_operands();
        let eof = |err: UnexpectedEof| DecodeError::Truncated {
            pc,
            needed: err.needed,
        };
        let mut reader = ByteReader::at(code, pc as usize);
        let mut opcode = reader.read_u8().map_err(eof)?;
        let mut is_wide = false;
        let mut operands = Vec::new();
        let mut switch = None;

        match operands::operand_shape(opcode) {
            None => return Err(DecodeError::UnknownOpcode { pc, opcode }),
            Some(OperandShape::Fixed(specs)) => {
                self.read_operands(&mut reader, specs, pc, pool, &mut operands)?;
            }
            Some(OperandShape::Wide) => {
                is_wide = true;
                opcode = reader.read_u8().map_err(eof)?;
                let specs = wide_operand_specs(opcode)
                    .ok_or(DecodeError::InvalidWideTarget { pc, opcode })?;
                self.read_operands(&mut reader, specs, pc, pool, &mut operands)?;
            }
            Some(OperandShape::TableSwitch) | Some(OperandShape::LookupSwitch) => {
                let table = read_switch(&mut reader, opcode, pc, &mut operands)?;
                self.branch_offset = Some(table.default_offset);
                self.branch_target = Some(table.default_target);
                switch = Some(table);
            }
        }

        if let Some(register) = operands::implicit_register(opcode) {
            self.register = Some(register);
        }
        self.is_register_load = operands::is_register_load(opcode);
        self.is_register_store = operands::is_register_store(opcode);
        self.ref_field_is_static = match opcode {
            opcodes::GETSTATIC | opcodes::PUTSTATIC => Some(true),
            opcodes::GETFIELD | opcodes::PUTFIELD => Some(false),
            _ => None,
        };
        self.history.push(opcode);

        let current = self.current.insert(DecodedInstruction {
            pc,
            opcode,
            operands,
            is_wide,
            next_pc: reader.offset() as u32,
            switch,
        });
        Ok(current)
    }

    fn read_operands(
        &mut self,
        reader: &mut ByteReader<'_>,
        specs: &[OperandSpec],
        pc: u32,
        pool: &'a ConstantPool,
        operands: &mut Vec<Operand>,
    ) -> Result<(), DecodeError> {
        for spec in specs {
            let value = read_operand(reader, *spec).map_err(|err| DecodeError::Truncated {
                pc,
                needed: err.needed,
            })?;
            let mut target = None;
            match spec.meaning {
                OperandMeaning::Branch => {
                    let branch_target = (pc as i32).wrapping_add(value);
                    self.branch_offset = Some(value);
                    self.branch_target = Some(branch_target);
                    self.branch_fall_through = Some(reader.offset() as u32);
                    target = Some(branch_target);
                }
                OperandMeaning::ConstantPool => self.resolve_constant(value as u16, pc, pool)?,
                OperandMeaning::Register => self.register = Some(value as u16),
                OperandMeaning::Int | OperandMeaning::UInt => self.int_constant = Some(value),
                OperandMeaning::Padding => {}
            }
            operands.push(Operand {
                meaning: spec.meaning,
                width: spec.width,
                value,
                target,
            });
        }
        Ok(())
    }

    fn resolve_constant(
        &mut self,
        index: u16,
        pc: u32,
        pool: &'a ConstantPool,
    ) -> Result<(), DecodeError> {
        let pool_error = |source| DecodeError::ConstantPool { pc, source };
        let entry = pool.resolve(index).map_err(pool_error)?;
        match entry {
            ConstantPoolEntry::Class { .. } => {
                self.class_constant = Some(pool.class_name_at(index).map_err(pool_error)?);
            }
            ConstantPoolEntry::Integer(value) => self.int_constant = Some(*value),
            ConstantPoolEntry::Long(value) => self.long_constant = Some(*value),
            ConstantPoolEntry::Float(value) => self.float_constant = Some(*value),
            ConstantPoolEntry::Double(value) => self.double_constant = Some(*value),
            ConstantPoolEntry::String { string_index } => {
                self.string_constant = Some(pool.utf8_at(*string_index).map_err(pool_error)?);
            }
            ConstantPoolEntry::InvokeDynamic {
                name_and_type_index,
                ..
            }
            | ConstantPoolEntry::Dynamic {
                name_and_type_index,
                ..
            } => {
                let (name, sig) = pool
                    .name_and_type_at(*name_and_type_index)
                    .map_err(pool_error)?;
                self.name_constant = Some(name);
                self.sig_constant = Some(sig);
            }
            ConstantPoolEntry::Fieldref { .. }
            | ConstantPoolEntry::Methodref { .. }
            | ConstantPoolEntry::InterfaceMethodref { .. } => {
                let member = pool.member_ref_at(index).map_err(pool_error)?;
                self.class_constant = Some(member.class_name);
                self.name_constant = Some(member.name);
                self.sig_constant = Some(member.descriptor);
            }
            _ => {}
        }
        self.constant_ref = Some((index, entry));
        Ok(())
    }

    /// The instruction most recently decoded.
    pub fn current(&self) -> Result<&DecodedInstruction, NotAvailable> {
        self.current
            .as_ref()
            .ok_or(NotAvailable::new("current_instruction"))
    }

    pub fn opcode(&self) -> Result<u8, NotAvailable> {
        self.current
            .as_ref()
            .map(|insn| insn.opcode)
            .ok_or(NotAvailable::new("opcode"))
    }

    pub fn pc(&self) -> Result<u32, NotAvailable> {
        self.current
            .as_ref()
            .map(|insn| insn.pc)
            .ok_or(NotAvailable::new("pc"))
    }

    pub fn next_pc(&self) -> Result<u32, NotAvailable> {
        self.current
            .as_ref()
            .map(|insn| insn.next_pc)
            .ok_or(NotAvailable::new("next_pc"))
    }

    pub fn is_wide(&self) -> Result<bool, NotAvailable> {
        self.current
            .as_ref()
            .map(|insn| insn.is_wide)
            .ok_or(NotAvailable::new("is_wide"))
    }

    /// Offset of the branch operand; for switches, the default offset.
    pub fn branch_offset(&self) -> Result<i32, NotAvailable> {
        self.branch_offset.ok_or(NotAvailable::new("branch_offset"))
    }

    pub fn branch_target(&self) -> Result<i32, NotAvailable> {
        self.branch_target.ok_or(NotAvailable::new("branch_target"))
    }

    pub fn branch_fall_through(&self) -> Result<u32, NotAvailable> {
        self.branch_fall_through
            .ok_or(NotAvailable::new("branch_fall_through"))
    }

    pub fn switch_table(&self) -> Result<&SwitchTable, NotAvailable> {
        self.current
            .as_ref()
            .and_then(|insn| insn.switch.as_ref())
            .ok_or(NotAvailable::new("switch_table"))
    }

    pub fn default_switch_offset(&self) -> Result<i32, NotAvailable> {
        self.current
            .as_ref()
            .and_then(|insn| insn.switch.as_ref())
            .map(|table| table.default_offset)
            .ok_or(NotAvailable::new("default_switch_offset"))
    }

    pub fn register_operand(&self) -> Result<u16, NotAvailable> {
        self.register.ok_or(NotAvailable::new("register_operand"))
    }

    pub fn is_register_load(&self) -> bool {
        self.is_register_load
    }

    pub fn is_register_store(&self) -> bool {
        self.is_register_store
    }

    pub fn int_constant(&self) -> Result<i32, NotAvailable> {
        self.int_constant.ok_or(NotAvailable::new("int_constant"))
    }

    pub fn long_constant(&self) -> Result<i64, NotAvailable> {
        self.long_constant.ok_or(NotAvailable::new("long_constant"))
    }

    pub fn float_constant(&self) -> Result<f32, NotAvailable> {
        self.float_constant.ok_or(NotAvailable::new("float_constant"))
    }

    pub fn double_constant(&self) -> Result<f64, NotAvailable> {
        self.double_constant
            .ok_or(NotAvailable::new("double_constant"))
    }

    pub fn string_constant_operand(&self) -> Result<&'a str, NotAvailable> {
        self.string_constant
            .ok_or(NotAvailable::new("string_constant_operand"))
    }

    /// Slash-separated class name of a class or member reference operand.
    pub fn class_constant_operand(&self) -> Result<&'a str, NotAvailable> {
        self.class_constant
            .ok_or(NotAvailable::new("class_constant_operand"))
    }

    pub fn dotted_class_constant_operand(&self) -> Result<String, NotAvailable> {
        self.class_constant
            .map(|name| name.replace('/', "."))
            .ok_or(NotAvailable::new("dotted_class_constant_operand"))
    }

    pub fn name_constant_operand(&self) -> Result<&'a str, NotAvailable> {
        self.name_constant
            .ok_or(NotAvailable::new("name_constant_operand"))
    }

    pub fn sig_constant_operand(&self) -> Result<&'a str, NotAvailable> {
        self.sig_constant
            .ok_or(NotAvailable::new("sig_constant_operand"))
    }

    /// `dotted.Class.name : signature` for a member reference operand.
    pub fn ref_constant_operand(&self) -> Result<String, NotAvailable> {
        match (self.class_constant, self.name_constant, self.sig_constant) {
            (Some(class), Some(name), Some(sig)) => {
                Ok(format!("{}.{} : {}", class.replace('/', "."), name, sig))
            }
            _ => Err(NotAvailable::new("ref_constant_operand")),
        }
    }

    /// Pool index and entry referenced by the current instruction.
    pub fn constant_ref_operand(&self) -> Result<(u16, &'a ConstantPoolEntry), NotAvailable> {
        self.constant_ref
            .ok_or(NotAvailable::new("constant_ref_operand"))
    }

    /// Whether the current field access targets a static field.
    pub fn ref_field_is_static(&self) -> Result<bool, NotAvailable> {
        self.ref_field_is_static
            .ok_or(NotAvailable::new("ref_field_is_static"))
    }

    pub fn is_method_call(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|insn| operands::is_method_call(insn.opcode))
    }

    /// Opcode `offset` instructions back; 0 is the current one. Returns
    /// `nop` past the start of the method or beyond the history window.
    pub fn prev_opcode(&self, offset: usize) -> u8 {
        self.history.get(offset)
    }

    pub fn history(&self) -> &OpcodeHistory {
        &self.history
    }
}

fn read_operand(reader: &mut ByteReader<'_>, spec: OperandSpec) -> Result<i32, UnexpectedEof> {
    let unsigned = spec.meaning.is_unsigned();
    let value = match (spec.width, unsigned) {
        (OperandWidth::Byte, true) => reader.read_u8()? as i32,
        (OperandWidth::Byte, false) => reader.read_i8()? as i32,
        (OperandWidth::Short, true) => reader.read_u16()? as i32,
        (OperandWidth::Short, false) => reader.read_i16()? as i32,
        (OperandWidth::Int, _) => reader.read_i32()?,
    };
    Ok(value)
}

/// Alignment bytes between a switch opcode at `pc` and its first operand.
pub fn switch_padding(pc: u32) -> u32 {
    (4 - ((pc + 1) % 4)) % 4
}

fn read_switch(
    reader: &mut ByteReader<'_>,
    opcode: u8,
    pc: u32,
    operands: &mut Vec<Operand>,
) -> Result<SwitchTable, DecodeError> {
    let eof = |err: UnexpectedEof| DecodeError::Truncated {
        pc,
        needed: err.needed,
    };
    let padding = switch_padding(pc);
    reader.skip(padding as usize).map_err(eof)?;
    let default_offset = reader.read_i32().map_err(eof)?;
    let default_target = (pc as i32).wrapping_add(default_offset);
    operands.push(Operand {
        meaning: OperandMeaning::Branch,
        width: OperandWidth::Int,
        value: default_offset,
        target: Some(default_target),
    });
    let int_operand = |value| Operand {
        meaning: OperandMeaning::Int,
        width: OperandWidth::Int,
        value,
        target: None,
    };

    let (kind, mut entries) = if opcode == opcodes::TABLESWITCH {
        let low = reader.read_i32().map_err(eof)?;
        let high = reader.read_i32().map_err(eof)?;
        if high < low {
            return Err(DecodeError::InvalidSwitch {
                pc,
                reason: "tableswitch high is below low",
            });
        }
        operands.push(int_operand(low));
        operands.push(int_operand(high));
        let count = (high as i64 - low as i64 + 1) as usize;
        ensure_remaining(reader, count * 4, pc)?;
        let mut entries = Vec::with_capacity(count);
        for position in 0..count {
            let offset = reader.read_i32().map_err(eof)?;
            entries.push(SwitchEntry {
                key: low.wrapping_add(position as i32),
                offset,
                target: (pc as i32).wrapping_add(offset),
            });
        }
        (SwitchKind::Table { low, high }, entries)
    } else {
        let npairs = reader.read_i32().map_err(eof)?;
        if npairs < 0 {
            return Err(DecodeError::InvalidSwitch {
                pc,
                reason: "lookupswitch pair count is negative",
            });
        }
        operands.push(int_operand(npairs));
        let count = npairs as usize;
        ensure_remaining(reader, count * 8, pc)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = reader.read_i32().map_err(eof)?;
            let offset = reader.read_i32().map_err(eof)?;
            entries.push(SwitchEntry {
                key,
                offset,
                target: (pc as i32).wrapping_add(offset),
            });
        }
        (SwitchKind::Lookup { npairs }, entries)
    };
    entries.sort_by_key(|entry| entry.offset);

    Ok(SwitchTable {
        kind,
        padding: padding as u8,
        default_offset,
        default_target,
        entries,
    })
}

// Checked up front so a corrupt count cannot trigger a huge allocation.
fn ensure_remaining(reader: &ByteReader<'_>, needed: usize, pc: u32) -> Result<(), DecodeError> {
    if reader.remaining() < needed {
        return Err(DecodeError::Truncated {
            pc,
            needed: needed - reader.remaining(),
        });
    }
    Ok(())
}

/// Decodes a whole code array with a fresh state, stopping at the first error.
pub fn decode_method(
    code: &[u8],
    pool: &ConstantPool,
) -> Result<Vec<DecodedInstruction>, DecodeError> {
    let mut state = DecodeState::new();
    let mut instructions = Vec::new();
    let mut pc = 0u32;
    while (pc as usize) < code.len() {
        let insn = state.decode_at(code, pc, pool)?;
        pc = insn.next_pc;
        instructions.push(insn.clone());
    }
    Ok(instructions)
}
