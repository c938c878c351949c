//! Static operand tables: byte width and meaning of every fixed operand.

use serde::Serialize;

use crate::opcodes;

/// What a raw operand represents, independent of its byte width.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandMeaning {
    /// Signed immediate.
    Int,
    /// Unsigned immediate.
    UInt,
    /// Constant pool index.
    ConstantPool,
    /// Local variable slot.
    Register,
    /// Branch offset relative to the instruction's pc.
    Branch,
    /// Alignment or reserved byte.
    Padding,
}

impl OperandMeaning {
    /// Whether operands of this meaning are read zero-extended.
    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            OperandMeaning::UInt
                | OperandMeaning::ConstantPool
                | OperandMeaning::Register
                | OperandMeaning::Padding
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandWidth {
    Byte,
    Short,
    Int,
}

impl OperandWidth {
    pub fn bytes(self) -> usize {
        match self {
            OperandWidth::Byte => 1,
            OperandWidth::Short => 2,
            OperandWidth::Int => 4,
        }
    }
}

/// Width and meaning of one fixed operand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OperandSpec {
    pub width: OperandWidth,
    pub meaning: OperandMeaning,
}

const fn spec(width: OperandWidth, meaning: OperandMeaning) -> OperandSpec {
    OperandSpec { width, meaning }
}

const NONE: &[OperandSpec] = &[];
const BYTE_INT: &[OperandSpec] = &[spec(OperandWidth::Byte, OperandMeaning::Int)];
const SHORT_INT: &[OperandSpec] = &[spec(OperandWidth::Short, OperandMeaning::Int)];
const BYTE_UINT: &[OperandSpec] = &[spec(OperandWidth::Byte, OperandMeaning::UInt)];
const BYTE_CP: &[OperandSpec] = &[spec(OperandWidth::Byte, OperandMeaning::ConstantPool)];
const SHORT_CP: &[OperandSpec] = &[spec(OperandWidth::Short, OperandMeaning::ConstantPool)];
const BYTE_REGISTER: &[OperandSpec] = &[spec(OperandWidth::Byte, OperandMeaning::Register)];
const SHORT_BRANCH: &[OperandSpec] = &[spec(OperandWidth::Short, OperandMeaning::Branch)];
const INT_BRANCH: &[OperandSpec] = &[spec(OperandWidth::Int, OperandMeaning::Branch)];
const IINC_OPERANDS: &[OperandSpec] = &[
    spec(OperandWidth::Byte, OperandMeaning::Register),
    spec(OperandWidth::Byte, OperandMeaning::Int),
];
const INVOKE_PADDED: &[OperandSpec] = &[
    spec(OperandWidth::Short, OperandMeaning::ConstantPool),
    spec(OperandWidth::Byte, OperandMeaning::Padding),
    spec(OperandWidth::Byte, OperandMeaning::Padding),
];
const MULTIANEWARRAY_OPERANDS: &[OperandSpec] = &[
    spec(OperandWidth::Short, OperandMeaning::ConstantPool),
    spec(OperandWidth::Byte, OperandMeaning::UInt),
];
const WIDE_REGISTER: &[OperandSpec] = &[spec(OperandWidth::Short, OperandMeaning::Register)];
const WIDE_IINC_OPERANDS: &[OperandSpec] = &[
    spec(OperandWidth::Short, OperandMeaning::Register),
    spec(OperandWidth::Short, OperandMeaning::Int),
];

/// Operand layout of an opcode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperandShape {
    Fixed(&'static [OperandSpec]),
    /// Padded jump table with `low`/`high` bounds.
    TableSwitch,
    /// Padded sorted match/offset pairs.
    LookupSwitch,
    /// Prefix widening the following opcode's operands.
    Wide,
}

/// Operand layout for `opcode`, or `None` when the opcode is unassigned.
pub fn operand_shape(opcode: u8) -> Option<OperandShape> {
    use opcodes::*;

    let fixed = match opcode {
        NOP..=DCONST_1 => NONE,
        BIPUSH => BYTE_INT,
        SIPUSH => SHORT_INT,
        LDC => BYTE_CP,
        LDC_W | LDC2_W => SHORT_CP,
        ILOAD..=ALOAD => BYTE_REGISTER,
        ILOAD_0..=SALOAD => NONE,
        ISTORE..=ASTORE => BYTE_REGISTER,
        ISTORE_0..=LXOR => NONE,
        IINC => IINC_OPERANDS,
        I2L..=DCMPG => NONE,
        IFEQ..=JSR => SHORT_BRANCH,
        RET => BYTE_REGISTER,
        TABLESWITCH => return Some(OperandShape::TableSwitch),
        LOOKUPSWITCH => return Some(OperandShape::LookupSwitch),
        IRETURN..=RETURN => NONE,
        GETSTATIC..=INVOKESTATIC => SHORT_CP,
        INVOKEINTERFACE | INVOKEDYNAMIC => INVOKE_PADDED,
        NEW => SHORT_CP,
        NEWARRAY => BYTE_UINT,
        ANEWARRAY => SHORT_CP,
        ARRAYLENGTH | ATHROW => NONE,
        CHECKCAST | INSTANCEOF => SHORT_CP,
        MONITORENTER | MONITOREXIT => NONE,
        WIDE => return Some(OperandShape::Wide),
        MULTIANEWARRAY => MULTIANEWARRAY_OPERANDS,
        IFNULL | IFNONNULL => SHORT_BRANCH,
        GOTO_W | JSR_W => INT_BRANCH,
        BREAKPOINT | IMPDEP1 | IMPDEP2 => NONE,
        _ => return None,
    };
    Some(OperandShape::Fixed(fixed))
}

/// Operand layout of an opcode following a `wide` prefix, or `None` if the
/// opcode cannot be widened.
pub fn wide_operand_specs(opcode: u8) -> Option<&'static [OperandSpec]> {
    use opcodes::*;

    match opcode {
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Some(WIDE_REGISTER),
        IINC => Some(WIDE_IINC_OPERANDS),
        _ => None,
    }
}

/// Whether the opcode is a conditional or unconditional branch with a
/// single target (switches are excluded).
pub fn is_branch(opcode: u8) -> bool {
    matches!(
        operand_shape(opcode),
        Some(OperandShape::Fixed(specs))
            if specs.first().map(|spec| spec.meaning) == Some(OperandMeaning::Branch)
    )
}

pub fn is_switch(opcode: u8) -> bool {
    opcode == opcodes::TABLESWITCH || opcode == opcodes::LOOKUPSWITCH
}

pub fn is_return(opcode: u8) -> bool {
    (opcodes::IRETURN..=opcodes::RETURN).contains(&opcode)
}

pub fn is_shift(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::ISHL
            | opcodes::LSHL
            | opcodes::ISHR
            | opcodes::LSHR
            | opcodes::IUSHR
            | opcodes::LUSHR
    )
}

pub fn is_method_call(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::INVOKEVIRTUAL
            | opcodes::INVOKESPECIAL
            | opcodes::INVOKESTATIC
            | opcodes::INVOKEINTERFACE
    )
}

/// Whether the opcode loads a local variable (including `iinc`).
pub fn is_register_load(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::ILOAD..=opcodes::ALOAD | opcodes::ILOAD_0..=opcodes::ALOAD_3 | opcodes::IINC
    )
}

/// Whether the opcode stores a local variable (including `iinc`).
pub fn is_register_store(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::ISTORE..=opcodes::ASTORE | opcodes::ISTORE_0..=opcodes::ASTORE_3 | opcodes::IINC
    )
}

/// Register addressed by a `xload_n`/`xstore_n` opcode.
pub fn implicit_register(opcode: u8) -> Option<u16> {
    match opcode {
        opcodes::ILOAD_0..=opcodes::ALOAD_3 => Some(((opcode - opcodes::ILOAD_0) % 4) as u16),
        opcodes::ISTORE_0..=opcodes::ASTORE_3 => Some(((opcode - opcodes::ISTORE_0) % 4) as u16),
        _ => None,
    }
}

/// Whether two branch opcodes test complementary conditions
/// (e.g. `ifeq`/`ifne`). Non-branch opcodes are never opposite.
pub fn are_opposite_branches(first: u8, second: u8) -> bool {
    if !is_branch(first) || !is_branch(second) {
        return false;
    }
    match first {
        opcodes::IFEQ..=opcodes::IF_ACMPNE => {
            // Conditions come in adjacent pairs starting at an even offset from ifeq.
            let pair = (first - opcodes::IFEQ) / 2;
            (opcodes::IFEQ..=opcodes::IF_ACMPNE).contains(&second)
                && second != first
                && (second - opcodes::IFEQ) / 2 == pair
        }
        opcodes::IFNULL => second == opcodes::IFNONNULL,
        opcodes::IFNONNULL => second == opcodes::IFNULL,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    #[test]
    fn every_assigned_opcode_has_a_shape() {
        for opcode in 0u8..=BREAKPOINT {
            assert!(
                operand_shape(opcode).is_some(),
                "missing shape for {}",
                display_name(opcode)
            );
        }
        assert!(operand_shape(IMPDEP1).is_some());
        assert!(operand_shape(0xcb).is_none());
        assert!(operand_shape(0xfd).is_none());
    }

    #[test]
    fn fixed_shapes_match_instruction_lengths() {
        let length = |opcode: u8| match operand_shape(opcode) {
            Some(OperandShape::Fixed(specs)) => {
                1 + specs.iter().map(|spec| spec.width.bytes()).sum::<usize>()
            }
            other => panic!("unexpected shape {other:?}"),
        };
        assert_eq!(length(NOP), 1);
        assert_eq!(length(BIPUSH), 2);
        assert_eq!(length(SIPUSH), 3);
        assert_eq!(length(LDC), 2);
        assert_eq!(length(LDC2_W), 3);
        assert_eq!(length(IINC), 3);
        assert_eq!(length(IF_ICMPLT), 3);
        assert_eq!(length(INVOKEINTERFACE), 5);
        assert_eq!(length(INVOKEDYNAMIC), 5);
        assert_eq!(length(MULTIANEWARRAY), 4);
        assert_eq!(length(GOTO_W), 5);
    }

    #[test]
    fn wide_targets_are_loads_stores_iinc_and_ret() {
        assert_eq!(wide_operand_specs(ILOAD), Some(WIDE_REGISTER));
        assert_eq!(wide_operand_specs(ASTORE), Some(WIDE_REGISTER));
        assert_eq!(wide_operand_specs(RET), Some(WIDE_REGISTER));
        assert_eq!(wide_operand_specs(IINC), Some(WIDE_IINC_OPERANDS));
        assert_eq!(wide_operand_specs(ILOAD_0), None);
        assert_eq!(wide_operand_specs(GOTO), None);
    }

    #[test]
    fn branch_predicates() {
        assert!(is_branch(IFEQ));
        assert!(is_branch(GOTO_W));
        assert!(is_branch(IFNONNULL));
        assert!(!is_branch(TABLESWITCH));
        assert!(!is_branch(RET));
        assert!(is_switch(LOOKUPSWITCH));
        assert!(is_return(ARETURN));
        assert!(!is_return(ATHROW));
        assert!(is_shift(LUSHR));
    }

    #[test]
    fn opposite_branches_pair_up() {
        assert!(are_opposite_branches(IFEQ, IFNE));
        assert!(are_opposite_branches(IFNE, IFEQ));
        assert!(are_opposite_branches(IF_ICMPLT, IF_ICMPGE));
        assert!(are_opposite_branches(IF_ACMPEQ, IF_ACMPNE));
        assert!(are_opposite_branches(IFNULL, IFNONNULL));
        assert!(!are_opposite_branches(IFEQ, IFLT));
        assert!(!are_opposite_branches(IFGE, IFGT));
        assert!(!are_opposite_branches(GOTO, IFEQ));
        assert!(!are_opposite_branches(NOP, IFEQ));
    }

    #[test]
    fn implicit_registers() {
        assert_eq!(implicit_register(ILOAD_0), Some(0));
        assert_eq!(implicit_register(LLOAD_3), Some(3));
        assert_eq!(implicit_register(ALOAD_2), Some(2));
        assert_eq!(implicit_register(DSTORE_1), Some(1));
        assert_eq!(implicit_register(ILOAD), None);
        assert!(is_register_load(IINC) && is_register_store(IINC));
        assert!(is_register_store(ASTORE_3));
        assert!(!is_register_load(ISTORE));
    }
}
