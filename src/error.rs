use thiserror::Error;

/// Constant pool misuse: bad index or wrong entry kind.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConstantPoolError {
    /// Index 0, past the end of the pool, or the reserved slot after a long/double.
    #[error("invalid constant pool index {index} (pool size {size})")]
    InvalidIndex { index: u16, size: u16 },

    #[error("constant pool entry {index} is {found}, expected {expected}")]
    TypeMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
}

/// Structural corruption of the class header, constant pool, or member tables.
///
/// Always fails the whole class.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ClassFormatError {
    #[error("invalid class file magic {0:#010x}")]
    InvalidMagic(u32),

    #[error("class file truncated at offset {offset} while reading {what}")]
    Truncated { offset: usize, what: &'static str },

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("attribute {name} is malformed: {reason}")]
    MalformedAttribute { name: String, reason: String },

    #[error(transparent)]
    ConstantPool(#[from] ConstantPoolError),
}

/// Malformed bytecode inside one method's code array.
///
/// Aborts decoding of that method only.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("code array truncated at pc {pc} (needed {needed} more bytes)")]
    Truncated { pc: u32, needed: usize },

    #[error("unknown opcode {opcode:#04x} at pc {pc}")]
    UnknownOpcode { pc: u32, opcode: u8 },

    #[error("opcode {opcode:#04x} at pc {pc} cannot follow wide")]
    InvalidWideTarget { pc: u32, opcode: u8 },

    #[error("invalid switch at pc {pc}: {reason}")]
    InvalidSwitch { pc: u32, reason: &'static str },

    #[error("operand at pc {pc} references an unusable constant: {source}")]
    ConstantPool {
        pc: u32,
        #[source]
        source: ConstantPoolError,
    },
}

impl DecodeError {
    /// Program counter of the instruction that failed to decode.
    pub fn pc(&self) -> u32 {
        match self {
            DecodeError::Truncated { pc, .. }
            | DecodeError::UnknownOpcode { pc, .. }
            | DecodeError::InvalidWideTarget { pc, .. }
            | DecodeError::InvalidSwitch { pc, .. }
            | DecodeError::ConstantPool { pc, .. } => *pc,
        }
    }
}

/// Malformed annotation attribute bytes.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AnnotationError {
    #[error("unknown annotation element tag {0:?}")]
    UnknownTag(char),

    #[error("annotation data truncated at offset {0}")]
    Truncated(usize),

    #[error(transparent)]
    ConstantPool(#[from] ConstantPoolError),
}

/// An operand accessor was called while the current instruction has no such operand.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{accessor} called but value not available")]
pub struct NotAvailable {
    pub accessor: &'static str,
}

impl NotAvailable {
    pub(crate) fn new(accessor: &'static str) -> Self {
        Self { accessor }
    }
}
