//! Typed class, field, method, and code attributes.

use tracing::warn;

use crate::constant_pool::ConstantPool;
use crate::error::ClassFormatError;
use crate::reader::{ByteReader, ReadResult, UnexpectedEof};

pub const CODE: &str = "Code";
pub const CONSTANT_VALUE: &str = "ConstantValue";
pub const EXCEPTIONS: &str = "Exceptions";
pub const INNER_CLASSES: &str = "InnerClasses";
pub const ENCLOSING_METHOD: &str = "EnclosingMethod";
pub const SYNTHETIC: &str = "Synthetic";
pub const SIGNATURE: &str = "Signature";
pub const SOURCE_FILE: &str = "SourceFile";
pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
pub const DEPRECATED: &str = "Deprecated";
pub const STACK_MAP_TABLE: &str = "StackMapTable";
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeInvisibleParameterAnnotations";
pub const ANNOTATION_DEFAULT: &str = "AnnotationDefault";

#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Code(CodeAttribute),
    ConstantValue { value_index: u16 },
    Exceptions { exception_index_table: Vec<u16> },
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod { class_index: u16, method_index: u16 },
    Synthetic,
    Signature { signature_index: u16 },
    SourceFile { sourcefile_index: u16 },
    LineNumberTable(Vec<LineNumber>),
    LocalVariableTable(Vec<LocalVariable>),
    Deprecated,
    StackMapTable(Vec<StackMapFrame>),
    /// Annotation attributes keep their raw bytes; they are decoded lazily
    /// during traversal so that malformed data only affects that attribute.
    RuntimeVisibleAnnotations(Vec<u8>),
    RuntimeInvisibleAnnotations(Vec<u8>),
    RuntimeVisibleParameterAnnotations(Vec<u8>),
    RuntimeInvisibleParameterAnnotations(Vec<u8>),
    AnnotationDefault(Vec<u8>),
    Unknown { name: String, data: Vec<u8> },
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Code(_) => CODE,
            Attribute::ConstantValue { .. } => CONSTANT_VALUE,
            Attribute::Exceptions { .. } => EXCEPTIONS,
            Attribute::InnerClasses(_) => INNER_CLASSES,
            Attribute::EnclosingMethod { .. } => ENCLOSING_METHOD,
            Attribute::Synthetic => SYNTHETIC,
            Attribute::Signature { .. } => SIGNATURE,
            Attribute::SourceFile { .. } => SOURCE_FILE,
            Attribute::LineNumberTable(_) => LINE_NUMBER_TABLE,
            Attribute::LocalVariableTable(_) => LOCAL_VARIABLE_TABLE,
            Attribute::Deprecated => DEPRECATED,
            Attribute::StackMapTable(_) => STACK_MAP_TABLE,
            Attribute::RuntimeVisibleAnnotations(_) => RUNTIME_VISIBLE_ANNOTATIONS,
            Attribute::RuntimeInvisibleAnnotations(_) => RUNTIME_INVISIBLE_ANNOTATIONS,
            Attribute::RuntimeVisibleParameterAnnotations(_) => {
                RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
            }
            Attribute::RuntimeInvisibleParameterAnnotations(_) => {
                RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS
            }
            Attribute::AnnotationDefault(_) => ANNOTATION_DEFAULT,
            Attribute::Unknown { name, .. } => name,
        }
    }
}

/// Body of a method's Code attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<CodeException>,
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    pub fn line_numbers(&self) -> impl Iterator<Item = &LineNumber> + '_ {
        self.attributes.iter().flat_map(|attribute| match attribute {
            Attribute::LineNumberTable(lines) => lines.as_slice(),
            _ => &[],
        })
    }

    /// Source line covering `pc`, from the LineNumberTable if present.
    pub fn line_for_pc(&self, pc: u32) -> Option<u32> {
        self.line_numbers()
            .filter(|entry| entry.start_pc as u32 <= pc)
            .max_by_key(|entry| entry.start_pc)
            .map(|entry| entry.line_number as u32)
    }
}

/// Exception table entry of a Code attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeException {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Class index of the caught type; 0 catches everything.
    pub catch_type: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class_info_index: u16,
    pub outer_class_info_index: u16,
    pub inner_name_index: u16,
    pub inner_class_access_flags: u16,
}

/// Verification type of a stack map local or stack slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object { class_index: u16 },
    Uninitialized { offset: u16 },
}

/// One StackMapTable frame with its compressed form expanded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackMapFrame {
    pub frame_type: u8,
    pub offset_delta: u16,
    /// Locals appended (`append_frame`) or listed (`full_frame`).
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
    /// Locals removed by a `chop_frame`.
    pub chopped: u8,
}

pub(crate) fn parse_attributes(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Attribute>, ClassFormatError> {
    let count = reader.read_u16().map_err(|err| truncated(err, "attribute count"))?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        attributes.push(parse_attribute(reader, pool)?);
    }
    Ok(attributes)
}

/// Reads one attribute. Only a broken name or length fails the class; a
/// malformed body is kept as [`Attribute::Unknown`] so the rest of the
/// class, including other methods, stays usable.
fn parse_attribute(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Attribute, ClassFormatError> {
    let name_index = reader.read_u16().map_err(|err| truncated(err, "attribute name"))?;
    let length = reader.read_u32().map_err(|err| truncated(err, "attribute length"))?;
    let data = reader
        .read_bytes(length as usize)
        .map_err(|err| truncated(err, "attribute body"))?;
    let name = pool.utf8_at(name_index)?;
    match parse_attribute_body(name, data, pool) {
        Ok(attribute) => Ok(attribute),
        Err(err) => {
            warn!(attribute = name, "keeping malformed attribute as raw bytes: {err}");
            Ok(Attribute::Unknown {
                name: name.to_string(),
                data: data.to_vec(),
            })
        }
    }
}

fn parse_attribute_body(
    name: &str,
    data: &[u8],
    pool: &ConstantPool,
) -> Result<Attribute, ClassFormatError> {
    let mut body = ByteReader::new(data);
    let malformed = |err: UnexpectedEof| ClassFormatError::MalformedAttribute {
        name: name.to_string(),
        reason: format!("truncated at offset {}", err.offset),
    };
    let attribute = match name {
        CODE => Attribute::Code(parse_code(&mut body, pool, name)?),
        CONSTANT_VALUE => Attribute::ConstantValue {
            value_index: body.read_u16().map_err(malformed)?,
        },
        EXCEPTIONS => Attribute::Exceptions {
            exception_index_table: read_u16_table(&mut body).map_err(malformed)?,
        },
        INNER_CLASSES => Attribute::InnerClasses(parse_inner_classes(&mut body).map_err(malformed)?),
        ENCLOSING_METHOD => Attribute::EnclosingMethod {
            class_index: body.read_u16().map_err(malformed)?,
            method_index: body.read_u16().map_err(malformed)?,
        },
        SYNTHETIC => Attribute::Synthetic,
        SIGNATURE => Attribute::Signature {
            signature_index: body.read_u16().map_err(malformed)?,
        },
        SOURCE_FILE => Attribute::SourceFile {
            sourcefile_index: body.read_u16().map_err(malformed)?,
        },
        LINE_NUMBER_TABLE => {
            Attribute::LineNumberTable(parse_line_numbers(&mut body).map_err(malformed)?)
        }
        LOCAL_VARIABLE_TABLE => {
            Attribute::LocalVariableTable(parse_local_variables(&mut body).map_err(malformed)?)
        }
        DEPRECATED => Attribute::Deprecated,
        STACK_MAP_TABLE => Attribute::StackMapTable(parse_stack_map(&mut body, name)?),
        RUNTIME_VISIBLE_ANNOTATIONS => Attribute::RuntimeVisibleAnnotations(data.to_vec()),
        RUNTIME_INVISIBLE_ANNOTATIONS => Attribute::RuntimeInvisibleAnnotations(data.to_vec()),
        RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS => {
            Attribute::RuntimeVisibleParameterAnnotations(data.to_vec())
        }
        RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
            Attribute::RuntimeInvisibleParameterAnnotations(data.to_vec())
        }
        ANNOTATION_DEFAULT => Attribute::AnnotationDefault(data.to_vec()),
        _ => Attribute::Unknown {
            name: name.to_string(),
            data: data.to_vec(),
        },
    };
    Ok(attribute)
}

fn parse_code(
    body: &mut ByteReader<'_>,
    pool: &ConstantPool,
    name: &str,
) -> Result<CodeAttribute, ClassFormatError> {
    let malformed = |err: UnexpectedEof| ClassFormatError::MalformedAttribute {
        name: name.to_string(),
        reason: format!("truncated at offset {}", err.offset),
    };
    let max_stack = body.read_u16().map_err(malformed)?;
    let max_locals = body.read_u16().map_err(malformed)?;
    let code_length = body.read_u32().map_err(malformed)?;
    let code = body.read_bytes(code_length as usize).map_err(malformed)?.to_vec();
    let exception_count = body.read_u16().map_err(malformed)?;
    let mut exception_table = Vec::with_capacity(exception_count as usize);
    for _ in 0..exception_count {
        exception_table.push(CodeException {
            start_pc: body.read_u16().map_err(malformed)?,
            end_pc: body.read_u16().map_err(malformed)?,
            handler_pc: body.read_u16().map_err(malformed)?,
            catch_type: body.read_u16().map_err(malformed)?,
        });
    }
    let attributes = parse_attributes(body, pool)?;
    Ok(CodeAttribute {
        max_stack,
        max_locals,
        code,
        exception_table,
        attributes,
    })
}

fn read_u16_table(body: &mut ByteReader<'_>) -> ReadResult<Vec<u16>> {
    let count = body.read_u16()?;
    (0..count).map(|_| body.read_u16()).collect()
}

fn parse_inner_classes(body: &mut ByteReader<'_>) -> ReadResult<Vec<InnerClass>> {
    let count = body.read_u16()?;
    let mut classes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        classes.push(InnerClass {
            inner_class_info_index: body.read_u16()?,
            outer_class_info_index: body.read_u16()?,
            inner_name_index: body.read_u16()?,
            inner_class_access_flags: body.read_u16()?,
        });
    }
    Ok(classes)
}

fn parse_line_numbers(body: &mut ByteReader<'_>) -> ReadResult<Vec<LineNumber>> {
    let count = body.read_u16()?;
    let mut lines = Vec::with_capacity(count as usize);
    for _ in 0..count {
        lines.push(LineNumber {
            start_pc: body.read_u16()?,
            line_number: body.read_u16()?,
        });
    }
    Ok(lines)
}

fn parse_local_variables(body: &mut ByteReader<'_>) -> ReadResult<Vec<LocalVariable>> {
    let count = body.read_u16()?;
    let mut locals = Vec::with_capacity(count as usize);
    for _ in 0..count {
        locals.push(LocalVariable {
            start_pc: body.read_u16()?,
            length: body.read_u16()?,
            name_index: body.read_u16()?,
            descriptor_index: body.read_u16()?,
            index: body.read_u16()?,
        });
    }
    Ok(locals)
}

fn parse_stack_map(
    body: &mut ByteReader<'_>,
    name: &str,
) -> Result<Vec<StackMapFrame>, ClassFormatError> {
    let malformed = |reason: String| ClassFormatError::MalformedAttribute {
        name: name.to_string(),
        reason,
    };
    let eof = |err: UnexpectedEof| malformed(format!("truncated at offset {}", err.offset));
    let count = body.read_u16().map_err(eof)?;
    let mut frames = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let frame_type = body.read_u8().map_err(eof)?;
        let mut frame = StackMapFrame {
            frame_type,
            offset_delta: 0,
            locals: Vec::new(),
            stack: Vec::new(),
            chopped: 0,
        };
        match frame_type {
            0..=63 => frame.offset_delta = frame_type as u16,
            64..=127 => {
                frame.offset_delta = (frame_type - 64) as u16;
                frame.stack.push(read_verification_type(body, &malformed)?);
            }
            247 => {
                frame.offset_delta = body.read_u16().map_err(eof)?;
                frame.stack.push(read_verification_type(body, &malformed)?);
            }
            248..=250 => {
                frame.offset_delta = body.read_u16().map_err(eof)?;
                frame.chopped = 251 - frame_type;
            }
            251 => frame.offset_delta = body.read_u16().map_err(eof)?,
            252..=254 => {
                frame.offset_delta = body.read_u16().map_err(eof)?;
                for _ in 0..(frame_type - 251) {
                    frame.locals.push(read_verification_type(body, &malformed)?);
                }
            }
            255 => {
                frame.offset_delta = body.read_u16().map_err(eof)?;
                let locals = body.read_u16().map_err(eof)?;
                for _ in 0..locals {
                    frame.locals.push(read_verification_type(body, &malformed)?);
                }
                let stack = body.read_u16().map_err(eof)?;
                for _ in 0..stack {
                    frame.stack.push(read_verification_type(body, &malformed)?);
                }
            }
            reserved => return Err(malformed(format!("reserved frame type {reserved}"))),
        }
        frames.push(frame);
    }
    Ok(frames)
}

fn read_verification_type(
    body: &mut ByteReader<'_>,
    malformed: &impl Fn(String) -> ClassFormatError,
) -> Result<VerificationType, ClassFormatError> {
    let eof = |err: UnexpectedEof| malformed(format!("truncated at offset {}", err.offset));
    let tag = body.read_u8().map_err(eof)?;
    let ty = match tag {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => VerificationType::Object {
            class_index: body.read_u16().map_err(eof)?,
        },
        8 => VerificationType::Uninitialized {
            offset: body.read_u16().map_err(eof)?,
        },
        other => return Err(malformed(format!("unknown verification type {other}"))),
    };
    Ok(ty)
}

fn truncated(err: UnexpectedEof, what: &'static str) -> ClassFormatError {
    ClassFormatError::Truncated {
        offset: err.offset,
        what,
    }
}
