//! Annotation attribute decoding.
//!
//! Annotation bytes are kept raw by the class parser and decoded here on
//! demand. A failure is returned to the caller, which decides whether to
//! drop the attribute; nothing here is fatal to the surrounding class.

use serde::Serialize;

use crate::constant_pool::ConstantPool;
use crate::descriptor::dotted_type_name;
use crate::error::AnnotationError;
use crate::reader::{ByteReader, UnexpectedEof};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    RuntimeVisible,
    RuntimeInvisible,
}

impl Visibility {
    pub fn is_runtime_visible(self) -> bool {
        self == Visibility::RuntimeVisible
    }
}

/// Decoded element value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnnotationValue {
    Byte(i8),
    /// UTF-16 code unit.
    Char(u16),
    Double(f64),
    Float(f32),
    Integer(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    String(String),
    Array(Vec<AnnotationValue>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnotationInstance {
    /// Dotted annotation type name, e.g. `javax.annotation.Nonnull`.
    pub type_name: String,
    /// Element name/value pairs in attribute order.
    pub elements: Vec<(String, AnnotationValue)>,
    pub visibility: Visibility,
}

impl AnnotationInstance {
    pub fn get(&self, name: &str) -> Option<&AnnotationValue> {
        self.elements
            .iter()
            .find(|(element, _)| element == name)
            .map(|(_, value)| value)
    }
}

/// Decodes a `Runtime{Visible,Invisible}Annotations` body.
pub fn decode_annotations(
    data: &[u8],
    pool: &ConstantPool,
    visibility: Visibility,
) -> Result<Vec<AnnotationInstance>, AnnotationError> {
    let mut reader = ByteReader::new(data);
    read_annotation_list(&mut reader, pool, visibility)
}

/// Decodes a `Runtime{Visible,Invisible}ParameterAnnotations` body into one
/// list per parameter listed in the attribute.
pub fn decode_parameter_annotations(
    data: &[u8],
    pool: &ConstantPool,
    visibility: Visibility,
) -> Result<Vec<Vec<AnnotationInstance>>, AnnotationError> {
    let mut reader = ByteReader::new(data);
    let parameters = reader.read_u8().map_err(eof)?;
    (0..parameters)
        .map(|_| read_annotation_list(&mut reader, pool, visibility))
        .collect()
}

/// Shift applied to parameter annotation indexes. Compilers omit synthetic
/// leading parameters (such as an inner class's outer instance) from the
/// attribute, so a shorter list is aligned to the end of the descriptor.
pub fn parameter_index_offset(descriptor_params: usize, listed_params: usize) -> usize {
    usize::from(descriptor_params > listed_params)
}

fn read_annotation_list(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
    visibility: Visibility,
) -> Result<Vec<AnnotationInstance>, AnnotationError> {
    let count = reader.read_u16().map_err(eof)?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let type_index = reader.read_u16().map_err(eof)?;
        let type_name = dotted_type_name(pool.utf8_at(type_index)?);
        let pairs = reader.read_u16().map_err(eof)?;
        let mut elements = Vec::with_capacity(pairs as usize);
        for _ in 0..pairs {
            let name_index = reader.read_u16().map_err(eof)?;
            let name = pool.utf8_at(name_index)?.to_string();
            elements.push((name, read_value(reader, pool)?));
        }
        annotations.push(AnnotationInstance {
            type_name,
            elements,
            visibility,
        });
    }
    Ok(annotations)
}

fn read_value(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<AnnotationValue, AnnotationError> {
    let tag = reader.read_u8().map_err(eof)? as char;
    if tag == '[' {
        let count = reader.read_u16().map_err(eof)?;
        let values = (0..count)
            .map(|_| read_value(reader, pool))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(AnnotationValue::Array(values));
    }
    if !matches!(tag, 'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' | 's') {
        return Err(AnnotationError::UnknownTag(tag));
    }
    let index = reader.read_u16().map_err(eof)?;
    let value = match tag {
        'B' => AnnotationValue::Byte(pool.integer_at(index)? as i8),
        'C' => AnnotationValue::Char(pool.integer_at(index)? as u16),
        'D' => AnnotationValue::Double(pool.double_at(index)?),
        'F' => AnnotationValue::Float(pool.float_at(index)?),
        'I' => AnnotationValue::Integer(pool.integer_at(index)?),
        'J' => AnnotationValue::Long(pool.long_at(index)?),
        'S' => AnnotationValue::Short(pool.integer_at(index)? as i16),
        'Z' => AnnotationValue::Boolean(pool.integer_at(index)? != 0),
        _ => AnnotationValue::String(pool.utf8_at(index)?.to_string()),
    };
    Ok(value)
}

fn eof(err: UnexpectedEof) -> AnnotationError {
    AnnotationError::Truncated(err.offset)
}
