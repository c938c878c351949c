//! Constant pool resolution.

use crate::error::{ClassFormatError, ConstantPoolError};
use crate::reader::ByteReader;

pub const CONSTANT_UTF8: u8 = 1;
pub const CONSTANT_INTEGER: u8 = 3;
pub const CONSTANT_FLOAT: u8 = 4;
pub const CONSTANT_LONG: u8 = 5;
pub const CONSTANT_DOUBLE: u8 = 6;
pub const CONSTANT_CLASS: u8 = 7;
pub const CONSTANT_STRING: u8 = 8;
pub const CONSTANT_FIELDREF: u8 = 9;
pub const CONSTANT_METHODREF: u8 = 10;
pub const CONSTANT_INTERFACE_METHODREF: u8 = 11;
pub const CONSTANT_NAME_AND_TYPE: u8 = 12;
pub const CONSTANT_METHOD_HANDLE: u8 = 15;
pub const CONSTANT_METHOD_TYPE: u8 = 16;
pub const CONSTANT_DYNAMIC: u8 = 17;
pub const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
pub const CONSTANT_MODULE: u8 = 19;
pub const CONSTANT_PACKAGE: u8 = 20;

/// One constant pool entry.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantPoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
}

impl ConstantPoolEntry {
    /// Human-readable kind name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConstantPoolEntry::Utf8(_) => "Utf8",
            ConstantPoolEntry::Integer(_) => "Integer",
            ConstantPoolEntry::Float(_) => "Float",
            ConstantPoolEntry::Long(_) => "Long",
            ConstantPoolEntry::Double(_) => "Double",
            ConstantPoolEntry::Class { .. } => "Class",
            ConstantPoolEntry::String { .. } => "String",
            ConstantPoolEntry::Fieldref { .. } => "Fieldref",
            ConstantPoolEntry::Methodref { .. } => "Methodref",
            ConstantPoolEntry::InterfaceMethodref { .. } => "InterfaceMethodref",
            ConstantPoolEntry::NameAndType { .. } => "NameAndType",
            ConstantPoolEntry::MethodHandle { .. } => "MethodHandle",
            ConstantPoolEntry::MethodType { .. } => "MethodType",
            ConstantPoolEntry::Dynamic { .. } => "Dynamic",
            ConstantPoolEntry::InvokeDynamic { .. } => "InvokeDynamic",
            ConstantPoolEntry::Module { .. } => "Module",
            ConstantPoolEntry::Package { .. } => "Package",
        }
    }

    /// Whether this entry occupies two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(
            self,
            ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_)
        )
    }
}

/// Member reference resolved through its class and NameAndType entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Immutable constant table of one class, indexed from 1.
///
/// Slot 0 and the slot following each long/double entry hold `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Option<ConstantPoolEntry>>,
}

impl ConstantPool {
    /// Builds a pool from entries in declaration order, inserting the
    /// reserved slot after each long/double.
    pub fn from_entries(entries: impl IntoIterator<Item = ConstantPoolEntry>) -> Self {
        let mut slots = vec![None];
        for entry in entries {
            let wide = entry.is_wide();
            slots.push(Some(entry));
            if wide {
                slots.push(None);
            }
        }
        Self { entries: slots }
    }

    pub(crate) fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ClassFormatError> {
        let count = read_pool_u16(reader)?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(None);
        let mut index = 1u16;
        while index < count {
            let tag = reader.read_u8().map_err(|err| truncated(err.offset))?;
            let entry = parse_entry(reader, tag, index)?;
            let wide = entry.is_wide();
            entries.push(Some(entry));
            if wide {
                entries.push(None);
                index += 1;
            }
            index += 1;
        }
        // A trailing long/double can push one slot past the declared count.
        entries.truncate(count.max(1) as usize);
        Ok(Self { entries })
    }

    /// Number of slots including slot 0 (the class file's `constant_pool_count`).
    pub fn len(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn resolve(&self, index: u16) -> Result<&ConstantPoolEntry, ConstantPoolError> {
        self.entries
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(ConstantPoolError::InvalidIndex {
                index,
                size: self.len(),
            })
    }

    /// Iterates addressable entries in pool order, skipping reserved slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantPoolEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|entry| (index as u16, entry)))
    }

    pub fn utf8_at(&self, index: u16) -> Result<&str, ConstantPoolError> {
        match self.resolve(index)? {
            ConstantPoolEntry::Utf8(value) => Ok(value),
            other => Err(mismatch(index, "Utf8", other)),
        }
    }

    /// Slash-formatted class name of a Class entry.
    pub fn class_name_at(&self, index: u16) -> Result<&str, ConstantPoolError> {
        match self.resolve(index)? {
            ConstantPoolEntry::Class { name_index } => self.utf8_at(*name_index),
            other => Err(mismatch(index, "Class", other)),
        }
    }

    pub fn string_at(&self, index: u16) -> Result<&str, ConstantPoolError> {
        match self.resolve(index)? {
            ConstantPoolEntry::String { string_index } => self.utf8_at(*string_index),
            other => Err(mismatch(index, "String", other)),
        }
    }

    pub fn integer_at(&self, index: u16) -> Result<i32, ConstantPoolError> {
        match self.resolve(index)? {
            ConstantPoolEntry::Integer(value) => Ok(*value),
            other => Err(mismatch(index, "Integer", other)),
        }
    }

    pub fn float_at(&self, index: u16) -> Result<f32, ConstantPoolError> {
        match self.resolve(index)? {
            ConstantPoolEntry::Float(value) => Ok(*value),
            other => Err(mismatch(index, "Float", other)),
        }
    }

    pub fn long_at(&self, index: u16) -> Result<i64, ConstantPoolError> {
        match self.resolve(index)? {
            ConstantPoolEntry::Long(value) => Ok(*value),
            other => Err(mismatch(index, "Long", other)),
        }
    }

    pub fn double_at(&self, index: u16) -> Result<f64, ConstantPoolError> {
        match self.resolve(index)? {
            ConstantPoolEntry::Double(value) => Ok(*value),
            other => Err(mismatch(index, "Double", other)),
        }
    }

    /// Name and descriptor of a NameAndType entry.
    pub fn name_and_type_at(&self, index: u16) -> Result<(&str, &str), ConstantPoolError> {
        match self.resolve(index)? {
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8_at(*name_index)?, self.utf8_at(*descriptor_index)?)),
            other => Err(mismatch(index, "NameAndType", other)),
        }
    }

    /// Resolves a Fieldref, Methodref, or InterfaceMethodref entry.
    pub fn member_ref_at(&self, index: u16) -> Result<MemberRef<'_>, ConstantPoolError> {
        let (class_index, name_and_type_index) = match self.resolve(index)? {
            ConstantPoolEntry::Fieldref {
                class_index,
                name_and_type_index,
            }
            | ConstantPoolEntry::Methodref {
                class_index,
                name_and_type_index,
            }
            | ConstantPoolEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index),
            other => return Err(mismatch(index, "Fieldref/Methodref", other)),
        };
        let class_name = self.class_name_at(class_index)?;
        let (name, descriptor) = self.name_and_type_at(name_and_type_index)?;
        Ok(MemberRef {
            class_name,
            name,
            descriptor,
        })
    }
}

fn mismatch(index: u16, expected: &'static str, found: &ConstantPoolEntry) -> ConstantPoolError {
    ConstantPoolError::TypeMismatch {
        index,
        expected,
        found: found.kind_name(),
    }
}

fn truncated(offset: usize) -> ClassFormatError {
    ClassFormatError::Truncated {
        offset,
        what: "constant pool",
    }
}

fn read_pool_u16(reader: &mut ByteReader<'_>) -> Result<u16, ClassFormatError> {
    reader.read_u16().map_err(|err| truncated(err.offset))
}

fn read_pool_u32(reader: &mut ByteReader<'_>) -> Result<u32, ClassFormatError> {
    reader.read_u32().map_err(|err| truncated(err.offset))
}

fn read_pool_u64(reader: &mut ByteReader<'_>) -> Result<u64, ClassFormatError> {
    reader.read_u64().map_err(|err| truncated(err.offset))
}

fn parse_entry(
    reader: &mut ByteReader<'_>,
    tag: u8,
    index: u16,
) -> Result<ConstantPoolEntry, ClassFormatError> {
    let entry = match tag {
        CONSTANT_UTF8 => {
            let len = read_pool_u16(reader)? as usize;
            let bytes = reader
                .read_bytes(len)
                .map_err(|err| truncated(err.offset))?;
            ConstantPoolEntry::Utf8(decode_modified_utf8(bytes))
        }
        CONSTANT_INTEGER => ConstantPoolEntry::Integer(read_pool_u32(reader)? as i32),
        CONSTANT_FLOAT => ConstantPoolEntry::Float(f32::from_bits(read_pool_u32(reader)?)),
        CONSTANT_LONG => ConstantPoolEntry::Long(read_pool_u64(reader)? as i64),
        CONSTANT_DOUBLE => ConstantPoolEntry::Double(f64::from_bits(read_pool_u64(reader)?)),
        CONSTANT_CLASS => ConstantPoolEntry::Class {
            name_index: read_pool_u16(reader)?,
        },
        CONSTANT_STRING => ConstantPoolEntry::String {
            string_index: read_pool_u16(reader)?,
        },
        CONSTANT_FIELDREF => ConstantPoolEntry::Fieldref {
            class_index: read_pool_u16(reader)?,
            name_and_type_index: read_pool_u16(reader)?,
        },
        CONSTANT_METHODREF => ConstantPoolEntry::Methodref {
            class_index: read_pool_u16(reader)?,
            name_and_type_index: read_pool_u16(reader)?,
        },
        CONSTANT_INTERFACE_METHODREF => ConstantPoolEntry::InterfaceMethodref {
            class_index: read_pool_u16(reader)?,
            name_and_type_index: read_pool_u16(reader)?,
        },
        CONSTANT_NAME_AND_TYPE => ConstantPoolEntry::NameAndType {
            name_index: read_pool_u16(reader)?,
            descriptor_index: read_pool_u16(reader)?,
        },
        CONSTANT_METHOD_HANDLE => ConstantPoolEntry::MethodHandle {
            reference_kind: reader.read_u8().map_err(|err| truncated(err.offset))?,
            reference_index: read_pool_u16(reader)?,
        },
        CONSTANT_METHOD_TYPE => ConstantPoolEntry::MethodType {
            descriptor_index: read_pool_u16(reader)?,
        },
        CONSTANT_DYNAMIC => ConstantPoolEntry::Dynamic {
            bootstrap_method_attr_index: read_pool_u16(reader)?,
            name_and_type_index: read_pool_u16(reader)?,
        },
        CONSTANT_INVOKE_DYNAMIC => ConstantPoolEntry::InvokeDynamic {
            bootstrap_method_attr_index: read_pool_u16(reader)?,
            name_and_type_index: read_pool_u16(reader)?,
        },
        CONSTANT_MODULE => ConstantPoolEntry::Module {
            name_index: read_pool_u16(reader)?,
        },
        CONSTANT_PACKAGE => ConstantPoolEntry::Package {
            name_index: read_pool_u16(reader)?,
        },
        _ => return Err(ClassFormatError::UnknownConstantTag { tag, index }),
    };
    Ok(entry)
}

/// Decodes the class file's modified UTF-8 (NUL as `C0 80`, supplementary
/// characters as surrogate pairs).
///
/// Decoding is lossy: malformed byte sequences and unpaired surrogates each
/// become U+FFFD, so such entries do not round-trip to their original bytes.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> String {
    if bytes.is_ascii() {
        return bytes.iter().map(|&b| b as char).collect();
    }
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xe0 == 0xc0 && i + 1 < bytes.len() {
            let unit = ((b as u16 & 0x1f) << 6) | (bytes[i + 1] as u16 & 0x3f);
            units.push(unit);
            i += 2;
        } else if b & 0xf0 == 0xe0 && i + 2 < bytes.len() {
            let unit = ((b as u16 & 0x0f) << 12)
                | ((bytes[i + 1] as u16 & 0x3f) << 6)
                | (bytes[i + 2] as u16 & 0x3f);
            units.push(unit);
            i += 3;
        } else {
            units.push(0xfffd);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool() -> ConstantPool {
        ConstantPool::from_entries([
            ConstantPoolEntry::Utf8("java/lang/Object".to_string()),
            ConstantPoolEntry::Class { name_index: 1 },
            ConstantPoolEntry::Long(1 << 40),
            ConstantPoolEntry::Integer(42),
            ConstantPoolEntry::Double(2.5),
            ConstantPoolEntry::String { string_index: 1 },
        ])
    }

    #[test]
    fn long_and_double_reserve_the_following_slot() {
        let pool = sample_pool();

        assert_eq!(pool.len(), 9);
        assert_eq!(pool.long_at(3).expect("long"), 1 << 40);
        assert!(matches!(
            pool.resolve(4),
            Err(ConstantPoolError::InvalidIndex { index: 4, .. })
        ));
        assert_eq!(pool.integer_at(5).expect("integer"), 42);
        assert!(matches!(
            pool.resolve(7),
            Err(ConstantPoolError::InvalidIndex { index: 7, .. })
        ));
        assert_eq!(pool.string_at(8).expect("string"), "java/lang/Object");
    }

    #[test]
    fn index_zero_and_out_of_range_are_invalid() {
        let pool = sample_pool();

        assert!(matches!(
            pool.resolve(0),
            Err(ConstantPoolError::InvalidIndex { index: 0, size: 9 })
        ));
        assert!(matches!(
            pool.resolve(9),
            Err(ConstantPoolError::InvalidIndex { index: 9, .. })
        ));
    }

    #[test]
    fn typed_accessors_reject_wrong_kind() {
        let pool = sample_pool();

        let err = pool.utf8_at(2).expect_err("class is not utf8");

        assert_eq!(
            err,
            ConstantPoolError::TypeMismatch {
                index: 2,
                expected: "Utf8",
                found: "Class",
            }
        );
        assert_eq!(pool.class_name_at(2).expect("class"), "java/lang/Object");
    }

    #[test]
    fn iteration_skips_reserved_slots() {
        let pool = sample_pool();

        let indexes: Vec<u16> = pool.iter().map(|(index, _)| index).collect();

        assert_eq!(indexes, vec![1, 2, 3, 5, 6, 8]);
    }

    #[test]
    fn parse_reads_wide_entries_from_bytes() {
        let mut bytes = vec![0x00, 0x05];
        bytes.push(CONSTANT_LONG);
        bytes.extend_from_slice(&(-3i64).to_be_bytes());
        bytes.push(CONSTANT_UTF8);
        bytes.extend_from_slice(&[0x00, 0x02, b'h', b'i']);
        bytes.push(CONSTANT_INTEGER);
        bytes.extend_from_slice(&7i32.to_be_bytes());
        let mut reader = ByteReader::new(&bytes);

        let pool = ConstantPool::parse(&mut reader).expect("parse pool");

        assert_eq!(pool.len(), 5);
        assert_eq!(pool.long_at(1).expect("long"), -3);
        assert_eq!(pool.utf8_at(3).expect("utf8"), "hi");
        assert_eq!(pool.integer_at(4).expect("integer"), 7);
        assert!(reader.is_empty());
    }

    #[test]
    fn parse_rejects_unknown_tag() {
        let bytes = [0x00, 0x02, 0x02, 0x00];
        let mut reader = ByteReader::new(&bytes);

        let err = ConstantPool::parse(&mut reader).expect_err("unknown tag");

        assert_eq!(err, ClassFormatError::UnknownConstantTag { tag: 2, index: 1 });
    }

    #[test]
    fn modified_utf8_decodes_embedded_nul_and_bmp_characters() {
        let bytes = [b'a', 0xc0, 0x80, 0xe2, 0x82, 0xac];
        assert_eq!(decode_modified_utf8(&bytes), "a\u{0}\u{20ac}");
    }

    #[test]
    fn modified_utf8_joins_surrogate_pairs_and_replaces_lone_halves() {
        let pair = [0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80];
        assert_eq!(decode_modified_utf8(&pair), "\u{1f600}");

        let lone_high = [b'x', 0xed, 0xa0, 0x80, b'y'];
        assert_eq!(decode_modified_utf8(&lone_high), "x\u{fffd}y");

        let cut_short = [b'z', 0xe2, 0x82];
        assert_eq!(decode_modified_utf8(&cut_short), "z\u{fffd}\u{fffd}");
    }
}
