//! Class file container: header, constant pool, members, and attributes.

use tracing::debug;

use crate::attributes::{Attribute, CodeAttribute, parse_attributes};
use crate::constant_pool::ConstantPool;
use crate::error::{ClassFormatError, ConstantPoolError};
use crate::reader::{ByteReader, UnexpectedEof};

pub const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_VOLATILE: u16 = 0x0040;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_TRANSIENT: u16 = 0x0080;
pub const ACC_VARARGS: u16 = 0x0080;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;

/// A field or method declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

pub type FieldInfo = MemberInfo;
pub type MethodInfo = MemberInfo;

impl MemberInfo {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ConstantPoolError> {
        pool.utf8_at(self.name_index)
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ConstantPoolError> {
        pool.utf8_at(self.descriptor_index)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// The Code attribute, absent for abstract and native methods.
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|attribute| match attribute {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }
}

/// A parsed class file. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    /// Zero for `java/lang/Object`.
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn parse(data: &[u8]) -> Result<Self, ClassFormatError> {
        let mut reader = ByteReader::new(data);
        let magic = reader.read_u32().map_err(truncated("magic"))?;
        if magic != MAGIC {
            return Err(ClassFormatError::InvalidMagic(magic));
        }
        let minor_version = reader.read_u16().map_err(truncated("version"))?;
        let major_version = reader.read_u16().map_err(truncated("version"))?;
        let constant_pool = ConstantPool::parse(&mut reader)?;
        let access_flags = reader.read_u16().map_err(truncated("access flags"))?;
        let this_class = reader.read_u16().map_err(truncated("this class"))?;
        let super_class = reader.read_u16().map_err(truncated("super class"))?;
        let interface_count = reader.read_u16().map_err(truncated("interfaces"))?;
        let interfaces = (0..interface_count)
            .map(|_| reader.read_u16().map_err(truncated("interfaces")))
            .collect::<Result<Vec<_>, _>>()?;
        let fields = parse_members(&mut reader, &constant_pool, "fields")?;
        let methods = parse_members(&mut reader, &constant_pool, "methods")?;
        let attributes = parse_attributes(&mut reader, &constant_pool)?;

        let class = Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        // Resolve eagerly so a broken header fails the class, not a visitor callback.
        class.class_name()?;
        class.super_class_name()?;
        if !reader.is_empty() {
            debug!(
                trailing = reader.remaining(),
                "ignoring bytes after class file end"
            );
        }
        Ok(class)
    }

    /// Slash-separated name of this class.
    pub fn class_name(&self) -> Result<&str, ConstantPoolError> {
        self.constant_pool.class_name_at(self.this_class)
    }

    pub fn super_class_name(&self) -> Result<Option<&str>, ConstantPoolError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name_at(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, ConstantPoolError> {
        self.interfaces
            .iter()
            .map(|index| self.constant_pool.class_name_at(*index))
            .collect()
    }

    /// Value of the SourceFile attribute, if present.
    pub fn source_file(&self) -> Option<&str> {
        self.attributes.iter().find_map(|attribute| match attribute {
            Attribute::SourceFile { sourcefile_index } => {
                self.constant_pool.utf8_at(*sourcefile_index).ok()
            }
            _ => None,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }
}

fn parse_members(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
    what: &'static str,
) -> Result<Vec<MemberInfo>, ClassFormatError> {
    let count = reader.read_u16().map_err(truncated(what))?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = reader.read_u16().map_err(truncated(what))?;
        let name_index = reader.read_u16().map_err(truncated(what))?;
        let descriptor_index = reader.read_u16().map_err(truncated(what))?;
        pool.utf8_at(name_index)?;
        pool.utf8_at(descriptor_index)?;
        let attributes = parse_attributes(reader, pool)?;
        members.push(MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }
    Ok(members)
}

fn truncated(what: &'static str) -> impl Fn(UnexpectedEof) -> ClassFormatError {
    move |err| ClassFormatError::Truncated {
        offset: err.offset,
        what,
    }
}
