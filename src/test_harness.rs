//! Synthetic class file writer for unit tests.

use crate::constant_pool::{
    CONSTANT_CLASS, CONSTANT_DOUBLE, CONSTANT_FIELDREF, CONSTANT_FLOAT, CONSTANT_INTEGER,
    CONSTANT_INTERFACE_METHODREF, CONSTANT_INVOKE_DYNAMIC, CONSTANT_LONG, CONSTANT_METHODREF,
    CONSTANT_NAME_AND_TYPE, CONSTANT_STRING, CONSTANT_UTF8,
};

/// Attribute with its name already interned in the builder's pool.
#[derive(Clone, Debug)]
pub(crate) struct RawAttribute {
    name_index: u16,
    body: Vec<u8>,
}

impl RawAttribute {
    fn write(&self, bytes: &mut Vec<u8>) {
        write_u16(bytes, self.name_index);
        write_u32(bytes, self.body.len() as u32);
        bytes.extend_from_slice(&self.body);
    }

    fn encoded_len(&self) -> usize {
        6 + self.body.len()
    }
}

/// Body of a Code attribute.
pub(crate) struct CodeSpec {
    max_stack: u16,
    max_locals: u16,
    code: Vec<u8>,
    exceptions: Vec<[u16; 4]>,
    attributes: Vec<RawAttribute>,
}

impl CodeSpec {
    pub(crate) fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self {
            max_stack,
            max_locals,
            code,
            exceptions: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub(crate) fn with_exception(
        mut self,
        start_pc: u16,
        end_pc: u16,
        handler_pc: u16,
        catch_type: u16,
    ) -> Self {
        self.exceptions
            .push([start_pc, end_pc, handler_pc, catch_type]);
        self
    }

    pub(crate) fn with_attribute(mut self, attribute: RawAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }
}

struct MemberSpec {
    access_flags: u16,
    name_index: u16,
    descriptor_index: u16,
    attributes: Vec<RawAttribute>,
}

/// Constant pool entries the builder can emit.
enum CpEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    NameAndType(u16, u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    InvokeDynamic(u16, u16),
}

impl CpEntry {
    fn slots(&self) -> u16 {
        match self {
            CpEntry::Long(_) | CpEntry::Double(_) => 2,
            _ => 1,
        }
    }

    fn write(&self, bytes: &mut Vec<u8>) {
        match self {
            CpEntry::Utf8(value) => {
                bytes.push(CONSTANT_UTF8);
                write_u16(bytes, value.len() as u16);
                bytes.extend_from_slice(value.as_bytes());
            }
            CpEntry::Integer(value) => {
                bytes.push(CONSTANT_INTEGER);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            CpEntry::Float(value) => {
                bytes.push(CONSTANT_FLOAT);
                bytes.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            CpEntry::Long(value) => {
                bytes.push(CONSTANT_LONG);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            CpEntry::Double(value) => {
                bytes.push(CONSTANT_DOUBLE);
                bytes.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            CpEntry::Class(name_index) => {
                bytes.push(CONSTANT_CLASS);
                write_u16(bytes, *name_index);
            }
            CpEntry::String(utf8_index) => {
                bytes.push(CONSTANT_STRING);
                write_u16(bytes, *utf8_index);
            }
            CpEntry::NameAndType(first, second)
            | CpEntry::FieldRef(first, second)
            | CpEntry::MethodRef(first, second)
            | CpEntry::InterfaceMethodRef(first, second)
            | CpEntry::InvokeDynamic(first, second) => {
                bytes.push(match self {
                    CpEntry::NameAndType(..) => CONSTANT_NAME_AND_TYPE,
                    CpEntry::FieldRef(..) => CONSTANT_FIELDREF,
                    CpEntry::MethodRef(..) => CONSTANT_METHODREF,
                    CpEntry::InterfaceMethodRef(..) => CONSTANT_INTERFACE_METHODREF,
                    _ => CONSTANT_INVOKE_DYNAMIC,
                });
                write_u16(bytes, *first);
                write_u16(bytes, *second);
            }
        }
    }
}

/// Minimal class file writer. Every `add_*`/constant method returns the
/// constant pool index it allocated; entries are never deduplicated.
pub(crate) struct ClassFileBuilder {
    cp: Vec<CpEntry>,
    next_index: u16,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<MemberSpec>,
    methods: Vec<MemberSpec>,
    attributes: Vec<RawAttribute>,
    code_index: Option<u16>,
}

impl ClassFileBuilder {
    pub(crate) fn new(class_name: &str, super_name: &str) -> Self {
        let mut builder = Self {
            cp: Vec::new(),
            next_index: 1,
            access_flags: 0x0021,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            code_index: None,
        };
        builder.this_class = builder.class(class_name);
        builder.super_class = builder.class(super_name);
        builder
    }

    fn push(&mut self, entry: CpEntry) -> u16 {
        let index = self.next_index;
        self.next_index += entry.slots();
        self.cp.push(entry);
        index
    }

    pub(crate) fn utf8(&mut self, value: &str) -> u16 {
        self.push(CpEntry::Utf8(value.to_string()))
    }

    pub(crate) fn integer(&mut self, value: i32) -> u16 {
        self.push(CpEntry::Integer(value))
    }

    pub(crate) fn float(&mut self, value: f32) -> u16 {
        self.push(CpEntry::Float(value))
    }

    pub(crate) fn long(&mut self, value: i64) -> u16 {
        self.push(CpEntry::Long(value))
    }

    pub(crate) fn double(&mut self, value: f64) -> u16 {
        self.push(CpEntry::Double(value))
    }

    pub(crate) fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.push(CpEntry::Class(name_index))
    }

    pub(crate) fn string(&mut self, value: &str) -> u16 {
        let utf8_index = self.utf8(value);
        self.push(CpEntry::String(utf8_index))
    }

    pub(crate) fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.push(CpEntry::NameAndType(name_index, descriptor_index))
    }

    pub(crate) fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.push(CpEntry::FieldRef(class_index, name_and_type))
    }

    pub(crate) fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.push(CpEntry::MethodRef(class_index, name_and_type))
    }

    pub(crate) fn interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> u16 {
        let class_index = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.push(CpEntry::InterfaceMethodRef(class_index, name_and_type))
    }

    pub(crate) fn invoke_dynamic(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_and_type = self.name_and_type(name, descriptor);
        self.push(CpEntry::InvokeDynamic(0, name_and_type))
    }

    pub(crate) fn set_this_class(&mut self, index: u16) {
        self.this_class = index;
    }

    pub(crate) fn add_interface(&mut self, name: &str) {
        let index = self.class(name);
        self.interfaces.push(index);
    }

    /// Interns `name` and wraps `body` as an attribute.
    pub(crate) fn attribute(&mut self, name: &str, body: Vec<u8>) -> RawAttribute {
        let name_index = self.utf8(name);
        RawAttribute { name_index, body }
    }

    pub(crate) fn set_source_file(&mut self, file_name: &str) {
        let value = self.utf8(file_name);
        let attribute = self.attribute("SourceFile", value.to_be_bytes().to_vec());
        self.attributes.push(attribute);
    }

    pub(crate) fn add_class_attribute(&mut self, attribute: RawAttribute) {
        self.attributes.push(attribute);
    }

    pub(crate) fn add_field(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        attributes: Vec<RawAttribute>,
    ) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.fields.push(MemberSpec {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }

    pub(crate) fn add_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        code: Option<CodeSpec>,
        mut attributes: Vec<RawAttribute>,
    ) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        if let Some(code) = code {
            let code_attribute = self.code_attribute(code);
            attributes.insert(0, code_attribute);
        }
        self.methods.push(MemberSpec {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }

    fn code_attribute(&mut self, code: CodeSpec) -> RawAttribute {
        let name_index = match self.code_index {
            Some(index) => index,
            None => {
                let index = self.utf8("Code");
                self.code_index = Some(index);
                index
            }
        };
        let nested_len: usize = code.attributes.iter().map(RawAttribute::encoded_len).sum();
        let mut body =
            Vec::with_capacity(12 + code.code.len() + 8 * code.exceptions.len() + nested_len);
        write_u16(&mut body, code.max_stack);
        write_u16(&mut body, code.max_locals);
        write_u32(&mut body, code.code.len() as u32);
        body.extend_from_slice(&code.code);
        write_u16(&mut body, code.exceptions.len() as u16);
        for entry in &code.exceptions {
            for value in entry {
                write_u16(&mut body, *value);
            }
        }
        write_u16(&mut body, code.attributes.len() as u16);
        for attribute in &code.attributes {
            attribute.write(&mut body);
        }
        RawAttribute { name_index, body }
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_u32(&mut bytes, 0xCAFEBABE);
        write_u16(&mut bytes, 0);
        write_u16(&mut bytes, 52);
        write_u16(&mut bytes, self.next_index);
        for entry in &self.cp {
            entry.write(&mut bytes);
        }
        write_u16(&mut bytes, self.access_flags);
        write_u16(&mut bytes, self.this_class);
        write_u16(&mut bytes, self.super_class);
        write_u16(&mut bytes, self.interfaces.len() as u16);
        for index in &self.interfaces {
            write_u16(&mut bytes, *index);
        }
        for members in [&self.fields, &self.methods] {
            write_u16(&mut bytes, members.len() as u16);
            for member in members {
                write_u16(&mut bytes, member.access_flags);
                write_u16(&mut bytes, member.name_index);
                write_u16(&mut bytes, member.descriptor_index);
                write_attributes(&mut bytes, &member.attributes);
            }
        }
        write_attributes(&mut bytes, &self.attributes);
        bytes
    }
}

fn write_attributes(bytes: &mut Vec<u8>, attributes: &[RawAttribute]) {
    write_u16(bytes, attributes.len() as u16);
    for attribute in attributes {
        attribute.write(bytes);
    }
}

/// `RuntimeVisibleAnnotations`-style body from `(type_index, [(name_index, value)])`.
pub(crate) fn annotations_body(annotations: &[(u16, Vec<(u16, Vec<u8>)>)]) -> Vec<u8> {
    let mut body = Vec::new();
    write_u16(&mut body, annotations.len() as u16);
    for (type_index, pairs) in annotations {
        write_annotation(&mut body, *type_index, pairs);
    }
    body
}

/// Parameter annotation body: one annotation list per parameter.
pub(crate) fn parameter_annotations_body(
    parameters: &[Vec<(u16, Vec<(u16, Vec<u8>)>)>],
) -> Vec<u8> {
    let mut body = vec![parameters.len() as u8];
    for annotations in parameters {
        write_u16(&mut body, annotations.len() as u16);
        for (type_index, pairs) in annotations {
            write_annotation(&mut body, *type_index, pairs);
        }
    }
    body
}

fn write_annotation(body: &mut Vec<u8>, type_index: u16, pairs: &[(u16, Vec<u8>)]) {
    write_u16(body, type_index);
    write_u16(body, pairs.len() as u16);
    for (name_index, value) in pairs {
        write_u16(body, *name_index);
        body.extend_from_slice(value);
    }
}

/// Element value referencing a constant: tag byte plus pool index.
pub(crate) fn const_element(tag: u8, index: u16) -> Vec<u8> {
    let mut value = vec![tag];
    write_u16(&mut value, index);
    value
}

pub(crate) fn array_element(values: &[Vec<u8>]) -> Vec<u8> {
    let mut value = vec![b'['];
    write_u16(&mut value, values.len() as u16);
    for element in values {
        value.extend_from_slice(element);
    }
    value
}

pub(crate) fn write_u16(bytes: &mut Vec<u8>, value: u16) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn high(value: u16) -> u8 {
    (value >> 8) as u8
}

pub(crate) fn low(value: u16) -> u8 {
    (value & 0xff) as u8
}
