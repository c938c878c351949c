//! Disassembly listing: a built-in [`Visitor`] that records what a traversal
//! reports and renders it as text or JSON.

use std::fmt;

use serde::Serialize;

use crate::annotation::AnnotationInstance;
use crate::classfile::{ACC_STATIC, ClassFile};
use crate::config::VisitorConfig;
use crate::constant_pool::ConstantPoolEntry;
use crate::decoder::{DecodeState, DecodedInstruction};
use crate::error::{ClassFormatError, DecodeError, NotAvailable};
use crate::opcodes;
use crate::operands;
use crate::visitor::{
    Node, NodeKind, TraversalReport, VisitOutcome, Visitor, VisitorContext, traverse,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ClassListing {
    /// Dotted class name.
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub major_version: u16,
    pub minor_version: u16,
    pub access_flags: u16,
    /// Entries visited in the constant pool, reserved slots excluded.
    pub constants: usize,
    pub annotations: Vec<AnnotationInstance>,
    pub fields: Vec<FieldListing>,
    pub methods: Vec<MethodListing>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FieldListing {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    pub annotations: Vec<AnnotationInstance>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MethodListing {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stack: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_locals: Option<u16>,
    pub instructions: Vec<InstructionListing>,
    pub exception_handlers: Vec<HandlerListing>,
    pub annotations: Vec<AnnotationInstance>,
    pub parameter_annotations: Vec<ParameterAnnotation>,
    /// Set when the code array stopped decoding part way through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstructionListing {
    pub mnemonic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Human readable operand summary, as shown in the text listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub instruction: DecodedInstruction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HandlerListing {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Dotted exception class; `None` for a catch-all (`finally`) handler.
    pub catch_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParameterAnnotation {
    pub parameter: usize,
    pub annotation: AnnotationInstance,
}

/// Traverses `class` and returns its listing together with the traversal report.
pub fn list_class(
    class: &ClassFile,
    config: &VisitorConfig,
) -> Result<(ClassListing, TraversalReport), ClassFormatError> {
    let mut visitor = ListingVisitor::default();
    let report = traverse(class, config, &mut visitor)?;
    Ok((visitor.listing, report))
}

#[derive(Default)]
struct ListingVisitor {
    listing: ClassListing,
}

impl ListingVisitor {
    fn current_method(&mut self) -> Option<&mut MethodListing> {
        self.listing.methods.last_mut()
    }

    fn visit_class(&mut self, cx: &VisitorContext<'_>, class: &ClassFile) {
        let listing = &mut self.listing;
        listing.class_name = cx.dotted_class_name().to_string();
        listing.super_class = cx.dotted_superclass_name();
        listing.interfaces = class
            .interface_names()
            .map(|names| names.iter().map(|name| name.replace('/', ".")).collect())
            .unwrap_or_default();
        listing.source_file = cx.source_file().map(str::to_string);
        listing.major_version = class.major_version;
        listing.minor_version = class.minor_version;
        listing.access_flags = class.access_flags;
    }
}

impl Visitor for ListingVisitor {
    fn visit(&mut self, cx: &VisitorContext<'_>, kind: NodeKind, node: &Node<'_>) -> VisitOutcome {
        match (kind, node) {
            (NodeKind::Class, Node::Class(class)) => self.visit_class(cx, class),
            (NodeKind::Constant, Node::Constant { .. }) => self.listing.constants += 1,
            (NodeKind::Field, Node::Field(field)) => self.listing.fields.push(FieldListing {
                name: cx.field_name().unwrap_or_default().to_string(),
                descriptor: cx.field_sig().unwrap_or_default().to_string(),
                access_flags: field.access_flags,
                annotations: Vec::new(),
            }),
            (NodeKind::Method, Node::Method(method)) => self.listing.methods.push(MethodListing {
                name: cx.method_name().unwrap_or_default().to_string(),
                descriptor: cx.method_sig().unwrap_or_default().to_string(),
                access_flags: method.access_flags,
                ..MethodListing::default()
            }),
            (NodeKind::Code, Node::Attribute(_)) => {
                if let (Ok(code), Some(method)) = (cx.code(), self.current_method()) {
                    method.max_stack = Some(code.max_stack);
                    method.max_locals = Some(code.max_locals);
                }
            }
            (NodeKind::CodeException, Node::CodeException(entry)) => {
                let catch_type = match entry.catch_type {
                    0 => None,
                    index => cx
                        .constant_pool()
                        .class_name_at(index)
                        .ok()
                        .map(|name| name.replace('/', ".")),
                };
                if let Some(method) = self.current_method() {
                    method.exception_handlers.push(HandlerListing {
                        start_pc: entry.start_pc,
                        end_pc: entry.end_pc,
                        handler_pc: entry.handler_pc,
                        catch_type,
                    });
                }
            }
            _ => return VisitOutcome::NotHandled,
        }
        VisitOutcome::Handled
    }

    fn after_opcode(&mut self, cx: &VisitorContext<'_>, _opcode: u8) {
        let Ok(state) = cx.instruction() else {
            return;
        };
        let Ok(instruction) = state.current() else {
            return;
        };
        let entry = InstructionListing {
            mnemonic: instruction.mnemonic(),
            line: cx.line_number(),
            detail: instruction_detail(state, instruction),
            instruction: instruction.clone(),
        };
        if let Some(method) = self.current_method() {
            method.instructions.push(entry);
        }
    }

    fn visit_annotation(&mut self, cx: &VisitorContext<'_>, annotation: &AnnotationInstance) {
        let annotation = annotation.clone();
        if cx.method().is_ok() {
            if let Some(method) = self.current_method() {
                method.annotations.push(annotation);
            }
        } else if cx.field().is_ok() {
            if let Some(field) = self.listing.fields.last_mut() {
                field.annotations.push(annotation);
            }
        } else {
            self.listing.annotations.push(annotation);
        }
    }

    fn visit_parameter_annotation(
        &mut self,
        _cx: &VisitorContext<'_>,
        parameter: usize,
        annotation: &AnnotationInstance,
    ) {
        if let Some(method) = self.current_method() {
            method.parameter_annotations.push(ParameterAnnotation {
                parameter,
                annotation: annotation.clone(),
            });
        }
    }

    fn decode_failed(&mut self, _cx: &VisitorContext<'_>, error: &DecodeError) {
        if let Some(method) = self.current_method() {
            method.decode_error = Some(error.to_string());
        }
    }
}

/// Operand summary in the spirit of a classic `javap`-style dump.
fn instruction_detail(state: &DecodeState<'_>, insn: &DecodedInstruction) -> Option<String> {
    describe_operands(state, insn.opcode).ok().flatten()
}

fn describe_operands(state: &DecodeState<'_>, opcode: u8) -> Result<Option<String>, NotAvailable> {
    let detail = match opcode {
        opcodes::INVOKEDYNAMIC => format!(
            "{} {}",
            state.name_constant_operand()?,
            state.sig_constant_operand()?
        ),
        _ if operands::is_method_call(opcode) => format!(
            "{}.{} {}",
            state.class_constant_operand()?,
            state.name_constant_operand()?,
            state.sig_constant_operand()?
        ),
        opcodes::LDC | opcodes::LDC_W | opcodes::LDC2_W => constant_detail(state)?,
        opcodes::GETSTATIC | opcodes::PUTSTATIC | opcodes::GETFIELD | opcodes::PUTFIELD => {
            state.ref_constant_operand()?
        }
        opcodes::NEW | opcodes::ANEWARRAY | opcodes::CHECKCAST | opcodes::INSTANCEOF => {
            state.class_constant_operand()?.to_string()
        }
        opcodes::MULTIANEWARRAY => format!(
            "{} dim {}",
            state.class_constant_operand()?,
            state.int_constant()?
        ),
        opcodes::BIPUSH | opcodes::SIPUSH | opcodes::NEWARRAY => state.int_constant()?.to_string(),
        opcodes::IINC => format!(
            "{} by {}",
            state.register_operand()?,
            state.int_constant()?
        ),
        _ if operands::is_switch(opcode) => {
            let table = state.switch_table()?;
            let targets: Vec<String> = table
                .entries
                .iter()
                .map(|entry| entry.target.to_string())
                .chain(std::iter::once(table.default_target.to_string()))
                .collect();
            format!("[{}]", targets.join(","))
        }
        _ if operands::is_branch(opcode) => state.branch_target()?.to_string(),
        // Implicit forms like `aload_0` already name their register.
        _ if operands::implicit_register(opcode).is_some() => return Ok(None),
        _ if state.is_register_load() || state.is_register_store() => {
            state.register_operand()?.to_string()
        }
        _ => return Ok(None),
    };
    Ok(Some(detail))
}

fn constant_detail(state: &DecodeState<'_>) -> Result<String, NotAvailable> {
    let (_, entry) = state.constant_ref_operand()?;
    let detail = match entry {
        ConstantPoolEntry::String { .. } => format!("\"{}\"", state.string_constant_operand()?),
        ConstantPoolEntry::Class { .. } => state.class_constant_operand()?.to_string(),
        ConstantPoolEntry::Integer(value) => value.to_string(),
        ConstantPoolEntry::Float(value) => format!("{value}f"),
        ConstantPoolEntry::Long(value) => format!("{value}L"),
        ConstantPoolEntry::Double(value) => format!("{value}d"),
        other => other.kind_name().to_string(),
    };
    Ok(detail)
}

impl fmt::Display for ClassListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {}", self.class_name)?;
        if let Some(super_class) = &self.super_class {
            write!(f, " extends {super_class}")?;
        }
        if !self.interfaces.is_empty() {
            write!(f, " implements {}", self.interfaces.join(", "))?;
        }
        if let Some(source_file) = &self.source_file {
            write!(f, " ({source_file})")?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "  version {}.{}, {} constants",
            self.major_version, self.minor_version, self.constants
        )?;
        for annotation in &self.annotations {
            writeln!(f, "  @{}", annotation.type_name)?;
        }
        for field in &self.fields {
            for annotation in &field.annotations {
                writeln!(f, "  @{}", annotation.type_name)?;
            }
            writeln!(
                f,
                "  field {}{} {}",
                static_marker(field.access_flags),
                field.name,
                field.descriptor
            )?;
        }
        for method in &self.methods {
            writeln!(f)?;
            for annotation in &method.annotations {
                writeln!(f, "  @{}", annotation.type_name)?;
            }
            writeln!(
                f,
                "  method {}{}{}",
                static_marker(method.access_flags),
                method.name,
                method.descriptor
            )?;
            for parameter in &method.parameter_annotations {
                writeln!(
                    f,
                    "    parameter {}: @{}",
                    parameter.parameter, parameter.annotation.type_name
                )?;
            }
            for insn in &method.instructions {
                write!(f, "    [{:>5}]  {}", insn.instruction.pc, insn.mnemonic)?;
                if let Some(detail) = &insn.detail {
                    write!(f, "   {detail}")?;
                }
                writeln!(f)?;
            }
            for handler in &method.exception_handlers {
                writeln!(
                    f,
                    "    try [{}, {}] -> {} catch {}",
                    handler.start_pc,
                    handler.end_pc,
                    handler.handler_pc,
                    handler.catch_type.as_deref().unwrap_or("any")
                )?;
            }
            if let Some(error) = &method.decode_error {
                writeln!(f, "    !! {error}")?;
            }
        }
        Ok(())
    }
}

fn static_marker(access_flags: u16) -> &'static str {
    if access_flags & ACC_STATIC != 0 {
        "static "
    } else {
        ""
    }
}
