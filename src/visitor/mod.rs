//! Structural traversal of a parsed class with per-kind fallback dispatch.
//!
//! [`traverse`] walks one class in a fixed order: the class node, the
//! constant pool and its entries, each field and its attributes, each method
//! and its attributes, the class attributes, and finally
//! [`Visitor::visit_after_class`]. Code attributes are handed to the
//! instruction decoder and annotation attributes to the annotation decoder,
//! both of which stream callbacks back through the same visitor.
//!
//! Node callbacks go through the single [`Visitor::visit`] method. A visitor
//! returning [`VisitOutcome::NotHandled`] for a specific kind is offered the
//! same node again under each generic kind from [`NodeKind::parent`], so it
//! can subscribe at whatever granularity it needs.

mod context;
mod node;

use tracing::{debug, warn};

use crate::annotation::{
    AnnotationInstance, Visibility, decode_annotations, decode_parameter_annotations,
    parameter_index_offset,
};
use crate::attributes::{Attribute, CodeAttribute};
use crate::classfile::{ClassFile, MemberInfo};
use crate::config::VisitorConfig;
use crate::constant_pool::ConstantPoolEntry;
use crate::decoder::{DecodedInstruction, SwitchKind};
use crate::error::{AnnotationError, ClassFormatError, DecodeError};
use crate::operands::OperandMeaning;

pub use context::{Phase, VisitorContext};
use context::MemberFrame;
pub use node::{Node, NodeKind};

/// Result of offering a node to [`Visitor::visit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitOutcome {
    Handled,
    /// Retry with the next generic kind, if any.
    NotHandled,
}

/// Callbacks invoked by [`traverse`]. Every method defaults to a no-op.
pub trait Visitor {
    /// Offered every node, first under its specific kind and then under each
    /// generic parent kind until one call returns `Handled`.
    fn visit(&mut self, _cx: &VisitorContext<'_>, _kind: NodeKind, _node: &Node<'_>) -> VisitOutcome {
        VisitOutcome::NotHandled
    }

    /// Returning false skips `saw_opcode` for this instruction only;
    /// `after_opcode` and the operand callbacks still run.
    fn before_opcode(&mut self, _cx: &VisitorContext<'_>, _opcode: u8) -> bool {
        true
    }

    fn saw_opcode(&mut self, _cx: &VisitorContext<'_>, _opcode: u8) {}

    fn after_opcode(&mut self, _cx: &VisitorContext<'_>, _opcode: u8) {}

    /// Absolute target of a branch or switch arm.
    fn saw_branch_to(&mut self, _cx: &VisitorContext<'_>, _target: i32) {}

    /// Relative offset of a branch, reported after `saw_branch_to`.
    fn saw_offset(&mut self, _cx: &VisitorContext<'_>, _offset: i32) {}

    fn saw_int(&mut self, _cx: &VisitorContext<'_>, _value: i32) {}

    fn saw_long(&mut self, _cx: &VisitorContext<'_>, _value: i64) {}

    fn saw_float(&mut self, _cx: &VisitorContext<'_>, _value: f32) {}

    fn saw_double(&mut self, _cx: &VisitorContext<'_>, _value: f64) {}

    fn saw_string(&mut self, _cx: &VisitorContext<'_>, _value: &str) {}

    /// A field reference operand; details are on `cx.instruction()`.
    fn saw_field(&mut self, _cx: &VisitorContext<'_>) {}

    fn saw_method(&mut self, _cx: &VisitorContext<'_>) {}

    fn saw_imethod(&mut self, _cx: &VisitorContext<'_>) {}

    fn saw_class(&mut self, _cx: &VisitorContext<'_>) {}

    fn saw_register(&mut self, _cx: &VisitorContext<'_>, _register: u16) {}

    fn visit_annotation(&mut self, _cx: &VisitorContext<'_>, _annotation: &AnnotationInstance) {}

    fn visit_parameter_annotation(
        &mut self,
        _cx: &VisitorContext<'_>,
        _parameter: usize,
        _annotation: &AnnotationInstance,
    ) {
    }

    /// Runs once the code's instructions, exception entries, and nested
    /// attributes have all been visited.
    fn visit_after_code(&mut self, _cx: &VisitorContext<'_>, _code: &CodeAttribute) {}

    fn visit_after_class(&mut self, _cx: &VisitorContext<'_>) {}

    /// The current method's code stopped decoding; traversal continues with
    /// its remaining attributes.
    fn decode_failed(&mut self, _cx: &VisitorContext<'_>, _error: &DecodeError) {}
}

/// A method whose instruction stream could not be fully decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodFailure {
    /// `dotted.Class.name(descriptor)`.
    pub method: String,
    pub error: DecodeError,
}

/// An annotation attribute dropped because its bytes were malformed.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscardedAnnotations {
    pub owner: String,
    pub attribute: String,
    pub error: AnnotationError,
}

/// Summary of one class traversal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TraversalReport {
    pub class_name: String,
    pub methods_visited: usize,
    pub instructions: usize,
    pub decode_failures: Vec<MethodFailure>,
    pub discarded_annotations: Vec<DiscardedAnnotations>,
}

/// Walks `class`, streaming callbacks to `visitor`.
///
/// Only an unresolvable class header fails the whole traversal. Malformed
/// code or annotation bytes are logged, recorded in the report, and skipped.
pub fn traverse<V: Visitor + ?Sized>(
    class: &ClassFile,
    config: &VisitorConfig,
    visitor: &mut V,
) -> Result<TraversalReport, ClassFormatError> {
    let mut cx = VisitorContext::new(class, *config)?;
    let mut report = TraversalReport {
        class_name: cx.class_name().to_string(),
        ..TraversalReport::default()
    };
    debug!(class = cx.class_name(), "traversal started");

    cx.phase = Phase::VisitingClass;
    dispatch(visitor, &cx, &Node::Class(class));

    cx.phase = Phase::VisitingConstantPool;
    let pool = &class.constant_pool;
    dispatch(visitor, &cx, &Node::ConstantPool(pool));
    for (index, entry) in pool.iter() {
        dispatch(visitor, &cx, &Node::Constant { index, entry });
    }

    for field in &class.fields {
        cx.field = Some(member_frame(&cx, field)?);
        cx.phase = Phase::VisitingMembers;
        dispatch(visitor, &cx, &Node::Field(field));
        visit_attributes(&mut cx, &field.attributes, visitor, &mut report);
        cx.field = None;
    }

    for method in &class.methods {
        cx.method = Some(member_frame(&cx, method)?);
        cx.phase = Phase::VisitingMembers;
        dispatch(visitor, &cx, &Node::Method(method));
        report.methods_visited += 1;
        visit_attributes(&mut cx, &method.attributes, visitor, &mut report);
        cx.method = None;
    }

    visit_attributes(&mut cx, &class.attributes, visitor, &mut report);
    visitor.visit_after_class(&cx);
    cx.phase = Phase::Done;

    debug!(
        class = cx.class_name(),
        methods = report.methods_visited,
        instructions = report.instructions,
        failures = report.decode_failures.len(),
        "traversal finished"
    );
    Ok(report)
}

fn dispatch<V: Visitor + ?Sized>(visitor: &mut V, cx: &VisitorContext<'_>, node: &Node<'_>) {
    for kind in node.kind().fallback_chain() {
        if visitor.visit(cx, kind, node) == VisitOutcome::Handled {
            return;
        }
    }
}

fn member_frame<'a>(
    cx: &VisitorContext<'a>,
    member: &'a MemberInfo,
) -> Result<MemberFrame<'a>, ClassFormatError> {
    let pool = cx.constant_pool();
    Ok(MemberFrame {
        info: member,
        name: member.name(pool)?,
        sig: member.descriptor(pool)?,
    })
}

fn visit_attributes<'a, V: Visitor + ?Sized>(
    cx: &mut VisitorContext<'a>,
    attributes: &'a [Attribute],
    visitor: &mut V,
    report: &mut TraversalReport,
) {
    for attribute in attributes {
        cx.phase = Phase::VisitingAttributes;
        dispatch(visitor, cx, &Node::Attribute(attribute));
        match attribute {
            Attribute::Code(code) => visit_code(cx, code, visitor, report),
            Attribute::InnerClasses(entries) => {
                for entry in entries {
                    dispatch(visitor, cx, &Node::InnerClass(entry));
                }
            }
            Attribute::LineNumberTable(entries) => {
                for entry in entries {
                    dispatch(visitor, cx, &Node::LineNumber(entry));
                }
            }
            Attribute::LocalVariableTable(entries) => {
                for entry in entries {
                    dispatch(visitor, cx, &Node::LocalVariable(entry));
                }
            }
            Attribute::StackMapTable(frames) => {
                for frame in frames {
                    dispatch(visitor, cx, &Node::StackMapFrame(frame));
                }
            }
            Attribute::RuntimeVisibleAnnotations(data) => {
                visit_annotations(cx, attribute, data, Visibility::RuntimeVisible, visitor, report);
            }
            Attribute::RuntimeInvisibleAnnotations(data) => {
                visit_annotations(cx, attribute, data, Visibility::RuntimeInvisible, visitor, report);
            }
            Attribute::RuntimeVisibleParameterAnnotations(data) => {
                visit_parameter_annotations(
                    cx,
                    attribute,
                    data,
                    Visibility::RuntimeVisible,
                    visitor,
                    report,
                );
            }
            Attribute::RuntimeInvisibleParameterAnnotations(data) => {
                visit_parameter_annotations(
                    cx,
                    attribute,
                    data,
                    Visibility::RuntimeInvisible,
                    visitor,
                    report,
                );
            }
            _ => {}
        }
    }
}

fn visit_code<'a, V: Visitor + ?Sized>(
    cx: &mut VisitorContext<'a>,
    code: &'a CodeAttribute,
    visitor: &mut V,
    report: &mut TraversalReport,
) {
    cx.code = Some(code);
    if cx.config().decode_code {
        decode_instructions(cx, code, visitor, report);
    }
    for entry in &code.exception_table {
        dispatch(visitor, cx, &Node::CodeException(entry));
    }
    visit_attributes(cx, &code.attributes, visitor, report);
    visitor.visit_after_code(cx, code);
    cx.code = None;
}

fn decode_instructions<'a, V: Visitor + ?Sized>(
    cx: &mut VisitorContext<'a>,
    code: &'a CodeAttribute,
    visitor: &mut V,
    report: &mut TraversalReport,
) {
    cx.phase = Phase::VisitingMethodCode;
    cx.decode.reset();
    let pool = cx.constant_pool();
    let mut pc = 0u32;
    while (pc as usize) < code.code.len() {
        let decoded = cx
            .decode
            .decode_at(&code.code, pc, pool)
            .map(|insn| insn.next_pc);
        let next_pc = match decoded {
            Ok(next_pc) => next_pc,
            Err(error) => {
                let method = owner_label(cx);
                warn!(
                    method = %method,
                    pc = error.pc(),
                    "abandoning method code: {error}"
                );
                visitor.decode_failed(cx, &error);
                report.decode_failures.push(MethodFailure { method, error });
                break;
            }
        };
        cx.in_instruction = true;
        if let Ok(insn) = cx.decode.current() {
            emit_instruction(cx, insn, visitor);
        }
        cx.in_instruction = false;
        report.instructions += 1;
        pc = next_pc;
    }
    cx.phase = Phase::VisitingAttributes;
}

/// Per-instruction callbacks: the opcode hooks, then one callback per
/// operand in encoding order.
fn emit_instruction<V: Visitor + ?Sized>(
    cx: &VisitorContext<'_>,
    insn: &DecodedInstruction,
    visitor: &mut V,
) {
    let opcode = insn.opcode;
    if visitor.before_opcode(cx, opcode) {
        visitor.saw_opcode(cx, opcode);
    }
    visitor.after_opcode(cx, opcode);

    if let Some(table) = &insn.switch {
        let base = insn.pc as i32;
        match table.kind {
            SwitchKind::Table { low, high } => {
                visitor.saw_int(cx, low);
                visitor.saw_int(cx, high);
                for entry in &table.entries {
                    visitor.saw_branch_to(cx, base.wrapping_add(entry.offset));
                }
            }
            SwitchKind::Lookup { npairs } => {
                visitor.saw_int(cx, npairs);
                for entry in &table.entries {
                    visitor.saw_branch_to(cx, base.wrapping_add(entry.offset));
                    visitor.saw_int(cx, entry.key);
                }
            }
        }
        visitor.saw_branch_to(cx, table.default_target);
        return;
    }

    for operand in &insn.operands {
        match operand.meaning {
            OperandMeaning::Branch => {
                if let Some(target) = operand.target {
                    visitor.saw_branch_to(cx, target);
                }
                visitor.saw_offset(cx, operand.value);
            }
            OperandMeaning::ConstantPool => emit_constant(cx, operand.value as u16, visitor),
            OperandMeaning::Register => visitor.saw_register(cx, operand.value as u16),
            OperandMeaning::Int => visitor.saw_int(cx, operand.value),
            OperandMeaning::UInt | OperandMeaning::Padding => {}
        }
    }
}

fn emit_constant<V: Visitor + ?Sized>(cx: &VisitorContext<'_>, index: u16, visitor: &mut V) {
    let Ok(entry) = cx.constant_pool().resolve(index) else {
        return;
    };
    match entry {
        ConstantPoolEntry::Integer(value) => visitor.saw_int(cx, *value),
        ConstantPoolEntry::Long(value) => visitor.saw_long(cx, *value),
        ConstantPoolEntry::Float(value) => visitor.saw_float(cx, *value),
        ConstantPoolEntry::Double(value) => visitor.saw_double(cx, *value),
        ConstantPoolEntry::String { string_index } => {
            if let Ok(value) = cx.constant_pool().utf8_at(*string_index) {
                visitor.saw_string(cx, value);
            }
        }
        ConstantPoolEntry::Fieldref { .. } => visitor.saw_field(cx),
        ConstantPoolEntry::Methodref { .. } => visitor.saw_method(cx),
        ConstantPoolEntry::InterfaceMethodref { .. } => visitor.saw_imethod(cx),
        ConstantPoolEntry::Class { .. } => visitor.saw_class(cx),
        _ => {}
    }
}

fn annotations_enabled(config: &VisitorConfig, visibility: Visibility) -> bool {
    config.visit_annotations
        && (visibility.is_runtime_visible() || config.include_invisible_annotations)
}

fn visit_annotations<V: Visitor + ?Sized>(
    cx: &VisitorContext<'_>,
    attribute: &Attribute,
    data: &[u8],
    visibility: Visibility,
    visitor: &mut V,
    report: &mut TraversalReport,
) {
    if !annotations_enabled(cx.config(), visibility) {
        return;
    }
    match decode_annotations(data, cx.constant_pool(), visibility) {
        Ok(annotations) => {
            for annotation in &annotations {
                visitor.visit_annotation(cx, annotation);
            }
        }
        Err(error) => discard_annotations(cx, attribute, error, report),
    }
}

fn visit_parameter_annotations<V: Visitor + ?Sized>(
    cx: &VisitorContext<'_>,
    attribute: &Attribute,
    data: &[u8],
    visibility: Visibility,
    visitor: &mut V,
    report: &mut TraversalReport,
) {
    let config = cx.config();
    if !config.visit_parameter_annotations || !annotations_enabled(config, visibility) {
        return;
    }
    match decode_parameter_annotations(data, cx.constant_pool(), visibility) {
        Ok(parameters) => {
            let offset = cx
                .number_method_arguments()
                .map(|declared| parameter_index_offset(declared, parameters.len()))
                .unwrap_or(0);
            for (index, annotations) in parameters.iter().enumerate() {
                for annotation in annotations {
                    visitor.visit_parameter_annotation(cx, index + offset, annotation);
                }
            }
        }
        Err(error) => discard_annotations(cx, attribute, error, report),
    }
}

fn discard_annotations(
    cx: &VisitorContext<'_>,
    attribute: &Attribute,
    error: AnnotationError,
    report: &mut TraversalReport,
) {
    let owner = owner_label(cx);
    warn!(
        owner = %owner,
        attribute = attribute.name(),
        "discarding malformed annotations: {error}"
    );
    report.discarded_annotations.push(DiscardedAnnotations {
        owner,
        attribute: attribute.name().to_string(),
        error,
    });
}

/// Dotted name of the member or class currently being visited.
fn owner_label(cx: &VisitorContext<'_>) -> String {
    if let Ok(method) = cx.fully_qualified_method_name() {
        return method;
    }
    match cx.field_name() {
        Ok(field) => format!("{}.{}", cx.dotted_class_name(), field),
        Err(_) => cx.dotted_class_name().to_string(),
    }
}
