use crate::attributes::{CodeAttribute, CodeException};
use crate::classfile::{ClassFile, MemberInfo};
use crate::config::VisitorConfig;
use crate::constant_pool::ConstantPool;
use crate::decoder::DecodeState;
use crate::descriptor::{method_param_count, returns_void};
use crate::error::{ClassFormatError, NotAvailable};
use crate::opcodes;

/// Where a traversal currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    VisitingClass,
    VisitingConstantPool,
    VisitingMembers,
    VisitingMethodCode,
    VisitingAttributes,
    Done,
}

/// Resolved names of the field or method being visited.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MemberFrame<'a> {
    pub(crate) info: &'a MemberInfo,
    pub(crate) name: &'a str,
    pub(crate) sig: &'a str,
}

/// Mutable per-traversal state handed to every visitor callback.
///
/// One context belongs to one class traversal; contexts are never shared.
#[derive(Debug)]
pub struct VisitorContext<'a> {
    class: &'a ClassFile,
    config: VisitorConfig,
    class_name: &'a str,
    dotted_class_name: String,
    superclass_name: Option<&'a str>,
    pub(crate) phase: Phase,
    pub(crate) field: Option<MemberFrame<'a>>,
    pub(crate) method: Option<MemberFrame<'a>>,
    pub(crate) code: Option<&'a CodeAttribute>,
    pub(crate) decode: DecodeState<'a>,
    /// Set while instruction callbacks for the current instruction run.
    pub(crate) in_instruction: bool,
}

impl<'a> VisitorContext<'a> {
    pub fn new(class: &'a ClassFile, config: VisitorConfig) -> Result<Self, ClassFormatError> {
        let class_name = class.class_name()?;
        let superclass_name = class.super_class_name()?;
        Ok(Self {
            class,
            config,
            class_name,
            dotted_class_name: class_name.replace('/', "."),
            superclass_name,
            phase: Phase::NotStarted,
            field: None,
            method: None,
            code: None,
            decode: DecodeState::new(),
            in_instruction: false,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &VisitorConfig {
        &self.config
    }

    pub fn class(&self) -> &'a ClassFile {
        self.class
    }

    pub fn constant_pool(&self) -> &'a ConstantPool {
        &self.class.constant_pool
    }

    /// Slash-separated name, e.g. `java/util/List`.
    pub fn class_name(&self) -> &'a str {
        self.class_name
    }

    pub fn dotted_class_name(&self) -> &str {
        &self.dotted_class_name
    }

    /// Slash-separated superclass name; `None` only for `java/lang/Object`.
    pub fn superclass_name(&self) -> Option<&'a str> {
        self.superclass_name
    }

    pub fn dotted_superclass_name(&self) -> Option<String> {
        self.superclass_name.map(|name| name.replace('/', "."))
    }

    /// Dotted package name; empty for the default package.
    pub fn package_name(&self) -> String {
        match self.class_name.rfind('/') {
            Some(end) => self.class_name[..end].replace('/', "."),
            None => String::new(),
        }
    }

    pub fn source_file(&self) -> Option<&'a str> {
        self.class.source_file()
    }

    pub fn field(&self) -> Result<&'a MemberInfo, NotAvailable> {
        self.field
            .map(|frame| frame.info)
            .ok_or(NotAvailable::new("field"))
    }

    pub fn field_name(&self) -> Result<&'a str, NotAvailable> {
        self.field
            .map(|frame| frame.name)
            .ok_or(NotAvailable::new("field_name"))
    }

    pub fn field_sig(&self) -> Result<&'a str, NotAvailable> {
        self.field
            .map(|frame| frame.sig)
            .ok_or(NotAvailable::new("field_sig"))
    }

    pub fn field_is_static(&self) -> Result<bool, NotAvailable> {
        self.field
            .map(|frame| frame.info.is_static())
            .ok_or(NotAvailable::new("field_is_static"))
    }

    pub fn method(&self) -> Result<&'a MemberInfo, NotAvailable> {
        self.method
            .map(|frame| frame.info)
            .ok_or(NotAvailable::new("method"))
    }

    pub fn method_name(&self) -> Result<&'a str, NotAvailable> {
        self.method
            .map(|frame| frame.name)
            .ok_or(NotAvailable::new("method_name"))
    }

    pub fn method_sig(&self) -> Result<&'a str, NotAvailable> {
        self.method
            .map(|frame| frame.sig)
            .ok_or(NotAvailable::new("method_sig"))
    }

    /// `dotted.Class.name(signature)` of the current method.
    pub fn fully_qualified_method_name(&self) -> Result<String, NotAvailable> {
        self.method
            .map(|frame| format!("{}.{}{}", self.dotted_class_name, frame.name, frame.sig))
            .ok_or(NotAvailable::new("fully_qualified_method_name"))
    }

    /// Declared parameter count of the current method, from its descriptor.
    pub fn number_method_arguments(&self) -> Result<usize, NotAvailable> {
        self.method
            .and_then(|frame| method_param_count(frame.sig))
            .ok_or(NotAvailable::new("number_method_arguments"))
    }

    pub fn method_returns_void(&self) -> Result<bool, NotAvailable> {
        self.method
            .and_then(|frame| returns_void(frame.sig))
            .ok_or(NotAvailable::new("method_returns_void"))
    }

    /// Whether the current method is `public static void main(String[])`.
    pub fn am_visiting_main_method(&self) -> Result<bool, NotAvailable> {
        self.method
            .map(|frame| {
                frame.info.is_static()
                    && frame.name == "main"
                    && frame.sig == "([Ljava/lang/String;)V"
            })
            .ok_or(NotAvailable::new("am_visiting_main_method"))
    }

    pub fn code(&self) -> Result<&'a CodeAttribute, NotAvailable> {
        self.code.ok_or(NotAvailable::new("code"))
    }

    /// Decode state of the current instruction; only available inside the
    /// per-instruction callbacks.
    pub fn instruction(&self) -> Result<&DecodeState<'a>, NotAvailable> {
        if self.in_instruction {
            Ok(&self.decode)
        } else {
            Err(NotAvailable::new("instruction"))
        }
    }

    /// Opcode `offset` instructions back; `nop` when outside code or past
    /// the available history.
    pub fn prev_opcode(&self, offset: usize) -> u8 {
        if self.code.is_none() {
            return opcodes::NOP;
        }
        self.decode.prev_opcode(offset)
    }

    /// Opcode byte immediately after the current instruction.
    pub fn next_opcode(&self) -> Result<u8, NotAvailable> {
        let next_pc = self.instruction()?.next_pc()?;
        self.code_byte(next_pc)
            .map_err(|_| NotAvailable::new("next_opcode"))
    }

    pub fn code_byte(&self, offset: u32) -> Result<u8, NotAvailable> {
        self.code
            .and_then(|code| code.code.get(offset as usize).copied())
            .ok_or(NotAvailable::new("code_byte"))
    }

    /// Last valid pc of the current code array.
    pub fn max_pc(&self) -> Result<u32, NotAvailable> {
        self.code
            .and_then(|code| (code.code.len() as u32).checked_sub(1))
            .ok_or(NotAvailable::new("max_pc"))
    }

    /// Whether the current instruction starts an exception handler.
    pub fn at_catch_block(&self) -> Result<bool, NotAvailable> {
        let code = self.code()?;
        let pc = self.instruction()?.pc()?;
        Ok(code
            .exception_table
            .iter()
            .any(|entry| entry.handler_pc as u32 == pc))
    }

    /// Catch types (class indexes, 0 for catch-all) of the innermost try
    /// blocks covering `pc`. Block ends are treated as inclusive.
    pub fn surrounding_caught_exceptions(&self, pc: u32) -> Result<Vec<u16>, NotAvailable> {
        let code = self
            .code
            .ok_or(NotAvailable::new("surrounding_caught_exceptions"))?;
        let mut smallest = u32::MAX;
        let mut caught = Vec::new();
        for entry in &code.exception_table {
            let (start, end) = (entry.start_pc as u32, entry.end_pc as u32);
            if pc < start || pc > end {
                continue;
            }
            let size = end - start;
            if size < smallest {
                smallest = size;
                caught.clear();
            }
            if size == smallest && !caught.contains(&entry.catch_type) {
                caught.push(entry.catch_type);
            }
        }
        Ok(caught)
    }

    /// Innermost exception-table entry whose try block covers `pc`.
    ///
    /// `catch_type` restricts the search to handlers for that slash-separated
    /// class; an empty name selects catch-all handlers. Block ends are
    /// inclusive, and the first of several equally small blocks wins.
    pub fn surrounding_try_block(
        &self,
        catch_type: Option<&str>,
        pc: u32,
    ) -> Result<Option<&'a CodeException>, NotAvailable> {
        let code = self.code.ok_or(NotAvailable::new("surrounding_try_block"))?;
        let pool = self.constant_pool();
        let mut innermost: Option<&'a CodeException> = None;
        for entry in &code.exception_table {
            if let Some(wanted) = catch_type {
                let caught = match entry.catch_type {
                    0 => Some(""),
                    index => pool.class_name_at(index).ok(),
                };
                if caught != Some(wanted) {
                    continue;
                }
            }
            let (start, end) = (entry.start_pc as u32, entry.end_pc as u32);
            if pc < start || pc > end {
                continue;
            }
            let size = end - start;
            if innermost.is_none_or(|best| size < best.end_pc as u32 - best.start_pc as u32) {
                innermost = Some(entry);
            }
        }
        Ok(innermost)
    }

    /// Length in bytes of the block [`surrounding_try_block`](Self::surrounding_try_block)
    /// finds, or `None` when no handler covers `pc`.
    pub fn size_of_surrounding_try_block(
        &self,
        catch_type: Option<&str>,
        pc: u32,
    ) -> Result<Option<u32>, NotAvailable> {
        let block = self
            .surrounding_try_block(catch_type, pc)
            .map_err(|_| NotAvailable::new("size_of_surrounding_try_block"))?;
        Ok(block.map(|entry| entry.end_pc as u32 - entry.start_pc as u32))
    }

    /// Source line of the current instruction, if a LineNumberTable exists.
    pub fn line_number(&self) -> Option<u32> {
        let pc = self.instruction().ok()?.pc().ok()?;
        self.code?.line_for_pc(pc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::{ICONST_0, IRETURN, NOP, RETURN};
    use crate::test_harness::{ClassFileBuilder, CodeSpec};

    fn parse(bytes: &[u8]) -> ClassFile {
        ClassFile::parse(bytes).expect("parse class")
    }

    #[test]
    fn class_names_are_available_in_both_forms() {
        let mut builder = ClassFileBuilder::new("com/example/deep/Sample", "com/example/Base");
        builder.set_source_file("Sample.java");
        let class = parse(&builder.finish());

        let cx = VisitorContext::new(&class, VisitorConfig::default()).expect("context");

        assert_eq!(cx.class_name(), "com/example/deep/Sample");
        assert_eq!(cx.dotted_class_name(), "com.example.deep.Sample");
        assert_eq!(cx.superclass_name(), Some("com/example/Base"));
        assert_eq!(cx.dotted_superclass_name().as_deref(), Some("com.example.Base"));
        assert_eq!(cx.package_name(), "com.example.deep");
        assert_eq!(cx.source_file(), Some("Sample.java"));
        assert_eq!(cx.phase(), Phase::NotStarted);
    }

    #[test]
    fn default_package_is_empty() {
        let class = parse(&ClassFileBuilder::new("Sample", "java/lang/Object").finish());

        let cx = VisitorContext::new(&class, VisitorConfig::default()).expect("context");

        assert_eq!(cx.package_name(), "");
    }

    #[test]
    fn member_accessors_fail_outside_members() {
        let class = parse(&ClassFileBuilder::new("Sample", "java/lang/Object").finish());

        let cx = VisitorContext::new(&class, VisitorConfig::default()).expect("context");

        assert_eq!(
            cx.method_name(),
            Err(NotAvailable {
                accessor: "method_name"
            })
        );
        assert_eq!(
            cx.field_sig(),
            Err(NotAvailable {
                accessor: "field_sig"
            })
        );
        assert_eq!(
            cx.max_pc(),
            Err(NotAvailable { accessor: "max_pc" })
        );
        assert_eq!(cx.prev_opcode(0), NOP);
    }

    #[test]
    fn method_frame_exposes_signature_details() {
        let mut builder = ClassFileBuilder::new("com/example/Sample", "java/lang/Object");
        builder.add_method(
            0x0009,
            "sum",
            "(IJLjava/lang/String;[D)I",
            Some(CodeSpec::new(1, 6, vec![ICONST_0, IRETURN])),
            Vec::new(),
        );
        let class = parse(&builder.finish());
        let method = &class.methods[0];
        let pool = &class.constant_pool;

        let mut cx = VisitorContext::new(&class, VisitorConfig::default()).expect("context");
        cx.method = Some(MemberFrame {
            info: method,
            name: method.name(pool).expect("name"),
            sig: method.descriptor(pool).expect("descriptor"),
        });
        cx.code = method.code();

        assert_eq!(
            cx.fully_qualified_method_name().as_deref(),
            Ok("com.example.Sample.sum(IJLjava/lang/String;[D)I")
        );
        assert_eq!(cx.number_method_arguments(), Ok(4));
        assert_eq!(cx.max_pc(), Ok(1));
        assert_eq!(cx.code_byte(1), Ok(IRETURN));
        assert!(cx.method().expect("method").is_static());
    }

    #[test]
    fn innermost_try_blocks_win() {
        let mut builder = ClassFileBuilder::new("com/example/Sample", "java/lang/Object");
        let io = builder.class("java/io/IOException");
        let state = builder.class("java/lang/IllegalStateException");
        let code = CodeSpec::new(1, 1, vec![ICONST_0; 12].into_iter().chain([RETURN]).collect())
            .with_exception(0, 10, 11, 0)
            .with_exception(2, 4, 11, io)
            .with_exception(2, 4, 11, state);
        builder.add_method(0x0001, "run", "()V", Some(code), Vec::new());
        let class = parse(&builder.finish());

        let mut cx = VisitorContext::new(&class, VisitorConfig::default()).expect("context");
        cx.code = class.methods[0].code();

        assert_eq!(cx.surrounding_caught_exceptions(3), Ok(vec![io, state]));
        assert_eq!(cx.surrounding_caught_exceptions(4), Ok(vec![io, state]));
        assert_eq!(cx.surrounding_caught_exceptions(8), Ok(vec![0]));
        assert_eq!(cx.surrounding_caught_exceptions(11), Ok(Vec::new()));
    }

    #[test]
    fn surrounding_try_block_picks_innermost_handler_per_catch_type() {
        let mut builder = ClassFileBuilder::new("com/example/Sample", "java/lang/Object");
        let io = builder.class("java/io/IOException");
        let state = builder.class("java/lang/IllegalStateException");
        let code = CodeSpec::new(1, 1, vec![ICONST_0; 12].into_iter().chain([RETURN]).collect())
            .with_exception(0, 10, 11, io)
            .with_exception(2, 6, 11, state)
            .with_exception(3, 4, 11, 0);
        builder.add_method(0x0001, "run", "()V", Some(code), Vec::new());
        let class = parse(&builder.finish());

        let mut cx = VisitorContext::new(&class, VisitorConfig::default()).expect("context");
        assert_eq!(
            cx.surrounding_try_block(None, 3),
            Err(NotAvailable {
                accessor: "surrounding_try_block"
            })
        );
        cx.code = class.methods[0].code();

        let any = cx.surrounding_try_block(None, 3).expect("in code");
        assert_eq!(any.map(|entry| entry.start_pc), Some(3));
        assert_eq!(cx.size_of_surrounding_try_block(None, 3), Ok(Some(1)));

        let io_block = cx
            .surrounding_try_block(Some("java/io/IOException"), 3)
            .expect("in code");
        assert_eq!(io_block.map(|entry| entry.catch_type), Some(io));
        assert_eq!(
            cx.size_of_surrounding_try_block(Some("java/io/IOException"), 3),
            Ok(Some(10))
        );

        let finally = cx.surrounding_try_block(Some(""), 4).expect("in code");
        assert_eq!(finally.map(|entry| entry.catch_type), Some(0));

        assert_eq!(cx.size_of_surrounding_try_block(None, 5), Ok(Some(4)));
        assert_eq!(cx.surrounding_try_block(None, 11), Ok(None));
        assert_eq!(
            cx.surrounding_try_block(Some("java/lang/Error"), 3),
            Ok(None)
        );
    }

    #[test]
    fn main_method_and_void_return_are_recognised() {
        let mut builder = ClassFileBuilder::new("com/example/App", "java/lang/Object");
        builder.add_method(0x0009, "main", "([Ljava/lang/String;)V", None, Vec::new());
        builder.add_method(0x0001, "main", "([Ljava/lang/String;)V", None, Vec::new());
        builder.add_method(0x0009, "count", "()I", None, Vec::new());
        let class = parse(&builder.finish());
        let pool = &class.constant_pool;
        let frame = |index: usize| {
            let method = &class.methods[index];
            MemberFrame {
                info: method,
                name: method.name(pool).expect("name"),
                sig: method.descriptor(pool).expect("descriptor"),
            }
        };

        let mut cx = VisitorContext::new(&class, VisitorConfig::default()).expect("context");
        assert!(cx.am_visiting_main_method().is_err());

        cx.method = Some(frame(0));
        assert_eq!(cx.am_visiting_main_method(), Ok(true));
        assert_eq!(cx.method_returns_void(), Ok(true));

        cx.method = Some(frame(1));
        assert_eq!(cx.am_visiting_main_method(), Ok(false));

        cx.method = Some(frame(2));
        assert_eq!(cx.am_visiting_main_method(), Ok(false));
        assert_eq!(cx.method_returns_void(), Ok(false));
    }
}
