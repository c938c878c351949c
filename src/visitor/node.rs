use crate::attributes::{
    Attribute, CodeException, InnerClass, LineNumber, LocalVariable, StackMapFrame,
};
use crate::classfile::{ClassFile, MemberInfo};
use crate::constant_pool::{ConstantPool, ConstantPoolEntry};

/// Closed set of node kinds visited during traversal, concrete and generic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Class,
    ConstantPool,

    Constant,
    ConstantUtf8,
    ConstantInteger,
    ConstantFloat,
    ConstantLong,
    ConstantDouble,
    ConstantClass,
    ConstantString,
    ConstantFieldref,
    ConstantMethodref,
    ConstantInterfaceMethodref,
    ConstantNameAndType,
    ConstantMethodHandle,
    ConstantMethodType,
    ConstantDynamic,
    ConstantInvokeDynamic,
    ConstantModule,
    ConstantPackage,

    FieldOrMethod,
    Field,
    Method,

    Attribute,
    Code,
    ConstantValue,
    Exceptions,
    InnerClasses,
    EnclosingMethod,
    Synthetic,
    Signature,
    SourceFile,
    LineNumberTable,
    LocalVariableTable,
    Deprecated,
    StackMapTable,
    Annotations,
    RuntimeVisibleAnnotations,
    RuntimeInvisibleAnnotations,
    ParameterAnnotations,
    RuntimeVisibleParameterAnnotations,
    RuntimeInvisibleParameterAnnotations,
    AnnotationDefault,
    UnknownAttribute,

    CodeException,
    LineNumber,
    LocalVariable,
    InnerClass,
    StackMapFrame,
}

impl NodeKind {
    /// Nearest generic kind, consulted when a visitor leaves this kind unhandled.
    pub fn parent(self) -> Option<NodeKind> {
        use NodeKind as K;

        match self {
            K::ConstantUtf8
            | K::ConstantInteger
            | K::ConstantFloat
            | K::ConstantLong
            | K::ConstantDouble
            | K::ConstantClass
            | K::ConstantString
            | K::ConstantFieldref
            | K::ConstantMethodref
            | K::ConstantInterfaceMethodref
            | K::ConstantNameAndType
            | K::ConstantMethodHandle
            | K::ConstantMethodType
            | K::ConstantDynamic
            | K::ConstantInvokeDynamic
            | K::ConstantModule
            | K::ConstantPackage => Some(K::Constant),
            K::Field | K::Method => Some(K::FieldOrMethod),
            K::RuntimeVisibleAnnotations | K::RuntimeInvisibleAnnotations => Some(K::Annotations),
            K::RuntimeVisibleParameterAnnotations | K::RuntimeInvisibleParameterAnnotations => {
                Some(K::ParameterAnnotations)
            }
            K::Code
            | K::ConstantValue
            | K::Exceptions
            | K::InnerClasses
            | K::EnclosingMethod
            | K::Synthetic
            | K::Signature
            | K::SourceFile
            | K::LineNumberTable
            | K::LocalVariableTable
            | K::Deprecated
            | K::StackMapTable
            | K::Annotations
            | K::ParameterAnnotations
            | K::AnnotationDefault
            | K::UnknownAttribute => Some(K::Attribute),
            K::Class
            | K::ConstantPool
            | K::Constant
            | K::FieldOrMethod
            | K::Attribute
            | K::CodeException
            | K::LineNumber
            | K::LocalVariable
            | K::InnerClass
            | K::StackMapFrame => None,
        }
    }

    /// This kind followed by each generic kind up the fallback chain.
    pub fn fallback_chain(self) -> impl Iterator<Item = NodeKind> {
        std::iter::successors(Some(self), |kind| kind.parent())
    }

    pub fn of_constant(entry: &ConstantPoolEntry) -> NodeKind {
        match entry {
            ConstantPoolEntry::Utf8(_) => NodeKind::ConstantUtf8,
            ConstantPoolEntry::Integer(_) => NodeKind::ConstantInteger,
            ConstantPoolEntry::Float(_) => NodeKind::ConstantFloat,
            ConstantPoolEntry::Long(_) => NodeKind::ConstantLong,
            ConstantPoolEntry::Double(_) => NodeKind::ConstantDouble,
            ConstantPoolEntry::Class { .. } => NodeKind::ConstantClass,
            ConstantPoolEntry::String { .. } => NodeKind::ConstantString,
            ConstantPoolEntry::Fieldref { .. } => NodeKind::ConstantFieldref,
            ConstantPoolEntry::Methodref { .. } => NodeKind::ConstantMethodref,
            ConstantPoolEntry::InterfaceMethodref { .. } => NodeKind::ConstantInterfaceMethodref,
            ConstantPoolEntry::NameAndType { .. } => NodeKind::ConstantNameAndType,
            ConstantPoolEntry::MethodHandle { .. } => NodeKind::ConstantMethodHandle,
            ConstantPoolEntry::MethodType { .. } => NodeKind::ConstantMethodType,
            ConstantPoolEntry::Dynamic { .. } => NodeKind::ConstantDynamic,
            ConstantPoolEntry::InvokeDynamic { .. } => NodeKind::ConstantInvokeDynamic,
            ConstantPoolEntry::Module { .. } => NodeKind::ConstantModule,
            ConstantPoolEntry::Package { .. } => NodeKind::ConstantPackage,
        }
    }

    pub fn of_attribute(attribute: &Attribute) -> NodeKind {
        match attribute {
            Attribute::Code(_) => NodeKind::Code,
            Attribute::ConstantValue { .. } => NodeKind::ConstantValue,
            Attribute::Exceptions { .. } => NodeKind::Exceptions,
            Attribute::InnerClasses(_) => NodeKind::InnerClasses,
            Attribute::EnclosingMethod { .. } => NodeKind::EnclosingMethod,
            Attribute::Synthetic => NodeKind::Synthetic,
            Attribute::Signature { .. } => NodeKind::Signature,
            Attribute::SourceFile { .. } => NodeKind::SourceFile,
            Attribute::LineNumberTable(_) => NodeKind::LineNumberTable,
            Attribute::LocalVariableTable(_) => NodeKind::LocalVariableTable,
            Attribute::Deprecated => NodeKind::Deprecated,
            Attribute::StackMapTable(_) => NodeKind::StackMapTable,
            Attribute::RuntimeVisibleAnnotations(_) => NodeKind::RuntimeVisibleAnnotations,
            Attribute::RuntimeInvisibleAnnotations(_) => NodeKind::RuntimeInvisibleAnnotations,
            Attribute::RuntimeVisibleParameterAnnotations(_) => {
                NodeKind::RuntimeVisibleParameterAnnotations
            }
            Attribute::RuntimeInvisibleParameterAnnotations(_) => {
                NodeKind::RuntimeInvisibleParameterAnnotations
            }
            Attribute::AnnotationDefault(_) => NodeKind::AnnotationDefault,
            Attribute::Unknown { .. } => NodeKind::UnknownAttribute,
        }
    }
}

/// A borrowed view of one element of the class being traversed.
#[derive(Clone, Copy, Debug)]
pub enum Node<'a> {
    Class(&'a ClassFile),
    ConstantPool(&'a ConstantPool),
    Constant {
        index: u16,
        entry: &'a ConstantPoolEntry,
    },
    Field(&'a MemberInfo),
    Method(&'a MemberInfo),
    Attribute(&'a Attribute),
    CodeException(&'a CodeException),
    LineNumber(&'a LineNumber),
    LocalVariable(&'a LocalVariable),
    InnerClass(&'a InnerClass),
    StackMapFrame(&'a StackMapFrame),
}

impl Node<'_> {
    /// Most specific kind of this node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Class(_) => NodeKind::Class,
            Node::ConstantPool(_) => NodeKind::ConstantPool,
            Node::Constant { entry, .. } => NodeKind::of_constant(entry),
            Node::Field(_) => NodeKind::Field,
            Node::Method(_) => NodeKind::Method,
            Node::Attribute(attribute) => NodeKind::of_attribute(attribute),
            Node::CodeException(_) => NodeKind::CodeException,
            Node::LineNumber(_) => NodeKind::LineNumber,
            Node::LocalVariable(_) => NodeKind::LocalVariable,
            Node::InnerClass(_) => NodeKind::InnerClass,
            Node::StackMapFrame(_) => NodeKind::StackMapFrame,
        }
    }
}
