use std::str::FromStr;

use jdescriptor::{MethodDescriptor, TypeDescriptor};

/// Count parameters in a JVM method descriptor, or `None` if it does not parse.
pub fn method_param_count(descriptor: &str) -> Option<usize> {
    let descriptor = MethodDescriptor::from_str(descriptor).ok()?;
    Some(descriptor.parameter_types().len())
}

/// Whether a JVM method descriptor returns `void`.
pub fn returns_void(descriptor: &str) -> Option<bool> {
    let descriptor = MethodDescriptor::from_str(descriptor).ok()?;
    Some(matches!(descriptor.return_type(), TypeDescriptor::Void))
}

/// Dotted class name from a field descriptor such as `Ljava/lang/Deprecated;`.
/// Other descriptors are returned with slashes replaced.
pub fn dotted_type_name(descriptor: &str) -> String {
    let name = descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .unwrap_or(descriptor);
    name.replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_parameters_including_wide_and_array_types() {
        assert_eq!(method_param_count("()V"), Some(0));
        assert_eq!(method_param_count("(IJ[Ljava/lang/String;D)Z"), Some(4));
        assert_eq!(method_param_count("not a descriptor"), None);
    }

    #[test]
    fn detects_void_return() {
        assert_eq!(returns_void("(I)V"), Some(true));
        assert_eq!(returns_void("()Ljava/lang/Object;"), Some(false));
    }

    #[test]
    fn dotted_type_name_strips_object_markers() {
        assert_eq!(
            dotted_type_name("Ljavax/annotation/Nonnull;"),
            "javax.annotation.Nonnull"
        );
        assert_eq!(dotted_type_name("java/lang/Object"), "java.lang.Object");
    }
}
