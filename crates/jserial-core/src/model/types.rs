//! Field type codes and type-descriptor resolution.

use crate::error::{Error, Result};

/// Type of a field slot, as encoded by its one-byte type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `[`
    Array,
    /// `L`
    Object,
}

impl TryFrom<u8> for FieldType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            b'B' => Ok(FieldType::Byte),
            b'C' => Ok(FieldType::Char),
            b'D' => Ok(FieldType::Double),
            b'F' => Ok(FieldType::Float),
            b'I' => Ok(FieldType::Int),
            b'J' => Ok(FieldType::Long),
            b'S' => Ok(FieldType::Short),
            b'Z' => Ok(FieldType::Boolean),
            b'[' => Ok(FieldType::Array),
            b'L' => Ok(FieldType::Object),
            _ => Err(Error::validity(format!(
                "invalid field type code {:#04x}",
                value
            ))),
        }
    }
}

impl FieldType {
    /// The type code character
    pub fn code(self) -> char {
        match self {
            FieldType::Byte => 'B',
            FieldType::Char => 'C',
            FieldType::Double => 'D',
            FieldType::Float => 'F',
            FieldType::Int => 'I',
            FieldType::Long => 'J',
            FieldType::Short => 'S',
            FieldType::Boolean => 'Z',
            FieldType::Array => '[',
            FieldType::Object => 'L',
        }
    }

    /// True for `[` and `L`
    pub fn is_reference(self) -> bool {
        matches!(self, FieldType::Array | FieldType::Object)
    }

    /// Source-language name of a primitive type
    pub fn primitive_name(self) -> Option<&'static str> {
        match self {
            FieldType::Byte => Some("byte"),
            FieldType::Char => Some("char"),
            FieldType::Double => Some("double"),
            FieldType::Float => Some("float"),
            FieldType::Int => Some("int"),
            FieldType::Long => Some("long"),
            FieldType::Short => Some("short"),
            FieldType::Boolean => Some("boolean"),
            FieldType::Array | FieldType::Object => None,
        }
    }
}

/// Decodes `Lpkg/Name;` into `pkg.Name` (or `pkg/Name` without slash conversion).
pub fn decode_class_name(descriptor: &str, convert_slashes: bool) -> Result<String> {
    let inner = descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .filter(|inner| !inner.is_empty())
        .ok_or_else(|| {
            Error::validity(format!(
                "invalid name (not in field-descriptor format): {}",
                descriptor
            ))
        })?;
    if convert_slashes {
        Ok(inner.replace('/', "."))
    } else {
        Ok(inner.to_string())
    }
}

/// Resolves a field's type to a source-like type name.
///
/// `descriptor` is the class-name text carried by reference fields (and
/// the class name of array classes); it is ignored for primitives.
pub fn resolve_type_name(
    ty: FieldType,
    descriptor: Option<&str>,
    convert_slashes: bool,
) -> Result<String> {
    if let Some(name) = ty.primitive_name() {
        return Ok(name.to_string());
    }
    let descriptor = descriptor
        .ok_or_else(|| Error::validity("reference field without a class name"))?;

    if ty == FieldType::Object {
        return decode_class_name(descriptor, convert_slashes);
    }

    let dims = descriptor.bytes().take_while(|&b| b == b'[').count();
    let element = &descriptor[dims..];
    if dims == 0 || element.is_empty() {
        return Err(Error::validity(format!(
            "array field type descriptor is too short: {}",
            descriptor
        )));
    }
    let base = if element.starts_with('L') {
        decode_class_name(element, convert_slashes)?
    } else {
        if element.len() != 1 {
            return Err(Error::validity(format!(
                "array field type descriptor is too long: {}",
                descriptor
            )));
        }
        let elem_type = FieldType::try_from(element.as_bytes()[0])?;
        elem_type
            .primitive_name()
            .ok_or_else(|| {
                Error::validity(format!("invalid array element type in {}", descriptor))
            })?
            .to_string()
    };
    Ok(format!("{}{}", base, "[]".repeat(dims)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_conversion() {
        assert_eq!(FieldType::try_from(b'J').unwrap(), FieldType::Long);
        assert_eq!(FieldType::try_from(b'[').unwrap(), FieldType::Array);
        assert!(FieldType::try_from(b'X').is_err());
        assert_eq!(FieldType::Short.primitive_name(), Some("short"));
        assert!(FieldType::Object.is_reference());
    }

    #[test]
    fn test_decode_class_name() {
        assert_eq!(
            decode_class_name("Ljava/lang/String;", true).unwrap(),
            "java.lang.String"
        );
        assert_eq!(
            decode_class_name("Ljava/lang/String;", false).unwrap(),
            "java/lang/String"
        );
        assert!(decode_class_name("L;", true).is_err());
        assert!(decode_class_name("java/lang/String", true).is_err());
    }

    #[test]
    fn test_resolve_type_name() {
        assert_eq!(resolve_type_name(FieldType::Int, None, true).unwrap(), "int");
        assert_eq!(
            resolve_type_name(FieldType::Object, Some("Lcom/x/Foo;"), true).unwrap(),
            "com.x.Foo"
        );
        assert_eq!(
            resolve_type_name(FieldType::Array, Some("[[I"), true).unwrap(),
            "int[][]"
        );
        assert_eq!(
            resolve_type_name(FieldType::Array, Some("[Ljava/lang/Object;"), true).unwrap(),
            "java.lang.Object[]"
        );
        assert!(resolve_type_name(FieldType::Array, Some("["), true).is_err());
        assert!(resolve_type_name(FieldType::Array, Some("[II"), true).is_err());
        assert!(resolve_type_name(FieldType::Object, None, true).is_err());
    }
}
