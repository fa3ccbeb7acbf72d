//! Type and method descriptors
//!
//! Descriptors use the compact single-letter notation: `Z B C S I J F D` for
//! primitives, `L<name>;` for object references and `[<type>` for arrays.
//! Method descriptors are written `(<params>)<ret>` where the return may be
//! `V` for void.

use crate::instruction::Kind;
use std::fmt;
use thiserror::Error;

/// Descriptor parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Input ended in the middle of a descriptor
    #[error("Unexpected end of descriptor {0:?}")]
    UnexpectedEnd(String),

    /// Unknown type tag
    #[error("Invalid type tag {tag:?} at offset {offset} in {descriptor:?}")]
    InvalidTag {
        /// Offending character
        tag: char,
        /// Byte offset of the tag
        offset: usize,
        /// Full descriptor text
        descriptor: String,
    },

    /// Method descriptor does not start with `(`
    #[error("Method descriptor must start with '(': {0:?}")]
    MissingParams(String),

    /// Trailing characters after a complete descriptor
    #[error("Trailing characters in descriptor {0:?}")]
    Trailing(String),
}

/// A value type: anything that can live in a local slot or on the stack
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `L<name>;`
    Object(String),
    /// `[<elem>`
    Array(Box<ValueType>),
}

impl ValueType {
    /// Object reference type for the given internal class name
    pub fn object(name: impl Into<String>) -> Self {
        Self::Object(name.into())
    }

    /// Number of stack/local slots the value occupies
    pub fn slots(&self) -> u16 {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    /// True for everything except references and arrays
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Object(_) | Self::Array(_))
    }

    /// Computational kind used by load/store/return instructions
    pub fn kind(&self) -> Kind {
        match self {
            Self::Boolean | Self::Byte | Self::Char | Self::Short | Self::Int => Kind::Int,
            Self::Long => Kind::Long,
            Self::Float => Kind::Float,
            Self::Double => Kind::Double,
            Self::Object(_) | Self::Array(_) => Kind::Ref,
        }
    }

    /// Box class for a primitive type, `None` for references
    pub fn box_class(&self) -> Option<&'static str> {
        match self {
            Self::Boolean => Some("lang/Boolean"),
            Self::Byte => Some("lang/Byte"),
            Self::Char => Some("lang/Character"),
            Self::Short => Some("lang/Short"),
            Self::Int => Some("lang/Integer"),
            Self::Long => Some("lang/Long"),
            Self::Float => Some("lang/Float"),
            Self::Double => Some("lang/Double"),
            Self::Object(_) | Self::Array(_) => None,
        }
    }

    /// Parse a single field descriptor
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let mut cursor = Cursor::new(text);
        let ty = cursor.value_type()?;
        if cursor.pos != text.len() {
            return Err(DescriptorError::Trailing(text.to_string()));
        }
        Ok(ty)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("Z"),
            Self::Byte => f.write_str("B"),
            Self::Char => f.write_str("C"),
            Self::Short => f.write_str("S"),
            Self::Int => f.write_str("I"),
            Self::Long => f.write_str("J"),
            Self::Float => f.write_str("F"),
            Self::Double => f.write_str("D"),
            Self::Object(name) => write!(f, "L{};", name),
            Self::Array(elem) => write!(f, "[{}", elem),
        }
    }
}

/// Method return type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// `V`
    Void,
    /// Any value type
    Value(ValueType),
}

impl ReturnType {
    /// Returns the value type, if not void
    pub fn value(&self) -> Option<&ValueType> {
        match self {
            Self::Void => None,
            Self::Value(ty) => Some(ty),
        }
    }

    /// Slots occupied by the returned value (0 for void)
    pub fn slots(&self) -> u16 {
        self.value().map_or(0, ValueType::slots)
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("V"),
            Self::Value(ty) => ty.fmt(f),
        }
    }
}

/// Parameter types plus return type of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Declared parameter types (receiver excluded)
    pub params: Vec<ValueType>,
    /// Return type
    pub ret: ReturnType,
}

impl MethodDescriptor {
    /// Build a descriptor from parts
    pub fn new(params: Vec<ValueType>, ret: ReturnType) -> Self {
        Self { params, ret }
    }

    /// Parse `(<params>)<ret>`
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let mut cursor = Cursor::new(text);
        if cursor.next() != Some(b'(') {
            return Err(DescriptorError::MissingParams(text.to_string()));
        }
        let mut params = Vec::new();
        loop {
            match cursor.peek() {
                Some(b')') => {
                    cursor.pos += 1;
                    break;
                }
                Some(_) => params.push(cursor.value_type()?),
                None => return Err(DescriptorError::UnexpectedEnd(text.to_string())),
            }
        }
        let ret = if cursor.peek() == Some(b'V') {
            cursor.pos += 1;
            ReturnType::Void
        } else {
            ReturnType::Value(cursor.value_type()?)
        };
        if cursor.pos != text.len() {
            return Err(DescriptorError::Trailing(text.to_string()));
        }
        Ok(Self { params, ret })
    }

    /// Slots taken by the declared parameters
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(ValueType::slots).sum()
    }

    /// Same descriptor with `first` prepended to the parameter list
    pub fn with_leading_param(&self, first: ValueType) -> Self {
        let mut params = Vec::with_capacity(self.params.len() + 1);
        params.push(first);
        params.extend(self.params.iter().cloned());
        Self {
            params,
            ret: self.ret.clone(),
        }
    }

    /// Same parameters with a different return type
    pub fn with_return(&self, ret: ReturnType) -> Self {
        Self {
            params: self.params.clone(),
            ret,
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            param.fmt(f)?;
        }
        f.write_str(")")?;
        self.ret.fmt(f)
    }
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn value_type(&mut self) -> Result<ValueType, DescriptorError> {
        let offset = self.pos;
        let tag = self
            .next()
            .ok_or_else(|| DescriptorError::UnexpectedEnd(self.text.to_string()))?;
        Ok(match tag {
            b'Z' => ValueType::Boolean,
            b'B' => ValueType::Byte,
            b'C' => ValueType::Char,
            b'S' => ValueType::Short,
            b'I' => ValueType::Int,
            b'J' => ValueType::Long,
            b'F' => ValueType::Float,
            b'D' => ValueType::Double,
            b'[' => ValueType::Array(Box::new(self.value_type()?)),
            b'L' => {
                let rest = &self.text[self.pos..];
                let end = rest
                    .find(';')
                    .ok_or_else(|| DescriptorError::UnexpectedEnd(self.text.to_string()))?;
                let name = &rest[..end];
                if name.is_empty() {
                    return Err(DescriptorError::InvalidTag {
                        tag: ';',
                        offset: self.pos,
                        descriptor: self.text.to_string(),
                    });
                }
                self.pos += end + 1;
                ValueType::Object(name.to_string())
            }
            other => {
                return Err(DescriptorError::InvalidTag {
                    tag: other as char,
                    offset,
                    descriptor: self.text.to_string(),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_descriptor() {
        let desc = MethodDescriptor::parse("(ILaccounts/Account;[J)Z").unwrap();
        assert_eq!(
            desc.params,
            vec![
                ValueType::Int,
                ValueType::object("accounts/Account"),
                ValueType::Array(Box::new(ValueType::Long)),
            ]
        );
        assert_eq!(desc.ret, ReturnType::Value(ValueType::Boolean));
        assert_eq!(desc.to_string(), "(ILaccounts/Account;[J)Z");
    }

    #[test]
    fn test_void_and_empty() {
        let desc = MethodDescriptor::parse("()V").unwrap();
        assert!(desc.params.is_empty());
        assert_eq!(desc.ret, ReturnType::Void);
        assert_eq!(desc.param_slots(), 0);
    }

    #[test]
    fn test_wide_slots() {
        let desc = MethodDescriptor::parse("(JID)J").unwrap();
        assert_eq!(desc.param_slots(), 5);
        assert_eq!(desc.ret.slots(), 2);
    }

    #[test]
    fn test_leading_param() {
        let desc = MethodDescriptor::parse("(I)Z").unwrap();
        let spec = desc.with_leading_param(ValueType::object("Account"));
        assert_eq!(spec.to_string(), "(LAccount;I)Z");
    }

    #[test]
    fn test_invalid_descriptors() {
        assert!(matches!(
            MethodDescriptor::parse("I)V"),
            Err(DescriptorError::MissingParams(_))
        ));
        assert!(matches!(
            MethodDescriptor::parse("(Q)V"),
            Err(DescriptorError::InvalidTag { tag: 'Q', .. })
        ));
        assert!(matches!(
            MethodDescriptor::parse("(LAccount"),
            Err(DescriptorError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            MethodDescriptor::parse("()VV"),
            Err(DescriptorError::Trailing(_))
        ));
        assert!(ValueType::parse("L;").is_err());
    }

    #[test]
    fn test_box_classes() {
        assert_eq!(ValueType::Int.box_class(), Some("lang/Integer"));
        assert_eq!(ValueType::Boolean.box_class(), Some("lang/Boolean"));
        assert_eq!(ValueType::object("X").box_class(), None);
        assert!(!ValueType::Array(Box::new(ValueType::Int)).is_primitive());
    }
}
