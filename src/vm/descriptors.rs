use super::{BinaryName, Name};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => {
                let msg = format!("Unexpected leftover input '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                let msg = format!("Invalid base type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing base type character";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        };
        Ok(typ)
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    Array(Box<FieldType>),
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if let Some('L') = source.next() {
            let mut class_name = String::new();
            loop {
                let c: char = source.next().ok_or_else(|| {
                    let msg = format!("Missing terminator for 'L{}'", class_name);
                    Error::new(ErrorKind::UnexpectedEof, msg)
                })?;
                if c == ';' {
                    return BinaryName::from_string(class_name)
                        .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg));
                } else {
                    class_name.push(c)
                }
            }
        } else {
            Err(Error::new(
                ErrorKind::InvalidInput,
                "Expected object type to start with `L`",
            ))
        }
    }
}

impl RenderDescriptor for RefType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::Array(element) => {
                write_to.push('[');
                element.render_to(write_to);
            }
        }
    }
}

impl ParseDescriptor for RefType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            Some('L') => Ok(RefType::Object(BinaryName::parse_from(source)?)),
            Some('[') => {
                source.next();
                let element = FieldType::parse_from(source)?;
                Ok(RefType::Array(Box::new(element)))
            }
            Some(c) => {
                let msg = format!("Invalid reference type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type")),
        }
    }
}

/// Type of a value, local variable, field, or parameter
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl FieldType {
    pub fn array(field_type: FieldType) -> FieldType {
        FieldType::Ref(RefType::Array(Box::new(field_type)))
    }

    pub const fn object(class_name: BinaryName) -> FieldType {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType {
        FieldType::Base(BaseType::Double)
    }

    pub const fn boolean() -> FieldType {
        FieldType::Base(BaseType::Boolean)
    }

    pub const fn string() -> FieldType {
        FieldType::object(BinaryName::STRING)
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type")),
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) => {
                let msg = format!("Invalid field type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }
}

/// Signature of a method (the receiver of an instance method is not a parameter)
#[derive(PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>, // `None` is for `void` (ie. no return)
}

impl MethodDescriptor {
    pub fn new(parameters: Vec<FieldType>, return_type: Option<FieldType>) -> MethodDescriptor {
        MethodDescriptor {
            parameters,
            return_type,
        }
    }

    /// Number of stack values an invocation consumes
    pub fn argument_count(&self, has_this_param: bool) -> usize {
        self.parameters.len() + usize::from(has_this_param)
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        // Assert open paren
        if source.next() != Some('(') {
            let msg = "Expected '(' for method";
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }

        // Parse parameters
        let mut parameters = vec![];
        while !matches!(source.peek(), Some(')') | None) {
            parameters.push(FieldType::parse_from(source)?);
        }

        // Assert close paren
        if source.next() != Some(')') {
            let msg = "Expected ')' for method";
            return Err(Error::new(ErrorKind::UnexpectedEof, msg));
        }

        // Parse return
        let return_type = if let Some('V') = source.peek().copied() {
            let _ = source.next();
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

macro_rules! descriptor_string_impls {
    ($ty:ty) => {
        impl TryFrom<String> for $ty {
            type Error = String;

            fn try_from(source: String) -> std::result::Result<Self, String> {
                <$ty>::parse(&source).map_err(|err| err.to_string())
            }
        }

        impl From<$ty> for String {
            fn from(descriptor: $ty) -> String {
                descriptor.render()
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.render())
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.render())
            }
        }
    };
}

descriptor_string_impls!(FieldType);
descriptor_string_impls!(MethodDescriptor);
