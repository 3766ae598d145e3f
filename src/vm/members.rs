use super::{BinaryName, FieldType, MethodDescriptor, UnqualifiedName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a method: owning class, name, signature, and whether it has a receiver
///
/// Two references are the same method exactly when all four components agree.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    #[serde(default)]
    pub is_static: bool,
}

impl MethodRef {
    pub fn new(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
        is_static: bool,
    ) -> MethodRef {
        MethodRef {
            class,
            name,
            descriptor,
            is_static,
        }
    }

    /// Number of argument slots, including the receiver for instance methods
    pub fn argument_count(&self) -> usize {
        self.descriptor.argument_count(!self.is_static)
    }

    pub fn return_type(&self) -> Option<&FieldType> {
        self.descriptor.return_type.as_ref()
    }

    /// Type of the value held in argument slot `index`
    pub fn argument_type(&self, index: usize) -> Option<FieldType> {
        if self.is_static {
            self.descriptor.parameters.get(index).cloned()
        } else if index == 0 {
            Some(FieldType::object(self.class.clone()))
        } else {
            self.descriptor.parameters.get(index - 1).cloned()
        }
    }

    /// Same method, declared on a different class
    pub fn on_class(&self, class: BinaryName) -> MethodRef {
        MethodRef {
            class,
            ..self.clone()
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor)
    }
}

impl fmt::Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static {
            f.write_str("static ")?;
        }
        fmt::Display::fmt(self, f)
    }
}

/// Identity of a field
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    #[serde(default)]
    pub is_static: bool,
}

impl FieldRef {
    pub fn on_class(&self, class: BinaryName) -> FieldRef {
        FieldRef {
            class,
            ..self.clone()
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor)
    }
}
