use super::{
    runtime, BinaryName, Code, Error, FieldRef, FieldType, MethodAccessFlags, MethodDescriptor,
    MethodRef, UnqualifiedName,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The program being woven: every class, with its methods, fields, and method bodies
///
/// Serializes as a map from class name to class.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassGraph {
    pub classes: BTreeMap<BinaryName, ClassData>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassData {
    #[serde(default)]
    pub superclass: Option<BinaryName>,

    #[serde(default)]
    pub methods: Vec<MethodData>,

    #[serde(default)]
    pub fields: Vec<FieldData>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodData {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    #[serde(default)]
    pub access_flags: MethodAccessFlags,
    #[serde(default)]
    pub code: Option<Code>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldData {
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    #[serde(default)]
    pub is_static: bool,
}

impl MethodData {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn method_ref(&self, class: &BinaryName) -> MethodRef {
        MethodRef::new(
            class.clone(),
            self.name.clone(),
            self.descriptor.clone(),
            self.is_static(),
        )
    }

    fn is(&self, method: &MethodRef) -> bool {
        self.name == method.name
            && self.descriptor == method.descriptor
            && self.is_static() == method.is_static
    }
}

impl ClassData {
    pub fn new(superclass: Option<BinaryName>) -> ClassData {
        ClassData {
            superclass,
            methods: vec![],
            fields: vec![],
        }
    }
}

impl ClassGraph {
    pub fn new() -> ClassGraph {
        ClassGraph::default()
    }

    /// Add the runtime support classes
    pub fn insert_runtime_types(&mut self) {
        self.add_class(BinaryName::OBJECT, None);
        self.add_class(BinaryName::STRING, Some(BinaryName::OBJECT));
        self.add_class(BinaryName::CALLBACKINFO, Some(BinaryName::OBJECT));
        self.add_class(
            BinaryName::CALLBACKINFORETURN,
            Some(BinaryName::CALLBACKINFO),
        );
        for member in runtime::members() {
            if self.lookup_method(&member).is_none() {
                let flags = MethodAccessFlags::PUBLIC;
                // The class was just added
                let _ = self.add_method(&member, flags, None);
            }
        }
    }

    /// Add a class (or get the existing one)
    pub fn add_class(
        &mut self,
        name: BinaryName,
        superclass: Option<BinaryName>,
    ) -> &mut ClassData {
        self.classes
            .entry(name)
            .or_insert_with(|| ClassData::new(superclass))
    }

    pub fn lookup_class(&self, name: &BinaryName) -> Option<&ClassData> {
        self.classes.get(name)
    }

    /// Declare a method on an existing class
    pub fn add_method(
        &mut self,
        method: &MethodRef,
        mut access_flags: MethodAccessFlags,
        code: Option<Code>,
    ) -> Result<(), Error> {
        if self.lookup_method(method).is_some() {
            return Err(Error::DuplicateMethod(method.to_string()));
        }
        let class = self
            .classes
            .get_mut(&method.class)
            .ok_or_else(|| Error::MissingClass(method.class.to_string()))?;
        access_flags.set(MethodAccessFlags::STATIC, method.is_static);
        class.methods.push(MethodData {
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            access_flags,
            code,
        });
        Ok(())
    }

    /// Declare a field on an existing class
    pub fn add_field(&mut self, field: &FieldRef) -> Result<(), Error> {
        let class = self
            .classes
            .get_mut(&field.class)
            .ok_or_else(|| Error::MissingClass(field.class.to_string()))?;
        class.fields.push(FieldData {
            name: field.name.clone(),
            descriptor: field.descriptor.clone(),
            is_static: field.is_static,
        });
        Ok(())
    }

    pub fn lookup_method(&self, method: &MethodRef) -> Option<&MethodData> {
        self.classes
            .get(&method.class)?
            .methods
            .iter()
            .find(|data| data.is(method))
    }

    pub fn lookup_method_mut(&mut self, method: &MethodRef) -> Option<&mut MethodData> {
        self.classes
            .get_mut(&method.class)?
            .methods
            .iter_mut()
            .find(|data| data.is(method))
    }

    pub fn lookup_field(&self, field: &FieldRef) -> Option<&FieldData> {
        self.classes.get(&field.class)?.fields.iter().find(|data| {
            data.name == field.name
                && data.descriptor == field.descriptor
                && data.is_static == field.is_static
        })
    }

    /// All overloads of a method name on a class, in declaration order
    pub fn methods_named(&self, class: &BinaryName, name: &UnqualifiedName) -> Vec<MethodRef> {
        match self.classes.get(class) {
            None => vec![],
            Some(data) => data
                .methods
                .iter()
                .filter(|method| &method.name == name)
                .map(|method| method.method_ref(class))
                .collect(),
        }
    }
}
