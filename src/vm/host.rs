use super::{
    BinaryName, ClassGraph, Code, Error, FieldRef, MethodAccessFlags, MethodRef, UnqualifiedName,
};

/// Access the weaver needs to the program it rewrites
///
/// Reads happen throughout a run. Writes (`add_method` and `install_method_body`) only happen
/// once the whole run has succeeded.
pub trait Host {
    fn has_class(&self, class: &BinaryName) -> bool;

    /// Overloads of `name` declared on `class`, in declaration order
    fn methods_named(&self, class: &BinaryName, name: &UnqualifiedName) -> Vec<MethodRef>;

    fn has_method(&self, method: &MethodRef) -> bool;

    fn has_field(&self, field: &FieldRef) -> bool;

    fn method_body(&self, method: &MethodRef) -> Option<&Code>;

    /// Declare a new method, with its body
    fn add_method(
        &mut self,
        method: &MethodRef,
        access_flags: MethodAccessFlags,
        code: Code,
    ) -> Result<(), Error>;

    /// Replace the body of an existing method
    fn install_method_body(&mut self, method: &MethodRef, code: Code) -> Result<(), Error>;
}

impl Host for ClassGraph {
    fn has_class(&self, class: &BinaryName) -> bool {
        self.lookup_class(class).is_some()
    }

    fn methods_named(&self, class: &BinaryName, name: &UnqualifiedName) -> Vec<MethodRef> {
        ClassGraph::methods_named(self, class, name)
    }

    fn has_method(&self, method: &MethodRef) -> bool {
        self.lookup_method(method).is_some()
    }

    fn has_field(&self, field: &FieldRef) -> bool {
        self.lookup_field(field).is_some()
    }

    fn method_body(&self, method: &MethodRef) -> Option<&Code> {
        self.lookup_method(method)?.code.as_ref()
    }

    fn add_method(
        &mut self,
        method: &MethodRef,
        access_flags: MethodAccessFlags,
        code: Code,
    ) -> Result<(), Error> {
        ClassGraph::add_method(self, method, access_flags, Some(code))
    }

    fn install_method_body(&mut self, method: &MethodRef, code: Code) -> Result<(), Error> {
        let data = self
            .lookup_method_mut(method)
            .ok_or_else(|| Error::MissingMember(method.to_string()))?;
        data.code = Some(code);
        Ok(())
    }
}
