use super::{Error, MixinInfo, PatchRegistry, Phase};
use crate::vm::{
    self, BinaryName, Code, Host, Instruction, MethodAccessFlags, MethodRef, UnqualifiedName,
};
use std::collections::{HashMap, HashSet};

/// Copies of mixin methods, declared on the classes they patch
///
/// For every target class, maps the identity of each mixin method to the identity of its copy.
/// The copies themselves are staged until [`RemapTable::commit`].
#[derive(Debug, Default)]
pub struct RemapTable {
    clones: HashMap<BinaryName, HashMap<MethodRef, MethodRef>>,
    staged: Vec<(MethodRef, MethodAccessFlags, Code)>,
}

impl RemapTable {
    /// Copy every non-shadow method of every mixin onto each of its target classes
    pub fn build<H: Host + ?Sized>(
        host: &H,
        registry: &PatchRegistry,
    ) -> Result<RemapTable, Error> {
        let mut table = RemapTable::default();
        for mixin in &registry.mixins {
            for class in &mixin.target_classes {
                table.remap_mixin(host, mixin, class)?;
            }
        }
        Ok(table)
    }

    fn remap_mixin<H: Host + ?Sized>(
        &mut self,
        host: &H,
        mixin: &MixinInfo,
        class: &BinaryName,
    ) -> Result<(), Error> {
        // Assign every identity up front, since bodies may call each other
        let mut mapping: HashMap<MethodRef, MethodRef> = HashMap::new();
        for method in &mixin.methods_to_remap {
            let clone = MethodRef::new(
                class.clone(),
                UnqualifiedName::mangled(&mixin.name, &method.name),
                method.descriptor.clone(),
                method.is_static,
            );
            if host.has_method(&clone) || self.is_staged(&clone) {
                return Err(Error::RemapCollision(clone.to_string()));
            }
            mapping.insert(method.clone(), clone);
        }

        for method in &mixin.methods_to_remap {
            let code = host
                .method_body(method)
                .ok_or_else(|| Error::MissingPatchBody(method.to_string()))?;
            let rewritten = rewrite_body(host, mixin, class, &mapping, code)?;
            let clone = mapping[method].clone();

            let mut access_flags = MethodAccessFlags::PRIVATE | MethodAccessFlags::SYNTHETIC;
            if method.is_static {
                access_flags |= MethodAccessFlags::STATIC;
            }
            log::debug!(
                target: Phase::Register.target(),
                "Remapped {} to {}",
                method,
                clone
            );
            self.staged.push((clone, access_flags, rewritten));
        }

        self.clones.entry(class.clone()).or_default().extend(mapping);
        Ok(())
    }

    /// Copy of `body` on `class`
    pub fn lookup(&self, class: &BinaryName, body: &MethodRef) -> Option<&MethodRef> {
        self.clones.get(class)?.get(body)
    }

    /// Copy of `body` on `class`, which must exist
    pub fn remapped(&self, class: &BinaryName, body: &MethodRef) -> Result<&MethodRef, Error> {
        self.lookup(class, body).ok_or_else(|| Error::MissingRemap {
            class: class.to_string(),
            body: body.to_string(),
        })
    }

    fn is_staged(&self, method: &MethodRef) -> bool {
        self.staged.iter().any(|(staged, _, _)| staged == method)
    }

    /// Fail exactly when [`RemapTable::commit`] would, without touching the host
    pub fn check_commit<H: Host + ?Sized>(&self, host: &H) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for (method, _, _) in &self.staged {
            if !host.has_class(&method.class) {
                return Err(vm::Error::MissingClass(method.class.to_string()).into());
            }
            if host.has_method(method) || !seen.insert(method) {
                return Err(Error::RemapCollision(method.to_string()));
            }
        }
        Ok(())
    }

    /// Declare every copy on the host
    pub fn commit<H: Host + ?Sized>(self, host: &mut H) -> Result<Vec<MethodRef>, Error> {
        let mut added = vec![];
        for (method, access_flags, code) in self.staged {
            host.add_method(&method, access_flags, code)?;
            added.push(method);
        }
        Ok(added)
    }
}

/// Point references to the mixin at the target class
///
/// Calls to remapped methods go to their copies and calls to shadow methods (or accesses to
/// shadow fields) go to the target's own members.
fn rewrite_body<H: Host + ?Sized>(
    host: &H,
    mixin: &MixinInfo,
    class: &BinaryName,
    mapping: &HashMap<MethodRef, MethodRef>,
    code: &Code,
) -> Result<Code, Error> {
    let mut code = code.clone();
    for entry in &mut code.entries {
        match &mut entry.instruction {
            Instruction::Invoke(_, callee) => {
                if let Some(clone) = mapping.get(callee) {
                    *callee = clone.clone();
                } else if mixin.shadow_methods.contains(callee) {
                    let shadowed = callee.on_class(class.clone());
                    if !host.has_method(&shadowed) {
                        return Err(Error::MissingShadowTarget {
                            member: callee.to_string(),
                            class: class.to_string(),
                        });
                    }
                    *callee = shadowed;
                }
            }
            Instruction::GetField(field) | Instruction::PutField(field) => {
                if mixin.shadow_fields.contains(field) {
                    let shadowed = field.on_class(class.clone());
                    if !host.has_field(&shadowed) {
                        return Err(Error::MissingShadowTarget {
                            member: field.to_string(),
                            class: class.to_string(),
                        });
                    }
                    *field = shadowed;
                }
            }
            _ => (),
        }
    }
    Ok(code)
}
