use super::{
    Diagnostic, Diagnostics, Error, Injector, InjectorKind, MixinDeclaration, Phase, Selector,
    SelectorKind, TargetDescriptor,
};
use crate::vm::{BinaryName, FieldRef, Host, MethodRef};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Index of a patch in the registry, in discovery order
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize)]
#[serde(transparent)]
pub struct PatchId(pub usize);

/// A validated patch: one injector on one mixin method
#[derive(Clone, Debug, Serialize)]
pub struct PatchDefinition {
    pub id: PatchId,
    pub mixin: BinaryName,
    pub body: MethodRef,
    pub injector: Injector,

    /// Injector priority, or the mixin priority if unset
    pub priority: i32,
    pub selectors: Vec<Selector>,
    pub targets: Vec<TargetDescriptor>,
}

impl PatchDefinition {
    /// Name of the patch for diagnostics
    pub fn describe(&self) -> String {
        self.injector.describe(&self.mixin)
    }

    pub fn kind(&self) -> &InjectorKind {
        &self.injector.kind
    }
}

/// Everything a mixin contributes
#[derive(Clone, Debug, Serialize)]
pub struct MixinInfo {
    pub name: BinaryName,

    /// Targets that exist in the host
    pub target_classes: Vec<BinaryName>,
    pub patches: Vec<PatchId>,

    /// Non-shadow methods, which get copied onto every target class
    pub methods_to_remap: Vec<MethodRef>,
    pub shadow_methods: Vec<MethodRef>,
    pub shadow_fields: Vec<FieldRef>,
}

/// Output of the scan: every mixin and every enabled patch
#[derive(Clone, Debug, Default, Serialize)]
pub struct PatchRegistry {
    pub mixins: Vec<MixinInfo>,
    pub patches: Vec<PatchDefinition>,
}

impl PatchRegistry {
    pub fn patch(&self, id: PatchId) -> &PatchDefinition {
        &self.patches[id.0]
    }

    pub fn mixin_of(&self, patch: &PatchDefinition) -> Option<&MixinInfo> {
        self.mixins.iter().find(|mixin| mixin.name == patch.mixin)
    }

    /// Write the registry as pretty-printed JSON
    pub fn dump(&self, path: &Path) -> Result<(), Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        log::info!(
            target: Phase::Register.target(),
            "Wrote patch snapshot to '{}'",
            path.display()
        );
        Ok(())
    }
}

/// Validate mixin declarations and collect their patches
pub fn scan<H: Host + ?Sized>(
    host: &H,
    declarations: &[MixinDeclaration],
    diagnostics: &mut Diagnostics,
) -> Result<PatchRegistry, Error> {
    let mut registry = PatchRegistry::default();

    for declaration in declarations {
        log::debug!(target: Phase::Scan.target(), "Scanning mixin {}", declaration.name);
        let mut info = MixinInfo {
            name: declaration.name.clone(),
            target_classes: vec![],
            patches: vec![],
            methods_to_remap: vec![],
            shadow_methods: vec![],
            shadow_fields: declaration
                .shadow_fields
                .iter()
                .map(|field| field.field_ref(&declaration.name))
                .collect(),
        };

        for class in &declaration.targets {
            if info.target_classes.contains(class) {
                continue;
            } else if host.has_class(class) {
                info.target_classes.push(class.clone());
            } else {
                diagnostics.error(
                    Phase::Scan,
                    Diagnostic::UnresolvedClass {
                        mixin: declaration.name.clone(),
                        class: class.clone(),
                    },
                );
            }
        }

        for method in &declaration.methods {
            let body = method.method_ref(&declaration.name);
            if method.injectors.len() > 1 {
                return Err(Error::MultipleInjectors(body.to_string()));
            }
            let injector = method.injectors.first();

            if method.shadow {
                if injector.is_some() {
                    return Err(Error::ShadowInjector(body.to_string()));
                }
                info.shadow_methods.push(body);
                continue;
            }
            info.methods_to_remap.push(body.clone());

            let injector = match injector {
                Some(injector) => injector,
                None => continue,
            };
            let description = injector.describe(&declaration.name);
            if injector.kind == InjectorKind::Injector {
                return Err(Error::AbstractInjector(description));
            }
            if injector.disabled {
                log::debug!(target: Phase::Scan.target(), "Skipping disabled {}", description);
                continue;
            }
            if let Some(selector) = method
                .selectors
                .iter()
                .find(|selector| selector.at == SelectorKind::At)
            {
                return Err(Error::AbstractSelector(
                    selector.describe(&declaration.name),
                ));
            }
            if method.targets.is_empty() {
                return Err(Error::NoTargets(description));
            }

            let id = PatchId(registry.patches.len());
            let priority = injector.priority.unwrap_or(declaration.priority);
            log::debug!(
                target: Phase::Register.target(),
                "Registered {} on {} (priority {})",
                description,
                body,
                priority
            );
            registry.patches.push(PatchDefinition {
                id,
                mixin: declaration.name.clone(),
                body,
                injector: injector.clone(),
                priority,
                selectors: method.selectors.clone(),
                targets: method.targets.clone(),
            });
            info.patches.push(id);
        }

        if !info.patches.is_empty() && info.target_classes.is_empty() {
            return Err(Error::NoTargetClasses(declaration.name.to_string()));
        }
        registry.mixins.push(info);
    }

    log::info!(
        target: Phase::Scan.target(),
        "Found {} patches in {} mixins",
        registry.patches.len(),
        registry.mixins.len()
    );
    Ok(registry)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::{ClassGraph, MethodDescriptor, Name, UnqualifiedName};
    use crate::weave::{LocalCapture, MethodDeclaration};

    fn class(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    fn graph() -> ClassGraph {
        let mut graph = ClassGraph::new();
        graph.insert_runtime_types();
        graph.add_class(class("demo/Target"), Some(BinaryName::OBJECT));
        graph.add_class(class("demo/Patch"), Some(BinaryName::OBJECT));
        graph
    }

    fn method(name: &str, injector: Option<Injector>) -> MethodDeclaration {
        MethodDeclaration {
            name: UnqualifiedName::from_string(name.to_owned()).unwrap(),
            descriptor: MethodDescriptor::new(vec![], None),
            is_static: false,
            shadow: false,
            injectors: injector.into_iter().collect(),
            targets: vec![TargetDescriptor {
                name: UnqualifiedName::from_string("run".to_owned()).unwrap(),
                parameters: None,
                on_failure: Default::default(),
            }],
            selectors: vec![Selector::new(SelectorKind::Head)],
        }
    }

    fn inject() -> Injector {
        Injector::new(InjectorKind::Inject {
            cancellable: false,
            locals: LocalCapture::Dont,
        })
    }

    fn mixin(methods: Vec<MethodDeclaration>) -> MixinDeclaration {
        MixinDeclaration {
            name: class("demo/Patch"),
            targets: vec![class("demo/Target"), class("demo/Missing")],
            priority: 7,
            methods,
            shadow_fields: vec![],
        }
    }

    #[test]
    fn collects_patches_and_helpers() {
        let mut explicit = inject();
        explicit.priority = Some(100);
        let mut disabled = inject();
        disabled.disabled = true;
        let mut shadow = method("shadowed", None);
        shadow.shadow = true;

        let declarations = vec![mixin(vec![
            method("first", Some(inject())),
            method("second", Some(explicit)),
            method("helper", None),
            method("off", Some(disabled)),
            shadow,
        ])];
        let mut diagnostics = Diagnostics::new();
        let registry = scan(&graph(), &declarations, &mut diagnostics).unwrap();

        assert_eq!(registry.patches.len(), 2);
        assert_eq!(registry.patches[0].priority, 7);
        assert_eq!(registry.patches[1].priority, 100);
        assert_eq!(registry.patches[1].id, PatchId(1));

        let info = &registry.mixins[0];
        assert_eq!(info.target_classes, vec![class("demo/Target")]);
        assert_eq!(info.methods_to_remap.len(), 4);
        assert_eq!(info.shadow_methods.len(), 1);

        // The missing target class is reported but not fatal
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn invalid_declarations_are_fatal() {
        let mut diagnostics = Diagnostics::new();

        let mut two = method("two", Some(inject()));
        two.injectors.push(inject());
        let result = scan(&graph(), &[mixin(vec![two])], &mut diagnostics);
        assert!(matches!(result, Err(Error::MultipleInjectors(_))));

        let mut shadow = method("shadow", Some(inject()));
        shadow.shadow = true;
        let result = scan(&graph(), &[mixin(vec![shadow])], &mut diagnostics);
        assert!(matches!(result, Err(Error::ShadowInjector(_))));

        let base = method("base", Some(Injector::new(InjectorKind::Injector)));
        let result = scan(&graph(), &[mixin(vec![base])], &mut diagnostics);
        assert!(matches!(result, Err(Error::AbstractInjector(_))));

        let mut at = method("at", Some(inject()));
        at.selectors.push(Selector::new(SelectorKind::At));
        let result = scan(&graph(), &[mixin(vec![at])], &mut diagnostics);
        assert!(matches!(result, Err(Error::AbstractSelector(_))));

        let mut untargeted = method("untargeted", Some(inject()));
        untargeted.targets.clear();
        let result = scan(&graph(), &[mixin(vec![untargeted])], &mut diagnostics);
        assert!(matches!(result, Err(Error::NoTargets(_))));

        let mut nowhere = mixin(vec![method("nowhere", Some(inject()))]);
        nowhere.targets = vec![class("demo/Missing")];
        let result = scan(&graph(), &[nowhere], &mut diagnostics);
        assert!(matches!(result, Err(Error::NoTargetClasses(_))));
    }

    #[test]
    fn snapshot_is_json() {
        let declarations = vec![mixin(vec![method("first", Some(inject()))])];
        let registry = scan(&graph(), &declarations, &mut Diagnostics::new()).unwrap();
        let json = serde_json::to_value(&registry).unwrap();
        assert_eq!(json["patches"][0]["priority"], 7);
        assert_eq!(json["patches"][0]["body"]["descriptor"], "()V");
        assert_eq!(json["mixins"][0]["target_classes"][0], "demo/Target");
    }
}
