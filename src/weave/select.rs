use super::injectors::{validate_instruction, validate_method, Rejection};
use super::{
    Diagnostic, Diagnostics, Error, FailMode, PatchDefinition, PatchId, PatchRegistry, Phase,
    SelectorKind, Settings,
};
use crate::vm::{
    Code, Host, Instruction, InvokeKinds, InvokeType, MethodRef, StackStateCache, StackStates,
};
use std::collections::{BTreeMap, BTreeSet};

/// Instruction a selector is tested against
pub struct MatchContext<'a> {
    pub code: &'a Code,
    pub offset: usize,
    pub instruction: &'a Instruction,
}

impl SelectorKind {
    /// Whether the instruction has the shape this selector looks for
    pub fn try_match(&self, context: &MatchContext) -> bool {
        match self {
            SelectorKind::At => false,
            SelectorKind::Head => context.offset == 0,
            SelectorKind::Tail => context.offset + 1 == context.code.len(),
            SelectorKind::Return => context.instruction.is_return(),
            SelectorKind::Invoke {
                class,
                name,
                parameters,
                kinds,
            } => match context.instruction {
                Instruction::Invoke(invoke_type, callee) => {
                    let kind = match invoke_type {
                        InvokeType::Direct => InvokeKinds::DIRECT,
                        InvokeType::Virtual => InvokeKinds::VIRTUAL,
                    };
                    kinds.contains(kind)
                        && &callee.class == class
                        && &callee.name == name
                        && parameters
                            .as_ref()
                            .map_or(true, |params| params == &callee.descriptor.parameters)
                }
                _ => false,
            },
            SelectorKind::LoadConstant { value } => match context.instruction {
                Instruction::Push(constant) => value.matches(constant),
                _ => false,
            },
        }
    }
}

/// Patches to apply, per method and per instruction offset
///
/// Methods are kept in the order they were first selected. At each offset, patches are kept in
/// discovery order.
#[derive(Debug, Default)]
pub struct Selection {
    methods: Vec<(MethodRef, BTreeMap<usize, Vec<PatchId>>)>,
}

impl Selection {
    pub fn new() -> Selection {
        Selection::default()
    }

    pub fn associate(&mut self, method: &MethodRef, offset: usize, patch: PatchId) {
        let position = match self.methods.iter().position(|(m, _)| m == method) {
            Some(position) => position,
            None => {
                self.methods.push((method.clone(), BTreeMap::new()));
                self.methods.len() - 1
            }
        };
        let patches = self.methods[position].1.entry(offset).or_default();
        if !patches.contains(&patch) {
            patches.push(patch);
        }
    }

    pub fn get(&self, method: &MethodRef) -> Option<&BTreeMap<usize, Vec<PatchId>>> {
        self.methods
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, offsets)| offsets)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MethodRef, &BTreeMap<usize, Vec<PatchId>>)> + '_ {
        self.methods.iter().map(|(method, offsets)| (method, offsets))
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Methods of the target classes that the patch's target descriptors name
pub fn resolve_targets<H: Host + ?Sized>(
    host: &H,
    registry: &PatchRegistry,
    patch: &PatchDefinition,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<MethodRef>, Error> {
    let classes = match registry.mixin_of(patch) {
        Some(mixin) => &mixin.target_classes[..],
        None => &[],
    };

    let mut resolved = vec![];
    for target in &patch.targets {
        for class in classes {
            let candidates: Vec<MethodRef> = host
                .methods_named(class, &target.name)
                .into_iter()
                .filter(|method| {
                    target
                        .parameters
                        .as_ref()
                        .map_or(true, |params| params == &method.descriptor.parameters)
                })
                .collect();

            if candidates.is_empty() {
                match target.on_failure {
                    FailMode::Abort => {
                        return Err(Error::UnresolvedTarget {
                            patch: patch.describe(),
                            target: target.describe(),
                            class: class.to_string(),
                        })
                    }
                    FailMode::Log => diagnostics.error(
                        Phase::Select,
                        Diagnostic::UnresolvedTarget {
                            patch: patch.describe(),
                            target: target.describe(),
                            class: class.clone(),
                        },
                    ),
                    FailMode::Silent => (),
                }
            }
            for candidate in candidates {
                if !resolved.contains(&candidate) {
                    resolved.push(candidate);
                }
            }
        }
    }
    Ok(resolved)
}

/// Disassembly of `code` with `->` in front of every selected instruction
pub fn marked_listing(code: &Code, offsets: &BTreeMap<usize, Vec<PatchId>>) -> String {
    let mut out = String::new();
    for (idx, entry) in code.entries.iter().enumerate() {
        let marker = if offsets.contains_key(&idx) { "->" } else { "  " };
        out.push_str(&format!("{} {:>4}: {}\n", marker, idx, entry.instruction));
    }
    out
}

/// `index` moved by `shift`, if that stays inside a body of `len` instructions
fn shifted(index: usize, shift: isize, len: usize) -> Option<usize> {
    let offset = isize::try_from(index).ok()?.checked_add(shift)?;
    usize::try_from(offset).ok().filter(|offset| *offset < len)
}

/// Offsets of `method` that the patch's selectors pick out
///
/// Every selector keeps its own count of structural matches, which is what its ordinal is
/// compared against. Matches are shifted, then checked for range, reachability and suitability
/// for the patch kind. Returned offsets are sorted and distinct.
pub fn select_offsets(
    settings: &Settings,
    patch: &PatchDefinition,
    method: &MethodRef,
    code: &Code,
    states: &StackStates,
    diagnostics: &mut Diagnostics,
) -> Vec<usize> {
    let mut counters = vec![0usize; patch.selectors.len()];
    let mut used = vec![false; patch.selectors.len()];
    let mut offsets = BTreeSet::new();

    for (index, entry) in code.entries.iter().enumerate() {
        let context = MatchContext {
            code,
            offset: index,
            instruction: &entry.instruction,
        };
        for (which, selector) in patch.selectors.iter().enumerate() {
            if !selector.at.try_match(&context) {
                continue;
            }
            let nth = counters[which];
            counters[which] += 1;
            if selector.ordinal.map_or(false, |ordinal| ordinal != nth) {
                continue;
            }

            let shift = selector.resolve_shift(settings);
            let offset = match shifted(index, shift, code.len()) {
                Some(offset) => offset,
                None => {
                    diagnostics.error(
                        Phase::Select,
                        Diagnostic::ShiftOutOfBounds {
                            selector: selector.describe(&patch.mixin),
                            method: method.clone(),
                            index,
                            shift,
                        },
                    );
                    continue;
                }
            };
            used[which] = true;

            if !states.is_reachable(offset) {
                diagnostics.warn(
                    Phase::Select,
                    Diagnostic::UnreachableInjection {
                        patch: patch.describe(),
                        method: method.clone(),
                        offset,
                    },
                );
                continue;
            }
            if let Err(reason) = validate_instruction(patch, method, code, offset) {
                diagnostics.error(
                    Phase::Select,
                    Diagnostic::RejectedInstruction {
                        patch: patch.describe(),
                        method: method.clone(),
                        offset,
                        reason: reason.to_string(),
                    },
                );
                continue;
            }
            log::trace!(
                target: Phase::Select.target(),
                "{} selected instruction {} of {}",
                selector.describe(&patch.mixin),
                offset,
                method
            );
            offsets.insert(offset);
        }
    }

    for (selector, used) in patch.selectors.iter().zip(used) {
        if !used {
            diagnostics.warn(
                Phase::Select,
                Diagnostic::UnusedSelector {
                    selector: selector.describe(&patch.mixin),
                    method: method.clone(),
                },
            );
        }
    }
    offsets.into_iter().collect()
}

/// Find every instruction each patch applies to
pub fn select_all<H: Host + ?Sized>(
    host: &H,
    settings: &Settings,
    registry: &PatchRegistry,
    stack_states: &mut StackStateCache,
    diagnostics: &mut Diagnostics,
) -> Result<Selection, Error> {
    let mut selection = Selection::new();

    for patch in &registry.patches {
        for method in resolve_targets(host, registry, patch, diagnostics)? {
            let rejection = validate_method(patch, &method).err().or_else(|| {
                if host.method_body(&method).is_none() {
                    Some(Rejection::NoBody)
                } else {
                    None
                }
            });
            if let Some(reason) = rejection {
                diagnostics.error(
                    Phase::Select,
                    Diagnostic::RejectedMethod {
                        patch: patch.describe(),
                        method,
                        reason: reason.to_string(),
                    },
                );
                continue;
            }
            let code = match host.method_body(&method) {
                Some(code) => code,
                None => continue,
            };

            let states = stack_states
                .get_or_compute(&method, code)
                .map_err(|source| Error::StackAnalysis {
                    method: method.to_string(),
                    source,
                })?;
            for offset in select_offsets(settings, patch, &method, code, states, diagnostics) {
                selection.associate(&method, offset, patch.id);
            }
        }
    }

    log::info!(
        target: Phase::Select.target(),
        "Selected injection points in {} methods",
        selection.len()
    );
    Ok(selection)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::{
        BinaryName, ClassGraph, Constant, FieldType, MethodAccessFlags, MethodDescriptor, Name,
        UnqualifiedName,
    };
    use crate::weave::{
        Injector, InjectorKind, Literal, LocalCapture, MixinInfo, Selector, Shift,
        TargetDescriptor,
    };

    fn class(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    fn name(name: &str) -> UnqualifiedName {
        UnqualifiedName::from_string(name.to_owned()).unwrap()
    }

    fn target() -> MethodRef {
        MethodRef::new(
            class("demo/Target"),
            name("run"),
            MethodDescriptor::new(vec![FieldType::int()], Some(FieldType::int())),
            true,
        )
    }

    fn callee() -> MethodRef {
        MethodRef::new(
            class("demo/Target"),
            name("step"),
            MethodDescriptor::new(vec![FieldType::int()], Some(FieldType::int())),
            true,
        )
    }

    /// run(x) { if (x == 0) return 0; return step(x) + step(5) }
    fn body() -> Code {
        use crate::vm::SynLabel;
        Code::from_instructions(vec![
            Instruction::LoadArg(0),
            Instruction::BranchIf(true, SynLabel::new(4)),
            Instruction::Push(Constant::Int(0)),
            Instruction::Return,
            Instruction::LoadArg(0),
            Instruction::Invoke(InvokeType::Direct, callee()),
            Instruction::Push(Constant::Int(5)),
            Instruction::Invoke(InvokeType::Direct, callee()),
            Instruction::Arithmetic(crate::vm::ArithmeticOp::Add),
            Instruction::Return,
        ])
    }

    fn patch(selectors: Vec<Selector>) -> PatchDefinition {
        PatchDefinition {
            id: PatchId(0),
            mixin: class("demo/Patch"),
            body: MethodRef::new(
                class("demo/Patch"),
                name("onRun"),
                MethodDescriptor::new(
                    vec![FieldType::object(BinaryName::CALLBACKINFORETURN)],
                    None,
                ),
                true,
            ),
            injector: Injector::new(InjectorKind::Inject {
                cancellable: false,
                locals: LocalCapture::Dont,
            }),
            priority: 0,
            selectors,
            targets: vec![TargetDescriptor {
                name: name("run"),
                parameters: None,
                on_failure: FailMode::Abort,
            }],
        }
    }

    fn select(patch: &PatchDefinition, diagnostics: &mut Diagnostics) -> Vec<usize> {
        let code = body();
        let states = StackStates::compute(&code).unwrap();
        select_offsets(&Settings::new(), patch, &target(), &code, &states, diagnostics)
    }

    #[test]
    fn position_selectors() {
        let mut diagnostics = Diagnostics::new();
        let patch = patch(vec![
            Selector::new(SelectorKind::Head),
            Selector::new(SelectorKind::Tail),
        ]);
        assert_eq!(select(&patch, &mut diagnostics), vec![0, 9]);

        let patch = self::patch(vec![Selector::new(SelectorKind::Return)]);
        assert_eq!(select(&patch, &mut diagnostics), vec![3, 9]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn ordinals_count_per_selector() {
        let invoke = SelectorKind::Invoke {
            class: class("demo/Target"),
            name: name("step"),
            parameters: None,
            kinds: InvokeKinds::default(),
        };
        let mut diagnostics = Diagnostics::new();

        let all = patch(vec![Selector::new(invoke.clone())]);
        assert_eq!(select(&all, &mut diagnostics), vec![5, 7]);

        let mut second = Selector::new(invoke.clone());
        second.ordinal = Some(1);
        assert_eq!(select(&patch(vec![second]), &mut diagnostics), vec![7]);
        assert!(diagnostics.is_empty());

        let mut missing = Selector::new(invoke);
        missing.ordinal = Some(2);
        assert!(select(&patch(vec![missing]), &mut diagnostics).is_empty());
        assert!(matches!(
            diagnostics.iter().next().map(|reported| &reported.diagnostic),
            Some(Diagnostic::UnusedSelector { .. })
        ));
    }

    #[test]
    fn invoke_kinds_and_parameters_filter_calls() {
        let mut diagnostics = Diagnostics::new();
        let virtual_only = SelectorKind::Invoke {
            class: class("demo/Target"),
            name: name("step"),
            parameters: None,
            kinds: InvokeKinds::VIRTUAL,
        };
        assert!(select(&patch(vec![Selector::new(virtual_only)]), &mut diagnostics).is_empty());

        let wrong_overload = SelectorKind::Invoke {
            class: class("demo/Target"),
            name: name("step"),
            parameters: Some(vec![FieldType::long()]),
            kinds: InvokeKinds::default(),
        };
        assert!(select(&patch(vec![Selector::new(wrong_overload)]), &mut diagnostics).is_empty());
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn constants_and_shifts() {
        let mut diagnostics = Diagnostics::new();
        let five = SelectorKind::LoadConstant {
            value: Literal::Int(5),
        };
        let mut after = Selector::new(five.clone());
        after.shift = Some(Shift::After);
        assert_eq!(select(&patch(vec![after]), &mut diagnostics), vec![7]);

        let mut long_five = Selector::new(SelectorKind::LoadConstant {
            value: Literal::Long(5),
        });
        long_five.id = Some("long".to_owned());
        assert!(select(&patch(vec![long_five]), &mut diagnostics).is_empty());

        let mut before_head = Selector::new(SelectorKind::Head);
        before_head.shift = Some(Shift::Before);
        assert!(select(&patch(vec![before_head]), &mut diagnostics).is_empty());

        let kinds: Vec<_> = diagnostics
            .iter()
            .map(|reported| reported.diagnostic.clone())
            .collect();
        assert!(matches!(kinds[0], Diagnostic::UnusedSelector { .. }));
        assert!(matches!(
            kinds[1],
            Diagnostic::ShiftOutOfBounds {
                index: 0,
                shift: -1,
                ..
            }
        ));
        assert!(matches!(kinds[2], Diagnostic::UnusedSelector { .. }));
    }

    #[test]
    fn listing_marks_selected_offsets() {
        let code = Code::from_instructions(vec![
            Instruction::Push(Constant::Int(1)),
            Instruction::Return,
        ]);
        let mut offsets = BTreeMap::new();
        offsets.insert(1, vec![PatchId(0)]);
        let listing = marked_listing(&code, &offsets);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("   "));
        assert!(lines[1].starts_with("->    1: "));
    }

    #[test]
    fn huge_shifts_are_out_of_bounds() {
        let mut diagnostics = Diagnostics::new();
        let mut far = Selector::new(SelectorKind::Tail);
        far.shift = Some(Shift::By(isize::MAX));
        let mut back = Selector::new(SelectorKind::Head);
        back.shift = Some(Shift::By(isize::MIN));
        assert!(select(&patch(vec![far, back]), &mut diagnostics).is_empty());

        let shifts: Vec<isize> = diagnostics
            .iter()
            .filter_map(|reported| match reported.diagnostic {
                Diagnostic::ShiftOutOfBounds { shift, .. } => Some(shift),
                _ => None,
            })
            .collect();
        assert_eq!(shifts, vec![isize::MIN, isize::MAX]);
        assert_eq!(shifted(2, -2, 3), Some(0));
        assert_eq!(shifted(2, 1, 3), None);
    }

    #[test]
    fn unreachable_and_rejected_instructions_are_skipped() {
        let mut diagnostics = Diagnostics::new();
        let code = Code::from_instructions(vec![
            Instruction::Push(Constant::Int(1)),
            Instruction::Return,
            Instruction::Push(Constant::Int(2)),
            Instruction::Return,
        ]);
        let states = StackStates::compute(&code).unwrap();
        let patch = patch(vec![Selector::new(SelectorKind::Return)]);
        let offsets =
            select_offsets(&Settings::new(), &patch, &target(), &code, &states, &mut diagnostics);
        assert_eq!(offsets, vec![1]);
        assert!(matches!(
            diagnostics.iter().next().map(|reported| &reported.diagnostic),
            Some(Diagnostic::UnreachableInjection { offset: 3, .. })
        ));

        let mut modify = self::patch(vec![Selector::new(SelectorKind::Head)]);
        modify.injector = Injector::new(InjectorKind::ModifyConstant {
            locals: LocalCapture::Dont,
        });
        let code = body();
        let states = StackStates::compute(&code).unwrap();
        let offsets =
            select_offsets(&Settings::new(), &modify, &target(), &code, &states, &mut diagnostics);
        assert!(offsets.is_empty());
        assert!(matches!(
            diagnostics.iter().last().map(|reported| &reported.diagnostic),
            Some(Diagnostic::RejectedInstruction { offset: 0, .. })
        ));
    }

    fn registry(patch: PatchDefinition) -> PatchRegistry {
        PatchRegistry {
            mixins: vec![MixinInfo {
                name: class("demo/Patch"),
                target_classes: vec![class("demo/Target")],
                patches: vec![patch.id],
                methods_to_remap: vec![patch.body.clone()],
                shadow_methods: vec![],
                shadow_fields: vec![],
            }],
            patches: vec![patch],
        }
    }

    fn graph() -> ClassGraph {
        let mut graph = ClassGraph::new();
        graph.insert_runtime_types();
        graph.add_class(class("demo/Target"), Some(BinaryName::OBJECT));
        graph
            .add_method(&target(), MethodAccessFlags::PUBLIC, Some(body()))
            .unwrap();
        graph
            .add_method(&callee(), MethodAccessFlags::PUBLIC, None)
            .unwrap();
        graph
    }

    #[test]
    fn select_all_resolves_targets() {
        let mut diagnostics = Diagnostics::new();
        let registry = registry(patch(vec![Selector::new(SelectorKind::Head)]));
        let selection = select_all(
            &graph(),
            &Settings::new(),
            &registry,
            &mut StackStateCache::new(),
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(selection.len(), 1);
        let offsets = selection.get(&target()).unwrap();
        assert_eq!(offsets.get(&0), Some(&vec![PatchId(0)]));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unresolved_targets_follow_their_policy() {
        let mut missing = patch(vec![Selector::new(SelectorKind::Head)]);
        missing.targets[0].name = name("absent");
        let result = select_all(
            &graph(),
            &Settings::new(),
            &registry(missing.clone()),
            &mut StackStateCache::new(),
            &mut Diagnostics::new(),
        );
        assert!(matches!(result, Err(Error::UnresolvedTarget { .. })));

        missing.targets[0].on_failure = FailMode::Log;
        let mut diagnostics = Diagnostics::new();
        let selection = select_all(
            &graph(),
            &Settings::new(),
            &registry(missing.clone()),
            &mut StackStateCache::new(),
            &mut diagnostics,
        )
        .unwrap();
        assert!(selection.is_empty());
        assert_eq!(diagnostics.len(), 1);

        missing.targets[0].on_failure = FailMode::Silent;
        let mut diagnostics = Diagnostics::new();
        select_all(
            &graph(),
            &Settings::new(),
            &registry(missing),
            &mut StackStateCache::new(),
            &mut diagnostics,
        )
        .unwrap();
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn rejected_methods_are_reported() {
        // Target returns int, so the callback must be a CallbackInfoReturn
        let mut wrong = patch(vec![Selector::new(SelectorKind::Head)]);
        wrong.body.descriptor =
            MethodDescriptor::new(vec![FieldType::object(BinaryName::CALLBACKINFO)], None);
        let mut diagnostics = Diagnostics::new();
        let selection = select_all(
            &graph(),
            &Settings::new(),
            &registry(wrong),
            &mut StackStateCache::new(),
            &mut diagnostics,
        )
        .unwrap();
        assert!(selection.is_empty());
        assert!(matches!(
            diagnostics.iter().next().map(|reported| &reported.diagnostic),
            Some(Diagnostic::RejectedMethod { .. })
        ));
    }
}
