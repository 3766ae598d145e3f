//! Splicing resolved patches into method bodies
//!
//! Each instruction with a [`SitePlan`] is replaced by a container block:
//!
//! ```text
//!     nop                       ; begin marker
//!     <before patch calls>
//!     <replacing patch call, or the original instruction>
//!     <after patch calls>
//!     nop                       ; end marker
//! ```
//!
//! Jumps that targeted the original instruction land on the begin marker instead.

use super::injectors::{Site, SiteProcessor};
use super::{Error, PatchId, PatchRegistry, Phase, RemapTable, Settings, SitePlan};
use crate::vm::{Block, Code, Constant, Instruction, MethodRef, Origin, StackStates};
use std::collections::BTreeMap;

/// Everything needed to splice patches into the methods of one run
pub struct Splicer<'a> {
    pub settings: &'a Settings,
    pub registry: &'a PatchRegistry,
    pub remap: &'a RemapTable,
}

impl<'a> Splicer<'a> {
    pub fn new(settings: &'a Settings, registry: &'a PatchRegistry, remap: &'a RemapTable) -> Self {
        Splicer {
            settings,
            registry,
            remap,
        }
    }

    /// Splice every plan into a copy of `original`
    ///
    /// `states` are the stack states of `original`. Every patch application is counted in
    /// `counts`, indexed by [`PatchId`]. The result is checked with a fresh stack analysis.
    pub fn splice(
        &self,
        method: &MethodRef,
        original: &Code,
        states: &StackStates,
        plans: &BTreeMap<usize, SitePlan>,
        counts: &mut [usize],
    ) -> Result<Code, Error> {
        if log::log_enabled!(target: Phase::Disassemble.target(), log::Level::Debug) {
            log::debug!(
                target: Phase::Disassemble.target(),
                "Before transforming {}:\n{}",
                method,
                listing(original, Some(states))
            );
        }

        let mut code = original.clone();
        let mut cursor = 0;
        for index in 0..original.len() {
            let plan = match plans.get(&index) {
                Some(plan) if !plan.is_empty() => plan,
                _ => {
                    cursor += 1;
                    continue;
                }
            };
            let depth = states.get(index).map_or(0, |state| state.0);
            let block_len = self.splice_site(method, &mut code, cursor, depth, plan, counts)?;
            cursor += block_len;
        }

        StackStates::compute(&code).map_err(|source| Error::StackAnalysis {
            method: method.to_string(),
            source,
        })?;

        if log::log_enabled!(target: Phase::Disassemble.target(), log::Level::Debug) {
            log::debug!(
                target: Phase::Disassemble.target(),
                "After transforming {}:\n{}",
                method,
                code
            );
        }
        Ok(code)
    }

    /// Replace the instruction at `cursor` with its container block, returning the block length
    fn splice_site(
        &self,
        method: &MethodRef,
        code: &mut Code,
        cursor: usize,
        depth: usize,
        plan: &SitePlan,
        counts: &mut [usize],
    ) -> Result<usize, Error> {
        let original = code.entries[cursor].clone();
        let site = Site {
            method,
            instruction: &original.instruction,
            depth,
        };
        let mut processor = SiteProcessor::new();

        let mut container = self.marker(Origin::BeginMarker, "debug: patch begin");
        for id in &plan.before {
            container.extend(self.patch_call(*id, &site, &mut processor, code)?)?;
        }
        match plan.replace {
            Some(id) => {
                container.extend(self.patch_call(id, &site, &mut processor, code)?)?;
            }
            None => {
                container.push_entry(original.clone())?;
            }
        }
        for id in &plan.after {
            container.extend(self.patch_call(*id, &site, &mut processor, code)?)?;
        }
        container.extend(self.marker(Origin::EndMarker, "debug: patch end"))?;

        let entries = container.finish(code)?;
        let first = entries[0].label;
        let block_len = entries.len();
        if log::log_enabled!(target: Phase::Disassemble.target(), log::Level::Debug) {
            let block = Code::new(entries.clone(), vec![]);
            log::debug!(
                target: Phase::Disassemble.target(),
                "Block for instruction {} of {}:\n{}",
                cursor,
                method,
                block
            );
        }
        code.splice(cursor, 1, entries);
        let retargeted = code.retarget_branches(original.label, first);

        for id in plan.patches() {
            if let Some(count) = counts.get_mut(id.0) {
                *count += 1;
            }
        }
        log::debug!(
            target: Phase::Transform.target(),
            "Spliced {} patches at instruction {} of {} ({} jumps retargeted)",
            plan.patches().count(),
            cursor,
            method,
            retargeted
        );
        Ok(block_len)
    }

    fn patch_call(
        &self,
        id: PatchId,
        site: &Site,
        processor: &mut SiteProcessor,
        code: &mut Code,
    ) -> Result<Block, Error> {
        let patch = self.registry.patch(id);
        let remapped = self.remap.remapped(&site.method.class, &patch.body)?;
        let mut block = Block::new(Origin::Injected);
        processor.emit(patch, site, remapped, code, &mut block)?;
        Ok(block)
    }

    fn marker(&self, origin: Origin, annotation: &str) -> Block {
        let mut block = Block::new(origin);
        block.push(Instruction::Nop);
        if self.settings.debug_markers {
            block
                .push(Instruction::Push(Constant::String(annotation.to_owned())))
                .push(Instruction::Pop)
                .push(Instruction::Nop);
        }
        block
    }
}

/// Disassembly with the stack depth before each instruction
fn listing(code: &Code, states: Option<&StackStates>) -> String {
    let mut out = String::new();
    for (idx, entry) in code.entries.iter().enumerate() {
        let depth = match states.and_then(|states| states.get(idx)) {
            Some(state) => state.0.to_string(),
            None => "-".to_owned(),
        };
        out.push_str(&format!(
            "{}{:>4} [{:>2}] {:>5}: {}\n",
            entry.origin.tag(),
            idx,
            depth,
            entry.label.to_string(),
            entry.instruction
        ));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::{
        BinaryName, ClassGraph, FieldType, MethodAccessFlags, MethodDescriptor, Name,
        SynLabel, UnqualifiedName,
    };
    use crate::weave::{
        resolve_method, select_offsets, Diagnostics, Injector, InjectorKind, LocalCapture,
        MixinInfo, PatchDefinition, Selector, SelectorKind,
    };

    fn class(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    fn target() -> MethodRef {
        MethodRef::new(
            class("demo/Target"),
            UnqualifiedName::from_string("check".to_owned()).unwrap(),
            MethodDescriptor::new(vec![FieldType::int()], Some(FieldType::boolean())),
            true,
        )
    }

    /// check(x) { if (x) return true; return false }
    fn body() -> Code {
        Code::from_instructions(vec![
            Instruction::LoadArg(0),
            Instruction::BranchIf(false, SynLabel::new(4)),
            Instruction::Push(Constant::Int(1)),
            Instruction::Return,
            Instruction::Push(Constant::Int(0)),
            Instruction::Return,
        ])
    }

    struct Fixture {
        registry: PatchRegistry,
        remap: RemapTable,
    }

    fn fixture(cancellable: bool, selector: SelectorKind) -> Fixture {
        let patch_body = MethodRef::new(
            class("demo/Patch"),
            UnqualifiedName::from_string("onCheck".to_owned()).unwrap(),
            MethodDescriptor::new(vec![FieldType::object(BinaryName::CALLBACKINFORETURN)], None),
            true,
        );
        let mut graph = ClassGraph::new();
        graph.insert_runtime_types();
        graph.add_class(class("demo/Target"), Some(BinaryName::OBJECT));
        graph.add_class(class("demo/Patch"), Some(BinaryName::OBJECT));
        graph
            .add_method(&target(), MethodAccessFlags::PUBLIC, Some(body()))
            .unwrap();
        graph
            .add_method(
                &patch_body,
                MethodAccessFlags::PUBLIC,
                Some(Code::from_instructions(vec![Instruction::Return])),
            )
            .unwrap();

        let registry = PatchRegistry {
            mixins: vec![MixinInfo {
                name: class("demo/Patch"),
                target_classes: vec![class("demo/Target")],
                patches: vec![PatchId(0)],
                methods_to_remap: vec![patch_body.clone()],
                shadow_methods: vec![],
                shadow_fields: vec![],
            }],
            patches: vec![PatchDefinition {
                id: PatchId(0),
                mixin: class("demo/Patch"),
                body: patch_body,
                injector: Injector::new(InjectorKind::Inject {
                    cancellable,
                    locals: LocalCapture::Dont,
                }),
                priority: 0,
                selectors: vec![Selector::new(selector)],
                targets: vec![],
            }],
        };
        let remap = RemapTable::build(&graph, &registry).unwrap();
        Fixture { registry, remap }
    }

    fn plans(fixture: &Fixture, code: &Code) -> BTreeMap<usize, SitePlan> {
        let states = StackStates::compute(code).unwrap();
        let mut selection = crate::weave::Selection::new();
        let offsets = select_offsets(
            &Settings::new(),
            &fixture.registry.patches[0],
            &target(),
            code,
            &states,
            &mut Diagnostics::new(),
        );
        for offset in offsets {
            selection.associate(&target(), offset, PatchId(0));
        }
        match selection.get(&target()) {
            Some(offsets) => resolve_method(&fixture.registry, &target(), offsets).unwrap(),
            None => BTreeMap::new(),
        }
    }

    fn splice(fixture: &Fixture, settings: &Settings, code: &Code, counts: &mut [usize]) -> Code {
        let plans = plans(fixture, code);
        let states = StackStates::compute(code).unwrap();
        Splicer::new(settings, &fixture.registry, &fixture.remap)
            .splice(&target(), code, &states, &plans, counts)
            .unwrap()
    }

    #[test]
    fn no_plans_leave_the_body_alone() {
        let fixture = fixture(false, SelectorKind::Head);
        let code = body();
        let states = StackStates::compute(&code).unwrap();
        let mut counts = vec![0];
        let spliced = Splicer::new(&Settings::new(), &fixture.registry, &fixture.remap)
            .splice(&target(), &code, &states, &BTreeMap::new(), &mut counts)
            .unwrap();
        assert_eq!(spliced, code);
        assert_eq!(StackStates::compute(&spliced).unwrap(), states);
        assert_eq!(counts, vec![0]);
    }

    #[test]
    fn cancellable_returns_are_wrapped() {
        let fixture = fixture(true, SelectorKind::Return);
        let mut counts = vec![0];
        let spliced = splice(&fixture, &Settings::new(), &body(), &mut counts);
        assert_eq!(counts, vec![2]);

        let origins: Vec<Origin> = spliced.entries.iter().map(|entry| entry.origin).collect();
        assert_eq!(origins[3], Origin::BeginMarker);
        assert_eq!(origins.iter().filter(|o| **o == Origin::BeginMarker).count(), 2);
        assert_eq!(origins.iter().filter(|o| **o == Origin::EndMarker).count(), 2);

        // Every original return is still there, right before its end marker
        let original_returns: Vec<usize> = spliced
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.origin == Origin::Original && entry.instruction.is_return())
            .map(|(idx, _)| idx)
            .collect();
        assert_eq!(original_returns.len(), 2);
        for idx in original_returns {
            assert_eq!(spliced.entries[idx + 1].origin, Origin::EndMarker);
        }

        // The early return pops the `true` and pushes the callback's return value
        let cast = spliced
            .entries
            .iter()
            .position(|entry| entry.instruction == Instruction::CheckCast(FieldType::boolean()))
            .unwrap();
        assert_eq!(spliced.entries[cast + 1].instruction, Instruction::Return);
        assert_eq!(spliced.entries[cast - 3].instruction, Instruction::Pop);

        // One callback local per site
        let callback = FieldType::object(BinaryName::CALLBACKINFORETURN);
        assert_eq!(spliced.locals, vec![callback.clone(), callback]);
    }

    #[test]
    fn jumps_land_on_the_begin_marker() {
        let mut fixture = fixture(false, SelectorKind::LoadConstant {
            value: crate::weave::Literal::Boolean(false),
        });
        fixture.registry.patches[0].injector.id = Some("else".to_owned());
        let spliced = splice(&fixture, &Settings::new(), &body(), &mut [0]);

        let begin = spliced
            .entries
            .iter()
            .position(|entry| entry.origin == Origin::BeginMarker)
            .unwrap();
        assert_eq!(begin, 4);
        assert_eq!(
            spliced.entries[1].instruction,
            Instruction::BranchIf(false, spliced.entries[begin].label)
        );
        assert_eq!(spliced.incoming_branches(SynLabel::new(4)), Vec::<usize>::new());
    }

    #[test]
    fn debug_markers_are_annotated() {
        let fixture = fixture(false, SelectorKind::Head);
        let mut settings = Settings::new();
        settings.debug_markers = true;
        let spliced = splice(&fixture, &settings, &body(), &mut [0]);

        let instructions: Vec<&Instruction> = spliced.instructions().collect();
        assert_eq!(
            &instructions[..4],
            &[
                &Instruction::Nop,
                &Instruction::Push(Constant::String("debug: patch begin".to_owned())),
                &Instruction::Pop,
                &Instruction::Nop,
            ]
        );
        assert!(instructions
            .contains(&&Instruction::Push(Constant::String("debug: patch end".to_owned()))));
    }

    #[test]
    fn head_matches_the_previous_begin_marker() {
        let fixture = fixture(false, SelectorKind::Head);
        let once = splice(&fixture, &Settings::new(), &body(), &mut [0]);
        assert_eq!(once.entries[0].origin, Origin::BeginMarker);
        let original_head = once
            .entries
            .iter()
            .position(|entry| entry.origin == Origin::Original)
            .unwrap();

        let twice = splice(&fixture, &Settings::new(), &once, &mut [0]);
        assert_eq!(twice.entries[0].origin, Origin::BeginMarker);

        // The new block wraps the old begin marker, not the relocated head instruction
        let wrapped = twice
            .entries
            .iter()
            .position(|entry| entry.label == once.entries[0].label)
            .unwrap();
        assert_eq!(twice.entries[wrapped].origin, Origin::BeginMarker);
        assert_eq!(twice.entries[wrapped + 1].origin, Origin::EndMarker);
        assert_eq!(
            twice.entries[wrapped + 2 + original_head - 1].instruction,
            Instruction::LoadArg(0)
        );
        assert_eq!(
            twice.entries.iter().filter(|entry| entry.origin == Origin::BeginMarker).count(),
            2
        );
    }

    #[test]
    fn listing_shows_depths() {
        let code = body();
        let states = StackStates::compute(&code).unwrap();
        let text = listing(&code, Some(&states));
        assert!(text.lines().next().unwrap().contains("[ 0]"));
        assert!(text.lines().nth(3).unwrap().contains("ret"));
    }
}
