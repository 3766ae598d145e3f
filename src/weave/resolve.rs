use super::{Diagnostic, Diagnostics, Error, PatchId, PatchRegistry, Phase, Placement};
use crate::vm::MethodRef;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Patches applied at one instruction, each list in the order the calls are emitted
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SitePlan {
    pub before: Vec<PatchId>,

    /// Patch replacing the instruction, which is kept otherwise
    pub replace: Option<PatchId>,
    pub after: Vec<PatchId>,
}

impl SitePlan {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.replace.is_none() && self.after.is_empty()
    }

    /// Every patch of the plan, in emission order
    pub fn patches(&self) -> impl Iterator<Item = PatchId> + '_ {
        self.before
            .iter()
            .chain(self.replace.iter())
            .chain(self.after.iter())
            .copied()
    }
}

/// Order the patches selected at one instruction
///
/// Higher priorities come first, ties keep discovery order. Only the first replacing patch is
/// kept; a required one losing out is fatal.
pub fn resolve_site(
    registry: &PatchRegistry,
    method: &MethodRef,
    offset: usize,
    patches: &[PatchId],
) -> Result<SitePlan, Error> {
    let mut ordered: Vec<PatchId> = patches.to_vec();
    ordered.sort_by_key(|id| Reverse(registry.patch(*id).priority));

    let mut plan = SitePlan::default();
    for id in ordered {
        let patch = registry.patch(id);
        match patch.kind().placement() {
            Some(Placement::Before) => plan.before.push(id),
            Some(Placement::After) => plan.after.push(id),
            Some(Placement::Replace) => match plan.replace {
                None => plan.replace = Some(id),
                Some(winner) => {
                    let winner = registry.patch(winner).describe();
                    if patch.injector.required {
                        return Err(Error::RequiredDisplaced {
                            patch: patch.describe(),
                            winner,
                            method: method.to_string(),
                            offset,
                        });
                    }
                    log::info!(
                        target: Phase::Transform.target(),
                        "{} loses instruction {} of {} to {}",
                        patch.describe(),
                        offset,
                        method,
                        winner
                    );
                }
            },
            None => (),
        }
    }
    Ok(plan)
}

/// Plans for every selected instruction of a method
pub fn resolve_method(
    registry: &PatchRegistry,
    method: &MethodRef,
    offsets: &BTreeMap<usize, Vec<PatchId>>,
) -> Result<BTreeMap<usize, SitePlan>, Error> {
    offsets
        .iter()
        .map(|(offset, patches)| {
            resolve_site(registry, method, *offset, patches).map(|plan| (*offset, plan))
        })
        .collect()
}

/// Compare how often each patch was applied against its expectations
///
/// `counts` is indexed by [`PatchId`].
pub fn check_occurrences(
    registry: &PatchRegistry,
    counts: &[usize],
    diagnostics: &mut Diagnostics,
) {
    for patch in &registry.patches {
        let count = counts.get(patch.id.0).copied().unwrap_or(0);
        let min = patch.injector.min_injections;
        let max = patch.injector.max_injections;
        if count < min || max.map_or(false, |max| count > max) {
            diagnostics.warn(
                Phase::Transform,
                Diagnostic::InjectionCount {
                    patch: patch.describe(),
                    count,
                    min,
                    max,
                },
            );
        }
    }
}
