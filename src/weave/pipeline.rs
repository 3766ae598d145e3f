use super::{
    check_occurrences, marked_listing, resolve_method, scan, select_all, Diagnostics, Error,
    MixinDeclaration, Phase, RemapTable, Reported, Settings, Splicer,
};
use crate::vm::{self, Code, Host, MethodRef, StackStateCache};

/// What a successful run changed
#[derive(Debug)]
pub struct WeaveReport {
    /// Methods whose bodies were replaced, in the order they were installed
    pub patched_methods: Vec<MethodRef>,

    /// Copies of mixin methods declared on target classes
    pub added_methods: Vec<MethodRef>,

    /// How often each patch was applied, by patch description
    pub injection_counts: Vec<(String, usize)>,

    pub diagnostics: Vec<Reported>,
}

/// Context for weaving mixins into a host program
///
/// A run only writes to the host once every method has been spliced: any error leaves the host
/// untouched.
pub struct Weaver<'h, H: Host + ?Sized> {
    settings: Settings,
    host: &'h mut H,
    diagnostics: Diagnostics,
    stack_states: StackStateCache,
}

impl<'h, H: Host + ?Sized> Weaver<'h, H> {
    pub fn new(host: &'h mut H, settings: Settings) -> Self {
        Weaver {
            settings,
            host,
            diagnostics: Diagnostics::new(),
            stack_states: StackStateCache::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Diagnostics reported so far, including those of a failed run
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn weave(&mut self, declarations: &[MixinDeclaration]) -> Result<WeaveReport, Error> {
        let registry = scan(&*self.host, declarations, &mut self.diagnostics)?;
        if let Some(path) = &self.settings.dump_path {
            registry.dump(path)?;
        }

        let selection = select_all(
            &*self.host,
            &self.settings,
            &registry,
            &mut self.stack_states,
            &mut self.diagnostics,
        )?;
        if log::log_enabled!(target: Phase::Disassemble.target(), log::Level::Debug) {
            for (method, offsets) in selection.iter() {
                if let Some(code) = self.host.method_body(method) {
                    log::debug!(
                        target: Phase::Disassemble.target(),
                        "Selected in {}:\n{}",
                        method,
                        marked_listing(code, offsets)
                    );
                }
            }
        }
        let remap = RemapTable::build(&*self.host, &registry)?;

        let mut counts = vec![0; registry.patches.len()];
        let mut staged: Vec<(MethodRef, Code)> = vec![];
        let splicer = Splicer::new(&self.settings, &registry, &remap);
        for (method, offsets) in selection.iter() {
            let plans = resolve_method(&registry, method, offsets)?;
            let code = self
                .host
                .method_body(method)
                .ok_or_else(|| vm::Error::MissingBody(method.clone()))?;
            let states = self
                .stack_states
                .get_or_compute(method, code)
                .map_err(|source| Error::StackAnalysis {
                    method: method.to_string(),
                    source,
                })?;
            let spliced = splicer.splice(method, code, states, &plans, &mut counts)?;
            staged.push((method.clone(), spliced));
        }

        // Every write below is checked first, so a failure leaves the host untouched
        remap.check_commit(&*self.host)?;
        let missing = staged.iter().find(|(method, _)| !self.host.has_method(method));
        if let Some((method, _)) = missing {
            return Err(vm::Error::MissingMember(method.to_string()).into());
        }

        let added_methods = remap.commit(&mut *self.host)?;
        let mut patched_methods = vec![];
        for (method, code) in staged {
            self.host.install_method_body(&method, code)?;
            patched_methods.push(method);
        }
        // Installed bodies invalidate their cached stack states
        self.stack_states = StackStateCache::new();

        check_occurrences(&registry, &counts, &mut self.diagnostics);
        log::info!(
            target: Phase::Transform.target(),
            "Patched {} methods and added {} methods",
            patched_methods.len(),
            added_methods.len()
        );

        Ok(WeaveReport {
            patched_methods,
            added_methods,
            injection_counts: registry
                .patches
                .iter()
                .map(|patch| (patch.describe(), counts[patch.id.0]))
                .collect(),
            diagnostics: self.diagnostics.take(),
        })
    }
}
