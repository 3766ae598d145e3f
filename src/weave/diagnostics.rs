use crate::vm::{BinaryName, MethodRef};
use std::fmt;

/// Pipeline phase a diagnostic comes from, which is also its `log` target
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Phase {
    Scan,
    Register,
    Select,
    Transform,
    Disassemble,
}

impl Phase {
    pub const fn target(&self) -> &'static str {
        match self {
            Phase::Scan => "mixweave::scan",
            Phase::Register => "mixweave::register",
            Phase::Select => "mixweave::select",
            Phase::Transform => "mixweave::transform",
            Phase::Disassemble => "mixweave::disassemble",
        }
    }
}

/// Non-fatal problems found during a run
#[derive(Clone, PartialEq, Debug)]
pub enum Diagnostic {
    UnresolvedClass {
        mixin: BinaryName,
        class: BinaryName,
    },
    UnresolvedTarget {
        patch: String,
        target: String,
        class: BinaryName,
    },
    RejectedMethod {
        patch: String,
        method: MethodRef,
        reason: String,
    },
    RejectedInstruction {
        patch: String,
        method: MethodRef,
        offset: usize,
        reason: String,
    },
    ShiftOutOfBounds {
        selector: String,
        method: MethodRef,
        index: usize,
        shift: isize,
    },
    UnreachableInjection {
        patch: String,
        method: MethodRef,
        offset: usize,
    },
    UnusedSelector {
        selector: String,
        method: MethodRef,
    },
    InjectionCount {
        patch: String,
        count: usize,
        min: usize,
        max: Option<usize>,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnresolvedClass { mixin, class } => {
                write!(f, "target class {} of mixin {} does not exist", class, mixin)
            }
            Diagnostic::UnresolvedTarget {
                patch,
                target,
                class,
            } => write!(f, "{}: no method on {} matches {}", patch, class, target),
            Diagnostic::RejectedMethod {
                patch,
                method,
                reason,
            } => write!(f, "{} cannot target {}: {}", patch, method, reason),
            Diagnostic::RejectedInstruction {
                patch,
                method,
                offset,
                reason,
            } => write!(
                f,
                "{} cannot apply to instruction {} of {}: {}",
                patch, offset, method, reason
            ),
            Diagnostic::ShiftOutOfBounds {
                selector,
                method,
                index,
                shift,
            } => write!(
                f,
                "{} matched instruction {} but shifting by {} leaves {}",
                selector, index, shift, method
            ),
            Diagnostic::UnreachableInjection {
                patch,
                method,
                offset,
            } => write!(
                f,
                "{}: injection targets unreachable code at instruction {} of {}",
                patch, offset, method
            ),
            Diagnostic::UnusedSelector { selector, method } => {
                write!(f, "{} is unused in {}; is this expected?", selector, method)
            }
            Diagnostic::InjectionCount {
                patch,
                count,
                min,
                max,
            } => {
                write!(f, "{} was applied {} times, expected at least {}", patch, count, min)?;
                if let Some(max) = max {
                    write!(f, " and at most {}", max)?;
                }
                Ok(())
            }
        }
    }
}

/// A diagnostic along with where and how seriously it was reported
#[derive(Clone, PartialEq, Debug)]
pub struct Reported {
    pub level: log::Level,
    pub phase: Phase,
    pub diagnostic: Diagnostic,
}

/// Collects the diagnostics of a run, logging each one as it arrives
#[derive(Default, Debug)]
pub struct Diagnostics {
    reported: Vec<Reported>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn report(&mut self, level: log::Level, phase: Phase, diagnostic: Diagnostic) {
        log::log!(target: phase.target(), level, "{}", diagnostic);
        self.reported.push(Reported {
            level,
            phase,
            diagnostic,
        });
    }

    pub fn error(&mut self, phase: Phase, diagnostic: Diagnostic) {
        self.report(log::Level::Error, phase, diagnostic)
    }

    pub fn warn(&mut self, phase: Phase, diagnostic: Diagnostic) {
        self.report(log::Level::Warn, phase, diagnostic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reported> + '_ {
        self.reported.iter()
    }

    pub fn len(&self) -> usize {
        self.reported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }

    pub fn take(&mut self) -> Vec<Reported> {
        std::mem::take(&mut self.reported)
    }
}
