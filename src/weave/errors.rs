use crate::vm;
use thiserror::Error;

/// Conditions that abort a weaving run
///
/// Nothing is installed into the host once one of these has been returned.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Vm(#[from] vm::Error),

    #[error("stack analysis of {method} failed: {source}")]
    StackAnalysis {
        method: String,
        #[source]
        source: vm::Error,
    },

    #[error("{0} declares more than one injector")]
    MultipleInjectors(String),

    #[error("{0} cannot be both a shadow and an injector")]
    ShadowInjector(String),

    #[error("{0} uses the abstract injector kind directly")]
    AbstractInjector(String),

    #[error("{0} uses the abstract selector kind directly")]
    AbstractSelector(String),

    #[error("{0} has no target methods")]
    NoTargets(String),

    #[error("mixin {0} has no resolvable target classes")]
    NoTargetClasses(String),

    #[error("{patch}: no method on {class} matches target {target}")]
    UnresolvedTarget {
        patch: String,
        target: String,
        class: String,
    },

    #[error("{patch} is required but {winner} replaces instruction {offset} of {method}")]
    RequiredDisplaced {
        patch: String,
        winner: String,
        method: String,
        offset: usize,
    },

    #[error("no remapped copy of {body} exists on {class}")]
    MissingRemap { class: String, body: String },

    #[error("patch body {0} has no code")]
    MissingPatchBody(String),

    #[error("shadow member {member} has no counterpart on {class}")]
    MissingShadowTarget { member: String, class: String },

    #[error("{patch} cannot apply to {method}: {reason}")]
    InvalidSite {
        patch: String,
        method: String,
        reason: String,
    },

    #[error("remapped method {0} already exists")]
    RemapCollision(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
