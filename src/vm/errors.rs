use super::{MethodRef, SynLabel};
use thiserror::Error;

/// Failures of the program model and of the stack analysis
#[derive(Debug, Error)]
pub enum Error {
    /// Two control flow paths reach an instruction with different stack depths
    #[error("inconsistent stack depth at instruction {index}: {existing} vs {incoming}")]
    InconsistentStack {
        index: usize,
        existing: usize,
        incoming: usize,
    },

    /// More than one value is left on the stack at a return
    #[error("return at instruction {index} leaves {depth} values on the stack")]
    InvalidReturnStack { index: usize, depth: usize },

    #[error("instruction {index} pops {pop} values from a stack of depth {depth}")]
    StackUnderflow {
        index: usize,
        pop: usize,
        depth: usize,
    },

    #[error("instruction {index} jumps to unknown label {label:?}")]
    UnknownLabel { index: usize, label: SynLabel },

    /// Placing a label while another one is still waiting for an instruction (indicates a bug)
    #[error("label {0:?} is already waiting for an instruction")]
    LabelAlreadyPlaced(SynLabel),

    /// A placed label never got an instruction (indicates a bug)
    #[error("label {0:?} was placed but no instruction followed")]
    UnplacedLabel(SynLabel),

    #[error("missing class {0}")]
    MissingClass(String),

    #[error("missing member {0}")]
    MissingMember(String),

    #[error("method {0} is already defined")]
    DuplicateMethod(String),

    #[error("method {0:?} has no body")]
    MissingBody(MethodRef),
}
