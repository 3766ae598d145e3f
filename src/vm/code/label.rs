use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque instruction label
///
/// Every instruction in a method body carries one; branches refer to labels, never to positions,
/// so splicing instructions in and out never invalidates a jump.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynLabel(usize);

impl SynLabel {
    /// Label given to the first instruction of a freshly built body
    pub const START: SynLabel = SynLabel(0);

    pub const fn new(id: usize) -> SynLabel {
        SynLabel(id)
    }

    /// Get the next fresh label
    pub fn next(&self) -> SynLabel {
        SynLabel(self.0 + 1)
    }
}

/// Generates new labels
pub trait LabelGenerator<Label> {
    /// Generate a fresh label
    fn fresh_label(&mut self) -> Label;
}

/// Label generator for [`SynLabel`]
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
#[derive(Clone, Debug)]
pub struct SynLabelGenerator(SynLabel);

impl SynLabelGenerator {
    pub fn new(start: SynLabel) -> SynLabelGenerator {
        SynLabelGenerator(start)
    }

    /// Generator whose labels are all strictly greater than every label in `labels`
    pub fn after<'a>(labels: impl IntoIterator<Item = &'a SynLabel>) -> SynLabelGenerator {
        let start = labels
            .into_iter()
            .max()
            .map_or(SynLabel::START, SynLabel::next);
        SynLabelGenerator(start)
    }
}

impl LabelGenerator<SynLabel> for SynLabelGenerator {
    fn fresh_label(&mut self) -> SynLabel {
        let to_return = self.0;
        self.0 = self.0.next();
        to_return
    }
}

impl fmt::Debug for SynLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

impl fmt::Display for SynLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}
