use super::{Code, CodeEntry, Instruction, LabelGenerator, Origin, SynLabel};
use crate::vm::Error;

/// Instruction sequence under construction, destined to be spliced into a [`Code`]
///
/// Instructions pushed onto the block get the block's origin and a fresh label when the block is
/// finished. Labels handed out by [`Code::fresh_label`] can be placed ahead of time so that jumps
/// inside the block can refer to them.
#[derive(Debug)]
pub struct Block {
    origin: Origin,
    entries: Vec<PendingEntry>,
    pending_label: Option<SynLabel>,
}

#[derive(Debug)]
struct PendingEntry {
    label: Option<SynLabel>,
    origin: Origin,
    instruction: Instruction,
}

impl Block {
    pub fn new(origin: Origin) -> Block {
        Block {
            origin,
            entries: vec![],
            pending_label: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, instruction: Instruction) -> &mut Self {
        self.entries.push(PendingEntry {
            label: self.pending_label.take(),
            origin: self.origin,
            instruction,
        });
        self
    }

    pub fn push_all(&mut self, instructions: impl IntoIterator<Item = Instruction>) -> &mut Self {
        for instruction in instructions {
            self.push(instruction);
        }
        self
    }

    /// Push an already-labeled instruction, keeping its label and origin
    pub fn push_entry(&mut self, entry: CodeEntry) -> Result<&mut Self, Error> {
        if let Some(pending) = self.pending_label {
            return Err(Error::LabelAlreadyPlaced(pending));
        }
        self.entries.push(PendingEntry {
            label: Some(entry.label),
            origin: entry.origin,
            instruction: entry.instruction,
        });
        Ok(self)
    }

    /// Attach a label to the next instruction pushed
    pub fn place_label(&mut self, label: SynLabel) -> Result<&mut Self, Error> {
        if let Some(pending) = self.pending_label {
            return Err(Error::LabelAlreadyPlaced(pending));
        }
        self.pending_label = Some(label);
        Ok(self)
    }

    /// Append another block
    pub fn extend(&mut self, other: Block) -> Result<&mut Self, Error> {
        if let Some(pending) = other.pending_label {
            return Err(Error::UnplacedLabel(pending));
        }
        if !other.entries.is_empty() {
            if let Some(pending) = self.pending_label {
                return Err(Error::LabelAlreadyPlaced(pending));
            }
        }
        self.entries.extend(other.entries);
        Ok(self)
    }

    /// Assign labels to every instruction, drawing fresh ones from the destination body
    pub fn finish(self, code: &mut Code) -> Result<Vec<CodeEntry>, Error> {
        if let Some(pending) = self.pending_label {
            return Err(Error::UnplacedLabel(pending));
        }
        Ok(self
            .entries
            .into_iter()
            .map(|entry| CodeEntry {
                label: entry.label.unwrap_or_else(|| code.fresh_label()),
                origin: entry.origin,
                instruction: entry.instruction,
            })
            .collect())
    }
}
