use super::{Instruction, LabelGenerator, SynLabel, SynLabelGenerator};
use crate::vm::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Where an instruction in a body came from
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum Origin {
    #[default]
    Original,
    Injected,
    BeginMarker,
    EndMarker,
}

impl Origin {
    /// Prefix used in disassembly dumps
    pub fn tag(&self) -> char {
        match self {
            Origin::Original => ' ',
            Origin::Injected => '+',
            Origin::BeginMarker => 'B',
            Origin::EndMarker => 'E',
        }
    }
}

/// One instruction of a method body, along with its identity
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct CodeEntry {
    pub label: SynLabel,
    #[serde(default)]
    pub origin: Origin,
    pub instruction: Instruction,
}

/// Semantic representation of a method body
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Code {
    /// Instructions in order, each with a unique label
    pub entries: Vec<CodeEntry>,

    /// Types of the local variables
    #[serde(default)]
    pub locals: Vec<FieldType>,

    /// Generator to produce the next label (lazily seeded past every label in `entries`)
    #[serde(skip)]
    label_generator: Option<SynLabelGenerator>,
}

impl PartialEq for Code {
    fn eq(&self, other: &Code) -> bool {
        self.entries == other.entries && self.locals == other.locals
    }
}

impl Code {
    pub fn new(entries: Vec<CodeEntry>, locals: Vec<FieldType>) -> Code {
        Code {
            entries,
            locals,
            label_generator: None,
        }
    }

    /// Body whose instruction `i` has label `l{i}`
    pub fn from_instructions(instructions: impl IntoIterator<Item = Instruction>) -> Code {
        let entries = instructions
            .into_iter()
            .enumerate()
            .map(|(idx, instruction)| CodeEntry {
                label: SynLabel::new(idx),
                origin: Origin::Original,
                instruction,
            })
            .collect();
        Code::new(entries, vec![])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CodeEntry> {
        self.entries.get(index)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.entries.iter().map(|entry| &entry.instruction)
    }

    /// Position of every label in the body
    pub fn label_indices(&self) -> HashMap<SynLabel, usize> {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.label, idx))
            .collect()
    }

    /// Allocate a new local variable slot of the given type
    pub fn allocate_local(&mut self, typ: FieldType) -> u16 {
        let idx = self.locals.len() as u16;
        self.locals.push(typ);
        idx
    }

    /// Replace `remove` instructions starting at `index` with `entries`
    pub fn splice(&mut self, index: usize, remove: usize, entries: Vec<CodeEntry>) {
        self.entries.splice(index..index + remove, entries);
    }

    /// Point every jump targeting `from` at `to`, returning how many were changed
    pub fn retarget_branches(&mut self, from: SynLabel, to: SynLabel) -> usize {
        let mut changed = 0;
        for entry in &mut self.entries {
            if entry.instruction.retarget(from, to) {
                changed += 1;
            }
        }
        changed
    }

    /// Positions of the instructions that jump to `label`
    pub fn incoming_branches(&self, label: SynLabel) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.instruction.branch_target() == Some(label))
            .map(|(idx, _)| idx)
            .collect()
    }
}

impl LabelGenerator<SynLabel> for Code {
    fn fresh_label(&mut self) -> SynLabel {
        let entries = &self.entries;
        self.label_generator
            .get_or_insert_with(|| SynLabelGenerator::after(entries.iter().map(|e| &e.label)))
            .fresh_label()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, entry) in self.entries.iter().enumerate() {
            writeln!(
                f,
                "{}{:>4} {:>5}: {}",
                entry.origin.tag(),
                idx,
                format!("{}", entry.label),
                entry.instruction
            )?;
        }
        Ok(())
    }
}
