use super::{Code, Error, Flow, MethodRef};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

/// Depth of the evaluation stack just before an instruction runs
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct StackState(pub usize);

/// Stack depth at every instruction of a method body
///
/// Computed by propagating depths from the first instruction (at depth 0) along every control
/// flow edge until a fixed point is reached. Instructions that are never reached have no state.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StackStates(Vec<Option<StackState>>);

impl StackStates {
    pub fn compute(code: &Code) -> Result<StackStates, Error> {
        let mut states: Vec<Option<StackState>> = vec![None; code.len()];
        if code.is_empty() {
            return Ok(StackStates(states));
        }
        let label_indices = code.label_indices();

        let mut worklist: VecDeque<usize> = VecDeque::new();
        states[0] = Some(StackState(0));
        worklist.push_back(0);

        while let Some(index) = worklist.pop_front() {
            let depth = match states[index] {
                Some(StackState(depth)) => depth,
                None => continue,
            };
            let instruction = &code.entries[index].instruction;
            let effect = instruction.stack_effect();
            if effect.pop > depth {
                return Err(Error::StackUnderflow {
                    index,
                    pop: effect.pop,
                    depth,
                });
            }
            let next_depth = depth - effect.pop + effect.push;

            let mut propagate = |target: usize| -> Result<(), Error> {
                // Falling off the end of the body is not an edge
                if target >= states.len() {
                    return Ok(());
                }
                match states[target] {
                    None => {
                        states[target] = Some(StackState(next_depth));
                        worklist.push_back(target);
                        Ok(())
                    }
                    Some(StackState(existing)) if existing == next_depth => Ok(()),
                    Some(StackState(existing)) => Err(Error::InconsistentStack {
                        index: target,
                        existing,
                        incoming: next_depth,
                    }),
                }
            };
            let lookup = |label| {
                label_indices
                    .get(&label)
                    .copied()
                    .ok_or(Error::UnknownLabel { index, label })
            };

            match instruction.flow() {
                Flow::Next => propagate(index + 1)?,
                Flow::Jump(label) => propagate(lookup(label)?)?,
                Flow::Conditional(label) => {
                    propagate(lookup(label)?)?;
                    propagate(index + 1)?;
                }
                Flow::Return => {
                    if next_depth > 1 {
                        return Err(Error::InvalidReturnStack {
                            index,
                            depth: next_depth,
                        });
                    }
                }
                Flow::Throw => (),
            }
        }

        Ok(StackStates(states))
    }

    pub fn get(&self, index: usize) -> Option<StackState> {
        self.0.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_reachable(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<StackState>> + '_ {
        self.0.iter().copied()
    }
}

/// Stack states of every method analysed so far
#[derive(Debug, Default)]
pub struct StackStateCache(HashMap<MethodRef, StackStates>);

impl StackStateCache {
    pub fn new() -> StackStateCache {
        StackStateCache::default()
    }

    /// Stack states of `method`, whose body is `code`
    pub fn get_or_compute(
        &mut self,
        method: &MethodRef,
        code: &Code,
    ) -> Result<&StackStates, Error> {
        match self.0.entry(method.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(StackStates::compute(code)?)),
        }
    }
}
