use super::Shift;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Settings {
    /// Annotate the begin and end markers of every spliced region
    ///
    /// Each marker `nop` is followed by `push "debug: patch begin"; pop; nop` (or `end`), which
    /// makes the regions easy to spot when reading disassembly of the woven program.
    pub debug_markers: bool,

    /// Shift applied by selectors that do not specify their own
    pub default_shift: Shift,

    /// Distance moved by [`Shift::Before`]
    pub shift_before: usize,

    /// Distance moved by [`Shift::After`]
    pub shift_after: usize,

    /// Write a JSON snapshot of every scanned patch to this path
    pub dump_path: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            debug_markers: false,
            default_shift: Shift::By(0),
            shift_before: 1,
            shift_after: 1,
            dump_path: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}
