//! Model of the stack machine programs that get woven
//!
//! Types are named and described with the compact descriptor syntax (`I`, `Lpkg/Klass;`,
//! `(ZI)V`). Method bodies are lists of labeled instructions, and jumps refer to labels rather
//! than positions.

mod access_flags;
mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod host;
mod members;
mod names;
pub mod runtime;
mod stack;

pub use access_flags::*;
pub use class_graph::*;
pub use code::*;
pub use descriptors::*;
pub use errors::*;
pub use host::*;
pub use members::*;
pub use names::*;
pub use stack::*;
