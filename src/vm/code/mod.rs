//! Method bodies: labeled instruction lists and the blocks spliced into them

mod block;
mod code;
mod instruction;
mod label;

pub use block::*;
pub use code::*;
pub use instruction::*;
pub use label::*;
