mod call;
mod diagnostics;
mod errors;
mod injectors;
mod patch;
mod pipeline;
mod remap;
mod resolve;
mod scan;
mod select;
mod settings;
mod transform;

pub use call::*;
pub use diagnostics::*;
pub use errors::*;
pub use injectors::*;
pub use patch::*;
pub use pipeline::*;
pub use remap::*;
pub use resolve::*;
pub use scan::*;
pub use select::*;
pub use settings::*;
pub use transform::*;
