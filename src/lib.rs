//! Static weaving of patch bodies into the methods of a stack machine program
//!
//! Patches are declared as [`weave::MixinDeclaration`]s. A [`weave::Weaver`] resolves where each
//! patch applies, clones the patch bodies onto their target classes, and splices calls to them
//! into the target methods of a [`vm::Host`] (usually a [`vm::ClassGraph`]).

pub mod manifest;
pub mod vm;
pub mod weave;
