pub mod reference;
pub mod resource;
pub mod stack;

pub use reference::{Attribute, Reference};
pub use resource::*;
pub use stack::{Output, Stack, StackError};
