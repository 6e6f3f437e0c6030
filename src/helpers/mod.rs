pub(crate) mod json;
pub mod lines;

pub use json::*;
pub use lines::LineDecoder;
