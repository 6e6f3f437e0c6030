mod conversation;
mod reading;

pub use conversation::*;
pub use reading::*;
