pub mod conversations;
pub mod health_checks;
pub mod readings;

pub use health_checks::*;
