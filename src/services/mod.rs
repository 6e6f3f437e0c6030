pub mod chat_relay;
pub mod readings;

pub use chat_relay::{ChatRelay, RelayError, RelayStream};
pub use readings::{ReadingError, ReadingService};
