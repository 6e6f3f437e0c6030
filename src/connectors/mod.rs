//! External Service Connectors
//!
//! Adapters for the two services the application depends on: the station
//! network that reports current readings and the chat completion service.
//! Everything else talks to them through the traits defined here so routes
//! and services stay testable without network access.
//!
//! ## Architecture Pattern
//!
//! 1. Define the trait in `{service}/mod.rs` → allows mocking in tests
//! 2. Implement the HTTP client in `{service}/client.rs`
//! 3. Configuration in `config.rs` → loaded with the rest of the settings
//! 4. Inject trait objects into services → services never depend on HTTP details
//!
//! ## Usage
//!
//! ```ignore
//! let source: Arc<dyn StationSource> = Arc::new(WaqiClient::new(&settings.upstream)?);
//! let readings = ReadingService::new(source, store, &settings.upstream);
//! ```

pub mod completion;
pub mod config;
pub mod errors;
pub mod waqi;

pub use completion::{ChatTurn, CompletionService, FragmentStream, OpenAiCompletionClient};
pub use config::{BoundingBox, CompletionSettings, UpstreamSettings};
pub use errors::ConnectorError;
pub use waqi::{StationFeed, StationSource, StationSummary, WaqiClient};
