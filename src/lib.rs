// Library exports for the harness binary and integration tests

pub mod bootstrap;
pub mod config;
pub mod dom;
pub mod harness;
pub mod player;
pub mod relay;
pub mod resolver;
pub mod timestamp;

pub use bootstrap::{mount, EmbedParams};
pub use config::EmbedConfig;
pub use player::ReplayPlayer;
pub use relay::{MessageEvent, MessageRelay};
pub use resolver::{BoundedResolver, ResolveError};
