// Streambot Services
// Business logic layer

mod error;
mod config_store;
mod media_locator;
mod link_resolver;
mod content_fetcher;
mod process_runner;
mod stream_registry;
mod thumbnail_cache;
mod telegram;
mod log_manager;
mod path_validator;

pub use error::*;
pub use config_store::*;
pub use media_locator::*;
pub use link_resolver::*;
pub use content_fetcher::*;
pub use process_runner::*;
pub use stream_registry::*;
pub use thumbnail_cache::*;
pub use telegram::*;
pub use log_manager::*;
pub use path_validator::*;
