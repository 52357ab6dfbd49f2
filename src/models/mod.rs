// Streambot Models
// Data structures for the bot

mod settings;
mod stream_config;
mod stream_state;

pub use settings::*;
pub use stream_config::*;
pub use stream_state::*;
