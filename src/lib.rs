// Streambot Library
// Shared by the bot binary and the integration tests

pub mod commands;
pub mod models;
pub mod services;
