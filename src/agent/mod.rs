//! Language model access

pub mod chat;

pub use chat::ChatClient;
