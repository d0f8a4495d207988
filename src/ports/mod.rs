//! Collaborator traits the engine is driven through.

pub mod config_port;
pub mod data_port;
