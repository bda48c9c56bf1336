//! Data models and configuration.

pub mod config;
pub mod events;
pub mod invoice;
