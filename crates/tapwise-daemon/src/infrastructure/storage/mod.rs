//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration file from the
//! platform-appropriate directory, writes the default file on request, and
//! turns the raw on-disk schema into validated [`Settings`].
//!
//! [`Settings`]: crate::application::settings::Settings

pub mod config;
