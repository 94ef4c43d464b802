//! Kiln Core - configuration and error types for the Kiln asset pipeline
//!
//! This crate provides the configuration model (tasks, transform steps,
//! task groups, watch rules, exports), the built-in presets, config file
//! discovery and validation, and the shared error types.

pub mod config;
pub mod error;

pub use config::{
    CacheConfig, Config, ExportsConfig, GroupConfig, GroupMode, OutputStyle, PipelineConfig,
    Preset, ServerConfig, StepConfig, TaskConfig, WatchConfig,
};
pub use error::{ConfigError, KilnError, Result};
