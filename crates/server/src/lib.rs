//! HTTP front door for jobhook.
//!
//! `GET /run` starts (or looks up) a workflow run and reports whether it has
//! finished; `POST /resolve` is the callback a remote job uses to resolve the
//! run's pending promise.

pub mod config;
pub mod http;
pub mod logging;

pub use config::{ConfigError, ServerConfig, default_config_path, load_config, load_config_from_path};
pub use http::{ApiError, FrontDoorServer, RunningFrontDoor};
pub use logging::init_tracing;
