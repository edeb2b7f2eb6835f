//! Runtime composition (spec §4.6-§4.7): [`ServiceRuntime`] is the plain
//! load-balanced lifecycle; [`SingleActiveRuntime`] wraps it with leader
//! election and exclusive-RPC gating.

mod config;
mod service;
mod single_active;
mod state;

pub use config::{RuntimeConfig, RuntimeConfigBuilder, RuntimeConfigToml};
pub use service::{ServiceRuntime, UnhealthyCallback};
pub use single_active::SingleActiveRuntime;
pub use state::{RuntimeState, RuntimeStatus};
