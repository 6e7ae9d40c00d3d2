pub mod config;
pub mod domain;
pub mod http;
pub mod notify;
pub mod service;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use domain::*;
pub use notify::{Notifier, MessageHandler, NotifyError, PullSession};
pub use service::*;
pub use store::{ObjectStore, StoreError};
pub use telemetry::*;
