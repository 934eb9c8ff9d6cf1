pub mod account;
pub mod breaker;
pub mod commands;
pub mod config;
pub mod http;

pub use account::{AccountApi, AccountClient};
pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use config::ClientConfig;
pub use http::{RequestError, TransportError};
