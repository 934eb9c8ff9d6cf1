//! Client for the organisation accounts resource.

mod client;
pub mod models;

#[cfg(test)]
pub use client::MockAccountApi;
pub use client::{AccountApi, AccountClient};
pub use models::{
    AccountAttributes, AccountData, AccountResponse, CreateAccountData, CreateAccountRequest,
};
