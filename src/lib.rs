pub mod auth;
pub mod client;
pub mod command;
pub mod config;
pub mod dashboard;
pub mod device;
pub mod error;
pub mod session;
pub mod types;

pub use auth::{AuthProvider, OndusAuthProvider, TokenSet};
pub use client::GroheClient;
pub use config::{ClientConfig, Credentials};
pub use device::Device;
pub use error::{Error, Result};
pub use types::{TapCommand, TapType, MAX_TAP_AMOUNT_ML};
