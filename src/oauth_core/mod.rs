pub mod authorization;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod gate;
pub mod http;
pub mod memory;
pub mod middleware;
pub mod nonce;
pub mod oauth_provider;
pub mod signature;
pub mod token_manager;
pub mod types;
