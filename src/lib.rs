pub mod common;
pub mod crypto;
pub mod output;
pub mod session;
pub mod store;
pub mod transfer;
