//! CLI command implementations.

mod auth;
mod simulate;

pub use auth::{authorize_url, complete_callback, magic_link};
pub use simulate::simulate;
