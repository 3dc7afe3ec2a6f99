//! Common types shared by the rewards farmer crates

mod account;
mod error;
mod secret;

pub use account::{Account, load_lines, parse_accounts};
pub use error::{Error, Result};
pub use secret::Secret;
