mod raw;
mod loader;
pub mod error;

pub use error::ConfigError;
pub use loader::{load_account, load_accounts, parse_account, AccountConfig, PollSettings, DEFAULT_ENVIRONMENT};
