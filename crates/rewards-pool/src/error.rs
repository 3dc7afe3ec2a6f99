//! Error types for account runs and scheduling

/// Errors from account runs and scheduler preflight.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable token could be obtained. Fatal for the account.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("proxy check failed: {0}")]
    ProxyCheck(String),

    #[error("client setup failed: {0}")]
    Client(String),

    #[error("no accounts loaded")]
    NoAccounts,

    #[error("not enough proxies: {accounts} accounts but {proxies} proxies")]
    ProxyShortage { accounts: usize, proxies: usize },
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
