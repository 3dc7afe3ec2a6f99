//! Account records and the line-oriented input files they are built from
//!
//! `accounts.txt` holds one `email|password` pair per line; `proxy.txt` holds
//! one proxy URL per line. Proxy line *i* is assigned to account line *i*.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::secret::Secret;

/// One managed account.
///
/// The identifier (email) is the key into the token map and the session
/// metadata map, so it must be unique across the account list.
#[derive(Debug, Clone)]
pub struct Account {
    pub identifier: String,
    pub credential: Secret<String>,
    /// Proxy URL assigned exclusively to this account, if any
    pub proxy: Option<String>,
}

/// Read a line-oriented file, dropping blank lines and surrounding whitespace.
pub fn load_lines(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    let lines: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    debug!(path = %path.display(), lines = lines.len(), "loaded line file");
    Ok(lines)
}

/// Build account records from `email|password` lines and the proxy list.
///
/// Only the first `|` separates the fields, so passwords may contain `|`.
pub fn parse_accounts(lines: &[String], proxies: &[String]) -> Result<Vec<Account>> {
    let mut seen = HashSet::new();
    let mut accounts = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        let line_no = i + 1;
        let (identifier, password) = line
            .split_once('|')
            .ok_or_else(|| Error::Accounts(format!("line {line_no}: expected email|password")))?;

        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(Error::Accounts(format!("line {line_no}: empty email")));
        }
        if password.is_empty() {
            return Err(Error::Accounts(format!("line {line_no}: empty password")));
        }
        if !seen.insert(identifier.to_owned()) {
            return Err(Error::Accounts(format!(
                "line {line_no}: duplicate account {identifier}"
            )));
        }

        accounts.push(Account {
            identifier: identifier.to_owned(),
            credential: Secret::from(password),
            proxy: proxies.get(i).cloned(),
        });
    }

    Ok(accounts)
}
