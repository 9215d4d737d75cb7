//! App password resolution
//!
//! Sources are tried in order:
//! 1. stdin, when explicitly requested (`--password-stdin`)
//! 2. the `SKEETSWEEP_APP_PASSWORD` environment variable
//! 3. the OS keyring (service `skeetsweep`, user = account handle)
//! 4. an interactive prompt, when stdin is a terminal
//!
//! The password is held as a [`SecretString`] from the moment it is read.

use secrecy::{ExposeSecret, SecretString};
use std::io::BufRead;

use crate::error::{Result, SweepError};

/// Keyring service name for stored app passwords
pub const KEYRING_SERVICE: &str = "skeetsweep";

/// Environment variable holding the app password
pub const PASSWORD_ENV: &str = "SKEETSWEEP_APP_PASSWORD";

/// Read a password from the first line of `reader`
pub fn read_password_from<R: BufRead>(mut reader: R) -> Result<SecretString> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|e| SweepError::Credentials(format!("Failed to read password from stdin: {}", e)))?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(SweepError::Credentials(
            "Empty password provided on stdin".to_string(),
        ));
    }
    Ok(SecretString::from(password))
}

/// The app password from `SKEETSWEEP_APP_PASSWORD`, if set and non-empty
pub fn password_from_env() -> Option<SecretString> {
    std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|value| !value.is_empty())
        .map(SecretString::from)
}

/// App passwords stored in the OS keyring, one entry per handle
pub struct KeyringStore;

impl KeyringStore {
    fn entry(handle: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, handle)
            .map_err(|e| SweepError::Credentials(format!("OS keyring not accessible: {}", e)))
    }

    /// Look up the stored password for `handle`
    ///
    /// Returns `Ok(None)` when there is no entry.
    pub fn retrieve(handle: &str) -> Result<Option<SecretString>> {
        match Self::entry(handle)?.get_password() {
            Ok(password) => {
                tracing::debug!("Retrieved app password for {} from OS keyring", handle);
                Ok(Some(SecretString::from(password)))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SweepError::Credentials(format!("OS keyring error: {}", e))),
        }
    }

    pub fn store(handle: &str, password: &SecretString) -> Result<()> {
        Self::entry(handle)?
            .set_password(password.expose_secret())
            .map_err(|e| SweepError::Credentials(format!("OS keyring error: {}", e)))?;
        tracing::debug!("Stored app password for {} in OS keyring", handle);
        Ok(())
    }

    /// Remove the stored password; a missing entry is not an error
    pub fn delete(handle: &str) -> Result<()> {
        match Self::entry(handle)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SweepError::Credentials(format!("OS keyring error: {}", e))),
        }
    }
}

/// Prompt on the terminal, if there is one
pub fn prompt_password(handle: &str) -> Result<Option<SecretString>> {
    if !atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let password = rpassword::prompt_password(format!("App password for {}: ", handle))
        .map_err(|e| SweepError::Credentials(format!("Failed to prompt for password: {}", e)))?;
    if password.is_empty() {
        return Err(SweepError::Credentials("Empty password provided".to_string()));
    }
    Ok(Some(SecretString::from(password)))
}

/// Find the app password for `handle`
///
/// # Errors
///
/// Returns `SweepError::Credentials` when no source yields a password.
pub fn resolve_app_password(handle: &str, from_stdin: bool) -> Result<SecretString> {
    if from_stdin {
        return read_password_from(std::io::stdin().lock());
    }

    if let Some(password) = password_from_env() {
        tracing::debug!("Using app password from {}", PASSWORD_ENV);
        return Ok(password);
    }

    match KeyringStore::retrieve(handle) {
        Ok(Some(password)) => return Ok(password),
        Ok(None) => tracing::debug!("No keyring entry for {}", handle),
        // Headless systems often have no secret service; keep looking
        Err(e) => tracing::debug!("Skipping keyring: {}", e),
    }

    if let Some(password) = prompt_password(handle)? {
        return Ok(password);
    }

    Err(SweepError::Credentials(format!(
        "No app password for {}. Set {}, pass --password-stdin, or store one with `skeetsweep login`.",
        handle, PASSWORD_ENV
    )))
}
