// src/sys/secrets.rs

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use zeroize::Zeroize;

/// SecretValue holds a value read from the vault for the shortest possible time.
///
/// 1. It cannot be accidentally logged (`{:?}` prints `[REDACTED]`).
/// 2. When it goes out of scope the heap buffer is zeroized.
pub struct SecretValue {
    value: SecretString,
}

impl SecretValue {
    /// Takes ownership of the raw CLI output and strips the trailing newline
    /// in place so no second plaintext copy is allocated.
    pub fn from_cli_output(mut raw: Vec<u8>) -> Result<Self, String> {
        while matches!(raw.last(), Some(b'\n') | Some(b'\r')) {
            raw.pop();
        }
        match String::from_utf8(raw) {
            Ok(text) => Ok(Self { value: SecretString::new(text) }),
            Err(e) => {
                let mut bytes = e.into_bytes();
                bytes.zeroize();
                Err("Secret value is not valid UTF-8".into())
            }
        }
    }

    pub fn new(value: String) -> Self {
        Self { value: SecretString::new(value) }
    }

    /// Exposes the plaintext only inside `action`; the borrow cannot escape it.
    pub fn use_secret<F, R>(&self, action: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        action(self.value.expose_secret().as_str())
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}
