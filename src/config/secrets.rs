//! Secret handling.
//!
//! Account passwords are held as [`SecretString`] from the moment a row is
//! parsed. Only the operation payload exposes them; every display path
//! goes through [`redact`].

pub use secrecy::{ExposeSecret, SecretString};

/// Placeholder shown wherever a secret would otherwise be printed.
pub const REDACTED: &str = "********";

/// The redacted form of a secret. Empty secrets stay visibly empty.
pub fn redact(secret: &SecretString) -> &'static str {
    if secret.expose_secret().is_empty() {
        ""
    } else {
        REDACTED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_hides_content_but_not_emptiness() {
        assert_eq!(redact(&SecretString::from("hunter2")), REDACTED);
        assert_eq!(redact(&SecretString::from("")), "");
    }
}
