//! Posting payload: the account to post from and the content to post.

use serde_json::{Value, json};

use crate::config::secrets::{self, ExposeSecret, SecretString};

/// Credentials for one remote account.
#[derive(Clone)]
pub struct Account {
    /// Site the account lives on, when the format carries one.
    pub site_url: Option<String>,
    pub username: String,
    pub password: SecretString,
    /// Label used in log lines (`https://blog.example/`, `lj:alice`, ...).
    pub target: String,
    /// The untouched input row, written back to the accounts output on success.
    pub raw_row: Vec<String>,
}

// raw_row carries the password in clear, so it stays out of Debug.
impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("site_url", &self.site_url)
            .field("username", &self.username)
            .field("password", &self.password)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Everything one submission needs.
#[derive(Debug, Clone)]
pub struct PostTask {
    pub account: Account,
    pub title: Option<String>,
    pub content: String,
    /// Comma-joined tag list, when a tag source is configured.
    pub tags: Option<String>,
    pub user_agent: Option<String>,
}

impl PostTask {
    pub fn target(&self) -> &str {
        &self.account.target
    }

    /// JSON handed to external operations. This is the one place the
    /// password leaves its `SecretString`.
    pub fn to_operation_json(&self) -> Value {
        json!({
            "site_url": self.account.site_url,
            "username": self.account.username,
            "password": self.account.password.expose_secret(),
            "target": self.account.target,
            "title": self.title,
            "content": self.content,
            "tags": self.tags,
            "user_agent": self.user_agent,
        })
    }

    /// Same shape as [`Self::to_operation_json`] with the password redacted.
    pub fn to_preview_json(&self) -> Value {
        let mut value = self.to_operation_json();
        value["password"] = Value::String(secrets::redact(&self.account.password).to_string());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> PostTask {
        PostTask {
            account: Account {
                site_url: Some("https://blog.example/".to_string()),
                username: "alice".to_string(),
                password: SecretString::from("hunter2"),
                target: "https://blog.example/".to_string(),
                raw_row: vec!["alice".to_string(), "hunter2".to_string()],
            },
            title: Some("Hello".to_string()),
            content: "World".to_string(),
            tags: None,
            user_agent: None,
        }
    }

    #[test]
    fn operation_json_exposes_password() {
        let value = task().to_operation_json();
        assert_eq!(value["password"], "hunter2");
        assert_eq!(value["title"], "Hello");
        assert!(value["tags"].is_null());
    }

    #[test]
    fn preview_json_redacts_password() {
        let value = task().to_preview_json();
        assert_eq!(value["password"], "********");
        assert_eq!(value["username"], "alice");
    }

    #[test]
    fn debug_output_does_not_leak_password() {
        let rendered = format!("{:?}", task());
        assert!(!rendered.contains("hunter2"));
    }
}
