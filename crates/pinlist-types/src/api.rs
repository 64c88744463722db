use serde::{Deserialize, Serialize};

use crate::models::{Token, User};

pub const MAX_TAGS_PER_PIN: usize = 30;
pub const MAX_TAG_LEN: usize = 32;

/// Rejection reason for a request body that failed validation.
pub type ValidationError = String;

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(format!("{field} must be between {min} and {max} characters"));
    }
    Ok(())
}

// -- Accounts --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAccountRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl CreateAccountRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_len("username", &self.username, 3, 32)?;
        if !self
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err("username may only contain letters, digits, '_', '.' and '-'".into());
        }
        if !is_email(&self.email) {
            return Err("email is not a valid address".into());
        }
        check_len("email", &self.email, 3, 254)?;
        check_len("password", &self.password, 8, 128)?;
        Ok(())
    }
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.login.trim().is_empty() || self.password.is_empty() {
            return Err("login and password are required".into());
        }
        Ok(())
    }
}

/// Returned on signup and login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: Token,
}

// -- Lists --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateListRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
}

impl CreateListRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_len("name", self.name.trim(), 1, 100)?;
        if let Some(desc) = &self.description {
            check_len("description", desc, 0, 500)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateListRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub public: Option<bool>,
}

impl UpdateListRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            check_len("name", name.trim(), 1, 100)?;
        }
        if let Some(desc) = &self.description {
            check_len("description", desc, 0, 500)?;
        }
        Ok(())
    }
}

// -- Pins --

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePinRequest {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub list: Option<i64>,
}

impl CreatePinRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_len("title", self.title.trim(), 1, 200)?;

        let url = url::Url::parse(&self.url).map_err(|e| format!("url is invalid: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err("url must be an absolute http(s) address".into());
        }

        if self.tags.len() > MAX_TAGS_PER_PIN {
            return Err(format!("a pin may have at most {MAX_TAGS_PER_PIN} tags"));
        }
        for tag in &self.tags {
            check_len("tag", tag.trim(), 1, MAX_TAG_LEN)?;
        }

        if matches!(self.list, Some(id) if id <= 0) {
            return Err("list must be a positive id".into());
        }
        Ok(())
    }
}

// -- Pagination --

/// `limit`/`offset` query parameters. `offset` is the id of the oldest row
/// already seen; only rows older than it are returned.
///
/// Values that are blank or not integers count as 0, which later means
/// "use the default".
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default, deserialize_with = "lenient_int")]
    pub limit: i64,
    #[serde(default, deserialize_with = "lenient_int")]
    pub offset: i64,
}

fn lenient_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse().unwrap_or(0))
}
