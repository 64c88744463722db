use anyhow::Result;
use chrono::{DateTime, Utc};
use pinlist_types::models::{Token, User};
use rusqlite::named_params;
use tracing::debug;

use crate::models::{TOKEN_COLUMNS, USER_COLUMNS, token_from_row, user_from_row};
use crate::{Database, OptionalExt};

impl Database {
    /// Issues and stores a new session token for `user_id`.
    pub fn create_token(&self, user_id: i64) -> Result<Token> {
        self.insert_token(Token::new(user_id))
    }

    pub fn insert_token(&self, token: Token) -> Result<Token> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tokens (hash, until, created_at, user_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![token.hash, token.until, token.created_at, token.user_id],
            )?;
            Ok(Token {
                id: conn.last_insert_rowid(),
                ..token
            })
        })
    }

    /// Resolves the owner of a live token. Unknown and expired tokens both
    /// come back as `None`.
    pub fn user_by_token(&self, hash: &str) -> Result<Option<User>> {
        self.user_by_token_at(hash, Utc::now())
    }

    pub fn user_by_token_at(&self, hash: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users u
                     INNER JOIN tokens t ON t.user_id = u.id
                     WHERE t.hash = :hash AND t.until > :now"
                ),
                named_params! { ":hash": hash, ":now": now },
                user_from_row,
            )
            .optional()
        })
    }

    pub fn token_by_hash(&self, hash: &str) -> Result<Option<Token>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {TOKEN_COLUMNS} FROM tokens t WHERE t.hash = ?1"),
                [hash],
                token_from_row,
            )
            .optional()
        })
    }

    /// Deletes a token. Revoking a token that does not exist succeeds.
    pub fn revoke_token(&self, hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM tokens WHERE hash = ?1", [hash])?;
            Ok(())
        })
    }

    /// Removes every token that expired before now. Returns how many went.
    pub fn sweep_expired_tokens(&self) -> Result<usize> {
        self.sweep_expired_tokens_at(Utc::now())
    }

    pub fn sweep_expired_tokens_at(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM tokens WHERE until < ?1", [now])?;
            debug!(removed = n, "Swept expired tokens");
            Ok(n)
        })
    }
}
