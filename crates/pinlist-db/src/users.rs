use anyhow::Result;
use chrono::Utc;
use pinlist_types::models::{User, UserStatus};
use rusqlite::named_params;

use crate::models::{USER_COLUMNS, user_from_row};
use crate::{Database, OptionalExt};

impl Database {
    /// Inserts an active account. `password_hash` must already be hashed.
    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<User> {
        let user = User {
            id: 0,
            status: UserStatus::Active,
            username: username.to_string(),
            email: email.to_string(),
            password: password_hash.to_string(),
            created_at: Utc::now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (status, username, email, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user.status.as_byte(),
                    user.username,
                    user.email,
                    user.password,
                    user.created_at
                ],
            )?;
            Ok(User {
                id: conn.last_insert_rowid(),
                ..user
            })
        })
    }

    /// Reports whether any account already uses `email` or `username`.
    pub fn user_exists(&self, email: &str, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE email = :email OR username = :username",
                named_params! { ":email": email, ":username": username },
                |r| r.get(0),
            )?;
            Ok(n > 0)
        })
    }

    /// Looks an account up by email or username. Password checking is left
    /// to the caller.
    pub fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users u WHERE u.email = :login OR u.username = :login"
                ),
                named_params! { ":login": login },
                user_from_row,
            )
            .optional()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil;

    #[test]
    fn create_and_find_user() {
        let db = testutil::db();
        let user = db.create_user("abc", "foo@foo.foo", "hash").unwrap();
        assert!(user.id > 0);

        assert!(db.user_exists("foo@foo.foo", "zzz").unwrap());
        assert!(db.user_exists("bar@foo.foo", "abc").unwrap());
        assert!(!db.user_exists("bar@foo.foo", "bca").unwrap());

        let by_email = db.user_by_login("foo@foo.foo").unwrap().unwrap();
        let by_name = db.user_by_login("abc").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_name.password, "hash");

        assert!(db.user_by_login("nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_a_constraint_violation() {
        let db = testutil::db();
        db.create_user("abc", "foo@foo.foo", "hash").unwrap();

        let err = db.create_user("abc", "bar@foo.foo", "hash").unwrap_err();
        assert!(crate::is_constraint_violation(&err));
        let err = db.create_user("xyz", "foo@foo.foo", "hash").unwrap_err();
        assert!(crate::is_constraint_violation(&err));

        assert!(!crate::is_constraint_violation(&anyhow::anyhow!("unrelated")));
    }
}
