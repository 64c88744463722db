use anyhow::Result;
use chrono::Utc;
use pinlist_types::models::{List, ListRole, User};
use rusqlite::{Connection, named_params};
use tracing::info;

use crate::models::{LIST_COLUMNS, list_from_row, member_from_row};
use crate::pagination::Window;
use crate::{Database, OptionalExt};

/// Fields to change on a list. `None` leaves the column as it is.
#[derive(Debug, Default, Clone)]
pub struct ListChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub public: Option<bool>,
}

impl Database {
    // -- Mutations --

    /// Creates a list and makes `owner` its owner in the same transaction.
    pub fn create_list(
        &self,
        owner: &User,
        name: &str,
        description: Option<&str>,
        public: bool,
    ) -> Result<List> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO lists (name, description, public, pins, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                rusqlite::params![name, description, public, Utc::now()],
            )?;
            let list_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO user_has_list (role, list_id, user_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![ListRole::OWNER.bits(), list_id, owner.id],
            )?;
            tx.commit()?;

            Ok(List {
                id: list_id,
                name: name.to_string(),
                description: description.map(str::to_string),
                public,
                pins: 0,
                users: Vec::new(),
            })
        })
    }

    /// Grants `role` on a list, replacing any role the user already had.
    pub fn add_list_member(&self, list_id: i64, user_id: i64, role: ListRole) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_has_list (role, list_id, user_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, list_id) DO UPDATE SET role = excluded.role",
                rusqlite::params![role.bits(), list_id, user_id],
            )?;
            Ok(())
        })
    }

    /// Applies `changes` and returns the updated list, or `None` if it does
    /// not exist.
    pub fn update_list(&self, id: i64, changes: &ListChanges) -> Result<Option<List>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE lists SET
                    name = COALESCE(:name, name),
                    description = COALESCE(:description, description),
                    public = COALESCE(:public, public)
                 WHERE id = :id",
                named_params! {
                    ":name": changes.name,
                    ":description": changes.description,
                    ":public": changes.public,
                    ":id": id,
                },
            )?;
            Ok(())
        })?;
        self.list_by_id(id)
    }

    /// Deletes a list together with every membership row referencing it.
    /// Pins that were on the list stay, detached from it.
    pub fn delete_list(&self, id: i64) -> Result<bool> {
        let removed = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM lists WHERE id = ?1", [id])?;
            tx.execute("DELETE FROM user_has_list WHERE list_id = ?1", [id])?;
            tx.execute("UPDATE pins SET list_id = NULL WHERE list_id = ?1", [id])?;
            tx.commit()?;
            Ok(removed > 0)
        })?;

        if removed {
            info!(list_id = id, "List deleted");
        }
        Ok(removed)
    }

    // -- Reads --

    pub fn list_by_id(&self, id: i64) -> Result<Option<List>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {LIST_COLUMNS} FROM lists l WHERE l.id = ?1"),
                [id],
                list_from_row,
            )
            .optional()
        })
    }

    /// Like [`Database::list_by_id`] but with the member rows filled in.
    pub fn list_with_members(&self, id: i64) -> Result<Option<List>> {
        let Some(mut list) = self.list_by_id(id)? else {
            return Ok(None);
        };

        list.users = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, m.role FROM user_has_list m
                 INNER JOIN users u ON u.id = m.user_id
                 WHERE m.list_id = ?1
                 ORDER BY m.id",
            )?;
            let rows = stmt
                .query_map([id], member_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Ok(Some(list))
    }

    /// Lists the user is a member of, newest first.
    pub fn lists_for_user(&self, user: &User, window: Window) -> Result<(Vec<List>, i64)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LIST_COLUMNS} FROM lists l
                 INNER JOIN user_has_list m ON m.list_id = l.id
                 WHERE m.user_id = :user AND (:before = 0 OR l.id < :before)
                 ORDER BY l.id DESC
                 LIMIT :limit"
            ))?;
            let lists = stmt
                .query_map(
                    named_params! {
                        ":user": user.id,
                        ":before": window.bound(),
                        ":limit": window.limit,
                    },
                    list_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM user_has_list WHERE user_id = ?1",
                [user.id],
                |r| r.get(0),
            )?;

            Ok((lists, total))
        })
    }

    // -- Access control --

    /// A list is accessible when it is public or the user holds any role on
    /// it. Unknown lists are never accessible.
    pub fn has_access(&self, user: Option<&User>, list_id: i64) -> Result<bool> {
        self.with_conn(|conn| list_access(conn, user.map(|u| u.id), list_id))
    }

    /// True only if the user's role on the list carries the owner bit.
    pub fn is_owner(&self, user: &User, list_id: i64) -> Result<bool> {
        Ok(self
            .role_on_list(user.id, list_id)?
            .is_some_and(|role| role.contains(ListRole::OWNER)))
    }

    pub fn role_on_list(&self, user_id: i64, list_id: i64) -> Result<Option<ListRole>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT role FROM user_has_list WHERE user_id = :user AND list_id = :list",
                named_params! { ":user": user_id, ":list": list_id },
                |r| Ok(ListRole::from_bits(r.get(0)?)),
            )
            .optional()
        })
    }
}

/// Access check on an open connection, so writers can run it inside their
/// own transaction.
pub(crate) fn list_access(conn: &Connection, user_id: Option<i64>, list_id: i64) -> Result<bool> {
    let row: Option<(bool, bool)> = conn
        .query_row(
            "SELECT l.public, EXISTS(
                 SELECT 1 FROM user_has_list m WHERE m.list_id = l.id AND m.user_id = :user)
             FROM lists l WHERE l.id = :list",
            named_params! { ":user": user_id, ":list": list_id },
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    Ok(row.is_some_and(|(public, member)| public || member))
}
