//! Pin writes and reads.
//!
//! A pin, its tags and its list's `pins` counter change together: creation
//! and deletion each run as one transaction, so a failure at any step leaves
//! none of the writes behind.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use pinlist_types::models::{NewPin, Pin, Tag};
use rusqlite::{Connection, TransactionBehavior, named_params};
use tracing::{debug, info};

use crate::lists::list_access;
use crate::models::{PIN_COLUMNS, pin_from_row, tag_from_row};
use crate::pagination::Window;
use crate::{Database, OptionalExt};

impl Database {
    /// Inserts the pin and its tags and bumps the list counter, atomically.
    ///
    /// When the pin targets a list, the creator's access to it is checked in
    /// the same transaction; `None` means the list is missing or not theirs
    /// to pin into, and nothing was written.
    pub fn create_pin(&self, new: &NewPin) -> Result<Option<Pin>> {
        let created_at = Utc::now();

        let pin = self.with_conn_mut(|conn| {
            // Take the write lock up front so the access check and the
            // writes see the same list row.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(list_id) = new.list_id {
                if !list_access(&tx, Some(new.creator_id), list_id)? {
                    return Ok(None);
                }
            }

            tx.execute(
                "INSERT INTO pins (title, url, creator_id, list_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![new.title, new.url, new.creator_id, new.list_id, created_at],
            )?;
            let pin_id = tx.last_insert_rowid();

            let mut tags = Vec::with_capacity(new.tags.len());
            {
                let mut stmt = tx.prepare_cached("INSERT INTO tags (pin_id, name) VALUES (?1, ?2)")?;
                for name in &new.tags {
                    stmt.execute(rusqlite::params![pin_id, name])?;
                    tags.push(Tag {
                        id: tx.last_insert_rowid(),
                        pin_id,
                        name: name.clone(),
                    });
                }
            }

            if let Some(list_id) = new.list_id {
                let n = tx.execute("UPDATE lists SET pins = pins + 1 WHERE id = ?1", [list_id])?;
                if n == 0 {
                    anyhow::bail!("list {} does not exist", list_id);
                }
            }

            tx.commit()?;

            Ok(Some(Pin {
                id: pin_id,
                title: new.title.clone(),
                url: new.url.clone(),
                creator_id: new.creator_id,
                creator: None,
                list_id: new.list_id,
                created_at,
                tags,
            }))
        })?;

        match &pin {
            Some(pin) => {
                info!(pin_id = pin.id, list_id = ?pin.list_id, tags = pin.tags.len(), "Pin created")
            }
            None => debug!(creator_id = new.creator_id, list_id = ?new.list_id, "Pin refused: no access to list"),
        }
        Ok(pin)
    }

    /// Removes a pin with its tags and decrements its list's counter,
    /// atomically. Returns `false` if no such pin exists.
    pub fn delete_pin(&self, id: i64) -> Result<bool> {
        let removed = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let list_id: Option<Option<i64>> = tx
                .query_row("SELECT list_id FROM pins WHERE id = ?1", [id], |r| r.get(0))
                .optional()?;
            let Some(list_id) = list_id else {
                return Ok(false);
            };

            tx.execute("DELETE FROM pins WHERE id = ?1", [id])?;
            tx.execute("DELETE FROM tags WHERE pin_id = ?1", [id])?;

            if let Some(list_id) = list_id {
                tx.execute(
                    "UPDATE lists SET pins = pins - 1 WHERE id = ?1 AND pins > 0",
                    [list_id],
                )?;
            }

            tx.commit()?;
            Ok(true)
        })?;

        if removed {
            info!(pin_id = id, "Pin deleted");
        }
        Ok(removed)
    }

    // -- Reads --

    pub fn pin_by_id(&self, id: i64) -> Result<Option<Pin>> {
        self.with_conn(|conn| {
            let pin = conn
                .query_row(
                    &format!(
                        "SELECT {PIN_COLUMNS} FROM pins p
                         LEFT JOIN users u ON u.id = p.creator_id
                         WHERE p.id = ?1"
                    ),
                    [id],
                    pin_from_row,
                )
                .optional()?;

            match pin {
                Some(pin) => Ok(attach_tags(conn, vec![pin])?.pop()),
                None => Ok(None),
            }
        })
    }

    /// Pins the user created plus pins on any list the user belongs to,
    /// newest first.
    pub fn pins_for_user(&self, user_id: i64, window: Window) -> Result<(Vec<Pin>, i64)> {
        const VISIBLE: &str = "(p.creator_id = :user OR p.list_id IN
            (SELECT list_id FROM user_has_list WHERE user_id = :user))";

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PIN_COLUMNS} FROM pins p
                 LEFT JOIN users u ON u.id = p.creator_id
                 WHERE {VISIBLE} AND (:before = 0 OR p.id < :before)
                 ORDER BY p.id DESC
                 LIMIT :limit"
            ))?;
            let pins = stmt
                .query_map(
                    named_params! {
                        ":user": user_id,
                        ":before": window.bound(),
                        ":limit": window.limit,
                    },
                    pin_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM pins p WHERE {VISIBLE}"),
                named_params! { ":user": user_id },
                |r| r.get(0),
            )?;

            Ok((attach_tags(conn, pins)?, total))
        })
    }

    /// Pins on one list, newest first. Access checks are the caller's job.
    pub fn pins_for_list(&self, list_id: i64, window: Window) -> Result<(Vec<Pin>, i64)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PIN_COLUMNS} FROM pins p
                 LEFT JOIN users u ON u.id = p.creator_id
                 WHERE p.list_id = :list AND (:before = 0 OR p.id < :before)
                 ORDER BY p.id DESC
                 LIMIT :limit"
            ))?;
            let pins = stmt
                .query_map(
                    named_params! {
                        ":list": list_id,
                        ":before": window.bound(),
                        ":limit": window.limit,
                    },
                    pin_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM pins WHERE list_id = ?1", [list_id], |r| {
                    r.get(0)
                })?;

            Ok((attach_tags(conn, pins)?, total))
        })
    }
}

/// Batch-loads tags for `pins` in one query and attaches them in insertion
/// order.
fn attach_tags(conn: &Connection, mut pins: Vec<Pin>) -> Result<Vec<Pin>> {
    if pins.is_empty() {
        return Ok(pins);
    }

    let placeholders: Vec<String> = (1..=pins.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT id, pin_id, name FROM tags WHERE pin_id IN ({}) ORDER BY id",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let ids: Vec<i64> = pins.iter().map(|p| p.id).collect();
    let tags = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), tag_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut by_pin: HashMap<i64, Vec<Tag>> = HashMap::new();
    for tag in tags {
        by_pin.entry(tag.pin_id).or_default().push(tag);
    }
    for pin in &mut pins {
        pin.tags = by_pin.remove(&pin.id).unwrap_or_default();
    }

    Ok(pins)
}
