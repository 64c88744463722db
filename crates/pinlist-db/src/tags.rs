use anyhow::Result;
use pinlist_types::models::TagCount;
use rusqlite::named_params;

use crate::Database;
use crate::pagination::Window;

const VISIBLE_PINS: &str = "SELECT p.id FROM pins p
    WHERE p.creator_id = :user OR p.list_id IN
        (SELECT list_id FROM user_has_list WHERE user_id = :user)";

impl Database {
    /// Distinct tag names over every pin the user can see, alphabetically,
    /// with the number of pins carrying each.
    ///
    /// Aggregated rows have no id to page on, so here `window.before` is a
    /// number of names to skip.
    pub fn tags_for_user(&self, user_id: i64, window: Window) -> Result<(Vec<TagCount>, i64)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT t.name, COUNT(*) FROM tags t
                 WHERE t.pin_id IN ({VISIBLE_PINS})
                 GROUP BY t.name
                 ORDER BY t.name
                 LIMIT :limit OFFSET :skip"
            ))?;
            let tags = stmt
                .query_map(
                    named_params! {
                        ":user": user_id,
                        ":limit": window.limit,
                        ":skip": window.bound(),
                    },
                    |r| {
                        Ok(TagCount {
                            name: r.get(0)?,
                            count: r.get(1)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(DISTINCT t.name) FROM tags t WHERE t.pin_id IN ({VISIBLE_PINS})"),
                named_params! { ":user": user_id },
                |r| r.get(0),
            )?;

            Ok((tags, total))
        })
    }
}
