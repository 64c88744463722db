use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Brings the schema up to the latest version.
///
/// Foreign keys between pins, tags, lists and memberships are deferred to
/// commit time so multi-row mutations can delete the parent row before its
/// children inside one transaction.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        apply(conn, 1, V1)?;
    }

    info!("Database migrations complete");
    Ok(())
}

/// Runs one migration and records its version, all or nothing.
fn apply(conn: &Connection, version: i64, sql: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    tx.commit()?;
    Ok(())
}

const V1: &str = "
    CREATE TABLE users (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        status      INTEGER NOT NULL,
        username    TEXT NOT NULL UNIQUE,
        email       TEXT NOT NULL UNIQUE,
        password    TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );

    CREATE TABLE tokens (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        hash        TEXT NOT NULL UNIQUE,
        until       TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_tokens_until ON tokens(until);

    CREATE TABLE lists (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        description TEXT,
        public      INTEGER NOT NULL DEFAULT 0,
        pins        INTEGER NOT NULL DEFAULT 0 CHECK (pins >= 0),
        created_at  TEXT NOT NULL
    );

    CREATE TABLE user_has_list (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        role        INTEGER NOT NULL,
        list_id     INTEGER NOT NULL
            REFERENCES lists(id) DEFERRABLE INITIALLY DEFERRED,
        user_id     INTEGER NOT NULL
            REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
        UNIQUE(user_id, list_id)
    );

    CREATE INDEX idx_user_has_list_list ON user_has_list(list_id);

    CREATE TABLE pins (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        title       TEXT NOT NULL,
        url         TEXT NOT NULL,
        creator_id  INTEGER NOT NULL
            REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
        list_id     INTEGER
            REFERENCES lists(id) DEFERRABLE INITIALLY DEFERRED,
        created_at  TEXT NOT NULL
    );

    CREATE INDEX idx_pins_creator ON pins(creator_id, id);
    CREATE INDEX idx_pins_list ON pins(list_id, id);

    CREATE TABLE tags (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        pin_id      INTEGER NOT NULL
            REFERENCES pins(id) DEFERRABLE INITIALLY DEFERRED,
        name        TEXT NOT NULL,
        UNIQUE(pin_id, name)
    );

    CREATE INDEX idx_tags_name ON tags(name);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn failed_migration_leaves_nothing_behind() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE schema_version (version INTEGER NOT NULL);")
            .unwrap();

        let broken = "CREATE TABLE half (id INTEGER); CREATE TABLE half (id INTEGER);";
        assert!(apply(&conn, 7, broken).is_err());
        assert!(conn.is_autocommit());

        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE name = 'half'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tables, 0);

        run(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
