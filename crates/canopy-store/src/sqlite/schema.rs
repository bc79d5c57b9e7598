use rusqlite::Connection;

use canopy_types::InsertAt;

use crate::error::StoreResult;

/// Append-only block history plus the projection of each block's latest
/// version.
const BLOCKS: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    container_id TEXT NOT NULL,
    id           TEXT NOT NULL,
    parent_id    TEXT NOT NULL DEFAULT '',
    root_id      TEXT NOT NULL,
    type         TEXT NOT NULL DEFAULT '',
    modified_by  TEXT NOT NULL DEFAULT '',
    fields       TEXT NOT NULL DEFAULT '{}',
    create_at    INTEGER NOT NULL,
    update_at    INTEGER NOT NULL,
    delete_at    INTEGER NOT NULL DEFAULT 0,
    insert_at    INTEGER NOT NULL,
    PRIMARY KEY (container_id, id, insert_at)
);
CREATE INDEX IF NOT EXISTS idx_blocks_parent ON blocks(container_id, parent_id);
CREATE INDEX IF NOT EXISTS idx_blocks_type ON blocks(container_id, type);
CREATE INDEX IF NOT EXISTS idx_blocks_root ON blocks(container_id, root_id);

CREATE VIEW IF NOT EXISTS blocks_current AS
SELECT b.*
FROM blocks b
WHERE b.insert_at = (
    SELECT MAX(h.insert_at)
    FROM blocks h
    WHERE h.container_id = b.container_id AND h.id = b.id
);
"#;

const ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY,
    username     TEXT NOT NULL UNIQUE,
    email        TEXT NOT NULL UNIQUE,
    password     TEXT NOT NULL DEFAULT '',
    mfa_secret   TEXT NOT NULL DEFAULT '',
    auth_service TEXT NOT NULL DEFAULT '',
    auth_data    TEXT NOT NULL DEFAULT '',
    props        TEXT NOT NULL DEFAULT '{}',
    create_at    INTEGER NOT NULL,
    update_at    INTEGER NOT NULL,
    delete_at    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sessions (
    id           TEXT PRIMARY KEY,
    token        TEXT NOT NULL UNIQUE,
    user_id      TEXT NOT NULL,
    auth_service TEXT NOT NULL DEFAULT '',
    props        TEXT NOT NULL DEFAULT '{}',
    create_at    INTEGER NOT NULL,
    update_at    INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_update_at ON sessions(update_at);

CREATE TABLE IF NOT EXISTS workspaces (
    id           TEXT PRIMARY KEY,
    title        TEXT NOT NULL DEFAULT '',
    signup_token TEXT NOT NULL DEFAULT '',
    settings     TEXT NOT NULL DEFAULT '{}',
    modified_by  TEXT NOT NULL DEFAULT '',
    update_at    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS system_settings (
    id    TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Create every table, index and view. Safe to run on an existing database.
pub(crate) fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(BLOCKS)?;
    conn.execute_batch(ACCOUNTS)?;
    Ok(())
}

/// The newest version stored in any container, if any block was ever
/// written.
pub(crate) fn latest_insert_at(conn: &Connection) -> StoreResult<Option<InsertAt>> {
    let raw: Option<i64> = conn.query_row("SELECT MAX(insert_at) FROM blocks", [], |row| row.get(0))?;
    Ok(raw.map(InsertAt::from_raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn empty_database_has_no_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(latest_insert_at(&conn).unwrap(), None);
    }

    #[test]
    fn current_view_picks_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        for (insert_at, parent) in [(1, "old"), (3, "new"), (2, "mid")] {
            conn.execute(
                "INSERT INTO blocks (container_id, id, parent_id, root_id, create_at, update_at, insert_at)
                 VALUES ('0', 'b', ?1, 'b', 0, 0, ?2)",
                rusqlite::params![parent, insert_at],
            )
            .unwrap();
        }
        let parent: String = conn
            .query_row("SELECT parent_id FROM blocks_current WHERE id = 'b'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(parent, "new");
        assert_eq!(latest_insert_at(&conn).unwrap(), Some(InsertAt::from_raw(3)));
    }
}
