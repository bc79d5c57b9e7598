//! On-disk directory databases for tests.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tempfile::TempDir;

use canopy_store::now_ms;

const SCHEMA: &str = r#"
CREATE TABLE users (
    id           TEXT PRIMARY KEY,
    username     TEXT NOT NULL,
    email        TEXT NOT NULL,
    password     TEXT,
    mfa_secret   TEXT,
    auth_service TEXT,
    auth_data    TEXT NULL,
    props        TEXT,
    create_at    INTEGER NOT NULL,
    update_at    INTEGER NOT NULL,
    delete_at    INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE sessions (
    id               TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL,
    last_activity_at INTEGER NOT NULL
);
CREATE TABLE channels (
    id           TEXT PRIMARY KEY,
    display_name TEXT,
    type         TEXT NOT NULL
);
CREATE TABLE channel_members (
    channel_id TEXT NOT NULL,
    user_id    TEXT NOT NULL
);
"#;

/// A directory database in a temporary folder, removed on drop.
pub(crate) struct DirectoryFixture {
    _dir: TempDir,
    path: PathBuf,
}

impl DirectoryFixture {
    /// Three live users, one deleted user, a public channel, a direct and a
    /// group conversation.
    pub(crate) fn seeded() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let users = [
            ("u-alice", "alice", r#"{"locale":"en"}"#, 0),
            ("u-bob", "bob", "{}", 0),
            ("u-carol", "carol", "", 0),
            ("u-gone", "gone", "{}", 5),
        ];
        for (id, username, props, delete_at) in users {
            conn.execute(
                "INSERT INTO users (id, username, email, password, auth_data, props,
                                    create_at, update_at, delete_at)
                 VALUES (?1, ?2, ?3, 'hash', NULL, ?4, 1, 1, ?5)",
                params![id, username, format!("{username}@example.com"), props, delete_at],
            )
            .unwrap();
        }

        let now = now_ms();
        for (id, user_id, last_activity_at) in [
            ("s-1", "u-alice", now),
            ("s-2", "u-alice", now - 1_000),
            ("s-3", "u-carol", 1),
        ] {
            conn.execute(
                "INSERT INTO sessions (id, user_id, last_activity_at) VALUES (?1, ?2, ?3)",
                params![id, user_id, last_activity_at],
            )
            .unwrap();
        }

        conn.execute_batch(
            "INSERT INTO channels (id, display_name, type) VALUES
                 ('ch-town', 'Town Square', 'O'),
                 ('ch-dm', '', 'D'),
                 ('ch-group', NULL, 'G');
             INSERT INTO channel_members (channel_id, user_id) VALUES
                 ('ch-town', 'u-alice'),
                 ('ch-town', 'u-bob'),
                 ('ch-dm', 'u-bob'),
                 ('ch-dm', 'u-alice'),
                 ('ch-group', 'u-carol'),
                 ('ch-group', 'u-alice'),
                 ('ch-group', 'u-bob');",
        )
        .unwrap();
        drop(conn);

        Self { _dir: dir, path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
