//! SQLite implementation of the [`Store`] capability set.
//!
//! Blocks live in one flat `blocks` history table keyed by
//! `(container_id, id, insert_at)`. Writes only ever append rows; reads go
//! through the `blocks_current` view, which keeps the newest version of each
//! block, and filter out deleted versions.

mod accounts;
mod blocks;
mod schema;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use canopy_types::{Block, Container, Session, TypeError, User, Workspace};

use crate::clock::VersionClock;
use crate::config::{DatabaseLocation, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::traits::Store;

/// Descendant levels returned by [`Store::get_sub_tree2`].
const SUB_TREE2_DEPTH: usize = 1;
/// Descendant levels returned by [`Store::get_sub_tree3`].
const SUB_TREE3_DEPTH: usize = 2;

/// Block store backed by a single SQLite connection.
///
/// `rusqlite::Connection` is `!Sync`, so the connection sits behind a
/// `Mutex`; every statement runs with exclusive access to it. The slot is
/// emptied by [`Store::shutdown`], after which every call fails with
/// [`StoreError::Closed`].
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
    clock: VersionClock,
    location: DatabaseLocation,
}

impl SqliteStore {
    /// Open (or create) the database described by `config` and make sure its
    /// schema exists.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let conn = match &config.database {
            DatabaseLocation::Memory => Connection::open_in_memory()?,
            DatabaseLocation::Path(path) => Connection::open(path)?,
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        schema::init_schema(&conn)?;

        // Versions written by an earlier process must stay older than ours.
        let clock = VersionClock::new();
        if let Some(latest) = schema::latest_insert_at(&conn)? {
            clock.observe(latest);
        }

        info!(database = ?config.database, "block store opened");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            clock,
            location: config.database.clone(),
        })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(&StoreConfig::default())
    }

    /// The block and up to `depth` levels of its descendants.
    ///
    /// The walk goes level by level and never revisits a block, so cyclic
    /// parent links terminate. An unknown or deleted `block_id` yields an
    /// empty vec.
    pub fn get_sub_tree(
        &self,
        container: &Container,
        block_id: &str,
        depth: usize,
    ) -> StoreResult<Vec<Block>> {
        self.with_conn(|conn| blocks::sub_tree(conn, container, block_id, depth))
    }

    /// Returns `true` once [`Store::shutdown`] has run.
    pub fn is_closed(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        // A panic while holding the lock leaves the connection itself intact.
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Closed),
        }
    }
}

/// Map a JSON column that failed to encode or decode.
pub(crate) fn decode_error(err: TypeError) -> StoreError {
    StoreError::Serialization(err.to_string())
}

impl Store for SqliteStore {
    fn insert_block(&self, container: &Container, block: &Block) -> StoreResult<()> {
        self.with_conn(|conn| blocks::insert(conn, &self.clock, container, block))
    }

    fn delete_block(
        &self,
        container: &Container,
        block_id: &str,
        modified_by: &str,
    ) -> StoreResult<()> {
        self.with_conn(|conn| blocks::delete(conn, &self.clock, container, block_id, modified_by))
    }

    fn get_all_blocks(&self, container: &Container) -> StoreResult<Vec<Block>> {
        self.with_conn(|conn| blocks::all(conn, container))
    }

    fn get_blocks_with_parent_and_type(
        &self,
        container: &Container,
        parent_id: &str,
        block_type: &str,
    ) -> StoreResult<Vec<Block>> {
        self.with_conn(|conn| blocks::with_parent_and_type(conn, container, parent_id, block_type))
    }

    fn get_blocks_with_parent(
        &self,
        container: &Container,
        parent_id: &str,
    ) -> StoreResult<Vec<Block>> {
        self.with_conn(|conn| blocks::with_parent(conn, container, parent_id))
    }

    fn get_blocks_with_type(
        &self,
        container: &Container,
        block_type: &str,
    ) -> StoreResult<Vec<Block>> {
        self.with_conn(|conn| blocks::with_type(conn, container, block_type))
    }

    fn get_blocks_with_root_id(
        &self,
        container: &Container,
        root_id: &str,
    ) -> StoreResult<Vec<Block>> {
        self.with_conn(|conn| blocks::with_root_id(conn, container, root_id))
    }

    fn get_sub_tree2(&self, container: &Container, block_id: &str) -> StoreResult<Vec<Block>> {
        self.get_sub_tree(container, block_id, SUB_TREE2_DEPTH)
    }

    fn get_sub_tree3(&self, container: &Container, block_id: &str) -> StoreResult<Vec<Block>> {
        self.get_sub_tree(container, block_id, SUB_TREE3_DEPTH)
    }

    fn get_parent_id(&self, container: &Container, block_id: &str) -> StoreResult<String> {
        self.with_conn(|conn| Ok(blocks::require_live(conn, container, block_id)?.parent_id))
    }

    fn get_root_id(&self, container: &Container, block_id: &str) -> StoreResult<String> {
        self.with_conn(|conn| Ok(blocks::require_live(conn, container, block_id)?.root_id))
    }

    fn get_block_history(
        &self,
        container: &Container,
        block_id: &str,
    ) -> StoreResult<Vec<Block>> {
        self.with_conn(|conn| blocks::history(conn, container, block_id))
    }

    fn get_registered_user_count(&self) -> StoreResult<u64> {
        self.with_conn(accounts::registered_user_count)
    }

    fn get_user_by_id(&self, user_id: &str) -> StoreResult<User> {
        self.with_conn(|conn| accounts::user_by(conn, accounts::UserKey::Id, user_id))
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        self.with_conn(|conn| accounts::user_by(conn, accounts::UserKey::Email, email))
    }

    fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        self.with_conn(|conn| accounts::user_by(conn, accounts::UserKey::Username, username))
    }

    fn create_user(&self, user: &User) -> StoreResult<()> {
        self.with_conn(|conn| accounts::create_user(conn, user))
    }

    fn update_user(&self, user: &User) -> StoreResult<()> {
        self.with_conn(|conn| accounts::update_user(conn, user))
    }

    fn update_user_password(&self, username: &str, password: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            accounts::update_password(conn, accounts::UserKey::Username, username, password)
        })
    }

    fn update_user_password_by_id(&self, user_id: &str, password: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            accounts::update_password(conn, accounts::UserKey::Id, user_id, password)
        })
    }

    fn get_active_user_count(&self, updated_seconds_ago: i64) -> StoreResult<u64> {
        self.with_conn(|conn| accounts::active_user_count(conn, updated_seconds_ago))
    }

    fn get_session(&self, token: &str, expire_seconds: i64) -> StoreResult<Session> {
        self.with_conn(|conn| accounts::session_by_token(conn, token, expire_seconds))
    }

    fn create_session(&self, session: &Session) -> StoreResult<()> {
        self.with_conn(|conn| accounts::create_session(conn, session))
    }

    fn refresh_session(&self, session: &Session) -> StoreResult<()> {
        self.with_conn(|conn| accounts::refresh_session(conn, session))
    }

    fn update_session(&self, session: &Session) -> StoreResult<()> {
        self.with_conn(|conn| accounts::update_session(conn, session))
    }

    fn delete_session(&self, session_id: &str) -> StoreResult<()> {
        self.with_conn(|conn| accounts::delete_session(conn, session_id))
    }

    fn clean_up_sessions(&self, expire_seconds: i64) -> StoreResult<()> {
        self.with_conn(|conn| accounts::clean_up_sessions(conn, expire_seconds))
    }

    fn get_workspace(&self, workspace_id: &str) -> StoreResult<Workspace> {
        self.with_conn(|conn| accounts::workspace(conn, workspace_id))
    }

    fn upsert_workspace(&self, workspace: &Workspace) -> StoreResult<()> {
        self.with_conn(|conn| accounts::upsert_workspace(conn, workspace))
    }

    fn get_workspace_count(&self) -> StoreResult<u64> {
        self.with_conn(accounts::workspace_count)
    }

    /// Local workspaces carry no membership; every user may enter them.
    fn has_workspace_access(&self, _user_id: &str, _workspace_id: &str) -> StoreResult<bool> {
        self.with_conn(|_| Ok(true))
    }

    fn get_system_settings(&self) -> StoreResult<BTreeMap<String, String>> {
        self.with_conn(accounts::system_settings)
    }

    fn set_system_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        self.with_conn(|conn| accounts::set_system_setting(conn, key, value))
    }

    fn shutdown(&self) -> StoreResult<()> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(conn) = guard.take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, err)| StoreError::Database(err))?;
        info!(database = ?self.location, "block store closed");
        Ok(())
    }
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("database", &self.location)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_creates_schema() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_all_blocks(&Container::global()).unwrap().is_empty());
        assert_eq!(store.get_registered_user_count().unwrap(), 0);
    }

    #[test]
    fn shutdown_closes_and_is_repeatable() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.shutdown().unwrap();
        assert!(store.is_closed());
        store.shutdown().unwrap();

        let err = store.get_all_blocks(&Container::global()).unwrap_err();
        assert!(matches!(err, StoreError::Closed));
        let err = store
            .insert_block(&Container::global(), &Block::root("late"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }

    #[test]
    fn data_survives_reopen_and_versions_keep_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::at_path(dir.path().join("blocks.db"));
        let container = Container::new("ws");

        let first = {
            let store = SqliteStore::open(&config).unwrap();
            store.insert_block(&container, &Block::root("board")).unwrap();
            let version = store.get_block_history(&container, "board").unwrap()[0].insert_at;
            store.shutdown().unwrap();
            version
        };

        let store = SqliteStore::open(&config).unwrap();
        assert_eq!(store.get_all_blocks(&container).unwrap().len(), 1);
        store.delete_block(&container, "board", "user-1").unwrap();
        let history = store.get_block_history(&container, "board").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].insert_at > first);
        assert!(store.get_all_blocks(&container).unwrap().is_empty());
    }

    #[test]
    fn sub_tree_with_zero_depth_is_just_the_block() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c = Container::global();
        store.insert_block(&c, &Block::root("a")).unwrap();
        store
            .insert_block(&c, &Block::new("b", "a").with_parent("a"))
            .unwrap();
        let tree = store.get_sub_tree(&c, "a", 0).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, "a");
    }

    #[test]
    fn debug_format() {
        let store = SqliteStore::open_in_memory().unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("SqliteStore"));
        assert!(debug.contains("closed"));
    }
}
