//! Read-only access to the external directory database.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, Row};

use canopy_store::{now_ms, StoreError, StoreResult};
use canopy_types::user::props_from_json;
use canopy_types::{Container, User, Workspace};

/// Channel types whose title is derived from their members.
const DIRECT_CHANNEL: &str = "D";
const GROUP_CHANNEL: &str = "G";

const USER_COLUMNS: &str = "id, username, email, COALESCE(password, ''), \
                            COALESCE(mfa_secret, ''), COALESCE(auth_service, ''), \
                            COALESCE(auth_data, ''), COALESCE(props, ''), \
                            create_at, update_at, delete_at";

/// Lookup key for directory users.
#[derive(Clone, Copy, Debug)]
pub(crate) enum UserKey {
    Id,
    Email,
    Username,
}

impl UserKey {
    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Email => "email",
            Self::Username => "username",
        }
    }
}

/// A read-only connection to the directory, closed at most once.
pub(crate) struct Directory {
    conn: Mutex<Option<Connection>>,
    path: PathBuf,
}

impl Directory {
    /// Open the directory file read only and check that it answers queries.
    pub(crate) fn open(path: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        if path.as_os_str().is_empty() {
            return Err(StoreError::Config("directory_path is not set".into()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(busy_timeout)?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Closed),
        }
    }

    /// Close the connection. Returns `false` if it was already closed.
    pub(crate) fn close(&self) -> StoreResult<bool> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(conn) => {
                conn.close().map_err(|(_, err)| StoreError::Database(err))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn user_by(&self, key: UserKey, value: &str) -> StoreResult<User> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE delete_at = 0 AND {} = ?1",
                key.column()
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let mut rows = stmt.query(params![value])?;
            match rows.next()? {
                Some(row) => read_user(row),
                None => Err(StoreError::not_found("user", value)),
            }
        })
    }

    pub(crate) fn registered_user_count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM users WHERE delete_at = 0", [], |row| {
                    row.get(0)
                })?;
            Ok(n.max(0) as u64)
        })
    }

    /// Distinct users with session activity in the last `seconds`.
    pub(crate) fn active_user_count(&self, seconds: i64) -> StoreResult<u64> {
        let since = now_ms().saturating_sub(seconds.saturating_mul(1000));
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT user_id) FROM sessions WHERE last_activity_at > ?1",
                params![since],
                |row| row.get(0),
            )?;
            Ok(n.max(0) as u64)
        })
    }

    /// The workspace backed by channel `workspace_id`.
    ///
    /// Direct and group conversations have no display name of their own;
    /// their title is the sorted member usernames joined with `", "`.
    pub(crate) fn workspace(&self, workspace_id: &str) -> StoreResult<Workspace> {
        if workspace_id == Container::GLOBAL_WORKSPACE_ID {
            return Ok(Workspace::new(Container::GLOBAL_WORKSPACE_ID, ""));
        }
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT display_name, type FROM channels WHERE id = ?1")?;
            let mut rows = stmt.query(params![workspace_id])?;
            let Some(row) = rows.next()? else {
                return Err(StoreError::not_found("workspace", workspace_id));
            };
            let display_name: Option<String> = row.get(0)?;
            let channel_type: String = row.get(1)?;

            let title = if channel_type == DIRECT_CHANNEL || channel_type == GROUP_CHANNEL {
                member_usernames(conn, workspace_id)?.join(", ")
            } else {
                display_name.unwrap_or_default()
            };
            Ok(Workspace::new(workspace_id, title))
        })
    }

    pub(crate) fn has_membership(&self, user_id: &str, workspace_id: &str) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                params![workspace_id, user_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn member_usernames(conn: &Connection, channel_id: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT u.username
         FROM channel_members m
         JOIN users u ON u.id = m.user_id
         WHERE m.channel_id = ?1
         ORDER BY u.username",
    )?;
    let names = stmt
        .query_map(params![channel_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn read_user(row: &Row<'_>) -> StoreResult<User> {
    let props: String = row.get(7)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        mfa_secret: row.get(4)?,
        auth_service: row.get(5)?,
        auth_data: row.get(6)?,
        props: props_from_json(&props).map_err(|e| StoreError::Serialization(e.to_string()))?,
        create_at: row.get(8)?,
        update_at: row.get(9)?,
        delete_at: row.get(10)?,
    })
}
