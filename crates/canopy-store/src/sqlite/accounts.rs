//! Users, sessions, workspaces and system settings.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, Row};

use canopy_types::user::{props_from_json, props_to_json};
use canopy_types::{Session, User, Workspace};

use super::decode_error;
use crate::clock::now_ms;
use crate::error::{StoreError, StoreResult};

const USER_COLUMNS: &str = "id, username, email, password, mfa_secret, auth_service, auth_data, \
                            props, create_at, update_at, delete_at";
const SESSION_COLUMNS: &str = "id, token, user_id, auth_service, props, create_at, update_at";

/// Column a user is looked up by.
#[derive(Clone, Copy, Debug)]
pub(super) enum UserKey {
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
        props: props_from_json(&props).map_err(decode_error)?,
        create_at: row.get(8)?,
        update_at: row.get(9)?,
        delete_at: row.get(10)?,
    })
}

fn read_session(row: &Row<'_>) -> StoreResult<Session> {
    let props: String = row.get(4)?;
    Ok(Session {
        id: row.get(0)?,
        token: row.get(1)?,
        user_id: row.get(2)?,
        auth_service: row.get(3)?,
        props: props_from_json(&props).map_err(decode_error)?,
        create_at: row.get(5)?,
        update_at: row.get(6)?,
    })
}

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> StoreResult<u64> {
    let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

/// Lower bound of an activity window ending now.
fn window_start(seconds: i64) -> i64 {
    now_ms().saturating_sub(seconds.saturating_mul(1000))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub(super) fn registered_user_count(conn: &Connection) -> StoreResult<u64> {
    count(conn, "SELECT COUNT(*) FROM users WHERE delete_at = 0", [])
}

pub(super) fn user_by(conn: &Connection, key: UserKey, value: &str) -> StoreResult<User> {
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
}

pub(super) fn create_user(conn: &Connection, user: &User) -> StoreResult<()> {
    let now = now_ms();
    let create_at = if user.create_at != 0 { user.create_at } else { now };
    let props = props_to_json(&user.props).map_err(decode_error)?;
    conn.prepare_cached(
        "INSERT INTO users
            (id, username, email, password, mfa_secret, auth_service, auth_data,
             props, create_at, update_at, delete_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
    )?
    .execute(params![
        user.id,
        user.username,
        user.email,
        user.password,
        user.mfa_secret,
        user.auth_service,
        user.auth_data,
        props,
        create_at,
        now,
    ])?;
    Ok(())
}

pub(super) fn update_user(conn: &Connection, user: &User) -> StoreResult<()> {
    let props = props_to_json(&user.props).map_err(decode_error)?;
    let updated = conn
        .prepare_cached(
            "UPDATE users
             SET username = ?2, email = ?3, mfa_secret = ?4, auth_service = ?5,
                 auth_data = ?6, props = ?7, update_at = ?8
             WHERE id = ?1 AND delete_at = 0",
        )?
        .execute(params![
            user.id,
            user.username,
            user.email,
            user.mfa_secret,
            user.auth_service,
            user.auth_data,
            props,
            now_ms(),
        ])?;
    if updated == 0 {
        return Err(StoreError::not_found("user", &user.id));
    }
    Ok(())
}

pub(super) fn update_password(
    conn: &Connection,
    key: UserKey,
    value: &str,
    password: &str,
) -> StoreResult<()> {
    let sql = format!(
        "UPDATE users SET password = ?1, update_at = ?2 WHERE delete_at = 0 AND {} = ?3",
        key.column()
    );
    let updated = conn
        .prepare_cached(&sql)?
        .execute(params![password, now_ms(), value])?;
    if updated == 0 {
        return Err(StoreError::not_found("user", value));
    }
    Ok(())
}

pub(super) fn active_user_count(conn: &Connection, updated_seconds_ago: i64) -> StoreResult<u64> {
    count(
        conn,
        "SELECT COUNT(DISTINCT user_id) FROM sessions WHERE update_at > ?1",
        params![window_start(updated_seconds_ago)],
    )
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub(super) fn session_by_token(
    conn: &Connection,
    token: &str,
    expire_seconds: i64,
) -> StoreResult<Session> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token = ?1 AND update_at > ?2");
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params![token, window_start(expire_seconds)])?;
    match rows.next()? {
        Some(row) => read_session(row),
        // The token is a credential; keep it out of error messages.
        None => Err(StoreError::not_found("session", "<token>")),
    }
}

pub(super) fn create_session(conn: &Connection, session: &Session) -> StoreResult<()> {
    let now = now_ms();
    let props = props_to_json(&session.props).map_err(decode_error)?;
    conn.prepare_cached(
        "INSERT INTO sessions (id, token, user_id, auth_service, props, create_at, update_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?
    .execute(params![
        session.id,
        session.token,
        session.user_id,
        session.auth_service,
        props,
        if session.create_at != 0 { session.create_at } else { now },
        now,
    ])?;
    Ok(())
}

pub(super) fn refresh_session(conn: &Connection, session: &Session) -> StoreResult<()> {
    let updated = conn
        .prepare_cached("UPDATE sessions SET update_at = ?2 WHERE id = ?1")?
        .execute(params![session.id, now_ms()])?;
    if updated == 0 {
        return Err(StoreError::not_found("session", &session.id));
    }
    Ok(())
}

pub(super) fn update_session(conn: &Connection, session: &Session) -> StoreResult<()> {
    let props = props_to_json(&session.props).map_err(decode_error)?;
    let updated = conn
        .prepare_cached("UPDATE sessions SET props = ?2, update_at = ?3 WHERE id = ?1")?
        .execute(params![session.id, props, now_ms()])?;
    if updated == 0 {
        return Err(StoreError::not_found("session", &session.id));
    }
    Ok(())
}

pub(super) fn delete_session(conn: &Connection, session_id: &str) -> StoreResult<()> {
    conn.prepare_cached("DELETE FROM sessions WHERE id = ?1")?
        .execute(params![session_id])?;
    Ok(())
}

pub(super) fn clean_up_sessions(conn: &Connection, expire_seconds: i64) -> StoreResult<()> {
    conn.prepare_cached("DELETE FROM sessions WHERE update_at < ?1")?
        .execute(params![window_start(expire_seconds)])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Workspaces
// ---------------------------------------------------------------------------

pub(super) fn workspace(conn: &Connection, workspace_id: &str) -> StoreResult<Workspace> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, title, signup_token, settings, modified_by, update_at
         FROM workspaces WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![workspace_id])?;
    let Some(row) = rows.next()? else {
        return Err(StoreError::not_found("workspace", workspace_id));
    };
    let settings: String = row.get(3)?;
    Ok(Workspace {
        id: row.get(0)?,
        title: row.get(1)?,
        signup_token: row.get(2)?,
        settings: props_from_json(&settings).map_err(decode_error)?,
        modified_by: row.get(4)?,
        update_at: row.get(5)?,
    })
}

pub(super) fn upsert_workspace(conn: &Connection, workspace: &Workspace) -> StoreResult<()> {
    let settings = props_to_json(&workspace.settings).map_err(decode_error)?;
    conn.prepare_cached(
        "INSERT INTO workspaces (id, title, signup_token, settings, modified_by, update_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             signup_token = excluded.signup_token,
             settings = excluded.settings,
             modified_by = excluded.modified_by,
             update_at = excluded.update_at",
    )?
    .execute(params![
        workspace.id,
        workspace.title,
        workspace.signup_token,
        settings,
        workspace.modified_by,
        now_ms(),
    ])?;
    Ok(())
}

pub(super) fn workspace_count(conn: &Connection) -> StoreResult<u64> {
    count(conn, "SELECT COUNT(*) FROM workspaces", [])
}

// ---------------------------------------------------------------------------
// System settings
// ---------------------------------------------------------------------------

pub(super) fn system_settings(conn: &Connection) -> StoreResult<BTreeMap<String, String>> {
    let mut stmt = conn.prepare_cached("SELECT id, value FROM system_settings")?;
    let settings = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(settings)
}

pub(super) fn set_system_setting(conn: &Connection, key: &str, value: &str) -> StoreResult<()> {
    conn.prepare_cached(
        "INSERT INTO system_settings (id, value) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET value = excluded.value",
    )?
    .execute(params![key, value])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::sqlite::SqliteStore;
    use crate::traits::Store;
    use crate::StoreError;
    use canopy_types::{Session, User, Workspace};
    use serde_json::json;

    fn alice() -> User {
        let mut user = User::new("u-alice", "alice", "alice@example.com");
        user.password = "hash-1".into();
        user.props.insert("theme".into(), json!("dark"));
        user
    }

    #[test]
    fn create_and_lookup_user() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_user(&alice()).unwrap();

        let by_id = store.get_user_by_id("u-alice").unwrap();
        assert_eq!(by_id.username, "alice");
        assert_eq!(by_id.props["theme"], json!("dark"));
        assert!(by_id.create_at > 0);
        assert_eq!(store.get_user_by_email("alice@example.com").unwrap().id, "u-alice");
        assert_eq!(store.get_user_by_username("alice").unwrap().id, "u-alice");
        assert_eq!(store.get_registered_user_count().unwrap(), 1);
    }

    #[test]
    fn missing_user_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_user_by_id("nobody").unwrap_err().is_not_found());
        assert!(store.get_user_by_email("x@y").unwrap_err().is_not_found());
        assert!(store.get_user_by_username("nobody").unwrap_err().is_not_found());
    }

    #[test]
    fn duplicate_username_is_a_database_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_user(&alice()).unwrap();
        let mut twin = alice();
        twin.id = "u-twin".into();
        twin.email = "twin@example.com".into();
        assert!(matches!(
            store.create_user(&twin).unwrap_err(),
            StoreError::Database(_)
        ));
    }

    #[test]
    fn update_user_and_passwords() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_user(&alice()).unwrap();

        let mut changed = alice();
        changed.email = "alice@new.example.com".into();
        store.update_user(&changed).unwrap();
        assert_eq!(
            store.get_user_by_id("u-alice").unwrap().email,
            "alice@new.example.com"
        );

        store.update_user_password("alice", "hash-2").unwrap();
        assert_eq!(store.get_user_by_id("u-alice").unwrap().password, "hash-2");
        store.update_user_password_by_id("u-alice", "hash-3").unwrap();
        assert_eq!(store.get_user_by_id("u-alice").unwrap().password, "hash-3");

        assert!(store.update_user_password("nobody", "x").unwrap_err().is_not_found());
        assert!(store
            .update_user(&User::new("ghost", "ghost", "ghost@example.com"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn session_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_user(&alice()).unwrap();
        let session = Session::new("s-1", "token-1", "u-alice");
        store.create_session(&session).unwrap();

        let found = store.get_session("token-1", 60).unwrap();
        assert_eq!(found.user_id, "u-alice");
        assert_eq!(store.get_active_user_count(60).unwrap(), 1);

        store.refresh_session(&session).unwrap();
        let mut with_props = session.clone();
        with_props.props.insert("device".into(), json!("laptop"));
        store.update_session(&with_props).unwrap();
        assert_eq!(
            store.get_session("token-1", 60).unwrap().props["device"],
            json!("laptop")
        );

        store.delete_session("s-1").unwrap();
        assert!(store.get_session("token-1", 60).unwrap_err().is_not_found());
        store.delete_session("s-1").unwrap();
    }

    #[test]
    fn not_found_session_message_hides_token() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.get_session("secret-token", 60).unwrap_err();
        assert!(!err.to_string().contains("secret-token"));
    }

    #[test]
    fn expired_sessions_are_invisible_and_cleaned_up() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut stale = Session::new("s-old", "token-old", "u-alice");
        stale.create_at = 1;
        store.create_session(&stale).unwrap();
        store
            .with_conn(|conn| {
                conn.execute("UPDATE sessions SET update_at = 1 WHERE id = 's-old'", [])?;
                Ok(())
            })
            .unwrap();
        store
            .create_session(&Session::new("s-new", "token-new", "u-bob"))
            .unwrap();

        assert!(store.get_session("token-old", 60).unwrap_err().is_not_found());
        assert_eq!(store.get_active_user_count(60).unwrap(), 1);

        store.clean_up_sessions(60).unwrap();
        assert!(store.get_session("token-old", i64::MAX / 2000).unwrap_err().is_not_found());
        assert!(store.get_session("token-new", 60).is_ok());
    }

    #[test]
    fn refresh_of_missing_session_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .refresh_session(&Session::new("nope", "t", "u"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn workspace_upsert_and_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_workspace("w1").unwrap_err().is_not_found());

        store.upsert_workspace(&Workspace::new("w1", "Team")).unwrap();
        let mut renamed = Workspace::new("w1", "Team Renamed");
        renamed.settings.insert("color".into(), json!("green"));
        store.upsert_workspace(&renamed).unwrap();

        let ws = store.get_workspace("w1").unwrap();
        assert_eq!(ws.title, "Team Renamed");
        assert_eq!(ws.settings["color"], json!("green"));
        assert_eq!(store.get_workspace_count().unwrap(), 1);
        assert!(store.has_workspace_access("anyone", "w1").unwrap());
    }

    #[test]
    fn system_settings_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_system_setting("TelemetryID", "abc").unwrap();
        store.set_system_setting("TelemetryID", "def").unwrap();
        store.set_system_setting("Version", "2").unwrap();

        let settings = store.get_system_settings().unwrap();
        assert_eq!(settings.len(), 2);
        assert_eq!(settings["TelemetryID"], "def");
    }
}
