use std::collections::BTreeMap;
use std::sync::Arc;

use canopy_types::{Block, Container, Session, User, Workspace};

use crate::error::StoreResult;

/// The storage capability set.
///
/// Block operations are scoped by a [`Container`]; nothing written in one
/// container is visible from another. Implementations must satisfy these
/// invariants:
/// - Block writes are append-only. An insert adds a version, a delete adds a
///   deletion marker; earlier versions are never rewritten.
/// - Every version of a block gets a distinct, increasing `insert_at`.
/// - Reads see the latest version of each block and skip deleted ones.
/// - Filter and subtree queries return an empty vec for unknown keys; lookups
///   by identifier return [`StoreError::NotFound`](crate::StoreError::NotFound).
/// - Storage errors are propagated, never logged and swallowed.
pub trait Store: Send + Sync {
    // -- blocks -------------------------------------------------------------

    /// Append a new version of `block`.
    ///
    /// Fails with `InvalidBlock` when the id or root id is empty, the block
    /// is its own parent, or a field value cannot be serialized to JSON.
    fn insert_block(&self, container: &Container, block: &Block) -> StoreResult<()>;

    /// Mark a block deleted. Deleting a missing or already-deleted block
    /// succeeds without writing anything.
    fn delete_block(&self, container: &Container, block_id: &str, modified_by: &str)
        -> StoreResult<()>;

    fn get_all_blocks(&self, container: &Container) -> StoreResult<Vec<Block>>;

    fn get_blocks_with_parent_and_type(
        &self,
        container: &Container,
        parent_id: &str,
        block_type: &str,
    ) -> StoreResult<Vec<Block>>;

    fn get_blocks_with_parent(&self, container: &Container, parent_id: &str)
        -> StoreResult<Vec<Block>>;

    fn get_blocks_with_type(&self, container: &Container, block_type: &str)
        -> StoreResult<Vec<Block>>;

    fn get_blocks_with_root_id(&self, container: &Container, root_id: &str)
        -> StoreResult<Vec<Block>>;

    /// The block and its direct children.
    fn get_sub_tree2(&self, container: &Container, block_id: &str) -> StoreResult<Vec<Block>>;

    /// The block, its children and its grandchildren.
    fn get_sub_tree3(&self, container: &Container, block_id: &str) -> StoreResult<Vec<Block>>;

    /// Parent id of a live block; empty for a root block.
    fn get_parent_id(&self, container: &Container, block_id: &str) -> StoreResult<String>;

    /// Root id of a live block, read from the block itself.
    fn get_root_id(&self, container: &Container, block_id: &str) -> StoreResult<String>;

    /// Every stored version of a block, deletion markers included, oldest
    /// first.
    fn get_block_history(&self, container: &Container, block_id: &str)
        -> StoreResult<Vec<Block>>;

    // -- users --------------------------------------------------------------

    fn get_registered_user_count(&self) -> StoreResult<u64>;

    fn get_user_by_id(&self, user_id: &str) -> StoreResult<User>;

    fn get_user_by_email(&self, email: &str) -> StoreResult<User>;

    fn get_user_by_username(&self, username: &str) -> StoreResult<User>;

    fn create_user(&self, user: &User) -> StoreResult<()>;

    fn update_user(&self, user: &User) -> StoreResult<()>;

    fn update_user_password(&self, username: &str, password: &str) -> StoreResult<()>;

    fn update_user_password_by_id(&self, user_id: &str, password: &str) -> StoreResult<()>;

    /// Number of distinct users with session activity in the last
    /// `updated_seconds_ago` seconds.
    fn get_active_user_count(&self, updated_seconds_ago: i64) -> StoreResult<u64>;

    // -- sessions -----------------------------------------------------------

    /// A session by token, provided it was active within `expire_seconds`.
    fn get_session(&self, token: &str, expire_seconds: i64) -> StoreResult<Session>;

    fn create_session(&self, session: &Session) -> StoreResult<()>;

    fn refresh_session(&self, session: &Session) -> StoreResult<()>;

    fn update_session(&self, session: &Session) -> StoreResult<()>;

    fn delete_session(&self, session_id: &str) -> StoreResult<()>;

    /// Remove sessions inactive for longer than `expire_seconds`.
    fn clean_up_sessions(&self, expire_seconds: i64) -> StoreResult<()>;

    // -- workspaces ---------------------------------------------------------

    fn get_workspace(&self, workspace_id: &str) -> StoreResult<Workspace>;

    fn upsert_workspace(&self, workspace: &Workspace) -> StoreResult<()>;

    fn get_workspace_count(&self) -> StoreResult<u64>;

    fn has_workspace_access(&self, user_id: &str, workspace_id: &str) -> StoreResult<bool>;

    // -- system settings ----------------------------------------------------

    fn get_system_settings(&self) -> StoreResult<BTreeMap<String, String>>;

    fn set_system_setting(&self, key: &str, value: &str) -> StoreResult<()>;

    // -- lifecycle ----------------------------------------------------------

    /// Release the store's resources. Later calls fail with `Closed`.
    fn shutdown(&self) -> StoreResult<()>;
}

/// Shared stores forward every call to the store they point at.
impl<S: Store + ?Sized> Store for Arc<S> {
    fn insert_block(&self, container: &Container, block: &Block) -> StoreResult<()> {
        (**self).insert_block(container, block)
    }

    fn delete_block(
        &self,
        container: &Container,
        block_id: &str,
        modified_by: &str,
    ) -> StoreResult<()> {
        (**self).delete_block(container, block_id, modified_by)
    }

    fn get_all_blocks(&self, container: &Container) -> StoreResult<Vec<Block>> {
        (**self).get_all_blocks(container)
    }

    fn get_blocks_with_parent_and_type(
        &self,
        container: &Container,
        parent_id: &str,
        block_type: &str,
    ) -> StoreResult<Vec<Block>> {
        (**self).get_blocks_with_parent_and_type(container, parent_id, block_type)
    }

    fn get_blocks_with_parent(
        &self,
        container: &Container,
        parent_id: &str,
    ) -> StoreResult<Vec<Block>> {
        (**self).get_blocks_with_parent(container, parent_id)
    }

    fn get_blocks_with_type(
        &self,
        container: &Container,
        block_type: &str,
    ) -> StoreResult<Vec<Block>> {
        (**self).get_blocks_with_type(container, block_type)
    }

    fn get_blocks_with_root_id(
        &self,
        container: &Container,
        root_id: &str,
    ) -> StoreResult<Vec<Block>> {
        (**self).get_blocks_with_root_id(container, root_id)
    }

    fn get_sub_tree2(&self, container: &Container, block_id: &str) -> StoreResult<Vec<Block>> {
        (**self).get_sub_tree2(container, block_id)
    }

    fn get_sub_tree3(&self, container: &Container, block_id: &str) -> StoreResult<Vec<Block>> {
        (**self).get_sub_tree3(container, block_id)
    }

    fn get_parent_id(&self, container: &Container, block_id: &str) -> StoreResult<String> {
        (**self).get_parent_id(container, block_id)
    }

    fn get_root_id(&self, container: &Container, block_id: &str) -> StoreResult<String> {
        (**self).get_root_id(container, block_id)
    }

    fn get_block_history(
        &self,
        container: &Container,
        block_id: &str,
    ) -> StoreResult<Vec<Block>> {
        (**self).get_block_history(container, block_id)
    }

    fn get_registered_user_count(&self) -> StoreResult<u64> {
        (**self).get_registered_user_count()
    }

    fn get_user_by_id(&self, user_id: &str) -> StoreResult<User> {
        (**self).get_user_by_id(user_id)
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        (**self).get_user_by_email(email)
    }

    fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        (**self).get_user_by_username(username)
    }

    fn create_user(&self, user: &User) -> StoreResult<()> {
        (**self).create_user(user)
    }

    fn update_user(&self, user: &User) -> StoreResult<()> {
        (**self).update_user(user)
    }

    fn update_user_password(&self, username: &str, password: &str) -> StoreResult<()> {
        (**self).update_user_password(username, password)
    }

    fn update_user_password_by_id(&self, user_id: &str, password: &str) -> StoreResult<()> {
        (**self).update_user_password_by_id(user_id, password)
    }

    fn get_active_user_count(&self, updated_seconds_ago: i64) -> StoreResult<u64> {
        (**self).get_active_user_count(updated_seconds_ago)
    }

    fn get_session(&self, token: &str, expire_seconds: i64) -> StoreResult<Session> {
        (**self).get_session(token, expire_seconds)
    }

    fn create_session(&self, session: &Session) -> StoreResult<()> {
        (**self).create_session(session)
    }

    fn refresh_session(&self, session: &Session) -> StoreResult<()> {
        (**self).refresh_session(session)
    }

    fn update_session(&self, session: &Session) -> StoreResult<()> {
        (**self).update_session(session)
    }

    fn delete_session(&self, session_id: &str) -> StoreResult<()> {
        (**self).delete_session(session_id)
    }

    fn clean_up_sessions(&self, expire_seconds: i64) -> StoreResult<()> {
        (**self).clean_up_sessions(expire_seconds)
    }

    fn get_workspace(&self, workspace_id: &str) -> StoreResult<Workspace> {
        (**self).get_workspace(workspace_id)
    }

    fn upsert_workspace(&self, workspace: &Workspace) -> StoreResult<()> {
        (**self).upsert_workspace(workspace)
    }

    fn get_workspace_count(&self) -> StoreResult<u64> {
        (**self).get_workspace_count()
    }

    fn has_workspace_access(&self, user_id: &str, workspace_id: &str) -> StoreResult<bool> {
        (**self).has_workspace_access(user_id, workspace_id)
    }

    fn get_system_settings(&self) -> StoreResult<BTreeMap<String, String>> {
        (**self).get_system_settings()
    }

    fn set_system_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        (**self).set_system_setting(key, value)
    }

    fn shutdown(&self) -> StoreResult<()> {
        (**self).shutdown()
    }
}
