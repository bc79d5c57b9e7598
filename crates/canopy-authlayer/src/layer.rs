use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use canopy_store::{Store, StoreError, StoreResult};
use canopy_types::{Block, Container, Session, User, Workspace};

use crate::config::AuthLayerConfig;
use crate::directory::{Directory, UserKey};

/// A [`Store`] whose accounts live in an external directory.
///
/// Blocks, workspace records and system settings go to the wrapped store
/// unchanged. Users, active-user counts, workspace titles and membership are
/// read from the directory instead. Account and session writes are refused:
/// the directory owns them.
pub struct AuthLayer {
    store: Box<dyn Store>,
    directory: Directory,
}

impl AuthLayer {
    /// Wrap `store`, opening the directory named by `config`.
    ///
    /// Fails if the directory file cannot be opened read only or does not
    /// answer a trivial query.
    pub fn open(config: &AuthLayerConfig, store: Box<dyn Store>) -> StoreResult<Self> {
        let directory = Directory::open(
            &config.directory_path,
            Duration::from_millis(config.busy_timeout_ms),
        )?;
        info!(directory = %config.directory_path.display(), "auth layer opened");
        Ok(Self { store, directory })
    }

    /// The wrapped store.
    pub fn inner(&self) -> &dyn Store {
        self.store.as_ref()
    }

    fn refuse(operation: &'static str) -> StoreError {
        warn!(operation, "refused: accounts are managed by the directory");
        StoreError::NotPermitted(format!(
            "{operation} is not allowed here, perform it in the directory"
        ))
    }
}

impl Store for AuthLayer {
    // -- blocks: forwarded -------------------------------------------------

    fn insert_block(&self, container: &Container, block: &Block) -> StoreResult<()> {
        self.store.insert_block(container, block)
    }

    fn delete_block(
        &self,
        container: &Container,
        block_id: &str,
        modified_by: &str,
    ) -> StoreResult<()> {
        self.store.delete_block(container, block_id, modified_by)
    }

    fn get_all_blocks(&self, container: &Container) -> StoreResult<Vec<Block>> {
        self.store.get_all_blocks(container)
    }

    fn get_blocks_with_parent_and_type(
        &self,
        container: &Container,
        parent_id: &str,
        block_type: &str,
    ) -> StoreResult<Vec<Block>> {
        self.store
            .get_blocks_with_parent_and_type(container, parent_id, block_type)
    }

    fn get_blocks_with_parent(
        &self,
        container: &Container,
        parent_id: &str,
    ) -> StoreResult<Vec<Block>> {
        self.store.get_blocks_with_parent(container, parent_id)
    }

    fn get_blocks_with_type(
        &self,
        container: &Container,
        block_type: &str,
    ) -> StoreResult<Vec<Block>> {
        self.store.get_blocks_with_type(container, block_type)
    }

    fn get_blocks_with_root_id(
        &self,
        container: &Container,
        root_id: &str,
    ) -> StoreResult<Vec<Block>> {
        self.store.get_blocks_with_root_id(container, root_id)
    }

    fn get_sub_tree2(&self, container: &Container, block_id: &str) -> StoreResult<Vec<Block>> {
        self.store.get_sub_tree2(container, block_id)
    }

    fn get_sub_tree3(&self, container: &Container, block_id: &str) -> StoreResult<Vec<Block>> {
        self.store.get_sub_tree3(container, block_id)
    }

    fn get_parent_id(&self, container: &Container, block_id: &str) -> StoreResult<String> {
        self.store.get_parent_id(container, block_id)
    }

    fn get_root_id(&self, container: &Container, block_id: &str) -> StoreResult<String> {
        self.store.get_root_id(container, block_id)
    }

    fn get_block_history(
        &self,
        container: &Container,
        block_id: &str,
    ) -> StoreResult<Vec<Block>> {
        self.store.get_block_history(container, block_id)
    }

    // -- users: read from the directory, writes refused ---------------------

    fn get_registered_user_count(&self) -> StoreResult<u64> {
        self.directory.registered_user_count()
    }

    fn get_user_by_id(&self, user_id: &str) -> StoreResult<User> {
        self.directory.user_by(UserKey::Id, user_id)
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        self.directory.user_by(UserKey::Email, email)
    }

    fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        self.directory.user_by(UserKey::Username, username)
    }

    fn create_user(&self, _user: &User) -> StoreResult<()> {
        Err(Self::refuse("user creation"))
    }

    fn update_user(&self, _user: &User) -> StoreResult<()> {
        Err(Self::refuse("user update"))
    }

    fn update_user_password(&self, _username: &str, _password: &str) -> StoreResult<()> {
        Err(Self::refuse("password update"))
    }

    fn update_user_password_by_id(&self, _user_id: &str, _password: &str) -> StoreResult<()> {
        Err(Self::refuse("password update"))
    }

    fn get_active_user_count(&self, updated_seconds_ago: i64) -> StoreResult<u64> {
        self.directory.active_user_count(updated_seconds_ago)
    }

    // -- sessions: refused --------------------------------------------------

    fn get_session(&self, _token: &str, _expire_seconds: i64) -> StoreResult<Session> {
        Err(Self::refuse("session lookup"))
    }

    fn create_session(&self, _session: &Session) -> StoreResult<()> {
        Err(Self::refuse("session creation"))
    }

    fn refresh_session(&self, _session: &Session) -> StoreResult<()> {
        Err(Self::refuse("session refresh"))
    }

    fn update_session(&self, _session: &Session) -> StoreResult<()> {
        Err(Self::refuse("session update"))
    }

    fn delete_session(&self, _session_id: &str) -> StoreResult<()> {
        Err(Self::refuse("session deletion"))
    }

    fn clean_up_sessions(&self, _expire_seconds: i64) -> StoreResult<()> {
        Err(Self::refuse("session cleanup"))
    }

    // -- workspaces ---------------------------------------------------------

    fn get_workspace(&self, workspace_id: &str) -> StoreResult<Workspace> {
        self.directory.workspace(workspace_id)
    }

    fn upsert_workspace(&self, workspace: &Workspace) -> StoreResult<()> {
        self.store.upsert_workspace(workspace)
    }

    fn get_workspace_count(&self) -> StoreResult<u64> {
        self.store.get_workspace_count()
    }

    fn has_workspace_access(&self, user_id: &str, workspace_id: &str) -> StoreResult<bool> {
        self.directory.has_membership(user_id, workspace_id)
    }

    // -- system settings: forwarded -----------------------------------------

    fn get_system_settings(&self) -> StoreResult<BTreeMap<String, String>> {
        self.store.get_system_settings()
    }

    fn set_system_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        self.store.set_system_setting(key, value)
    }

    // -- lifecycle ----------------------------------------------------------

    /// Shut down the wrapped store, then close the directory.
    ///
    /// The directory is closed even when the wrapped store fails; that
    /// failure is reported afterwards.
    fn shutdown(&self) -> StoreResult<()> {
        let wrapped = self.store.shutdown();
        let directory = self.directory.close();
        if let Err(err) = &wrapped {
            warn!(error = %err, "wrapped store failed to shut down");
        }
        if let Ok(true) = directory {
            info!(directory = %self.directory.path().display(), "auth layer closed");
        }
        wrapped.and(directory.map(|_| ()))
    }
}

impl fmt::Debug for AuthLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthLayer")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}
