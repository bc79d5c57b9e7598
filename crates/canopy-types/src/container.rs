use std::fmt;

use serde::{Deserialize, Serialize};

/// Workspace scope of a block operation.
///
/// Every block read and write is filtered by the container's workspace id;
/// blocks in one container are never visible from another.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Container {
    pub workspace_id: String,
}

impl Container {
    /// Workspace id meaning "no workspace scoping".
    pub const GLOBAL_WORKSPACE_ID: &'static str = "0";

    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
        }
    }

    /// The unscoped container.
    pub fn global() -> Self {
        Self::new(Self::GLOBAL_WORKSPACE_ID)
    }

    pub fn is_global(&self) -> bool {
        self.workspace_id == Self::GLOBAL_WORKSPACE_ID
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Container({})", self.workspace_id)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.workspace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_global() {
        let c = Container::default();
        assert!(c.is_global());
        assert_eq!(c.workspace_id, "0");
    }

    #[test]
    fn named_container_is_not_global() {
        assert!(!Container::new("ws-1").is_global());
    }

    #[test]
    fn display_is_workspace_id() {
        assert_eq!(Container::new("ws-1").to_string(), "ws-1");
    }
}
