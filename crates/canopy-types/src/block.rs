use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::fields::{fields_to_json, FieldValue, Fields};
use crate::temporal::InsertAt;

/// A tree-structured content node.
///
/// Blocks form trees through `parent_id`. Every block also carries the id of
/// its topmost ancestor in `root_id`, set when the block is written, so root
/// lookups never walk the parent chain. A root block has an empty
/// `parent_id` and `root_id == id`.
///
/// A block is never updated in place. Writing a block appends a new version
/// stamped with a fresh [`InsertAt`]; deleting it appends a version with a
/// non-zero `delete_at`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    /// Empty for root blocks.
    pub parent_id: String,
    pub root_id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    pub modified_by: String,
    pub fields: Fields,
    /// Milliseconds since the UNIX epoch.
    pub create_at: i64,
    pub update_at: i64,
    /// Zero while the block is live.
    pub delete_at: i64,
    pub insert_at: InsertAt,
}

impl Block {
    /// Create a block under `root_id` with no parent.
    pub fn new(id: impl Into<String>, root_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            root_id: root_id.into(),
            ..Default::default()
        }
    }

    /// Create a root block (`root_id == id`).
    pub fn root(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id)
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    pub fn with_type(mut self, block_type: impl Into<String>) -> Self {
        self.block_type = block_type.into();
        self
    }

    pub fn with_modified_by(mut self, user_id: impl Into<String>) -> Self {
        self.modified_by = user_id.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if this block is the top of its tree.
    pub fn is_root(&self) -> bool {
        self.root_id == self.id
    }

    pub fn is_live(&self) -> bool {
        self.delete_at == 0
    }

    /// Check the rules a block must satisfy before it is written.
    ///
    /// A block needs an id and a root id, may not be its own parent, and a
    /// parentless block must be its own root. Its fields must serialize to
    /// JSON.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.id.is_empty() {
            return Err(TypeError::MissingId);
        }
        if self.root_id.is_empty() {
            return Err(TypeError::InvalidRootId);
        }
        if self.parent_id.is_empty() && self.root_id != self.id {
            return Err(TypeError::InvalidRootId);
        }
        if self.parent_id == self.id {
            return Err(TypeError::SelfParent(self.id.clone()));
        }
        fields_to_json(&self.fields).map(|_| ())
    }

    /// Validate the block and return its serialized fields.
    pub fn fields_json(&self) -> Result<String, TypeError> {
        self.validate()?;
        fields_to_json(&self.fields)
    }
}
