use serde::{Deserialize, Serialize};

use crate::user::Props;

/// A workspace: the named scope a [`Container`](crate::Container) refers to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub signup_token: String,
    #[serde(default)]
    pub settings: Props,
    #[serde(default)]
    pub modified_by: String,
    #[serde(default)]
    pub update_at: i64,
}

impl Workspace {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}
