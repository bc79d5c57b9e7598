use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Free-form JSON properties attached to users, sessions and workspaces.
pub type Props = BTreeMap<String, Value>;

/// Serialize props to the JSON text stored in `props`/`settings` columns.
pub fn props_to_json(props: &Props) -> Result<String, TypeError> {
    serde_json::to_string(props).map_err(|e| TypeError::Serialization(e.to_string()))
}

/// Decode a props column. Empty or `null` columns decode to no props.
pub fn props_from_json(json: &str) -> Result<Props, TypeError> {
    if json.is_empty() || json == "null" {
        return Ok(Props::new());
    }
    serde_json::from_str(json).map_err(|e| TypeError::Serialization(e.to_string()))
}

/// An account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    /// Password hash; never the plain password.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub password: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub mfa_secret: String,
    pub auth_service: String,
    pub auth_data: String,
    pub props: Props,
    pub create_at: i64,
    pub update_at: i64,
    pub delete_at: i64,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.delete_at == 0
    }
}

/// An authenticated session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub token: String,
    pub user_id: String,
    pub auth_service: String,
    pub props: Props,
    pub create_at: i64,
    /// Last activity, milliseconds since the UNIX epoch.
    pub update_at: i64,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        token: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}
