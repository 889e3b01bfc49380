use crate::model::Role;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// Identity the host has already authenticated. Requests without an actor
/// come from the trusted host itself.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub role: Role,
    #[serde(default)]
    pub guru_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub actor: Option<Actor>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
