//! C4: the flow-row data model and store contract for the device and
//! authorization-code grant state machines.

mod store;

pub use store::{FlowStore, SqliteFlowStore};

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Device,
    AuthCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStatus {
    Pending,
    Ready,
}

/// The id_token claims attached to a row on upstream completion, stored as
/// a flat string map per the data model (`map<string,string>`).
pub type IdTokenMap = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct FlowRow {
    pub kind: FlowKind,
    pub client_id: String,
    pub scope: String,
    pub audience: String,

    // Device-flow fields.
    pub user_code: Option<String>,
    pub device_code: Option<String>,

    // Auth-code-flow fields.
    pub uuid: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,

    pub status: FlowStatus,
    pub id_token: Option<IdTokenMap>,
    pub created_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum FlowStoreError {
    #[error("row not found")]
    NotFound,
    #[error("row has wrong status for this transition")]
    WrongStatus,
    #[error("authorization is still pending")]
    PendingAuthorization,
    #[error("flow has expired")]
    ExpiredFlow,
    #[error("storage error: {0}")]
    Storage(String),
}
