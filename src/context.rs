//! The process-scoped context shared by the orchestrator and the HTTP
//! layer: the registry snapshot, the flow store, the signing/state-codec
//! material, and the per-VO IdP clients. Reified explicitly and passed as
//! axum `State` rather than kept as ambient global state, per the design
//! notes.

use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto::{StateCodec, TokenIssuer};
use crate::flow::FlowStore;
use crate::idp::IdPClient;
use crate::registry::Registry;

/// How verbose per-request logging should be.
#[derive(PartialEq, PartialOrd, Clone, Debug, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    Path,
    Headers,
}

impl Default for RequestsLoggingLevel {
    fn default() -> Self {
        Self::Path
    }
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone)]
pub struct AuthContext {
    pub registry: Arc<Registry>,
    pub flow_store: Arc<dyn FlowStore>,
    pub state_codec: Arc<StateCodec>,
    pub token_issuer: Arc<TokenIssuer>,
    pub idp_clients: Arc<HashMap<String, Arc<dyn IdPClient>>>,
    pub device_ttl_secs: i64,
    pub auth_code_ttl_secs: i64,
    pub base_url: String,
    pub requests_logging_level: RequestsLoggingLevel,
}

impl AuthContext {
    pub fn idp_for(&self, vo: &str) -> Option<&Arc<dyn IdPClient>> {
        self.idp_clients.get(vo)
    }
}
