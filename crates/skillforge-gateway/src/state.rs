//! Shared application state handed to every axum handler via `State`.

use std::sync::Arc;

use skillforge_core::SkillCatalog;
use skillforge_log::InvocationLog;
use skillforge_protocol::MCPEngine;
use skillforge_session::SessionRegistry;
use skillforge_storage::{MetadataStore, ObjectStore};
use skillforge_vault::StaticTokenVerifier;

use crate::config::GatewayConfig;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<SkillCatalog>,
    pub object_store: Arc<dyn ObjectStore>,
    pub metadata_store: Arc<dyn MetadataStore>,
    pub sessions: Arc<SessionRegistry>,
    pub invocation_log: Arc<InvocationLog>,
    pub engine: Arc<MCPEngine>,
    pub admin_verifier: Option<Arc<StaticTokenVerifier>>,
    pub config: Arc<GatewayConfig>,
    pub log_tx: tokio::sync::broadcast::Sender<String>,
}
