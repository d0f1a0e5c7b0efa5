//! MCPEngine (C7): dispatches a decoded JSON-RPC request against the
//! session registry (C6) and the skill catalog (C5), rendering tool/prompt
//! content and producing the invocation accounting side effects (C2, C3).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use skillforge_core::SkillCatalog;
use skillforge_log::InvocationLog;
use skillforge_session::SessionRegistry;
use skillforge_storage::{MetadataStore, ObjectStore};
use skillforge_types::{
    Capabilities, ClientInfo, Error, InvocationEvent, InvocationStatus, Result, SkillStatus,
    DEFAULT_RETENTION_DAYS,
};

use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::render::render_instructions;

const PAGE_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tool_call_timeout: Duration,
    pub retention_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_call_timeout: Duration::from_secs(30),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// The result of one `dispatch` call: `response` is `None` for
/// notifications (no reply is ever sent), and `session_id` is the session
/// the caller should associate with the reply — a freshly minted id for
/// `initialize`, otherwise the id the caller supplied.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub response: Option<JsonRpcResponse>,
    pub session_id: Option<String>,
}

pub struct MCPEngine {
    catalog: Arc<SkillCatalog>,
    object_store: Arc<dyn ObjectStore>,
    sessions: Arc<SessionRegistry>,
    invocation_log: Arc<InvocationLog>,
    metadata_store: Arc<dyn MetadataStore>,
    config: EngineConfig,
}

impl MCPEngine {
    pub fn new(
        catalog: Arc<SkillCatalog>,
        object_store: Arc<dyn ObjectStore>,
        sessions: Arc<SessionRegistry>,
        invocation_log: Arc<InvocationLog>,
        metadata_store: Arc<dyn MetadataStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            object_store,
            sessions,
            invocation_log,
            metadata_store,
            config,
        }
    }

    /// Dispatches one decoded JSON-RPC message. `cancellation` is signalled
    /// by the transport when the client disconnects mid-call; dispatch
    /// checks it at the one genuine suspension point a `tools/call` has
    /// (the tool dispatch itself).
    pub async fn dispatch(
        &self,
        session_id: Option<String>,
        request: JsonRpcRequest,
        cancellation: CancellationToken,
    ) -> DispatchOutcome {
        let id_value = request.id.clone().unwrap_or(Value::Null);
        let is_notification = request.is_notification();

        let mut out_session_id = session_id.clone();
        let result = self
            .route(&mut out_session_id, session_id, &request, &cancellation)
            .await;

        let response = if is_notification {
            None
        } else {
            Some(match result {
                Ok(value) => JsonRpcResponse::success(id_value, value),
                Err(err) => JsonRpcResponse::failure(id_value, &err),
            })
        };

        DispatchOutcome {
            response,
            session_id: out_session_id,
        }
    }

    async fn route(
        &self,
        out_session_id: &mut Option<String>,
        session_id: Option<String>,
        request: &JsonRpcRequest,
        cancellation: &CancellationToken,
    ) -> Result<Value> {
        match request.method.as_str() {
            "initialize" => {
                let (value, sid) = self.handle_initialize(request).await?;
                *out_session_id = Some(sid);
                Ok(value)
            }
            "initialized" => {
                let sid = session_id.ok_or(Error::SessionNotFound)?;
                self.sessions.mark_initialized(&sid)?;
                Ok(Value::Null)
            }
            "ping" => {
                let sid = session_id.ok_or(Error::SessionNotFound)?;
                self.sessions.touch(&sid)?;
                Ok(serde_json::json!({}))
            }
            "tools/list" => {
                let sid = session_id.ok_or(Error::SessionNotFound)?;
                self.sessions.touch(&sid)?;
                self.handle_tools_list(request).await
            }
            "tools/call" => {
                let sid = session_id.ok_or(Error::SessionNotFound)?;
                self.sessions.touch(&sid)?;
                self.handle_tools_call(&sid, request, cancellation).await
            }
            "prompts/list" => {
                let sid = session_id.ok_or(Error::SessionNotFound)?;
                self.sessions.touch(&sid)?;
                self.handle_prompts_list(request).await
            }
            "prompts/get" => {
                let sid = session_id.ok_or(Error::SessionNotFound)?;
                self.sessions.touch(&sid)?;
                self.handle_prompts_get(request).await
            }
            "resources/list" => {
                let sid = session_id.ok_or(Error::SessionNotFound)?;
                self.sessions.touch(&sid)?;
                self.handle_resources_list(request).await
            }
            "resources/read" => {
                let sid = session_id.ok_or(Error::SessionNotFound)?;
                self.sessions.touch(&sid)?;
                self.handle_resources_read(request).await
            }
            "completion/complete" => {
                let sid = session_id.ok_or(Error::SessionNotFound)?;
                self.sessions.touch(&sid)?;
                self.handle_completion_complete(request).await
            }
            other => Err(Error::ToolNotFound(format!("unknown method: {other}"))),
        }
    }

    async fn handle_initialize(&self, request: &JsonRpcRequest) -> Result<(Value, String)> {
        #[derive(Deserialize)]
        struct Params {
            #[serde(rename = "protocolVersion")]
            protocol_version: String,
            #[serde(default)]
            capabilities: Capabilities,
            #[serde(rename = "clientInfo", default)]
            client_info: Option<ClientInfo>,
        }
        let params: Params = serde_json::from_value(request.params.clone())
            .map_err(|e| Error::InvalidManifest(format!("invalid initialize params: {e}")))?;

        let session = self.sessions.initialize(
            &[params.protocol_version],
            params.client_info,
            params.capabilities,
        )?;

        let result = serde_json::json!({
            "protocolVersion": session.protocol_version,
            "serverInfo": { "name": "skillforge", "version": env!("CARGO_PKG_VERSION") },
            "capabilities": {
                "tools": session.server_capabilities.tools,
                "prompts": session.server_capabilities.prompts,
                "resources": session.server_capabilities.resources,
            },
        });
        Ok((result, session.id))
    }

    async fn handle_tools_list(&self, request: &JsonRpcRequest) -> Result<Value> {
        #[derive(Deserialize, Default)]
        struct Params {
            cursor: Option<String>,
        }
        let params: Params = parse_params(&request.params)?;
        let offset = parse_cursor(params.cursor.as_deref());

        let mut skills = self.catalog.list().await;
        skills.retain(|s| s.status == SkillStatus::Active && s.manifest.user_invocable);
        skills.sort_by(|a, b| a.id.cmp(&b.id));

        let page: Vec<Value> = skills
            .iter()
            .skip(offset)
            .take(PAGE_SIZE)
            .map(|s| {
                serde_json::json!({
                    "name": s.id,
                    "description": s.manifest.description,
                    "inputSchema": { "type": "object", "additionalProperties": true },
                })
            })
            .collect();
        let next_cursor = next_cursor(offset, skills.len());

        Ok(serde_json::json!({ "tools": page, "nextCursor": next_cursor }))
    }

    async fn handle_tools_call(
        &self,
        session_id: &str,
        request: &JsonRpcRequest,
        cancellation: &CancellationToken,
    ) -> Result<Value> {
        #[derive(Deserialize)]
        struct Params {
            name: String,
            #[serde(default)]
            arguments: serde_json::Map<String, Value>,
        }
        let params: Params = serde_json::from_value(request.params.clone())
            .map_err(|e| Error::InvalidManifest(format!("invalid tools/call params: {e}")))?;

        let start = Instant::now();
        let outcome = tokio::select! {
            _ = cancellation.cancelled() => Err(Error::Cancelled),
            timed = tokio::time::timeout(self.config.tool_call_timeout, self.call_tool(&params.name, &params.arguments)) => {
                match timed {
                    Ok(inner) => inner,
                    Err(_) => Err(Error::Timeout),
                }
            }
        };

        // A cancelled call has no recipient left to log an error for and
        // did not complete, so it is not an invocation event at all.
        if matches!(outcome, Err(Error::Cancelled)) {
            return outcome;
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let (status, error_message) = match &outcome {
            Ok(_) => (InvocationStatus::Success, None),
            Err(err) => (InvocationStatus::Error, Some(err.to_string())),
        };
        let event = InvocationEvent::new(
            &params.name,
            session_id,
            "tools/call",
            duration_ms,
            status,
            error_message,
            &request.params,
            self.config.retention_days,
        );
        self.invocation_log.append(event);
        self.metadata_store
            .increment_invocation(&params.name, Utc::now())
            .await;
        self.catalog.record_invocation(&params.name).await;

        outcome
    }

    async fn call_tool(&self, name: &str, arguments: &serde_json::Map<String, Value>) -> Result<Value> {
        let skill = self
            .catalog
            .get(name)
            .await
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        if skill.status != SkillStatus::Active {
            return Err(Error::ToolNotFound(name.to_string()));
        }
        if !skill.manifest.user_invocable {
            return Err(Error::PermissionDenied(format!("{name} is not user-invocable")));
        }
        let rendered = render_instructions(&skill.instructions, arguments);
        Ok(serde_json::json!({
            "content": [{ "type": "text", "text": rendered }],
            "isError": false,
        }))
    }

    async fn handle_prompts_list(&self, request: &JsonRpcRequest) -> Result<Value> {
        #[derive(Deserialize, Default)]
        struct Params {
            cursor: Option<String>,
        }
        let params: Params = parse_params(&request.params)?;
        let offset = parse_cursor(params.cursor.as_deref());

        let mut skills = self.catalog.list().await;
        skills.retain(|s| s.status == SkillStatus::Active);
        skills.sort_by(|a, b| a.id.cmp(&b.id));

        let page: Vec<Value> = skills
            .iter()
            .skip(offset)
            .take(PAGE_SIZE)
            .map(|s| serde_json::json!({ "name": s.id, "description": s.manifest.description }))
            .collect();
        let next_cursor = next_cursor(offset, skills.len());

        Ok(serde_json::json!({ "prompts": page, "nextCursor": next_cursor }))
    }

    async fn handle_prompts_get(&self, request: &JsonRpcRequest) -> Result<Value> {
        #[derive(Deserialize)]
        struct Params {
            name: String,
            #[serde(default)]
            arguments: serde_json::Map<String, Value>,
        }
        let params: Params = serde_json::from_value(request.params.clone())
            .map_err(|e| Error::InvalidManifest(format!("invalid prompts/get params: {e}")))?;

        let skill = self
            .catalog
            .get(&params.name)
            .await
            .ok_or_else(|| Error::ToolNotFound(params.name.clone()))?;
        let rendered = render_instructions(&skill.instructions, &params.arguments);

        Ok(serde_json::json!({
            "description": skill.manifest.description,
            "messages": [{ "role": "user", "content": { "type": "text", "text": rendered } }],
        }))
    }

    async fn handle_resources_list(&self, request: &JsonRpcRequest) -> Result<Value> {
        #[derive(Deserialize, Default)]
        struct Params {
            cursor: Option<String>,
        }
        let params: Params = parse_params(&request.params)?;
        let offset = parse_cursor(params.cursor.as_deref());

        let skills = self.catalog.list().await;
        let mut resources: Vec<(String, String)> = Vec::new();
        for skill in skills.iter().filter(|s| s.status == SkillStatus::Active) {
            for entry in skill.files.references.iter().chain(skill.files.assets.iter()) {
                resources.push((format!("skill://{}/{}", skill.id, entry.path), entry.path.clone()));
            }
        }
        resources.sort();

        let total = resources.len();
        let page: Vec<Value> = resources
            .into_iter()
            .skip(offset)
            .take(PAGE_SIZE)
            .map(|(uri, name)| serde_json::json!({ "uri": uri, "name": name }))
            .collect();
        let next_cursor = next_cursor(offset, total);

        Ok(serde_json::json!({ "resources": page, "nextCursor": next_cursor }))
    }

    async fn handle_resources_read(&self, request: &JsonRpcRequest) -> Result<Value> {
        #[derive(Deserialize)]
        struct Params {
            uri: String,
        }
        let params: Params = serde_json::from_value(request.params.clone())
            .map_err(|e| Error::InvalidManifest(format!("invalid resources/read params: {e}")))?;

        let (id, path) = parse_skill_uri(&params.uri)?;
        let skill = self
            .catalog
            .get(&id)
            .await
            .ok_or_else(|| Error::ToolNotFound(id.clone()))?;
        let known = skill
            .files
            .references
            .iter()
            .chain(skill.files.assets.iter())
            .any(|e| e.path == path);
        if !known {
            return Err(Error::ToolNotFound(format!("{id} has no resource at {path}")));
        }

        let files = self.object_store.get_version(&id, skill.version).await?;
        let bytes = files
            .get(&path)
            .ok_or_else(|| Error::internal(format!("{path} missing from stored version {}", skill.version)))?;

        let content = match std::str::from_utf8(bytes) {
            Ok(text) => serde_json::json!({ "uri": params.uri, "mimeType": "text/plain", "text": text }),
            Err(_) => {
                serde_json::json!({ "uri": params.uri, "mimeType": "application/octet-stream", "text": "" })
            }
        };

        Ok(serde_json::json!({ "contents": [content] }))
    }

    /// Best-effort per §4.7; the catalog has no enumerable argument domain
    /// to complete against, so this always returns an empty completion set
    /// rather than guessing.
    async fn handle_completion_complete(&self, _request: &JsonRpcRequest) -> Result<Value> {
        Ok(serde_json::json!({ "completion": { "values": [], "total": 0, "hasMore": false } }))
    }
}

fn parse_params<T: serde::de::DeserializeOwned + Default>(value: &Value) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| Error::InvalidManifest(format!("invalid params: {e}")))
}

fn parse_cursor(cursor: Option<&str>) -> usize {
    cursor.and_then(|c| c.parse().ok()).unwrap_or(0)
}

fn next_cursor(offset: usize, total: usize) -> Option<String> {
    if offset + PAGE_SIZE < total {
        Some((offset + PAGE_SIZE).to_string())
    } else {
        None
    }
}

fn parse_skill_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri
        .strip_prefix("skill://")
        .ok_or_else(|| Error::InvalidManifest(format!("not a skill:// uri: {uri}")))?;
    let (id, path) = rest
        .split_once('/')
        .ok_or_else(|| Error::InvalidManifest(format!("malformed skill uri: {uri}")))?;
    Ok((id.to_string(), path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillforge_storage::{FileTree, LocalMetadataStore, LocalObjectStore};
    use std::collections::BTreeMap;

    const VALID_SKILL_MD: &[u8] =
        b"---\nname: echo\ndescription: echoes the provided input\n---\n\nYou said: {{msg}}\n";

    fn files(entries: &[(&str, &[u8])]) -> FileTree {
        entries.iter().map(|(p, c)| (p.to_string(), c.to_vec())).collect::<BTreeMap<_, _>>()
    }

    async fn test_engine() -> (MCPEngine, tempfile::TempDir, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let object_store = Arc::new(LocalObjectStore::new(dir.path().join("objects")));
        let (db, db_dir) = skillforge_test_utils::temp_sqlite_handle();
        let metadata_store: Arc<dyn MetadataStore> = Arc::new(LocalMetadataStore::new(db.clone()));
        let catalog = Arc::new(SkillCatalog::new(object_store.clone(), metadata_store.clone()));
        let sessions = Arc::new(SessionRegistry::new(Default::default()));
        let (log, _worker) = InvocationLog::spawn(db, 64);
        let engine = MCPEngine::new(
            catalog,
            object_store,
            sessions,
            Arc::new(log),
            metadata_store,
            EngineConfig::default(),
        );
        (engine, dir, db_dir)
    }

    fn req(method: &str, id: Option<i64>, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: id.map(|i| serde_json::json!(i)),
            method: method.to_string(),
            params,
        }
    }

    async fn initialize_session(engine: &MCPEngine) -> String {
        let outcome = engine
            .dispatch(
                None,
                req("initialize", Some(1), serde_json::json!({ "protocolVersion": "2025-11-25" })),
                CancellationToken::new(),
            )
            .await;
        let sid = outcome.session_id.unwrap();
        engine
            .dispatch(
                Some(sid.clone()),
                req("initialized", None, Value::Null),
                CancellationToken::new(),
            )
            .await;
        sid
    }

    #[tokio::test]
    async fn initialize_mints_a_session_and_negotiates_protocol() {
        let (engine, _dir, _db_dir) = test_engine().await;
        let outcome = engine
            .dispatch(
                None,
                req("initialize", Some(1), serde_json::json!({ "protocolVersion": "2025-11-25" })),
                CancellationToken::new(),
            )
            .await;
        assert!(outcome.session_id.is_some());
        let result = &outcome.response.unwrap().result.unwrap();
        assert_eq!(result["protocolVersion"], "2025-11-25");
        assert_eq!(result["capabilities"]["tools"], true);
    }

    #[tokio::test]
    async fn initialized_is_a_notification_with_no_response() {
        let (engine, _dir, _db_dir) = test_engine().await;
        let init = engine
            .dispatch(
                None,
                req("initialize", Some(1), serde_json::json!({ "protocolVersion": "2025-11-25" })),
                CancellationToken::new(),
            )
            .await;
        let sid = init.session_id.unwrap();
        let outcome = engine
            .dispatch(Some(sid), req("initialized", None, Value::Null), CancellationToken::new())
            .await;
        assert!(outcome.response.is_none());
    }

    #[tokio::test]
    async fn request_without_a_session_is_session_not_found() {
        let (engine, _dir, _db_dir) = test_engine().await;
        let outcome = engine
            .dispatch(None, req("tools/list", Some(1), Value::Null), CancellationToken::new())
            .await;
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.data.unwrap()["kind"], "session-not-found");
    }

    #[tokio::test]
    async fn tools_list_reflects_a_published_active_skill() {
        let (engine, _dir, _db_dir) = test_engine().await;
        engine.catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        let sid = initialize_session(&engine).await;

        let outcome = engine
            .dispatch(Some(sid), req("tools/list", Some(2), Value::Null), CancellationToken::new())
            .await;
        let result = outcome.response.unwrap().result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
    }

    #[tokio::test]
    async fn tools_call_renders_instructions_and_records_an_invocation() {
        let (engine, _dir, _db_dir) = test_engine().await;
        engine.catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        let sid = initialize_session(&engine).await;

        let outcome = engine
            .dispatch(
                Some(sid.clone()),
                req(
                    "tools/call",
                    Some(3),
                    serde_json::json!({ "name": "echo", "arguments": { "msg": "hi" } }),
                ),
                CancellationToken::new(),
            )
            .await;
        let result = outcome.response.unwrap().result.unwrap();
        assert_eq!(result["content"][0]["text"], "You said: hi\n");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let events = engine.invocation_log.query("echo", None, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, InvocationStatus::Success);

        let skill = engine.catalog.get("echo").await.unwrap();
        assert_eq!(skill.invocation_count, 1);
    }

    #[tokio::test]
    async fn tools_call_on_unknown_tool_is_tool_not_found() {
        let (engine, _dir, _db_dir) = test_engine().await;
        let sid = initialize_session(&engine).await;
        let outcome = engine
            .dispatch(
                Some(sid),
                req("tools/call", Some(4), serde_json::json!({ "name": "nope", "arguments": {} })),
                CancellationToken::new(),
            )
            .await;
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.data.unwrap()["kind"], "tool-not-found");
    }

    #[tokio::test]
    async fn tools_call_on_non_user_invocable_skill_is_permission_denied() {
        let (engine, _dir, _db_dir) = test_engine().await;
        let non_invocable = b"---\nname: hidden\ndescription: not directly callable\nuser-invocable: false\n---\n\nbody\n";
        engine.catalog.publish(files(&[("SKILL.md", non_invocable)])).await.unwrap();
        let sid = initialize_session(&engine).await;

        let outcome = engine
            .dispatch(
                Some(sid),
                req("tools/call", Some(5), serde_json::json!({ "name": "hidden", "arguments": {} })),
                CancellationToken::new(),
            )
            .await;
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.data.unwrap()["kind"], "permission-denied");
    }

    #[tokio::test]
    async fn cancelled_tool_call_produces_no_invocation_log_entry() {
        let (engine, _dir, _db_dir) = test_engine().await;
        engine.catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        let sid = initialize_session(&engine).await;

        let token = CancellationToken::new();
        token.cancel();
        let outcome = engine
            .dispatch(
                Some(sid),
                req("tools/call", Some(6), serde_json::json!({ "name": "echo", "arguments": {} })),
                token,
            )
            .await;
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.data.unwrap()["kind"], "cancelled");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let events = engine.invocation_log.query("echo", None, 10).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn resources_read_returns_reference_file_bytes() {
        let (engine, _dir, _db_dir) = test_engine().await;
        engine
            .catalog
            .publish(files(&[("SKILL.md", VALID_SKILL_MD), ("references/notes.md", b"hello notes")]))
            .await
            .unwrap();
        let sid = initialize_session(&engine).await;

        let outcome = engine
            .dispatch(
                Some(sid),
                req(
                    "resources/read",
                    Some(7),
                    serde_json::json!({ "uri": "skill://echo/references/notes.md" }),
                ),
                CancellationToken::new(),
            )
            .await;
        let result = outcome.response.unwrap().result.unwrap();
        assert_eq!(result["contents"][0]["text"], "hello notes");
    }

    #[tokio::test]
    async fn prompts_get_renders_the_skill_instructions_as_a_prompt() {
        let (engine, _dir, _db_dir) = test_engine().await;
        engine.catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        let sid = initialize_session(&engine).await;

        let outcome = engine
            .dispatch(
                Some(sid),
                req(
                    "prompts/get",
                    Some(8),
                    serde_json::json!({ "name": "echo", "arguments": { "msg": "yo" } }),
                ),
                CancellationToken::new(),
            )
            .await;
        let result = outcome.response.unwrap().result.unwrap();
        assert_eq!(result["messages"][0]["content"]["text"], "You said: yo\n");
    }
}
