//! GitHub highlight store - Persist highlights to a repository file.
//!
//! Uses the GitHub REST Contents API: a single JSON file in the user's
//! repository holds the highlight data, base64-encoded per the API.
//! Writes are read-modify-write: fetch the current blob SHA, then PUT
//! with that SHA so GitHub can reject a write against a stale version
//! (optimistic concurrency). There is no retry or merge; a conflicting
//! write surfaces as an API error for the caller to handle.

use super::http::{HttpResponse, HttpTransport, ReqwestTransport};
use crate::config::{ConfigStore, SyncConfig};
use crate::error::SyncError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = "marklight";
const COMMIT_MESSAGE: &str = "Update highlights";

/// Authorization header scheme.
///
/// GitHub accepts both the current `Bearer` scheme and the legacy
/// `token` scheme for personal access tokens. Bearer is the default;
/// the legacy scheme stays selectable for older enterprise deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>` (current API guidance)
    #[default]
    Bearer,
    /// `Authorization: token <token>` (legacy scheme)
    Token,
}

impl AuthScheme {
    fn header_value(self, token: &str) -> String {
        match self {
            Self::Bearer => format!("Bearer {token}"),
            Self::Token => format!("token {token}"),
        }
    }
}

/// GET response for a contents path.
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    /// Blob SHA, the optimistic-concurrency token for the next write
    sha: String,
    /// Base64-encoded file content (GitHub line-wraps this)
    #[serde(default)]
    content: String,
}

/// New file state after a successful PUT.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatedFile {
    /// Blob SHA of the written content
    pub sha: String,
}

/// Commit created by a successful PUT.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitRef {
    /// Commit SHA
    pub sha: String,
}

/// PUT response: the new file version and the commit that produced it.
///
/// Callers are free to discard this; it exists so hosts can show the
/// resulting commit in their UI.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateResponse {
    #[serde(default)]
    pub content: Option<UpdatedFile>,
    #[serde(default)]
    pub commit: Option<CommitRef>,
}

/// Remote store for highlight data, backed by a GitHub repository file.
///
/// Configuration is reloaded from the [`ConfigStore`] on every operation,
/// so settings changes in the host take effect immediately. Reads are
/// best-effort (`None` on any failure, the caller falls back to local
/// highlights); writes and connection tests fail loud, since a silently
/// dropped write would lose data.
pub struct GithubHighlightStore {
    config_store: Box<dyn ConfigStore>,
    transport: Box<dyn HttpTransport>,
    api_base: String,
    auth_scheme: AuthScheme,
}

impl GithubHighlightStore {
    /// Create a store using the default reqwest transport.
    pub fn new(config_store: Box<dyn ConfigStore>) -> Self {
        Self::with_transport(config_store, Box::new(ReqwestTransport::new()))
    }

    /// Create a store with a specific transport.
    pub fn with_transport(
        config_store: Box<dyn ConfigStore>,
        transport: Box<dyn HttpTransport>,
    ) -> Self {
        Self {
            config_store,
            transport,
            api_base: GITHUB_API_BASE.to_string(),
            auth_scheme: AuthScheme::default(),
        }
    }

    /// Override the API base URL (GitHub Enterprise, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Select the Authorization header scheme.
    pub fn with_auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }

    /// Load the sync configuration, or `None` when sync cannot run.
    ///
    /// `None` covers three expected states: sync disabled (silent),
    /// enabled but missing a required field (logged), and an unreadable
    /// config store (logged). None of these is a hard failure; callers
    /// no-op and keep working with local data.
    pub fn load_config(&self) -> Option<SyncConfig> {
        let config = match self.config_store.load() {
            Ok(config) => config,
            Err(err) => {
                error!("Cannot load sync configuration: {err:#}");
                return None;
            }
        };

        if !config.enabled {
            debug!("GitHub sync is disabled");
            return None;
        }

        if !config.is_complete() {
            error!("GitHub sync is enabled but token, repo owner, or repo name is missing");
            return None;
        }

        config.warn_on_suspect_token();
        Some(config)
    }

    /// Write the highlights payload to the repository file.
    ///
    /// Fetches the current blob SHA first so the PUT updates in place;
    /// when the file does not exist yet the PUT omits `sha` and GitHub
    /// creates it. Returns `Ok(None)` without any network traffic when
    /// sync is not configured.
    pub fn write(&self, payload: &Value) -> Result<Option<UpdateResponse>, SyncError> {
        let Some(config) = self.load_config() else {
            return Ok(None);
        };

        let sha = self.fetch_remote_sha(&config)?;
        let content = encode_payload(payload)?;

        let mut body = serde_json::Map::new();
        body.insert("message".to_string(), Value::from(COMMIT_MESSAGE));
        body.insert("content".to_string(), Value::from(content));
        if let Some(sha) = sha {
            // Only present for updates; a null or empty sha would make
            // GitHub reject the create path.
            body.insert("sha".to_string(), Value::from(sha));
        }

        let response = self.transport.put(
            &self.contents_url(&config),
            &self.request_headers(&config),
            Value::Object(body).to_string(),
        )?;

        if !response.is_success() {
            return Err(api_error(&response));
        }

        let update: UpdateResponse = serde_json::from_str(&response.body)
            .map_err(|err| SyncError::MalformedResponse(err.to_string()))?;

        info!(
            commit = update.commit.as_ref().map(|c| c.sha.as_str()),
            "Highlights written to GitHub"
        );
        Ok(Some(update))
    }

    /// Read the highlights payload from the repository file.
    ///
    /// Best-effort: any failure (unconfigured, network, missing file,
    /// undecodable content) is logged and reported as `None` so the
    /// caller falls back to local highlights.
    pub fn read(&self) -> Option<Value> {
        let config = self.load_config()?;

        let response = match self
            .transport
            .get(&self.contents_url(&config), &self.request_headers(&config))
        {
            Ok(response) => response,
            Err(err) => {
                warn!("Cannot fetch highlights from GitHub: {err}");
                return None;
            }
        };

        if !response.is_success() {
            debug!(
                status = response.status,
                "No remote highlights available"
            );
            return None;
        }

        let contents: ContentsResponse = match serde_json::from_str(&response.body) {
            Ok(contents) => contents,
            Err(err) => {
                error!("Malformed contents response from GitHub: {err}");
                return None;
            }
        };

        match decode_content(&contents.content) {
            Ok(payload) => {
                debug!(sha = %contents.sha, "Fetched highlights from GitHub");
                Some(payload)
            }
            Err(err) => {
                error!("Cannot decode remote highlights: {err}");
                None
            }
        }
    }

    /// Validate that the token, owner, and repo jointly resolve to an
    /// accessible repository.
    ///
    /// Hits the repository resource itself rather than the highlights
    /// file, so it passes even before the first write.
    pub fn test_connection(&self) -> Result<bool, SyncError> {
        let Some(config) = self.load_config() else {
            return Err(SyncError::NotConfigured("no token"));
        };

        let response = self
            .transport
            .get(&self.repo_url(&config), &self.request_headers(&config))?;

        if response.is_success() {
            info!("GitHub connection test successful");
            Ok(true)
        } else {
            Err(api_error(&response))
        }
    }

    /// Fetch the current blob SHA of the highlights file, if it exists.
    ///
    /// Any non-2xx status (including 404) means "no file yet" and drives
    /// the create path; only transport failures abort the write.
    fn fetch_remote_sha(&self, config: &SyncConfig) -> Result<Option<String>, SyncError> {
        let response = self
            .transport
            .get(&self.contents_url(config), &self.request_headers(config))?;

        if !response.is_success() {
            debug!(
                status = response.status,
                "No existing highlights file, a new one will be created"
            );
            return Ok(None);
        }

        let contents: ContentsResponse = serde_json::from_str(&response.body)
            .map_err(|err| SyncError::MalformedResponse(err.to_string()))?;

        debug!(sha = %contents.sha, "Existing highlights file found");
        Ok(Some(contents.sha))
    }

    fn contents_url(&self, config: &SyncConfig) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, config.repo_owner, config.repo_name, config.file_path
        )
    }

    fn repo_url(&self, config: &SyncConfig) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_base, config.repo_owner, config.repo_name
        )
    }

    fn request_headers(&self, config: &SyncConfig) -> Vec<(String, String)> {
        vec![
            (
                "Authorization".to_string(),
                self.auth_scheme.header_value(&config.token),
            ),
            ("Accept".to_string(), GITHUB_ACCEPT.to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ]
    }
}

/// Serialize the payload and base64-encode it for the Contents API.
///
/// Pretty-printed with 2-space indent so the file history stays
/// human-diffable. Encoding the UTF-8 bytes directly keeps multi-byte
/// characters intact.
fn encode_payload(payload: &Value) -> Result<String, SyncError> {
    let pretty = serde_json::to_string_pretty(payload).map_err(SyncError::Encode)?;
    Ok(BASE64.encode(pretty.as_bytes()))
}

/// Decode a base64 `content` field back into a JSON payload.
fn decode_content(content: &str) -> Result<Value, SyncError> {
    // GitHub line-wraps the base64 blob; strip whitespace before decoding.
    let compact: String = content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|err| SyncError::MalformedResponse(format!("invalid base64 content: {err}")))?;

    let text = String::from_utf8(bytes)
        .map_err(|err| SyncError::MalformedResponse(format!("content is not UTF-8: {err}")))?;

    serde_json::from_str(&text)
        .map_err(|err| SyncError::MalformedResponse(format!("content is not valid JSON: {err}")))
}

/// Build a [`SyncError::Api`] from a non-2xx response, extracting the
/// `message` field GitHub puts in error bodies.
fn api_error(response: &HttpResponse) -> SyncError {
    let message = serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|body| {
            body.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let body = response.body.trim();
            if body.is_empty() {
                "no error message".to_string()
            } else {
                body.to_string()
            }
        });

    SyncError::Api {
        status: response.status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigStore;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct RecordedRequest {
        method: &'static str,
        url: String,
        headers: Vec<(String, String)>,
        body: Option<String>,
    }

    /// Transport fake: scripted responses, recorded requests.
    #[derive(Default)]
    struct FakeTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, SyncError>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl FakeTransport {
        fn scripted(
            responses: impl IntoIterator<Item = Result<HttpResponse, SyncError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn next_response(&self) -> Result<HttpResponse, SyncError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("fake transport ran out of scripted responses")
        }
    }

    impl HttpTransport for Arc<FakeTransport> {
        fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, SyncError> {
            self.requests.lock().unwrap().push(RecordedRequest {
                method: "GET",
                url: url.to_string(),
                headers: headers.to_vec(),
                body: None,
            });
            self.next_response()
        }

        fn put(
            &self,
            url: &str,
            headers: &[(String, String)],
            body: String,
        ) -> Result<HttpResponse, SyncError> {
            self.requests.lock().unwrap().push(RecordedRequest {
                method: "PUT",
                url: url.to_string(),
                headers: headers.to_vec(),
                body: Some(body),
            });
            self.next_response()
        }
    }

    fn enabled_config() -> SyncConfig {
        SyncConfig {
            token: "ghp_abc".to_string(),
            enabled: true,
            repo_owner: "u".to_string(),
            repo_name: "r".to_string(),
            file_path: "data/highlights.json".to_string(),
        }
    }

    fn store_with(config: SyncConfig, transport: Arc<FakeTransport>) -> GithubHighlightStore {
        GithubHighlightStore::with_transport(
            Box::new(MemoryConfigStore::with_config(config)),
            Box::new(transport),
        )
    }

    fn ok(status: u16, body: &str) -> Result<HttpResponse, SyncError> {
        Ok(HttpResponse {
            status,
            body: body.to_string(),
        })
    }

    fn transport_failure() -> Result<HttpResponse, SyncError> {
        Err(SyncError::transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        )))
    }

    #[test]
    fn test_disabled_sync_makes_no_network_calls() {
        let transport = FakeTransport::scripted([]);
        let store = store_with(SyncConfig::default(), transport.clone());

        let written = store.write(&json!({"a": 1})).unwrap();
        assert!(written.is_none());
        assert!(store.read().is_none());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_incomplete_config_degrades_to_noop() {
        let config = SyncConfig {
            enabled: true,
            token: "ghp_abc".to_string(),
            ..SyncConfig::default()
        };
        let transport = FakeTransport::scripted([]);
        let store = store_with(config, transport.clone());

        assert!(store.load_config().is_none());
        assert!(store.write(&json!({"a": 1})).unwrap().is_none());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_write_creates_file_when_absent() {
        let transport = FakeTransport::scripted([
            ok(404, r#"{"message":"Not Found"}"#),
            ok(
                201,
                r#"{"content":{"sha":"new-sha"},"commit":{"sha":"commit-sha"}}"#,
            ),
        ]);
        let store = store_with(enabled_config(), transport.clone());

        let update = store.write(&json!({"a": 1})).unwrap().unwrap();
        assert_eq!(update.content.unwrap().sha, "new-sha");
        assert_eq!(update.commit.unwrap().sha, "commit-sha");

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(
            requests[0].url,
            "https://api.github.com/repos/u/r/contents/data/highlights.json"
        );
        assert_eq!(requests[1].method, "PUT");
        assert_eq!(requests[1].url, requests[0].url);

        let body: Value = serde_json::from_str(requests[1].body.as_ref().unwrap()).unwrap();
        assert_eq!(body["message"], "Update highlights");
        assert_eq!(
            body["content"],
            BASE64.encode(serde_json::to_string_pretty(&json!({"a": 1})).unwrap())
        );
        // Create path: the sha key must be absent entirely
        assert!(body.get("sha").is_none());
    }

    #[test]
    fn test_write_carries_sha_of_existing_file() {
        let transport = FakeTransport::scripted([
            ok(200, r#"{"sha":"xyz","content":"e30="}"#),
            ok(
                200,
                r#"{"content":{"sha":"next"},"commit":{"sha":"c2"}}"#,
            ),
        ]);
        let store = store_with(enabled_config(), transport.clone());

        store.write(&json!({"b": 2})).unwrap().unwrap();

        let requests = transport.requests();
        let body: Value = serde_json::from_str(requests[1].body.as_ref().unwrap()).unwrap();
        assert_eq!(body["sha"], "xyz");
    }

    #[test]
    fn test_write_surfaces_remote_rejection() {
        let transport = FakeTransport::scripted([
            ok(200, r#"{"sha":"xyz","content":"e30="}"#),
            ok(422, r#"{"message":"data/highlights.json does not match"}"#),
        ]);
        let store = store_with(enabled_config(), transport);

        let err = store.write(&json!({"b": 2})).unwrap_err();
        match err {
            SyncError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "data/highlights.json does not match");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_write_propagates_transport_failure() {
        let transport = FakeTransport::scripted([transport_failure()]);
        let store = store_with(enabled_config(), transport);

        let err = store.write(&json!({"a": 1})).unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[test]
    fn test_read_returns_remote_payload() {
        let payload = json!({"highlights": [{"id": 1, "text": "hello"}]});
        let encoded = encode_payload(&payload).unwrap();
        let body = format!(r#"{{"sha":"xyz","content":"{encoded}"}}"#);

        let transport = FakeTransport::scripted([ok(200, &body)]);
        let store = store_with(enabled_config(), transport);

        assert_eq!(store.read().unwrap(), payload);
    }

    #[test]
    fn test_read_accepts_line_wrapped_content() {
        let payload = json!({"note": "wrapped"});
        let encoded = encode_payload(&payload).unwrap();
        // GitHub inserts newlines every 60 characters of base64
        let wrapped: String = encoded
            .as_bytes()
            .chunks(8)
            .map(|chunk| std::str::from_utf8(chunk).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let body = serde_json::to_string(&json!({"sha": "xyz", "content": wrapped})).unwrap();

        let transport = FakeTransport::scripted([ok(200, &body)]);
        let store = store_with(enabled_config(), transport);

        assert_eq!(store.read().unwrap(), payload);
    }

    #[test]
    fn test_read_malformed_base64_yields_none() {
        let transport =
            FakeTransport::scripted([ok(200, r#"{"sha":"xyz","content":"%%%not-base64%%%"}"#)]);
        let store = store_with(enabled_config(), transport);

        assert!(store.read().is_none());
    }

    #[test]
    fn test_read_is_best_effort_on_failure() {
        let transport = FakeTransport::scripted([ok(404, r#"{"message":"Not Found"}"#)]);
        let store = store_with(enabled_config(), transport);
        assert!(store.read().is_none());

        let transport = FakeTransport::scripted([transport_failure()]);
        let store = store_with(enabled_config(), transport);
        assert!(store.read().is_none());
    }

    #[test]
    fn test_connection_requires_token_before_any_traffic() {
        let config = SyncConfig {
            enabled: true,
            repo_owner: "u".to_string(),
            repo_name: "r".to_string(),
            ..SyncConfig::default()
        };
        let transport = FakeTransport::scripted([]);
        let store = store_with(config, transport.clone());

        let err = store.test_connection().unwrap_err();
        assert!(matches!(err, SyncError::NotConfigured(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_connection_hits_repo_resource() {
        let transport = FakeTransport::scripted([ok(200, r#"{"id": 1}"#)]);
        let store = store_with(enabled_config(), transport.clone());

        assert!(store.test_connection().unwrap());

        let requests = transport.requests();
        assert_eq!(requests[0].url, "https://api.github.com/repos/u/r");
        assert!(requests[0]
            .headers
            .iter()
            .any(|(name, value)| name == "Authorization" && value == "Bearer ghp_abc"));
        assert!(requests[0]
            .headers
            .iter()
            .any(|(name, value)| name == "Accept" && value == GITHUB_ACCEPT));
    }

    #[test]
    fn test_connection_rejects_bad_credentials() {
        let transport = FakeTransport::scripted([ok(401, r#"{"message":"Bad credentials"}"#)]);
        let store = store_with(enabled_config(), transport);

        let err = store.test_connection().unwrap_err();
        match err {
            SyncError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Bad credentials");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_legacy_token_scheme() {
        let transport = FakeTransport::scripted([ok(200, "{}")]);
        let store =
            store_with(enabled_config(), transport.clone()).with_auth_scheme(AuthScheme::Token);

        store.test_connection().unwrap();

        let requests = transport.requests();
        assert!(requests[0]
            .headers
            .iter()
            .any(|(name, value)| name == "Authorization" && value == "token ghp_abc"));
    }

    #[test]
    fn test_payload_encoding_roundtrips_utf8() {
        let payload = json!({
            "highlights": ["café", "naïve", "日本語テキスト", "🖍️ marked"]
        });

        let encoded = encode_payload(&payload).unwrap();
        assert_eq!(decode_content(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_payload_is_pretty_printed() {
        let encoded = encode_payload(&json!({"a": 1})).unwrap();
        let bytes = BASE64.decode(encoded).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_api_error_falls_back_to_raw_body() {
        let response = HttpResponse {
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        match api_error(&response) {
            SyncError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
