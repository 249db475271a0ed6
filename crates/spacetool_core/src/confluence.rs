use std::env;
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::multipart::Form;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{Credentials, ENV_STORE_URL, ToolConfig};
use crate::markup::link_paragraph;
use crate::space_key::SpaceKey;
use crate::store::{
    ContentStore, DOWNLOAD_LINK_LABEL, NewPage, PageId, RemotePage, SearchBatch, StoreError,
};

const SEARCH_EXPAND: &str = "body.storage,ancestors";
const ERROR_SNIPPET_CHARS: usize = 200;

#[derive(Clone)]
pub struct ConfluenceClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
    pub space_description: String,
    pub credentials: Credentials,
}

impl ConfluenceClientConfig {
    /// Environment values win over the config file, which wins over defaults.
    pub fn from_config(config: &ToolConfig, credentials: Credentials) -> Result<Self> {
        Self::from_config_with_lookup(config, credentials, |key| env::var(key).ok())
    }

    fn from_config_with_lookup<F>(
        config: &ToolConfig,
        credentials: Credentials,
        lookup_env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(base_url) = config.base_url_with_lookup(&lookup_env) else {
            bail!("content store URL is not configured (set {ENV_STORE_URL} or [store].base_url)");
        };
        Url::parse(&base_url).with_context(|| format!("invalid content store URL: {base_url}"))?;

        let store = &config.store;
        let number_u64 = |key: &str, configured: Option<u64>, default: u64| {
            lookup_env(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .or(configured)
                .unwrap_or(default)
        };
        let number_usize = |key: &str, configured: Option<usize>, default: usize| {
            lookup_env(key)
                .and_then(|value| value.trim().parse::<usize>().ok())
                .or(configured)
                .unwrap_or(default)
        };

        Ok(Self {
            base_url,
            user_agent: config.user_agent_with_lookup(&lookup_env),
            timeout_ms: number_u64("STORE_HTTP_TIMEOUT_MS", store.timeout_ms, 30_000),
            rate_limit_read_ms: number_u64("STORE_RATE_LIMIT_READ", store.rate_limit_read_ms, 200),
            rate_limit_write_ms: number_u64(
                "STORE_RATE_LIMIT_WRITE",
                store.rate_limit_write_ms,
                500,
            ),
            max_retries: number_usize("STORE_HTTP_RETRIES", store.max_retries, 2),
            max_write_retries: number_usize(
                "STORE_HTTP_WRITE_RETRIES",
                store.max_write_retries,
                1,
            ),
            retry_delay_ms: number_u64("STORE_HTTP_RETRY_DELAY_MS", store.retry_delay_ms, 500),
            space_description: config.space_description().to_string(),
            credentials,
        })
    }
}

/// Blocking client for a Confluence-style REST API (`.../wiki/rest/api`).
pub struct ConfluenceClient {
    client: Client,
    config: ConfluenceClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl ConfluenceClient {
    pub fn new(config: ConfluenceClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build content store HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{path}", self.config.base_url);
        Url::parse(&raw).with_context(|| format!("invalid content store URL: {raw}"))
    }

    /// Send a request built fresh for every attempt. Retryable statuses and
    /// transport errors are retried; 401/403 become [`StoreError`]. Any other
    /// response is handed back, successful or not.
    ///
    /// Writes are not idempotent, so they are only retried when the server
    /// cannot have acted on them: a failed connect, 429 or 503.
    fn execute<F>(&mut self, label: &str, is_write: bool, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> Result<RequestBuilder>,
    {
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            let request = build(&self.client)?
                .basic_auth(
                    &self.config.credentials.username,
                    Some(&self.config.credentials.api_token),
                )
                .header(USER_AGENT, self.config.user_agent.clone())
                .header(ACCEPT, "application/json");

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::UNAUTHORIZED {
                        return Err(StoreError::Unauthorized.into());
                    }
                    if status == StatusCode::FORBIDDEN {
                        return Err(StoreError::Forbidden(label.to_string()).into());
                    }
                    if attempt < max_retries && is_retryable_status(status, is_write) {
                        debug!(label, %status, attempt, "retrying content store request");
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    return Ok(response);
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error, is_write) {
                        debug!(label, %error, attempt, "retrying content store request");
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    return Err(error).with_context(|| format!("failed to call content store: {label}"));
                }
            }
        }

        bail!("content store request exhausted retry budget: {label}")
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }

    fn get_json<T: DeserializeOwned>(
        &mut self,
        label: &str,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let response = self.execute(label, false, |client| {
            Ok(client.get(url.clone()).query(query))
        })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode_response(label, response).map(Some)
    }

    fn post_json<T: DeserializeOwned>(&mut self, label: &str, url: Url, body: &Value) -> Result<T> {
        let response = self.execute(label, true, |client| {
            Ok(client.post(url.clone()).json(body))
        })?;
        decode_response(label, response)
    }

    fn search_cql(
        &mut self,
        cql: &str,
        start: usize,
        limit: usize,
        expand: &str,
    ) -> Result<ContentSearchResponse> {
        let url = self.endpoint("/content/search")?;
        let mut query = vec![
            ("cql", cql.to_string()),
            ("start", start.to_string()),
            ("limit", limit.to_string()),
        ];
        if !expand.is_empty() {
            query.push(("expand", expand.to_string()));
        }
        Ok(self
            .get_json::<ContentSearchResponse>("content search", url, &query)?
            .unwrap_or_default())
    }
}

impl ContentStore for ConfluenceClient {
    fn space_exists(&mut self, key: &SpaceKey) -> Result<bool> {
        let url = self.endpoint(&format!("/space/{key}"))?;
        let found: Option<Value> = self.get_json("space lookup", url, &[])?;
        Ok(found.is_some())
    }

    fn create_space(&mut self, key: &SpaceKey, display_name: &str) -> Result<()> {
        let url = self.endpoint("/space")?;
        let body = space_payload(key, display_name, &self.config.space_description);
        let _: Value = self.post_json("space creation", url, &body)?;
        Ok(())
    }

    fn search_pages(
        &mut self,
        space: &SpaceKey,
        page_size: usize,
        cursor: usize,
    ) -> Result<SearchBatch> {
        let cql = format!(
            "space = \"{}\" and type = page order by created",
            escape_cql(space.as_str())
        );
        let response = self.search_cql(&cql, cursor, page_size, SEARCH_EXPAND)?;
        Ok(search_batch(response, page_size))
    }

    fn create_page(&mut self, space: &SpaceKey, page: &NewPage) -> Result<PageId> {
        let url = self.endpoint("/content")?;
        let body = page_payload(space, page);
        let created: IdPayload = self.post_json("page creation", url, &body)?;
        Ok(created.id)
    }

    fn homepage_id(&mut self, space: &SpaceKey) -> Result<Option<PageId>> {
        let url = self.endpoint(&format!("/space/{space}"))?;
        let found: Option<SpaceResponse> =
            self.get_json("homepage lookup", url, &[("expand", "homepage".to_string())])?;
        Ok(found.and_then(|space| space.homepage).map(|homepage| homepage.id))
    }

    fn find_page_by_title(&mut self, space: &SpaceKey, title: &str) -> Result<Option<PageId>> {
        for operator in ["=", "~"] {
            let cql = title_cql(space, title, operator);
            let response = self.search_cql(&cql, 0, 1, "")?;
            if let Some(item) = response.results.into_iter().next() {
                return Ok(Some(item.id));
            }
        }
        Ok(None)
    }

    fn upload_attachment(&mut self, page_id: &str, file_path: &Path) -> Result<String> {
        let url = self.endpoint(&format!("/content/{page_id}/child/attachment"))?;
        let response = self.execute("attachment upload", true, |client| {
            let form = Form::new()
                .file("file", file_path)
                .with_context(|| format!("failed to read {}", file_path.display()))?;
            Ok(client
                .post(url.clone())
                .header("X-Atlassian-Token", "no-check")
                .multipart(form))
        })?;
        let uploaded: AttachmentResponse = decode_response("attachment upload", response)?;
        download_link(&uploaded).with_context(|| {
            format!(
                "attachment upload for {} returned no download link",
                file_path.display()
            )
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn decode_response<T: DeserializeOwned>(label: &str, response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        let snippet: String = body.chars().take(ERROR_SNIPPET_CHARS).collect();
        bail!("content store {label} failed with HTTP {status}: {snippet}");
    }
    response
        .json()
        .with_context(|| format!("failed to decode content store {label} response"))
}

fn is_retryable_status(status: StatusCode, is_write: bool) -> bool {
    if is_write {
        return matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        );
    }
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error, is_write: bool) -> bool {
    if is_write {
        return error.is_connect();
    }
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Escape a value for use inside a double-quoted CQL string.
fn escape_cql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn title_cql(space: &SpaceKey, title: &str, operator: &str) -> String {
    format!(
        "space = \"{}\" and type = page and title {operator} \"{}\"",
        escape_cql(space.as_str()),
        escape_cql(title)
    )
}

fn space_payload(key: &SpaceKey, display_name: &str, description: &str) -> Value {
    json!({
        "key": key.as_str(),
        "name": display_name,
        "description": {
            "plain": {
                "value": description,
                "representation": "plain"
            }
        }
    })
}

fn page_payload(space: &SpaceKey, page: &NewPage) -> Value {
    let mut payload = json!({
        "type": "page",
        "title": page.title,
        "space": { "key": space.as_str() },
        "body": {
            "storage": {
                "value": page.body,
                "representation": "storage"
            }
        }
    });
    if let Some(parent_id) = &page.parent_id {
        payload["ancestors"] = json!([{ "id": parent_id }]);
    }
    payload
}

fn search_batch(response: ContentSearchResponse, page_size: usize) -> SearchBatch {
    let is_last = response.results.len() < page_size;
    let pages = response
        .results
        .into_iter()
        .map(|item| RemotePage {
            id: item.id,
            title: item.title,
            body: item
                .body
                .and_then(|body| body.storage)
                .map(|storage| storage.value)
                .unwrap_or_default(),
            ancestors: item.ancestors.into_iter().map(|ancestor| ancestor.id).collect(),
        })
        .collect();
    SearchBatch { pages, is_last }
}

fn download_link(response: &AttachmentResponse) -> Option<String> {
    let first = response.results.first()?;
    let download = first.links.download.as_deref()?;
    let href = match response.links.base.as_deref() {
        Some(base) if !download.starts_with("http") => {
            format!("{}{download}", base.trim_end_matches('/'))
        }
        _ => download.to_string(),
    };
    Some(link_paragraph(&href, DOWNLOAD_LINK_LABEL))
}

#[derive(Debug, Deserialize, Default)]
struct ContentSearchResponse {
    #[serde(default)]
    results: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<BodyPayload>,
    #[serde(default)]
    ancestors: Vec<IdPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct BodyPayload {
    #[serde(default)]
    storage: Option<StoragePayload>,
}

#[derive(Debug, Deserialize, Default)]
struct StoragePayload {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct IdPayload {
    id: String,
}

#[derive(Debug, Deserialize, Default)]
struct SpaceResponse {
    #[serde(default)]
    homepage: Option<IdPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct AttachmentResponse {
    #[serde(default)]
    results: Vec<AttachmentItem>,
    #[serde(default, rename = "_links")]
    links: LinksPayload,
}

#[derive(Debug, Deserialize, Default)]
struct AttachmentItem {
    #[serde(default, rename = "_links")]
    links: LinksPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LinksPayload {
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    download: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use reqwest::StatusCode;
    use serde_json::json;

    use super::{
        AttachmentResponse, ConfluenceClient, ConfluenceClientConfig, ContentSearchResponse,
        download_link, escape_cql, is_retryable_status, page_payload, search_batch, space_payload,
        title_cql,
    };
    use crate::config::{Credentials, DEFAULT_USER_AGENT, ToolConfig};
    use crate::space_key::SpaceKey;
    use crate::store::{ContentStore, NewPage};

    fn credentials() -> Credentials {
        Credentials {
            username: "bot@example.com".to_string(),
            api_token: "secret".to_string(),
        }
    }

    #[test]
    fn config_prefers_env_over_file_over_defaults() {
        let mut config = ToolConfig::default();
        config.store.base_url = Some("https://file.example/wiki/rest/api/".to_string());
        config.store.max_retries = Some(5);
        config.store.timeout_ms = Some(10_000);
        let env = HashMap::from([
            ("STORE_HTTP_TIMEOUT_MS", "2500"),
            ("STORE_RATE_LIMIT_WRITE", "not-a-number"),
        ]);

        let resolved = ConfluenceClientConfig::from_config_with_lookup(
            &config,
            credentials(),
            |key| env.get(key).map(|value| (*value).to_string()),
        )
        .expect("resolve");

        assert_eq!(resolved.base_url, "https://file.example/wiki/rest/api");
        assert_eq!(resolved.timeout_ms, 2500);
        assert_eq!(resolved.max_retries, 5);
        assert_eq!(resolved.rate_limit_write_ms, 500);
        assert_eq!(resolved.max_write_retries, 1);
        assert_eq!(resolved.user_agent, crate::config::DEFAULT_USER_AGENT);
    }

    #[test]
    fn config_requires_a_valid_base_url() {
        let config = ToolConfig::default();
        let missing =
            ConfluenceClientConfig::from_config_with_lookup(&config, credentials(), |_| None);
        assert!(missing.is_err());

        let invalid = ConfluenceClientConfig::from_config_with_lookup(
            &config,
            credentials(),
            |key| (key == "STORE_URL").then(|| "not a url".to_string()),
        );
        assert!(invalid.is_err());
    }

    #[test]
    fn cql_values_are_quoted_and_escaped() {
        assert_eq!(escape_cql(r#"Say "hi" \o/"#), r#"Say \"hi\" \\o/"#);
        assert_eq!(
            title_cql(&SpaceKey::new("DOCS3KV"), "Documentation", "="),
            r#"space = "DOCS3KV" and type = page and title = "Documentation""#
        );
        assert_eq!(
            title_cql(&SpaceKey::new("DOCS3KV"), "Doc \"A\"", "~"),
            r#"space = "DOCS3KV" and type = page and title ~ "Doc \"A\"""#
        );
    }

    #[test]
    fn page_payload_sets_parent_only_when_present() {
        let space = SpaceKey::new("DOCSABRAXA");
        let root = page_payload(
            &space,
            &NewPage {
                title: "Root".to_string(),
                body: "<p>x</p>".to_string(),
                parent_id: None,
            },
        );
        assert_eq!(root["space"]["key"], "DOCSABRAXA");
        assert_eq!(root["body"]["storage"]["representation"], "storage");
        assert!(root.get("ancestors").is_none());

        let child = page_payload(
            &space,
            &NewPage {
                title: "Child".to_string(),
                body: "<p>y</p>".to_string(),
                parent_id: Some("42".to_string()),
            },
        );
        assert_eq!(child["ancestors"], json!([{ "id": "42" }]));
    }

    #[test]
    fn space_payload_carries_plain_description() {
        let payload = space_payload(&SpaceKey::new("DOCS3KV"), "3KV", "Generated");
        assert_eq!(payload["key"], "DOCS3KV");
        assert_eq!(payload["name"], "3KV");
        assert_eq!(payload["description"]["plain"]["value"], "Generated");
    }

    #[test]
    fn search_results_become_pages_with_ancestor_chain() {
        let response: ContentSearchResponse = serde_json::from_value(json!({
            "results": [
                {
                    "id": "200",
                    "title": "Child",
                    "body": { "storage": { "value": "<p>c</p>" } },
                    "ancestors": [{ "id": "1" }, { "id": "100" }]
                },
                { "id": "100", "title": "Root" }
            ],
            "size": 2
        }))
        .expect("decode");

        let batch = search_batch(response, 50);
        assert!(batch.is_last);
        assert_eq!(batch.pages.len(), 2);
        assert_eq!(batch.pages[0].body, "<p>c</p>");
        assert_eq!(batch.pages[0].parent_id(), Some("100"));
        assert_eq!(batch.pages[1].body, "");
        assert_eq!(batch.pages[1].depth(), 0);
    }

    #[test]
    fn full_search_batch_is_not_last() {
        let response: ContentSearchResponse = serde_json::from_value(json!({
            "results": [{ "id": "1", "title": "A" }, { "id": "2", "title": "B" }]
        }))
        .expect("decode");
        assert!(!search_batch(response, 2).is_last);
    }

    #[test]
    fn download_link_uses_base_when_relative() {
        let response: AttachmentResponse = serde_json::from_value(json!({
            "results": [{ "_links": { "download": "/download/attachments/7/a.pdf?api=v2" } }],
            "_links": { "base": "https://example.atlassian.net/wiki" }
        }))
        .expect("decode");
        assert_eq!(
            download_link(&response).as_deref(),
            Some(
                "<p><a href=\"https://example.atlassian.net/wiki/download/attachments/7/a.pdf?api=v2\">Download original file</a></p>"
            )
        );

        let empty: AttachmentResponse =
            serde_json::from_value(json!({ "results": [] })).expect("decode");
        assert!(download_link(&empty).is_none());
    }

    #[test]
    fn retryable_statuses_match_transient_failures() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS, false));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE, false));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY, false));
        assert!(is_retryable_status(StatusCode::GATEWAY_TIMEOUT, false));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND, false));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED, false));
    }

    #[test]
    fn writes_only_retry_statuses_the_server_did_not_act_on() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS, true));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE, true));
        assert!(!is_retryable_status(StatusCode::BAD_GATEWAY, true));
        assert!(!is_retryable_status(StatusCode::GATEWAY_TIMEOUT, true));
        assert!(!is_retryable_status(StatusCode::REQUEST_TIMEOUT, true));
    }

    /// Serves one canned response per connection and counts POST requests.
    fn spawn_stub(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
        let port = listener.local_addr().expect("stub addr").port();
        let posts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&posts);
        thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let request = read_request(&mut stream);
                if request.starts_with("POST ") {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });
        (format!("http://127.0.0.1:{port}/wiki/rest/api"), posts)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let read = stream.read(&mut chunk).expect("read request");
            if read == 0 {
                return String::from_utf8_lossy(&data).into_owned();
            }
            data.extend_from_slice(&chunk[..read]);
            if let Some(position) = data.windows(4).position(|window| window == b"\r\n\r\n") {
                break position + 4;
            }
        };
        let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while data.len() < header_end + content_length {
            let read = stream.read(&mut chunk).expect("read body");
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
        }
        head
    }

    fn status_response(status: &str) -> String {
        format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
    }

    fn json_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn stub_client(base_url: String) -> ConfluenceClient {
        ConfluenceClient::new(ConfluenceClientConfig {
            base_url,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: 5_000,
            rate_limit_read_ms: 0,
            rate_limit_write_ms: 0,
            max_retries: 2,
            max_write_retries: 1,
            retry_delay_ms: 0,
            space_description: String::new(),
            credentials: credentials(),
        })
        .expect("client")
    }

    fn new_page() -> NewPage {
        NewPage {
            title: "Root".to_string(),
            body: "<p>x</p>".to_string(),
            parent_id: None,
        }
    }

    #[test]
    fn page_creation_is_not_reposted_after_bad_gateway() {
        let (base_url, posts) = spawn_stub(vec![
            status_response("502 Bad Gateway"),
            json_response(r#"{"id":"9"}"#),
        ]);
        let mut client = stub_client(base_url);

        let result = client.create_page(&SpaceKey::new("DOCS3KV"), &new_page());

        assert!(result.is_err());
        assert_eq!(posts.load(Ordering::SeqCst), 1);
        assert_eq!(client.request_count(), 1);
    }

    #[test]
    fn page_creation_is_retried_after_service_unavailable() {
        let (base_url, posts) = spawn_stub(vec![
            status_response("503 Service Unavailable"),
            json_response(r#"{"id":"9"}"#),
        ]);
        let mut client = stub_client(base_url);

        let created = client
            .create_page(&SpaceKey::new("DOCS3KV"), &new_page())
            .expect("create after retry");

        assert_eq!(created, "9");
        assert_eq!(posts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn space_creation_is_not_reposted_after_gateway_timeout() {
        let (base_url, posts) = spawn_stub(vec![
            status_response("504 Gateway Timeout"),
            json_response("{}"),
        ]);
        let mut client = stub_client(base_url);

        let result = client.create_space(&SpaceKey::new("DOCS3KV"), "3KV");

        assert!(result.is_err());
        assert_eq!(posts.load(Ordering::SeqCst), 1);
    }
}
