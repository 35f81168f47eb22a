// src/store/rest.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use url::Url;

use super::{validate_table_name, BackingStore, Filter, Row, StoreError};
use crate::config::StoreSettings;

/// PostgREST error codes that mean "no such relation".
const MISSING_TABLE_CODES: &[&str] = &["42P01", "PGRST205"];
/// PostgREST code for "no such function", i.e. the delete RPC is not installed.
const MISSING_FUNCTION_CODE: &str = "PGRST202";

/// Backing store speaking the hosted platform's PostgREST-style HTTP API.
pub struct RestStore {
    client: Client,
    rest_base: Url,
    api_key: String,
    delete_rpc: String,
    order_column: String,
    max_retries: u32,
    backoff_ms: u64,
}

impl RestStore {
    pub fn new(settings: &StoreSettings) -> Result<Self> {
        let base = Url::parse(&settings.url)
            .with_context(|| format!("parsing store URL {}", settings.url))?;
        let rest_base = base
            .join("rest/v1/")
            .with_context(|| format!("building REST base from {}", base))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            rest_base,
            api_key: settings.api_key.clone(),
            delete_rpc: settings.delete_rpc.clone(),
            order_column: settings.order_column.clone(),
            max_retries: settings.max_retries,
            backoff_ms: settings.backoff_ms,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        validate_table_name(table)?;
        self.rest_base
            .join(table)
            .map_err(|e| StoreError::InvalidTable(format!("{}: {}", table, e)))
    }

    fn rpc_url(&self) -> Result<Url, StoreError> {
        self.rest_base
            .join(&format!("rpc/{}", self.delete_rpc))
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Pages are only stable under an explicit order, so every read sorts on
    /// `order_column`.
    fn select_url(&self, table: &str, offset: usize, limit: usize) -> Result<Url, StoreError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", &format!("{}.asc", self.order_column))
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    async fn select_once(
        &self,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let url = self.select_url(table, offset, limit)?;

        debug!(%url, "range select");
        let resp = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(transport)?;
        let resp = check_status(table, resp).await?;
        resp.json::<Vec<Row>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BackingStore for RestStore {
    async fn range_select(
        &self,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let mut attempts = 0;
        loop {
            match self.select_once(table, offset, limit).await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_transient() && attempts < self.max_retries => {
                    attempts += 1;
                    let backoff = self.backoff_ms * 2u64.pow(attempts - 1);
                    warn!(table, offset, attempt = attempts, delay_ms = backoff, error = %e, "Retrying");
                    sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!(table, offset, error = %e, "Exhausted retries");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn update(&self, table: &str, filter: &Filter, patch: &Row) -> Result<(), StoreError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair(&filter.column, &format!("eq.{}", filter_literal(&filter.value)));

        let resp = self
            .authed(self.client.patch(url))
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await
            .map_err(transport)?;
        check_status(table, resp).await.map(|_| ())
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        validate_table_name(table)?;
        let resp = self
            .authed(self.client.post(self.rpc_url()?))
            .json(&json!({ "table_name": table }))
            .send()
            .await
            .map_err(transport)?;
        check_status(table, resp).await.map(|_| ())
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

fn filter_literal(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn check_status(table: &str, resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_failure(table, status, &body))
}

/// Map a failed PostgREST response onto the store error taxonomy.
pub(crate) fn classify_failure(table: &str, status: StatusCode, body: &str) -> StoreError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_str);
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string());

    match code {
        Some(c) if MISSING_TABLE_CODES.contains(&c) => StoreError::TableNotFound(table.to_string()),
        Some(c) if c == MISSING_FUNCTION_CODE => StoreError::Rejected {
            status: status.as_u16(),
            message,
        },
        _ if status == StatusCode::NOT_FOUND => StoreError::TableNotFound(table.to_string()),
        _ => StoreError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn settings() -> StoreSettings {
        StoreSettings {
            url: "https://project.example.co".into(),
            api_key: "anon".into(),
            ..StoreSettings::default()
        }
    }

    #[test]
    fn test_table_url() {
        let store = RestStore::new(&settings()).unwrap();
        let url = store.table_url("december_2025").unwrap();
        assert_eq!(url.as_str(), "https://project.example.co/rest/v1/december_2025");
        assert!(store.table_url("../auth").is_err());
    }

    #[test]
    fn test_select_url_is_ordered() {
        let store = RestStore::new(&settings()).unwrap();
        assert_eq!(
            store.select_url("december_2025", 2000, 1000).unwrap().as_str(),
            "https://project.example.co/rest/v1/december_2025?select=*&order=id.asc&offset=2000&limit=1000"
        );
    }

    #[test]
    fn test_rpc_url() {
        let store = RestStore::new(&settings()).unwrap();
        assert_eq!(
            store.rpc_url().unwrap().as_str(),
            "https://project.example.co/rest/v1/rpc/drop_month_table"
        );
    }

    #[test]
    fn test_classify_missing_table() {
        let body = r#"{"code":"42P01","message":"relation \"public.may_2020\" does not exist"}"#;
        assert_eq!(
            classify_failure("may_2020", StatusCode::NOT_FOUND, body),
            StoreError::TableNotFound("may_2020".into())
        );
        let body = r#"{"code":"PGRST205","message":"Could not find the table"}"#;
        assert_eq!(
            classify_failure("may_2020", StatusCode::NOT_FOUND, body),
            StoreError::TableNotFound("may_2020".into())
        );
    }

    #[test]
    fn test_classify_missing_rpc_is_not_missing_table() {
        let body = r#"{"code":"PGRST202","message":"Could not find the function"}"#;
        assert_eq!(
            classify_failure("may_2020", StatusCode::NOT_FOUND, body),
            StoreError::Rejected {
                status: 404,
                message: "Could not find the function".into()
            }
        );
    }

    #[test]
    fn test_classify_plain_text_body() {
        let err = classify_failure("may_2020", StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(
            err,
            StoreError::Rejected {
                status: 502,
                message: "upstream down".into()
            }
        );
        assert!(err.is_transient());
    }

    /// Local HTTP/1.1 responder. Each connection gets the next queued
    /// `(status, body)`; request lines are recorded in arrival order.
    async fn stub(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            let mut queue = responses.into_iter();
            while let Ok((mut sock, _)) = listener.accept().await {
                let head = read_head(&mut sock).await;
                let line = head.lines().next().unwrap_or_default().to_string();
                log.lock().unwrap().push(line);
                let (status, body) = queue.next().unwrap_or((500, ""));
                let resp = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        (format!("http://{}", addr), seen)
    }

    /// Read one request, body included, and return its head.
    async fn read_head(sock: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = sock.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return String::from_utf8_lossy(&buf).to_string();
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let body_len = head
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < end + 4 + body_len {
                    let n = sock.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                return head;
            }
        }
    }

    fn stub_settings(url: String, max_retries: u32) -> StoreSettings {
        StoreSettings {
            url,
            api_key: "anon".into(),
            max_retries,
            backoff_ms: 1,
            timeout_secs: 5,
            ..StoreSettings::default()
        }
    }

    #[tokio::test]
    async fn test_transient_read_is_retried() {
        let (url, seen) = stub(vec![(503, ""), (503, ""), (200, r#"[{"id":1}]"#)]).await;
        let store = RestStore::new(&stub_settings(url, 3)).unwrap();

        let rows = store.range_select("may_2025", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        for line in &seen {
            assert!(
                line.starts_with("GET /rest/v1/may_2025?select=*&order=id.asc&offset=0&limit=10 "),
                "{}",
                line
            );
        }
    }

    #[tokio::test]
    async fn test_read_retries_stop_at_max() {
        let (url, seen) = stub(vec![(503, ""); 5]).await;
        let store = RestStore::new(&stub_settings(url, 2)).unwrap();

        let err = store.range_select("may_2025", 0, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 503, .. }));
        // first try plus two retries
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_read_is_not_retried() {
        let (url, seen) = stub(vec![(403, r#"{"message":"permission denied"}"#), (200, "[]")]).await;
        let store = RestStore::new(&stub_settings(url, 3)).unwrap();

        let err = store.range_select("may_2025", 0, 10).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Rejected {
                status: 403,
                message: "permission denied".into()
            }
        );
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_sent_once() {
        let (url, seen) = stub(vec![(503, ""), (200, "")]).await;
        let store = RestStore::new(&stub_settings(url, 3)).unwrap();

        let err = store.delete_table("may_2025").await.unwrap_err();
        assert!(err.is_transient());
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("POST /rest/v1/rpc/drop_month_table "), "{}", seen[0]);
    }

    #[tokio::test]
    async fn test_update_is_sent_once() {
        let (url, seen) = stub(vec![(503, ""), (204, "")]).await;
        let store = RestStore::new(&stub_settings(url, 3)).unwrap();

        let patch: Row = serde_json::from_str(r#"{"attendance_2025_05_04":"Present"}"#).unwrap();
        let res = store
            .update("may_2025", &Filter::eq("id", 7), &patch)
            .await;
        assert!(res.is_err());
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("PATCH /rest/v1/may_2025?id=eq.7 "), "{}", seen[0]);
    }

    #[tokio::test]
    async fn test_delete_of_missing_table() {
        let (url, _) = stub(vec![(404, r#"{"code":"42P01","message":"no relation"}"#)]).await;
        let store = RestStore::new(&stub_settings(url, 3)).unwrap();
        assert_eq!(
            store.delete_table("may_2025").await,
            Err(StoreError::TableNotFound("may_2025".into()))
        );
    }

    #[test]
    fn test_filter_literal() {
        assert_eq!(filter_literal(&Value::from(12)), "12");
        assert_eq!(filter_literal(&Value::from("abc")), "abc");
    }
}
