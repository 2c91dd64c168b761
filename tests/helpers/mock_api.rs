//! In-process mock of the OpenJornada admin API
//!
//! Serves the backup and settings endpoints from an in-memory store, records
//! every request it receives, and can be told to fail or stall on specific
//! routes so error paths are testable without a real backend.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const MOCK_TOKEN: &str = "mock-admin-token";
pub const MOCK_EMAIL: &str = "admin@example.com";
pub const MOCK_PASSWORD: &str = "correct-horse";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

struct MockState {
    base_url: String,
    backups: Vec<Value>,
    settings: Value,
    schedule: Value,
    connection_ok: bool,
    /// GETs of an in-progress backup before it flips to completed
    polls_until_complete: usize,
    failures: HashMap<(Method, String), (StatusCode, Option<String>)>,
    delays: HashMap<(Method, String), Duration>,
    requests: Vec<RecordedRequest>,
}

#[derive(Clone)]
pub struct MockApi {
    pub base_url: String,
    state: Arc<Mutex<MockState>>,
}

impl MockApi {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let state = Arc::new(Mutex::new(MockState {
            base_url: base_url.clone(),
            backups: Vec::new(),
            settings: json!({
                "id": "settings-1",
                "contact_email": "support@example.com",
                "backup_config": null
            }),
            schedule: json!({"scheduled": false, "next_run": null}),
            connection_ok: true,
            polls_until_complete: 0,
            failures: HashMap::new(),
            delays: HashMap::new(),
            requests: Vec::new(),
        }));

        let app = Router::new().fallback(dispatch).with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    pub async fn set_backups(&self, backups: Vec<Value>) {
        self.state.lock().await.backups = backups;
    }

    pub async fn backups(&self) -> Vec<Value> {
        self.state.lock().await.backups.clone()
    }

    pub async fn set_backup_config(&self, config: Value) {
        self.state.lock().await.settings["backup_config"] = config;
    }

    pub async fn set_schedule(&self, scheduled: bool, next_run: Option<&str>) {
        self.state.lock().await.schedule = json!({"scheduled": scheduled, "next_run": next_run});
    }

    pub async fn set_connection_ok(&self, ok: bool) {
        self.state.lock().await.connection_ok = ok;
    }

    pub async fn complete_after_polls(&self, polls: usize) {
        self.state.lock().await.polls_until_complete = polls;
    }

    /// Answer `method path` with `status` and an optional `{detail}` body.
    pub async fn fail(&self, method: Method, path: &str, status: StatusCode, detail: Option<&str>) {
        self.state.lock().await.failures.insert(
            (method, path.to_string()),
            (status, detail.map(str::to_string)),
        );
    }

    pub async fn delay(&self, method: Method, path: &str, delay: Duration) {
        self.state
            .lock()
            .await
            .delays
            .insert((method, path.to_string()), delay);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().await.requests.clone()
    }

    pub async fn requests_to(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

/// A backup record shaped like the server's
pub fn backup_json(id: &str, status: &str, storage: &str) -> Value {
    let completed = status == "completed";
    json!({
        "id": id,
        "filename": format!("backup_{id}.gz"),
        "storage_path": format!("/app/backups/backup_{id}.gz"),
        "storage_type": storage,
        "size_bytes": if completed { json!(2048) } else { Value::Null },
        "size_human": if completed { "2.0 KB" } else { "0 B" },
        "created_at": "2024-05-01T02:00:00",
        "completed_at": if completed { json!("2024-05-01T02:00:07") } else { Value::Null },
        "duration_seconds": if completed { json!(7.1) } else { Value::Null },
        "status": status,
        "trigger": "scheduled",
        "error_message": if status == "failed" { json!("mongodump exited with 1") } else { Value::Null },
        "collections_count": 6,
        "documents_count": 1200,
        "checksum_sha256": null
    })
}

pub fn backup_content(id: &str) -> String {
    format!("gzip-bytes-for-{id}")
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn dispatch(
    State(state): State<Arc<Mutex<MockState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let key = (method.clone(), path.clone());
    let delay = {
        let mut state = state.lock().await;
        state.requests.push(RecordedRequest {
            method: method.clone(),
            path: path.clone(),
            authorization: authorization.clone(),
            body: body.clone(),
        });
        state.delays.get(&key).copied()
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let public = path == "/api/token" || path.starts_with("/presigned/");
    if !public && authorization.as_deref() != Some(&format!("Bearer {MOCK_TOKEN}")) {
        return detail(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    }

    let mut state = state.lock().await;
    if let Some((status, message)) = state.failures.get(&key).cloned() {
        return match message {
            Some(message) => detail(status, &message),
            None => status.into_response(),
        };
    }

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("POST", ["api", "token"]) => {
            let form: HashMap<String, String> = url::form_urlencoded::parse(&body)
                .into_owned()
                .collect();
            if form.get("username").map(String::as_str) == Some(MOCK_EMAIL)
                && form.get("password").map(String::as_str) == Some(MOCK_PASSWORD)
            {
                Json(json!({"access_token": MOCK_TOKEN, "token_type": "bearer"})).into_response()
            } else {
                detail(StatusCode::UNAUTHORIZED, "Incorrect email or password")
            }
        }
        ("GET", ["api", "users", "me"]) => Json(json!({
            "id": "u1",
            "username": "admin",
            "email": MOCK_EMAIL,
            "role": "admin",
            "is_active": true,
            "created_at": "2024-01-01T00:00:00"
        }))
        .into_response(),
        ("GET", ["api", "backups", ""]) => {
            let total_size_bytes: u64 = state
                .backups
                .iter()
                .filter_map(|b| b["size_bytes"].as_u64())
                .sum();
            Json(json!({
                "backups": state.backups,
                "total_count": state.backups.len(),
                "total_size_bytes": total_size_bytes,
                "total_size_human": format!("{total_size_bytes} B")
            }))
            .into_response()
        }
        ("POST", ["api", "backups", "trigger"]) => {
            let mut backup = backup_json(&Uuid::new_v4().to_string(), "in_progress", "local");
            backup["trigger"] = json!("manual");
            state.backups.insert(0, backup.clone());
            Json(backup).into_response()
        }
        ("GET", ["api", "backups", "schedule", "status"]) => {
            Json(state.schedule.clone()).into_response()
        }
        ("POST", ["api", "backups", "test-connection"]) => {
            let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let storage = request["storage_type"].as_str().unwrap_or("unknown").to_string();
            if state.connection_ok {
                Json(json!({"success": true, "message": format!("Connection to {storage} OK")}))
                    .into_response()
            } else {
                Json(json!({"success": false, "message": format!("Cannot reach {storage} storage")}))
                    .into_response()
            }
        }
        ("GET", ["api", "backups", id]) => {
            let remaining = state.polls_until_complete;
            let Some(backup) = state.backups.iter_mut().find(|b| b["id"] == *id) else {
                return detail(StatusCode::NOT_FOUND, "Backup not found");
            };
            if backup["status"] == "in_progress" {
                if remaining == 0 {
                    backup["status"] = json!("completed");
                    backup["completed_at"] = json!("2024-05-01T02:01:00Z");
                    backup["size_bytes"] = json!(2048);
                } else {
                    let backup = backup.clone();
                    state.polls_until_complete = remaining - 1;
                    return Json(backup).into_response();
                }
            }
            Json(backup.clone()).into_response()
        }
        ("DELETE", ["api", "backups", id]) => {
            let before = state.backups.len();
            state.backups.retain(|b| b["id"] != *id);
            if state.backups.len() == before {
                return detail(StatusCode::NOT_FOUND, "Backup not found");
            }
            Json(json!({"message": "Backup deleted successfully"})).into_response()
        }
        ("POST", ["api", "backups", id, "restore"]) => {
            let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            if request["confirm"] != json!(true) {
                return detail(StatusCode::BAD_REQUEST, "Restore must be confirmed");
            }
            if !state.backups.iter().any(|b| b["id"] == *id) {
                return detail(StatusCode::NOT_FOUND, "Backup not found");
            }
            let safety_id = format!("pre-{}", Uuid::new_v4());
            let mut safety = backup_json(&safety_id, "completed", "local");
            safety["trigger"] = json!("pre_restore");
            state.backups.insert(0, safety);
            Json(json!({
                "status": "success",
                "message": "Restored",
                "pre_restore_backup_id": safety_id
            }))
            .into_response()
        }
        ("GET", ["api", "backups", id, "download-url"]) => {
            let Some(backup) = state.backups.iter().find(|b| b["id"] == *id) else {
                return detail(StatusCode::NOT_FOUND, "Backup not found");
            };
            Json(json!({
                "download_url": format!("{}/presigned/{id}?signature=abc", state.base_url),
                "expires_in": 3600,
                "storage_type": backup["storage_type"]
            }))
            .into_response()
        }
        ("GET", ["api", "backups", id, "download"]) | ("GET", ["presigned", id]) => {
            if !state.backups.iter().any(|b| b["id"] == *id) {
                return detail(StatusCode::NOT_FOUND, "Backup not found");
            }
            (
                [(header::CONTENT_TYPE, "application/gzip")],
                backup_content(id),
            )
                .into_response()
        }
        ("GET", ["api", "settings", ""]) => Json(state.settings.clone()).into_response(),
        ("PATCH", ["api", "settings", ""]) => {
            let update: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            if let Some(email) = update.get("contact_email") {
                state.settings["contact_email"] = email.clone();
            }
            if let Some(input) = update.get("backup_config") {
                let previous = state.settings["backup_config"].clone();
                let stored = |flag: &str| previous.get(flag).and_then(Value::as_bool).unwrap_or(false);
                state.settings["backup_config"] = json!({
                    "enabled": input["enabled"],
                    "schedule": input["schedule"],
                    "retention_days": input["retention_days"],
                    "storage_type": input["storage_type"],
                    "s3_configured": stored("s3_configured") || input.get("s3_config").is_some(),
                    "s3_endpoint": input["s3_config"]["endpoint_url"],
                    "s3_bucket": input["s3_config"]["bucket_name"],
                    "sftp_configured": stored("sftp_configured") || input.get("sftp_config").is_some(),
                    "sftp_host": input["sftp_config"]["host"],
                    "sftp_path": input["sftp_config"]["remote_path"],
                    "local_configured": input.get("local_config").is_some(),
                    "local_path": input["local_config"]["path"]
                });
            }
            Json(state.settings.clone()).into_response()
        }
        _ => detail(StatusCode::NOT_FOUND, "Not Found"),
    }
}
