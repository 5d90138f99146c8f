use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::parse::{Shape, parse_tasks};
use super::{SourceError, TaskSource, non_empty};
use crate::config::TaskAppConfig;
use crate::domain::task::{Task, TaskStatus};

const SHAPE: Shape = Shape {
  items: &["tasks", "items"],
  groups: &["groups", "columns"],
  id: &["id"],
  title: &["title", "name"],
  description: &["description", "desc"],
  status: &["status"],
  group_label: &["name", "title"],
};

#[derive(Debug, Clone)]
struct Session {
  token: String,
  user_id: String,
}

#[derive(Deserialize)]
struct LoginResponse {
  token: Option<String>,
}

/// REST task tracker: token login, per-user task listing, comments and status PATCH.
pub struct TaskAppSource {
  http: reqwest::Client,
  base_url: String,
  project_id: String,
  username: String,
  password: String,
  session: Mutex<Option<Session>>,
}

impl TaskAppSource {
  pub fn new(config: &TaskAppConfig, username: &str, password: &str) -> Result<Self, SourceError> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|err| SourceError::Http(err.to_string()))?;
    Ok(Self {
      http,
      base_url: config.base_url.trim_end_matches('/').to_string(),
      project_id: config.project_id.clone(),
      username: username.to_string(),
      password: password.to_string(),
      session: Mutex::new(None),
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  async fn authenticate(&self) -> Result<Session, SourceError> {
    let login: LoginResponse = send_json(
      self
        .http
        .post(self.url("/api/auth/login"))
        .json(&json!({ "username": self.username, "password": self.password })),
    )
    .await?;
    let token = login
      .token
      .filter(|t| !t.is_empty())
      .ok_or_else(|| SourceError::Auth("login response carries no token".to_string()))?;

    let me: Value = send_json(self.http.get(self.url("/api/auth/me")).bearer_auth(&token)).await?;
    let user_id = match me.get("id") {
      Some(Value::String(id)) if !id.is_empty() => id.clone(),
      Some(Value::Number(id)) => id.to_string(),
      _ => return Err(SourceError::Auth("/api/auth/me returned no user id".to_string())),
    };
    info!(event = "task_app_authenticated", user_id = %user_id);
    Ok(Session { token, user_id })
  }

  async fn session(&self) -> Result<Session, SourceError> {
    let mut guard = self.session.lock().await;
    if let Some(session) = guard.as_ref() {
      return Ok(session.clone());
    }
    let session = self.authenticate().await?;
    *guard = Some(session.clone());
    Ok(session)
  }

  async fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, SourceError> {
    let session = self.session().await?;
    Ok(self.http.request(method, self.url(path)).bearer_auth(session.token))
  }
}

async fn send(request: RequestBuilder) -> Result<reqwest::Response, SourceError> {
  let response = request
    .send()
    .await
    .map_err(|err| SourceError::Http(err.to_string()))?;
  let status = response.status();
  if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
    return Err(SourceError::Auth(format!("HTTP {status}")));
  }
  if !status.is_success() {
    return Err(SourceError::Http(format!("HTTP {status}")));
  }
  Ok(response)
}

async fn send_json<T: serde::de::DeserializeOwned>(request: RequestBuilder) -> Result<T, SourceError> {
  send(request)
    .await?
    .json()
    .await
    .map_err(|err| SourceError::Parse(err.to_string()))
}

#[async_trait]
impl TaskSource for TaskAppSource {
  fn name(&self) -> &str {
    "task_app"
  }

  async fn poll(&self) -> Result<Option<Value>, SourceError> {
    let session = self.session().await?;
    let path = format!(
      "/api/projects/{}/tasks?assignedToUserId={}",
      self.project_id, session.user_id
    );
    let raw: Value = send_json(self.authorized(Method::GET, &path).await?).await?;
    debug!(event = "task_app_polled", project_id = %self.project_id);
    Ok(non_empty(raw))
  }

  fn parse(&self, raw: &Value) -> Result<Vec<Task>, SourceError> {
    parse_tasks(raw, &SHAPE)
  }

  async fn comment(&self, task_id: &str, text: &str) -> Result<(), SourceError> {
    let path = format!("/api/tasks/{task_id}/comments");
    send(
      self
        .authorized(Method::POST, &path)
        .await?
        .json(&json!({ "text": text })),
    )
    .await?;
    Ok(())
  }

  async fn transition(&self, task_id: &str, status: TaskStatus) -> Result<(), SourceError> {
    let path = format!("/api/tasks/{task_id}");
    send(
      self
        .authorized(Method::PATCH, &path)
        .await?
        .json(&json!({ "status": status.as_str() })),
    )
    .await?;
    info!(event = "task_status_updated", task_id, status = %status);
    Ok(())
  }
}
