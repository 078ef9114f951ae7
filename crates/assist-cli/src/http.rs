//! HTTP implementations of the engine's external collaborators: the project
//! backend and the completion service.

use anyhow::Context;
use assist_core::backend::BackendClient;
use assist_core::error::{AssistError, Result};
use assist_core::mode::profile;
use assist_core::session::{ProjectDataPatch, Session};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(30);
/// Messages of history sent along with each completion request.
const CONTEXT_MESSAGES: usize = 10;

fn client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// JSON client for `{base}/projects/{project}/{collection}[/{id}]`.
pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
    project: String,
}

impl HttpBackend {
    pub fn new(base: &str, project: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: client()?,
            base: base.trim_end_matches('/').to_string(),
            project: project.to_string(),
        })
    }

    fn url(&self, collection: &str, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/projects/{}/{collection}/{id}", self.base, self.project),
            None => format!("{}/projects/{}/{collection}", self.base, self.project),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| AssistError::Backend(e.to_string()))?;
        let status = response.status();
        let body: Value = if status == reqwest::StatusCode::NO_CONTENT {
            Value::Null
        } else {
            response.json().await.unwrap_or(Value::Null)
        };
        if status.is_success() {
            return Ok(body);
        }
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        tracing::warn!(status = status.as_u16(), error = %message, "backend request failed");
        Err(AssistError::Backend(format!("{} {message}", status.as_u16())))
    }

    /// Fetch the project summary used to refresh the session's project data.
    pub async fn project_data(&self) -> Result<ProjectDataPatch> {
        let url = format!("{}/projects/{}/summary", self.base, self.project);
        let body = self.send(self.client.get(url)).await?;
        Ok(serde_json::from_value(body)?)
    }
}

impl BackendClient for HttpBackend {
    fn create<'a>(&'a self, collection: &'a str, body: Value) -> BoxFuture<'a, Result<Value>> {
        async move {
            let url = self.url(collection, None);
            self.send(self.client.post(url).json(&body)).await
        }
        .boxed()
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            let url = self.url(collection, Some(id));
            self.send(self.client.patch(url).json(&body)).await
        }
        .boxed()
    }

    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<Value>> {
        async move {
            let url = self.url(collection, Some(id));
            self.send(self.client.delete(url)).await
        }
        .boxed()
    }

    fn list<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<Value>> {
        async move {
            let url = self.url(collection, None);
            self.send(self.client.get(url)).await
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Completion service
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CompletionReply {
    reply: String,
}

/// POSTs `{system, message, context}` and expects `{reply}` back.
#[derive(Clone)]
pub struct HttpCompletion {
    client: reqwest::Client,
    url: String,
}

impl HttpCompletion {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: client()?,
            url: url.to_string(),
        })
    }

    pub async fn complete(&self, text: String, snapshot: Session) -> anyhow::Result<String> {
        let body = json!({
            "system": profile(snapshot.mode()).prompt,
            "message": text,
            "context": snapshot.context_json(CONTEXT_MESSAGES),
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("could not reach {}", self.url))?
            .error_for_status()
            .context("completion service returned an error")?;
        let reply: CompletionReply = response
            .json()
            .await
            .context("completion service sent an unreadable reply")?;
        Ok(reply.reply)
    }
}
