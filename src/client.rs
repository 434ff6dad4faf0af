//! REST client for the batch API of the job service.
//!
//! Maps engine intents onto requests and responses onto [`BatchHandle`]s.
//! No retries happen here; the monitor decides what to tolerate.

use crate::batch::{BatchHandle, LogPage};
use crate::config::Config;
use crate::error::{ClientError, RequestFailure};
use crate::job::JobDescriptor;
use base64::Engine;
use serde::Serialize;
use std::collections::BTreeMap;

/// Placeholder name used when the request does not carry one.
pub const DEFAULT_BATCH_NAME: &str = "spark-submit-job";

const SUBMITTED_BY_KEY: &str = "spark.kubernetes.driver.label.submitted-by";
const SUBMITTED_BY_VALUE: &str = "spark-submit";
const PROXY_USER_KEY: &str = "hive.server2.proxy.user";

/// Operations the monitor needs from the job service.
pub trait JobClient {
    /// Create a new batch. Not idempotent.
    fn submit(&self, descriptor: &JobDescriptor) -> Result<BatchHandle, ClientError>;

    /// Fetch the current snapshot of a batch.
    fn get_status(&self, batch_id: &str) -> Result<BatchHandle, ClientError>;

    /// Fetch at most `size` log rows starting at row `from`.
    ///
    /// An empty vector means no new rows yet.
    fn get_log_page(&self, batch_id: &str, from: u64, size: usize)
        -> Result<Vec<String>, ClientError>;

    /// Ask the service to terminate a batch.
    fn cancel(&self, batch_id: &str) -> Result<(), ClientError>;
}

/// Body of `POST /batches`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub batch_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    pub name: String,
    pub conf: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub py_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jars: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub archives: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl BatchRequest {
    pub fn from_descriptor(descriptor: &JobDescriptor) -> Self {
        let mut conf = descriptor.conf.clone();
        conf.entry(SUBMITTED_BY_KEY.to_string())
            .or_insert_with(|| SUBMITTED_BY_VALUE.to_string());
        if let Some(proxy_user) = &descriptor.proxy_user {
            conf.insert(PROXY_USER_KEY.to_string(), proxy_user.clone());
        }

        Self {
            batch_type: descriptor.kind.as_str().to_string(),
            class_name: descriptor.class_name.clone(),
            resource: descriptor.resource.clone(),
            proxy_user: descriptor.proxy_user.clone(),
            queue: descriptor.queue.clone(),
            name: descriptor
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_BATCH_NAME.to_string()),
            conf,
            py_files: descriptor.py_files.clone(),
            files: descriptor.files.clone(),
            jars: descriptor.jars.clone(),
            archives: descriptor.archives.clone(),
            packages: descriptor.packages.clone(),
            repositories: descriptor.repositories.clone(),
            args: descriptor.args.clone(),
        }
    }
}

/// `Basic base64(user:pass)`.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    )
}

/// Blocking HTTP implementation of [`JobClient`].
pub struct HttpJobClient {
    agent: ureq::Agent,
    base_url: String,
    auth_header: String,
}

impl HttpJobClient {
    /// Create a client. Credentials are resolved once, here.
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout)
            .build();
        Self {
            agent,
            base_url: config.base_url(),
            auth_header: basic_auth_header(&config.username, &config.password),
        }
    }

    fn batch_url(&self, batch_id: &str) -> String {
        format!("{}/batches/{}", self.base_url, batch_id)
    }

    fn execute(
        &self,
        request: ureq::Request,
        body: Option<&BatchRequest>,
    ) -> Result<ureq::Response, RequestFailure> {
        let request = request.set("Authorization", &self.auth_header);
        tracing::debug!(method = request.method(), url = request.url(), "sending request");

        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        match result {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(code, response)) => {
                let status_line = format!(
                    "{} {} {}",
                    response.http_version(),
                    code,
                    response.status_text()
                );
                let body = response.into_string().unwrap_or_default();
                tracing::debug!(%status_line, "request rejected");
                Err(RequestFailure::Status { status_line, body })
            }
            Err(ureq::Error::Transport(transport)) => {
                tracing::debug!(error = %transport, "transport failure");
                Err(RequestFailure::Transport(transport.to_string()))
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, RequestFailure> {
    let body = response
        .into_string()
        .map_err(|e| RequestFailure::Transport(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::debug!(error = %e, body = %body, "undecodable response body");
        RequestFailure::Decode(e.to_string())
    })
}

impl JobClient for HttpJobClient {
    fn submit(&self, descriptor: &JobDescriptor) -> Result<BatchHandle, ClientError> {
        let body = BatchRequest::from_descriptor(descriptor);
        let url = format!("{}/batches", self.base_url);
        self.execute(self.agent.post(&url), Some(&body))
            .and_then(decode::<BatchHandle>)
            .and_then(|handle| {
                if handle.id.trim().is_empty() {
                    Err(RequestFailure::Decode("response carries no batch id".to_string()))
                } else {
                    Ok(handle)
                }
            })
            .map_err(ClientError::Submission)
    }

    fn get_status(&self, batch_id: &str) -> Result<BatchHandle, ClientError> {
        self.execute(self.agent.get(&self.batch_url(batch_id)), None)
            .and_then(decode)
            .map_err(ClientError::StatusFetch)
    }

    fn get_log_page(
        &self,
        batch_id: &str,
        from: u64,
        size: usize,
    ) -> Result<Vec<String>, ClientError> {
        let url = format!("{}/localLog", self.batch_url(batch_id));
        let request = self
            .agent
            .get(&url)
            .query("from", &from.to_string())
            .query("size", &size.to_string());
        self.execute(request, None)
            .and_then(decode::<LogPage>)
            .map(LogPage::into_rows)
            .map_err(ClientError::LogFetch)
    }

    fn cancel(&self, batch_id: &str) -> Result<(), ClientError> {
        self.execute(self.agent.delete(&self.batch_url(batch_id)), None)
            .map(|_| ())
            .map_err(ClientError::Cancel)
    }
}
