//! Batch handle and log page types returned by the job service.

use serde::Deserialize;
use std::fmt;

/// Lifecycle state of a batch as reported by the service.
///
/// The service's state field is an open string. Only the terminal names are
/// known here; everything else is carried through verbatim as in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    Finished,
    Error,
    Canceled,
    InProgress(String),
}

impl BatchState {
    pub fn from_service_state(state: &str) -> Self {
        match state {
            "FINISHED" => BatchState::Finished,
            "ERROR" => BatchState::Error,
            "CANCELED" => BatchState::Canceled,
            other => BatchState::InProgress(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BatchState::Finished => "FINISHED",
            BatchState::Error => "ERROR",
            BatchState::Canceled => "CANCELED",
            BatchState::InProgress(name) => name,
        }
    }

    /// No further transitions happen after a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchState::InProgress(_))
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of one remote batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchHandle {
    pub id: String,
    pub user: Option<String>,
    pub batch_type: Option<String>,
    pub name: Option<String>,
    pub app_start_time: Option<i64>,
    pub app_id: Option<String>,
    /// Reported by the service but never shown; see [`history_server_url`].
    pub app_url: Option<String>,
    pub app_state: Option<String>,
    pub app_diagnostic: Option<String>,
    pub kyuubi_instance: Option<String>,
    pub state: Option<String>,
    pub create_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl BatchHandle {
    pub fn state(&self) -> Option<BatchState> {
        self.state.as_deref().map(BatchState::from_service_state)
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_some_and(|s| s.is_terminal())
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Diagnostic text, if there is anything besides whitespace.
    pub fn diagnostic(&self) -> Option<&str> {
        self.app_diagnostic
            .as_deref()
            .filter(|d| !d.trim().is_empty())
    }
}

/// One page of the batch's local log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    #[serde(default)]
    pub log_row_set: Option<Vec<String>>,
    #[allow(dead_code)]
    #[serde(default)]
    pub row_count: Option<i64>,
}

impl LogPage {
    pub fn into_rows(self) -> Vec<String> {
        self.log_row_set.unwrap_or_default()
    }
}

/// Build the history server page for an application.
///
/// Only the operator's history server is trusted, so the service's own
/// `appUrl` is never used. Returns `None` unless both parts are present.
pub fn history_server_url(base_url: Option<&str>, app_id: Option<&str>) -> Option<String> {
    let base = base_url.map(str::trim).filter(|b| !b.is_empty())?;
    let app_id = app_id.filter(|id| !id.is_empty())?;
    Some(format!(
        "{}/history/{}/1/",
        base.trim_end_matches('/'),
        app_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_state_terminal_set() {
        assert!(BatchState::from_service_state("FINISHED").is_terminal());
        assert!(BatchState::from_service_state("ERROR").is_terminal());
        assert!(BatchState::from_service_state("CANCELED").is_terminal());
        assert!(!BatchState::from_service_state("PENDING").is_terminal());
        assert!(!BatchState::from_service_state("RUNNING").is_terminal());
        assert!(!BatchState::from_service_state("SOME_FUTURE_STATE").is_terminal());
    }

    #[test]
    fn test_unknown_state_round_trips_its_name() {
        let state = BatchState::from_service_state("INITIALIZED");
        assert_eq!(state, BatchState::InProgress("INITIALIZED".to_string()));
        assert_eq!(state.to_string(), "INITIALIZED");
    }

    #[test]
    fn test_parse_batch_handle() {
        let body = r#"{
            "id": "b1",
            "user": "alice",
            "batchType": "SPARK",
            "name": "spark-pi",
            "appId": "spark-d99461f259674299bfd3faf71acb902c",
            "appUrl": "http://driver:4040",
            "appState": "RUNNING",
            "appDiagnostic": "  ",
            "kyuubiInstance": "kyuubi-0:10099",
            "state": "RUNNING",
            "createTime": 1700000000000,
            "endTime": 0
        }"#;
        let handle: BatchHandle = serde_json::from_str(body).unwrap();
        assert_eq!(handle.id, "b1");
        assert_eq!(handle.state(), Some(BatchState::InProgress("RUNNING".into())));
        assert_eq!(handle.app_id(), Some("spark-d99461f259674299bfd3faf71acb902c"));
        assert!(handle.diagnostic().is_none());
        assert!(!handle.is_finished());
    }

    #[test]
    fn test_parse_minimal_handle() {
        let handle: BatchHandle = serde_json::from_str(r#"{"id":"b2","state":"ERROR","appId":""}"#).unwrap();
        assert!(handle.is_finished());
        assert!(handle.app_id().is_none());
    }

    #[test]
    fn test_handle_without_id_is_rejected() {
        let result: Result<BatchHandle, _> = serde_json::from_str(r#"{"state":"PENDING"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_page_without_rows_is_empty() {
        let page: LogPage = serde_json::from_str(r#"{"rowCount":0}"#).unwrap();
        assert!(page.into_rows().is_empty());

        let page: LogPage =
            serde_json::from_str(r#"{"logRowSet":["a","b"],"rowCount":2}"#).unwrap();
        assert_eq!(page.into_rows(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_history_server_url() {
        assert_eq!(
            history_server_url(Some("http://history:18080/"), Some("application_1_0001")),
            Some("http://history:18080/history/application_1_0001/1/".to_string())
        );
        assert_eq!(history_server_url(None, Some("app-42")), None);
        assert_eq!(history_server_url(Some(" "), Some("app-42")), None);
        assert_eq!(history_server_url(Some("http://history:18080"), None), None);
        assert_eq!(history_server_url(Some("http://history:18080"), Some("")), None);
    }
}
