//! Remote delivery contract and its HTTP implementation.
//!
//! The collection endpoint accepts one completed session per POST and answers
//! with an accept/reject verdict. Wire fields are camelCase on both sides:
//!
//! ```json
//! {"sessionId": "...", "startTime": "...", "endTime": "...",
//!  "duration": 1500, "submittedAt": "..."}
//! ```
//!
//! and the response is `{"success": bool, "message"?, "sessionId"?}`.
//!
//! Error taxonomy matters to callers: a [`SubmitError`] means the transport
//! failed (no connection, timeout, unparseable body) and the verdict is
//! unknown. A parsed response with `success: false` is not an error here;
//! the remote received the session and rejected it.

use std::error::Error as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::Session;

/// One completed session, shaped for the collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole seconds between start and end.
    pub duration: i64,
    pub submitted_at: DateTime<Utc>,
}

impl SubmitRequest {
    /// Builds the wire payload for a session, or None while it is still open.
    /// Open sessions have no `endTime` and must never reach the remote.
    pub fn for_session(session: &Session, submitted_at: DateTime<Utc>) -> Option<Self> {
        let end_time = session.end_time?;
        Some(SubmitRequest {
            session_id: session.id.clone(),
            start_time: session.start_time,
            end_time,
            duration: session.duration().num_seconds(),
            submitted_at,
        })
    }
}

/// The remote's verdict on one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Transport-level submission failures. The variants carry flattened error
/// text rather than source errors so the message can be stored verbatim on
/// the session's `sync_error` field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("request to {endpoint} failed: {detail}")]
    Transport { endpoint: String, detail: String },
    #[error("unparseable response from {endpoint}: {detail}")]
    MalformedResponse { endpoint: String, detail: String },
    #[error("could not build HTTP client: {detail}")]
    Client { detail: String },
}

/// Stateless delivery function: one session payload in, one verdict out.
/// Implementations must be callable from the sync engine's worker thread.
pub trait RemoteSubmitter: Send + Sync {
    fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, SubmitError>;
}

/// Flattens an error and its source chain into one line. reqwest's top-level
/// Display omits the cause ("error sending request for url"); the useful part
/// ("operation timed out", "Connection refused") lives down the chain.
fn describe(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// [`RemoteSubmitter`] over plain HTTP POST.
pub struct HttpSubmitter {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpSubmitter {
    /// `timeout` bounds the whole request, connect included.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SubmitError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SubmitError::Client {
                detail: describe(&err),
            })?;
        Ok(HttpSubmitter {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl RemoteSubmitter for HttpSubmitter {
    fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, SubmitError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(|err| SubmitError::Transport {
                endpoint: self.endpoint.clone(),
                detail: describe(&err),
            })?;

        // No error_for_status here: a rejection can arrive with any status
        // code, and the body carries the verdict either way. A body that is
        // not the contract shape is a transport failure.
        response
            .json::<SubmitResponse>()
            .map_err(|err| SubmitError::MalformedResponse {
                endpoint: self.endpoint.clone(),
                detail: describe(&err),
            })
    }
}
