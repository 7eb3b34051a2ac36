/// Leave / advance / overtime request approval
///
/// The backend does not agree on one verb for approve and reject, so each
/// action carries an ordered plan of verbs tried against the same URL. The
/// first 2xx completes the transition, a 4xx ends it, and a 5xx or transport
/// failure moves on to the next verb.
use super::client::ApiClient;
use crate::error::{ClientError, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};
use urlencoding::encode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Leave,
    Advance,
    Overtime,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Leave => "leave",
            RequestKind::Advance => "advance",
            RequestKind::Overtime => "overtime",
        }
    }

    fn collection(&self) -> &'static str {
        match self {
            RequestKind::Leave => "leave-requests",
            RequestKind::Advance => "advance-requests",
            RequestKind::Overtime => "overtime-requests",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
        }
    }

    /// Verbs to try, in order
    pub fn plan(&self) -> Vec<Method> {
        match self {
            ApprovalAction::Approve => vec![Method::PUT, Method::POST, Method::PATCH],
            ApprovalAction::Reject => {
                vec![Method::PUT, Method::POST, Method::PATCH, Method::DELETE]
            }
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approve_request",
            ApprovalAction::Reject => "reject_request",
        }
    }
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approving,
    Approved,
    Rejecting,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approving => "APPROVING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejecting => "REJECTING",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    /// PENDING → APPROVING / REJECTING
    pub fn begin(self, action: ApprovalAction) -> Result<Self> {
        match (self, action) {
            (RequestStatus::Pending, ApprovalAction::Approve) => Ok(RequestStatus::Approving),
            (RequestStatus::Pending, ApprovalAction::Reject) => Ok(RequestStatus::Rejecting),
            (from, action) => Err(ClientError::InvalidTransition {
                from: from.as_str().to_string(),
                action: action.as_str().to_string(),
            }),
        }
    }

    /// APPROVING → APPROVED, REJECTING → REJECTED
    pub fn complete(self) -> Result<Self> {
        match self {
            RequestStatus::Approving => Ok(RequestStatus::Approved),
            RequestStatus::Rejecting => Ok(RequestStatus::Rejected),
            from => Err(ClientError::InvalidTransition {
                from: from.as_str().to_string(),
                action: "complete".to_string(),
            }),
        }
    }

    /// Roll an in-flight transition back to PENDING
    pub fn abort(self) -> Self {
        match self {
            RequestStatus::Approving | RequestStatus::Rejecting => RequestStatus::Pending,
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one verb in the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Succeeded { status: u16 },
    ClientError { status: u16, message: String },
    ServerError { status: u16, message: String },
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbAttempt {
    pub method: Method,
    pub result: AttemptResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// A verb returned 2xx; the request reached its terminal state
    Completed { attempts: Vec<VerbAttempt> },
    /// The backend answered 4xx; the request is back to PENDING
    Refused { attempts: Vec<VerbAttempt> },
    /// Every verb failed with 5xx or transport errors; back to PENDING
    Exhausted { attempts: Vec<VerbAttempt> },
}

impl TransitionOutcome {
    pub fn attempts(&self) -> &[VerbAttempt] {
        match self {
            TransitionOutcome::Completed { attempts }
            | TransitionOutcome::Refused { attempts }
            | TransitionOutcome::Exhausted { attempts } => attempts,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TransitionOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub kind: RequestKind,
    #[serde(default)]
    pub status: RequestStatus,
}

impl ApprovalRequest {
    pub fn new(id: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: RequestStatus::Pending,
        }
    }

    fn action_path(&self, action: ApprovalAction) -> String {
        format!(
            "{}/{}/{}",
            self.kind.collection(),
            encode(&self.id),
            action.as_str()
        )
    }
}

#[derive(Clone)]
pub struct ApprovalClient {
    client: ApiClient,
}

impl ApprovalClient {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn approve(
        &self,
        request: &mut ApprovalRequest,
        comment: Option<&str>,
    ) -> Result<TransitionOutcome> {
        self.transition(request, ApprovalAction::Approve, comment)
            .await
    }

    pub async fn reject(
        &self,
        request: &mut ApprovalRequest,
        comment: Option<&str>,
    ) -> Result<TransitionOutcome> {
        self.transition(request, ApprovalAction::Reject, comment)
            .await
    }

    /// Run the verb plan for `action`
    ///
    /// `Err` is reserved for problems found before any attempt: an invalid
    /// transition or a missing token. Backend failures are reported through
    /// the outcome.
    pub async fn transition(
        &self,
        request: &mut ApprovalRequest,
        action: ApprovalAction,
        comment: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let in_flight = request.status.begin(action)?;
        if !self.client.has_token() {
            return Err(ClientError::Unauthenticated);
        }
        request.status = in_flight;

        let path = request.action_path(action);
        let mut attempts = Vec::new();

        for method in action.plan() {
            let mut builder = match self.client.request(method.clone(), &path) {
                Ok(builder) => builder,
                Err(e) => {
                    request.status = request.status.abort();
                    return Err(e);
                }
            };
            if let Some(comment) = comment.filter(|_| method != Method::DELETE) {
                builder = builder.json(&serde_json::json!({ "comment": comment }));
            }

            match self.client.send(action.operation(), builder).await {
                Ok(response) => {
                    attempts.push(VerbAttempt {
                        method: method.clone(),
                        result: AttemptResult::Succeeded {
                            status: response.status().as_u16(),
                        },
                    });
                    request.status = request.status.complete()?;
                    info!(
                        request_id = %request.id,
                        kind = request.kind.as_str(),
                        method = %method,
                        status = %request.status,
                        "request transition completed"
                    );
                    return Ok(TransitionOutcome::Completed { attempts });
                }
                Err(ClientError::Http { status, message }) if status.is_client_error() => {
                    attempts.push(VerbAttempt {
                        method: method.clone(),
                        result: AttemptResult::ClientError {
                            status: status.as_u16(),
                            message,
                        },
                    });
                    request.status = request.status.abort();
                    warn!(
                        request_id = %request.id,
                        action = %action,
                        method = %method,
                        status = status.as_u16(),
                        "request transition refused"
                    );
                    return Ok(TransitionOutcome::Refused { attempts });
                }
                Err(ClientError::Http { status, message }) => {
                    debug!(method = %method, status = status.as_u16(), "verb failed, trying next");
                    attempts.push(VerbAttempt {
                        method,
                        result: AttemptResult::ServerError {
                            status: status.as_u16(),
                            message,
                        },
                    });
                }
                Err(e) => {
                    debug!(method = %method, error = %e, "verb failed, trying next");
                    attempts.push(VerbAttempt {
                        method,
                        result: AttemptResult::Transport(e.to_string()),
                    });
                }
            }
        }

        request.status = request.status.abort();
        warn!(
            request_id = %request.id,
            action = %action,
            attempts = attempts.len(),
            "every verb failed"
        );
        Ok(TransitionOutcome::Exhausted { attempts })
    }
}
