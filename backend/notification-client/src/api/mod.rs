/// REST companion calls
///
/// Plain request/response operations against the console backend. None of
/// them touch the live channel.
pub mod approvals;
pub mod client;
pub mod notifications;

pub use approvals::{
    ApprovalAction, ApprovalClient, ApprovalRequest, AttemptResult, RequestKind, RequestStatus,
    TransitionOutcome, VerbAttempt,
};
pub use client::{error_message_from_body, ApiClient};
pub use notifications::{parse_list, NotificationApi};
