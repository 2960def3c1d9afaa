// Typed payloads for the real-time fan-out. One struct per event; the wire
// frame is `{"event": "<kebab-case name>", "payload": {...}}`.
use serde::Serialize;
use uuid::Uuid;

use crate::models::marketmodel::JobStatus;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: Uuid,
    pub email: String,
    pub provider_score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewJobCreatedPayload {
    pub job_id: Uuid,
    pub title: String,
    pub category: String,
    pub amount: String,
    pub client: UserSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewProposalPayload {
    pub job_id: Uuid,
    pub job_title: String,
    pub proposal_id: Uuid,
    pub provider: ProviderSummary,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalCounterofferedPayload {
    pub proposal_id: Uuid,
    pub job_id: Uuid,
    pub job_title: String,
    pub counter_offer: String,
    pub original_amount: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CounterofferOutcomePayload {
    pub proposal_id: Uuid,
    pub job_id: Uuid,
    pub job_title: String,
    pub provider: UserSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalOutcomePayload {
    pub proposal_id: Uuid,
    pub job_id: Uuid,
    pub job_title: String,
    pub amount: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusChangedPayload {
    pub job_id: Uuid,
    pub job_title: String,
    pub old_status: JobStatus,
    pub new_status: JobStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobApprovalProgressPayload {
    pub job_id: Uuid,
    pub job_title: String,
    pub approved_by: Uuid,
    pub awaiting: Uuid,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobDeletedPayload {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum OutboundEvent {
    NewJobCreated(NewJobCreatedPayload),
    NewProposal(NewProposalPayload),
    ProposalCounteroffered(ProposalCounterofferedPayload),
    CounterofferAccepted(CounterofferOutcomePayload),
    CounterofferRejected(CounterofferOutcomePayload),
    ProposalAccepted(ProposalOutcomePayload),
    ProposalRejected(ProposalOutcomePayload),
    JobStatusChanged(JobStatusChangedPayload),
    JobApprovalProgress(JobApprovalProgressPayload),
    JobDeleted(JobDeletedPayload),
}

impl OutboundEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::NewJobCreated(_) => "new-job-created",
            OutboundEvent::NewProposal(_) => "new-proposal",
            OutboundEvent::ProposalCounteroffered(_) => "proposal-counteroffered",
            OutboundEvent::CounterofferAccepted(_) => "counteroffer-accepted",
            OutboundEvent::CounterofferRejected(_) => "counteroffer-rejected",
            OutboundEvent::ProposalAccepted(_) => "proposal-accepted",
            OutboundEvent::ProposalRejected(_) => "proposal-rejected",
            OutboundEvent::JobStatusChanged(_) => "job-status-changed",
            OutboundEvent::JobApprovalProgress(_) => "job-approval-progress",
            OutboundEvent::JobDeleted(_) => "job-deleted",
        }
    }
}
