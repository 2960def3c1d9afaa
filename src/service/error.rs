use crate::error::HttpError;
use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Proposal {0} not found")]
    ProposalNotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Job {0} is not open for this action")]
    JobNotPending(Uuid),

    #[error("Job {0} already has a provider assigned")]
    ProviderAlreadyAssigned(Uuid),

    #[error("Job {0} is not in progress")]
    JobNotInProgress(Uuid),

    #[error("Only completed jobs can be reviewed")]
    JobNotCompleted(Uuid),

    #[error("Job {0} can only be deleted by its client while pending and unassigned")]
    JobNotDeletable(Uuid),

    #[error("You cannot submit a proposal to your own job")]
    SelfProposal,

    #[error("An active proposal for this job already exists")]
    DuplicateActiveProposal,

    #[error("Counter-offer was rejected recently; you can re-apply in {remaining_hours} hour(s)")]
    ProposalCooldown { remaining_hours: i64 },

    #[error("Proposal {0} is not pending")]
    ProposalNotPending(Uuid),

    #[error("Proposal {0} has no counter-offer to respond to")]
    ProposalNotCountered(Uuid),

    #[error("Proposal {0} has an outstanding counter-offer; the provider must respond to it first")]
    CounterofferOutstanding(Uuid),

    #[error("User {0} is not a participant of job {1}")]
    NotAParticipant(Uuid, Uuid),

    #[error("User {0} does not own job {1}")]
    NotJobOwner(Uuid, Uuid),

    #[error("User {0} does not own proposal {1}")]
    NotProposalOwner(Uuid, Uuid),

    #[error("Completion already approved by this party")]
    AlreadyApproved,

    #[error("Job {0} has no escrow contract attached")]
    NoContractAttached(Uuid),

    #[error("Review already exists for this job and role")]
    DuplicateReview,

    #[error("Rating must be an integer between 1 and 5, got {0}")]
    InvalidRating(i32),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Escrow gateway call {call} failed: {reason}")]
    ExternalCall { call: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::JobNotFound(_)
            | ServiceError::ProposalNotFound(_)
            | ServiceError::UserNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::Validation(_) | ServiceError::InvalidRating(_) => {
                StatusCode::BAD_REQUEST
            }

            ServiceError::JobNotPending(_)
            | ServiceError::ProviderAlreadyAssigned(_)
            | ServiceError::JobNotInProgress(_)
            | ServiceError::JobNotCompleted(_)
            | ServiceError::JobNotDeletable(_)
            | ServiceError::SelfProposal
            | ServiceError::DuplicateActiveProposal
            | ServiceError::ProposalCooldown { .. }
            | ServiceError::ProposalNotPending(_)
            | ServiceError::ProposalNotCountered(_)
            | ServiceError::CounterofferOutstanding(_)
            | ServiceError::AlreadyApproved
            | ServiceError::NoContractAttached(_)
            | ServiceError::DuplicateReview => StatusCode::CONFLICT,

            ServiceError::NotAParticipant(_, _)
            | ServiceError::NotJobOwner(_, _)
            | ServiceError::NotProposalOwner(_, _) => StatusCode::FORBIDDEN,

            ServiceError::ExternalCall { .. } => StatusCode::BAD_GATEWAY,

            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        HttpError::new(error.to_string(), status)
    }
}
