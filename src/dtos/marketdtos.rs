use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::marketmodel::*;

fn wei_amount(value: &str) -> Result<(), ValidationError> {
    crate::utils::currency::parse_wei(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("wei_amount"))
}

fn ethereum_address(value: &str) -> Result<(), ValidationError> {
    static ADDRESS_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ADDRESS_RE.get_or_init(|| regex::Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap());
    if re.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("ethereum_address"))
    }
}

//User DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateUserDto {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(custom(function = "ethereum_address", message = "Invalid wallet address"))]
    pub wallet_address: String,

    pub wallet_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponseDto {
    pub user_id: Uuid,
    pub wallet_address: String,
    pub wei: String,
    pub eth: String,
}

//Job DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateJobDto {
    pub client_id: Uuid,

    #[validate(length(min = 1, max = 120, message = "Title must be between 1 and 120 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 2000, message = "Description must be between 1 and 2000 characters"))]
    pub description: String,

    pub category: Specialty,

    #[validate(custom(function = "wei_amount", message = "Amount must be a positive integer wei value"))]
    pub amount_wei: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct JobFilterQuery {
    pub status: Option<JobStatus>,
    pub category: Option<Specialty>,
    pub client_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct DeleteJobDto {
    pub caller_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CallerQuery {
    pub caller_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct JobDetailDto {
    pub job: Job,
    pub proposals: Vec<Proposal>,
    pub reviews: Vec<Review>,
}

//Proposal DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SubmitProposalDto {
    pub job_id: Uuid,
    pub provider_id: Uuid,

    #[validate(length(max = 1000, message = "Message must be at most 1000 characters"))]
    pub message: Option<String>,

    #[validate(custom(function = "wei_amount", message = "Proposed amount must be a positive integer wei value"))]
    pub proposed_amount_wei: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalAction {
    Accept,
    Counteroffer,
}

/// Client-side action on a received proposal: accept it outright or answer
/// with a counter-offer.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ProposalActionDto {
    pub caller_id: Uuid,
    pub action: ProposalAction,

    #[validate(custom(function = "wei_amount", message = "Counter-offer must be a positive integer wei value"))]
    pub counter_offer_wei: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CounterOfferResponse {
    Accept,
    Reject,
}

/// Provider-side response to the client's counter-offer.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CounterOfferResponseDto {
    pub caller_id: Uuid,
    pub action: CounterOfferResponse,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponseDto {
    pub job: Job,
    pub proposal: Proposal,
}

//Settlement DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ApproveCompletionDto {
    pub caller_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponseDto {
    pub job: Job,
    pub both_approved: bool,
    /// Transaction hash of the best-effort on-chain mirror, when one was sent.
    pub mirrored_tx: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContractStatusDto {
    pub contract_job_id: String,
    pub client_confirmed: bool,
    pub provider_confirmed: bool,
    pub both_confirmed: bool,
    pub contract_status: u8,
    pub amount_wei: String,
    pub amount_eth: String,
    pub client: String,
    pub provider: String,
    pub message: String,
}

//Review DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SubmitReviewDto {
    pub job_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewed_user_id: Uuid,

    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,

    #[validate(length(max = 1000, message = "Comment must be at most 1000 characters"))]
    pub comment: Option<String>,

    pub role: ReviewRole,
}

//Response wrappers
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}
