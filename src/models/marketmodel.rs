use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "specialty", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Specialty {
    Plumbing,
    Electrical,
    Carpentry,
    Painting,
    Cleaning,
    Maintenance,
    Other,
}

impl Specialty {
    pub fn to_str(&self) -> &str {
        match self {
            Specialty::Plumbing => "plumbing",
            Specialty::Electrical => "electrical",
            Specialty::Carpentry => "carpentry",
            Specialty::Painting => "painting",
            Specialty::Cleaning => "cleaning",
            Specialty::Maintenance => "maintenance",
            Specialty::Other => "other",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Disputed,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "proposal_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Counteroffered,
    CounterofferRejected,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    /// Non-terminal proposals block a second application to the same job.
    pub fn is_active(&self) -> bool {
        matches!(self, ProposalStatus::Pending | ProposalStatus::Counteroffered)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "review_role", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewRole {
    ClientToProvider,
    ProviderToClient,
}

/// Which side of a job a caller is acting as. Not a database type; resolved
/// per-request from the job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Client,
    Provider,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub wallet_address: String,
    // Custodial dev-grade signing key (hex secp256k1). Never serialized.
    #[serde(skip_serializing)]
    pub wallet_key: Option<String>,
    pub client_score: f64,
    pub provider_score: f64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub category: Specialty,
    // Integer wei, NUMERIC(78,0) in Postgres.
    pub amount: BigDecimal,
    pub status: JobStatus,
    pub contract_job_id: Option<String>,
    pub tx_hash: Option<String>,
    pub client_approved: bool,
    pub provider_approved: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn party_of(&self, user_id: Uuid) -> Option<Party> {
        if self.client_id == user_id {
            Some(Party::Client)
        } else if self.provider_id == Some(user_id) {
            Some(Party::Provider)
        } else {
            None
        }
    }

    pub fn approved_by(&self, party: Party) -> bool {
        match party {
            Party::Client => self.client_approved,
            Party::Provider => self.provider_approved,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Proposal {
    pub id: Uuid,
    pub job_id: Uuid,
    pub provider_id: Uuid,
    pub message: Option<String>,
    pub proposed_amount: Option<BigDecimal>,
    pub counter_offer_amount: Option<BigDecimal>,
    pub status: ProposalStatus,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub job_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewed_user_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub role: ReviewRole,
    pub created_at: Option<DateTime<Utc>>,
}
