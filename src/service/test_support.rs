// In-memory stand-ins for the Postgres store, the escrow contract, and the
// fan-out hub. They reproduce the conditional-update semantics the services
// rely on so the settlement scenarios can run without external processes.
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{
    db::marketdb::{JobFilter, MarketStore},
    dtos::eventdtos::OutboundEvent,
    models::marketmodel::*,
    service::{
        error::ServiceError,
        escrow_gateway::{ContractJobView, EscrowCreated, EscrowGateway, EscrowTx},
        notification_service::NotificationFanout,
        proposal_service::ProposalService,
        reputation_service::ReputationService,
        settlement_service::SettlementService,
    },
};

/// Fully wired service stack over the in-memory doubles.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub fanout: Arc<RecordingFanout>,
    pub settlement: Arc<SettlementService>,
    pub proposals: ProposalService,
    pub reputation: ReputationService,
}

pub fn harness() -> TestHarness {
    let store = MemoryStore::new();
    let gateway = MockGateway::new();
    let fanout = RecordingFanout::new();

    let settlement = Arc::new(SettlementService::new(
        store.clone(),
        gateway.clone(),
        fanout.clone(),
    ));
    let proposals = ProposalService::new(store.clone(), settlement.clone(), fanout.clone());
    let reputation = ReputationService::new(store.clone());

    TestHarness {
        store,
        gateway,
        fanout,
        settlement,
        proposals,
        reputation,
    }
}

pub fn wei(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    jobs: Vec<Job>,
    proposals: Vec<Proposal>,
    reviews: Vec<Review>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_user(&self, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            wallet_address: format!("0x{:040x}", rand_seed()),
            wallet_key: Some(format!("{:064x}", rand_seed())),
            client_score: 0.0,
            provider_score: 0.0,
            created_at: Some(Utc::now()),
        };
        self.tables.lock().unwrap().users.push(user.clone());
        user
    }

    pub fn job(&self, job_id: Uuid) -> Job {
        self.tables
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
            .unwrap()
    }

    pub fn proposal(&self, proposal_id: Uuid) -> Proposal {
        self.tables
            .lock()
            .unwrap()
            .proposals
            .iter()
            .find(|p| p.id == proposal_id)
            .cloned()
            .unwrap()
    }

    pub fn user(&self, user_id: Uuid) -> User {
        self.tables
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .unwrap()
    }

    /// Test hook: backdate a proposal's rejection timestamp.
    pub fn set_rejected_at(&self, proposal_id: Uuid, rejected_at: DateTime<Utc>) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(p) = tables.proposals.iter_mut().find(|p| p.id == proposal_id) {
            p.rejected_at = Some(rejected_at);
        }
    }
}

fn rand_seed() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0xfa1af7);
    COUNTER.fetch_add(0x9e3779b9, Ordering::Relaxed)
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn create_user(
        &self,
        email: String,
        wallet_address: String,
        wallet_key: Option<String>,
    ) -> Result<User, sqlx::Error> {
        let user = User {
            id: Uuid::new_v4(),
            email,
            wallet_address,
            wallet_key,
            client_score: 0.0,
            provider_score: 0.0,
            created_at: Some(Utc::now()),
        };
        self.tables.lock().unwrap().users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, sqlx::Error> {
        Ok(self.tables.lock().unwrap().users.clone())
    }

    async fn create_job(
        &self,
        client_id: Uuid,
        title: String,
        description: String,
        category: Specialty,
        amount: BigDecimal,
    ) -> Result<Job, sqlx::Error> {
        let job = Job {
            id: Uuid::new_v4(),
            client_id,
            provider_id: None,
            title,
            description,
            category,
            amount,
            status: JobStatus::Pending,
            contract_job_id: None,
            tx_hash: None,
            client_approved: false,
            provider_approved: false,
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        };
        self.tables.lock().unwrap().jobs.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.id == job_id)
            .cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, sqlx::Error> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .filter(|j| filter.category.map_or(true, |c| j.category == c))
            .filter(|j| filter.client_id.map_or(true, |c| j.client_id == c))
            .filter(|j| filter.provider_id.map_or(true, |p| j.provider_id == Some(p)))
            .cloned()
            .collect())
    }

    async fn delete_job_if_pending(&self, job_id: Uuid) -> Result<u64, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        let deletable = tables
            .jobs
            .iter()
            .any(|j| j.id == job_id && j.status == JobStatus::Pending && j.provider_id.is_none());
        if !deletable {
            return Ok(0);
        }
        tables.jobs.retain(|j| j.id != job_id);
        tables.proposals.retain(|p| p.job_id != job_id);
        tables.reviews.retain(|r| r.job_id != job_id);
        Ok(1)
    }

    async fn commit_assignment(
        &self,
        job_id: Uuid,
        proposal_id: Uuid,
        provider_id: Uuid,
        amount: &BigDecimal,
        contract_job_id: &str,
        tx_hash: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();

        let committed = {
            let job = tables.jobs.iter_mut().find(|j| {
                j.id == job_id && j.status == JobStatus::Pending && j.provider_id.is_none()
            });
            match job {
                Some(job) => {
                    job.provider_id = Some(provider_id);
                    job.status = JobStatus::InProgress;
                    job.amount = amount.clone();
                    job.contract_job_id = Some(contract_job_id.to_string());
                    job.tx_hash = Some(tx_hash.to_string());
                    job.updated_at = Some(Utc::now());
                    Some(job.clone())
                }
                None => None,
            }
        };

        if committed.is_none() {
            return Ok(None);
        }

        for p in tables.proposals.iter_mut().filter(|p| p.job_id == job_id) {
            if p.id == proposal_id {
                p.status = ProposalStatus::Accepted;
            } else if !matches!(p.status, ProposalStatus::Accepted | ProposalStatus::Rejected) {
                p.status = ProposalStatus::Rejected;
            }
        }

        Ok(committed)
    }

    async fn record_approval(&self, job_id: Uuid, party: Party) -> Result<Option<Job>, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        let job = tables.jobs.iter_mut().find(|j| j.id == job_id);
        let Some(job) = job else { return Ok(None) };
        if job.status != JobStatus::InProgress {
            return Ok(None);
        }
        match party {
            Party::Client => {
                if job.client_approved {
                    return Ok(None);
                }
                job.client_approved = true;
                if job.provider_approved {
                    job.status = JobStatus::Completed;
                }
            }
            Party::Provider => {
                if job.provider_approved {
                    return Ok(None);
                }
                job.provider_approved = true;
                if job.client_approved {
                    job.status = JobStatus::Completed;
                }
            }
        }
        job.updated_at = Some(Utc::now());
        Ok(Some(job.clone()))
    }

    async fn create_proposal(
        &self,
        job_id: Uuid,
        provider_id: Uuid,
        message: Option<String>,
        proposed_amount: Option<BigDecimal>,
    ) -> Result<Proposal, sqlx::Error> {
        let proposal = Proposal {
            id: Uuid::new_v4(),
            job_id,
            provider_id,
            message,
            proposed_amount,
            counter_offer_amount: None,
            status: ProposalStatus::Pending,
            rejected_at: None,
            created_at: Some(Utc::now()),
        };
        self.tables.lock().unwrap().proposals.push(proposal.clone());
        Ok(proposal)
    }

    async fn get_proposal(&self, proposal_id: Uuid) -> Result<Option<Proposal>, sqlx::Error> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .proposals
            .iter()
            .find(|p| p.id == proposal_id)
            .cloned())
    }

    async fn find_proposal_for(
        &self,
        job_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<Proposal>, sqlx::Error> {
        // Insertion order stands in for created_at ordering.
        Ok(self
            .tables
            .lock()
            .unwrap()
            .proposals
            .iter()
            .filter(|p| p.job_id == job_id && p.provider_id == provider_id)
            .last()
            .cloned())
    }

    async fn proposals_for_job(&self, job_id: Uuid) -> Result<Vec<Proposal>, sqlx::Error> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .proposals
            .iter()
            .filter(|p| p.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn set_counter_offer(
        &self,
        proposal_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Proposal, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        let p = tables
            .proposals
            .iter_mut()
            .find(|p| p.id == proposal_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        p.counter_offer_amount = Some(amount.clone());
        p.status = ProposalStatus::Counteroffered;
        Ok(p.clone())
    }

    async fn update_proposal_status(
        &self,
        proposal_id: Uuid,
        status: ProposalStatus,
        rejected_at: Option<DateTime<Utc>>,
    ) -> Result<Proposal, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        let p = tables
            .proposals
            .iter_mut()
            .find(|p| p.id == proposal_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        p.status = status;
        if rejected_at.is_some() {
            p.rejected_at = rejected_at;
        }
        Ok(p.clone())
    }

    async fn create_review(
        &self,
        job_id: Uuid,
        reviewer_id: Uuid,
        reviewed_user_id: Uuid,
        rating: i32,
        comment: Option<String>,
        role: ReviewRole,
    ) -> Result<Review, sqlx::Error> {
        let review = Review {
            id: Uuid::new_v4(),
            job_id,
            reviewer_id,
            reviewed_user_id,
            rating,
            comment,
            role,
            created_at: Some(Utc::now()),
        };
        self.tables.lock().unwrap().reviews.push(review.clone());
        Ok(review)
    }

    async fn find_review(
        &self,
        job_id: Uuid,
        reviewer_id: Uuid,
        role: ReviewRole,
    ) -> Result<Option<Review>, sqlx::Error> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .reviews
            .iter()
            .find(|r| r.job_id == job_id && r.reviewer_id == reviewer_id && r.role == role)
            .cloned())
    }

    async fn reviews_for_job(&self, job_id: Uuid) -> Result<Vec<Review>, sqlx::Error> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .reviews
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn average_rating(
        &self,
        reviewed_user_id: Uuid,
        role: ReviewRole,
    ) -> Result<Option<f64>, sqlx::Error> {
        let tables = self.tables.lock().unwrap();
        let ratings: Vec<i32> = tables
            .reviews
            .iter()
            .filter(|r| r.reviewed_user_id == reviewed_user_id && r.role == role)
            .map(|r| r.rating)
            .collect();
        if ratings.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            ratings.iter().sum::<i32>() as f64 / ratings.len() as f64,
        ))
    }

    async fn update_user_score(
        &self,
        user_id: Uuid,
        role: ReviewRole,
        value: f64,
    ) -> Result<(), sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            match role {
                ReviewRole::ClientToProvider => user.provider_score = value,
                ReviewRole::ProviderToClient => user.client_score = value,
            }
        }
        Ok(())
    }
}

/// Scriptable escrow contract double. Records every call; individual calls can
/// be told to fail.
#[derive(Default)]
pub struct MockGateway {
    pub fail_create: AtomicBool,
    pub fail_accept: AtomicBool,
    pub fail_confirm: AtomicBool,
    next_id: AtomicU64,
    pub calls: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        })
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl EscrowGateway for MockGateway {
    async fn create_and_deposit(
        &self,
        _client_id: Uuid,
        _provider_wallet: &str,
        _provider_id: Uuid,
        _amount_wei: &BigDecimal,
        _category: &str,
    ) -> Result<EscrowCreated, ServiceError> {
        self.record("createJob");
        if self.fail_create.load(Ordering::Relaxed) {
            return Err(ServiceError::ExternalCall {
                call: "createJob",
                reason: "transaction reverted".to_string(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(EscrowCreated {
            contract_job_id: id.to_string(),
            tx_hash: format!("0xc0ffee{:02x}", id),
        })
    }

    async fn accept_in_contract(
        &self,
        _provider_id: Uuid,
        contract_job_id: &str,
    ) -> Result<EscrowTx, ServiceError> {
        self.record("acceptJob");
        if self.fail_accept.load(Ordering::Relaxed) {
            return Err(ServiceError::ExternalCall {
                call: "acceptJob",
                reason: "transaction reverted".to_string(),
            });
        }
        Ok(EscrowTx {
            tx_hash: format!("0xacce97{}", contract_job_id),
        })
    }

    async fn confirm_completion(
        &self,
        _caller_id: Uuid,
        contract_job_id: &str,
    ) -> Result<Option<EscrowTx>, ServiceError> {
        self.record("confirmCompletion");
        if self.fail_confirm.load(Ordering::Relaxed) {
            return Err(ServiceError::ExternalCall {
                call: "confirmCompletion",
                reason: "transaction reverted".to_string(),
            });
        }
        Ok(Some(EscrowTx {
            tx_hash: format!("0xc04f19{}", contract_job_id),
        }))
    }

    async fn contract_job(&self, _contract_job_id: &str) -> Result<ContractJobView, ServiceError> {
        self.record("getJob");
        Ok(ContractJobView {
            client: "0x0000000000000000000000000000000000000001".to_string(),
            provider: "0x0000000000000000000000000000000000000002".to_string(),
            amount: wei("90000000000000000"),
            status: 1,
            client_confirmed: false,
            provider_confirmed: false,
        })
    }

    async fn wallet_balance(&self, _wallet_address: &str) -> Result<BigDecimal, ServiceError> {
        self.record("balance");
        Ok(wei("1000000000000000000"))
    }
}

/// Fan-out double that just remembers what was emitted and to whom.
#[derive(Default)]
pub struct RecordingFanout {
    events: Mutex<Vec<(Option<Uuid>, OutboundEvent)>>,
}

impl RecordingFanout {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(Option<Uuid>, OutboundEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.name())
            .collect()
    }
}

#[async_trait]
impl NotificationFanout for RecordingFanout {
    async fn notify_user(&self, user_id: Uuid, event: OutboundEvent) {
        self.events.lock().unwrap().push((Some(user_id), event));
    }

    async fn broadcast(&self, event: OutboundEvent) {
        self.events.lock().unwrap().push((None, event));
    }
}
