// services/proposal_service.rs
//
// Decides proposal outcomes (accept / counteroffer / reject), enforces
// single-provider-per-job assignment and the re-application cooldown.
// Assignments themselves are delegated to the settlement coordinator.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::marketdb::MarketStore,
    dtos::{eventdtos::*, marketdtos::*},
    models::marketmodel::*,
    service::{
        error::ServiceError,
        notification_service::NotificationFanout,
        settlement_service::SettlementService,
    },
    utils::currency::parse_wei,
};

pub const COOLDOWN_HOURS: i64 = 24;

/// Hours left on the re-application cooldown, reported as ceil(24 - elapsed).
/// `None` once the window has passed.
pub fn cooldown_remaining(rejected_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
    let elapsed_minutes = (now - rejected_at).num_minutes();
    let remaining_minutes = COOLDOWN_HOURS * 60 - elapsed_minutes;
    if remaining_minutes <= 0 {
        None
    } else {
        Some((remaining_minutes + 59) / 60)
    }
}

pub struct ProposalService {
    store: Arc<dyn MarketStore>,
    settlement: Arc<SettlementService>,
    fanout: Arc<dyn NotificationFanout>,
}

impl ProposalService {
    pub fn new(
        store: Arc<dyn MarketStore>,
        settlement: Arc<SettlementService>,
        fanout: Arc<dyn NotificationFanout>,
    ) -> Self {
        Self {
            store,
            settlement,
            fanout,
        }
    }

    pub async fn submit_proposal(&self, body: SubmitProposalDto) -> Result<Proposal, ServiceError> {
        let job = self
            .store
            .get_job(body.job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(body.job_id))?;
        let provider = self
            .store
            .get_user(body.provider_id)
            .await?
            .ok_or(ServiceError::UserNotFound(body.provider_id))?;

        if job.client_id == provider.id {
            return Err(ServiceError::SelfProposal);
        }
        if job.provider_id.is_some() {
            return Err(ServiceError::ProviderAlreadyAssigned(job.id));
        }
        if job.status != JobStatus::Pending {
            return Err(ServiceError::JobNotPending(job.id));
        }

        if let Some(existing) = self.store.find_proposal_for(job.id, provider.id).await? {
            if existing.status.is_active() {
                return Err(ServiceError::DuplicateActiveProposal);
            }
            if existing.status == ProposalStatus::CounterofferRejected {
                if let Some(rejected_at) = existing.rejected_at {
                    if let Some(remaining_hours) = cooldown_remaining(rejected_at, Utc::now()) {
                        return Err(ServiceError::ProposalCooldown { remaining_hours });
                    }
                }
            }
            // Cooldown expired (or the old proposal was force-rejected): a
            // fresh row, not a revival of the old one.
        }

        let proposed_amount = body
            .proposed_amount_wei
            .as_deref()
            .map(parse_wei)
            .transpose()
            .map_err(ServiceError::Validation)?;

        let proposal = self
            .store
            .create_proposal(job.id, provider.id, body.message, proposed_amount)
            .await?;

        tracing::info!(
            proposal_id = %proposal.id,
            job_id = %job.id,
            provider = %provider.id,
            "Proposal submitted"
        );

        self.fanout
            .notify_user(
                job.client_id,
                OutboundEvent::NewProposal(NewProposalPayload {
                    job_id: job.id,
                    job_title: job.title.clone(),
                    proposal_id: proposal.id,
                    provider: ProviderSummary {
                        id: provider.id,
                        email: provider.email,
                        provider_score: provider.provider_score,
                    },
                    message: proposal.message.clone(),
                }),
            )
            .await;

        Ok(proposal)
    }

    /// Client action on a received proposal: accept it outright or answer with
    /// a counter-offer.
    pub async fn resolve_proposal(
        &self,
        proposal_id: Uuid,
        body: ProposalActionDto,
    ) -> Result<AssignmentResponseDto, ServiceError> {
        match body.action {
            ProposalAction::Counteroffer => {
                let amount = body.counter_offer_wei.as_deref().ok_or_else(|| {
                    ServiceError::Validation("Counter-offer amount is required".to_string())
                })?;
                let proposal = self
                    .counter_offer(proposal_id, body.caller_id, amount)
                    .await?;
                let job = self
                    .store
                    .get_job(proposal.job_id)
                    .await?
                    .ok_or(ServiceError::JobNotFound(proposal.job_id))?;
                Ok(AssignmentResponseDto { job, proposal })
            }
            ProposalAction::Accept => self.accept_proposal_directly(proposal_id, body.caller_id).await,
        }
    }

    /// Counter a pending proposal with a different price.
    pub async fn counter_offer(
        &self,
        proposal_id: Uuid,
        caller_id: Uuid,
        amount_wei: &str,
    ) -> Result<Proposal, ServiceError> {
        let (job, proposal) = self.load_for_client_action(proposal_id, caller_id).await?;

        if proposal.status != ProposalStatus::Pending {
            return Err(ServiceError::ProposalNotPending(proposal.id));
        }

        let amount = parse_wei(amount_wei).map_err(ServiceError::Validation)?;
        let original_amount = proposal
            .proposed_amount
            .clone()
            .unwrap_or_else(|| job.amount.clone());

        let updated = self.store.set_counter_offer(proposal.id, &amount).await?;

        tracing::info!(
            proposal_id = %updated.id,
            job_id = %job.id,
            "Counter-offer sent to provider"
        );

        self.fanout
            .notify_user(
                updated.provider_id,
                OutboundEvent::ProposalCounteroffered(ProposalCounterofferedPayload {
                    proposal_id: updated.id,
                    job_id: job.id,
                    job_title: job.title.clone(),
                    counter_offer: amount.to_string(),
                    original_amount: original_amount.to_string(),
                }),
            )
            .await;

        Ok(updated)
    }

    /// Provider response to the client's counter-offer. Reject starts the
    /// cooldown; accept runs the assignment protocol at the countered price.
    pub async fn respond_to_counter_offer(
        &self,
        proposal_id: Uuid,
        body: CounterOfferResponseDto,
    ) -> Result<AssignmentResponseDto, ServiceError> {
        let proposal = self
            .store
            .get_proposal(proposal_id)
            .await?
            .ok_or(ServiceError::ProposalNotFound(proposal_id))?;
        if proposal.provider_id != body.caller_id {
            return Err(ServiceError::NotProposalOwner(body.caller_id, proposal_id));
        }
        if proposal.status != ProposalStatus::Counteroffered {
            return Err(ServiceError::ProposalNotCountered(proposal_id));
        }
        let job = self
            .store
            .get_job(proposal.job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(proposal.job_id))?;
        let provider = self
            .store
            .get_user(proposal.provider_id)
            .await?
            .ok_or(ServiceError::UserNotFound(proposal.provider_id))?;

        match body.action {
            CounterOfferResponse::Reject => {
                let updated = self
                    .store
                    .update_proposal_status(
                        proposal.id,
                        ProposalStatus::CounterofferRejected,
                        Some(Utc::now()),
                    )
                    .await?;

                tracing::info!(
                    proposal_id = %updated.id,
                    job_id = %job.id,
                    "Counter-offer rejected, cooldown started"
                );

                self.fanout
                    .notify_user(
                        job.client_id,
                        OutboundEvent::CounterofferRejected(CounterofferOutcomePayload {
                            proposal_id: updated.id,
                            job_id: job.id,
                            job_title: job.title.clone(),
                            provider: UserSummary {
                                id: provider.id,
                                email: provider.email,
                            },
                        }),
                    )
                    .await;

                Ok(AssignmentResponseDto {
                    job,
                    proposal: updated,
                })
            }
            CounterOfferResponse::Accept => {
                if job.status != JobStatus::Pending {
                    return Err(ServiceError::JobNotPending(job.id));
                }
                if job.provider_id.is_some() {
                    return Err(ServiceError::ProviderAlreadyAssigned(job.id));
                }

                // Counter-offer price wins; fall back the way the proposal
                // amount resolution always works.
                let final_amount = proposal
                    .counter_offer_amount
                    .clone()
                    .or_else(|| proposal.proposed_amount.clone())
                    .unwrap_or_else(|| job.amount.clone());

                let (updated_job, accepted) = self
                    .settlement
                    .assign_provider(&job, &proposal, final_amount)
                    .await?;

                self.fanout
                    .notify_user(
                        updated_job.client_id,
                        OutboundEvent::CounterofferAccepted(CounterofferOutcomePayload {
                            proposal_id: accepted.id,
                            job_id: updated_job.id,
                            job_title: updated_job.title.clone(),
                            provider: UserSummary {
                                id: provider.id,
                                email: provider.email,
                            },
                        }),
                    )
                    .await;

                Ok(AssignmentResponseDto {
                    job: updated_job,
                    proposal: accepted,
                })
            }
        }
    }

    /// Direct acceptance of a pending proposal at its proposed price (or the
    /// job's original amount when none was proposed). A counteroffered
    /// proposal must resolve through the provider's response first.
    pub async fn accept_proposal_directly(
        &self,
        proposal_id: Uuid,
        caller_id: Uuid,
    ) -> Result<AssignmentResponseDto, ServiceError> {
        let (job, proposal) = self.load_for_client_action(proposal_id, caller_id).await?;

        match proposal.status {
            ProposalStatus::Pending => {}
            ProposalStatus::Counteroffered => {
                return Err(ServiceError::CounterofferOutstanding(proposal.id));
            }
            _ => return Err(ServiceError::ProposalNotPending(proposal.id)),
        }

        let final_amount = proposal
            .proposed_amount
            .clone()
            .unwrap_or_else(|| job.amount.clone());

        let (updated_job, accepted) = self
            .settlement
            .assign_provider(&job, &proposal, final_amount.clone())
            .await?;

        self.fanout
            .notify_user(
                accepted.provider_id,
                OutboundEvent::ProposalAccepted(ProposalOutcomePayload {
                    proposal_id: accepted.id,
                    job_id: updated_job.id,
                    job_title: updated_job.title.clone(),
                    amount: Some(final_amount.to_string()),
                }),
            )
            .await;

        Ok(AssignmentResponseDto {
            job: updated_job,
            proposal: accepted,
        })
    }

    /// Shared guards for client-side actions on a proposal: the caller must
    /// own the job, and the job must still be open.
    async fn load_for_client_action(
        &self,
        proposal_id: Uuid,
        caller_id: Uuid,
    ) -> Result<(Job, Proposal), ServiceError> {
        let proposal = self
            .store
            .get_proposal(proposal_id)
            .await?
            .ok_or(ServiceError::ProposalNotFound(proposal_id))?;
        let job = self
            .store
            .get_job(proposal.job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(proposal.job_id))?;

        if job.client_id != caller_id {
            return Err(ServiceError::NotJobOwner(caller_id, job.id));
        }
        if job.status != JobStatus::Pending {
            return Err(ServiceError::JobNotPending(job.id));
        }
        if job.provider_id.is_some() {
            return Err(ServiceError::ProviderAlreadyAssigned(job.id));
        }

        Ok((job, proposal))
    }
}
