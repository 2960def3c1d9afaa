// services/settlement_service.rs
//
// Drives the job state machine (PENDING -> IN_PROGRESS -> COMPLETED) and the
// two-phase escrow handshake. Sole writer of contract_job_id, the approval
// flags, and both lifecycle transitions. The database never claims a state
// the contract has not confirmed: both escrow calls must succeed before any
// assignment row is written.
use bigdecimal::BigDecimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::marketdb::{JobFilter, MarketStore},
    dtos::{eventdtos::*, marketdtos::*},
    models::marketmodel::*,
    service::{
        error::ServiceError,
        escrow_gateway::EscrowGateway,
        notification_service::NotificationFanout,
    },
    utils::currency::{parse_wei, wei_to_eth_string},
};

pub struct SettlementService {
    store: Arc<dyn MarketStore>,
    escrow: Arc<dyn EscrowGateway>,
    fanout: Arc<dyn NotificationFanout>,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn MarketStore>,
        escrow: Arc<dyn EscrowGateway>,
        fanout: Arc<dyn NotificationFanout>,
    ) -> Self {
        Self {
            store,
            escrow,
            fanout,
        }
    }

    pub async fn create_job(&self, body: CreateJobDto) -> Result<Job, ServiceError> {
        let amount = parse_wei(&body.amount_wei).map_err(ServiceError::Validation)?;
        let client = self
            .store
            .get_user(body.client_id)
            .await?
            .ok_or(ServiceError::UserNotFound(body.client_id))?;

        let job = self
            .store
            .create_job(client.id, body.title, body.description, body.category, amount)
            .await?;

        tracing::info!(job_id = %job.id, client = %client.id, "Job created");

        self.fanout
            .broadcast(OutboundEvent::NewJobCreated(NewJobCreatedPayload {
                job_id: job.id,
                title: job.title.clone(),
                category: job.category.to_str().to_string(),
                amount: job.amount.to_string(),
                client: UserSummary {
                    id: client.id,
                    email: client.email,
                },
            }))
            .await;

        Ok(job)
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, ServiceError> {
        Ok(self.store.list_jobs(filter).await?)
    }

    pub async fn job_detail(&self, job_id: Uuid) -> Result<JobDetailDto, ServiceError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;
        let proposals = self.store.proposals_for_job(job_id).await?;
        let reviews = self.store.reviews_for_job(job_id).await?;
        Ok(JobDetailDto {
            job,
            proposals,
            reviews,
        })
    }

    /// Deletion is client-only and allowed only while the job is PENDING with
    /// no provider; proposals go with it (cascade).
    pub async fn delete_job(&self, job_id: Uuid, caller_id: Uuid) -> Result<(), ServiceError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;

        if job.client_id != caller_id {
            return Err(ServiceError::NotJobOwner(caller_id, job_id));
        }
        if job.status != JobStatus::Pending || job.provider_id.is_some() {
            return Err(ServiceError::JobNotDeletable(job_id));
        }

        // Conditional delete: the guard re-checks status in case an assignment
        // landed between the read above and this write.
        let removed = self.store.delete_job_if_pending(job_id).await?;
        if removed == 0 {
            return Err(ServiceError::JobNotDeletable(job_id));
        }

        tracing::info!(job_id = %job_id, "Job deleted");
        self.fanout
            .broadcast(OutboundEvent::JobDeleted(JobDeletedPayload { job_id }))
            .await;

        Ok(())
    }

    /// Assignment protocol, strictly ordered:
    ///   1. re-validate the job is still PENDING and unassigned;
    ///   2. create the contract job and deposit the client's funds;
    ///   3. provider-accept in the contract;
    ///   4. only after both contract calls succeed, commit the job patch,
    ///      the accepted proposal and the sibling rejections in one
    ///      conditional transaction;
    ///   5. broadcast the status change and notify affected providers.
    ///
    /// A step-2 failure aborts with nothing written. A step-3 failure leaves
    /// the job PENDING in the database (funds are on-chain; the caller is told
    /// to retry acceptance) rather than advancing past what the contract
    /// confirmed.
    pub async fn assign_provider(
        &self,
        job: &Job,
        proposal: &Proposal,
        final_amount: BigDecimal,
    ) -> Result<(Job, Proposal), ServiceError> {
        // Re-validate at call time; another proposal may have won in between.
        let current = self
            .store
            .get_job(job.id)
            .await?
            .ok_or(ServiceError::JobNotFound(job.id))?;
        if current.provider_id.is_some() {
            return Err(ServiceError::ProviderAlreadyAssigned(job.id));
        }
        if current.status != JobStatus::Pending {
            return Err(ServiceError::JobNotPending(job.id));
        }

        let provider = self
            .store
            .get_user(proposal.provider_id)
            .await?
            .ok_or(ServiceError::UserNotFound(proposal.provider_id))?;

        let created = self
            .escrow
            .create_and_deposit(
                current.client_id,
                &provider.wallet_address,
                provider.id,
                &final_amount,
                current.category.to_str(),
            )
            .await?;

        tracing::info!(
            job_id = %current.id,
            contract_job_id = %created.contract_job_id,
            "Escrow created and funded, requesting contract-side acceptance"
        );

        if let Err(e) = self
            .escrow
            .accept_in_contract(provider.id, &created.contract_job_id)
            .await
        {
            // Funds are locked on-chain but the contract job was never
            // accepted. The job stays PENDING; persisting IN_PROGRESS here
            // would claim a state the contract has not reached.
            tracing::error!(
                target: "settlement::reconcile",
                job_id = %current.id,
                contract_job_id = %created.contract_job_id,
                deposit_tx = %created.tx_hash,
                "Deposit succeeded but contract acceptance failed; retry acceptance"
            );
            return Err(ServiceError::ExternalCall {
                call: "acceptJob",
                reason: format!(
                    "funds deposited (contract job {}), acceptance failed: {}. Retry the acceptance.",
                    created.contract_job_id, e
                ),
            });
        }

        let committed = self
            .store
            .commit_assignment(
                current.id,
                proposal.id,
                provider.id,
                &final_amount,
                &created.contract_job_id,
                &created.tx_hash,
            )
            .await?;

        let updated_job = match committed {
            Some(job) => job,
            None => {
                // A concurrent acceptance won the conditional write. Our
                // deposit is now orphaned on-chain and needs out-of-band
                // reconciliation against the contract's refund path.
                tracing::error!(
                    target: "settlement::reconcile",
                    job_id = %current.id,
                    contract_job_id = %created.contract_job_id,
                    "Lost assignment race after depositing; on-chain deposit orphaned"
                );
                return Err(ServiceError::ProviderAlreadyAssigned(current.id));
            }
        };

        let accepted = self
            .store
            .get_proposal(proposal.id)
            .await?
            .ok_or(ServiceError::ProposalNotFound(proposal.id))?;

        tracing::info!(
            job_id = %updated_job.id,
            provider = %provider.id,
            "Job assigned, status pending -> in_progress"
        );

        self.fanout
            .broadcast(OutboundEvent::JobStatusChanged(JobStatusChangedPayload {
                job_id: updated_job.id,
                job_title: updated_job.title.clone(),
                old_status: JobStatus::Pending,
                new_status: JobStatus::InProgress,
                message: format!("Work on \"{}\" has started", updated_job.title),
            }))
            .await;

        // Tell the losing providers their proposals were closed out.
        let siblings = self.store.proposals_for_job(updated_job.id).await?;
        for sibling in siblings
            .iter()
            .filter(|p| p.id != accepted.id && p.status == ProposalStatus::Rejected)
        {
            self.fanout
                .notify_user(
                    sibling.provider_id,
                    OutboundEvent::ProposalRejected(ProposalOutcomePayload {
                        proposal_id: sibling.id,
                        job_id: updated_job.id,
                        job_title: updated_job.title.clone(),
                        amount: None,
                    }),
                )
                .await;
        }

        Ok((updated_job, accepted))
    }

    /// Dual-confirmation completion. Local approval state is authoritative for
    /// the state machine and the review flow; the on-chain mirror is
    /// best-effort and fund release stays chain-authoritative.
    pub async fn approve_completion(
        &self,
        job_id: Uuid,
        caller_id: Uuid,
    ) -> Result<ApprovalResponseDto, ServiceError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;

        if job.status != JobStatus::InProgress {
            return Err(ServiceError::JobNotInProgress(job_id));
        }
        let party = job
            .party_of(caller_id)
            .ok_or(ServiceError::NotAParticipant(caller_id, job_id))?;
        if job.approved_by(party) {
            return Err(ServiceError::AlreadyApproved);
        }

        // Best-effort on-chain mirror. A failure here is logged through the
        // observability hook and never blocks the local approval.
        let mut mirrored_tx = None;
        if let Some(contract_job_id) = job.contract_job_id.as_deref() {
            match self.escrow.confirm_completion(caller_id, contract_job_id).await {
                Ok(Some(tx)) => mirrored_tx = Some(tx.tx_hash),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        target: "settlement::mirror",
                        job_id = %job_id,
                        contract_job_id,
                        caller = %caller_id,
                        "On-chain confirmation failed, recording local approval anyway: {}", e
                    );
                }
            }
        }

        // Atomic set-flag-and-maybe-complete; re-reads the other party's flag
        // at write time so a concurrent approval is never lost.
        let updated = self
            .store
            .record_approval(job_id, party)
            .await?
            .ok_or(ServiceError::AlreadyApproved)?;

        let both_approved = updated.status == JobStatus::Completed;

        if both_approved {
            tracing::info!(job_id = %job_id, "Both parties approved, job completed");
            self.fanout
                .broadcast(OutboundEvent::JobStatusChanged(JobStatusChangedPayload {
                    job_id: updated.id,
                    job_title: updated.title.clone(),
                    old_status: JobStatus::InProgress,
                    new_status: JobStatus::Completed,
                    message: format!("\"{}\" was completed by both parties", updated.title),
                }))
                .await;
        } else {
            let awaiting = match party {
                Party::Client => updated.provider_id.unwrap_or(updated.client_id),
                Party::Provider => updated.client_id,
            };
            let progress = JobApprovalProgressPayload {
                job_id: updated.id,
                job_title: updated.title.clone(),
                approved_by: caller_id,
                awaiting,
            };
            self.fanout
                .broadcast(OutboundEvent::JobApprovalProgress(progress.clone()))
                .await;
            self.fanout
                .notify_user(awaiting, OutboundEvent::JobApprovalProgress(progress))
                .await;
        }

        Ok(ApprovalResponseDto {
            job: updated,
            both_approved,
            mirrored_tx,
        })
    }

    /// Participant-only readback of the contract-side job state.
    pub async fn contract_status(
        &self,
        job_id: Uuid,
        caller_id: Uuid,
    ) -> Result<ContractStatusDto, ServiceError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;
        if job.party_of(caller_id).is_none() {
            return Err(ServiceError::NotAParticipant(caller_id, job_id));
        }
        let contract_job_id = job
            .contract_job_id
            .clone()
            .ok_or(ServiceError::NoContractAttached(job_id))?;

        let view = self.escrow.contract_job(&contract_job_id).await?;
        let both = view.client_confirmed && view.provider_confirmed;
        let message = if both {
            "Both parties have confirmed; escrow funds have been released to the provider."
        } else if view.client_confirmed {
            "The client has confirmed. Awaiting the provider's confirmation."
        } else if view.provider_confirmed {
            "The provider has confirmed. Awaiting the client's confirmation."
        } else {
            "Neither party has confirmed yet."
        };

        Ok(ContractStatusDto {
            contract_job_id,
            client_confirmed: view.client_confirmed,
            provider_confirmed: view.provider_confirmed,
            both_confirmed: both,
            contract_status: view.status,
            amount_wei: view.amount.to_string(),
            amount_eth: wei_to_eth_string(&view.amount),
            client: view.client,
            provider: view.provider,
            message: message.to_string(),
        })
    }
}
