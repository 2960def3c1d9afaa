// db/marketdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, Error};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::marketmodel::*;

/// Filters for the job listing; all optional, combined with AND.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub category: Option<Specialty>,
    pub client_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
}

/// Repository seam consumed by the services. Implemented on `DBClient` for
/// Postgres and on an in-memory store for service tests.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn create_user(
        &self,
        email: String,
        wallet_address: String,
        wallet_key: Option<String>,
    ) -> Result<User, Error>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, Error>;

    async fn list_users(&self) -> Result<Vec<User>, Error>;

    async fn create_job(
        &self,
        client_id: Uuid,
        title: String,
        description: String,
        category: Specialty,
        amount: BigDecimal,
    ) -> Result<Job, Error>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, Error>;

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, Error>;

    /// Delete a job only while it is still pending and unassigned. Returns the
    /// number of rows removed; 0 means the guard refused the delete.
    async fn delete_job_if_pending(&self, job_id: Uuid) -> Result<u64, Error>;

    /// Commit the assignment protocol outcome in one transaction: patch the
    /// job (provider, in_progress, final amount, contract reference), mark the
    /// winning proposal accepted and force all live siblings to rejected. The
    /// job update is conditional on `status = pending AND provider_id IS NULL`;
    /// `None` means another assignment won the race and nothing was written.
    async fn commit_assignment(
        &self,
        job_id: Uuid,
        proposal_id: Uuid,
        provider_id: Uuid,
        amount: &BigDecimal,
        contract_job_id: &str,
        tx_hash: &str,
    ) -> Result<Option<Job>, Error>;

    /// Atomically record one party's completion approval, flipping the job to
    /// completed in the same write when the other party has already approved.
    /// Guarded on `status = in_progress` and the caller's flag still false;
    /// `None` means the guard refused (lost race or duplicate approval).
    async fn record_approval(&self, job_id: Uuid, party: Party) -> Result<Option<Job>, Error>;

    async fn create_proposal(
        &self,
        job_id: Uuid,
        provider_id: Uuid,
        message: Option<String>,
        proposed_amount: Option<BigDecimal>,
    ) -> Result<Proposal, Error>;

    async fn get_proposal(&self, proposal_id: Uuid) -> Result<Option<Proposal>, Error>;

    /// Latest proposal by this provider for this job, if any.
    async fn find_proposal_for(
        &self,
        job_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<Proposal>, Error>;

    async fn proposals_for_job(&self, job_id: Uuid) -> Result<Vec<Proposal>, Error>;

    async fn set_counter_offer(
        &self,
        proposal_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Proposal, Error>;

    async fn update_proposal_status(
        &self,
        proposal_id: Uuid,
        status: ProposalStatus,
        rejected_at: Option<DateTime<Utc>>,
    ) -> Result<Proposal, Error>;

    async fn create_review(
        &self,
        job_id: Uuid,
        reviewer_id: Uuid,
        reviewed_user_id: Uuid,
        rating: i32,
        comment: Option<String>,
        role: ReviewRole,
    ) -> Result<Review, Error>;

    async fn find_review(
        &self,
        job_id: Uuid,
        reviewer_id: Uuid,
        role: ReviewRole,
    ) -> Result<Option<Review>, Error>;

    async fn reviews_for_job(&self, job_id: Uuid) -> Result<Vec<Review>, Error>;

    /// Unweighted mean over full history for the (user, role) pair.
    async fn average_rating(
        &self,
        reviewed_user_id: Uuid,
        role: ReviewRole,
    ) -> Result<Option<f64>, Error>;

    async fn update_user_score(
        &self,
        user_id: Uuid,
        role: ReviewRole,
        value: f64,
    ) -> Result<(), Error>;
}

#[async_trait]
impl MarketStore for DBClient {
    async fn create_user(
        &self,
        email: String,
        wallet_address: String,
        wallet_key: Option<String>,
    ) -> Result<User, Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, wallet_address, wallet_key)
            VALUES ($1, $2, $3)
            RETURNING id, email, wallet_address, wallet_key,
                      client_score, provider_score, created_at
            "#,
        )
        .bind(email)
        .bind(wallet_address)
        .bind(wallet_key)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, wallet_address, wallet_key,
                   client_score, provider_score, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>, Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, wallet_address, wallet_key,
                   client_score, provider_score, created_at
            FROM users
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn create_job(
        &self,
        client_id: Uuid,
        title: String,
        description: String,
        category: Specialty,
        amount: BigDecimal,
    ) -> Result<Job, Error> {
        sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (client_id, title, description, category, amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, client_id, provider_id, title, description, category,
                      amount, status, contract_job_id, tx_hash,
                      client_approved, provider_approved, created_at, updated_at
            "#,
        )
        .bind(client_id)
        .bind(title)
        .bind(description)
        .bind(category)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, Error> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, client_id, provider_id, title, description, category,
                   amount, status, contract_job_id, tx_hash,
                   client_approved, provider_approved, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, Error> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, client_id, provider_id, title, description, category,
                   amount, status, contract_job_id, tx_hash,
                   client_approved, provider_approved, created_at, updated_at
            FROM jobs
            WHERE ($1::job_status IS NULL OR status = $1)
              AND ($2::specialty IS NULL OR category = $2)
              AND ($3::uuid IS NULL OR client_id = $3)
              AND ($4::uuid IS NULL OR provider_id = $4)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.status)
        .bind(filter.category)
        .bind(filter.client_id)
        .bind(filter.provider_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn delete_job_if_pending(&self, job_id: Uuid) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE id = $1 AND status = 'pending' AND provider_id IS NULL
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn commit_assignment(
        &self,
        job_id: Uuid,
        proposal_id: Uuid,
        provider_id: Uuid,
        amount: &BigDecimal,
        contract_job_id: &str,
        tx_hash: &str,
    ) -> Result<Option<Job>, Error> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET provider_id = $2,
                status = 'in_progress',
                amount = $3,
                contract_job_id = $4,
                tx_hash = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND provider_id IS NULL
            RETURNING id, client_id, provider_id, title, description, category,
                      amount, status, contract_job_id, tx_hash,
                      client_approved, provider_approved, created_at, updated_at
            "#,
        )
        .bind(job_id)
        .bind(provider_id)
        .bind(amount)
        .bind(contract_job_id)
        .bind(tx_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let job = match job {
            Some(job) => job,
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        sqlx::query("UPDATE proposals SET status = 'accepted' WHERE id = $1")
            .bind(proposal_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE proposals
            SET status = 'rejected'
            WHERE job_id = $1 AND id <> $2 AND status NOT IN ('accepted', 'rejected')
            "#,
        )
        .bind(job_id)
        .bind(proposal_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(job))
    }

    async fn record_approval(&self, job_id: Uuid, party: Party) -> Result<Option<Job>, Error> {
        let sql = match party {
            Party::Client => {
                r#"
                UPDATE jobs
                SET client_approved = TRUE,
                    status = CASE WHEN provider_approved THEN 'completed'::job_status
                                  ELSE status END,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'in_progress' AND client_approved = FALSE
                RETURNING id, client_id, provider_id, title, description, category,
                          amount, status, contract_job_id, tx_hash,
                          client_approved, provider_approved, created_at, updated_at
                "#
            }
            Party::Provider => {
                r#"
                UPDATE jobs
                SET provider_approved = TRUE,
                    status = CASE WHEN client_approved THEN 'completed'::job_status
                                  ELSE status END,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'in_progress' AND provider_approved = FALSE
                RETURNING id, client_id, provider_id, title, description, category,
                          amount, status, contract_job_id, tx_hash,
                          client_approved, provider_approved, created_at, updated_at
                "#
            }
        };

        sqlx::query_as::<_, Job>(sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_proposal(
        &self,
        job_id: Uuid,
        provider_id: Uuid,
        message: Option<String>,
        proposed_amount: Option<BigDecimal>,
    ) -> Result<Proposal, Error> {
        sqlx::query_as::<_, Proposal>(
            r#"
            INSERT INTO proposals (job_id, provider_id, message, proposed_amount)
            VALUES ($1, $2, $3, $4)
            RETURNING id, job_id, provider_id, message, proposed_amount,
                      counter_offer_amount, status, rejected_at, created_at
            "#,
        )
        .bind(job_id)
        .bind(provider_id)
        .bind(message)
        .bind(proposed_amount)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_proposal(&self, proposal_id: Uuid) -> Result<Option<Proposal>, Error> {
        sqlx::query_as::<_, Proposal>(
            r#"
            SELECT id, job_id, provider_id, message, proposed_amount,
                   counter_offer_amount, status, rejected_at, created_at
            FROM proposals
            WHERE id = $1
            "#,
        )
        .bind(proposal_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_proposal_for(
        &self,
        job_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<Proposal>, Error> {
        sqlx::query_as::<_, Proposal>(
            r#"
            SELECT id, job_id, provider_id, message, proposed_amount,
                   counter_offer_amount, status, rejected_at, created_at
            FROM proposals
            WHERE job_id = $1 AND provider_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn proposals_for_job(&self, job_id: Uuid) -> Result<Vec<Proposal>, Error> {
        sqlx::query_as::<_, Proposal>(
            r#"
            SELECT id, job_id, provider_id, message, proposed_amount,
                   counter_offer_amount, status, rejected_at, created_at
            FROM proposals
            WHERE job_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn set_counter_offer(
        &self,
        proposal_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Proposal, Error> {
        sqlx::query_as::<_, Proposal>(
            r#"
            UPDATE proposals
            SET counter_offer_amount = $2, status = 'counteroffered'
            WHERE id = $1
            RETURNING id, job_id, provider_id, message, proposed_amount,
                      counter_offer_amount, status, rejected_at, created_at
            "#,
        )
        .bind(proposal_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_proposal_status(
        &self,
        proposal_id: Uuid,
        status: ProposalStatus,
        rejected_at: Option<DateTime<Utc>>,
    ) -> Result<Proposal, Error> {
        sqlx::query_as::<_, Proposal>(
            r#"
            UPDATE proposals
            SET status = $2, rejected_at = COALESCE($3, rejected_at)
            WHERE id = $1
            RETURNING id, job_id, provider_id, message, proposed_amount,
                      counter_offer_amount, status, rejected_at, created_at
            "#,
        )
        .bind(proposal_id)
        .bind(status)
        .bind(rejected_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn create_review(
        &self,
        job_id: Uuid,
        reviewer_id: Uuid,
        reviewed_user_id: Uuid,
        rating: i32,
        comment: Option<String>,
        role: ReviewRole,
    ) -> Result<Review, Error> {
        sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (job_id, reviewer_id, reviewed_user_id, rating, comment, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, job_id, reviewer_id, reviewed_user_id, rating, comment,
                      role, created_at
            "#,
        )
        .bind(job_id)
        .bind(reviewer_id)
        .bind(reviewed_user_id)
        .bind(rating)
        .bind(comment)
        .bind(role)
        .fetch_one(&self.pool)
        .await
    }

    async fn find_review(
        &self,
        job_id: Uuid,
        reviewer_id: Uuid,
        role: ReviewRole,
    ) -> Result<Option<Review>, Error> {
        sqlx::query_as::<_, Review>(
            r#"
            SELECT id, job_id, reviewer_id, reviewed_user_id, rating, comment,
                   role, created_at
            FROM reviews
            WHERE job_id = $1 AND reviewer_id = $2 AND role = $3
            "#,
        )
        .bind(job_id)
        .bind(reviewer_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await
    }

    async fn reviews_for_job(&self, job_id: Uuid) -> Result<Vec<Review>, Error> {
        sqlx::query_as::<_, Review>(
            r#"
            SELECT id, job_id, reviewer_id, reviewed_user_id, rating, comment,
                   role, created_at
            FROM reviews
            WHERE job_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn average_rating(
        &self,
        reviewed_user_id: Uuid,
        role: ReviewRole,
    ) -> Result<Option<f64>, Error> {
        sqlx::query_scalar::<_, Option<f64>>(
            r#"
            SELECT AVG(rating)::DOUBLE PRECISION
            FROM reviews
            WHERE reviewed_user_id = $1 AND role = $2
            "#,
        )
        .bind(reviewed_user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_user_score(
        &self,
        user_id: Uuid,
        role: ReviewRole,
        value: f64,
    ) -> Result<(), Error> {
        let sql = match role {
            // CLIENT_TO_PROVIDER ratings feed the provider score.
            ReviewRole::ClientToProvider => "UPDATE users SET provider_score = $2 WHERE id = $1",
            ReviewRole::ProviderToClient => "UPDATE users SET client_score = $2 WHERE id = $1",
        };

        sqlx::query(sql)
            .bind(user_id)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
