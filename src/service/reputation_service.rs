// services/reputation_service.rs
//
// Review intake and rolling score recomputation. Scores are the unweighted
// arithmetic mean over full history for the (user, role) pair: CLIENT_TO_PROVIDER
// ratings feed provider_score, PROVIDER_TO_CLIENT ratings feed client_score.
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::marketdb::MarketStore,
    dtos::marketdtos::SubmitReviewDto,
    models::marketmodel::*,
    service::error::ServiceError,
};

pub struct ReputationService {
    store: Arc<dyn MarketStore>,
}

impl ReputationService {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    pub async fn submit_review(&self, body: SubmitReviewDto) -> Result<Review, ServiceError> {
        if !(1..=5).contains(&body.rating) {
            return Err(ServiceError::InvalidRating(body.rating));
        }

        let job = self
            .store
            .get_job(body.job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(body.job_id))?;
        if job.status != JobStatus::Completed {
            return Err(ServiceError::JobNotCompleted(job.id));
        }

        // The reviewer and the reviewed user must be the two job participants,
        // on the sides the role claims.
        let valid_pairing = match body.role {
            ReviewRole::ClientToProvider => {
                body.reviewer_id == job.client_id && Some(body.reviewed_user_id) == job.provider_id
            }
            ReviewRole::ProviderToClient => {
                Some(body.reviewer_id) == job.provider_id && body.reviewed_user_id == job.client_id
            }
        };
        if !valid_pairing {
            return Err(ServiceError::NotAParticipant(body.reviewer_id, job.id));
        }

        if self
            .store
            .find_review(job.id, body.reviewer_id, body.role)
            .await?
            .is_some()
        {
            return Err(ServiceError::DuplicateReview);
        }

        let review = match self
            .store
            .create_review(
                job.id,
                body.reviewer_id,
                body.reviewed_user_id,
                body.rating,
                body.comment,
                body.role,
            )
            .await
        {
            Ok(review) => review,
            // The unique index is the backstop for a concurrent duplicate.
            Err(e) if is_unique_violation(&e) => return Err(ServiceError::DuplicateReview),
            Err(e) => return Err(e.into()),
        };

        self.recompute_score(body.reviewed_user_id, body.role).await?;

        tracing::info!(
            review_id = %review.id,
            job_id = %job.id,
            reviewed_user = %body.reviewed_user_id,
            "Review recorded, score recomputed"
        );

        Ok(review)
    }

    async fn recompute_score(&self, user_id: Uuid, role: ReviewRole) -> Result<(), ServiceError> {
        if let Some(mean) = self.store.average_rating(user_id, role).await? {
            self.store.update_user_score(user_id, role, mean).await?;
        }
        Ok(())
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::marketdb::MarketStore;
    use crate::service::test_support::*;

    fn review_dto(job: &Job, rating: i32, role: ReviewRole) -> SubmitReviewDto {
        let (reviewer_id, reviewed_user_id) = match role {
            ReviewRole::ClientToProvider => (job.client_id, job.provider_id.unwrap()),
            ReviewRole::ProviderToClient => (job.provider_id.unwrap(), job.client_id),
        };
        SubmitReviewDto {
            job_id: job.id,
            reviewer_id,
            reviewed_user_id,
            rating,
            comment: Some("solid work".to_string()),
            role,
        }
    }

    /// Drive a job through assignment so reviews have a second participant;
    /// completion is optional.
    async fn assigned_job(h: &TestHarness, client: &User, provider: &User, complete: bool) -> Job {
        let job = h
            .store
            .create_job(
                client.id,
                "Paint the fence".to_string(),
                "Two coats, weatherproof".to_string(),
                Specialty::Painting,
                wei("100000000000000000"),
            )
            .await
            .unwrap();
        let proposal = h
            .store
            .create_proposal(job.id, provider.id, None, None)
            .await
            .unwrap();
        h.store
            .commit_assignment(
                job.id,
                proposal.id,
                provider.id,
                &wei("100000000000000000"),
                "7",
                "0xabc",
            )
            .await
            .unwrap()
            .unwrap();
        if complete {
            h.store.record_approval(job.id, Party::Client).await.unwrap();
            h.store.record_approval(job.id, Party::Provider).await.unwrap();
        }
        h.store.job(job.id)
    }

    #[tokio::test]
    async fn reviews_are_gated_on_completion() {
        let h = harness();
        let client = h.store.seed_user("client@example.com");
        let provider = h.store.seed_user("provider@example.com");

        let in_progress = assigned_job(&h, &client, &provider, false).await;
        let err = h
            .reputation
            .submit_review(review_dto(&in_progress, 5, ReviewRole::ClientToProvider))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::JobNotCompleted(_)));

        let completed = assigned_job(&h, &client, &provider, true).await;
        let review = h
            .reputation
            .submit_review(review_dto(&completed, 5, ReviewRole::ClientToProvider))
            .await
            .unwrap();
        assert_eq!(review.rating, 5);
        assert_eq!(h.store.user(provider.id).provider_score, 5.0);
    }

    #[tokio::test]
    async fn score_is_the_exact_mean_over_full_history() {
        let h = harness();
        let client = h.store.seed_user("client@example.com");
        let provider = h.store.seed_user("provider@example.com");

        let first = assigned_job(&h, &client, &provider, true).await;
        let second = assigned_job(&h, &client, &provider, true).await;
        let third = assigned_job(&h, &client, &provider, true).await;

        h.reputation
            .submit_review(review_dto(&first, 5, ReviewRole::ClientToProvider))
            .await
            .unwrap();
        h.reputation
            .submit_review(review_dto(&second, 4, ReviewRole::ClientToProvider))
            .await
            .unwrap();
        h.reputation
            .submit_review(review_dto(&third, 3, ReviewRole::ClientToProvider))
            .await
            .unwrap();

        assert_eq!(h.store.user(provider.id).provider_score, 4.0);
        // The other direction stays untouched.
        assert_eq!(h.store.user(provider.id).client_score, 0.0);

        // Provider-to-client ratings feed the client score instead.
        h.reputation
            .submit_review(review_dto(&first, 2, ReviewRole::ProviderToClient))
            .await
            .unwrap();
        assert_eq!(h.store.user(client.id).client_score, 2.0);
        assert_eq!(h.store.user(client.id).provider_score, 0.0);
    }

    #[tokio::test]
    async fn duplicate_and_invalid_reviews_are_refused() {
        let h = harness();
        let client = h.store.seed_user("client@example.com");
        let provider = h.store.seed_user("provider@example.com");
        let outsider = h.store.seed_user("outsider@example.com");

        let job = assigned_job(&h, &client, &provider, true).await;

        let err = h
            .reputation
            .submit_review(review_dto(&job, 6, ReviewRole::ClientToProvider))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRating(6)));

        h.reputation
            .submit_review(review_dto(&job, 4, ReviewRole::ClientToProvider))
            .await
            .unwrap();
        let err = h
            .reputation
            .submit_review(review_dto(&job, 4, ReviewRole::ClientToProvider))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateReview));

        // An outsider cannot review, even with a plausible role.
        let mut dto = review_dto(&job, 4, ReviewRole::ProviderToClient);
        dto.reviewer_id = outsider.id;
        let err = h.reputation.submit_review(dto).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotAParticipant(_, _)));
    }
}
