//! Feedback recording for finished queries.
//!
//! Independent of the streaming path: one feedback record per query,
//! resubmission overwrites, a comment is only accepted alongside a rating.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use dealroom_core::{defaults, Error, Feedback, FeedbackRating, QueryRepository, Result};

/// Records helpful/not-helpful ratings against stored queries.
pub struct FeedbackRecorder {
    queries: Arc<dyn QueryRepository>,
}

impl FeedbackRecorder {
    pub fn new(queries: Arc<dyn QueryRepository>) -> Self {
        Self { queries }
    }

    /// Submit, overwrite, or clear the feedback for a query.
    ///
    /// - `Some(rating)` stores (or overwrites) the record; resubmitting the
    ///   same rating is idempotent, last write wins.
    /// - `None` rating with no comment clears any existing record
    ///   (toggle-off).
    /// - A comment without a rating is rejected: the rating is required
    ///   context for the comment.
    pub async fn submit(
        &self,
        query_id: Uuid,
        rating: Option<FeedbackRating>,
        comment: Option<String>,
    ) -> Result<()> {
        let comment = comment.filter(|c| !c.trim().is_empty());

        let Some(rating) = rating else {
            if comment.is_some() {
                return Err(Error::Validation(
                    "a comment requires a rating".to_string(),
                ));
            }
            debug!(query_id = %query_id, "Clearing feedback");
            return self.queries.clear_feedback(query_id).await;
        };

        if let Some(ref c) = comment {
            if c.chars().count() > defaults::COMMENT_MAX_CHARS {
                return Err(Error::Validation(format!(
                    "comment exceeds {} characters",
                    defaults::COMMENT_MAX_CHARS
                )));
            }
        }

        self.queries
            .set_feedback(
                query_id,
                Feedback {
                    rating,
                    comment,
                    updated_at: Utc::now(),
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Repository-backed behavior is covered by the integration tests in
    // tests/feedback_test.rs; here we only check pure validation.

    struct RejectingRepo;

    #[async_trait::async_trait]
    impl QueryRepository for RejectingRepo {
        async fn insert_question(&self, _req: dealroom_core::NewQuery) -> Result<()> {
            unreachable!()
        }
        async fn finalize(&self, _id: Uuid, _outcome: dealroom_core::QueryOutcome) -> Result<()> {
            unreachable!()
        }
        async fn get(&self, id: Uuid) -> Result<dealroom_core::Query> {
            Err(Error::QueryNotFound(id))
        }
        async fn list(
            &self,
            _room_id: Uuid,
            _cursor: Option<chrono::DateTime<Utc>>,
            _limit: usize,
        ) -> Result<dealroom_core::QueryPage> {
            unreachable!()
        }
        async fn delete(&self, _id: Uuid) -> Result<()> {
            unreachable!()
        }
        async fn delete_bulk(&self, _ids: &[Uuid]) -> Result<u64> {
            unreachable!()
        }
        async fn set_feedback(&self, _id: Uuid, _feedback: Feedback) -> Result<()> {
            panic!("validation must reject before the repository is touched")
        }
        async fn clear_feedback(&self, _id: Uuid) -> Result<()> {
            panic!("validation must reject before the repository is touched")
        }
    }

    #[tokio::test]
    async fn test_comment_without_rating_rejected_before_store() {
        let recorder = FeedbackRecorder::new(Arc::new(RejectingRepo));
        let err = recorder
            .submit(Uuid::new_v4(), None, Some("great answer".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_overlong_comment_rejected_before_store() {
        let recorder = FeedbackRecorder::new(Arc::new(RejectingRepo));
        let err = recorder
            .submit(
                Uuid::new_v4(),
                Some(FeedbackRating::Helpful),
                Some("x".repeat(2001)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
