//! In-memory query repository: attributed questions, finalize-once
//! semantics, cursor-paginated history, and feedback storage.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use dealroom_core::{
    Error, Feedback, NewQuery, Query, QueryOutcome, QueryPage, QueryRepository, Result,
};

/// In-memory [`QueryRepository`] implementation.
///
/// All mutation goes through the executor/recorder that owns the record;
/// the store only enforces the invariants (finalize exactly once, feedback
/// requires an existing query).
#[derive(Default)]
pub struct InMemoryQueryStore {
    inner: RwLock<HashMap<Uuid, Query>>,
}

impl InMemoryQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored queries (test observability).
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl QueryRepository for InMemoryQueryStore {
    async fn insert_question(&self, req: NewQuery) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.contains_key(&req.id) {
            return Err(Error::Conflict(format!("query {} already exists", req.id)));
        }
        inner.insert(
            req.id,
            Query {
                id: req.id,
                room_id: req.room_id,
                question: req.question,
                answer: None,
                answer_type: None,
                citations: Vec::new(),
                metrics: None,
                feedback: None,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn finalize(&self, id: Uuid, outcome: QueryOutcome) -> Result<()> {
        let mut inner = self.inner.write().await;
        let query = inner.get_mut(&id).ok_or(Error::QueryNotFound(id))?;

        if query.answer_type.is_some() {
            return Err(Error::Conflict(format!("query {} already finalized", id)));
        }

        query.answer = outcome.answer;
        query.answer_type = Some(outcome.answer_type);
        query.citations = outcome.citations;
        query.metrics = Some(outcome.metrics);
        debug!(query_id = %id, "Query finalized");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Query> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::QueryNotFound(id))
    }

    async fn list(
        &self,
        room_id: Uuid,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<QueryPage> {
        let inner = self.inner.read().await;
        let mut queries: Vec<Query> = inner
            .values()
            .filter(|q| q.room_id == room_id)
            .filter(|q| cursor.map(|c| q.created_at < c).unwrap_or(true))
            .cloned()
            .collect();

        // Newest first; id is a tiebreak for identical timestamps
        queries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let has_more = queries.len() > limit;
        queries.truncate(limit);
        let next_cursor = if has_more {
            queries.last().map(|q| q.created_at)
        } else {
            None
        };

        Ok(QueryPage {
            queries,
            next_cursor,
        })
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.inner
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::QueryNotFound(id))
    }

    async fn delete_bulk(&self, ids: &[Uuid]) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut removed = 0;
        for id in ids {
            if inner.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn set_feedback(&self, id: Uuid, feedback: Feedback) -> Result<()> {
        let mut inner = self.inner.write().await;
        let query = inner.get_mut(&id).ok_or(Error::QueryNotFound(id))?;
        query.feedback = Some(feedback);
        Ok(())
    }

    async fn clear_feedback(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let query = inner.get_mut(&id).ok_or(Error::QueryNotFound(id))?;
        query.feedback = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealroom_core::{new_v7, AnswerType, QueryMetrics};

    fn new_query(room_id: Uuid) -> NewQuery {
        NewQuery {
            id: new_v7(),
            room_id,
            question: "What is the ARR growth rate?".to_string(),
        }
    }

    fn grounded_outcome() -> QueryOutcome {
        QueryOutcome {
            answer: Some("ARR grew 45% YoY".to_string()),
            answer_type: AnswerType::Grounded,
            citations: Vec::new(),
            metrics: QueryMetrics::default(),
        }
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = InMemoryQueryStore::new();
        let req = new_query(Uuid::new_v4());
        let id = req.id;

        store.insert_question(req).await.unwrap();
        let query = store.get(id).await.unwrap();
        assert_eq!(query.question, "What is the ARR growth rate?");
        assert!(query.answer.is_none());
        assert!(query.answer_type.is_none());
        assert!(!query.is_final());
    }

    #[tokio::test]
    async fn test_finalize_exactly_once() {
        let store = InMemoryQueryStore::new();
        let req = new_query(Uuid::new_v4());
        let id = req.id;
        store.insert_question(req).await.unwrap();

        store.finalize(id, grounded_outcome()).await.unwrap();
        let query = store.get(id).await.unwrap();
        assert_eq!(query.answer_type, Some(AnswerType::Grounded));
        assert!(query.is_final());

        // Second finalization must be rejected
        let err = store.finalize(id, grounded_outcome()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_finalize_unknown_query() {
        let store = InMemoryQueryStore::new();
        let err = store
            .finalize(Uuid::new_v4(), grounded_outcome())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_cursor() {
        let store = InMemoryQueryStore::new();
        let room = Uuid::new_v4();
        for _ in 0..5 {
            store.insert_question(new_query(room)).await.unwrap();
            // Distinct created_at timestamps
            tokio::time::sleep(tokio::time::Duration::from_millis(2)).await;
        }

        let page1 = store.list(room, None, 2).await.unwrap();
        assert_eq!(page1.queries.len(), 2);
        assert!(page1.next_cursor.is_some());
        assert!(page1.queries[0].created_at >= page1.queries[1].created_at);

        let page2 = store.list(room, page1.next_cursor, 2).await.unwrap();
        assert_eq!(page2.queries.len(), 2);
        assert!(page2.queries[0].created_at < page1.queries[1].created_at);

        let page3 = store.list(room, page2.next_cursor, 2).await.unwrap();
        assert_eq!(page3.queries.len(), 1);
        assert!(page3.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_scoped_to_room() {
        let store = InMemoryQueryStore::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        store.insert_question(new_query(room_a)).await.unwrap();
        store.insert_question(new_query(room_b)).await.unwrap();

        let page = store.list(room_a, None, 10).await.unwrap();
        assert_eq!(page.queries.len(), 1);
        assert_eq!(page.queries[0].room_id, room_a);
    }

    #[tokio::test]
    async fn test_delete_single_and_bulk() {
        let store = InMemoryQueryStore::new();
        let room = Uuid::new_v4();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let req = new_query(room);
            ids.push(req.id);
            store.insert_question(req).await.unwrap();
        }

        store.delete(ids[0]).await.unwrap();
        assert!(matches!(
            store.get(ids[0]).await.unwrap_err(),
            Error::QueryNotFound(_)
        ));

        // Bulk delete counts only rows that existed
        let removed = store
            .delete_bulk(&[ids[0], ids[1], ids[2], Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_feedback_set_and_clear() {
        let store = InMemoryQueryStore::new();
        let req = new_query(Uuid::new_v4());
        let id = req.id;
        store.insert_question(req).await.unwrap();

        let feedback = Feedback {
            rating: dealroom_core::FeedbackRating::Helpful,
            comment: None,
            updated_at: Utc::now(),
        };
        store.set_feedback(id, feedback).await.unwrap();
        assert!(store.get(id).await.unwrap().feedback.is_some());

        store.clear_feedback(id).await.unwrap();
        assert!(store.get(id).await.unwrap().feedback.is_none());
    }
}
