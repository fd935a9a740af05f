//! Integration tests for the client-side session state machine: retry
//! gating, rate-limit countdown, and user cancellation.

use std::sync::Arc;

use uuid::Uuid;

use dealroom_core::{
    AnswerType, Error, EventBus, Passage, QueryRepository, RoomScope, StreamEvent,
};
use dealroom_inference::{MockAnswerModel, MockCorpusIndex};
use dealroom_qa::{ExecutorConfig, QueryExecutor, QuerySession, SessionState};
use dealroom_store::InMemoryQueryStore;

fn passage(relevance: f64) -> Passage {
    Passage {
        document_id: Uuid::new_v4(),
        document_title: "FY25 Financials".to_string(),
        page: 12,
        chunk_id: None,
        text: "ARR grew 45% YoY".to_string(),
        relevance,
    }
}

fn session_with(model: MockAnswerModel) -> (QuerySession, Arc<InMemoryQueryStore>, Uuid) {
    let store = Arc::new(InMemoryQueryStore::new());
    let executor = Arc::new(QueryExecutor::new(
        Arc::new(MockCorpusIndex::new().with_passage(passage(0.9))),
        Arc::new(model),
        store.clone(),
        EventBus::default(),
        ExecutorConfig::default(),
    ));
    let room_id = Uuid::new_v4();
    let session = QuerySession::new(executor, RoomScope::whole_room(room_id));
    (session, store, room_id)
}

#[tokio::test]
async fn test_ask_accumulates_answer_and_returns_to_idle() {
    let model = MockAnswerModel::new().with_script(["ARR ", "grew ", "45% YoY"]);
    let (mut session, _store, _room) = session_with(model);

    assert_eq!(session.state(), SessionState::Idle);
    let exchange = session.ask("What is the ARR growth rate?").await.unwrap();

    assert_eq!(exchange.answer, "ARR grew 45% YoY");
    assert_eq!(exchange.answer_type, AnswerType::Grounded);
    assert_eq!(exchange.citations.len(), 1);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(
        session.last_question(),
        Some("What is the ARR growth rate?")
    );
}

#[tokio::test]
async fn test_ask_with_observes_incremental_events() {
    let model = MockAnswerModel::new().with_script(["a", "b", "c"]);
    let (mut session, _store, _room) = session_with(model);

    let mut seen = Vec::new();
    session
        .ask_with("What is the ARR growth rate?", |event| {
            seen.push(event.event_name());
        })
        .await
        .unwrap();

    assert_eq!(seen, vec!["chunk", "chunk", "chunk", "citation", "complete"]);
}

#[tokio::test]
async fn test_validation_failure_leaves_session_idle() {
    let (mut session, store, _room) = session_with(MockAnswerModel::new());

    let err = session.ask("hm?").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(store.is_empty().await);

    // Retry has nothing to work with
    let err = session.retry().await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_error_then_retry_reuses_original_question() {
    let model = MockAnswerModel::new()
        .with_script(["recovered ", "answer"])
        .failing("transient upstream failure");
    let (mut session, store, room_id) = session_with(model.clone());

    let err = session.ask("What is the ARR growth rate?").await.unwrap_err();
    assert!(matches!(err, Error::Model(_)));
    assert_eq!(session.state(), SessionState::Errored);
    assert!(session.last_error().unwrap().retry_allowed);

    // The failed attempt stays in history
    assert_eq!(store.len().await, 1);

    model.clear_failure();
    let exchange = session.retry().await.unwrap();
    assert_eq!(exchange.answer, "recovered answer");
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(model.generate_call_count(), 2);

    // Retry created a second record; the failed one remains visible with
    // the exact same question text. Give the executor tasks a beat to
    // finish persisting.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let page = store.list(room_id, None, 10).await.unwrap();
    assert_eq!(page.queries.len(), 2);
    assert!(page
        .queries
        .iter()
        .all(|q| q.question == "What is the ARR growth rate?"));
    assert!(page
        .queries
        .iter()
        .any(|q| q.answer_type == Some(AnswerType::Error)));
    assert!(page
        .queries
        .iter()
        .any(|q| q.answer_type == Some(AnswerType::Grounded)));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_countdown_blocks_until_elapsed() {
    let model = MockAnswerModel::new()
        .with_script(["late ", "answer"])
        .rate_limited(30);
    let (mut session, _store, _room) = session_with(model.clone());

    let err = session.ask("What is the ARR growth rate?").await.unwrap_err();
    assert!(matches!(err, Error::RateLimited { .. }));
    assert_eq!(session.state(), SessionState::Errored);
    assert!(session.retry_after_remaining().is_some());

    // Countdown still running: retry is blocked
    let err = session.retry().await.unwrap_err();
    assert!(matches!(err, Error::RateLimited { .. }));

    // New submissions are blocked during the countdown too
    let err = session
        .ask("A different question entirely?")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RateLimited { .. }));

    tokio::time::advance(std::time::Duration::from_secs(31)).await;
    assert!(session.retry_after_remaining().is_none());

    model.clear_failure();
    let exchange = session.retry().await.unwrap();
    assert_eq!(exchange.answer, "late answer");
}

#[tokio::test]
async fn test_retry_rejected_outside_errored_state() {
    let model = MockAnswerModel::new().with_script(["done"]);
    let (mut session, _store, _room) = session_with(model);

    session.ask("What is the ARR growth rate?").await.unwrap();
    let err = session.retry().await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_abort_cancels_in_flight_stream() {
    let model = MockAnswerModel::new()
        .with_script((0..50).map(|i| format!("t{} ", i)).collect::<Vec<_>>())
        .with_token_delay_ms(10);
    let (mut session, store, room_id) = session_with(model);

    let abort = session.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        abort.trigger();
    });

    let err = session.ask("What is the ARR growth rate?").await.unwrap_err();
    assert!(matches!(err, Error::TransportInterrupted(_)));

    // Abandonment returns the session to idle with the question preserved
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(
        session.last_question(),
        Some("What is the ARR growth rate?")
    );

    // The attributed question is recorded with no answer
    let mut recorded = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let page = store.list(room_id, None, 10).await.unwrap();
        if let Some(q) = page.queries.first() {
            if q.answer_type == Some(AnswerType::Error) {
                assert!(q.answer.is_none());
                recorded = true;
                break;
            }
        }
    }
    assert!(recorded, "cancelled stream must record the attempt");
}

#[tokio::test]
async fn test_session_events_observed_in_emission_order() {
    let model = MockAnswerModel::new().with_script(["1", "2", "3", "4"]);
    let (mut session, _store, _room) = session_with(model);

    let mut chunk_texts = Vec::new();
    session
        .ask_with("What is the ARR growth rate?", |event| {
            if let StreamEvent::Chunk { text } = event {
                chunk_texts.push(text.clone());
            }
        })
        .await
        .unwrap();

    assert_eq!(chunk_texts, vec!["1", "2", "3", "4"]);
}
