//! Process engine flows against the in-memory store.

use std::sync::Arc;

use fontwatch_process::{
    CommitHook, FieldDef, Interaction, MemoryProcessStore, Outcome, ProcessEngine, ProcessError, ProcessStore,
    Secret, StateError, StatusKind, TaskType, TicketError,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

#[derive(Debug, Default)]
struct Review {
    family: String,
    action: Option<String>,
    reason: Option<String>,
}

fn review_task() -> TaskType<Review> {
    TaskType::builder("review")
        .field(FieldDef::new("family", |s: &Review| &s.family, |s| &mut s.family, String::new))
        .field(FieldDef::new("action", |s: &Review| &s.action, |s| &mut s.action, || None))
        .field(
            FieldDef::new("reason", |s: &Review| &s.reason, |s| &mut s.reason, || None)
                .expected_when(|s| s.action.as_deref() == Some("dismiss")),
        )
        .on_init(|ctx, payload| {
            let family = payload["family"]
                .as_str()
                .ok_or_else(|| ProcessError::task("family is required"))?;
            ctx.state_mut().family = family.to_string();
            ctx.expect_answer("callbackApprove", Some("uiApprove"))?;
            Ok(())
        })
        .callback("callbackApprove", |ctx, answer| {
            let action = answer["action"].as_str().unwrap_or_default().to_string();
            match action.as_str() {
                "accept" => {
                    ctx.log("accepted");
                    ctx.state_mut().action = Some(action);
                    ctx.ok("approved");
                }
                "dismiss" => {
                    let reason = answer["reason"].as_str().unwrap_or("no reason given").to_string();
                    ctx.state_mut().action = Some(action);
                    ctx.state_mut().reason = Some(reason.clone());
                    ctx.fail(format!("dismissed: {reason}"));
                }
                "edit" => {
                    ctx.log("asked for changes");
                    ctx.expect_answer("callbackApprove", Some("uiApprove"))?;
                }
                "explode" => panic!("kaboom"),
                _ => return Err(ProcessError::task("Pick one of the actions from the list.")),
            }
            Ok(())
        })
        .callback("callbackComment", |ctx, _| {
            ctx.log("comment");
            Ok(())
        })
        .interaction("uiApprove", |s: &Review| {
            Interaction::new(["engineer"])
                .info(format!("Review **{}**", s.family))
                .choice("action", "Action", [("Accept", "accept"), ("Edit", "edit"), ("Dismiss", "dismiss")])
                .line("reason", "Reason")
                .when("action", "dismiss")
        })
        .build()
        .unwrap()
}

#[derive(Default)]
struct RecordingHook {
    outcomes: Mutex<Vec<(String, Outcome)>>,
}

#[async_trait::async_trait]
impl CommitHook for RecordingHook {
    async fn commit(&self, process_id: &str, outcome: &Outcome, _state: &Value) {
        self.outcomes.lock().push((process_id.to_string(), outcome.clone()));
    }
}

/// Checks that whatever it is handed is already in the store.
struct StoredStateHook {
    store: Arc<MemoryProcessStore>,
    matches: Mutex<Vec<bool>>,
}

#[async_trait::async_trait]
impl CommitHook for StoredStateHook {
    async fn commit(&self, process_id: &str, _outcome: &Outcome, state: &Value) {
        let stored = self.store.load(process_id).await.ok().map(|stored| stored.state);
        self.matches.lock().push(stored.as_ref() == Some(state));
    }
}

fn engine(store: Arc<MemoryProcessStore>, secret: &str) -> ProcessEngine<Review> {
    ProcessEngine::builder(review_task())
        .secret(Secret::new(secret))
        .store(store as Arc<dyn ProcessStore>)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_init_requests_an_answer() {
    let engine = engine(Arc::new(MemoryProcessStore::new()), "s3cr3t");
    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();

    assert!(step.outcome.ok);
    assert_eq!(step.status.unwrap().status, StatusKind::Pending);
    let prompt = step.prompt.unwrap();
    assert_eq!(prompt.callback, "callbackApprove");
    let interaction = prompt.interaction.unwrap();
    assert_eq!(interaction.roles, vec!["engineer"]);
    assert_eq!(interaction.fields[0].content.as_deref(), Some("Review **Test Sans**"));

    let state = engine.state(&step.process_id).await.unwrap();
    let mut keys: Vec<&str> = state.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["action", "created", "expectedAnswer", "family", "history"]);
    assert_eq!(state["expectedAnswer"][0], "callbackApprove");
    assert_eq!(state["expectedAnswer"][1], prompt.ticket.as_str());
    assert_eq!(state["history"][0]["details"], "*initial state*");
}

#[tokio::test]
async fn test_stored_state_roundtrips() {
    let store = Arc::new(MemoryProcessStore::new());
    let engine = engine(Arc::clone(&store), "s3cr3t");
    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();

    let stored = store.load(&step.process_id).await.unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(engine.state(&step.process_id).await.unwrap(), stored.state);
}

#[tokio::test]
async fn test_ticket_is_accepted_once() {
    let engine = engine(Arc::new(MemoryProcessStore::new()), "s3cr3t");
    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();
    let ticket = step.prompt.unwrap().ticket;

    let done = engine
        .execute(&step.process_id, &ticket, "callbackApprove", json!({ "action": "accept" }))
        .await
        .unwrap();
    assert!(done.outcome.ok);
    assert_eq!(done.status.unwrap().status, StatusKind::Ok);
    assert!(done.prompt.is_none());

    let err = engine
        .execute(&step.process_id, &ticket, "callbackApprove", json!({ "action": "accept" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Rejected(TicketError::NotExpected)), "{err}");
}

#[tokio::test]
async fn test_new_expectation_invalidates_the_old_ticket() {
    let engine = engine(Arc::new(MemoryProcessStore::new()), "s3cr3t");
    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();
    let first = step.prompt.unwrap().ticket;

    let edited = engine
        .execute(&step.process_id, &first, "callbackApprove", json!({ "action": "edit" }))
        .await
        .unwrap();
    let second = edited.prompt.unwrap().ticket;
    assert_ne!(first, second);

    let err = engine
        .execute(&step.process_id, &first, "callbackApprove", json!({ "action": "accept" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Rejected(TicketError::Mismatch)), "{err}");

    engine
        .execute(&step.process_id, &second, "callbackApprove", json!({ "action": "accept" }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_answers_leave_the_process_alone() {
    let store = Arc::new(MemoryProcessStore::new());
    let engine = engine(Arc::clone(&store), "s3cr3t");
    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();
    let ticket = step.prompt.unwrap().ticket;
    let before = store.load(&step.process_id).await.unwrap();

    let err = engine
        .execute(&step.process_id, &ticket, "callbackComment", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Rejected(TicketError::WrongCallback { .. })));

    let (timestamp, hash) = ticket.split_once(';').unwrap();
    let forged = format!("{timestamp};{}", "0".repeat(hash.len()));
    let err = engine
        .execute(&step.process_id, &forged, "callbackApprove", json!({ "action": "accept" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Rejected(TicketError::Mismatch)));

    let err = engine
        .execute(&step.process_id, "garbage", "callbackApprove", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Rejected(TicketError::Malformed)));

    assert_eq!(store.load(&step.process_id).await.unwrap(), before);
}

#[tokio::test]
async fn test_rotating_the_secret_invalidates_stored_tickets() {
    let store = Arc::new(MemoryProcessStore::new());
    let step = engine(Arc::clone(&store), "old")
        .init(json!({ "family": "Test Sans" }))
        .await
        .unwrap();
    let ticket = step.prompt.unwrap().ticket;

    let rotated = engine(store, "new");
    let err = rotated.state(&step.process_id).await.unwrap_err();
    let ProcessError::State(StateError::Incompatible(issues)) = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(issues, vec!["expectedAnswer is invalid: ticket does not verify under the current secret"]);

    let err = rotated
        .execute(&step.process_id, &ticket, "callbackApprove", json!({ "action": "accept" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::State(_)));
}

#[tokio::test]
async fn test_incompatible_state_fails_to_load() {
    let store = Arc::new(MemoryProcessStore::new());
    let engine = engine(Arc::clone(&store), "s3cr3t");
    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();
    let mut state = store.load(&step.process_id).await.unwrap().state;

    let object = state.as_object_mut().unwrap();
    object.remove("family");
    object.insert("reason".into(), json!("sneaked in"));
    object.insert("legacy".into(), json!(true));
    store.put_raw(&step.process_id, state);

    let err = engine.state(&step.process_id).await.unwrap_err();
    let ProcessError::State(state_err) = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(
        state_err.issues(),
        [
            "family expected but NOT PRESENT",
            "reason NOT EXPECTED but present",
            "unspecified keys: legacy",
        ]
    );
}

#[tokio::test]
async fn test_dismiss_stores_the_conditional_reason() {
    let engine = engine(Arc::new(MemoryProcessStore::new()), "s3cr3t");
    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();
    let ticket = step.prompt.unwrap().ticket;

    let done = engine
        .execute(
            &step.process_id,
            &ticket,
            "callbackApprove",
            json!({ "action": "dismiss", "reason": "kerning" }),
        )
        .await
        .unwrap();
    let status = done.status.unwrap();
    assert_eq!(status.status, StatusKind::Failed);
    assert_eq!(status.details, "dismissed: kerning");

    let state = engine.state(&step.process_id).await.unwrap();
    assert_eq!(state["reason"], "kerning");
    assert_eq!(state["expectedAnswer"], Value::Null);
}

#[tokio::test]
async fn test_handler_errors_and_panics_become_failed_status() {
    let hook = Arc::new(RecordingHook::default());
    let engine = ProcessEngine::builder(review_task())
        .secret(Secret::new("s3cr3t"))
        .commit_hook(Arc::clone(&hook) as Arc<dyn CommitHook>)
        .build()
        .unwrap();

    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();
    let ticket = step.prompt.unwrap().ticket;
    let done = engine
        .execute(&step.process_id, &ticket, "callbackApprove", json!({ "action": "shrug" }))
        .await
        .unwrap();
    assert!(!done.outcome.ok);
    let status = done.status.unwrap();
    assert_eq!(status.status, StatusKind::Failed);
    assert_eq!(status.details, "**callbackApprove** failed: Pick one of the actions from the list.");
    assert!(done.prompt.is_none());

    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();
    let ticket = step.prompt.unwrap().ticket;
    let done = engine
        .execute(&step.process_id, &ticket, "callbackApprove", json!({ "action": "explode" }))
        .await
        .unwrap();
    assert_eq!(done.outcome.error.as_deref(), Some("panicked: kaboom"));

    let failed = engine.init(json!({})).await.unwrap();
    assert_eq!(failed.outcome.error.as_deref(), Some("family is required"));
    assert!(failed.prompt.is_none());

    let outcomes = hook.outcomes.lock();
    let methods: Vec<(&str, bool)> = outcomes.iter().map(|(_, o)| (o.method.as_str(), o.ok)).collect();
    assert_eq!(
        methods,
        vec![
            ("init", true),
            ("callbackApprove", false),
            ("init", true),
            ("callbackApprove", false),
            ("init", false),
        ]
    );
}

#[tokio::test]
async fn test_subscribers_see_every_change() {
    let engine = engine(Arc::new(MemoryProcessStore::new()), "s3cr3t");
    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();
    let mut feed = engine.subscribe(&step.process_id);

    let ticket = step.prompt.unwrap().ticket;
    engine
        .execute(&step.process_id, &ticket, "callbackApprove", json!({ "action": "accept" }))
        .await
        .unwrap();

    let state = feed.recv().await.unwrap();
    assert_eq!(state["action"], "accept");
    assert_eq!(state, engine.state(&step.process_id).await.unwrap());
}

#[tokio::test]
async fn test_hook_runs_after_the_state_is_stored() {
    let store = Arc::new(MemoryProcessStore::new());
    let hook = Arc::new(StoredStateHook {
        store: Arc::clone(&store),
        matches: Mutex::new(Vec::new()),
    });
    let engine = ProcessEngine::builder(review_task())
        .secret(Secret::new("s3cr3t"))
        .store(Arc::clone(&store) as Arc<dyn ProcessStore>)
        .commit_hook(Arc::clone(&hook) as Arc<dyn CommitHook>)
        .build()
        .unwrap();

    let step = engine.init(json!({ "family": "Test Sans" })).await.unwrap();
    let ticket = step.prompt.unwrap().ticket;
    engine
        .execute(&step.process_id, &ticket, "callbackApprove", json!({ "action": "edit" }))
        .await
        .unwrap();

    assert_eq!(*hook.matches.lock(), vec![true, true]);
}

#[tokio::test]
async fn test_abandoned_feeds_are_dropped() {
    let engine = engine(Arc::new(MemoryProcessStore::new()), "s3cr3t");
    let first = engine.init(json!({ "family": "Test Sans" })).await.unwrap();
    let second = engine.init(json!({ "family": "Other Serif" })).await.unwrap();

    let kept = engine.subscribe(&first.process_id);
    let dropped = engine.subscribe(&second.process_id);
    assert_eq!(engine.subscribed(), 2);

    // Nobody changes the second process again.
    drop(dropped);
    assert_eq!(engine.subscribed(), 1);

    drop(kept);
    assert_eq!(engine.subscribed(), 0);
}

#[tokio::test]
async fn test_unknown_process() {
    let engine = engine(Arc::new(MemoryProcessStore::new()), "s3cr3t");
    assert!(engine.state("nope").await.unwrap_err().is_not_found());
}

#[test]
fn test_builder_rejects_reserved_fields_and_missing_secret() {
    let task = TaskType::<Review>::builder("review")
        .field(FieldDef::new("history", |s: &Review| &s.family, |s| &mut s.family, String::new))
        .on_init(|_, _| Ok(()))
        .build()
        .unwrap();
    assert!(ProcessEngine::builder(task).secret(Secret::new("s")).build().is_err());
    assert!(ProcessEngine::builder(review_task()).build().is_err());
}
