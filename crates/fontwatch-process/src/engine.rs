//! The process engine.
//!
//! Every operation on one process runs on the [`JobQueue`] under
//! `process:<id>`, so answers to the same process never interleave within
//! one engine. Across engines sharing a store, the store's version check
//! turns the loser of a race into [`ProcessError::Conflict`].
//!
//! All mutations go through one funnel, [`Inner::run_state_changing`]:
//! handler errors and panics become a FAILED history entry, the result is
//! stored, then handed to the [`CommitHook`] and published to subscribers.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use fontwatch_core::JobQueue;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::answer::ExpectedAnswer;
use crate::error::{ProcessError, Result, TicketError};
use crate::interaction::Interaction;
use crate::schema::{FieldDef, StateSchema};
use crate::status::{History, Status, StatusKind};
use crate::store::{MemoryProcessStore, ProcessStore};
use crate::task::{CommitHook, Outcome, Process, Registry, TaskContext, TaskType, TracingCommitHook};
use crate::ticket::{Secret, Ticket};

const RESERVED_FIELDS: [&str; 3] = ["created", "history", "expectedAnswer"];

/// Buffered state changes per subscriber.
const FEED_CAPACITY: usize = 16;

/// The answer a client should give next.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub callback: String,
    pub ticket: String,
    pub interaction: Option<Interaction>,
}

/// Result of `init` or `execute`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub process_id: String,
    pub outcome: Outcome,
    pub status: Option<Status>,
    pub prompt: Option<Prompt>,
}

struct Inner<S> {
    task: String,
    schema: StateSchema<Process<S>>,
    registry: Registry<S>,
    secret: Secret,
    store: Arc<dyn ProcessStore>,
    queue: JobQueue,
    hook: Arc<dyn CommitHook>,
    feeds: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

/// Runs processes of one task type.
pub struct ProcessEngine<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for ProcessEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for ProcessEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEngine")
            .field("task", &self.inner.task)
            .field("schema", &self.inner.schema)
            .finish()
    }
}

impl<S: Default + Send + Sync + 'static> ProcessEngine<S> {
    pub fn builder(task: TaskType<S>) -> ProcessEngineBuilder<S> {
        ProcessEngineBuilder {
            task,
            secret: None,
            store: None,
            queue: None,
            hook: None,
        }
    }

    pub fn task(&self) -> &str {
        &self.inner.task
    }

    /// Creates a process and runs the init handler with `payload`.
    pub async fn init(&self, payload: Value) -> Result<Step> {
        let id = Uuid::new_v4().to_string();
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .schedule(queue_key(&id), move || async move { inner.create(id, payload).await })
            .await?
    }

    /// Answers the outstanding expectation of `process_id`.
    ///
    /// Rejected answers leave the process untouched.
    pub async fn execute(&self, process_id: &str, ticket: &str, callback: &str, payload: Value) -> Result<Step> {
        let inner = Arc::clone(&self.inner);
        let (id, ticket, callback) = (process_id.to_string(), ticket.to_string(), callback.to_string());
        self.inner
            .queue
            .schedule(queue_key(process_id), move || async move {
                inner.answer(id, ticket, callback, payload).await
            })
            .await?
    }

    /// The stored state, checked against the schema.
    pub async fn state(&self, process_id: &str) -> Result<Value> {
        let (_, process) = self.inner.load(process_id).await?;
        self.inner.serialize(&process)
    }

    /// The answer the process currently waits for.
    pub async fn prompt(&self, process_id: &str) -> Result<Option<Prompt>> {
        let (_, process) = self.inner.load(process_id).await?;
        self.inner.prompt(&process)
    }

    /// Receives the serialized state after every change of `process_id`.
    pub fn subscribe(&self, process_id: &str) -> broadcast::Receiver<Value> {
        let mut feeds = self.inner.feeds.lock();
        prune_feeds(&mut feeds);
        feeds
            .entry(process_id.to_string())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe()
    }

    /// Processes that currently have at least one live subscriber.
    pub fn subscribed(&self) -> usize {
        let mut feeds = self.inner.feeds.lock();
        prune_feeds(&mut feeds);
        feeds.len()
    }
}

/// Drops feeds whose receivers are all gone.
fn prune_feeds(feeds: &mut HashMap<String, broadcast::Sender<Value>>) {
    feeds.retain(|_, feed| feed.receiver_count() > 0);
}

impl<S: Default + Send + Sync + 'static> Inner<S> {
    async fn create(&self, id: String, payload: Value) -> Result<Step> {
        let mut process = Process::<S>::default();
        self.schema.init(&mut process);

        let init = Arc::clone(&self.registry.init);
        let outcome = self.run_state_changing(&mut process, "init", |ctx| init(ctx, &payload));

        let state = self.serialize(&process)?;
        self.store.insert(&id, state.clone()).await?;
        info!(task = %self.task, process = %id, ok = outcome.ok, "process created");
        self.commit(&id, &outcome, state).await;
        self.step(id, outcome, &process)
    }

    async fn answer(&self, id: String, ticket: String, callback: String, payload: Value) -> Result<Step> {
        let ticket: Ticket = ticket.parse()?;
        let (version, mut process) = self.load(&id).await?;

        let expected = process.expected_answer.as_ref().ok_or(TicketError::NotExpected)?;
        expected.accepts(&callback, &ticket, &self.secret)?;
        let handler = Arc::clone(self.registry.callback(&callback)?);

        process.expected_answer = None;
        let outcome = self.run_state_changing(&mut process, &callback, |ctx| handler(ctx, &payload));

        let state = self.serialize(&process)?;
        self.store.replace(&id, version, state.clone()).await?;
        debug!(task = %self.task, process = %id, %callback, ok = outcome.ok, "answer accepted");
        self.commit(&id, &outcome, state).await;
        self.step(id, outcome, &process)
    }

    /// Runs `change` against `process`, turning errors and panics into a
    /// FAILED history entry.
    fn run_state_changing<F>(&self, process: &mut Process<S>, method: &str, change: F) -> Outcome
    where
        F: FnOnce(&mut TaskContext<'_, S>) -> Result<()>,
    {
        let now = Utc::now();
        let result = {
            let mut ctx = TaskContext::new(process, &self.registry, &self.secret, now);
            panic::catch_unwind(AssertUnwindSafe(|| change(&mut ctx)))
        };
        let message = match result {
            Ok(Ok(())) => return Outcome::success(method),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        error!(task = %self.task, method, error = %message, "state change failed");
        process.expected_answer = None;
        process
            .history
            .push(Status::new(StatusKind::Failed, format!("**{method}** failed: {message}"), now));
        Outcome::failure(method, message)
    }

    async fn commit(&self, id: &str, outcome: &Outcome, state: Value) {
        self.hook.commit(id, outcome, &state).await;
        let mut feeds = self.feeds.lock();
        if let Some(feed) = feeds.get(id) {
            // Fails only when nobody listens; pruned below.
            let _ = feed.send(state);
        }
        prune_feeds(&mut feeds);
    }

    async fn load(&self, id: &str) -> Result<(u64, Process<S>)> {
        let stored = self.store.load(id).await?;
        let mut process = Process::default();
        self.schema.load(&mut process, &stored.state)?;
        Ok((stored.version, process))
    }

    fn serialize(&self, process: &Process<S>) -> Result<Value> {
        Ok(Value::Object(self.schema.serialize(process, None)?))
    }

    fn prompt(&self, process: &Process<S>) -> Result<Option<Prompt>> {
        let Some(answer) = &process.expected_answer else {
            return Ok(None);
        };
        let interaction = answer
            .interaction
            .as_deref()
            .map(|name| self.registry.render(name, &process.state))
            .transpose()?;
        Ok(Some(Prompt {
            callback: answer.callback.clone(),
            ticket: answer.ticket.to_string(),
            interaction,
        }))
    }

    fn step(&self, process_id: String, outcome: Outcome, process: &Process<S>) -> Result<Step> {
        Ok(Step {
            process_id,
            outcome,
            status: process.status().cloned(),
            prompt: self.prompt(process)?,
        })
    }
}

fn queue_key(process_id: &str) -> String {
    format!("process:{process_id}")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

/// Builder for [`ProcessEngine`].
pub struct ProcessEngineBuilder<S> {
    task: TaskType<S>,
    secret: Option<Secret>,
    store: Option<Arc<dyn ProcessStore>>,
    queue: Option<JobQueue>,
    hook: Option<Arc<dyn CommitHook>>,
}

impl<S: Default + Send + Sync + 'static> ProcessEngineBuilder<S> {
    pub fn secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Defaults to a fresh [`MemoryProcessStore`].
    pub fn store(mut self, store: Arc<dyn ProcessStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: JobQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Defaults to [`TracingCommitHook`].
    pub fn commit_hook(mut self, hook: Arc<dyn CommitHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<ProcessEngine<S>, &'static str> {
        let secret = self.secret.ok_or("secret is required")?;
        let TaskType { name, fields, registry } = self.task;
        if fields.iter().any(|f| RESERVED_FIELDS.contains(&f.name())) {
            return Err("task fields must not be named created, history or expectedAnswer");
        }

        let expected_answer = {
            let secret = secret.clone();
            let callbacks: Vec<String> = registry.callbacks.keys().cloned().collect();
            let interactions: Vec<String> = registry.interactions.keys().cloned().collect();
            FieldDef::new(
                "expectedAnswer",
                |p: &Process<S>| &p.expected_answer,
                |p| &mut p.expected_answer,
                || None,
            )
            .validate(move |_, value| check_expected_answer(value, &secret, &callbacks, &interactions))
        };
        let schema = StateSchema::new()
            .field(FieldDef::new("created", |p: &Process<S>| &p.created, |p| &mut p.created, Utc::now))
            .field(FieldDef::new(
                "history",
                |p: &Process<S>| &p.history,
                |p| &mut p.history,
                || History::initial(Utc::now()),
            ))
            .field(expected_answer)
            .fields(
                fields
                    .into_iter()
                    .map(|f| f.lift(|p: &Process<S>| &p.state, |p| &mut p.state)),
            );

        Ok(ProcessEngine {
            inner: Arc::new(Inner {
                task: name,
                schema,
                registry,
                secret,
                store: self.store.unwrap_or_else(|| Arc::new(MemoryProcessStore::new())),
                queue: self.queue.unwrap_or_default(),
                hook: self.hook.unwrap_or_else(|| Arc::new(TracingCommitHook)),
                feeds: Mutex::new(HashMap::new()),
            }),
        })
    }
}

/// Stored expectations must still be answerable by this engine.
fn check_expected_answer(
    value: &Value,
    secret: &Secret,
    callbacks: &[String],
    interactions: &[String],
) -> std::result::Result<(), String> {
    if value.is_null() {
        return Ok(());
    }
    let answer: ExpectedAnswer = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    if !callbacks.contains(&answer.callback) {
        return Err(format!("callback '{}' is not registered", answer.callback));
    }
    if let Some(name) = &answer.interaction
        && !interactions.contains(name)
    {
        return Err(format!("interaction '{name}' is not registered"));
    }
    answer
        .ticket
        .verify(&answer.callback, secret)
        .map_err(|_| "ticket does not verify under the current secret".to_string())
}
