//! Task types and the context handlers run in.
//!
//! A [`TaskType`] is a registry fixed at construction: the persisted
//! domain fields, one init handler, the callbacks answers can target and
//! the interaction renderers prompts can name. Handlers are plain
//! synchronous functions that change the process through a
//! [`TaskContext`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::answer::ExpectedAnswer;
use crate::error::{ProcessError, Result};
use crate::interaction::Interaction;
use crate::schema::FieldDef;
use crate::status::{History, Status, StatusKind};
use crate::ticket::{Secret, Ticket};

/// Init handler or callback.
pub type Handler<S> = Arc<dyn Fn(&mut TaskContext<'_, S>, &Value) -> Result<()> + Send + Sync>;

/// Builds the interaction for the current state.
pub type Renderer<S> = Arc<dyn Fn(&S) -> Interaction + Send + Sync>;

/// A process: engine bookkeeping plus the task's own state.
#[derive(Debug, Clone, Default)]
pub struct Process<S> {
    pub created: DateTime<Utc>,
    pub history: History,
    pub expected_answer: Option<ExpectedAnswer>,
    pub state: S,
}

impl<S> Process<S> {
    pub fn status(&self) -> Option<&Status> {
        self.history.current()
    }

    pub fn is_finished(&self) -> bool {
        self.history.is_finished()
    }
}

/// Handlers of a task type, keyed by name.
pub(crate) struct Registry<S> {
    pub(crate) init: Handler<S>,
    pub(crate) callbacks: BTreeMap<String, Handler<S>>,
    pub(crate) interactions: BTreeMap<String, Renderer<S>>,
}

impl<S> Registry<S> {
    pub(crate) fn callback(&self, name: &str) -> Result<&Handler<S>> {
        self.callbacks
            .get(name)
            .ok_or_else(|| ProcessError::unregistered_callback(name))
    }

    pub(crate) fn render(&self, name: &str, state: &S) -> Result<Interaction> {
        let renderer = self
            .interactions
            .get(name)
            .ok_or_else(|| ProcessError::unregistered_interaction(name))?;
        let interaction = renderer(state);
        interaction.validate()?;
        Ok(interaction)
    }
}

/// A kind of process.
pub struct TaskType<S> {
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldDef<S>>,
    pub(crate) registry: Registry<S>,
}

impl<S: 'static> TaskType<S> {
    pub fn builder(name: impl Into<String>) -> TaskTypeBuilder<S> {
        TaskTypeBuilder {
            name: name.into(),
            fields: Vec::new(),
            init: None,
            callbacks: BTreeMap::new(),
            interactions: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S> fmt::Debug for TaskType<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskType")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("callbacks", &self.registry.callbacks.keys().collect::<Vec<_>>())
            .field("interactions", &self.registry.interactions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`TaskType`].
pub struct TaskTypeBuilder<S> {
    name: String,
    fields: Vec<FieldDef<S>>,
    init: Option<Handler<S>>,
    callbacks: BTreeMap<String, Handler<S>>,
    interactions: BTreeMap<String, Renderer<S>>,
}

impl<S: 'static> TaskTypeBuilder<S> {
    pub fn field(mut self, field: FieldDef<S>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn on_init<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut TaskContext<'_, S>, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(handler));
        self
    }

    pub fn callback<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&mut TaskContext<'_, S>, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.callbacks.insert(name.to_string(), Arc::new(handler));
        self
    }

    pub fn interaction<F>(mut self, name: &str, renderer: F) -> Self
    where
        F: Fn(&S) -> Interaction + Send + Sync + 'static,
    {
        self.interactions.insert(name.to_string(), Arc::new(renderer));
        self
    }

    pub fn build(self) -> Result<TaskType<S>, &'static str> {
        let init = self.init.ok_or("init handler is required")?;
        if self.name.is_empty() {
            return Err("task type name is required");
        }
        Ok(TaskType {
            name: self.name,
            fields: self.fields,
            registry: Registry {
                init,
                callbacks: self.callbacks,
                interactions: self.interactions,
            },
        })
    }
}

/// What handlers see while they run.
pub struct TaskContext<'a, S> {
    process: &'a mut Process<S>,
    registry: &'a Registry<S>,
    secret: &'a Secret,
    now: DateTime<Utc>,
}

impl<'a, S> TaskContext<'a, S> {
    pub(crate) fn new(
        process: &'a mut Process<S>,
        registry: &'a Registry<S>,
        secret: &'a Secret,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            process,
            registry,
            secret,
            now,
        }
    }

    pub fn state(&self) -> &S {
        &self.process.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.process.state
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Waits for an answer to `callback`, replacing any earlier expectation.
    ///
    /// `interaction` names the renderer of the form shown to the user.
    pub fn expect_answer(&mut self, callback: &str, interaction: Option<&str>) -> Result<Ticket> {
        self.registry.callback(callback)?;
        if let Some(name) = interaction {
            self.registry.render(name, &self.process.state)?;
        }
        let ticket = Ticket::mint(callback, self.secret, self.now);
        self.process.expected_answer = Some(ExpectedAnswer {
            callback: callback.to_string(),
            ticket: ticket.clone(),
            interaction: interaction.map(str::to_string),
        });
        Ok(ticket)
    }

    pub fn log(&mut self, details: impl Into<String>) {
        self.push(StatusKind::Log, details, None);
    }

    pub fn log_data(&mut self, details: impl Into<String>, data: Value) {
        self.push(StatusKind::Log, details, Some(data));
    }

    pub fn pending(&mut self, details: impl Into<String>) {
        self.push(StatusKind::Pending, details, None);
    }

    /// Finishes the process successfully.
    pub fn ok(&mut self, details: impl Into<String>) {
        self.process.expected_answer = None;
        self.push(StatusKind::Ok, details, None);
    }

    /// Finishes the process as failed.
    pub fn fail(&mut self, details: impl Into<String>) {
        self.process.expected_answer = None;
        self.push(StatusKind::Failed, details, None);
    }

    fn push(&mut self, kind: StatusKind, details: impl Into<String>, data: Option<Value>) {
        let mut status = Status::new(kind, details, self.now);
        status.data = data;
        self.process.history.push(status);
    }
}

/// Result of one state-changing call, handed to the [`CommitHook`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub method: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub(crate) fn success(method: &str) -> Self {
        Self {
            method: method.to_string(),
            ok: true,
            error: None,
        }
    }

    pub(crate) fn failure(method: &str, error: String) -> Self {
        Self {
            method: method.to_string(),
            ok: false,
            error: Some(error),
        }
    }
}

/// Receives every state change once it has been stored.
#[async_trait::async_trait]
pub trait CommitHook: Send + Sync {
    async fn commit(&self, process_id: &str, outcome: &Outcome, state: &Value);
}

/// Hook that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCommitHook;

#[async_trait::async_trait]
impl CommitHook for TracingCommitHook {
    async fn commit(&self, process_id: &str, outcome: &Outcome, _state: &Value) {
        match &outcome.error {
            None => tracing::debug!(process = process_id, method = %outcome.method, "process changed"),
            Some(error) => tracing::warn!(process = process_id, method = %outcome.method, %error, "process step failed"),
        }
    }
}
