//! Stream Supervisor
//!
//! A task group with first-exit-cancels-rest semantics:
//!
//! ```text
//! run()
//!  ├── spawn execute() of every task
//!  ├── wait for the first task to return (Ok or Err)
//!  ├── call interrupt() of every task
//!  ├── wait for all remaining tasks
//!  └── return the first task's result
//! ```
//!
//! Interrupts request a cooperative exit. They never abort a task, so every
//! task still runs its own cleanup (dropping its stream handle) on the way out.

use fleet_foundation::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cooperative stop request for one task
pub type Interrupt = Box<dyn FnOnce() + Send>;

/// A unit of work registered with the supervisor
pub struct SupervisedTask {
    name: String,
    execute: BoxFuture<'static, Result<()>>,
    interrupt: Interrupt,
}

impl SupervisedTask {
    pub fn new<F, I>(name: impl Into<String>, execute: F, interrupt: I) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
        I: FnOnce() + Send + 'static,
    {
        Self {
            name: name.into(),
            execute: execute.boxed(),
            interrupt: Box::new(interrupt),
        }
    }

    /// Task whose interrupt cancels the token handed to `build`
    pub fn cancellable<B, F>(name: impl Into<String>, build: B) -> Self
    where
        B: FnOnce(CancellationToken) -> F,
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let execute = build(token.clone());
        Self::new(name, execute, move || token.cancel())
    }
}

/// First-exit-cancels-rest task group
#[derive(Default)]
pub struct StreamSupervisor {
    tasks: Vec<SupervisedTask>,
}

impl StreamSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, task: SupervisedTask) {
        debug!("Supervisor: registered task {}", task.name);
        self.tasks.push(task);
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task until the first one returns, then stop the rest
    ///
    /// Returns the result of the task that returned first. An empty group
    /// returns `Ok(())` immediately.
    pub async fn run(self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let mut set = JoinSet::new();
        let mut index_of = HashMap::with_capacity(self.tasks.len());
        let mut interrupts = Vec::with_capacity(self.tasks.len());

        for (index, task) in self.tasks.into_iter().enumerate() {
            let handle = set.spawn(task.execute);
            index_of.insert(handle.id(), index);
            interrupts.push((task.name, task.interrupt));
        }

        let (trigger, result) = match set.join_next_with_id().await {
            Some(Ok((id, result))) => (index_of.get(&id).copied(), result),
            Some(Err(join_error)) => (
                index_of.get(&join_error.id()).copied(),
                Err(Error::Task(format!("supervised task failed: {}", join_error))),
            ),
            None => return Ok(()),
        };

        let trigger_name = trigger
            .and_then(|i| interrupts.get(i))
            .map(|(name, _)| name.clone())
            .unwrap_or_default();
        match &result {
            Ok(()) => info!(
                "Task {} exited; interrupting {} remaining",
                trigger_name,
                set.len()
            ),
            Err(e) => warn!(
                "Task {} failed: {}; interrupting {} remaining",
                trigger_name,
                e,
                set.len()
            ),
        }

        for (name, interrupt) in interrupts {
            debug!("Supervisor: interrupting {}", name);
            interrupt();
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Task ended with error after interrupt: {}", e),
                Err(e) => warn!("Task failed after interrupt: {}", e),
            }
        }

        result
    }
}
