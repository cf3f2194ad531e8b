//! Execution contexts for backend calls
//!
//! Rendering and physics backends each require their mutations to happen on
//! a specific context. Rather than relying on convention, every backend call
//! is shipped as a closure to an [`ExecContext`] whose drain task is the only
//! code that ever touches the backend, and the [`Dispatcher`] picks the
//! context from the primitive kind's affinity. Calling the adapter off-context
//! is therefore unrepresentable in the engine.

use crate::error::{Result, SceneError};
use tokio::sync::{mpsc, oneshot};

/// Which execution context a backend call must run on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextAffinity {
    /// Rendering backend mutations (lights, spatials, particles)
    Render,
    /// Physics simulation mutations (bodies, ghosts, joints)
    Physics,
}

impl ContextAffinity {
    pub fn name(&self) -> &'static str {
        match self {
            ContextAffinity::Render => "render",
            ContextAffinity::Physics => "physics",
        }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a single-consumer execution context.
///
/// Jobs are queued on an unbounded channel and run in submission order by a
/// dedicated drain task, so two calls shipped to the same context never
/// interleave.
#[derive(Clone)]
pub struct ExecContext {
    tx: mpsc::UnboundedSender<Job>,
    name: &'static str,
}

impl ExecContext {
    /// Spawn a context drained by a dedicated tokio task
    pub fn spawn(name: &'static str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            tracing::debug!(context = name, "execution context drained and closed");
        });
        Self { tx, name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run `f` on the context and await its result
    pub async fn run<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (ack_tx, ack_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = ack_tx.send(f());
        });
        self.tx
            .send(job)
            .map_err(|_| SceneError::ContextClosed(self.name))?;
        ack_rx.await.map_err(|_| SceneError::ContextClosed(self.name))
    }
}

/// Routes backend calls to the context matching a primitive's affinity
#[derive(Clone)]
pub struct Dispatcher {
    render: ExecContext,
    physics: ExecContext,
}

impl Dispatcher {
    pub fn new(render: ExecContext, physics: ExecContext) -> Self {
        Self { render, physics }
    }

    /// Spawn a dispatcher with fresh render and physics contexts
    pub fn spawn() -> Self {
        Self::new(ExecContext::spawn("render"), ExecContext::spawn("physics"))
    }

    pub fn context(&self, affinity: ContextAffinity) -> &ExecContext {
        match affinity {
            ContextAffinity::Render => &self.render,
            ContextAffinity::Physics => &self.physics,
        }
    }

    /// Run `f` on the context matching `affinity`
    pub async fn run_on<R, F>(&self, affinity: ContextAffinity, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.context(affinity).run(f).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_run_returns_result() {
        let ctx = ExecContext::spawn("test");
        let value = ctx.run(|| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let ctx = ExecContext::spawn("test");
        let counter = Arc::new(AtomicUsize::new(0));
        let mut observed = Vec::new();
        for _ in 0..8 {
            let counter = counter.clone();
            observed.push(ctx.run(move || counter.fetch_add(1, Ordering::SeqCst)).await.unwrap());
        }
        assert_eq!(observed, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dispatcher_routes_by_affinity() {
        let dispatcher = Dispatcher::spawn();
        assert_eq!(
            dispatcher.context(ContextAffinity::Render).name(),
            "render"
        );
        assert_eq!(
            dispatcher.context(ContextAffinity::Physics).name(),
            "physics"
        );
        let value = dispatcher
            .run_on(ContextAffinity::Physics, || "simulated")
            .await
            .unwrap();
        assert_eq!(value, "simulated");
    }
}
