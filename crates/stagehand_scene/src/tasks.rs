//! Cancellable task scopes
//!
//! Every attached item owns one scope holding its four forwarding tasks plus
//! its placement-sync task; every attached primitive owns one for its sync
//! task(s). Cancelling the scope tears the whole subtree down with a single
//! call, and flips the scope token *before* aborting so in-flight sync ticks
//! can observe the cancellation ahead of their next backend write.

use smallvec::SmallVec;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Observer side of a [`TaskScope`]: cheap to clone, checked by sync tasks
/// before every write
#[derive(Clone, Debug)]
pub struct ScopeToken(Arc<AtomicBool>);

impl ScopeToken {
    /// Whether the owning scope is still live
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns a group of tokio tasks that live and die together
#[derive(Debug)]
pub struct TaskScope {
    live: Arc<AtomicBool>,
    handles: SmallVec<[JoinHandle<()>; 4]>,
}

impl Default for TaskScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScope {
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
            handles: SmallVec::new(),
        }
    }

    pub fn token(&self) -> ScopeToken {
        ScopeToken(self.live.clone())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Spawn a task owned by this scope
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(future));
    }

    /// Cancel every task in the scope. The token goes dead first, then the
    /// tasks are aborted.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.shutdown();
    }
}
