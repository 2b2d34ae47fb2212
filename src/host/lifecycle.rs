//! Lifecycle bookkeeping shared by every runtime variant.
//!
//! Calls hold a read guard on the state for their whole duration. `Start`, `Stop` and a
//! forced `Abort` take the write guard, so they wait for in-flight calls to reach a
//! terminal state and no call can straddle a transition. The control mutex keeps the
//! transitions themselves mutually exclusive.

use std::sync::{Mutex as StdMutex, MutexGuard as StdMutexGuard};

use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::events::{Broker, Event, EventSubscription, StartedEvent};
use crate::context::{CallContext, CancelToken};
use crate::error::HostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Stopped,
    Running,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: RwLock<State>,
    control: Mutex<()>,
    abort: StdMutex<CancelToken>,
    notifier: Broker<Event>,
}

impl Lifecycle {
    pub(crate) fn new(event_buffer: usize) -> Self {
        Lifecycle {
            state: RwLock::new(State::Stopped),
            control: Mutex::new(()),
            abort: StdMutex::new(CancelToken::new()),
            notifier: Broker::new(event_buffer),
        }
    }

    fn abort_token(&self) -> StdMutexGuard<'_, CancelToken> {
        self.abort.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancels everything currently in flight and arms a fresh token for later calls.
    fn cancel_in_flight(&self) {
        let previous = std::mem::take(&mut *self.abort_token());
        previous.cancel();
    }

    /// Admits a call. Fails with `NotReady` unless the runtime is running.
    ///
    /// The returned context is additionally cancelled by `Abort`.
    pub(crate) async fn begin_call(&self, ctx: &CallContext) -> Result<ActiveCall<'_>, HostError> {
        let state = self.state.read().await;
        if *state != State::Running {
            return Err(HostError::NotReady);
        }
        let ctx = ctx.child(&self.abort_token());
        Ok(ActiveCall { _state: state, ctx })
    }

    /// Enters an exclusive lifecycle transition.
    ///
    /// With `cancel_in_flight` the running calls are cancelled first, so the transition
    /// waits only for them to unwind rather than to finish.
    pub(crate) async fn transition(&self, cancel_in_flight: bool) -> Transition<'_> {
        let control = self.control.lock().await;
        if cancel_in_flight {
            self.cancel_in_flight();
        }
        let state = self.state.write().await;
        Transition { _control: control, state, notifier: &self.notifier }
    }

    /// Cancels in-flight calls without changing state.
    pub(crate) async fn interrupt(&self) {
        let _control = self.control.lock().await;
        self.cancel_in_flight();
        tracing::debug!("in-flight calls interrupted");
    }

    pub(crate) async fn is_running(&self) -> bool {
        *self.state.read().await == State::Running
    }

    pub(crate) fn watch(&self) -> (tokio::sync::mpsc::Receiver<Event>, EventSubscription) {
        self.notifier.subscribe()
    }

    pub(crate) fn publish(&self, event: Event) -> usize {
        self.notifier.broadcast(event)
    }

    pub(crate) fn dropped_events(&self) -> u64 {
        self.notifier.dropped()
    }
}

/// A call admitted while the runtime is running.
pub(crate) struct ActiveCall<'a> {
    _state: RwLockReadGuard<'a, State>,
    pub(crate) ctx: CallContext,
}

/// Exclusive access to the lifecycle state for the duration of a transition.
pub(crate) struct Transition<'a> {
    _control: MutexGuard<'a, ()>,
    state: RwLockWriteGuard<'a, State>,
    notifier: &'a Broker<Event>,
}

impl Transition<'_> {
    pub(crate) fn is_running(&self) -> bool {
        *self.state == State::Running
    }

    /// Marks the runtime running and announces it. Returns `false` if it already was.
    pub(crate) fn started(&mut self, event: StartedEvent) -> bool {
        if self.is_running() {
            return false;
        }
        *self.state = State::Running;
        tracing::info!(version = %event.version, tee = event.capability_tee.is_some(), "runtime started");
        self.notifier.broadcast(Event::Started(event));
        true
    }

    /// Marks the runtime stopped and announces it. Returns `false` if it already was.
    pub(crate) fn stopped(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        *self.state = State::Stopped;
        tracing::info!("runtime stopped");
        self.notifier.broadcast(Event::Stopped);
        true
    }

    pub(crate) fn failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(%reason, "runtime failed to start");
        self.notifier.broadcast(Event::FailedToStart { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Version;

    fn started() -> StartedEvent {
        StartedEvent { version: Version::new(1, 0, 0), capability_tee: None }
    }

    #[tokio::test]
    async fn test_calls_require_running_state() {
        let lc = Lifecycle::new(4);
        assert!(matches!(lc.begin_call(&CallContext::background()).await, Err(HostError::NotReady)));

        assert!(lc.transition(false).await.started(started()));
        assert!(lc.begin_call(&CallContext::background()).await.is_ok());
    }

    #[tokio::test]
    async fn test_transitions_are_idempotent() {
        let lc = Lifecycle::new(4);
        let (mut rx, _sub) = lc.watch();

        assert!(lc.transition(false).await.started(started()));
        assert!(!lc.transition(false).await.started(started()));
        assert!(lc.transition(false).await.stopped());
        assert!(!lc.transition(false).await.stopped());

        assert!(matches!(rx.try_recv(), Ok(Event::Started(_))));
        assert_eq!(rx.try_recv().unwrap(), Event::Stopped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_interrupt_cancels_admitted_calls_only() {
        let lc = Lifecycle::new(4);
        lc.transition(false).await.started(started());

        let ctx = {
            let call = lc.begin_call(&CallContext::background()).await.unwrap();
            call.ctx.clone()
        };
        lc.interrupt().await;
        assert_eq!(ctx.check(), Err(HostError::Cancelled));

        let call = lc.begin_call(&CallContext::background()).await.unwrap();
        assert!(call.ctx.check().is_ok());
    }
}
