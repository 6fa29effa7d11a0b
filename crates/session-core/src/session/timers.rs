//! Session timers
//!
//! Each timer is a spawned sleep that posts [`SessionInput::Timer`] back into
//! the session loop. The loop accepts a firing only if its token is still the
//! current one for that kind and then re-checks the guarding state itself, so
//! a timer that raced with a state change is a silent no-op.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use super::SessionInput;

/// The four session timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Retransmits our 2xx until the ACK arrives
    Invite2xx,
    /// Timer H: gives up waiting for the ACK
    Ack,
    /// Rejects an unanswered incoming call
    NoAnswer,
    /// Expires header of an incoming INVITE
    Expires,
}

pub(crate) struct TimerSet {
    inputs: mpsc::UnboundedSender<SessionInput>,
    entries: HashMap<TimerKind, (u64, JoinHandle<()>)>,
    next_token: u64,
}

impl TimerSet {
    pub(crate) fn new(inputs: mpsc::UnboundedSender<SessionInput>) -> Self {
        Self {
            inputs,
            entries: HashMap::new(),
            next_token: 0,
        }
    }

    /// Schedule `kind`, replacing a pending timer of the same kind
    pub(crate) fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.cancel(kind);
        self.next_token += 1;
        let token = self.next_token;
        let inputs = self.inputs.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(SessionInput::Timer { kind, token });
        });
        trace!("Scheduled {:?} timer in {:?}", kind, delay);
        self.entries.insert(kind, (token, task));
    }

    pub(crate) fn cancel(&mut self, kind: TimerKind) {
        if let Some((_, task)) = self.entries.remove(&kind) {
            task.abort();
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, (_, task)) in self.entries.drain() {
            task.abort();
        }
    }

    /// Consume a firing. False when the timer was cancelled or rescheduled
    /// after this firing was queued.
    pub(crate) fn fired(&mut self, kind: TimerKind, token: u64) -> bool {
        match self.entries.get(&kind) {
            Some((current, _)) if *current == token => {
                self.entries.remove(&kind);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.entries.contains_key(&kind)
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_timer(rx: &mut mpsc::UnboundedReceiver<SessionInput>) -> (TimerKind, u64) {
        match rx.recv().await {
            Some(SessionInput::Timer { kind, token }) => (kind, token),
            _ => panic!("expected a timer input"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.schedule(TimerKind::NoAnswer, Duration::from_secs(60));
        assert!(timers.is_scheduled(TimerKind::NoAnswer));

        let (kind, token) = next_timer(&mut rx).await;
        assert_eq!(kind, TimerKind::NoAnswer);
        assert!(timers.fired(kind, token));
        assert!(!timers.fired(kind, token));
        assert!(!timers.is_scheduled(TimerKind::NoAnswer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduled_timer_invalidates_old_token() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.schedule(TimerKind::Invite2xx, Duration::from_millis(500));
        let (_, first) = next_timer(&mut rx).await;
        timers.schedule(TimerKind::Invite2xx, Duration::from_millis(1000));
        assert!(!timers.fired(TimerKind::Invite2xx, first));

        let (kind, second) = next_timer(&mut rx).await;
        assert!(timers.fired(kind, second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.schedule(TimerKind::Ack, Duration::from_secs(32));
        timers.schedule(TimerKind::Expires, Duration::from_secs(10));
        timers.cancel(TimerKind::Ack);
        timers.cancel_all();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }
}
