//! Session cache and single-flight login gate.
//!
//! Any number of concurrent calls may discover at the same time that no
//! session exists (or that the cached one just got rejected). Exactly one of
//! them gets to run the login; the rest subscribe to its outcome. A login
//! failure is fanned out to every subscriber, and a cancelled leader wakes
//! the subscribers so one of them can take over.

use crate::error::Result;
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub(crate) struct SessionManager {
    username: String,
    password: String,
    state: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    current: Option<String>,
    in_flight: Option<broadcast::Sender<Result<String>>>,
}

/// What a caller that needs a session should do next.
pub(crate) enum SessionGate<'a> {
    /// A session is cached; use it.
    Ready(String),
    /// Another task is logging in; wait for its broadcast. A closed channel
    /// means the leader went away without an outcome, so re-enter the gate.
    Wait(broadcast::Receiver<Result<String>>),
    /// This caller is the leader and must perform the login, then report
    /// the outcome through [`LoginLead::finish`].
    Lead(LoginLead<'a>),
}

/// Exclusive right (and obligation) to run the login.
pub(crate) struct LoginLead<'a> {
    manager: &'a SessionManager,
    tx: Option<broadcast::Sender<Result<String>>>,
}

impl SessionManager {
    pub(crate) fn new(username: String, password: String) -> Self {
        SessionManager {
            username,
            password,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub(crate) fn credentials(&self) -> (&str, &str) {
        (&self.username, &self.password)
    }

    pub(crate) fn gate(&self) -> SessionGate<'_> {
        let mut state = self.state.lock();

        if let Some(session) = &state.current {
            return SessionGate::Ready(session.clone());
        }
        if let Some(tx) = &state.in_flight {
            return SessionGate::Wait(tx.subscribe());
        }

        // One slot in the channel is enough: the lead sends exactly once.
        let (tx, _) = broadcast::channel(1);
        state.in_flight = Some(tx.clone());
        SessionGate::Lead(LoginLead {
            manager: self,
            tx: Some(tx),
        })
    }

    /// Drops the cached session, but only if it is still the one the caller
    /// saw fail. Later sessions survive, so a burst of rejections against an
    /// already-replaced session triggers no extra logins.
    pub(crate) fn invalidate(&self, stale: &str) {
        let mut state = self.state.lock();
        if state.current.as_deref() == Some(stale) {
            tracing::debug!("Dropping rejected session");
            state.current = None;
        }
    }
}

impl LoginLead<'_> {
    /// Records the login outcome and wakes every waiter with a copy of it.
    pub(crate) fn finish(mut self, outcome: &Result<String>) {
        if let Some(tx) = self.tx.take() {
            {
                let mut state = self.manager.state.lock();
                if let Ok(session) = outcome {
                    state.current = Some(session.clone());
                }
                state.in_flight = None;
            }
            // No receivers is fine; the lead's own caller already has the
            // outcome in hand.
            let _ = tx.send(outcome.clone());
        }
    }
}

impl Drop for LoginLead<'_> {
    fn drop(&mut self) {
        // Reached only when the leader was cancelled mid-login. Dropping the
        // sender closes the channel, which sends every waiter back through
        // the gate.
        if self.tx.take().is_some() {
            self.manager.state.lock().in_flight = None;
        }
    }
}
