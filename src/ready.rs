//! One-shot, replayable readiness gate over the connection normalizer.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::connection::{self, Connection, ConnectionSource};
use crate::error::ConnectionError;
use crate::events::{EventBus, StorageEvent};

type GateOutcome = Result<Connection, Arc<ConnectionError>>;

/// Cached one-shot completion signal for the store connection.
///
/// Any number of callers may await [`ReadinessGate::ready`] concurrently,
/// before or after resolution; the underlying normalization runs at most
/// once and every caller observes the identical terminal outcome.
///
/// Normalization runs on its own task, so a waiter cancelled mid-flight
/// (a host-side timeout dropping an upload future) does not abandon the
/// attempt: later callers still observe its real outcome.
#[derive(Debug)]
pub(crate) struct ReadinessGate {
    state: Mutex<GateState>,
}

#[derive(Debug)]
enum GateState {
    Idle(ConnectionSource),
    Running(watch::Receiver<Option<GateOutcome>>),
}

impl ReadinessGate {
    pub(crate) fn new(source: ConnectionSource) -> Self {
        Self {
            state: Mutex::new(GateState::Idle(source)),
        }
    }

    /// Resolves the connection, triggering normalization on first use and
    /// replaying the cached outcome afterwards.
    pub(crate) async fn ready(&self, events: &EventBus) -> GateOutcome {
        let mut outcome = self.observe(events);
        let settled = outcome
            .wait_for(|value| value.is_some())
            .await
            .ok()
            .and_then(|value| value.as_ref().cloned());
        match settled {
            Some(result) => result,
            // The sender only drops after publishing, so an empty closed
            // channel means the runtime tore the task down underneath us.
            None => Err(Arc::new(ConnectionError::new(
                "connection attempt was torn down before completing",
            ))),
        }
    }

    /// Returns the receiver tracking the single normalization attempt,
    /// spawning the attempt on first use.
    fn observe(&self, events: &EventBus) -> watch::Receiver<Option<GateOutcome>> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let GateState::Running(outcome) = &*state {
            return outcome.clone();
        }

        let (tx, rx) = watch::channel(None);
        let previous = std::mem::replace(&mut *state, GateState::Running(rx.clone()));
        drop(state);
        if let GateState::Idle(source) = previous {
            let events = events.clone();
            tokio::spawn(async move {
                let _ = tx.send(Some(normalize_and_publish(source, &events).await));
            });
        }
        rx
    }

    /// Returns the resolved connection without triggering normalization.
    pub(crate) fn current(&self) -> Option<Connection> {
        match &*self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            GateState::Running(outcome) => outcome.borrow().clone().and_then(Result::ok),
            GateState::Idle(_) => None,
        }
    }
}

async fn normalize_and_publish(source: ConnectionSource, events: &EventBus) -> GateOutcome {
    match connection::normalize(source).await {
        Ok(conn) => {
            tracing::debug!(owned = conn.owned, "store connection ready");
            events.emit(StorageEvent::Connection {
                db: Arc::clone(&conn.db),
                client: conn.client.clone(),
            });
            spawn_fault_forwarding(&conn, events.clone());
            Ok(conn)
        }
        Err(err) => {
            tracing::warn!(error = %err, "store connection failed");
            let err = Arc::new(err);
            events.emit(StorageEvent::ConnectionFailed(Arc::clone(&err)));
            Err(err)
        }
    }
}

/// Republishes the resolved client's (or store's) native fault stream as
/// `dbError` events. Purely observational; lag and closure end the task.
fn spawn_fault_forwarding(conn: &Connection, events: EventBus) {
    let receiver = conn
        .client
        .as_ref()
        .and_then(|client| client.error_stream())
        .or_else(|| conn.db.error_stream());
    let Some(mut receiver) = receiver else {
        return;
    };

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(fault) => {
                    tracing::warn!(error = %fault, "store reported a fault");
                    events.emit(StorageEvent::DbError(fault));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
