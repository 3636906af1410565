//! Event fan-out to subscribed responders.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use wiregate_proto::{EventKind, GatewayEvent, Payload};

/// Application handler for gateway events.
///
/// Each matching event is handled in its own task; a failing or panicking
/// responder never affects the connection or other responders.
#[async_trait]
pub trait Responder: Send + Sync + 'static {
    /// Event kinds this responder wants.
    fn handles(&self) -> &[EventKind];

    /// Handle one event. `cancel` fires when the connection is torn down.
    async fn respond(
        &self,
        event: Arc<GatewayEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()>;
}

/// Responder built from a closure.
pub struct FnResponder<F> {
    kinds: Vec<EventKind>,
    handler: F,
}

impl<F, Fut> FnResponder<F>
where
    F: Fn(Arc<GatewayEvent>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    /// Responder calling `handler` for each event of the given kinds.
    pub fn new(kinds: impl Into<Vec<EventKind>>, handler: F) -> Self {
        Self {
            kinds: kinds.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> Responder for FnResponder<F>
where
    F: Fn(Arc<GatewayEvent>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handles(&self) -> &[EventKind] {
        &self.kinds
    }

    async fn respond(
        &self,
        event: Arc<GatewayEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        (self.handler)(event, cancel).await
    }
}

impl<F> fmt::Debug for FnResponder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResponder")
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

/// Set of subscribed responders, keyed by identity.
#[derive(Default)]
pub struct ResponderRegistry {
    responders: RwLock<Vec<Arc<dyn Responder>>>,
}

impl ResponderRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a responder. Returns `false` if it was already subscribed.
    pub fn subscribe(&self, responder: Arc<dyn Responder>) -> bool {
        let mut responders = self.responders.write();
        if responders.iter().any(|r| same(r, &responder)) {
            return false;
        }
        responders.push(responder);
        true
    }

    /// Remove a responder. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, responder: &Arc<dyn Responder>) -> bool {
        let mut responders = self.responders.write();
        let before = responders.len();
        responders.retain(|r| !same(r, responder));
        responders.len() != before
    }

    /// Number of subscribed responders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.responders.read().len()
    }

    /// Whether no responders are subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.responders.read().is_empty()
    }

    /// Snapshot of responders handling `kind`.
    #[must_use]
    pub fn matching(&self, kind: EventKind) -> Vec<Arc<dyn Responder>> {
        self.responders
            .read()
            .iter()
            .filter(|r| r.handles().contains(&kind))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for ResponderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponderRegistry")
            .field("len", &self.len())
            .finish()
    }
}

fn same(a: &Arc<dyn Responder>, b: &Arc<dyn Responder>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

struct Running {
    kind: EventKind,
    sequence: u64,
    handle: JoinHandle<anyhow::Result<()>>,
}

/// Spawns responder tasks and tracks them until they finish.
///
/// Owned by the control task; reaping is driven by its ticks.
pub(crate) struct Dispatcher {
    registry: Arc<ResponderRegistry>,
    running: VecDeque<Running>,
}

impl Dispatcher {
    pub(crate) fn new(registry: Arc<ResponderRegistry>) -> Self {
        Self {
            registry,
            running: VecDeque::new(),
        }
    }

    /// Number of responder tasks not yet finalized.
    pub(crate) fn in_flight(&self) -> usize {
        self.running.len()
    }

    /// Hand a dispatch to every responder that handles its kind.
    ///
    /// Other payloads are ignored.
    pub(crate) fn dispatch(&mut self, payload: Payload, cancel: &CancellationToken) {
        let Payload::Dispatch { sequence, event } = payload else {
            trace!(payload = payload.name(), "Ignoring non-dispatch payload");
            return;
        };

        let kind = event.kind();
        let responders = self.registry.matching(kind);
        if responders.is_empty() {
            trace!(event = event.name(), sequence, "No responders for event");
            return;
        }

        let event = Arc::new(event);
        for responder in responders {
            let event = Arc::clone(&event);
            let cancel = cancel.child_token();
            let handle = tokio::spawn(async move { responder.respond(event, cancel).await });
            self.running.push_back(Running {
                kind,
                sequence,
                handle,
            });
        }
    }

    /// Finalize the oldest responder task if it has finished, otherwise move
    /// it to the back of the queue.
    pub(crate) async fn reap_one(&mut self) {
        let Some(running) = self.running.pop_front() else {
            return;
        };

        if running.handle.is_finished() {
            let Running {
                kind,
                sequence,
                handle,
            } = running;
            report(kind, sequence, handle.await);
        } else {
            self.running.push_back(running);
        }
    }

    /// Wait up to `timeout` for every responder task, aborting the rest.
    pub(crate) async fn drain(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;

        while let Some(mut running) = self.running.pop_front() {
            match tokio::time::timeout_at(deadline, &mut running.handle).await {
                Ok(result) => report(running.kind, running.sequence, result),
                Err(_) => {
                    warn!(
                        kind = ?running.kind,
                        sequence = running.sequence,
                        "Aborting gateway event responder that did not finish"
                    );
                    running.handle.abort();
                }
            }
        }
    }
}

fn report(kind: EventKind, sequence: u64, result: Result<anyhow::Result<()>, JoinError>) {
    match result {
        Ok(Ok(())) => trace!(?kind, sequence, "Gateway event responder finished"),
        Ok(Err(e)) => warn!(?kind, sequence, error = %e, "Error in gateway event responder"),
        Err(e) if e.is_panic() => warn!(?kind, sequence, "Gateway event responder panicked"),
        Err(_) => debug!(?kind, sequence, "Gateway event responder was cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiregate_proto::{Snowflake, UnavailableGuild};

    fn guild_delete(sequence: u64) -> Payload {
        Payload::Dispatch {
            sequence,
            event: GatewayEvent::GuildDelete(UnavailableGuild {
                id: Snowflake::new(1),
                unavailable: true,
            }),
        }
    }

    fn counting(kinds: Vec<EventKind>, counter: &Arc<AtomicUsize>) -> Arc<dyn Responder> {
        let counter = Arc::clone(counter);
        Arc::new(FnResponder::new(kinds, move |_event, _cancel| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let registry = ResponderRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let responder = counting(vec![EventKind::GuildDelete], &counter);

        assert!(registry.subscribe(Arc::clone(&responder)));
        assert!(!registry.subscribe(Arc::clone(&responder)));
        assert_eq!(registry.len(), 1);

        assert!(registry.unsubscribe(&responder));
        assert!(!registry.unsubscribe(&responder));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_matching_filters_by_kind() {
        let registry = ResponderRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.subscribe(counting(vec![EventKind::GuildDelete], &counter));
        registry.subscribe(counting(
            vec![EventKind::MessageCreate, EventKind::GuildDelete],
            &counter,
        ));
        registry.subscribe(counting(vec![EventKind::TypingStart], &counter));

        assert_eq!(registry.matching(EventKind::GuildDelete).len(), 2);
        assert_eq!(registry.matching(EventKind::MessageCreate).len(), 1);
        assert!(registry.matching(EventKind::Unknown).is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_and_reap() {
        let registry = Arc::new(ResponderRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        registry.subscribe(counting(vec![EventKind::GuildDelete], &counter));
        registry.subscribe(counting(vec![EventKind::MessageCreate], &counter));

        let mut dispatcher = Dispatcher::new(Arc::clone(&registry));
        let cancel = CancellationToken::new();
        dispatcher.dispatch(guild_delete(1), &cancel);
        dispatcher.dispatch(Payload::Reconnect, &cancel);
        assert_eq!(dispatcher.in_flight(), 1);

        dispatcher.drain(Duration::from_secs(1)).await;
        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_responder_is_isolated() {
        let registry = Arc::new(ResponderRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        registry.subscribe(Arc::new(FnResponder::new(
            vec![EventKind::GuildDelete],
            |_event, _cancel| async { anyhow::bail!("boom") },
        )));
        registry.subscribe(Arc::new(FnResponder::new(
            vec![EventKind::GuildDelete],
            |_event, _cancel| async { panic!("responder panic") },
        )));
        registry.subscribe(counting(vec![EventKind::GuildDelete], &counter));

        let mut dispatcher = Dispatcher::new(registry);
        dispatcher.dispatch(guild_delete(2), &CancellationToken::new());
        assert_eq!(dispatcher.in_flight(), 3);

        while dispatcher.in_flight() > 0 {
            dispatcher.reap_one().await;
            tokio::task::yield_now().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_stuck_responders() {
        let registry = Arc::new(ResponderRegistry::new());
        registry.subscribe(Arc::new(FnResponder::new(
            vec![EventKind::GuildDelete],
            |_event, _cancel| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            },
        )));

        let mut dispatcher = Dispatcher::new(registry);
        dispatcher.dispatch(guild_delete(3), &CancellationToken::new());

        let started = Instant::now();
        dispatcher.drain(Duration::from_secs(2)).await;
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_responders_observe_cancellation() {
        let registry = Arc::new(ResponderRegistry::new());
        registry.subscribe(Arc::new(FnResponder::new(
            vec![EventKind::GuildDelete],
            |_event, cancel: CancellationToken| async move {
                cancel.cancelled().await;
                Ok(())
            },
        )));

        let mut dispatcher = Dispatcher::new(registry);
        let cancel = CancellationToken::new();
        dispatcher.dispatch(guild_delete(4), &cancel);

        cancel.cancel();
        dispatcher.drain(Duration::from_secs(5)).await;
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
