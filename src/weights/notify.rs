//! Change notification for parameter sets.
//!
//! A [`ChangeNotifier`] fans a published change out to callback observers
//! and to bounded [`ChangeStream`] subscriptions. Publishing never blocks: a
//! full stream drops the notice and the drop is counted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::NotifierConfig;

/// Unique identifier for a parameter set instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSetId(Uuid);

impl ParameterSetId {
    /// Create a new random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParameterSetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParameterSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notice that a parameter set changed. Carries no weights; observers read
/// the published state from the set itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterChange {
    /// Set that changed.
    pub source: ParameterSetId,
    /// Display name of that set.
    pub name: String,
    /// 1 for the first change of a set, incremented per published update.
    pub sequence: u64,
    /// When the change was published.
    pub at: DateTime<Utc>,
}

/// Callback observer of parameter changes.
pub trait ParameterObserver: Send + Sync {
    /// Called synchronously after each published change.
    fn parameters_changed(&self, change: &ParameterChange);
}

/// Receiving end of a change subscription.
#[derive(Debug)]
pub struct ChangeStream {
    rx: Receiver<ParameterChange>,
}

impl ChangeStream {
    /// Next pending change, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<ParameterChange> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next change.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ParameterChange> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// All pending changes.
    #[must_use]
    pub fn drain(&self) -> Vec<ParameterChange> {
        self.rx.try_iter().collect()
    }
}

fn same_observer(a: &Arc<dyn ParameterObserver>, b: &Arc<dyn ParameterObserver>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Observer registry and stream fan-out for one parameter set.
pub struct ChangeNotifier {
    id: ParameterSetId,
    cfg: NotifierConfig,
    observers: Vec<Arc<dyn ParameterObserver>>,
    streams: Vec<Sender<ParameterChange>>,
    sequence: u64,
    dropped: u64,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("id", &self.id)
            .field("observers", &self.observers.len())
            .field("streams", &self.streams.len())
            .field("sequence", &self.sequence)
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

impl ChangeNotifier {
    /// A notifier with a fresh set id and no listeners.
    #[must_use]
    pub fn new(cfg: NotifierConfig) -> Self {
        Self {
            id: ParameterSetId::new(),
            cfg,
            observers: Vec::new(),
            streams: Vec::new(),
            sequence: 0,
            dropped: 0,
        }
    }

    /// Id stamped on every change.
    #[must_use]
    pub const fn id(&self) -> ParameterSetId {
        self.id
    }

    /// Published changes so far.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Notices dropped because a stream was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of registered callback observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Register `observer` unless it is already registered.
    pub fn add_observer(&mut self, observer: Arc<dyn ParameterObserver>) -> bool {
        if self.observers.iter().any(|o| same_observer(o, &observer)) {
            return false;
        }
        self.observers.push(observer);
        true
    }

    /// Unregister `observer`. Returns false if it was not registered.
    pub fn remove_observer(&mut self, observer: &Arc<dyn ParameterObserver>) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| !same_observer(o, observer));
        self.observers.len() != before
    }

    /// Open a bounded subscription. Dropping the stream unsubscribes.
    pub fn subscribe(&mut self) -> ChangeStream {
        let (tx, rx) = bounded(self.cfg.stream_capacity.max(1));
        self.streams.push(tx);
        ChangeStream { rx }
    }

    /// Publish one change to every observer and stream.
    pub fn notify(&mut self, name: &str) -> ParameterChange {
        self.sequence += 1;
        let change = ParameterChange {
            source: self.id,
            name: name.to_string(),
            sequence: self.sequence,
            at: Utc::now(),
        };

        for observer in &self.observers {
            observer.parameters_changed(&change);
        }

        let mut dropped = 0;
        self.streams.retain(|tx| match tx.try_send(change.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        if dropped > 0 {
            warn!("{name}: dropped change {} for {dropped} full stream(s)", change.sequence);
            self.dropped += dropped;
        }

        debug!(
            "{name}: change {} sent to {} observer(s), {} stream(s)",
            change.sequence,
            self.observers.len(),
            self.streams.len()
        );
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl ParameterObserver for Counter {
        fn parameters_changed(&self, _change: &ParameterChange) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn observers_registered_once() {
        let mut notifier = ChangeNotifier::default();
        let counter = Arc::new(Counter::default());
        let observer: Arc<dyn ParameterObserver> = counter.clone();

        assert!(notifier.add_observer(observer.clone()));
        assert!(!notifier.add_observer(observer.clone()));
        notifier.notify("w");
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);

        assert!(notifier.remove_observer(&observer));
        notifier.notify("w");
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn streams_receive_in_order_and_drop_when_full() {
        let mut notifier = ChangeNotifier::new(NotifierConfig { stream_capacity: 2 });
        let stream = notifier.subscribe();

        for _ in 0..3 {
            notifier.notify("w");
        }
        let seqs: Vec<u64> = stream.drain().iter().map(|c| c.sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(notifier.dropped(), 1);
    }

    #[test]
    fn dropped_stream_is_unsubscribed() {
        let mut notifier = ChangeNotifier::default();
        drop(notifier.subscribe());
        let kept = notifier.subscribe();
        notifier.notify("w");
        assert_eq!(notifier.streams.len(), 1);
        assert_eq!(kept.try_recv().map(|c| c.name), Some("w".to_string()));
    }
}
