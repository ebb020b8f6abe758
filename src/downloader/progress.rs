// Progress side channel.
//
// Every fetch task gets a `ProgressEmitter` backed by a `watch` channel.
// Observers look requests up in the `ProgressHub` by `RequestId` and see
// the latest sample per task. Samples are clamped so the byte count of one
// task never goes backwards; there is no ordering between tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::models::{ProgressSample, RequestId, StreamKind};

/// Producer side of one task's progress, plus the request's cancellation signal
#[derive(Debug, Clone)]
pub struct ProgressEmitter {
    sender: Arc<watch::Sender<ProgressSample>>,
    cancel: CancellationToken,
}

impl ProgressEmitter {
    /// Emitter that is not registered anywhere; samples are dropped
    pub fn detached(cancel: CancellationToken) -> Self {
        let (sender, _) = watch::channel(ProgressSample::default());
        Self {
            sender: Arc::new(sender),
            cancel,
        }
    }

    pub fn emit(&self, sample: ProgressSample) {
        self.sender.send_if_modified(|current| {
            let bytes = current.bytes_downloaded.max(sample.bytes_downloaded);
            let total = sample.bytes_total.or(current.bytes_total);
            if bytes == current.bytes_downloaded && total == current.bytes_total {
                return false;
            }
            current.bytes_downloaded = bytes;
            current.bytes_total = total;
            true
        });
    }

    /// Last emitted sample (persists after the task finishes)
    pub fn latest(&self) -> ProgressSample {
        *self.sender.borrow()
    }

    /// Observers can request cancellation through the emitter as well
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug, Default)]
struct RequestEntry {
    tasks: HashMap<StreamKind, watch::Receiver<ProgressSample>>,
    cancel: CancellationToken,
}

/// Registry of in-flight requests, keyed by request id
#[derive(Debug, Clone, Default)]
pub struct ProgressHub {
    inner: Arc<Mutex<HashMap<RequestId, RequestEntry>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a request cancellable through the hub before any task exists
    pub fn track(&self, request_id: RequestId, cancel: &CancellationToken) {
        if let Ok(mut map) = self.inner.lock() {
            map.entry(request_id).or_insert_with(|| RequestEntry {
                tasks: HashMap::new(),
                cancel: cancel.clone(),
            });
        }
    }

    /// Register a task for a request and get its emitter.
    pub fn register(
        &self,
        request_id: RequestId,
        kind: StreamKind,
        cancel: &CancellationToken,
    ) -> ProgressEmitter {
        let (sender, receiver) = watch::channel(ProgressSample::default());
        if let Ok(mut map) = self.inner.lock() {
            let entry = map.entry(request_id).or_insert_with(|| RequestEntry {
                tasks: HashMap::new(),
                cancel: cancel.clone(),
            });
            entry.tasks.insert(kind, receiver);
        }
        ProgressEmitter {
            sender: Arc::new(sender),
            cancel: cancel.clone(),
        }
    }

    /// Receiver for one task, to `await` changes
    pub fn subscribe(
        &self,
        request_id: RequestId,
        kind: StreamKind,
    ) -> Option<watch::Receiver<ProgressSample>> {
        let map = self.inner.lock().ok()?;
        map.get(&request_id)?.tasks.get(&kind).cloned()
    }

    /// Latest sample for each task of a request
    pub fn task_samples(&self, request_id: RequestId) -> Vec<(StreamKind, ProgressSample)> {
        let Ok(map) = self.inner.lock() else {
            return Vec::new();
        };
        let Some(entry) = map.get(&request_id) else {
            return Vec::new();
        };
        let mut samples: Vec<(StreamKind, ProgressSample)> = entry
            .tasks
            .iter()
            .map(|(kind, rx)| (*kind, *rx.borrow()))
            .collect();
        samples.sort_by_key(|(kind, _)| *kind == StreamKind::Audio);
        samples
    }

    /// Aggregate over all tasks of a request. The total is known only when
    /// every task reports one.
    pub fn snapshot(&self, request_id: RequestId) -> Option<ProgressSample> {
        let samples = self.task_samples(request_id);
        if samples.is_empty() {
            return None;
        }
        let bytes_downloaded = samples.iter().map(|(_, s)| s.bytes_downloaded).sum();
        let bytes_total = samples
            .iter()
            .map(|(_, s)| s.bytes_total)
            .sum::<Option<u64>>();
        Some(ProgressSample {
            bytes_downloaded,
            bytes_total,
        })
    }

    /// Ask a running request to stop. Returns false when the id is unknown.
    pub fn cancel(&self, request_id: RequestId) -> bool {
        match self.inner.lock() {
            Ok(map) => match map.get(&request_id) {
                Some(entry) => {
                    entry.cancel.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Drop a finished request from the registry
    pub fn remove(&self, request_id: RequestId) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(&request_id);
        }
    }

    pub fn contains(&self, request_id: RequestId) -> bool {
        self.inner
            .lock()
            .map(|map| map.contains_key(&request_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(bytes: u64, total: Option<u64>) -> ProgressSample {
        ProgressSample {
            bytes_downloaded: bytes,
            bytes_total: total,
        }
    }

    #[test]
    fn test_emitter_is_monotonic() {
        let emitter = ProgressEmitter::detached(CancellationToken::new());
        emitter.emit(sample(100, Some(1000)));
        emitter.emit(sample(40, None));
        assert_eq!(emitter.latest(), sample(100, Some(1000)));
        emitter.emit(sample(500, None));
        assert_eq!(emitter.latest(), sample(500, Some(1000)));
    }

    #[test]
    fn test_hub_snapshot_aggregates_tasks() {
        let hub = ProgressHub::new();
        let id = RequestId::new();
        let cancel = CancellationToken::new();
        let video = hub.register(id, StreamKind::Video, &cancel);
        let audio = hub.register(id, StreamKind::Audio, &cancel);

        video.emit(sample(300, Some(1000)));
        audio.emit(sample(50, None));
        assert_eq!(hub.snapshot(id), Some(sample(350, None)));

        audio.emit(sample(60, Some(200)));
        assert_eq!(hub.snapshot(id), Some(sample(360, Some(1200))));

        let samples = hub.task_samples(id);
        assert_eq!(samples[0].0, StreamKind::Video);
        assert_eq!(samples[1].0, StreamKind::Audio);
    }

    #[test]
    fn test_unknown_request() {
        let hub = ProgressHub::new();
        let id = RequestId::new();
        assert_eq!(hub.snapshot(id), None);
        assert!(!hub.cancel(id));
        assert!(hub.subscribe(id, StreamKind::Video).is_none());
    }

    #[test]
    fn test_cancel_through_hub_reaches_emitter() {
        let hub = ProgressHub::new();
        let id = RequestId::new();
        let emitter = hub.register(id, StreamKind::Video, &CancellationToken::new());
        assert!(!emitter.is_cancelled());
        assert!(hub.cancel(id));
        assert!(emitter.is_cancelled());
        hub.remove(id);
        assert!(!hub.contains(id));
    }

    #[tokio::test]
    async fn test_subscriber_sees_updates() {
        let hub = ProgressHub::new();
        let id = RequestId::new();
        let emitter = hub.register(id, StreamKind::Audio, &CancellationToken::new());
        let mut rx = hub.subscribe(id, StreamKind::Audio).unwrap();

        emitter.emit(sample(10, Some(20)));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), sample(10, Some(20)));
    }
}
