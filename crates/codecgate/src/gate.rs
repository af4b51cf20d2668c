//! # Module readiness gate
//!
//! [`ModuleGate`] starts loading a [`CodecModule`] in the background and hands
//! out a future per `parse_codec` call. Calls that arrive while the module is
//! still loading are parked in a FIFO queue of oneshot senders; when the load
//! settles, the queue is drained exactly once, in arrival order, and every
//! parked caller receives the same module handle or the same load failure.
//!
//! ```text
//!            load ok + exports present
//!   Loading ───────────────────────────▶ Ready   (calls go straight to the module)
//!      │
//!      └── load error / panic / abort ─▶ Failed  (every call: ModuleLoadError)
//! ```
//!
//! The state and the queue live under one `std::sync::Mutex` that is never
//! held across an await.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use codecgate_params::ParameterSets;
use tokio::sync::oneshot;

use crate::config::{Admission, GateConfig};
use crate::error::{CodecError, ModuleLoadError};
use crate::module::{self, CodecModule, EntryPoint, LoadResult};
use crate::outcome::ParseOutcome;

/// Coarse view of the gate for callers that want to report on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStatus {
    Loading,
    Ready,
    Failed(ModuleLoadError),
}

/// Shared handle to one module and its load lifecycle.
///
/// Cloning is cheap; every clone observes the same state.
#[derive(Clone)]
pub struct ModuleGate {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<GateState>,
    /// Arrival counter for queued requests.
    arrivals: AtomicU64,
}

enum GateState {
    Loading(VecDeque<PendingRequest>),
    Ready(Arc<ModuleHandle>),
    Failed(ModuleLoadError),
}

/// A caller parked until the module settles.
struct PendingRequest {
    seq: u64,
    tx: oneshot::Sender<Result<Arc<ModuleHandle>, ModuleLoadError>>,
}

/// The loaded module plus the lock that serializes calls into it, if any.
struct ModuleHandle {
    module: Arc<dyn CodecModule>,
    admission: Option<tokio::sync::Mutex<()>>,
}

impl ModuleHandle {
    fn new(module: Arc<dyn CodecModule>, admission: Admission) -> Result<Self, ModuleLoadError> {
        if let Some(missing) = EntryPoint::ALL.into_iter().find(|e| !module.exports(*e)) {
            return Err(ModuleLoadError::new(format!(
                "module does not export {missing}"
            )));
        }
        let serialize = match admission {
            Admission::Auto => !module.is_reentrant(),
            Admission::Serial => true,
            Admission::Concurrent => false,
        };
        Ok(Self {
            module,
            admission: serialize.then(|| tokio::sync::Mutex::new(())),
        })
    }

    async fn call(&self, sets: &ParameterSets) -> ParseOutcome {
        // tokio's Mutex queues waiters fairly, so admission stays FIFO.
        let _admitted = match &self.admission {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        let produced = match &sets.vps {
            Some(vps) => self.module.parse_h265(vps, &sets.sps, &sets.pps),
            None => self.module.parse_h264(&sets.sps, &sets.pps),
        };
        match produced {
            Some(Ok(desc)) => Ok(desc),
            Some(Err(e)) => {
                tracing::debug!(error = %e, "parameter sets rejected");
                Err(CodecError::Parse(e))
            }
            None => {
                tracing::warn!("module returned no result");
                Err(CodecError::EmptyResult)
            }
        }
    }
}

impl ModuleGate {
    /// Start loading in the background and return immediately.
    ///
    /// Must be called from within a Tokio runtime. The loader runs as its own
    /// task; if it panics or is aborted the gate settles as failed.
    pub fn spawn<F>(load: F, admission: Admission) -> Self
    where
        F: Future<Output = LoadResult> + Send + 'static,
    {
        let gate = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(GateState::Loading(VecDeque::new())),
                arrivals: AtomicU64::new(0),
            }),
        };

        let loader = tokio::spawn(load);
        let settler = gate.clone();
        tokio::spawn(async move {
            let settled = match loader.await {
                Ok(Ok(module)) => ModuleHandle::new(module, admission).map(Arc::new),
                Ok(Err(e)) => Err(e),
                Err(join) if join.is_panic() => {
                    Err(ModuleLoadError::new("module load task panicked"))
                }
                Err(_) => Err(ModuleLoadError::new("module load task was aborted")),
            };
            settler.settle(settled);
        });

        gate
    }

    /// Gate over the module named in `config`.
    pub fn from_config(config: &GateConfig) -> Self {
        tracing::info!(
            source = ?config.module.source,
            admission = ?config.module.admission,
            "loading codec module"
        );
        Self::spawn(module::load(config.module.source), config.module.admission)
    }

    /// Parse one set of parameter units. Uses the H.265 entry point when a
    /// VPS is supplied, the H.264 one otherwise.
    ///
    /// Suspends while the module is loading; never busy-polls. `vps` is a
    /// plain `Option<Bytes>` so that `None` needs no annotation; callers with
    /// another byte form use [`parse_hevc`](Self::parse_hevc).
    pub async fn parse_codec(
        &self,
        sps: impl Into<Bytes>,
        pps: impl Into<Bytes>,
        vps: Option<Bytes>,
    ) -> ParseOutcome {
        self.parse(ParameterSets {
            vps,
            sps: sps.into(),
            pps: pps.into(),
        })
        .await
    }

    /// [`parse_codec`](Self::parse_codec) without a VPS, taking any byte form.
    pub async fn parse_avc(&self, sps: impl Into<Bytes>, pps: impl Into<Bytes>) -> ParseOutcome {
        self.parse(ParameterSets::avc(sps, pps)).await
    }

    /// [`parse_codec`](Self::parse_codec) with a VPS, taking any byte form.
    pub async fn parse_hevc(
        &self,
        vps: impl Into<Bytes>,
        sps: impl Into<Bytes>,
        pps: impl Into<Bytes>,
    ) -> ParseOutcome {
        self.parse(ParameterSets::hevc(vps, sps, pps)).await
    }

    pub async fn parse(&self, sets: ParameterSets) -> ParseOutcome {
        let handle = self.acquire().await?;
        handle.call(&sets).await
    }

    pub fn status(&self) -> GateStatus {
        match &*self.lock_state() {
            GateState::Loading(_) => GateStatus::Loading,
            GateState::Ready(_) => GateStatus::Ready,
            GateState::Failed(e) => GateStatus::Failed(e.clone()),
        }
    }

    /// Number of callers parked on the load.
    pub fn pending(&self) -> usize {
        match &*self.lock_state() {
            GateState::Loading(queue) => queue.len(),
            _ => 0,
        }
    }

    /// Suspend until the load settles. Returns `true` if the module is ready.
    ///
    /// While loading, the waiter occupies a queue slot like any other caller.
    pub async fn wait_settled(&self) -> bool {
        self.acquire().await.is_ok()
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire(&self) -> Result<Arc<ModuleHandle>, ModuleLoadError> {
        let rx = {
            let mut state = self.lock_state();
            match &mut *state {
                GateState::Ready(handle) => return Ok(Arc::clone(handle)),
                GateState::Failed(e) => return Err(e.clone()),
                GateState::Loading(queue) => {
                    let (tx, rx) = oneshot::channel();
                    let seq = self.inner.arrivals.fetch_add(1, Ordering::Relaxed);
                    queue.push_back(PendingRequest { seq, tx });
                    tracing::debug!(seq, queued = queue.len(), "module loading, request parked");
                    rx
                }
            }
        };
        rx.await
            .unwrap_or_else(|_| Err(ModuleLoadError::new("gate dropped before the module settled")))
    }

    /// Leave Loading exactly once and release every parked caller in order.
    fn settle(&self, settled: Result<Arc<ModuleHandle>, ModuleLoadError>) {
        let mut state = self.lock_state();
        let next = match &settled {
            Ok(handle) => GateState::Ready(Arc::clone(handle)),
            Err(e) => GateState::Failed(e.clone()),
        };
        let queue = match std::mem::replace(&mut *state, next) {
            GateState::Loading(queue) => queue,
            previous => {
                *state = previous;
                return;
            }
        };

        match &settled {
            Ok(_) => tracing::info!(released = queue.len(), "codec module ready"),
            Err(e) => tracing::warn!(released = queue.len(), reason = %e.reason, "codec module failed to load"),
        }

        for request in queue {
            // A caller that stopped waiting has dropped its receiver.
            if request.tx.send(settled.clone()).is_err() {
                tracing::debug!(seq = request.seq, "parked caller went away");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::load_native;

    const SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1F, 0xED, 0x00, 0xA0, 0x0B, 0x72];
    const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

    #[tokio::test]
    async fn starts_loading_and_settles_ready() {
        let (release, gate_open) = oneshot::channel::<()>();
        let gate = ModuleGate::spawn(
            async move {
                let _ = gate_open.await;
                load_native().await
            },
            Admission::Auto,
        );
        assert_eq!(gate.status(), GateStatus::Loading);
        assert_eq!(gate.pending(), 0);

        release.send(()).unwrap();
        assert!(gate.wait_settled().await);
        assert_eq!(gate.status(), GateStatus::Ready);
    }

    #[tokio::test]
    async fn settle_happens_once() {
        let gate = ModuleGate::spawn(load_native(), Admission::Auto);
        assert!(gate.wait_settled().await);

        gate.settle(Err(ModuleLoadError::new("late failure")));
        assert_eq!(gate.status(), GateStatus::Ready);
        assert!(gate.parse_codec(SPS, PPS, None).await.is_ok());
    }

    #[tokio::test]
    async fn native_module_is_not_serialized_by_default() {
        let gate = ModuleGate::spawn(load_native(), Admission::Auto);
        let handle = gate.acquire().await.unwrap();
        assert!(handle.admission.is_none());

        let gate = ModuleGate::spawn(load_native(), Admission::Serial);
        let handle = gate.acquire().await.unwrap();
        assert!(handle.admission.is_some());
    }
}
