use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use crate::{
    config::EngineAssets,
    engine::{Engine, EngineEvent, EngineFactory},
    error::{CompressError, CompressResult},
};

/// Identifies one engine construction; events carry it so stale handles can be ignored.
pub type HandleId = u64;

pub type HandleEventSink = Arc<dyn Fn(HandleId, EngineEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    Terminated,
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An engine plus the lifecycle state the manager tracks for it.
pub struct EngineHandle {
    id: HandleId,
    engine: Box<dyn Engine>,
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl EngineHandle {
    fn new(id: HandleId, engine: Box<dyn Engine>) -> Self {
        Self {
            id,
            engine,
            state: Mutex::new(EngineState::Unloaded),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn state(&self) -> EngineState {
        *lock(&self.state)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// Moves `from -> to`; fails (returns false) if the handle was in any other state.
    fn transition(&self, from: EngineState, to: EngineState) -> bool {
        let mut state = lock(&self.state);
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    fn ensure_ready(&self) -> CompressResult<()> {
        match self.state() {
            EngineState::Ready => Ok(()),
            EngineState::Terminated => Err(CompressError::cancelled("engine was terminated")),
            other => Err(CompressError::engine_not_ready(format!(
                "engine is {other:?}"
            ))),
        }
    }

    pub fn write_file(&self, name: &str, bytes: &[u8]) -> CompressResult<()> {
        self.ensure_ready()?;
        self.engine.write_file(name, bytes)
    }

    pub fn exec(&self, args: &[String]) -> CompressResult<i32> {
        self.ensure_ready()?;
        self.engine.exec(args)
    }

    pub fn read_file(&self, name: &str) -> CompressResult<Option<Vec<u8>>> {
        self.ensure_ready()?;
        self.engine.read_file(name)
    }

    pub fn delete_file(&self, name: &str) -> CompressResult<bool> {
        self.ensure_ready()?;
        self.engine.delete_file(name)
    }

    /// Stop the engine and invalidate the handle. Safe to call repeatedly.
    pub fn terminate(&self) {
        {
            let mut state = lock(&self.state);
            if *state == EngineState::Terminated {
                return;
            }
            *state = EngineState::Terminated;
        }

        if let Err(err) = self.engine.terminate() {
            tracing::warn!(handle = self.id, %err, "engine terminate reported an error");
        }
        tracing::debug!(handle = self.id, "engine terminated");
    }
}

/// Owns at most one live engine handle and rebuilds it on demand.
pub struct EngineManager {
    factory: Box<dyn EngineFactory>,
    assets: EngineAssets,
    events: HandleEventSink,
    slot: Mutex<Option<Arc<EngineHandle>>>,
    next_id: AtomicU64,
    loads: AtomicUsize,
}

impl EngineManager {
    pub fn new(
        factory: Box<dyn EngineFactory>,
        assets: EngineAssets,
        events: HandleEventSink,
    ) -> Self {
        Self {
            factory,
            assets,
            events,
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of engine constructions that reached the load step.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// The currently held handle, whatever its state.
    pub fn current(&self) -> Option<Arc<EngineHandle>> {
        lock(&self.slot).clone()
    }

    pub fn state(&self) -> EngineState {
        self.current()
            .map(|h| h.state())
            .unwrap_or(EngineState::Unloaded)
    }

    /// Return the ready handle, constructing and loading a fresh one if needed.
    #[tracing::instrument(skip(self))]
    pub fn ensure_ready(&self) -> CompressResult<Arc<EngineHandle>> {
        let handle = {
            let mut slot = lock(&self.slot);
            if let Some(existing) = slot.as_ref() {
                match existing.state() {
                    EngineState::Ready => return Ok(Arc::clone(existing)),
                    // Replaced below.
                    EngineState::Terminated => {}
                    EngineState::Unloaded | EngineState::Loading => {
                        return Err(CompressError::engine_not_ready(
                            "engine is still loading",
                        ));
                    }
                }
            }

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let events = Arc::clone(&self.events);
            let engine = self
                .factory
                .create(Arc::new(move |ev: EngineEvent| events(id, ev)))
                .map_err(|e| {
                    CompressError::engine_initialization(format!("Error loading FFmpeg: {e}"))
                })?;

            let handle = Arc::new(EngineHandle::new(id, engine));
            handle.transition(EngineState::Unloaded, EngineState::Loading);
            *slot = Some(Arc::clone(&handle));
            handle
        };

        self.loads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            handle = handle.id,
            core_url = %self.assets.core_url,
            wasm_url = %self.assets.wasm_url,
            "loading engine"
        );

        if let Err(err) = handle.engine.load(&self.assets) {
            let cancelled = handle.state() == EngineState::Terminated;
            self.discard(&handle);
            if cancelled {
                return Err(CompressError::cancelled("engine was terminated while loading"));
            }
            return Err(CompressError::engine_initialization(format!(
                "Error loading FFmpeg: {err}"
            )));
        }

        if !handle.transition(EngineState::Loading, EngineState::Ready) {
            self.discard(&handle);
            return Err(CompressError::cancelled("engine was terminated while loading"));
        }

        tracing::debug!(handle = handle.id, "engine ready");
        Ok(handle)
    }

    /// Terminate `handle` and forget it if it is the one currently held.
    pub fn terminate(&self, handle: &EngineHandle) {
        self.discard(handle);
    }

    /// Terminate and drop whatever handle is held. Returns whether there was one.
    pub fn release(&self) -> bool {
        let held = lock(&self.slot).take();
        match held {
            Some(handle) => {
                handle.terminate();
                true
            }
            None => false,
        }
    }

    fn discard(&self, handle: &EngineHandle) {
        {
            let mut slot = lock(&self.slot);
            if slot.as_ref().is_some_and(|h| h.id == handle.id) {
                slot.take();
            }
        }
        handle.terminate();
    }
}

impl Drop for EngineManager {
    fn drop(&mut self) {
        self.release();
    }
}
