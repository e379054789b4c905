//! Listener lifecycle
//!
//! The [`ListenerManager`] owns the network face of the device: the TCP
//! listen socket, its accept loop and every client connection task. It can
//! be disabled (draining all connections) and re-enabled, and re-enabling
//! rebuilds the device from a [`SavedSnapshot`] so that stream identifiers
//! cached by clients stay valid.
//!
//! # Lifecycle lock
//!
//! Transitions are serialized by an async mutex. [`ListenerManager::enable`]
//! and [`ListenerManager::disable`] wait for a running transition, up to the
//! configured transition timeout, and then fail with
//! [`ListenerError::TransitionTimeout`]. The `try_` variants fail at once with
//! [`ListenerError::TransitionInProgress`].
//!
//! # Device replacement
//!
//! Re-enabling binds the new socket first. Only then, holding the device
//! write lock, does it retire the old store, capture it, build and restore
//! the new one and swap it in. Writes made through [`ListenerManager::with_device`]
//! therefore land either before the capture or on the new store, and writes
//! through a stale handle fail with `MatrixError::Retired`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use mmu_matrix::{DeviceStore, SavedSnapshot};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::ListenerConfig;
use crate::error::ListenerError;
use crate::session::run_session;

/// Identity of one accepted connection
pub type ConnectionId = u64;

type ConnectionMap = Arc<Mutex<HashMap<ConnectionId, JoinHandle<()>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An open listen socket and its accept loop
#[derive(Debug)]
struct RunningListener {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

/// Removes a connection from the tracking map when its task ends
struct ConnectionGuard {
    id: ConnectionId,
    connections: ConnectionMap,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        lock(&self.connections).remove(&self.id);
    }
}

/// Enables and disables the device's network listener
#[derive(Debug)]
pub struct ListenerManager {
    config: ListenerConfig,
    device: RwLock<Arc<DeviceStore>>,
    enabled: Arc<AtomicBool>,
    connections: ConnectionMap,
    next_id: Arc<AtomicU64>,
    lifecycle: AsyncMutex<Option<RunningListener>>,
}

impl ListenerManager {
    /// Create a manager in the Disabled state
    pub fn new(config: ListenerConfig, device: DeviceStore) -> Self {
        Self {
            config,
            device: RwLock::new(Arc::new(device)),
            enabled: Arc::new(AtomicBool::new(false)),
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            lifecycle: AsyncMutex::new(None),
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// The current device store
    ///
    /// Re-enabling the listener retires this store, after which writes
    /// through the returned handle fail.
    pub fn device(&self) -> Arc<DeviceStore> {
        self.device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `f` against the current device, holding off a device swap
    pub fn with_device<R>(&self, f: impl FnOnce(&DeviceStore) -> R) -> R {
        let device = self.device.read().unwrap_or_else(PoisonError::into_inner);
        f(&device)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Number of tracked client connections
    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    /// Address of the open listen socket
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.lock().await.as_ref().map(|r| r.local_addr)
    }

    async fn lock_lifecycle(
        &self,
    ) -> Result<AsyncMutexGuard<'_, Option<RunningListener>>, ListenerError> {
        let limit = self.config.transition_timeout();
        timeout(limit, self.lifecycle.lock())
            .await
            .map_err(|_| ListenerError::TransitionTimeout(limit))
    }

    fn try_lock_lifecycle(
        &self,
    ) -> Result<AsyncMutexGuard<'_, Option<RunningListener>>, ListenerError> {
        self.lifecycle
            .try_lock()
            .map_err(|_| ListenerError::TransitionInProgress)
    }

    /// Open the listener, waiting for any running transition
    pub async fn enable(&self) -> Result<(), ListenerError> {
        let mut slot = self.lock_lifecycle().await?;
        self.enable_locked(&mut slot).await
    }

    /// Close the listener, waiting for any running transition
    pub async fn disable(&self) -> Result<(), ListenerError> {
        let mut slot = self.lock_lifecycle().await?;
        self.disable_locked(&mut slot).await;
        Ok(())
    }

    /// Open the listener unless a transition is already running
    pub async fn try_enable(&self) -> Result<(), ListenerError> {
        let mut slot = self.try_lock_lifecycle()?;
        self.enable_locked(&mut slot).await
    }

    /// Close the listener unless a transition is already running
    pub async fn try_disable(&self) -> Result<(), ListenerError> {
        let mut slot = self.try_lock_lifecycle()?;
        self.disable_locked(&mut slot).await;
        Ok(())
    }

    async fn enable_locked(&self, slot: &mut Option<RunningListener>) -> Result<(), ListenerError> {
        if slot.is_some() && self.is_enabled() {
            debug!("Listener already enabled");
            return Ok(());
        }

        if let Some(stale) = slot.take() {
            self.close_listener(stale).await;
        }

        let bind_error = |source: std::io::Error| ListenerError::Bind {
            addr: self.config.bind.clone(),
            source,
        };
        let listener = TcpListener::bind(&self.config.bind).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        // No await from here until the swap is done
        let rebuilt = {
            let mut device = self.device.write().unwrap_or_else(PoisonError::into_inner);
            let rebuilt = rebuild(&device)?;
            *device = Arc::clone(&rebuilt);
            rebuilt
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            rebuilt,
            Arc::clone(&self.enabled),
            Arc::clone(&self.connections),
            Arc::clone(&self.next_id),
            shutdown_rx,
        ));
        *slot = Some(RunningListener {
            local_addr,
            shutdown_tx,
            accept_task,
        });

        self.enabled.store(true, Ordering::SeqCst);
        info!("Listener enabled on {}", local_addr);
        Ok(())
    }

    async fn disable_locked(&self, slot: &mut Option<RunningListener>) {
        // Refuse new connections before anything else
        let was_enabled = self.enabled.swap(false, Ordering::SeqCst);
        if !was_enabled && slot.is_none() {
            debug!("Listener already disabled");
            return;
        }

        self.drain_connections().await;
        if let Some(running) = slot.take() {
            self.close_listener(running).await;
        }
        info!("Listener disabled");
    }

    /// Abort every tracked connection and wait for the tasks to end
    async fn drain_connections(&self) {
        let handles: Vec<(ConnectionId, JoinHandle<()>)> =
            std::mem::take(&mut *lock(&self.connections)).into_iter().collect();
        if handles.is_empty() {
            return;
        }

        info!("Closing {} client connection(s)", handles.len());
        for (_, handle) in &handles {
            handle.abort();
        }

        let deadline = Instant::now() + self.config.close_timeout();
        for (id, handle) in handles {
            if timeout_at(deadline, handle).await.is_err() {
                warn!("Connection {} did not close in time", id);
            }
        }
    }

    async fn close_listener(&self, mut running: RunningListener) {
        let _ = running.shutdown_tx.send(true);
        match timeout(self.config.close_timeout(), &mut running.accept_task).await {
            Ok(_) => debug!("Listen socket {} closed", running.local_addr),
            Err(_) => {
                warn!(
                    "Listen socket {} did not close within {:?}; aborting",
                    running.local_addr,
                    self.config.close_timeout()
                );
                running.accept_task.abort();
            }
        }
    }
}

/// Retire `current` and build its replacement from a capture of it
///
/// On failure `current` accepts writes again and stays in service.
fn rebuild(current: &DeviceStore) -> Result<Arc<DeviceStore>, ListenerError> {
    current.retire();
    let result = SavedSnapshot::capture(current).and_then(|saved| {
        let matrix = current.config().clone();
        let rebuilt = DeviceStore::build(
            matrix.clone(),
            current.identity().clone(),
            &saved.blueprint(&matrix),
        )?;
        saved.restore(&rebuilt)?;
        Ok(rebuilt)
    });

    match result {
        Ok(rebuilt) => Ok(Arc::new(rebuilt)),
        Err(e) => {
            current.reinstate();
            Err(e.into())
        }
    }
}

/// Spawn a session task and track it
///
/// The map lock is held from the `enabled` check until the handle is stored,
/// so a concurrent drain either sees this connection or it is refused here.
/// Returns false when the connection was refused.
fn register_connection(
    stream: TcpStream,
    device: Arc<DeviceStore>,
    enabled: &AtomicBool,
    connections: &ConnectionMap,
    id: ConnectionId,
) -> bool {
    let mut tracked = lock(connections);
    if !enabled.load(Ordering::SeqCst) {
        return false;
    }
    let guard = ConnectionGuard {
        id,
        connections: Arc::clone(connections),
    };
    let handle = tokio::spawn(async move {
        let _guard = guard;
        run_session(stream, device, id).await;
    });
    tracked.insert(id, handle);
    true
}

async fn accept_loop(
    listener: TcpListener,
    device: Arc<DeviceStore>,
    enabled: Arc<AtomicBool>,
    connections: ConnectionMap,
    next_id: Arc<AtomicU64>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,

            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    let id = next_id.fetch_add(1, Ordering::SeqCst);
                    if register_connection(stream, Arc::clone(&device), &enabled, &connections, id) {
                        info!("Connection {} from {}", id, peer);
                    } else {
                        debug!("Refusing connection from {}: listener disabled", peer);
                    }
                }
                Err(e) => warn!("Accept failed: {}", e),
            },
        }
    }
    debug!("Accept loop stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mmu_matrix::{DeviceIdentity, MatrixConfig};

    use super::*;

    fn manager(transition_timeout_ms: u64) -> ListenerManager {
        let config = ListenerConfig {
            bind: "127.0.0.1:0".to_string(),
            transition_timeout_ms,
            ..Default::default()
        };
        let device = DeviceStore::new(MatrixConfig::default(), DeviceIdentity::default()).unwrap();
        ListenerManager::new(config, device)
    }

    #[tokio::test]
    async fn test_try_variants_fail_fast_during_transition() {
        let manager = manager(5000);
        let _held = manager.lifecycle.lock().await;

        assert!(matches!(
            manager.try_enable().await,
            Err(ListenerError::TransitionInProgress)
        ));
        assert!(matches!(
            manager.try_disable().await,
            Err(ListenerError::TransitionInProgress)
        ));
    }

    #[tokio::test]
    async fn test_blocking_variants_time_out() {
        let manager = manager(50);
        let _held = manager.lifecycle.lock().await;

        match manager.enable().await {
            Err(ListenerError::TransitionTimeout(limit)) => {
                assert_eq!(limit, Duration::from_millis(50))
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(!manager.is_enabled());
    }

    #[tokio::test]
    async fn test_blocked_caller_proceeds_when_transition_ends() {
        let manager = Arc::new(manager(5000));
        let held = manager.lifecycle.lock().await;

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.enable().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!manager.is_enabled());

        drop(held);
        waiter.await.unwrap().unwrap();
        assert!(manager.is_enabled());
        manager.disable().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_stays_disabled() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ListenerConfig {
            bind: blocker.local_addr().unwrap().to_string(),
            ..Default::default()
        };
        let device = DeviceStore::new(MatrixConfig::default(), DeviceIdentity::default()).unwrap();
        let manager = ListenerManager::new(config, device);
        let before = manager.device().list_inputs(mmu_matrix::Layer::Video).unwrap();

        assert!(matches!(manager.enable().await, Err(ListenerError::Bind { .. })));
        assert!(!manager.is_enabled());
        assert!(manager.local_addr().await.is_none());
        assert_eq!(
            manager.device().list_inputs(mmu_matrix::Layer::Video).unwrap(),
            before
        );
        assert!(!manager.device().is_retired());
        manager.device().switch(mmu_matrix::Layer::Video, "TX1:RX1").unwrap();
    }

    #[tokio::test]
    async fn test_enable_and_disable_are_idempotent() {
        let manager = manager(5000);
        manager.disable().await.unwrap();
        assert!(!manager.is_enabled());

        manager.enable().await.unwrap();
        let addr = manager.local_addr().await;
        manager.enable().await.unwrap();
        assert_eq!(manager.local_addr().await, addr);

        manager.disable().await.unwrap();
        manager.disable().await.unwrap();
        assert!(!manager.is_enabled());
    }

    #[tokio::test]
    async fn test_registration_refused_once_disabled() {
        let manager = manager(5000);
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = server.accept().await.unwrap();

        // The accept loop saw the listener enabled, then disable() ran
        assert!(!manager.is_enabled());
        assert!(!register_connection(
            stream,
            manager.device(),
            &manager.enabled,
            &manager.connections,
            1
        ));
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_enable_retires_previous_store() {
        let manager = manager(5000);
        let held = manager.device();

        manager.enable().await.unwrap();
        assert!(held.is_retired());
        assert_eq!(
            held.switch(mmu_matrix::Layer::Video, "TX1:RX1"),
            Err(mmu_matrix::MatrixError::Retired)
        );

        let current = manager.device();
        assert!(!current.is_retired());
        assert_eq!(
            current.list_inputs(mmu_matrix::Layer::Video).unwrap(),
            held.list_inputs(mmu_matrix::Layer::Video).unwrap()
        );
        manager.disable().await.unwrap();
    }
}
