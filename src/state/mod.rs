/// Local ride snapshot and membership set.
pub mod roster;
/// Signed-in user and access token.
pub mod session;
mod sse;

use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicU64, Ordering},
};

use dashmap::DashSet;
use tokio::{
    sync::{Mutex, RwLock, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        changes::{ChangeFeed, ChannelStatus},
        identity::IdentityProvider,
        ride_store::{
            RideBackend,
            memory::{MemoryIdentityProvider, MemoryRideStore},
        },
    },
    services::seat_protocol::{self, SeatProtocol},
};

pub use self::roster::{LoadStatus, Ride, Roster, RosterSnapshot, SearchFilters};
pub use self::session::{AuthEvent, Session, User};
pub use self::sse::SseHub;

/// Handle cloned into every handler and background task.
pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 64;

/// External systems a session agent talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Ride, participant and profile tables.
    pub backend: Arc<dyn RideBackend>,
    /// Sign-in provider.
    pub identity: Arc<dyn IdentityProvider>,
    /// `None` disables live sync.
    pub changes: Option<Arc<dyn ChangeFeed>>,
}

impl Collaborators {
    /// Wire everything to the in-process store.
    pub fn memory(store: &MemoryRideStore, identity: &MemoryIdentityProvider) -> Self {
        Self {
            backend: Arc::new(store.clone()),
            identity: Arc::new(identity.clone()),
            changes: Some(Arc::new(store.clone())),
        }
    }
}

/// Everything one signed-in session owns: the roster snapshot, the session
/// itself, live sync bookkeeping and the handles to the backing services.
pub struct AppState {
    config: AppConfig,
    backend: Arc<dyn RideBackend>,
    identity: Arc<dyn IdentityProvider>,
    changes: Option<Arc<dyn ChangeFeed>>,
    seats: Arc<dyn SeatProtocol>,
    session: Session,
    roster: RwLock<Roster>,
    load_tickets: AtomicU64,
    loads_pending: AtomicU32,
    in_flight: DashSet<Uuid>,
    sse: SseHub,
    sync_status: watch::Sender<ChannelStatus>,
    live_sync: Mutex<Option<JoinHandle<()>>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, collaborators: Collaborators) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        let (sync_tx, _rx) = watch::channel(ChannelStatus::Closed);
        let seats = seat_protocol::for_strategy(
            config.seat_strategy(),
            collaborators.backend.clone(),
            config.request_timeout(),
        );
        Arc::new(Self {
            config,
            backend: collaborators.backend,
            identity: collaborators.identity,
            changes: collaborators.changes,
            seats,
            session: Session::new(),
            roster: RwLock::new(Roster::new()),
            load_tickets: AtomicU64::new(0),
            loads_pending: AtomicU32::new(0),
            in_flight: DashSet::new(),
            sse: SseHub::new(SSE_CAPACITY),
            sync_status: sync_tx,
            live_sync: Mutex::new(None),
            degraded: degraded_tx,
        })
    }

    /// Configuration the agent was started with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Storage backend shared by every operation.
    pub fn backend(&self) -> &Arc<dyn RideBackend> {
        &self.backend
    }

    /// Identity provider used for sign-in and refresh.
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    /// Change feed, when live sync is enabled.
    pub fn change_feed(&self) -> Option<&Arc<dyn ChangeFeed>> {
        self.changes.as_ref()
    }

    /// Join/leave protocol selected by configuration.
    pub fn seats(&self) -> &Arc<dyn SeatProtocol> {
        &self.seats
    }

    /// Current user and token.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Local snapshot of rides and memberships.
    pub fn roster(&self) -> &RwLock<Roster> {
        &self.roster
    }

    /// Issue the next load ticket. Later tickets win over earlier ones.
    pub fn next_load_ticket(&self) -> u64 {
        self.load_tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Count a load as running until the returned guard is dropped, even when
    /// the awaiting future is cancelled.
    pub fn begin_load(&self) -> LoadGuard<'_> {
        self.loads_pending.fetch_add(1, Ordering::SeqCst);
        LoadGuard {
            pending: &self.loads_pending,
        }
    }

    /// Loads issued and not yet finished or abandoned.
    pub fn loads_pending(&self) -> u32 {
        self.loads_pending.load(Ordering::SeqCst)
    }

    /// Mark a join/leave on `ride_id` as running. `None` if one already is.
    pub fn claim_ride(&self, ride_id: Uuid) -> Option<InFlightGuard<'_>> {
        self.in_flight.insert(ride_id).then(|| InFlightGuard {
            registry: &self.in_flight,
            ride_id,
        })
    }

    /// Broadcast hub used for the rides SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Last reported state of the live sync channel.
    pub fn sync_status(&self) -> ChannelStatus {
        *self.sync_status.borrow()
    }

    /// Subscribe to live sync status updates.
    pub fn sync_watcher(&self) -> watch::Receiver<ChannelStatus> {
        self.sync_status.subscribe()
    }

    /// Returns whether the status changed.
    pub(crate) fn set_sync_status(&self, status: ChannelStatus) -> bool {
        self.sync_status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        })
    }

    /// Slot holding the running live sync task.
    pub(crate) fn live_sync_task(&self) -> &Mutex<Option<JoinHandle<()>>> {
        &self.live_sync
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag, returning whether it changed.
    pub(crate) fn update_degraded(&self, value: bool) -> bool {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        })
    }
}

/// Releases the in-flight mark of a ride when dropped.
pub struct InFlightGuard<'a> {
    registry: &'a DashSet<Uuid>,
    ride_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.ride_id);
    }
}

/// Decrements the pending-load count when dropped.
pub struct LoadGuard<'a> {
    pending: &'a AtomicU32,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}
