//! # Tracker Service
//!
//! Runs a [`TrackingSession`] on a single tokio task. Caller commands and
//! position events are consumed by that one task, so buffer mutation is
//! strictly serialized: a `stop()` issued while fixes are in flight applies
//! exactly the fixes delivered before it and none after.
//!
//! Callers hold a cloneable [`TrackerHandle`]. Commands go through a bounded
//! channel; observable state (current location, route points, session state,
//! last fix error) is published through `tokio::sync::watch` channels after
//! every command or event, so reads never wait on the task.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use route_tracker::synthetic::{circular_route, ReplaySource};
//! use route_tracker::{ConnectivityMonitor, MemoryStore, TrackerService, TrackingSession};
//!
//! # async fn demo() -> route_tracker::Result<()> {
//! let source = ReplaySource::new(circular_route(28.6139, 77.2090, 100.0, 120), Duration::from_secs(1));
//! let session = TrackingSession::with_defaults(MemoryStore::new(), source);
//! let (tracker, _task) = TrackerService::spawn(session, ConnectivityMonitor::default());
//!
//! tracker.start().await?;
//! // ... later
//! tracker.stop().await?;
//! println!("captured {} points", tracker.route_points().len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::connectivity::ConnectivityMonitor;
use crate::metrics::RouteMetrics;
use crate::payload::{Pin, SaveRouteRequest};
use crate::session::{SessionState, TrackingSession};
use crate::source::PositionSource;
use crate::store::KeyValueStore;
use crate::{FixError, LocationPoint, Result, TrackerError};

// Pending commands before callers start waiting for the task
const COMMAND_QUEUE: usize = 32;

enum Command {
    Start(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<()>),
    Clear(oneshot::Sender<()>),
    Metrics(oneshot::Sender<RouteMetrics>),
    SaveRequest {
        title: String,
        activity_type: Option<String>,
        pins: Vec<Pin>,
        reply: oneshot::Sender<Result<SaveRouteRequest>>,
    },
    Shutdown,
}

struct Observables {
    current_location: watch::Sender<Option<LocationPoint>>,
    route_points: watch::Sender<Arc<Vec<LocationPoint>>>,
    state: watch::Sender<SessionState>,
    last_fix_error: watch::Sender<Option<FixError>>,
}

/// Single-consumer task owning a [`TrackingSession`].
pub struct TrackerService<S: KeyValueStore, P: PositionSource> {
    session: TrackingSession<S, P>,
    commands: mpsc::Receiver<Command>,
    observables: Observables,
}

impl<S, P> TrackerService<S, P>
where
    S: KeyValueStore + 'static,
    P: PositionSource + 'static,
{
    /// Spawn the service on the current tokio runtime.
    ///
    /// The returned task resolves to the session once the service shuts
    /// down (via [`TrackerHandle::shutdown`] or when every handle is dropped).
    pub fn spawn(
        session: TrackingSession<S, P>,
        connectivity: ConnectivityMonitor,
    ) -> (TrackerHandle, JoinHandle<TrackingSession<S, P>>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);

        let (location_tx, location_rx) = watch::channel(session.current_location());
        let (points_tx, points_rx) = watch::channel(Arc::new(session.route_points().to_vec()));
        let (state_tx, state_rx) = watch::channel(session.state());
        let (error_tx, error_rx) = watch::channel(session.last_fix_error());

        let service = TrackerService {
            session,
            commands: command_rx,
            observables: Observables {
                current_location: location_tx,
                route_points: points_tx,
                state: state_tx,
                last_fix_error: error_tx,
            },
        };

        let handle = TrackerHandle {
            commands: command_tx,
            current_location: location_rx,
            route_points: points_rx,
            state: state_rx,
            last_fix_error: error_rx,
            connectivity,
        };

        info!("[TrackerService] Spawned");
        (handle, tokio::spawn(service.run()))
    }

    async fn run(mut self) -> TrackingSession<S, P> {
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },

                event = self.session.recv_event(), if self.session.is_armed() => match event {
                    Some(event) => self.session.handle_event(event),
                    None => self.session.on_source_closed(),
                },
            }
            self.publish();
        }

        info!("[TrackerService] Shut down");
        self.session
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let _ = reply.send(self.session.start());
            }
            Command::Stop(reply) => {
                self.session.stop();
                let _ = reply.send(());
            }
            Command::Clear(reply) => {
                self.session.clear_route();
                let _ = reply.send(());
            }
            Command::Metrics(reply) => {
                let _ = reply.send(self.session.metrics());
            }
            Command::SaveRequest {
                title,
                activity_type,
                pins,
                reply,
            } => {
                let _ = reply.send(self.session.save_request(&title, activity_type.as_deref(), pins));
            }
            Command::Shutdown => {}
        }
    }

    fn publish(&self) {
        let session = &self.session;

        self.observables.current_location.send_if_modified(|current| {
            let next = session.current_location();
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        self.observables.route_points.send_if_modified(|current| {
            let next = session.route_points();
            let unchanged = current.len() == next.len()
                && current.first() == next.first()
                && current.last() == next.last();
            if unchanged {
                return false;
            }
            *current = Arc::new(next.to_vec());
            debug!("[TrackerService] Published {} route points", next.len());
            true
        });

        self.observables.state.send_if_modified(|current| {
            let next = session.state();
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        self.observables.last_fix_error.send_if_modified(|current| {
            let next = session.last_fix_error();
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Cloneable caller-side handle to a running [`TrackerService`].
#[derive(Clone)]
pub struct TrackerHandle {
    commands: mpsc::Sender<Command>,
    current_location: watch::Receiver<Option<LocationPoint>>,
    route_points: watch::Receiver<Arc<Vec<LocationPoint>>>,
    state: watch::Receiver<SessionState>,
    last_fix_error: watch::Receiver<Option<FixError>>,
    connectivity: ConnectivityMonitor,
}

impl TrackerHandle {
    /// Start tracking. Fails only with [`TrackerError::UnsupportedPlatform`]
    /// (or [`TrackerError::ServiceClosed`]).
    pub async fn start(&self) -> Result<()> {
        self.request(Command::Start).await?
    }

    /// Stop tracking, keeping the route.
    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await
    }

    /// Discard the route and its persisted snapshot.
    pub async fn clear_route(&self) -> Result<()> {
        self.request(Command::Clear).await
    }

    /// Distance and duration of the current route.
    pub async fn metrics(&self) -> Result<RouteMetrics> {
        self.request(Command::Metrics).await
    }

    /// Build a save-route payload from the current route.
    pub async fn save_request(
        &self,
        title: &str,
        activity_type: Option<&str>,
        pins: Vec<Pin>,
    ) -> Result<SaveRouteRequest> {
        let title = title.to_string();
        let activity_type = activity_type.map(str::to_string);
        self.request(|reply| Command::SaveRequest {
            title,
            activity_type,
            pins,
            reply,
        })
        .await?
    }

    /// Ask the service to stop its task. Tracking state is left as is, so a
    /// later restart resumes if it was active.
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| TrackerError::ServiceClosed)
    }

    pub fn current_location(&self) -> Option<LocationPoint> {
        *self.current_location.borrow()
    }

    pub fn route_points(&self) -> Arc<Vec<LocationPoint>> {
        Arc::clone(&self.route_points.borrow())
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_tracking(&self) -> bool {
        self.state() == SessionState::Tracking
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn last_fix_error(&self) -> Option<FixError> {
        *self.last_fix_error.borrow()
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn subscribe_current_location(&self) -> watch::Receiver<Option<LocationPoint>> {
        self.current_location.clone()
    }

    pub fn subscribe_route_points(&self) -> watch::Receiver<Arc<Vec<LocationPoint>>> {
        self.route_points.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn subscribe_online(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| TrackerError::ServiceClosed)?;
        reply_rx.await.map_err(|_| TrackerError::ServiceClosed)
    }
}
