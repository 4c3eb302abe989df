//! The notification log
//!
//! Stores and serves information about notifications sent for byte-slice
//! addressed alert groups to fully qualified receivers. Only the most recent
//! entry per (group key, receiver) pair is retained; replicas converge on
//! that entry through the gossip surface in [`crate::gossip`].

use crate::gossip::{GossipChannel, TransportFactory};
use crate::maintenance;
use crate::snapshot;
use meshlog_core::{codec, state_key, Entry, GossipState, LogInstant, MeshEntry, Receiver};
use parking_lot::RwLock;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tracing::info;

/// Notification log errors
#[derive(Debug, Error)]
pub enum LogError {
    /// No entry matched the query
    #[error("not found")]
    NotFound,
    /// Query parameters insufficient or conflicting
    #[error("invalid query: {0}")]
    BadQuery(&'static str),
    /// Codec or timestamp error
    #[error(transparent)]
    Core(#[from] meshlog_core::Error),
    /// Snapshot file I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Clock function used to stamp new entries. Injectable for tests.
pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Configuration for a [`NotificationLog`], applied at construction.
pub struct LogOptions {
    retention: Duration,
    clock: Clock,
    snapshot_path: Option<PathBuf>,
    maintenance_interval: Duration,
    shutdown: Option<broadcast::Receiver<()>>,
    done: Option<oneshot::Sender<()>>,
    transport: Option<TransportFactory>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            retention: Duration::ZERO,
            clock: Arc::new(SystemTime::now),
            snapshot_path: None,
            maintenance_interval: Duration::ZERO,
            shutdown: None,
            done: None,
            transport: None,
        }
    }
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long entries are kept before GC removes them. With the default
    /// of zero, entries expire immediately.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Override the wall clock, generally for injection during tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Snapshot file to load on open and to rotate during maintenance.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Run garbage collection and snapshot rotation at the given interval.
    ///
    /// The loop terminates on a message from `shutdown` and signals `done`
    /// after the final snapshot has completed. A zero interval disables
    /// background processing.
    pub fn with_maintenance(
        mut self,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
        done: oneshot::Sender<()>,
    ) -> Self {
        self.maintenance_interval = interval;
        self.shutdown = Some(shutdown);
        self.done = Some(done);
        self
    }

    /// Register the log with a gossip transport with which the log state
    /// will be shared.
    pub fn with_transport(mut self, create: TransportFactory) -> Self {
        self.transport = Some(create);
        self
    }
}

/// Scratch descriptor populated by [`QueryParam`] setters.
#[derive(Default)]
pub struct Query {
    receiver: Option<Receiver>,
    group_key: Option<Vec<u8>>,
}

/// A setter that incorporates one parameter into a query. Returns an error
/// for invalid or conflicting parameters.
pub type QueryParam = Box<dyn FnOnce(&mut Query) -> Result<(), LogError> + Send>;

/// Query by receiver.
pub fn q_receiver(r: Receiver) -> QueryParam {
    Box::new(move |q| {
        q.receiver = Some(r);
        Ok(())
    })
}

/// Query by alert group key.
pub fn q_group_key(gk: impl Into<Vec<u8>>) -> QueryParam {
    let gk = gk.into();
    Box::new(move |q| {
        q.group_key = Some(gk);
        Ok(())
    })
}

/// A replica of the notification log.
///
/// The state map is the single shared mutable resource; every operation
/// goes through the reader/writer lock. Gossip callbacks take the same lock
/// via the [`Gossiper`](crate::gossip::Gossiper) impl.
pub struct NotificationLog {
    clock: Clock,
    retention: Duration,
    pub(crate) state: RwLock<GossipState>,
    channel: OnceLock<Arc<dyn GossipChannel>>,
}

impl NotificationLog {
    /// Create a new notification log from the provided options.
    ///
    /// If a snapshot path is set, an existing snapshot is loaded into the
    /// log; a missing file starts the log empty, a corrupt one is an error.
    /// Must be called within a tokio runtime when maintenance is configured.
    pub fn open(opts: LogOptions) -> Result<Arc<Self>, LogError> {
        let LogOptions {
            retention,
            clock,
            snapshot_path,
            maintenance_interval,
            shutdown,
            done,
            transport,
        } = opts;

        let mut state = GossipState::new();
        if let Some(path) = &snapshot_path {
            match File::open(path) {
                Ok(f) => {
                    state = snapshot::load_snapshot(f)?;
                    info!(path = %path.display(), entries = state.len(), "loaded snapshot");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    info!(path = %path.display(), "no snapshot found, starting empty");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let log = Arc::new(Self {
            clock,
            retention,
            state: RwLock::new(state),
            channel: OnceLock::new(),
        });

        if let Some(create) = transport {
            let channel = create(Arc::downgrade(&log));
            let _ = log.channel.set(channel);
        }

        if maintenance_interval > Duration::ZERO {
            if let Some(shutdown) = shutdown {
                maintenance::spawn(
                    Arc::clone(&log),
                    maintenance_interval,
                    snapshot_path,
                    shutdown,
                    done,
                );
            }
        }

        Ok(log)
    }

    /// Record a notification for still-active alerts.
    pub fn log_active(
        &self,
        receiver: &Receiver,
        group_key: &[u8],
        group_hash: &[u8],
    ) -> Result<(), LogError> {
        self.log_entry(receiver, group_key, group_hash, false)
    }

    /// Record a notification that announced resolution.
    pub fn log_resolved(
        &self,
        receiver: &Receiver,
        group_key: &[u8],
        group_hash: &[u8],
    ) -> Result<(), LogError> {
        self.log_entry(receiver, group_key, group_hash, true)
    }

    fn log_entry(
        &self,
        receiver: &Receiver,
        group_key: &[u8],
        group_hash: &[u8],
        resolved: bool,
    ) -> Result<(), LogError> {
        let now = LogInstant::from_system_time((self.clock)())?;
        let key = state_key(group_key, receiver);
        let expires_at = now.checked_add(self.retention)?;

        let mesh_entry = {
            let mut st = self.state.write();
            if let Some(prev) = st.get(&key) {
                // A newer entry may already have arrived via gossip from a
                // peer with a faster clock. Keep it.
                if prev.entry.timestamp > now {
                    return Ok(());
                }
            }
            let mesh_entry = MeshEntry {
                entry: Entry {
                    receiver: receiver.clone(),
                    group_key: group_key.to_vec(),
                    group_hash: group_hash.to_vec(),
                    resolved,
                    timestamp: now,
                },
                expires_at,
            };
            st.insert(mesh_entry.clone());
            mesh_entry
        };

        if let Some(channel) = self.channel.get() {
            let delta: GossipState = std::iter::once(mesh_entry).collect();
            channel.broadcast(&delta);
        }
        Ok(())
    }

    /// Query the log along the given parameters. The only supported mode is
    /// the most recent entry for a receiver/group-key combination, so both
    /// parameters must be set.
    pub fn query(
        &self,
        params: impl IntoIterator<Item = QueryParam>,
    ) -> Result<Vec<Entry>, LogError> {
        let mut q = Query::default();
        for p in params {
            p(&mut q)?;
        }
        let (Some(receiver), Some(group_key)) = (q.receiver, q.group_key) else {
            return Err(LogError::BadQuery("no query parameters specified"));
        };

        let st = self.state.read();
        match st.get(&state_key(&group_key, &receiver)) {
            Some(le) => Ok(vec![le.entry.clone()]),
            None => Err(LogError::NotFound),
        }
    }

    /// Remove expired entries from the log. Returns the number of deleted
    /// entries.
    pub fn gc(&self) -> Result<usize, LogError> {
        let now = LogInstant::from_system_time((self.clock)())?;
        let mut st = self.state.write();
        Ok(st.retain(|_, le| le.expires_at > now))
    }

    /// Write the current log state to `w`. Returns the number of bytes
    /// written, including any bytes flushed before an error.
    pub fn snapshot(&self, w: &mut impl Write) -> (usize, Result<(), LogError>) {
        let st = self.state.read();
        let mut w = CountingWriter { inner: w, written: 0 };
        for e in st.entries() {
            if let Err(err) = codec::write_entry(&mut w, e) {
                return (w.written, Err(err.into()));
            }
        }
        (w.written, Ok(()))
    }

    /// Number of entries currently in the log.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }
}

/// Counts bytes that reached the underlying writer, so a failed snapshot
/// can still report what was flushed.
struct CountingWriter<W> {
    inner: W,
    written: usize,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
