use async_trait::async_trait;
use tokio::sync::watch;

use crate::Result;

/// Mirrors `KazooState`: a coordination session is connected, has lost its
/// connection but may recover (`Suspended`), or has definitively expired
/// (`Lost`, at which point every ephemeral node this session owns is gone
/// and must be recreated under a fresh session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Lost,
    Suspended,
    Connected,
}

/// How long a created node (and any sequence number suffix) lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives session loss. Used for the handful of shared-state nodes
    /// (`/primaries`, `/counts/...`) that must outlive any single client.
    Persistent,
    /// Deleted automatically when the owning session ends. Used for
    /// per-broker liveness markers and election candidates.
    Ephemeral,
    /// Ephemeral, and the server appends a monotonically increasing
    /// sequence number to the requested path. The basis of the leader
    /// election recipe in [`crate::election`].
    EphemeralSequential,
}

/// A hierarchical coordination tree: ZooKeeper-shaped paths, ephemeral and
/// persistent nodes, and watches that fire once on the next change to a
/// node's data or child set.
///
/// Every operation here is a single trip to the coordination service;
/// callers that need snapshot-then-watch semantics (overwhelmingly the
/// common case in this system) call `children`/`get_data` and then
/// `watch_children`/`watch_data` in immediate succession, exactly as a
/// ZooKeeper client's `DataWatch`/`ChildrenWatch` decorators arrange for
/// the first callback to fire with the node's current value before any
/// real change is observed.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Creates every path component up to `path` as a persistent node if
    /// it doesn't already exist. Equivalent to `zk.ensure_path`.
    async fn ensure_path(&self, path: &str) -> Result<()>;

    /// Creates `path` with `data`. For [`CreateMode::EphemeralSequential`]
    /// the returned `String` is the actual created path, with the
    /// allocated sequence number appended to `path`.
    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> Result<String>;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn get_data(&self, path: &str) -> Result<Vec<u8>>;

    async fn set_data(&self, path: &str, data: Vec<u8>) -> Result<()>;

    /// Fails with [`crate::Error::NotEmpty`] if `path` has children.
    async fn delete(&self, path: &str) -> Result<()>;

    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// A channel that yields `path`'s data every time it changes. The
    /// current value is available immediately via `borrow()`.
    async fn watch_data(&self, path: &str) -> Result<watch::Receiver<Vec<u8>>>;

    /// A channel that yields `path`'s child list every time a child is
    /// created or removed. The current children are available
    /// immediately via `borrow()`.
    async fn watch_children(&self, path: &str) -> Result<watch::Receiver<Vec<String>>>;

    /// The session's connection state, for the LOST/SUSPENDED handling
    /// every broker and client in this system needs to react to.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;

    /// Ends the session: every ephemeral node this client created is
    /// removed and `connection_state` transitions to `Lost`.
    async fn close(&self);
}
