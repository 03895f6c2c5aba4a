use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use telemetry::debug;
use tokio::sync::{watch, Mutex};

use crate::{
    client::{ConnectionState, CoordinationClient, CreateMode},
    error::Error,
    Result,
};

struct Node {
    data: Vec<u8>,
    ephemeral_owner: Option<u64>,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<String, Node>,
    sequence_counters: HashMap<String, u64>,
    data_watches: HashMap<String, watch::Sender<Vec<u8>>>,
    children_watches: HashMap<String, watch::Sender<Vec<String>>>,
}

impl Tree {
    fn children_of(&self, path: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .keys()
            .filter_map(|key| {
                let parent = parent_of(key)?;
                (parent == normalize(path)).then(|| child_name(key).to_string())
            })
            .collect();
        names.sort();
        names
    }

    fn notify_children(&mut self, path: &str) {
        if let Some(tx) = self.children_watches.get(path) {
            let _ = tx.send(self.children_of(path));
        }
    }

    fn notify_data(&mut self, path: &str) {
        if let (Some(tx), Some(node)) = (self.data_watches.get(path), self.nodes.get(path)) {
            let _ = tx.send(node.data.clone());
        }
    }
}

fn normalize(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }
    path.trim_end_matches('/').to_string()
}

fn parent_of(path: &str) -> Option<String> {
    let path = normalize(path);
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

fn child_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// An in-process stand-in for a ZooKeeper-alike coordination service.
/// `connect` attaches a second (or third, ...) independent session to the
/// same shared tree, the way every broker/publisher/subscriber in a test
/// talks to "the same" coordination service without a real network hop.
#[derive(Clone)]
pub struct InMemoryCoordinationClient {
    tree: Arc<Mutex<Tree>>,
    session_id: u64,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl InMemoryCoordinationClient {
    pub fn new() -> Self {
        let tree = Arc::new(Mutex::new(Tree {
            nodes: {
                let mut nodes = HashMap::new();
                nodes.insert(
                    "/".to_string(),
                    Node {
                        data: Vec::new(),
                        ephemeral_owner: None,
                    },
                );
                nodes
            },
            ..Default::default()
        }));

        Self::attach(tree)
    }

    /// Attaches a fresh session to the same shared tree as `self`.
    pub fn connect(&self) -> Self {
        Self::attach(Arc::clone(&self.tree))
    }

    fn attach(tree: Arc<Mutex<Tree>>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);

        Self {
            tree,
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            state_tx,
            state_rx,
        }
    }
}

impl Default for InMemoryCoordinationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationClient for InMemoryCoordinationClient {
    async fn ensure_path(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut tree = self.tree.lock().await;

        let mut built = String::new();
        for segment in path.trim_start_matches('/').split('/') {
            if segment.is_empty() {
                continue;
            }
            built.push('/');
            built.push_str(segment);

            tree.nodes.entry(built.clone()).or_insert_with(|| Node {
                data: Vec::new(),
                ephemeral_owner: None,
            });
        }

        Ok(())
    }

    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> Result<String> {
        let path = normalize(path);
        let mut tree = self.tree.lock().await;

        let actual_path = if mode == CreateMode::EphemeralSequential {
            let counter = tree.sequence_counters.entry(path.clone()).or_insert(0);
            *counter += 1;
            format!("{path}{:010}", *counter)
        } else {
            path.clone()
        };

        if tree.nodes.contains_key(&actual_path) {
            return Err(Error::NodeExists(actual_path));
        }

        let ephemeral_owner = matches!(
            mode,
            CreateMode::Ephemeral | CreateMode::EphemeralSequential
        )
        .then_some(self.session_id);

        tree.nodes.insert(
            actual_path.clone(),
            Node {
                data,
                ephemeral_owner,
            },
        );

        if let Some(parent) = parent_of(&actual_path) {
            tree.notify_children(&parent);
        }

        Ok(actual_path)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let tree = self.tree.lock().await;
        Ok(tree.nodes.contains_key(&normalize(path)))
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path);
        let tree = self.tree.lock().await;
        tree.nodes
            .get(&path)
            .map(|node| node.data.clone())
            .ok_or(Error::NoNode(path))
    }

    async fn set_data(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let path = normalize(path);
        let mut tree = self.tree.lock().await;

        match tree.nodes.get_mut(&path) {
            Some(node) => node.data = data,
            None => return Err(Error::NoNode(path)),
        }

        tree.notify_data(&path);

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut tree = self.tree.lock().await;

        if !tree.nodes.contains_key(&path) {
            return Err(Error::NoNode(path));
        }

        if !tree.children_of(&path).is_empty() {
            return Err(Error::NotEmpty(path));
        }

        tree.nodes.remove(&path);

        if let Some(parent) = parent_of(&path) {
            tree.notify_children(&parent);
        }

        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let tree = self.tree.lock().await;
        Ok(tree.children_of(path))
    }

    async fn watch_data(&self, path: &str) -> Result<watch::Receiver<Vec<u8>>> {
        let path = normalize(path);
        let mut tree = self.tree.lock().await;

        let current = tree
            .nodes
            .get(&path)
            .map(|node| node.data.clone())
            .ok_or_else(|| Error::NoNode(path.clone()))?;

        if let Some(tx) = tree.data_watches.get(&path) {
            return Ok(tx.subscribe());
        }

        let (tx, rx) = watch::channel(current);
        tree.data_watches.insert(path, tx);

        Ok(rx)
    }

    async fn watch_children(&self, path: &str) -> Result<watch::Receiver<Vec<String>>> {
        let path = normalize(path);
        let mut tree = self.tree.lock().await;

        if let Some(tx) = tree.children_watches.get(&path) {
            return Ok(tx.subscribe());
        }

        let current = tree.children_of(&path);
        let (tx, rx) = watch::channel(current);
        tree.children_watches.insert(path, tx);

        Ok(rx)
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    async fn close(&self) {
        let mut tree = self.tree.lock().await;

        let owned: Vec<String> = tree
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(self.session_id))
            .map(|(path, _)| path.clone())
            .collect();

        let mut affected_parents = Vec::new();
        for path in owned {
            tree.nodes.remove(&path);
            if let Some(parent) = parent_of(&path) {
                affected_parents.push(parent);
            }
        }

        for parent in affected_parents {
            tree.notify_children(&parent);
        }

        debug!(session_id = self.session_id, "coordination session closed");
        let _ = self.state_tx.send(ConnectionState::Lost);
    }
}
