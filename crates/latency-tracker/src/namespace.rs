//! Control namespace
//!
//! An in-process hierarchy of named nodes, shaped like a debug filesystem:
//! directories, u64 value entries and wakeup pipe endpoints. Paths are
//! `/`-separated component lists relative to the namespace root, e.g.
//! `latency/sched/threshold`.
//!
//! Structure changes (create/remove) take the write lock; value reads and
//! writes only resolve the node under the read lock and then operate on the
//! shared atomic, so control-plane clients never contend with each other.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use latency_tracker_core::error::{NodeError, TrackerError, TrackerResult};

use crate::pipe::{ReaderHandle, WakeupPipe};

/// Kind of a namespace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    Value,
    Pipe,
}

enum Node {
    Dir(BTreeMap<String, Node>),
    Value(Arc<AtomicU64>),
    Pipe(Arc<WakeupPipe>),
}

impl Node {
    fn kind(&self) -> EntryKind {
        match self {
            Node::Dir(_) => EntryKind::Dir,
            Node::Value(_) => EntryKind::Value,
            Node::Pipe(_) => EntryKind::Pipe,
        }
    }

    /// Nodes in this subtree, itself included
    fn subtree_size(&self) -> usize {
        match self {
            Node::Dir(children) => 1 + children.values().map(Node::subtree_size).sum::<usize>(),
            _ => 1,
        }
    }
}

/// Hierarchical namespace of control nodes
pub struct Namespace {
    root: RwLock<BTreeMap<String, Node>>,
    nodes: AtomicUsize,
    max_nodes: usize,
}

fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

fn join(parent: &str, name: &str) -> String {
    let parent = parent.trim_matches('/');
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

fn validate_name(name: &str) -> Result<(), NodeError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(NodeError::InvalidName);
    }
    Ok(())
}

fn dir_mut<'a>(
    mut dir: &'a mut BTreeMap<String, Node>,
    comps: &[&str],
) -> Result<&'a mut BTreeMap<String, Node>, NodeError> {
    for comp in comps {
        dir = match dir.get_mut(*comp) {
            Some(Node::Dir(children)) => children,
            Some(_) => return Err(NodeError::NotADirectory),
            None => return Err(NodeError::ParentMissing),
        };
    }
    Ok(dir)
}

fn lookup<'a>(root: &'a BTreeMap<String, Node>, comps: &[&str]) -> Option<&'a Node> {
    let (last, parents) = comps.split_last()?;
    let mut dir = root;
    for comp in parents {
        dir = match dir.get(*comp) {
            Some(Node::Dir(children)) => children,
            _ => return None,
        };
    }
    dir.get(*last)
}

impl Namespace {
    /// Empty namespace that holds at most `max_nodes` entries
    pub fn new(max_nodes: usize) -> Self {
        Self {
            root: RwLock::new(BTreeMap::new()),
            nodes: AtomicUsize::new(0),
            max_nodes,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Node>> {
        self.root.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Node>> {
        self.root.write().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, parent: &str, name: &str, node: Node) -> Result<String, NodeError> {
        validate_name(name)?;
        let mut root = self.write();
        let dir = dir_mut(&mut root, &components(parent))?;
        if dir.contains_key(name) {
            return Err(NodeError::Exists);
        }
        // Only mutated under the write lock
        if self.nodes.load(Ordering::Relaxed) >= self.max_nodes {
            return Err(NodeError::Exhausted);
        }
        dir.insert(name.to_string(), node);
        self.nodes.fetch_add(1, Ordering::Relaxed);
        Ok(join(parent, name))
    }

    /// Create an empty directory; `parent` "" is the namespace root
    pub fn create_dir(&self, parent: &str, name: &str) -> Result<String, NodeError> {
        self.insert(parent, name, Node::Dir(BTreeMap::new()))
    }

    /// Create a u64 entry backed by `cell`
    pub fn create_u64(
        &self,
        parent: &str,
        name: &str,
        cell: Arc<AtomicU64>,
    ) -> Result<String, NodeError> {
        self.insert(parent, name, Node::Value(cell))
    }

    /// Create a wakeup pipe endpoint
    pub fn create_pipe(
        &self,
        parent: &str,
        name: &str,
        pipe: Arc<WakeupPipe>,
    ) -> Result<String, NodeError> {
        self.insert(parent, name, Node::Pipe(pipe))
    }

    /// Remove a single entry. Directories must be empty.
    pub fn remove(&self, path: &str) -> Result<(), NodeError> {
        let comps = components(path);
        let (last, parents) = comps.split_last().ok_or(NodeError::InvalidName)?;
        let mut root = self.write();
        let dir = dir_mut(&mut root, parents)?;
        match dir.get(*last) {
            None => return Err(NodeError::ParentMissing),
            Some(Node::Dir(children)) if !children.is_empty() => return Err(NodeError::NotEmpty),
            Some(_) => {}
        }
        dir.remove(*last);
        self.nodes.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    /// Remove an entry and everything below it.
    ///
    /// Returns the number of nodes removed; a missing path removes nothing.
    pub fn remove_recursive(&self, path: &str) -> usize {
        let comps = components(path);
        let Some((last, parents)) = comps.split_last() else {
            return 0;
        };
        let mut root = self.write();
        let Ok(dir) = dir_mut(&mut root, parents) else {
            return 0;
        };
        match dir.remove(*last) {
            Some(node) => {
                let removed = node.subtree_size();
                self.nodes.fetch_sub(removed, Ordering::Relaxed);
                removed
            }
            None => 0,
        }
    }

    pub fn kind(&self, path: &str) -> Option<EntryKind> {
        lookup(&self.read(), &components(path)).map(Node::kind)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.kind(path).is_some()
    }

    /// Names directly under a directory, sorted
    pub fn list(&self, path: &str) -> TrackerResult<Vec<String>> {
        let root = self.read();
        let comps = components(path);
        let dir = if comps.is_empty() {
            &*root
        } else {
            match lookup(&root, &comps) {
                Some(Node::Dir(children)) => children,
                Some(_) => return Err(TrackerError::NotFound(path.to_string())),
                None => return Err(TrackerError::NotFound(path.to_string())),
            }
        };
        Ok(dir.keys().cloned().collect())
    }

    fn value(&self, path: &str) -> TrackerResult<Arc<AtomicU64>> {
        match lookup(&self.read(), &components(path)) {
            Some(Node::Value(cell)) => Ok(Arc::clone(cell)),
            Some(_) => Err(TrackerError::NotAValue(path.to_string())),
            None => Err(TrackerError::NotFound(path.to_string())),
        }
    }

    /// Read a u64 entry
    pub fn read_u64(&self, path: &str) -> TrackerResult<u64> {
        Ok(self.value(path)?.load(Ordering::Relaxed))
    }

    /// Write a u64 entry; visible to the next reader immediately
    pub fn write_u64(&self, path: &str, value: u64) -> TrackerResult<()> {
        self.value(path)?.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Resolve a wakeup pipe endpoint
    pub fn pipe(&self, path: &str) -> TrackerResult<Arc<WakeupPipe>> {
        match lookup(&self.read(), &components(path)) {
            Some(Node::Pipe(pipe)) => Ok(Arc::clone(pipe)),
            Some(_) => Err(TrackerError::NotAPipe(path.to_string())),
            None => Err(TrackerError::NotFound(path.to_string())),
        }
    }

    /// Open a wakeup pipe endpoint for reading
    pub fn open_pipe(&self, path: &str) -> TrackerResult<ReaderHandle> {
        Ok(WakeupPipe::open(&self.pipe(path)?))
    }

    /// Nodes currently in the namespace
    pub fn node_count(&self) -> usize {
        self.nodes.load(Ordering::Relaxed)
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("nodes", &self.node_count())
            .field("max_nodes", &self.max_nodes)
            .finish()
    }
}
