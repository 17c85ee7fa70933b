//! Configuration store with generic, path-addressed mutation.
//!
//! The store holds the in-memory copy of the server's configuration
//! document. The authoritative copy is server-side; the client copy is a
//! cache that may run transiently ahead of the server while a coalesced
//! write is pending (see [`crate::services::AutosavePolicy`]).
//!
//! Every mutation produces a new document graph: ancestors along the edited
//! path are shallow-cloned, everything else keeps its `Arc` identity. A
//! snapshot taken before a mutation therefore stays valid and unmodified.

use crate::models::ConfigValue;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::{Arc, LazyLock, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of the document-change broadcast channel.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Allowed characters for a single key segment.
static SEGMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("Invalid segment regex"));

/// Errors from path-addressed document operations.
///
/// These are programmer-facing: a malformed path or out-of-bounds index
/// indicates a caller bug and fails loudly instead of silently no-opping.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("malformed path: {0:?}")]
    MalformedPath(String),

    #[error("no document loaded")]
    NotLoaded,

    #[error("segment `{segment}` of path `{path}` does not resolve to an object")]
    NotAnObject { path: String, segment: String },

    #[error("segment `{segment}` of path `{path}` not found")]
    NotFound { path: String, segment: String },

    #[error("path `{0}` does not resolve to a list")]
    NotAList(String),

    #[error("index {index} out of bounds for list at `{path}` (len {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },
}

/// A validated, parsed dot-separated key sequence.
///
/// Parsing rejects empty paths, empty segments (`a..b`) and segments with
/// characters outside `[A-Za-z0-9_-]`, converting what would otherwise be a
/// silent mis-addressed write into an explicit [`ConfigError::MalformedPath`].
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPath {
    raw: String,
    segments: Vec<String>,
}

impl KeyPath {
    pub fn parse(path: &str) -> Result<Self, ConfigError> {
        if path.is_empty() {
            return Err(ConfigError::MalformedPath(path.to_string()));
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        for segment in &segments {
            if !SEGMENT_PATTERN.is_match(segment) {
                return Err(ConfigError::MalformedPath(path.to_string()));
            }
        }
        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// What kind of edit produced a [`DocumentChange`].
///
/// Scalar writes arm the autosave timer; list-shape edits stay local until
/// the next scalar edit carries the full document along (see DESIGN.md for
/// the rationale behind this asymmetry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    SetValue,
    SetListItem,
    AppendListItem,
    RemoveListItem,
}

impl ChangeKind {
    /// Whether this edit schedules a coalesced persistence write.
    pub fn schedules_save(self) -> bool {
        matches!(self, ChangeKind::SetValue | ChangeKind::SetListItem)
    }
}

/// An effective mutation of the document, carrying the full new snapshot.
///
/// No-op calls (blank-tail append, removal of an absent item) publish
/// nothing.
#[derive(Debug, Clone)]
pub struct DocumentChange {
    pub doc: Arc<ConfigValue>,
    pub kind: ChangeKind,
}

/// Outcome of a leaf operation during a path rebuild.
enum LeafOutcome {
    Replace(ConfigValue),
    Unchanged,
}

/// In-memory configuration document with path-addressed mutation.
///
/// Cloning the store clones the handle; all clones share the same document
/// and change channel, mirroring how [`crate::state::EventAggregator`]
/// shares its state.
pub struct ConfigStore {
    doc: Arc<RwLock<Option<Arc<ConfigValue>>>>,
    change_tx: broadcast::Sender<DocumentChange>,
}

impl ConfigStore {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            doc: Arc::new(RwLock::new(None)),
            change_tx,
        }
    }

    /// Replace the whole document, e.g. after the initial `GET /config`.
    ///
    /// Loading is not an edit: it publishes no change and schedules no write.
    pub fn load(&self, doc: ConfigValue) {
        *self.doc.write().unwrap() = Some(Arc::new(doc));
        tracing::debug!("configuration document loaded");
    }

    /// Current document snapshot, or `None` before the initial load.
    pub fn get(&self) -> Option<Arc<ConfigValue>> {
        self.doc.read().unwrap().clone()
    }

    /// Read the node at `path`, if the path resolves.
    pub fn get_path(&self, path: &str) -> Result<Option<Arc<ConfigValue>>, ConfigError> {
        let key_path = KeyPath::parse(path)?;
        let Some(root) = self.get() else {
            return Err(ConfigError::NotLoaded);
        };

        let mut node = root;
        for segment in key_path.segments() {
            let child = match node.as_object() {
                Some(map) => map.get(segment).cloned(),
                None => return Ok(None),
            };
            match child {
                Some(c) => node = c,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    /// Replace (or insert) the leaf at `path`.
    ///
    /// Fails with [`ConfigError::NotAnObject`] / [`ConfigError::NotFound`]
    /// when an intermediate segment does not resolve to a container.
    pub fn set_path(&self, path: &str, value: ConfigValue) -> Result<(), ConfigError> {
        self.mutate(path, ChangeKind::SetValue, |_current| {
            Ok(LeafOutcome::Replace(value))
        })
    }

    /// Append `item` to the string list at `path`.
    ///
    /// No-op when the list's last element is the empty string: a consumer
    /// double-submitting an "add row" action without filling the previous
    /// blank entry must not stack up blank rows.
    pub fn append_list_item(&self, path: &str, item: &str) -> Result<(), ConfigError> {
        self.mutate(path, ChangeKind::AppendListItem, |current| {
            let items = expect_list(current, path)?;
            if items.last().is_some_and(String::is_empty) {
                return Ok(LeafOutcome::Unchanged);
            }
            let mut items = items.to_vec();
            items.push(item.to_string());
            Ok(LeafOutcome::Replace(ConfigValue::List(items)))
        })
    }

    /// Remove every exact-match occurrence of `item` from the list at `path`.
    ///
    /// A no-op (not an error) when `item` is absent.
    pub fn remove_list_item(&self, path: &str, item: &str) -> Result<(), ConfigError> {
        self.mutate(path, ChangeKind::RemoveListItem, |current| {
            let items = expect_list(current, path)?;
            let filtered: Vec<String> = items.iter().filter(|i| *i != item).cloned().collect();
            if filtered.len() == items.len() {
                return Ok(LeafOutcome::Unchanged);
            }
            Ok(LeafOutcome::Replace(ConfigValue::List(filtered)))
        })
    }

    /// Replace the element at `index` in the list at `path`.
    pub fn set_list_item(&self, path: &str, index: usize, value: &str) -> Result<(), ConfigError> {
        self.mutate(path, ChangeKind::SetListItem, |current| {
            let items = expect_list(current, path)?;
            if index >= items.len() {
                return Err(ConfigError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            let mut items = items.to_vec();
            items[index] = value.to_string();
            Ok(LeafOutcome::Replace(ConfigValue::List(items)))
        })
    }

    /// Subscribe to effective document changes.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.change_tx.subscribe()
    }

    /// Run a leaf operation at `path`, rebuilding ancestors on success.
    ///
    /// Holds the write lock across the rebuild and the change broadcast so
    /// subscribers never observe a half-applied edit.
    fn mutate<F>(&self, path: &str, kind: ChangeKind, leaf_op: F) -> Result<(), ConfigError>
    where
        F: FnOnce(Option<&ConfigValue>) -> Result<LeafOutcome, ConfigError>,
    {
        let key_path = KeyPath::parse(path)?;

        let mut guard = self.doc.write().unwrap();
        let root = guard.clone().ok_or(ConfigError::NotLoaded)?;

        match rebuild(&root, &key_path, key_path.segments(), leaf_op)? {
            Some(new_root) => {
                *guard = Some(new_root.clone());
                // Ignore send errors - it's OK if no one is listening
                let _ = self.change_tx.send(DocumentChange {
                    doc: new_root,
                    kind,
                });
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Rebuild the path from `node` down, applying `leaf_op` at the last segment.
///
/// Returns `None` when the leaf op reported no change. Each rebuilt level
/// clones only its own map; children off the path keep their `Arc` identity.
fn rebuild<F>(
    node: &Arc<ConfigValue>,
    path: &KeyPath,
    segments: &[String],
    leaf_op: F,
) -> Result<Option<Arc<ConfigValue>>, ConfigError>
where
    F: FnOnce(Option<&ConfigValue>) -> Result<LeafOutcome, ConfigError>,
{
    let (head, rest) = segments
        .split_first()
        .expect("rebuild called with empty segments");

    let map = node
        .as_object()
        .ok_or_else(|| ConfigError::NotAnObject {
            path: path.as_str().to_string(),
            segment: head.clone(),
        })?;

    if rest.is_empty() {
        return match leaf_op(map.get(head).map(Arc::as_ref))? {
            LeafOutcome::Unchanged => Ok(None),
            LeafOutcome::Replace(value) => {
                let mut map = map.clone();
                map.insert(head.clone(), Arc::new(value));
                Ok(Some(Arc::new(ConfigValue::Object(map))))
            }
        };
    }

    let child = map.get(head).ok_or_else(|| ConfigError::NotFound {
        path: path.as_str().to_string(),
        segment: head.clone(),
    })?;

    match rebuild(child, path, rest, leaf_op)? {
        None => Ok(None),
        Some(new_child) => {
            let mut map: IndexMap<String, Arc<ConfigValue>> = map.clone();
            map.insert(head.clone(), new_child);
            Ok(Some(Arc::new(ConfigValue::Object(map))))
        }
    }
}

/// The list-leaf accessor shared by the list operations.
fn expect_list<'a>(
    current: Option<&'a ConfigValue>,
    path: &str,
) -> Result<&'a [String], ConfigError> {
    match current {
        Some(ConfigValue::List(items)) => Ok(items),
        Some(_) => Err(ConfigError::NotAList(path.to_string())),
        None => Err(ConfigError::NotFound {
            path: path.to_string(),
            segment: path.rsplit('.').next().unwrap_or(path).to_string(),
        }),
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ConfigStore {
    fn clone(&self) -> Self {
        Self {
            doc: Arc::clone(&self.doc),
            change_tx: self.change_tx.clone(),
        }
    }
}
