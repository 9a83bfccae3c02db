use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;

use crate::directory::filter::{normalize_dn, SearchFilter};
use crate::directory::{
    DirectoryConnection, DirectoryConnector, DirectoryEntry, DirectoryError, DirectoryResult,
    SearchRequest,
};

#[derive(Debug, Default)]
struct MemoryDirectoryState {
    entries: Vec<DirectoryEntry>,
    users: HashMap<String, String>,
    require_authentication: bool,
    unreachable: bool,
    open_connections: AtomicUsize,
    searches: Mutex<Vec<SearchRequest>>,
}

/// A directory held in memory that answers searches the way a server would.
///
/// Clones share the same entries and the same connection bookkeeping,
/// so a test can keep a handle while a scan owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<MemoryDirectoryState>,
}

impl MemoryDirectory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            state: Arc::new(MemoryDirectoryState {
                entries,
                ..Default::default()
            }),
        }
    }

    /// Accepts simple binds for `dn` with `password`.
    pub fn with_user(self, dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.update(|state| {
            state.users.insert(normalize_dn(&dn.into()), password.into());
        })
    }

    /// Rejects anonymous binds.
    pub fn with_authentication_required(self) -> Self {
        self.update(|state| state.require_authentication = true)
    }

    /// Fails every connection attempt.
    pub fn unreachable(self) -> Self {
        self.update(|state| state.unreachable = true)
    }

    fn update(self, f: impl FnOnce(&mut MemoryDirectoryState)) -> Self {
        let MemoryDirectoryState {
            entries,
            users,
            require_authentication,
            unreachable,
            ..
        } = &*self.state;
        let mut state = MemoryDirectoryState {
            entries: entries.clone(),
            users: users.clone(),
            require_authentication: *require_authentication,
            unreachable: *unreachable,
            ..Default::default()
        };
        f(&mut state);
        Self {
            state: Arc::new(state),
        }
    }

    /// The number of connections that have been opened and not yet released.
    pub fn open_connections(&self) -> usize {
        self.state.open_connections.load(Ordering::SeqCst)
    }

    /// The searches issued so far, in order.
    pub fn searches(&self) -> Vec<SearchRequest> {
        self.state
            .searches
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl DirectoryConnector for MemoryDirectory {
    fn connect(&self, address: &str, port: u16) -> DirectoryResult<Box<dyn DirectoryConnection>> {
        if self.state.unreachable {
            return Err(DirectoryError::new(format!(
                "can't connect to {address}:{port}: connection refused"
            )));
        }
        self.state.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            state: Some(self.state.clone()),
            bound: false,
        }))
    }
}

struct MemoryConnection {
    state: Option<Arc<MemoryDirectoryState>>,
    bound: bool,
}

impl MemoryConnection {
    fn state(&self) -> DirectoryResult<&MemoryDirectoryState> {
        self.state
            .as_deref()
            .ok_or_else(|| DirectoryError::new("connection already released"))
    }
}

impl DirectoryConnection for MemoryConnection {
    fn set_protocol_version(&mut self, version: u8) -> DirectoryResult<()> {
        self.state()?;
        if version == 3 {
            Ok(())
        } else {
            Err(DirectoryError::new(format!(
                "rc=2, protocol version {version} is not supported"
            )))
        }
    }

    fn simple_bind(&mut self, user_dn: &str, password: &str) -> DirectoryResult<()> {
        let state = self.state()?;
        let accepted = if user_dn.is_empty() && password.is_empty() {
            !state.require_authentication
        } else {
            state
                .users
                .get(&normalize_dn(user_dn))
                .is_some_and(|p| p == password)
        };
        if !accepted {
            return Err(if user_dn.is_empty() {
                DirectoryError::new("rc=48, anonymous bind is not allowed")
            } else {
                DirectoryError::new("rc=49, invalid credentials")
            });
        }
        self.bound = true;
        Ok(())
    }

    fn search(&mut self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>> {
        let state = self.state()?;
        if state.require_authentication && !self.bound {
            return Err(DirectoryError::new("rc=50, authentication required"));
        }
        if let Ok(mut searches) = state.searches.lock() {
            searches.push(request.clone());
        }
        let filter = SearchFilter::parse(&request.filter)?;
        let base = normalize_dn(&request.base);
        let suffix = format!(",{base}");
        let base_exists = state.entries.iter().any(|e| {
            let dn = normalize_dn(e.dn());
            dn == base || dn.ends_with(&suffix)
        });
        if !base_exists {
            return Err(DirectoryError::new(format!(
                "rc=32, no such object: {}",
                request.base
            )));
        }
        let entries = state
            .entries
            .iter()
            .filter(|e| is_child_of(e.dn(), &base))
            .filter(|e| filter.matches(e))
            .map(|e| select_attributes(e, &request.attributes))
            .collect::<Vec<_>>();
        trace!(
            "memory search under {} with {} returned {} entries",
            request.base,
            request.filter,
            entries.len()
        );
        Ok(entries)
    }

    fn unbind(&mut self) -> DirectoryResult<()> {
        if let Some(state) = self.state.take() {
            state.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let _ = self.unbind();
    }
}

fn is_child_of(dn: &str, base: &str) -> bool {
    normalize_dn(dn)
        .split_once(',')
        .is_some_and(|(_, parent)| parent == base)
}

fn select_attributes(entry: &DirectoryEntry, attributes: &[String]) -> DirectoryEntry {
    if attributes.is_empty() || attributes.iter().any(|a| a == "*") {
        return entry.clone();
    }
    let attributes = entry
        .attributes()
        .iter()
        .filter(|a| attributes.iter().any(|n| n.eq_ignore_ascii_case(&a.name)))
        .cloned()
        .collect();
    DirectoryEntry {
        dn: entry.dn().to_string(),
        attributes,
    }
}
