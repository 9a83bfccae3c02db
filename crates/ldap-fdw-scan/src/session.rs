use std::fmt;
use std::vec;

use ldap_fdw_common::error::{LdapFdwError, LdapFdwResult};
use log::{debug, warn};

use crate::directory::{DirectoryConnection, DirectoryConnector, DirectoryEntry, SearchRequest};
use crate::options::EffectiveConfig;

/// The filter used when neither a static query nor a pushed predicate is present.
pub const MATCH_ALL_FILTER: &str = "(objectClass=*)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Bound,
    Searching,
    Exhausted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "closed",
            SessionState::Bound => "bound",
            SessionState::Searching => "searching",
            SessionState::Exhausted => "exhausted",
        };
        write!(f, "{name}")
    }
}

/// Combines the pushed filter fragment with the static query of the table.
///
/// Both are kept when both are present: the result matches the entries
/// that satisfy the fragment AND the query.
pub fn compose_filter(fragment: Option<&str>, query: Option<&str>) -> String {
    match (fragment, query.map(parenthesize)) {
        (Some(fragment), Some(query)) => format!("(&{}{query})", parenthesize(fragment)),
        (Some(fragment), None) => parenthesize(fragment),
        (None, Some(query)) => query,
        (None, None) => MATCH_ALL_FILTER.to_string(),
    }
}

fn parenthesize(filter: &str) -> String {
    let filter = filter.trim();
    if filter.starts_with('(') && filter.ends_with(')') {
        filter.to_string()
    } else {
        format!("({filter})")
    }
}

/// One connection to a directory server and the result of its single search.
///
/// The session is owned by exactly one scan. Every entry is fetched by
/// [`DirectorySession::open`]; advancing the cursor does no network I/O.
pub struct DirectorySession {
    state: SessionState,
    connection: Option<Box<dyn DirectoryConnection>>,
    entries: vec::IntoIter<DirectoryEntry>,
}

impl fmt::Debug for DirectorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySession")
            .field("state", &self.state)
            .field("remaining", &self.entries.len())
            .finish()
    }
}

impl Default for DirectorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectorySession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Closed,
            connection: None,
            entries: Vec::new().into_iter(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connects, binds and runs the search with the static query of the
    /// table combined with the pushed filter fragment, if any.
    ///
    /// On failure, whatever was acquired is released before returning
    /// and the session stays closed.
    pub fn open(
        &mut self,
        connector: &dyn DirectoryConnector,
        config: &EffectiveConfig,
        fragment: Option<&str>,
        attributes: &[String],
    ) -> LdapFdwResult<()> {
        if self.state != SessionState::Closed {
            return Err(LdapFdwError::internal(format!(
                "cannot open a directory session that is {}",
                self.state
            )));
        }
        let filter = compose_filter(fragment, config.query.as_deref());
        let result = self.connect_and_search(connector, config, &filter, attributes);
        if result.is_err() {
            self.close();
        }
        result
    }

    fn connect_and_search(
        &mut self,
        connector: &dyn DirectoryConnector,
        config: &EffectiveConfig,
        filter: &str,
        attributes: &[String],
    ) -> LdapFdwResult<()> {
        let address = config.address.as_str();
        let port = config.port;
        let connection = self.connection.insert(
            connector
                .connect(address, port)
                .map_err(|e| {
                    LdapFdwError::connection(
                        address,
                        port,
                        format!("failed to create LDAP handle: {e}"),
                    )
                })?,
        );
        connection
            .set_protocol_version(config.ldap_version)
            .map_err(|e| {
                LdapFdwError::connection(
                    address,
                    port,
                    format!("failed to set LDAP protocol version {}: {e}", config.ldap_version),
                )
            })?;
        connection
            .simple_bind(&config.user_dn, config.password.expose())
            .map_err(|e| {
                let user = if config.is_anonymous() {
                    "anonymous bind".to_string()
                } else {
                    format!("user_dn '{}'", config.user_dn)
                };
                LdapFdwError::connection(
                    address,
                    port,
                    format!("failed to authenticate using {user}: {e}"),
                )
            })?;
        self.state = SessionState::Bound;
        debug!(
            "bound to {address}:{port}, searching '{filter}' under '{}'",
            config.base_dn
        );

        let request = SearchRequest {
            base: config.base_dn.clone(),
            filter: filter.to_string(),
            attributes: attributes.to_vec(),
        };
        let entries = connection
            .search(&request)
            .map_err(|e| LdapFdwError::execution(filter, &config.base_dn, e.to_string()))?;
        debug!("search returned {} entries", entries.len());
        self.entries = entries.into_iter();
        self.state = SessionState::Searching;
        Ok(())
    }

    /// Advances the cursor. Returns `None` once every entry has been returned.
    pub fn next_entry(&mut self) -> Option<DirectoryEntry> {
        match self.state {
            SessionState::Searching => {
                let entry = self.entries.next();
                if entry.is_none() {
                    self.state = SessionState::Exhausted;
                }
                entry
            }
            SessionState::Closed | SessionState::Bound | SessionState::Exhausted => None,
        }
    }

    /// Releases the connection and any entries not yet returned.
    /// Closing a closed session does nothing.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.unbind() {
                warn!("failed to unbind from directory server: {e}");
            }
            debug!("directory session closed from state {}", self.state);
        }
        self.entries = Vec::new().into_iter();
        self.state = SessionState::Closed;
    }
}

impl Drop for DirectorySession {
    fn drop(&mut self) {
        self.close();
    }
}
