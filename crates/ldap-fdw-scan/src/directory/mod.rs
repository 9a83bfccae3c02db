mod filter;
mod ldap;
mod memory;

use std::fmt::Debug;

use thiserror::Error;

pub use filter::SearchFilter;
pub use ldap::Ldap3Connector;
pub use memory::MemoryDirectory;

/// An error reported by the directory client, carrying the native diagnostic text.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DirectoryError {
    message: String,
}

impl DirectoryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// The values of one directory attribute, in the order the server returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeValues(Vec<String>);

impl AttributeValues {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the values as one text cell.
    ///
    /// A single value is rendered as is, several values as `[v1,v2,...]`.
    /// There is nothing to render without values.
    pub fn flatten(&self) -> Option<String> {
        match self.0.as_slice() {
            [] => None,
            [value] => Some(value.clone()),
            values => Some(format!("[{}]", values.join(","))),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for AttributeValues {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryAttribute {
    pub name: String,
    pub values: AttributeValues,
}

/// One entry returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    dn: String,
    attributes: Vec<DirectoryAttribute>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: vec![],
        }
    }

    pub fn with_attribute<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.push(DirectoryAttribute {
            name: name.into(),
            values: values.into_iter().collect(),
        });
        self
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn attributes(&self) -> &[DirectoryAttribute] {
        &self.attributes
    }

    /// Finds an attribute by name, ignoring case.
    pub fn attribute(&self, name: &str) -> Option<&DirectoryAttribute> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

/// A single-level search under `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub filter: String,
    /// The attributes to return. `*` requests every user attribute
    /// and `1.1` requests none.
    pub attributes: Vec<String>,
}

/// Opens connections to a directory server.
pub trait DirectoryConnector: Debug + Send + Sync {
    fn connect(&self, address: &str, port: u16) -> DirectoryResult<Box<dyn DirectoryConnection>>;
}

/// A live connection to a directory server.
///
/// Dropping the connection releases it, but [`DirectoryConnection::unbind`]
/// lets the caller observe a failure to do so.
pub trait DirectoryConnection: Send {
    fn set_protocol_version(&mut self, version: u8) -> DirectoryResult<()>;

    /// Performs a simple bind. An empty DN and password is an anonymous bind.
    fn simple_bind(&mut self, user_dn: &str, password: &str) -> DirectoryResult<()>;

    /// Runs a single-level search without a size limit and returns every entry.
    fn search(&mut self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>>;

    fn unbind(&mut self) -> DirectoryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_single_value() {
        let values = AttributeValues::from_iter(["alice"]);
        assert_eq!(values.flatten(), Some("alice".to_string()));
    }

    #[test]
    fn test_flatten_multiple_values_keeps_order() {
        let values = AttributeValues::from_iter(["b@example.org", "a@example.org"]);
        assert_eq!(
            values.flatten(),
            Some("[b@example.org,a@example.org]".to_string())
        );
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let values = AttributeValues::from_iter(["x", "y"]);
        assert_eq!(values.flatten(), values.flatten());
        let single = AttributeValues::from_iter(["x"]);
        assert_eq!(single.flatten(), single.flatten());
    }

    #[test]
    fn test_flatten_without_values() {
        assert_eq!(AttributeValues::default().flatten(), None);
    }

    #[test]
    fn test_attribute_lookup_ignores_case() {
        let entry = DirectoryEntry::new("uid=alice,dc=example,dc=org")
            .with_attribute("mailAlternateAddress", ["alice@example.org"]);
        assert!(entry.attribute("MAILALTERNATEADDRESS").is_some());
        assert!(entry.attribute("mail").is_none());
    }
}
