mod catalog;
mod loader;
mod resolver;
mod serde;

use std::fmt;

pub use catalog::{MemoryOptionCatalog, OptionCatalog, OptionLayers};
pub use loader::{load_options, validate_options};
pub use resolver::{resolve_options, resolve_table_options, EffectiveConfig, Secret};

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 389;
pub const DEFAULT_LDAP_VERSION: u8 = 3;

/// The kind of foreign object an option bag is declared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Server,
    UserMapping,
    Table,
}

impl ObjectKind {
    /// The option keys accepted on this kind of object.
    /// All values must be lowercased.
    pub fn allowed_keys(&self) -> &'static [&'static str] {
        match self {
            ObjectKind::Server => &["address", "port", "ldap_version"],
            ObjectKind::UserMapping => &["user_dn", "password"],
            ObjectKind::Table => &["base_dn", "query", "attributes"],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Server => "server",
            ObjectKind::UserMapping => "user mapping",
            ObjectKind::Table => "foreign table",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Options recognized on LDAP foreign objects.
///
/// Every field is optional so that one struct can hold the options of any
/// single layer. Layers are combined with [`LdapOptions::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, ::serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LdapOptions {
    #[serde(default, deserialize_with = "serde::deserialize_non_empty_string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "serde::deserialize_port")]
    pub port: Option<u16>,
    #[serde(default, deserialize_with = "serde::deserialize_parsed")]
    pub ldap_version: Option<u8>,
    #[serde(default, deserialize_with = "serde::deserialize_non_empty_string")]
    pub user_dn: Option<String>,
    #[serde(default, deserialize_with = "serde::deserialize_secret")]
    pub password: Option<Secret>,
    #[serde(default, deserialize_with = "serde::deserialize_non_empty_string")]
    pub base_dn: Option<String>,
    #[serde(default, deserialize_with = "serde::deserialize_non_empty_string")]
    pub query: Option<String>,
    #[serde(default, deserialize_with = "serde::deserialize_string_list")]
    pub attributes: Option<Vec<String>>,
}

impl LdapOptions {
    /// Combines two layers. A key set on `self` is kept,
    /// and `fallback` only fills in keys that `self` leaves unset.
    pub fn merge(self, fallback: LdapOptions) -> LdapOptions {
        LdapOptions {
            address: self.address.or(fallback.address),
            port: self.port.or(fallback.port),
            ldap_version: self.ldap_version.or(fallback.ldap_version),
            user_dn: self.user_dn.or(fallback.user_dn),
            password: self.password.or(fallback.password),
            base_dn: self.base_dn.or(fallback.base_dn),
            query: self.query.or(fallback.query),
            attributes: self.attributes.or(fallback.attributes),
        }
    }
}
