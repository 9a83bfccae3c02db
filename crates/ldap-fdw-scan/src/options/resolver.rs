use std::fmt;

use ldap_fdw_common::error::{LdapFdwError, LdapFdwResult};

use crate::options::{
    load_options, LdapOptions, ObjectKind, OptionCatalog, OptionLayers, DEFAULT_ADDRESS,
    DEFAULT_LDAP_VERSION, DEFAULT_PORT,
};

/// A credential that is never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

/// The connection and query parameters of one foreign table,
/// after all option layers have been merged and defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub address: String,
    pub port: u16,
    pub ldap_version: u8,
    /// Empty together with `password` for an anonymous bind.
    pub user_dn: String,
    pub password: Secret,
    pub base_dn: String,
    pub query: Option<String>,
    /// Empty means the attributes are derived from the declared columns.
    pub attributes: Vec<String>,
}

impl EffectiveConfig {
    pub fn is_anonymous(&self) -> bool {
        self.user_dn.is_empty()
    }
}

impl TryFrom<LdapOptions> for EffectiveConfig {
    type Error = LdapFdwError;

    fn try_from(options: LdapOptions) -> LdapFdwResult<Self> {
        let LdapOptions {
            address,
            port,
            ldap_version,
            user_dn,
            password,
            base_dn,
            query,
            attributes,
        } = options;
        let Some(base_dn) = base_dn else {
            return Err(LdapFdwError::configuration(
                "missing required option \"base_dn\" on foreign table",
            ));
        };
        let password = password.filter(|p| !p.expose().is_empty());
        let (user_dn, password) = match (user_dn, password) {
            (Some(user_dn), Some(password)) => (user_dn, password),
            (None, None) => (String::new(), Secret::default()),
            (Some(_), None) => {
                return Err(LdapFdwError::configuration(
                    "option \"user_dn\" is set but \"password\" is missing on user mapping",
                ))
            }
            (None, Some(_)) => {
                return Err(LdapFdwError::configuration(
                    "option \"password\" is set but \"user_dn\" is missing on user mapping",
                ))
            }
        };
        Ok(Self {
            address: address.unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            port: port.unwrap_or(DEFAULT_PORT),
            ldap_version: ldap_version.unwrap_or(DEFAULT_LDAP_VERSION),
            user_dn,
            password,
            base_dn,
            query,
            attributes: attributes.unwrap_or_default(),
        })
    }
}

/// Merges the option layers of a foreign table into its effective configuration.
///
/// Table options take precedence over server options,
/// which take precedence over user mapping options.
/// No connection is made.
pub fn resolve_options(layers: OptionLayers) -> LdapFdwResult<EffectiveConfig> {
    let OptionLayers {
        table,
        server,
        user_mapping,
    } = layers;
    let table = load_options(ObjectKind::Table, table)?;
    let server = load_options(ObjectKind::Server, server)?;
    let user_mapping = load_options(ObjectKind::UserMapping, user_mapping)?;
    EffectiveConfig::try_from(table.merge(server).merge(user_mapping))
}

pub fn resolve_table_options(
    catalog: &dyn OptionCatalog,
    table: &str,
) -> LdapFdwResult<EffectiveConfig> {
    resolve_options(catalog.option_layers(table)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::options::loader::build_options;

    fn layers(
        table: &[(&str, &str)],
        server: &[(&str, &str)],
        user_mapping: &[(&str, &str)],
    ) -> OptionLayers {
        OptionLayers {
            table: build_options(table),
            server: build_options(server),
            user_mapping: build_options(user_mapping),
        }
    }

    #[test]
    fn test_resolve_takes_each_key_from_its_layer() {
        let config = resolve_options(layers(
            &[("base_dn", "ou=people,dc=example,dc=org"), ("query", "(objectClass=person)")],
            &[("address", "ldap.example.org"), ("port", "1389")],
            &[("user_dn", "cn=admin,dc=example,dc=org"), ("password", "secret")],
        ))
        .unwrap();
        assert_eq!(config.address, "ldap.example.org");
        assert_eq!(config.port, 1389);
        assert_eq!(config.base_dn, "ou=people,dc=example,dc=org");
        assert_eq!(config.query.as_deref(), Some("(objectClass=person)"));
        assert_eq!(config.user_dn, "cn=admin,dc=example,dc=org");
        assert_eq!(config.password.expose(), "secret");
        assert!(!config.is_anonymous());
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let config = resolve_options(layers(&[("base_dn", "dc=example,dc=org")], &[], &[])).unwrap();
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 389);
        assert_eq!(config.ldap_version, 3);
        assert_eq!(config.query, None);
        assert!(config.attributes.is_empty());
        assert!(config.is_anonymous());
    }

    #[test]
    fn test_merge_prefers_earlier_layer() {
        let table = LdapOptions {
            base_dn: Some("dc=table".to_string()),
            ..Default::default()
        };
        let server = LdapOptions {
            base_dn: Some("dc=server".to_string()),
            address: Some("server".to_string()),
            ..Default::default()
        };
        let merged = table.merge(server);
        assert_eq!(merged.base_dn.as_deref(), Some("dc=table"));
        assert_eq!(merged.address.as_deref(), Some("server"));
    }

    #[test]
    fn test_resolve_requires_base_dn() {
        let error = resolve_options(layers(&[], &[("address", "localhost")], &[])).unwrap_err();
        assert!(matches!(error, LdapFdwError::Configuration(_)));
        assert!(error.to_string().contains("base_dn"));
    }

    #[test]
    fn test_resolve_rejects_unknown_key_before_connecting() {
        let error = resolve_options(layers(
            &[("base_dn", "dc=example,dc=org"), ("scope", "sub")],
            &[],
            &[],
        ))
        .unwrap_err();
        assert!(error
            .to_string()
            .ends_with("valid options in this context are: base_dn, query, attributes"));
    }

    #[test]
    fn test_resolve_rejects_partial_credentials() {
        let error = resolve_options(layers(
            &[("base_dn", "dc=example,dc=org")],
            &[],
            &[("user_dn", "cn=admin,dc=example,dc=org")],
        ))
        .unwrap_err();
        assert!(matches!(error, LdapFdwError::Configuration(_)));
    }

    #[test]
    fn test_secret_is_not_printed() {
        let config = resolve_options(layers(
            &[("base_dn", "dc=example,dc=org")],
            &[],
            &[("user_dn", "cn=admin"), ("password", "hunter2")],
        ))
        .unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
