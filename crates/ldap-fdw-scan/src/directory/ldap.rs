use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ldap3::{LdapConn, LdapConnSettings, LdapError, Scope, SearchEntry, SearchOptions};
use ldap_fdw_common::config::SessionConfig;
use log::debug;

use crate::directory::{
    DirectoryAttribute, DirectoryConnection, DirectoryConnector, DirectoryEntry, DirectoryError,
    DirectoryResult, SearchRequest,
};

/// The only protocol version the `ldap3` client speaks.
const SUPPORTED_LDAP_VERSION: u8 = 3;

impl From<LdapError> for DirectoryError {
    fn from(value: LdapError) -> Self {
        match value {
            LdapError::LdapResult { result } => DirectoryError::new(format!(
                "rc={}{}",
                result.rc,
                if result.text.is_empty() {
                    String::new()
                } else {
                    format!(", {}", result.text)
                }
            )),
            other => DirectoryError::new(other.to_string()),
        }
    }
}

/// Connects to directory servers with the synchronous `ldap3` client.
#[derive(Debug, Clone, Default)]
pub struct Ldap3Connector {
    connect_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
}

impl Ldap3Connector {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            operation_timeout: config.operation_timeout(),
        }
    }
}

impl DirectoryConnector for Ldap3Connector {
    fn connect(&self, address: &str, port: u16) -> DirectoryResult<Box<dyn DirectoryConnection>> {
        let url = ldap_url(address, port);
        let mut settings = LdapConnSettings::new();
        if let Some(timeout) = self.connect_timeout {
            settings = settings.set_conn_timeout(timeout);
        }
        debug!("connecting to {url}");
        let conn = LdapConn::with_settings(settings, &url)?;
        Ok(Box::new(Ldap3Connection {
            conn: Some(conn),
            operation_timeout: self.operation_timeout,
        }))
    }
}

struct Ldap3Connection {
    conn: Option<LdapConn>,
    operation_timeout: Option<Duration>,
}

impl Ldap3Connection {
    fn conn(&mut self) -> DirectoryResult<&mut LdapConn> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DirectoryError::new("connection already released"))?;
        Ok(match self.operation_timeout {
            Some(timeout) => conn.with_timeout(timeout),
            None => conn,
        })
    }
}

impl DirectoryConnection for Ldap3Connection {
    fn set_protocol_version(&mut self, version: u8) -> DirectoryResult<()> {
        if version == SUPPORTED_LDAP_VERSION {
            Ok(())
        } else {
            Err(DirectoryError::new(format!(
                "protocol version {version} is not supported, only version {SUPPORTED_LDAP_VERSION} is available"
            )))
        }
    }

    fn simple_bind(&mut self, user_dn: &str, password: &str) -> DirectoryResult<()> {
        self.conn()?.simple_bind(user_dn, password)?.success()?;
        Ok(())
    }

    fn search(&mut self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>> {
        let (entries, _) = self
            .conn()?
            .with_search_options(SearchOptions::new().sizelimit(0))
            .search(
                &request.base,
                Scope::OneLevel,
                &request.filter,
                &request.attributes,
            )?
            .success()?;
        Ok(entries
            .into_iter()
            .map(|entry| to_directory_entry(SearchEntry::construct(entry)))
            .collect())
    }

    fn unbind(&mut self) -> DirectoryResult<()> {
        match self.conn.take() {
            Some(mut conn) => Ok(conn.unbind()?),
            None => Ok(()),
        }
    }
}

fn ldap_url(address: &str, port: u16) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("ldap://[{address}]:{port}")
    } else {
        format!("ldap://{address}:{port}")
    }
}

/// Converts a decoded search entry, rendering binary values as base64 text.
/// Attributes are ordered by name since the decoded entry does not keep
/// the server order.
fn to_directory_entry(entry: SearchEntry) -> DirectoryEntry {
    let SearchEntry {
        dn,
        attrs,
        bin_attrs,
    } = entry;
    let mut attributes = attrs
        .into_iter()
        .map(|(name, values)| DirectoryAttribute {
            name,
            values: values.into_iter().collect(),
        })
        .chain(bin_attrs.into_iter().map(|(name, values)| DirectoryAttribute {
            name,
            values: values.iter().map(|v| STANDARD.encode(v)).collect(),
        }))
        .collect::<Vec<_>>();
    attributes.sort_by_key(|a| a.name.to_lowercase());
    DirectoryEntry { dn, attributes }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_ldap_url() {
        assert_eq!(ldap_url("127.0.0.1", 389), "ldap://127.0.0.1:389");
        assert_eq!(ldap_url("::1", 1389), "ldap://[::1]:1389");
        assert_eq!(ldap_url("[::1]", 389), "ldap://[::1]:389");
    }

    #[test]
    fn test_binary_values_are_base64_encoded() {
        let entry = SearchEntry {
            dn: "uid=alice,dc=example,dc=org".to_string(),
            attrs: HashMap::from([("cn".to_string(), vec!["alice".to_string()])]),
            bin_attrs: HashMap::from([("jpegPhoto".to_string(), vec![vec![0xff, 0xd8, 0xff]])]),
        };
        let entry = to_directory_entry(entry);
        assert_eq!(entry.dn(), "uid=alice,dc=example,dc=org");
        let names = entry
            .attributes()
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["cn", "jpegPhoto"]);
        assert_eq!(
            entry.attribute("jpegphoto").unwrap().values.flatten(),
            Some("/9j/".to_string())
        );
    }

    #[test]
    fn test_unsupported_protocol_version_is_rejected() {
        let mut connection = Ldap3Connection {
            conn: None,
            operation_timeout: None,
        };
        assert!(connection.set_protocol_version(2).is_err());
        assert!(connection.set_protocol_version(3).is_ok());
        assert!(connection.unbind().is_ok());
    }

    /// Requires a directory listening at `LDAP_FDW_TEST_ADDRESS` (default `127.0.0.1:389`).
    #[test]
    #[ignore]
    fn test_live_anonymous_bind() {
        let address =
            std::env::var("LDAP_FDW_TEST_ADDRESS").unwrap_or_else(|_| "127.0.0.1".to_string());
        let connector = Ldap3Connector::new(&SessionConfig::default());
        let mut connection = connector.connect(&address, 389).unwrap();
        connection.set_protocol_version(3).unwrap();
        connection.simple_bind("", "").unwrap();
        connection.unbind().unwrap();
    }
}
