use thiserror::Error;

pub type LdapFdwResult<T> = Result<T, LdapFdwError>;

#[derive(Debug, Error)]
pub enum LdapFdwError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to connect to LDAP server at '{address}' on port {port}: {message}")]
    Connection {
        address: String,
        port: u16,
        message: String,
    },
    #[error("failed to execute the LDAP search '{filter}' on base_dn '{base}': {message}")]
    Execution {
        filter: String,
        base: String,
        message: String,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

impl LdapFdwError {
    pub fn configuration(message: impl Into<String>) -> Self {
        LdapFdwError::Configuration(message.into())
    }

    pub fn connection(address: impl Into<String>, port: u16, message: impl Into<String>) -> Self {
        LdapFdwError::Connection {
            address: address.into(),
            port,
            message: message.into(),
        }
    }

    pub fn execution(
        filter: impl Into<String>,
        base: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        LdapFdwError::Execution {
            filter: filter.into(),
            base: base.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        LdapFdwError::Internal(message.into())
    }
}
