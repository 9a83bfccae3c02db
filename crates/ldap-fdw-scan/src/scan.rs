use std::fmt;
use std::sync::Arc;

use datafusion_expr::Expr;
use ldap_fdw_common::error::{LdapFdwError, LdapFdwResult};
use log::{debug, trace};

use crate::directory::DirectoryConnector;
use crate::options::{resolve_table_options, EffectiveConfig, OptionCatalog};
use crate::projection::{OutputRow, ProjectionMode, Projector};
use crate::pushdown::{analyze_filters, Pushdown};
use crate::session::{compose_filter, DirectorySession};

/// What the relational engine asks of one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// Every column declared on the foreign table, in order.
    pub columns: Vec<String>,
    /// Indices into `columns` to produce. `None` produces every column.
    pub projection: Option<Vec<usize>>,
    /// Top-level conjuncts of the scan filter.
    pub filters: Vec<Expr>,
    /// Plan the scan without contacting the server.
    pub explain_only: bool,
}

/// The constant cost reported for every scan.
/// The number of entries is not known before the search is run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanEstimate {
    pub startup_cost: f64,
    pub total_cost: f64,
    pub rows: usize,
}

impl Default for ScanEstimate {
    fn default() -> Self {
        Self {
            startup_cost: 10.0,
            total_cost: 15.0,
            rows: 1,
        }
    }
}

/// Drives one foreign scan: begin, fetch rows until exhausted, end.
///
/// The scan owns its directory session. Ending the scan, or dropping it,
/// releases the connection.
pub struct DirectoryScan {
    connector: Arc<dyn DirectoryConnector>,
    config: EffectiveConfig,
    columns: Vec<String>,
    projector: Projector,
    attributes: Vec<String>,
    filters: Vec<Expr>,
    pushdown: Pushdown,
    session: DirectorySession,
    explain_only: bool,
    ended: bool,
}

impl fmt::Debug for DirectoryScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryScan")
            .field("config", &self.config)
            .field("columns", &self.columns)
            .field("attributes", &self.attributes)
            .field("pushdown", &self.pushdown)
            .field("session", &self.session)
            .field("explain_only", &self.explain_only)
            .field("ended", &self.ended)
            .finish()
    }
}

impl DirectoryScan {
    /// Plans the scan and, unless only an explanation is requested,
    /// runs the directory search.
    pub fn begin(
        connector: Arc<dyn DirectoryConnector>,
        config: EffectiveConfig,
        request: ScanRequest,
    ) -> LdapFdwResult<Self> {
        let ScanRequest {
            columns,
            projection,
            filters,
            explain_only,
        } = request;
        let projector = Projector::new(&columns, projection.as_deref());
        let attributes = projector.requested_attributes(&config.attributes);
        let pushdown = analyze_filters(&filters, &columns);
        let mut scan = Self {
            connector,
            config,
            columns,
            projector,
            attributes,
            filters,
            pushdown,
            session: DirectorySession::new(),
            explain_only,
            ended: false,
        };
        debug!("beginning directory scan: {}", scan.explain());
        if !explain_only {
            scan.open()?;
        }
        Ok(scan)
    }

    fn open(&mut self) -> LdapFdwResult<()> {
        self.session.open(
            self.connector.as_ref(),
            &self.config,
            self.pushdown.fragment(),
            &self.attributes,
        )
    }

    /// Returns the next row, or `None` once every entry has been returned.
    pub fn next_row(&mut self) -> LdapFdwResult<Option<OutputRow>> {
        if self.ended {
            return Err(LdapFdwError::internal("cannot fetch rows from an ended scan"));
        }
        if self.explain_only {
            return Ok(None);
        }
        while let Some(entry) = self.session.next_entry() {
            if self.pushdown.accepts(entry.dn()) {
                return Ok(Some(self.projector.project(&entry)));
            }
            trace!("skipping entry {} that only loosely matches the pushed name", entry.dn());
        }
        Ok(None)
    }

    /// Restarts the scan with a new filter. The previous session is released
    /// before the new search is run.
    pub fn rescan(&mut self, filters: Vec<Expr>) -> LdapFdwResult<()> {
        self.session.close();
        self.pushdown = analyze_filters(&filters, &self.columns);
        self.filters = filters;
        self.ended = false;
        debug!("rescanning directory: {}", self.explain());
        if self.explain_only {
            return Ok(());
        }
        self.open()
    }

    /// Releases the directory session. Ending an ended scan does nothing.
    pub fn end(&mut self) {
        if !self.ended {
            self.session.close();
            self.ended = true;
        }
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    pub fn pushdown(&self) -> &Pushdown {
        &self.pushdown
    }

    /// The filter conjuncts the relational engine still has to evaluate.
    pub fn residual_filters(&self) -> Vec<&Expr> {
        self.pushdown.residual(&self.filters)
    }

    /// The directory search filter, combining the static query
    /// with the pushed predicate.
    pub fn filter(&self) -> String {
        compose_filter(self.pushdown.fragment(), self.config.query.as_deref())
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    pub fn estimate(&self) -> ScanEstimate {
        ScanEstimate::default()
    }

    pub fn explain(&self) -> String {
        let mode = match self.projector.mode() {
            ProjectionMode::ColumnMapped => "column-mapped",
            ProjectionMode::Document => "document",
        };
        format!(
            "server={}:{}, base_dn={}, filter={}, attributes=[{}], mode={mode}",
            self.config.address,
            self.config.port,
            self.config.base_dn,
            self.filter(),
            self.attributes.join(","),
        )
    }
}

impl Drop for DirectoryScan {
    fn drop(&mut self) {
        self.end();
    }
}

/// Resolves the options of `table` from the catalog and begins a scan on it.
pub fn begin_foreign_scan(
    catalog: &dyn OptionCatalog,
    connector: Arc<dyn DirectoryConnector>,
    table: &str,
    request: ScanRequest,
) -> LdapFdwResult<DirectoryScan> {
    let config = resolve_table_options(catalog, table)?;
    DirectoryScan::begin(connector, config, request)
}
