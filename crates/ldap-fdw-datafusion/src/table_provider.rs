use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::catalog::{Session, TableProvider};
use datafusion::common::{plan_err, DataFusionError, Result};
use datafusion::logical_expr::{Expr, TableProviderFilterPushDown, TableType};
use datafusion::physical_plan::ExecutionPlan;
use ldap_fdw_scan::options::resolve_table_options;
use ldap_fdw_scan::{
    filter_pushdown_support, DirectoryConnector, EffectiveConfig, OptionCatalog, IDENTITY_COLUMN,
};

use crate::physical_plan::{LdapScanExec, ScanTarget};

/// Exposes the entries under the base of a foreign table as a table of text columns.
#[derive(Debug)]
pub struct LdapTableProvider {
    target: ScanTarget,
    schema: SchemaRef,
}

impl LdapTableProvider {
    pub fn try_new(
        name: impl Into<String>,
        columns: Vec<String>,
        config: EffectiveConfig,
        connector: Arc<dyn DirectoryConnector>,
        batch_size: usize,
    ) -> Result<Self> {
        let name = name.into();
        if columns.is_empty() {
            return plan_err!("foreign table {name} must declare at least one column");
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.eq_ignore_ascii_case(column)) {
                return plan_err!("foreign table {name} declares column {column} more than once");
            }
        }
        let fields = columns
            .iter()
            .map(|c| Field::new(c, DataType::Utf8, !c.eq_ignore_ascii_case(IDENTITY_COLUMN)))
            .collect::<Vec<_>>();
        Ok(Self {
            target: ScanTarget {
                name,
                columns,
                config,
                connector,
                batch_size: batch_size.max(1),
            },
            schema: Arc::new(Schema::new(fields)),
        })
    }

    /// Resolves the options of `name` from the catalog.
    pub fn try_from_catalog(
        catalog: &dyn OptionCatalog,
        name: &str,
        columns: Vec<String>,
        connector: Arc<dyn DirectoryConnector>,
        batch_size: usize,
    ) -> Result<Self> {
        let config = resolve_table_options(catalog, name)
            .map_err(|e| DataFusionError::External(Box::new(e)))?;
        Self::try_new(name, columns, config, connector, batch_size)
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.target.config
    }
}

#[async_trait]
impl TableProvider for LdapTableProvider {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn table_type(&self) -> TableType {
        TableType::Base
    }

    fn supports_filters_pushdown(
        &self,
        filters: &[&Expr],
    ) -> Result<Vec<TableProviderFilterPushDown>> {
        Ok(filter_pushdown_support(filters, &self.target.columns))
    }

    async fn scan(
        &self,
        _state: &dyn Session,
        projection: Option<&Vec<usize>>,
        filters: &[Expr],
        limit: Option<usize>,
    ) -> Result<Arc<dyn ExecutionPlan>> {
        Ok(Arc::new(LdapScanExec::try_new(
            self.target.clone(),
            self.schema.clone(),
            projection.cloned(),
            filters.to_vec(),
            limit,
        )?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use datafusion::prelude::{col, lit};
    use ldap_fdw_scan::options::Secret;
    use ldap_fdw_scan::MemoryDirectory;

    use super::*;

    fn config() -> EffectiveConfig {
        EffectiveConfig {
            address: "127.0.0.1".to_string(),
            port: 389,
            ldap_version: 3,
            user_dn: String::new(),
            password: Secret::default(),
            base_dn: "dc=example,dc=org".to_string(),
            query: None,
            attributes: vec![],
        }
    }

    fn provider(columns: &[&str]) -> Result<LdapTableProvider> {
        LdapTableProvider::try_new(
            "people",
            columns.iter().map(|c| c.to_string()).collect(),
            config(),
            Arc::new(MemoryDirectory::default()),
            8192,
        )
    }

    #[test]
    fn test_schema_marks_only_dn_as_required() {
        let provider = provider(&["DN", "cn"]).unwrap();
        let schema = provider.schema();
        assert!(!schema.field(0).is_nullable());
        assert!(schema.field(1).is_nullable());
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_invalid_column_lists_are_rejected() {
        assert!(provider(&[]).is_err());
        assert!(provider(&["dn", "cn", "CN"]).is_err());
    }

    #[test]
    fn test_only_dn_equality_is_exact() {
        let provider = provider(&["dn", "cn"]).unwrap();
        let by_cn = col("cn").eq(lit("alice"));
        let by_dn = col("dn").eq(lit("uid=alice,dc=example,dc=org"));
        let support = provider
            .supports_filters_pushdown(&[&by_cn, &by_dn])
            .unwrap();
        assert_eq!(
            support,
            vec![
                TableProviderFilterPushDown::Unsupported,
                TableProviderFilterPushDown::Exact,
            ]
        );
    }
}
