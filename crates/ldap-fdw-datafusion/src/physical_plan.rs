use std::any::Any;
use std::fmt::Formatter;
use std::sync::Arc;

use datafusion::arrow::array::{ArrayRef, RecordBatch, RecordBatchOptions, StringBuilder};
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::common::{exec_err, plan_err, DataFusionError, Result};
use datafusion::execution::{SendableRecordBatchStream, TaskContext};
use datafusion::logical_expr::Expr;
use datafusion::physical_expr::EquivalenceProperties;
use datafusion::physical_plan::execution_plan::{Boundedness, EmissionType};
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::{
    DisplayAs, DisplayFormatType, ExecutionPlan, Partitioning, PlanProperties,
};
use futures::{stream, TryStreamExt};
use ldap_fdw_scan::{
    analyze_filters, compose_filter, DirectoryConnector, DirectoryScan, EffectiveConfig,
    OutputRow, ScanRequest,
};
use log::debug;

/// The foreign table a scan reads from.
#[derive(Debug, Clone)]
pub(crate) struct ScanTarget {
    pub name: String,
    pub columns: Vec<String>,
    pub config: EffectiveConfig,
    pub connector: Arc<dyn DirectoryConnector>,
    pub batch_size: usize,
}

#[derive(Debug)]
pub struct LdapScanExec {
    target: ScanTarget,
    projection: Option<Vec<usize>>,
    filters: Vec<Expr>,
    fetch: Option<usize>,
    search_filter: String,
    properties: PlanProperties,
}

impl LdapScanExec {
    pub(crate) fn try_new(
        target: ScanTarget,
        schema: SchemaRef,
        projection: Option<Vec<usize>>,
        filters: Vec<Expr>,
        fetch: Option<usize>,
    ) -> Result<Self> {
        let schema = if let Some(projection) = &projection {
            Arc::new(schema.project(projection)?)
        } else {
            schema
        };
        let pushdown = analyze_filters(&filters, &target.columns);
        let search_filter = compose_filter(pushdown.fragment(), target.config.query.as_deref());
        let properties = PlanProperties::new(
            EquivalenceProperties::new(schema),
            Partitioning::UnknownPartitioning(1),
            EmissionType::Final,
            Boundedness::Bounded,
        );
        Ok(Self {
            target,
            projection,
            filters,
            fetch,
            search_filter,
            properties,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.target.name
    }

    pub fn projection(&self) -> Option<&[usize]> {
        self.projection.as_deref()
    }

    pub fn filters(&self) -> &[Expr] {
        &self.filters
    }

    pub fn fetch(&self) -> Option<usize> {
        self.fetch
    }

    /// The directory search filter this plan runs.
    pub fn search_filter(&self) -> &str {
        &self.search_filter
    }
}

impl DisplayAs for LdapScanExec {
    fn fmt_as(&self, _t: DisplayFormatType, f: &mut Formatter) -> std::fmt::Result {
        let columns = self
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect::<Vec<_>>();
        write!(
            f,
            "LdapScanExec: table={}, base_dn={}, filter={}, projection=[{}], fetch={:?}",
            self.target.name,
            self.target.config.base_dn,
            self.search_filter,
            columns.join(", "),
            self.fetch,
        )
    }
}

impl ExecutionPlan for LdapScanExec {
    fn name(&self) -> &str {
        Self::static_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &PlanProperties {
        &self.properties
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![]
    }

    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> Result<Arc<dyn ExecutionPlan>> {
        if !children.is_empty() {
            return plan_err!("{} should not have children", self.name());
        }
        Ok(self)
    }

    fn execute(
        &self,
        partition: usize,
        _context: Arc<TaskContext>,
    ) -> Result<SendableRecordBatchStream> {
        if partition != 0 {
            return exec_err!(
                "{} expects only partition 0 but got {}",
                self.name(),
                partition
            );
        }
        let schema = self.schema();
        let target = self.target.clone();
        let request = ScanRequest {
            columns: target.columns.clone(),
            projection: self.projection.clone(),
            filters: self.filters.clone(),
            explain_only: false,
        };
        let fetch = self.fetch;
        let batches = {
            let schema = schema.clone();
            stream::once(async move {
                tokio::task::spawn_blocking(move || read_batches(schema, target, request, fetch))
                    .await
                    .map_err(|e| DataFusionError::External(Box::new(e)))?
            })
        };
        let stream = batches
            .map_ok(|batches| stream::iter(batches.into_iter().map(Ok::<_, DataFusionError>)))
            .try_flatten();
        Ok(Box::pin(RecordBatchStreamAdapter::new(schema, stream)))
    }
}

/// Runs one directory scan to completion on the current thread.
fn read_batches(
    schema: SchemaRef,
    target: ScanTarget,
    request: ScanRequest,
    fetch: Option<usize>,
) -> Result<Vec<RecordBatch>> {
    let ScanTarget {
        name,
        config,
        connector,
        batch_size,
        ..
    } = target;
    let mut scan = DirectoryScan::begin(connector, config, request)
        .map_err(|e| DataFusionError::External(Box::new(e)))?;
    let mut builder = BatchBuilder::new(schema, batch_size);
    let mut batches = vec![];
    let mut rows = 0;
    while fetch.is_none_or(|fetch| rows < fetch) {
        let Some(row) = scan
            .next_row()
            .map_err(|e| DataFusionError::External(Box::new(e)))?
        else {
            break;
        };
        builder.append(row);
        rows += 1;
        if builder.len() >= batch_size {
            batches.push(builder.finish()?);
        }
    }
    scan.end();
    if builder.len() > 0 || batches.is_empty() {
        batches.push(builder.finish()?);
    }
    debug!("read {rows} rows from foreign table {name}");
    Ok(batches)
}

struct BatchBuilder {
    schema: SchemaRef,
    columns: Vec<StringBuilder>,
    rows: usize,
}

impl BatchBuilder {
    fn new(schema: SchemaRef, capacity: usize) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|_| StringBuilder::with_capacity(capacity.min(1024), 0))
            .collect();
        Self {
            schema,
            columns,
            rows: 0,
        }
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn append(&mut self, row: OutputRow) {
        for (builder, value) in self.columns.iter_mut().zip(row) {
            builder.append_option(value);
        }
        self.rows += 1;
    }

    fn finish(&mut self) -> Result<RecordBatch> {
        let arrays = self
            .columns
            .iter_mut()
            .map(|b| Arc::new(b.finish()) as ArrayRef)
            .collect::<Vec<_>>();
        let options = RecordBatchOptions::new().with_row_count(Some(self.rows));
        self.rows = 0;
        Ok(RecordBatch::try_new_with_options(
            self.schema.clone(),
            arrays,
            &options,
        )?)
    }
}
