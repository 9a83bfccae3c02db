use datafusion_common::ScalarValue;
use datafusion_expr::utils::{conjunction, split_conjunction};
use datafusion_expr::{BinaryExpr, Expr, Operator, TableProviderFilterPushDown};

/// The column that holds the distinguished name of each entry.
pub const IDENTITY_COLUMN: &str = "dn";

/// The operational attribute that exposes the distinguished name of an entry
/// with distinguished name matching semantics (RFC 5020).
///
/// Servers that do not implement RFC 5020, Active Directory among them,
/// have no such attribute and return no entries for a pushed `dn` equality.
pub const ENTRY_DN_ATTRIBUTE: &str = "entryDN";

/// The outcome of predicate pushdown analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pushdown {
    /// The conjunct at `index` is evaluated by the scan and must not be
    /// re-checked by the caller. The server narrows the search with
    /// `fragment`, which matches names loosely, and the scan keeps only
    /// entries whose name is exactly `dn`.
    Pushed {
        fragment: String,
        dn: String,
        index: usize,
    },
    /// Nothing is pushed; every conjunct stays with the caller.
    NotPushed,
}

impl Pushdown {
    pub fn fragment(&self) -> Option<&str> {
        match self {
            Pushdown::Pushed { fragment, .. } => Some(fragment),
            Pushdown::NotPushed => None,
        }
    }

    /// Whether an entry named `dn` satisfies the pushed conjunct.
    /// Every entry does when nothing is pushed.
    pub fn accepts(&self, dn: &str) -> bool {
        match self {
            Pushdown::Pushed { dn: expected, .. } => expected == dn,
            Pushdown::NotPushed => true,
        }
    }

    pub fn handled_locally(&self) -> bool {
        matches!(self, Pushdown::Pushed { .. })
    }

    /// Returns the conjuncts the caller still has to evaluate.
    pub fn residual<'a>(&self, conjuncts: &'a [Expr]) -> Vec<&'a Expr> {
        conjuncts
            .iter()
            .enumerate()
            .filter(|(i, _)| !matches!(self, Pushdown::Pushed { index, .. } if index == i))
            .map(|(_, e)| e)
            .collect()
    }
}

/// Analyzes the top-level conjuncts of a scan filter.
///
/// At most one conjunct is pushed: the first equality between the
/// identity column and a text literal.
pub fn analyze_filters(filters: &[Expr], columns: &[String]) -> Pushdown {
    filters
        .iter()
        .enumerate()
        .find_map(|(index, filter)| {
            identity_equality(filter, columns).map(|dn| Pushdown::Pushed {
                fragment: entry_dn_fragment(&dn),
                dn,
                index,
            })
        })
        .unwrap_or(Pushdown::NotPushed)
}

/// Analyzes a single predicate, splitting it on `AND` first.
///
/// Returns the pushdown result together with the predicate that remains
/// for the caller to evaluate, if any.
pub fn analyze_predicate(predicate: &Expr, columns: &[String]) -> (Pushdown, Option<Expr>) {
    let conjuncts = split_conjunction(predicate)
        .into_iter()
        .cloned()
        .collect::<Vec<_>>();
    let pushdown = analyze_filters(&conjuncts, columns);
    let residual = conjunction(pushdown.residual(&conjuncts).into_iter().cloned());
    (pushdown, residual)
}

/// Reports, for each filter, whether the scan evaluates it exactly.
///
/// The decision is the same as [`analyze_filters`] makes for the same
/// filter list, so exactly the pushed conjunct is reported as exact.
pub fn filter_pushdown_support(
    filters: &[&Expr],
    columns: &[String],
) -> Vec<TableProviderFilterPushDown> {
    let mut pushed = false;
    filters
        .iter()
        .map(|filter| {
            if !pushed && identity_equality(filter, columns).is_some() {
                pushed = true;
                TableProviderFilterPushDown::Exact
            } else {
                TableProviderFilterPushDown::Unsupported
            }
        })
        .collect()
}

/// Renders the filter fragment that matches the entry named `dn`.
/// The server compares names with distinguished name matching, so case
/// and spaces around separators are ignored.
pub fn entry_dn_fragment(dn: &str) -> String {
    format!("({ENTRY_DN_ATTRIBUTE}={})", ldap3::ldap_escape(dn))
}

/// Returns the literal of a `dn = '<text>'` comparison.
fn identity_equality(expr: &Expr, columns: &[String]) -> Option<String> {
    let Expr::BinaryExpr(BinaryExpr {
        left,
        op: Operator::Eq,
        right,
    }) = expr
    else {
        return None;
    };
    let (column, literal) = match (left.as_ref(), right.as_ref()) {
        (Expr::Column(column), Expr::Literal(literal)) => (column, literal),
        (Expr::Literal(literal), Expr::Column(column)) => (column, literal),
        _ => return None,
    };
    let declared = resolve_column(&column.name, columns)?;
    if !declared.eq_ignore_ascii_case(IDENTITY_COLUMN) {
        return None;
    }
    match literal {
        ScalarValue::Utf8(Some(value))
        | ScalarValue::LargeUtf8(Some(value))
        | ScalarValue::Utf8View(Some(value)) => Some(value.clone()),
        _ => None,
    }
}

fn resolve_column<'a>(name: &str, columns: &'a [String]) -> Option<&'a str> {
    columns
        .iter()
        .find(|c| c.as_str() == name)
        .or_else(|| columns.iter().find(|c| c.eq_ignore_ascii_case(name)))
        .map(String::as_str)
}
