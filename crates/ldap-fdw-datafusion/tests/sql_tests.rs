//! SQL over an LDAP foreign table registered in a DataFusion session.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use datafusion::arrow::array::{Array, AsArray, RecordBatch};
use datafusion::physical_plan::displayable;
use datafusion::prelude::SessionContext;
use ldap_fdw_datafusion::LdapTableProvider;
use ldap_fdw_scan::{resolve_options, DirectoryEntry, MemoryDirectory, OptionLayers};

const ALICE_DN: &str = "uid=alice,ou=people,dc=example,dc=org";
const BOB_DN: &str = "uid=bob,ou=people,dc=example,dc=org";

fn options(options: &[(&str, &str)]) -> Vec<(String, String)> {
    options
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn directory() -> MemoryDirectory {
    MemoryDirectory::new(vec![
        DirectoryEntry::new("ou=people,dc=example,dc=org"),
        DirectoryEntry::new(ALICE_DN)
            .with_attribute("cn", ["alice"])
            .with_attribute("mail", ["a", "b"]),
        DirectoryEntry::new(BOB_DN).with_attribute("cn", ["bob"]),
    ])
    .with_user("cn=admin,dc=example,dc=org", "secret")
}

fn context(directory: &MemoryDirectory, columns: &[&str]) -> SessionContext {
    let config = resolve_options(OptionLayers {
        table: options(&[("base_dn", "ou=people,dc=example,dc=org")]),
        server: vec![],
        user_mapping: options(&[
            ("user_dn", "cn=admin,dc=example,dc=org"),
            ("password", "secret"),
        ]),
    })
    .unwrap();
    let provider = LdapTableProvider::try_new(
        "people",
        columns.iter().map(|c| c.to_string()).collect(),
        config,
        Arc::new(directory.clone()),
        8192,
    )
    .unwrap();
    let ctx = SessionContext::new();
    ctx.register_table("people", Arc::new(provider)).unwrap();
    ctx
}

fn rows(batches: &[RecordBatch]) -> Vec<Vec<Option<String>>> {
    batches
        .iter()
        .flat_map(|batch| {
            (0..batch.num_rows()).map(move |i| {
                batch
                    .columns()
                    .iter()
                    .map(|column| {
                        let column = column.as_string::<i32>();
                        (!column.is_null(i)).then(|| column.value(i).to_string())
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect()
}

fn text(value: &str) -> Option<String> {
    Some(value.to_string())
}

async fn physical_plan(ctx: &SessionContext, sql: &str) -> String {
    let plan = ctx
        .sql(sql)
        .await
        .unwrap()
        .create_physical_plan()
        .await
        .unwrap();
    let rendered = displayable(plan.as_ref()).indent(true).to_string();
    rendered
}

#[tokio::test]
async fn test_select_every_entry() {
    let directory = directory();
    let ctx = context(&directory, &["dn", "cn", "mail"]);
    let batches = ctx
        .sql("SELECT dn, cn, mail FROM people ORDER BY dn")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(
        rows(&batches),
        vec![
            vec![text(ALICE_DN), text("alice"), text("[a,b]")],
            vec![text(BOB_DN), text("bob"), None],
        ]
    );
    assert_eq!(directory.open_connections(), 0);
}

#[tokio::test]
async fn test_dn_equality_is_evaluated_by_the_directory() {
    let directory = directory();
    let ctx = context(&directory, &["dn", "mail"]);
    let sql = format!("SELECT dn, mail FROM people WHERE dn = '{ALICE_DN}'");

    let plan = physical_plan(&ctx, &sql).await;
    assert!(plan.contains("LdapScanExec"), "{plan}");
    assert!(!plan.contains("FilterExec"), "{plan}");

    let batches = ctx.sql(&sql).await.unwrap().collect().await.unwrap();
    assert_eq!(rows(&batches), vec![vec![text(ALICE_DN), text("[a,b]")]]);
    let searches = directory.searches();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].filter, format!("(entryDN={ALICE_DN})"));
}

#[tokio::test]
async fn test_dn_equality_compares_names_exactly() {
    let directory = directory();
    let ctx = context(&directory, &["dn", "cn"]);
    let loose = "UID=alice, ou=people,dc=example,dc=org";

    let sql = format!("SELECT dn FROM people WHERE dn = '{loose}'");
    let batches = ctx.sql(&sql).await.unwrap().collect().await.unwrap();
    assert!(rows(&batches).is_empty());

    let sql = format!("SELECT count(*) AS n FROM people WHERE dn = '{loose}' AND dn = '{ALICE_DN}'");
    let batches = ctx.sql(&sql).await.unwrap().collect().await.unwrap();
    let n = batches[0]
        .column(0)
        .as_primitive::<datafusion::arrow::datatypes::Int64Type>()
        .value(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_other_predicates_are_evaluated_by_datafusion() {
    let directory = directory();
    let ctx = context(&directory, &["dn", "cn"]);
    let sql = "SELECT dn FROM people WHERE cn = 'bob'";

    let plan = physical_plan(&ctx, sql).await;
    assert!(plan.contains("FilterExec"), "{plan}");

    let batches = ctx.sql(sql).await.unwrap().collect().await.unwrap();
    assert_eq!(rows(&batches), vec![vec![text(BOB_DN)]]);
    assert_eq!(directory.searches()[0].filter, "(objectClass=*)");
}

#[tokio::test]
async fn test_count_without_columns() {
    let directory = directory();
    let ctx = context(&directory, &["dn", "cn"]);
    let batches = ctx
        .sql("SELECT count(*) AS n FROM people")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    let n = batches[0]
        .column(0)
        .as_primitive::<datafusion::arrow::datatypes::Int64Type>()
        .value(0);
    assert_eq!(n, 2);
}

#[tokio::test]
async fn test_document_table() {
    let directory = directory();
    let ctx = context(&directory, &["dn", "object_body"]);
    let sql = format!("SELECT object_body FROM people WHERE dn = '{BOB_DN}'");
    let batches = ctx.sql(&sql).await.unwrap().collect().await.unwrap();
    assert_eq!(rows(&batches), vec![vec![text("cn => bob")]]);
}

#[tokio::test]
async fn test_scan_error_is_reported() {
    let directory = directory().unreachable();
    let ctx = context(&directory, &["dn"]);
    let error = ctx
        .sql("SELECT dn FROM people")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap_err();
    assert!(
        error.to_string().contains("failed to connect to LDAP server"),
        "{error}"
    );
}
