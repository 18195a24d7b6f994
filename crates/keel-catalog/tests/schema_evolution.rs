//! Integration tests for DDL against the table format.
//!
//! Rejected changes must fail before any external call; accepted changes
//! must land as exactly one commit.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;

use keel_catalog::ddl::{ColumnDef, ColumnType};
use keel_catalog::error::CatalogError;
use keel_catalog::partition_spec::{
    IcebergPartitionField, IcebergPartitionSpec, IcebergPartitionTransform, IcebergTransformType,
};
use keel_iceberg::TableCatalog;
use keel_iceberg::types::{PrimitiveType, TableIdent};
use keel_test_utils::{TestCatalog, init_test_logging, orders_columns};

async fn orders() -> TestCatalog {
    let ctx = TestCatalog::new();
    ctx.create_iceberg_table("sales", "orders", &orders_columns(), None)
        .await;
    ctx
}

#[tokio::test]
async fn test_narrowing_type_change_makes_no_external_call() {
    init_test_logging();
    let ctx = orders().await;
    let table = ctx.load("sales", "orders").await;
    ctx.catalog.clear();

    let err = ctx
        .ops
        .alter_column(&table, "id", &ColumnDef::new("id", PrimitiveType::Int))
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::Precondition { .. }));
    assert_eq!(
        err.to_string(),
        "Cannot change column type for column: id from long to int"
    );
    assert_eq!(ctx.catalog.external_calls(), 0);
}

#[tokio::test]
async fn test_widening_type_change_is_one_commit() {
    let ctx = orders().await;
    let table = ctx.load("sales", "orders").await;
    ctx.catalog.clear();

    ctx.ops
        .alter_column(&table, "qty", &ColumnDef::new("qty", PrimitiveType::Long))
        .await
        .unwrap();

    assert_eq!(ctx.catalog.commits(), 1);
    assert_eq!(ctx.catalog.successful_commits(), 1);
    let table = ctx.load("sales", "orders").await;
    let qty = table.schema().field_by_name("qty").expect("qty");
    assert_eq!(qty.field_type, PrimitiveType::Long);
}

#[tokio::test]
async fn test_rename_and_comment_in_one_commit() {
    let ctx = orders().await;
    let table = ctx.load("sales", "orders").await;
    ctx.catalog.clear();

    ctx.ops
        .alter_column(
            &table,
            "qty",
            &ColumnDef::new("quantity", PrimitiveType::Long).with_comment("units shipped"),
        )
        .await
        .unwrap();

    assert_eq!(ctx.catalog.commits(), 1);
    let table = ctx.load("sales", "orders").await;
    assert!(table.schema().field_by_name("qty").is_none());
    let quantity = table.schema().field_by_name("quantity").expect("renamed");
    assert_eq!(quantity.field_type, PrimitiveType::Long);
    assert_eq!(quantity.doc.as_deref(), Some("units shipped"));
}

#[tokio::test]
async fn test_empty_comment_keeps_existing_comment() {
    let ctx = orders().await;
    let table = ctx.load("sales", "orders").await;

    ctx.ops
        .alter_column(
            &table,
            "qty",
            &ColumnDef::new("qty", PrimitiveType::Int).with_comment(""),
        )
        .await
        .unwrap();

    let table = ctx.load("sales", "orders").await;
    let qty = table.schema().field_by_name("qty").expect("qty");
    assert_eq!(qty.doc.as_deref(), Some("units ordered"));
}

#[tokio::test]
async fn test_identity_partition_on_double_rejected_at_create() {
    let ctx = TestCatalog::new();
    let columns = [
        ColumnDef::new("id", PrimitiveType::Long),
        ColumnDef::new("price", PrimitiveType::Double),
    ];
    let spec = IcebergPartitionSpec {
        spec_id: 0,
        fields: vec![IcebergPartitionField {
            source_id: 2,
            field_id: 1000,
            orig_field_name: "price".into(),
            field_name: "price".into(),
            transform: IcebergPartitionTransform::new(IcebergTransformType::Identity),
        }],
    };

    let result = ctx
        .ops
        .create_table(
            &TableIdent::new("sales", "prices"),
            &columns,
            Some(&spec),
            None,
            &HashMap::new(),
        )
        .await;

    assert!(result.is_err());
    assert!(ctx
        .catalog
        .load_table(&TableIdent::new("sales", "prices"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_complex_column_rejected_before_external_call() {
    let ctx = orders().await;
    let table = ctx.load("sales", "orders").await;
    ctx.catalog.clear();

    let tags = ColumnDef::new(
        "tags",
        ColumnType::Array(Box::new(PrimitiveType::String.into())),
    );
    let err = ctx.ops.add_columns(&table, &[tags]).await.unwrap_err();

    assert!(matches!(err, CatalogError::Precondition { .. }));
    assert_eq!(ctx.catalog.external_calls(), 0);
}

#[tokio::test]
async fn test_add_existing_column_rejected() {
    let ctx = orders().await;
    let table = ctx.load("sales", "orders").await;
    ctx.catalog.clear();

    let err = ctx
        .ops
        .add_columns(&table, &[ColumnDef::new("REGION", PrimitiveType::String)])
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::Precondition { .. }));
    assert_eq!(ctx.catalog.external_calls(), 0);
}

#[tokio::test]
async fn test_add_and_drop_columns() {
    let ctx = orders().await;
    let table = ctx.load("sales", "orders").await;

    ctx.ops
        .add_columns(
            &table,
            &[
                ColumnDef::new("channel", PrimitiveType::String),
                ColumnDef::new("discount", PrimitiveType::Decimal {
                    precision: 9,
                    scale: 2,
                }),
            ],
        )
        .await
        .unwrap();
    let table = ctx.load("sales", "orders").await;
    assert!(table.schema().field_by_name("channel").is_some());
    assert!(table.schema().field_by_name("discount").is_some());

    ctx.ops.drop_column(&table, "channel").await.unwrap();
    let table = ctx.load("sales", "orders").await;
    assert!(table.schema().field_by_name("channel").is_none());

    let err = ctx.ops.drop_column(&table, "channel").await.unwrap_err();
    assert!(matches!(err, CatalogError::Precondition { .. }));
}

#[tokio::test]
async fn test_drop_and_rename_table() {
    let ctx = orders().await;
    let from = TableIdent::new("sales", "orders");
    let to = TableIdent::new("sales", "orders_v2");

    ctx.ops.rename_table(&from, &to).await.unwrap();
    assert!(ctx.ops.drop_table(&to, false, true).await.unwrap());

    assert!(!ctx.ops.drop_table(&to, true, true).await.unwrap());
    let err = ctx.ops.drop_table(&to, false, true).await.unwrap_err();
    assert!(matches!(err, CatalogError::TableNotFound { .. }));
    assert_eq!(
        err.to_string(),
        "Table 'sales.orders_v2' does not exist in Iceberg catalog."
    );
}
