//! Integration tests for publishing data files.
//!
//! # Invariants Tested
//!
//! 1. **Append keeps existing files**: an append only adds
//! 2. **Dynamic overwrite**: only the partitions touched by the new files
//!    are replaced
//! 3. **Monotonic snapshots**: every commit produces a larger snapshot id
//! 4. **No retry on conflict**: of two racing commits exactly one wins and
//!    the loser surfaces the format's conflict error unchanged

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;

use keel_catalog::commit::{self, DataFileRecord};
use keel_catalog::partition_spec::{
    IcebergPartitionField, IcebergPartitionSpec, IcebergPartitionTransform, IcebergTransformType,
};
use keel_iceberg::TableCatalog;
use keel_test_utils::{TestCatalog, operation_param, orders_columns};

fn region_spec() -> IcebergPartitionSpec {
    IcebergPartitionSpec {
        spec_id: 0,
        fields: vec![IcebergPartitionField {
            source_id: 2,
            field_id: 1000,
            orig_field_name: "region".into(),
            field_name: "region".into(),
            transform: IcebergPartitionTransform::new(IcebergTransformType::Identity),
        }],
    }
}

async fn live_paths(ctx: &TestCatalog) -> HashSet<String> {
    let table = ctx.load("sales", "orders").await;
    let native = ctx.catalog.load_table(table.ident()).await.unwrap();
    native
        .metadata()
        .data_files()
        .iter()
        .map(|file| file.path.clone())
        .collect()
}

fn paths(records: &[&DataFileRecord]) -> HashSet<String> {
    records.iter().map(|record| record.path.clone()).collect()
}

async fn partitioned_orders() -> TestCatalog {
    let ctx = TestCatalog::new();
    ctx.create_iceberg_table("sales", "orders", &orders_columns(), Some(&region_spec()))
        .await;
    ctx
}

#[tokio::test]
async fn test_append_then_overwrite_disjoint_partition_keeps_both() {
    let ctx = partitioned_orders().await;
    let table = ctx.load("sales", "orders").await;

    let eu = ctx.write_data_file("sales", "orders", "eu-1.parquet", "region=EU", 10);
    let us = ctx.write_data_file("sales", "orders", "us-1.parquet", "region=US", 10);
    let first = ctx
        .ops
        .append_files(&table, &operation_param(0, &[eu.clone(), us.clone()], false))
        .await
        .unwrap();

    let apac = ctx.write_data_file("sales", "orders", "apac-1.parquet", "region=APAC", 10);
    let second = ctx
        .ops
        .append_files(&table, &operation_param(0, &[apac.clone()], true))
        .await
        .unwrap();

    assert!(second > first);
    assert_eq!(live_paths(&ctx).await, paths(&[&eu, &us, &apac]));
    assert_eq!(ctx.load("sales", "orders").await.snapshot_id(), Some(second));
}

#[tokio::test]
async fn test_overwrite_replaces_only_touched_partitions() {
    let ctx = partitioned_orders().await;
    let table = ctx.load("sales", "orders").await;

    let eu_old = ctx.write_data_file("sales", "orders", "eu-1.parquet", "region=EU", 10);
    let us = ctx.write_data_file("sales", "orders", "us-1.parquet", "region=US", 10);
    ctx.ops
        .append_files(&table, &operation_param(0, &[eu_old, us.clone()], false))
        .await
        .unwrap();

    let eu_new = ctx.write_data_file("sales", "orders", "eu-2.parquet", "region=EU", 4);
    ctx.ops
        .append_files(&table, &operation_param(0, &[eu_new.clone()], true))
        .await
        .unwrap();

    assert_eq!(live_paths(&ctx).await, paths(&[&us, &eu_new]));
}

#[tokio::test]
async fn test_snapshot_ids_strictly_increase() {
    let ctx = partitioned_orders().await;
    let table = ctx.load("sales", "orders").await;

    let mut last = None;
    for (i, overwrite) in [false, true, false, true].into_iter().enumerate() {
        let record = ctx.write_data_file(
            "sales",
            "orders",
            &format!("part-{i}.parquet"),
            "region=EU",
            1,
        );
        let snapshot_id = ctx
            .ops
            .append_files(&table, &operation_param(0, &[record], overwrite))
            .await
            .unwrap();
        if let Some(previous) = last {
            assert!(snapshot_id > previous, "{snapshot_id} after {previous}");
        }
        last = Some(snapshot_id);
    }
}

#[tokio::test]
async fn test_truncate_empties_table_with_new_snapshot() {
    let ctx = partitioned_orders().await;
    let table = ctx.load("sales", "orders").await;
    let record = ctx.write_data_file("sales", "orders", "eu-1.parquet", "region=EU", 10);
    let appended = ctx
        .ops
        .append_files(&table, &operation_param(0, &[record], false))
        .await
        .unwrap();

    let truncated = ctx.ops.truncate_table(&table).await.unwrap();

    assert!(truncated > appended);
    assert!(live_paths(&ctx).await.is_empty());
    let table = ctx.load("sales", "orders").await;
    assert_eq!(table.num_files(), 0);
    assert_eq!(table.snapshot_id(), Some(truncated));
}

#[tokio::test]
async fn test_concurrent_overwrites_exactly_one_wins() {
    let ctx = partitioned_orders().await;
    let table = ctx.load("sales", "orders").await;

    // Both writers start from the same metadata version.
    let first_handle = ctx.catalog.load_table(table.ident()).await.unwrap();
    let second_handle = ctx.catalog.load_table(table.ident()).await.unwrap();

    let ours = ctx.write_data_file("sales", "orders", "ours.parquet", "region=EU", 10);
    let theirs = ctx.write_data_file("sales", "orders", "theirs.parquet", "region=EU", 10);

    let our_param = operation_param(0, &[ours.clone()], true);
    let their_param = operation_param(0, &[theirs.clone()], true);
    let (first, second) = tokio::join!(
        commit::append_files(&first_handle, &our_param),
        commit::append_files(&second_handle, &their_param),
    );

    let (winner, loser) = match (first, second) {
        (Ok(_), Err(e)) => (ours, e),
        (Err(e), Ok(_)) => (theirs, e),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert!(loser.is_commit_conflict());
    assert!(
        loser.to_string().starts_with("Commit failed: "),
        "unexpected message: {loser}"
    );
    assert_eq!(live_paths(&ctx).await, paths(&[&winner]));
    assert_eq!(ctx.catalog.successful_commits(), 1);
}

#[tokio::test]
async fn test_unknown_spec_id_commits_nothing() {
    let ctx = partitioned_orders().await;
    let table = ctx.load("sales", "orders").await;
    let record = ctx.write_data_file("sales", "orders", "eu-1.parquet", "region=EU", 10);
    ctx.catalog.clear();

    let err = ctx
        .ops
        .append_files(&table, &operation_param(7, &[record], false))
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("Unknown partition spec id 7"));
    assert_eq!(ctx.catalog.commits(), 0);
}

#[tokio::test]
async fn test_malformed_partition_path_commits_nothing() {
    let ctx = partitioned_orders().await;
    let table = ctx.load("sales", "orders").await;
    let good = ctx.write_data_file("sales", "orders", "eu-1.parquet", "region=EU", 10);
    let bad = ctx.write_data_file("sales", "orders", "x.parquet", "country=EU", 10);
    ctx.catalog.clear();

    let result = ctx
        .ops
        .append_files(&table, &operation_param(0, &[good, bad], false))
        .await;

    assert!(result.is_err());
    assert_eq!(ctx.catalog.commits(), 0);
    assert!(live_paths(&ctx).await.is_empty());
}
