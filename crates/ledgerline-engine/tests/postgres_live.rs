//! Source and warehouse adapters against a real Postgres server.
//!
//! Needs a Docker daemon; run with `cargo test -- --ignored`.

mod common;

use std::time::Duration;

use common::{d, LedgerSource, COLUMNS};
use ledgerline_engine::{
    discover, Loader, PgSource, PgWarehouse, SourceClient, SourceConnectOptions, StagingStore,
    TypeMap, Warehouse, WarehouseConnectOptions,
};
use ledgerline_types::state::PipelineId;
use ledgerline_types::{CellValue, DateWindow, SourceTypeId};
use testcontainers::clients::Cli;
use testcontainers::core::WaitFor;
use testcontainers::{Container, GenericImage};
use tokio_postgres::{Client, NoTls};

fn start_postgres(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("postgres", "16-alpine")
        .with_env_var("POSTGRES_USER", "postgres")
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "postgres")
        .with_exposed_port(5432)
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ));
    docker.run(image)
}

/// Plain client for fixtures and assertions. Retries while the server
/// finishes its init restart.
async fn admin_client(port: u16) -> Client {
    let conn_str = format!("host=127.0.0.1 port={port} user=postgres password=postgres dbname=postgres");
    let mut last_err = None;
    for _ in 0..30 {
        match tokio_postgres::connect(&conn_str, NoTls).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    let _ = connection.await;
                });
                return client;
            }
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
    panic!("postgres never became ready: {last_err:?}");
}

fn source_options(port: u16) -> SourceConnectOptions {
    SourceConnectOptions {
        host: "127.0.0.1".into(),
        port,
        user: "postgres".into(),
        password: "postgres".into(),
        timeout: Duration::from_secs(30),
    }
}

fn warehouse_options(port: u16) -> WarehouseConnectOptions {
    WarehouseConnectOptions {
        host: "127.0.0.1".into(),
        port,
        database: "postgres".into(),
        user: "postgres".into(),
        password: "postgres".into(),
        schema: "finance".into(),
        connect_timeout: Duration::from_secs(30),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn source_binds_window_and_reads_numeric_and_uuid() {
    let docker = Cli::default();
    let node = start_postgres(&docker);
    let port = node.get_host_port_ipv4(5432);

    let admin = admin_client(port).await;
    admin
        .batch_execute(
            "CREATE TABLE ledger (
                 account integer NOT NULL,
                 posted_on date NOT NULL,
                 amount numeric(12,2),
                 memo text,
                 ref uuid
             );
             INSERT INTO ledger VALUES
                 (1, '2024-01-01', 10.25, 'opening', '00000000-0000-0000-0000-000000000001'),
                 (2, '2024-01-03', -0.50, 'fee', NULL),
                 (3, '2024-01-09', 1234567.89, NULL, '00000000-0000-0000-0000-000000000003');",
        )
        .await
        .unwrap();

    let mut source = PgSource::connect(&source_options(port), "postgres")
        .await
        .unwrap();

    let query = "SELECT account, posted_on, amount, memo, ref FROM ledger \
                 WHERE posted_on BETWEEN $1 AND $2 ORDER BY account;";
    let window = DateWindow::new(d(2024, 1, 1), d(2024, 1, 5));
    let chunk = source.fetch(query, Some(&window)).await.unwrap();

    assert_eq!(
        chunk.column_names,
        vec!["account", "posted_on", "amount", "memo", "ref"]
    );
    assert_eq!(
        chunk.column_source_types,
        [23, 1082, 1700, 25, 2950].map(SourceTypeId).to_vec()
    );
    assert_eq!(chunk.num_rows(), 2);
    assert_eq!(
        chunk.rows[0],
        vec![
            CellValue::Int(1),
            CellValue::Date(d(2024, 1, 1)),
            CellValue::Decimal("10.25".into()),
            CellValue::Text("opening".into()),
            CellValue::Text("00000000-0000-0000-0000-000000000001".into()),
        ]
    );
    assert_eq!(chunk.rows[1][2], CellValue::Decimal("-0.50".into()));
    assert_eq!(chunk.rows[1][4], CellValue::Null);

    // uuid has no dedicated target type and stages as text.
    let schema = TypeMap::postgres().schema_for(&chunk);
    assert_eq!(
        schema.field(4).data_type(),
        &arrow::datatypes::DataType::Utf8
    );

    let later = DateWindow::new(d(2024, 1, 6), d(2024, 1, 10));
    let chunk = source.fetch(query, Some(&later)).await.unwrap();
    assert_eq!(chunk.num_rows(), 1);
    assert_eq!(chunk.rows[0][2], CellValue::Decimal("1234567.89".into()));
    assert_eq!(chunk.rows[0][3], CellValue::Null);

    let chunk = source
        .fetch("SELECT count(*) AS n FROM ledger", None)
        .await
        .unwrap();
    assert_eq!(chunk.column_source_types, vec![SourceTypeId(20)]);
    assert_eq!(chunk.rows, vec![vec![CellValue::Int(3)]]);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn warehouse_replace_loads_artifact() {
    let docker = Cli::default();
    let node = start_postgres(&docker);
    let port = node.get_host_port_ipv4(5432);
    let admin = admin_client(port).await;

    let dir = tempfile::tempdir().unwrap();
    let store = StagingStore::new(
        dir.path().join("temp"),
        dir.path().join("parquet2load"),
        TypeMap::postgres(),
    );
    let chunk = LedgerSource::default()
        .fetch("SELECT 1", None)
        .await
        .unwrap();
    let mut staging = store.acquire("accounts_47_savvy").unwrap();
    staging.create(&chunk).unwrap();
    staging.append(&chunk).unwrap();
    staging.export().unwrap();
    staging.release().unwrap();

    let artifacts = discover(&dir.path().join("parquet2load")).unwrap();
    assert_eq!(artifacts.len(), 1);

    let mut warehouse = PgWarehouse::connect(&warehouse_options(port)).await.unwrap();
    let loader = Loader::new(PipelineId::new("accounts_47"));
    // The second load replaces the first one's table.
    for _ in 0..2 {
        let summary = loader.load_all(&mut warehouse, &artifacts).await.unwrap();
        assert_eq!(summary.total_rows(), 3);
    }

    let count: i64 = admin
        .query_one("SELECT count(*) FROM finance.accounts_47_savvy", &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(count, 3);

    let columns: Vec<(String, String)> = admin
        .query(
            "SELECT column_name::text, data_type::text FROM information_schema.columns \
             WHERE table_schema = 'finance' AND table_name = 'accounts_47_savvy' \
             ORDER BY ordinal_position",
            &[],
        )
        .await
        .unwrap()
        .iter()
        .map(|row| (row.get(0), row.get(1)))
        .collect();
    let names: Vec<&str> = columns.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, COLUMNS);
    let types: Vec<&str> = columns.iter().map(|(_, t)| t.as_str()).collect();
    assert_eq!(types, vec!["integer", "date", "numeric", "text"]);

    let row = admin
        .query_one(
            "SELECT amount::text, memo FROM finance.accounts_47_savvy WHERE account = 2",
            &[],
        )
        .await
        .unwrap();
    let amount: String = row.get(0);
    let memo: String = row.get(1);
    assert_eq!(amount, "2.25000000000000000000");
    assert_eq!(memo, "entry 2");

    // A rolled-back drop leaves the loaded table untouched.
    warehouse.begin().await.unwrap();
    warehouse.drop_table("accounts_47_savvy").await.unwrap();
    warehouse.rollback().await.unwrap();
    let count: i64 = admin
        .query_one("SELECT count(*) FROM finance.accounts_47_savvy", &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(count, 3);
}
