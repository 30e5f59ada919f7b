// ABOUTME: ClickHouse sink - HTTP client, schema management and TSV payload codec
// ABOUTME: The sink is also where the watermark is read back from

pub mod clickhouse;
pub mod schema;
pub mod tsv;

pub use clickhouse::ClickHouseClient;
pub use schema::{init_schema, RunRecord, SchemaNames};
