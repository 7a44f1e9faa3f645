pub mod clickhouse;

pub use clickhouse::{
    ClickHouseClient, ColumnarStore, InMemoryColumnarStore, RequestLogRow, StoreError,
};
