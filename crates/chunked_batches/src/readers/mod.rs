pub mod parquet;

pub use self::parquet::ParquetSource;
