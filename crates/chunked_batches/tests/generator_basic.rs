//! Basic functionality tests for BatchGenerator.
//!
//! Tests cover:
//! - Row coverage and train/validation disjointness
//! - Batch sizes, remainders and drop_remainder
//! - Feature/target splitting
//! - Construction errors
//! - Parquet-backed sources

mod common;
use common::{drain_epoch, index_source, row_ids, sorted};

use chunked_batches::{
    BatchGenerator, ConfigError, DatasetSource, GeneratorConfig, GeneratorError, ParquetSource,
    PlanSummary, Split,
};

use anyhow::Result;
use std::collections::HashSet;

// ============================================================================
// Common Helper Functions
// ============================================================================

fn construct_err<S: DatasetSource + 'static>(source: S, config: GeneratorConfig) -> GeneratorError {
    match BatchGenerator::new(source, config) {
        Ok(_) => panic!("construction should fail"),
        Err(err) => err,
    }
}

fn scenario_config() -> GeneratorConfig {
    GeneratorConfig::builder()
        .chunk_size(12)
        .range_size(4)
        .batch_size(4)
        .validation_split(0.5)
        .shuffle(false)
        .build()
}

// ============================================================================
// 1. Coverage
// ============================================================================

#[test]
fn test_unshuffled_scenario_splits_rows_in_half() -> Result<()> {
    let generator = BatchGenerator::new(index_source(256), scenario_config())?;
    assert_eq!(generator.num_ranges(), 64);
    assert_eq!(generator.number_of_training_batches(), 32);
    assert_eq!(generator.number_of_validation_batches(), 32);
    assert_eq!(generator.train_remainder_rows(), 0);
    assert_eq!(generator.validation_remainder_rows(), 0);

    let summary = generator.plan_summary();
    assert_eq!(summary.train.ranges, 32);
    assert_eq!(summary.validation.ranges, 32);

    generator.activate()?;
    generator.activate_epoch()?;
    let (train, validation) = drain_epoch(&generator)?;
    generator.deactivate_epoch()?;
    generator.deactivate()?;

    assert_eq!(train.len(), 32);
    assert_eq!(validation.len(), 32);
    assert!(train.iter().chain(&validation).all(|b| b.len() == 4));

    // Without shuffling validation takes the trailing ranges, in order
    assert_eq!(row_ids(&train), (0..128).collect::<Vec<_>>());
    assert_eq!(row_ids(&validation), (128..256).collect::<Vec<_>>());

    let mut all = sorted(row_ids(&train));
    all.extend(sorted(row_ids(&validation)));
    assert_eq!(all, (0..256).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_shuffled_epoch_delivers_every_row_once() -> Result<()> {
    let config = GeneratorConfig::builder()
        .chunk_size(50)
        .range_size(7)
        .batch_size(8)
        .validation_split(0.3)
        .seed(1234)
        .build();
    let generator = BatchGenerator::new(index_source(503), config)?;

    generator.activate()?;
    generator.activate_epoch()?;
    let (train, validation) = drain_epoch(&generator)?;
    generator.deactivate()?;

    let train_ids: HashSet<_> = row_ids(&train).into_iter().collect();
    let validation_ids: HashSet<_> = row_ids(&validation).into_iter().collect();
    assert!(train_ids.is_disjoint(&validation_ids));
    assert_eq!(train_ids.len() + validation_ids.len(), 503);
    assert_eq!(row_ids(&train).len() + row_ids(&validation).len(), 503);

    // 72 ranges, round(0.3 * 72) = 22 validation ranges
    let validation_ranges: HashSet<_> = validation_ids.iter().map(|id| id / 7).collect();
    assert_eq!(validation_ranges.len(), 22);

    // Only the last batch of each stream may be short
    for stream in [&train, &validation] {
        let (last, full) = stream.split_last().expect("non-empty stream");
        assert!(full.iter().all(|b| b.len() == 8));
        assert!(last.len() <= 8 && !last.is_empty());
    }
    assert_eq!(train.len(), generator.number_of_training_batches());
    assert_eq!(validation.len(), generator.number_of_validation_batches());
    assert_eq!(train.last().map(|b| b.len() % 8), Some(generator.train_remainder_rows()));
    Ok(())
}

#[test]
fn test_batches_carry_matching_rows() -> Result<()> {
    let config = GeneratorConfig::builder()
        .chunk_size(20)
        .range_size(5)
        .batch_size(6)
        .validation_split(0.25)
        .seed(5)
        .build();
    let generator = BatchGenerator::new(index_source(100), config)?;

    generator.activate()?;
    generator.activate_epoch()?;
    let (train, validation) = drain_epoch(&generator)?;

    for batch in train.iter().chain(&validation) {
        let ids: Vec<usize> = batch
            .data()
            .values::<u64>("id")
            .expect("id column")
            .iter()
            .map(|&id| id as usize)
            .collect();
        assert_eq!(ids, batch.row_indices());
        assert_eq!(batch.epoch(), 0);
    }
    assert!(train.iter().all(|b| b.split() == Split::Train));
    assert!(validation.iter().all(|b| b.split() == Split::Validation));
    Ok(())
}

// ============================================================================
// 2. Remainders
// ============================================================================

#[test]
fn test_remainder_rows_are_delivered() -> Result<()> {
    let config = GeneratorConfig::builder()
        .chunk_size(6)
        .range_size(3)
        .batch_size(4)
        .validation_split(0.5)
        .shuffle(false)
        .build();
    let generator = BatchGenerator::new(index_source(10), config)?;

    // ranges [0,3) [3,6) train, [6,9) [9,10) validation
    assert_eq!(generator.train_remainder_rows(), 2);
    assert_eq!(generator.validation_remainder_rows(), 0);
    assert_eq!(generator.number_of_training_batches(), 2);
    assert_eq!(generator.number_of_validation_batches(), 1);

    generator.activate()?;
    generator.activate_epoch()?;
    let (train, validation) = drain_epoch(&generator)?;

    let sizes: Vec<_> = train.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![4, 2]);
    assert_eq!(row_ids(&validation), vec![6, 7, 8, 9]);
    Ok(())
}

#[test]
fn test_drop_remainder_skips_partial_batches() -> Result<()> {
    let config = GeneratorConfig::builder()
        .chunk_size(6)
        .range_size(3)
        .batch_size(4)
        .validation_split(0.5)
        .shuffle(false)
        .drop_remainder(true)
        .build();
    let generator = BatchGenerator::new(index_source(10), config)?;

    assert_eq!(generator.number_of_training_batches(), 1);
    assert_eq!(generator.train_remainder_rows(), 2);

    generator.activate()?;
    generator.activate_epoch()?;
    let (train, validation) = drain_epoch(&generator)?;
    assert_eq!(row_ids(&train), vec![0, 1, 2, 3]);
    assert_eq!(validation.len(), 1);
    Ok(())
}

#[test]
fn test_all_rows_in_validation() -> Result<()> {
    let config = GeneratorConfig::builder()
        .chunk_size(8)
        .range_size(4)
        .batch_size(4)
        .validation_split(1.0)
        .build();
    let generator = BatchGenerator::new(index_source(32), config)?;

    generator.activate()?;
    generator.activate_epoch()?;
    let (train, validation) = drain_epoch(&generator)?;
    assert!(train.is_empty());
    assert_eq!(sorted(row_ids(&validation)), (0..32).collect::<Vec<_>>());
    Ok(())
}

// ============================================================================
// 3. Columns
// ============================================================================

#[test]
fn test_features_and_targets() -> Result<()> {
    let config = GeneratorConfig::builder()
        .chunk_size(16)
        .range_size(4)
        .batch_size(4)
        .columns(["x", "label", "id"])
        .target_columns(["label"])
        .seed(3)
        .build();
    let generator = BatchGenerator::new(index_source(32), config)?;
    assert_eq!(generator.train_columns(), vec!["x", "id"]);
    assert_eq!(generator.target_columns(), vec!["label"]);

    generator.activate()?;
    generator.activate_epoch()?;
    let batch = generator.next_train_batch()?.expect("first batch");

    let features = batch.features();
    assert_eq!(features.names(), &["x".to_string(), "id".to_string()]);
    let targets = batch.targets().expect("targets");
    let labels = targets.values::<i32>("label").expect("label column");
    for (label, &row) in labels.iter().zip(batch.row_indices()) {
        assert_eq!(*label as usize, row % 2);
    }

    let matrix = features.to_row_major_f32();
    assert_eq!(matrix.len(), 8);
    assert_eq!(matrix[0], batch.row_indices()[0] as f32 * 0.5);
    assert_eq!(matrix[1], batch.row_indices()[0] as f32);
    Ok(())
}

#[test]
fn test_without_targets_batch_is_undifferentiated() -> Result<()> {
    let config = GeneratorConfig::builder()
        .chunk_size(8)
        .range_size(4)
        .batch_size(4)
        .build();
    let generator = BatchGenerator::new(index_source(16), config)?;
    assert!(generator.target_columns().is_empty());
    assert_eq!(generator.train_columns(), vec!["id", "x", "label"]);

    generator.activate()?;
    generator.activate_epoch()?;
    let batch = generator.next_train_batch()?.expect("first batch");
    assert!(batch.targets().is_none());
    assert_eq!(batch.features().num_columns(), 3);
    Ok(())
}

// ============================================================================
// 4. Construction errors
// ============================================================================

#[test]
fn test_chunk_smaller_than_batch_is_rejected() {
    let config = GeneratorConfig::builder()
        .chunk_size(2)
        .range_size(2)
        .batch_size(4)
        .build();
    assert!(matches!(
        construct_err(index_source(16), config),
        GeneratorError::Config(ConfigError::ChunkSmallerThanBatch {
            chunk_size: 2,
            batch_size: 4
        })
    ));
}

#[test]
fn test_validation_split_out_of_range_is_rejected() {
    let config = GeneratorConfig::builder()
        .chunk_size(8)
        .range_size(4)
        .batch_size(4)
        .validation_split(1.5)
        .build();
    assert!(matches!(
        construct_err(index_source(16), config),
        GeneratorError::Config(ConfigError::ValidationSplit(_))
    ));
}

#[test]
fn test_construction_reads_no_rows() {
    let source = common::TestSource::new(16);
    let config = GeneratorConfig::builder()
        .chunk_size(8)
        .range_size(4)
        .batch_size(4)
        .target_columns(["missing"])
        .build();
    let source = std::sync::Arc::new(source);
    let result = BatchGenerator::from_shared(std::sync::Arc::clone(&source), config);
    assert!(matches!(
        result.err(),
        Some(GeneratorError::Config(ConfigError::UnknownColumn(_)))
    ));
    assert_eq!(source.read_count(), 0);
}

// ============================================================================
// 5. Plan summary
// ============================================================================

#[test]
fn test_plan_summary_serializes() -> Result<()> {
    let generator = BatchGenerator::new(index_source(256), scenario_config())?;
    let summary = generator.plan_summary();

    let json = serde_json::to_string(&summary)?;
    let restored: PlanSummary = serde_json::from_str(&json)?;
    assert_eq!(restored, summary);

    let table = summary.to_string();
    assert!(table.contains("train"));
    assert!(table.contains("validation"));
    Ok(())
}

// ============================================================================
// 6. Parquet source
// ============================================================================

#[test]
fn test_generator_over_parquet_file() -> Result<()> {
    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;

    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("value", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(0..200)),
            Arc::new(Float64Array::from_iter_values((0..200).map(|i| i as f64))),
        ],
    )?;
    let tmp = tempfile::NamedTempFile::new()?;
    let mut writer = ArrowWriter::try_new(std::fs::File::create(tmp.path())?, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    let config = GeneratorConfig::builder()
        .chunk_size(40)
        .range_size(10)
        .batch_size(16)
        .validation_split(0.2)
        .target_columns(["value"])
        .seed(99)
        .build();
    let generator = BatchGenerator::new(ParquetSource::open(tmp.path())?, config)?;

    generator.activate()?;
    generator.activate_epoch()?;
    let (train, validation) = drain_epoch(&generator)?;

    let mut all = row_ids(&train);
    all.extend(row_ids(&validation));
    assert_eq!(sorted(all), (0..200).collect::<Vec<_>>());
    assert_eq!(sorted(row_ids(&validation)).len(), 40);

    for batch in &train {
        let values = batch.targets().expect("targets");
        let values = values.values::<f64>("value").expect("value column");
        for (v, &row) in values.iter().zip(batch.row_indices()) {
            assert_eq!(*v, row as f64);
        }
    }
    Ok(())
}
