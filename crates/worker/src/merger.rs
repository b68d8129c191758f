/*
 * Merger
 *
 * Concatenates staged Parquet files into one compressed output. Every input
 * must share the same columns (names, types, order). The output is re-read
 * after writing and its row count checked against the inputs before it can
 * be published.
 */

use arrow::array::RecordBatch;
use arrow::datatypes::{Field, Schema, SchemaRef};
use consolidation_common::{ConsolidationConfig, ConsolidationError, FileEntry, Result, ResultExt};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A successfully downloaded source file.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub source_entry: FileEntry,
    pub local_path: PathBuf,
}

/// The verified merged output.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub output_path: PathBuf,
    /// Rows in the output, equal to the sum of the input rows
    pub row_count: u64,
    pub size_bytes: u64,
    /// Sources whose rows are in the output
    pub merged_entries: Vec<FileEntry>,
}

/// Output writer settings.
#[derive(Debug, Clone)]
pub struct MergerConfig {
    pub compression: Compression,
    pub row_group_size: usize,
}

impl MergerConfig {
    pub fn from_config(config: &ConsolidationConfig) -> Self {
        Self {
            compression: config.compression.to_parquet(),
            row_group_size: config.row_group_size,
        }
    }
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: 50_000,
        }
    }
}

/// Schema-checked Parquet concatenation.
#[derive(Debug, Clone)]
pub struct Merger {
    config: MergerConfig,
}

struct StagedInput<'a> {
    staged: &'a StagedFile,
    schema: SchemaRef,
    rows: u64,
}

impl Merger {
    pub fn new(config: MergerConfig) -> Self {
        Self { config }
    }

    /// Runs [`Merger::merge_files`] on the blocking pool.
    pub async fn merge(&self, inputs: Vec<StagedFile>, output_path: PathBuf) -> Result<MergeResult> {
        let merger = self.clone();
        tokio::task::spawn_blocking(move || merger.merge_files(&inputs, &output_path))
            .await
            .map_err(|e| ConsolidationError::Execution(format!("merge task failed: {}", e)))?
    }

    /// Merges `inputs` into a single file at `output_path` and verifies it.
    pub fn merge_files(&self, inputs: &[StagedFile], output_path: &Path) -> Result<MergeResult> {
        if inputs.is_empty() {
            return Err(ConsolidationError::Execution(
                "no staged files to merge".to_string(),
            ));
        }

        // Validate every schema before writing anything
        let mut staged_inputs = Vec::with_capacity(inputs.len());
        for staged in inputs {
            let builder = open_reader(&staged.local_path)?;
            staged_inputs.push(StagedInput {
                staged,
                schema: builder.schema().clone(),
                rows: builder.metadata().file_metadata().num_rows().max(0) as u64,
            });
        }
        let output_schema = unified_schema(&staged_inputs)?;
        let expected_rows: u64 = staged_inputs.iter().map(|i| i.rows).sum();

        let written_rows = self.write_output(&staged_inputs, output_schema, output_path)?;
        check_rows(expected_rows, written_rows)?;
        let actual_rows = verify_output_rows(expected_rows, output_path)?;

        let size_bytes = std::fs::metadata(output_path)?.len();

        tracing::info!(
            inputs = inputs.len(),
            rows = actual_rows,
            size_bytes,
            output = %output_path.display(),
            "Merged and verified"
        );

        Ok(MergeResult {
            output_path: output_path.to_path_buf(),
            row_count: actual_rows,
            size_bytes,
            merged_entries: inputs.iter().map(|i| i.source_entry.clone()).collect(),
        })
    }

    fn write_output(
        &self,
        inputs: &[StagedInput<'_>],
        schema: SchemaRef,
        output_path: &Path,
    ) -> Result<u64> {
        let file = File::create(output_path)
            .map_err(|e| ConsolidationError::Staging(format!("Failed to create output: {}", e)))?;

        let props = WriterProperties::builder()
            .set_compression(self.config.compression)
            .set_max_row_group_size(self.config.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
            .map_err(|e| ConsolidationError::Execution(format!("Failed to create writer: {}", e)))?;

        let mut rows = 0u64;
        for input in inputs {
            let reader = open_reader(&input.staged.local_path)?
                .build()
                .map_err(ConsolidationError::from)
                .with_context(|| format!("reading {}", input.staged.local_path.display()))?;

            for batch in reader {
                let batch = batch?;
                let batch = RecordBatch::try_new(schema.clone(), batch.columns().to_vec())?;
                writer.write(&batch)?;
                rows += batch.num_rows() as u64;
            }
        }

        writer
            .close()
            .map_err(|e| ConsolidationError::Execution(format!("Failed to close writer: {}", e)))?;

        Ok(rows)
    }
}

fn open_reader(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    let file = File::open(path)
        .map_err(|e| ConsolidationError::Staging(format!("Failed to open {}: {}", path.display(), e)))?;
    ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(ConsolidationError::from)
        .with_context(|| format!("reading parquet footer of {}", path.display()))
}

/// Re-reads the file at `path` and fails with `RowCountMismatch` unless it
/// holds exactly `expected` rows.
pub fn verify_output_rows(expected: u64, path: &Path) -> Result<u64> {
    check_rows(expected, count_rows(path)?)
}

fn check_rows(expected: u64, actual: u64) -> Result<u64> {
    if actual != expected {
        return Err(ConsolidationError::RowCountMismatch { expected, actual });
    }
    Ok(actual)
}

fn count_rows(path: &Path) -> Result<u64> {
    let reader = open_reader(path)?.build()?;
    let mut rows = 0u64;
    for batch in reader {
        rows += batch?.num_rows() as u64;
    }
    Ok(rows)
}

/// Checks that all inputs share column names, types and order, and returns
/// the output schema. A column is nullable in the output if it is nullable in
/// any input.
fn unified_schema(inputs: &[StagedInput<'_>]) -> Result<SchemaRef> {
    let first = &inputs[0];
    let mut nullable: Vec<bool> = first.schema.fields().iter().map(|f| f.is_nullable()).collect();

    for input in &inputs[1..] {
        let expected = first.schema.fields();
        let actual = input.schema.fields();

        let matches = expected.len() == actual.len()
            && expected
                .iter()
                .zip(actual.iter())
                .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type());

        if !matches {
            return Err(ConsolidationError::SchemaMismatch(format!(
                "{} has columns [{}], expected [{}] from {}",
                input.staged.source_entry.file_name(),
                describe(&input.schema),
                describe(&first.schema),
                first.staged.source_entry.file_name()
            )));
        }

        for (flag, field) in nullable.iter_mut().zip(actual.iter()) {
            *flag |= field.is_nullable();
        }
    }

    let fields: Vec<Field> = first
        .schema
        .fields()
        .iter()
        .zip(nullable)
        .map(|(f, nullable)| Field::new(f.name(), f.data_type().clone(), nullable))
        .collect();
    Ok(Arc::new(Schema::new(fields)))
}

fn describe(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}
