//! Shared helpers for workflow tests: a recording in-memory remote store and
//! Parquet fixture builders.

#![allow(dead_code)]

use arrow::array::{Array, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use consolidation_common::{
    ConsolidationConfig, ConsolidationError, ConsolidationMetrics, Identity, RemoteEntry,
    RemoteStore, Result,
};
use consolidation_orchestrator::{Consolidator, ShutdownSignal};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::{FileMetaData, ParquetMetaData, ParquetMetaDataWriter};
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const BASE_PATH: &str = "/lake/telemetry";

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
}

pub fn partition_dir(date: NaiveDate) -> String {
    format!("{}/date={}", BASE_PATH, date.format("%Y-%m-%d"))
}

pub fn source_path(date: NaiveDate, name: &str) -> String {
    format!("{}/{}", partition_dir(date), name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    List,
    Get,
    Put,
    Delete,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    pub path: String,
    pub identity: Identity,
}

#[derive(Default)]
struct Faults {
    list: bool,
    get: HashSet<String>,
    put: bool,
    put_panics: bool,
    delete: HashSet<String>,
}

/// In-memory remote store that records every call in order.
#[derive(Default)]
pub struct RecordingStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<Faults>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, path: impl Into<String>, content: Vec<u8>) {
        self.files.lock().unwrap().insert(path.into(), content);
    }

    pub fn fail_list(&self) {
        self.faults.lock().unwrap().list = true;
    }

    pub fn fail_get(&self, path: &str) {
        self.faults.lock().unwrap().get.insert(path.to_string());
    }

    pub fn fail_put(&self) {
        self.faults.lock().unwrap().put = true;
    }

    pub fn panic_on_put(&self) {
        self.faults.lock().unwrap().put_panics = true;
    }

    pub fn fail_delete(&self, path: &str) {
        self.faults.lock().unwrap().delete.insert(path.to_string());
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, op: Op) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    /// Number of calls that change the remote state.
    pub fn mutations(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c.op, Op::Put | Op::Delete))
            .count()
    }

    /// Paths of consolidated outputs present in the store.
    pub fn consolidated_outputs(&self) -> Vec<String> {
        self.paths()
            .into_iter()
            .filter(|p| p.contains("-consolidated-"))
            .collect()
    }

    fn record(&self, op: Op, path: &str, identity: &Identity) {
        self.calls.lock().unwrap().push(Call {
            op,
            path: path.to_string(),
            identity: identity.clone(),
        });
    }
}

#[async_trait]
impl RemoteStore for RecordingStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn list(&self, dir: &str, identity: &Identity) -> Result<Vec<RemoteEntry>> {
        self.record(Op::List, dir, identity);
        if self.faults.lock().unwrap().list {
            return Err(ConsolidationError::RemoteList {
                path: dir.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| {
                path.strip_prefix(&prefix)
                    .map(|rest| !rest.contains('/'))
                    .unwrap_or(false)
            })
            .map(|(path, content)| RemoteEntry {
                path: path.clone(),
                size_bytes: content.len() as u64,
            })
            .collect())
    }

    async fn get(&self, path: &str, local_dest: &Path, identity: &Identity) -> Result<()> {
        self.record(Op::Get, path, identity);
        if self.faults.lock().unwrap().get.contains(path) {
            return Err(ConsolidationError::RemoteIo(format!("read {} timed out", path)));
        }
        let content = self
            .content(path)
            .ok_or_else(|| ConsolidationError::RemoteIo(format!("{} not found", path)))?;
        tokio::fs::write(local_dest, content).await?;
        Ok(())
    }

    async fn put(&self, local_src: &Path, path: &str, identity: &Identity) -> Result<()> {
        self.record(Op::Put, path, identity);
        {
            let faults = self.faults.lock().unwrap();
            if faults.put_panics {
                drop(faults);
                panic!("store crashed during put");
            }
            if faults.put {
                return Err(ConsolidationError::RemoteIo(format!("write {} refused", path)));
            }
        }
        if self.exists(path) {
            return Err(ConsolidationError::RemoteIo(format!("{} already exists", path)));
        }
        let content = tokio::fs::read(local_src).await?;
        self.insert(path, content);
        Ok(())
    }

    async fn delete(&self, path: &str, identity: &Identity) -> Result<()> {
        self.record(Op::Delete, path, identity);
        if self.faults.lock().unwrap().delete.contains(path) {
            return Err(ConsolidationError::RemoteIo(format!("permission denied: {}", path)));
        }
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

/// Parquet file with `rows` readings whose ids start at `first_id`.
pub fn readings_parquet(first_id: i64, rows: usize) -> Vec<u8> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("sensor", DataType::Utf8, true),
        Field::new("reading", DataType::Float64, true),
    ]));
    let ids: Vec<i64> = (first_id..first_id + rows as i64).collect();
    let sensors: Vec<String> = ids.iter().map(|i| format!("sensor-{:06}", i)).collect();
    let readings: Vec<f64> = ids.iter().map(|i| *i as f64 * 0.5).collect();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(sensors)),
            Arc::new(Float64Array::from(readings)),
        ],
    )
    .unwrap();
    write_batch(schema, batch)
}

/// Parquet file whose `id` column is a float instead of an integer.
pub fn mismatched_parquet(rows: usize) -> Vec<u8> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Float64, false),
        Field::new("sensor", DataType::Utf8, true),
        Field::new("reading", DataType::Float64, true),
    ]));
    let ids: Vec<f64> = (0..rows).map(|i| i as f64).collect();
    let sensors: Vec<String> = (0..rows).map(|i| format!("sensor-{:06}", i)).collect();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Float64Array::from(ids.clone())),
            Arc::new(StringArray::from(sensors)),
            Arc::new(Float64Array::from(ids)),
        ],
    )
    .unwrap();
    write_batch(schema, batch)
}

/// Readings file whose footer claims `extra` more rows than its row groups
/// actually hold.
pub fn overstated_parquet(first_id: i64, rows: usize, extra: i64) -> Vec<u8> {
    let content = readings_parquet(first_id, rows);
    let reader = SerializedFileReader::new(Bytes::from(content.clone())).unwrap();
    let metadata = reader.metadata();
    let file = metadata.file_metadata();
    let overstated = FileMetaData::new(
        file.version(),
        file.num_rows() + extra,
        file.created_by().map(str::to_string),
        file.key_value_metadata().cloned(),
        file.schema_descr_ptr(),
        file.column_orders().cloned(),
    );
    let rewritten = ParquetMetaData::new(overstated, metadata.row_groups().to_vec());

    // Footer layout: metadata, 4-byte little-endian metadata length, "PAR1"
    let len_at = content.len() - 8;
    let footer_len = u32::from_le_bytes(content[len_at..len_at + 4].try_into().unwrap()) as usize;
    let mut out = content[..len_at - footer_len].to_vec();
    ParquetMetaDataWriter::new(&mut out, &rewritten).finish().unwrap();
    out
}

fn write_batch(schema: Arc<Schema>, batch: RecordBatch) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buf, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }
    buf
}

/// All `id` values of a Parquet file, as a set.
pub fn read_ids(content: Vec<u8>) -> BTreeSet<i64> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(content))
        .unwrap()
        .build()
        .unwrap();
    let mut ids = BTreeSet::new();
    for batch in reader {
        let batch = batch.unwrap();
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        for i in 0..col.len() {
            ids.insert(col.value(i));
        }
    }
    ids
}

pub fn row_count(content: Vec<u8>) -> usize {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(content))
        .unwrap()
        .build()
        .unwrap();
    reader.map(|b| b.unwrap().num_rows()).sum()
}

/// Adds `count` source files of `rows_each` readings for `date`. Returns the
/// paths in insertion order.
pub fn seed_sources(store: &RecordingStore, date: NaiveDate, count: usize, rows_each: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let path = source_path(date, &format!("telemetry-{:04}.parquet", i));
            store.insert(path.clone(), readings_parquet((i * rows_each) as i64, rows_each));
            path
        })
        .collect()
}

/// Thresholds scaled down so small fixture files are eligible.
pub fn test_config(staging_root: &Path) -> ConsolidationConfig {
    ConsolidationConfig {
        base_path: BASE_PATH.to_string(),
        min_file_size_bytes: 512,
        cleanup_threshold_bytes: 64,
        parallel_downloads: 3,
        staging_root: staging_root.to_path_buf(),
        ..Default::default()
    }
}

pub struct Harness {
    pub store: Arc<RecordingStore>,
    pub consolidator: Consolidator,
    pub metrics: Arc<ConsolidationMetrics>,
    pub shutdown: ShutdownSignal,
    pub staging_root: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut ConsolidationConfig)) -> Self {
        let staging_root = tempfile::tempdir().unwrap();
        let mut config = test_config(staging_root.path());
        adjust(&mut config);

        let store = RecordingStore::new();
        let metrics = Arc::new(ConsolidationMetrics::new());
        let shutdown = ShutdownSignal::new();
        let consolidator =
            Consolidator::new(config, store.clone(), metrics.clone(), shutdown.clone()).unwrap();

        Self {
            store,
            consolidator,
            metrics,
            shutdown,
            staging_root,
        }
    }

    /// True when no staging directory is left behind.
    pub fn staging_is_clean(&self) -> bool {
        std::fs::read_dir(self.staging_root.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}
