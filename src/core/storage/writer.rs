//! Partitioned NDJSON batch files
//!
//! Layout: `<root>/<source>/ingest_date=<YYYY-MM-DD>/<batch_id>.ndjson[.gz]`.
//! Every file is written under a hidden temp name in the same directory and
//! renamed into place only after it has been completely written and synced,
//! so a directory scan never sees a partial batch.

use crate::domain::ids::{BatchId, SourceKind};
use crate::domain::{IngestError, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Read, Write};
use std::path::{Path, PathBuf};

/// Injected ingestion timestamp (ISO-8601)
pub const INGESTED_AT_FIELD: &str = "_ingested_at";
/// Injected source tag
pub const SOURCE_FIELD: &str = "_source";
/// Injected batch id
pub const BATCH_ID_FIELD: &str = "_batch_id";

const PARTITION_PREFIX: &str = "ingest_date=";

/// Writer and reader for the staging area
#[derive(Debug, Clone)]
pub struct PartitionedWriter {
    root: PathBuf,
    compress: bool,
    flush_interval: usize,
}

/// File statistics for one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageStats {
    pub source: SourceKind,
    pub file_count: usize,
    pub total_size_bytes: u64,
    pub partitions: usize,
}

impl PartitionedWriter {
    /// Opens (and creates if needed) the staging root
    pub fn new(root: impl Into<PathBuf>, compress: bool) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| storage_err("create staging root", &root, e))?;
        Ok(Self {
            root,
            compress,
            flush_interval: 100,
        })
    }

    /// Records between explicit flushes in [`PartitionedWriter::write_stream`]
    pub fn with_flush_interval(mut self, flush_interval: usize) -> Self {
        self.flush_interval = flush_interval.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_dir(&self, source: SourceKind, date: NaiveDate) -> PathBuf {
        self.root
            .join(source.as_str())
            .join(format!("{PARTITION_PREFIX}{}", date.format("%Y-%m-%d")))
    }

    pub fn file_path(&self, source: SourceKind, batch_id: &BatchId, date: NaiveDate) -> PathBuf {
        let extension = if self.compress { "ndjson.gz" } else { "ndjson" };
        self.partition_dir(source, date)
            .join(format!("{}.{extension}", batch_id.as_str()))
    }

    /// Writes one batch as one file and returns the number of records written
    ///
    /// Records are stamped with `_ingested_at`, `_source` and `_batch_id`.
    /// An empty batch writes nothing. File I/O runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// [`IngestError::Storage`] if a record does not serialize to a JSON
    /// object or the file cannot be written; no file is left at the final
    /// path in either case.
    pub async fn write<T: Serialize>(
        &self,
        source: SourceKind,
        records: &[T],
        batch_id: &BatchId,
        date: Option<NaiveDate>,
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let stamped = records
            .iter()
            .map(|r| stamp(r, source, batch_id))
            .collect::<Result<Vec<Value>>>()?;

        let writer = self.clone();
        let path = self.file_path(source, batch_id, date.unwrap_or_else(today));
        let count = tokio::task::spawn_blocking(move || {
            writer.write_file(&path, stamped.into_iter().map(Ok))
        })
        .await
        .map_err(|e| IngestError::Storage(format!("Batch writer task failed: {e}")))??;

        tracing::debug!(source = %source, batch_id = %batch_id, count, "Wrote batch file");
        Ok(count)
    }

    /// Writes an unbounded record sequence as one file
    ///
    /// Flushes every `flush_interval` records. The file becomes visible only
    /// once the sequence is exhausted. This call blocks; async callers should
    /// run it on the blocking pool.
    pub fn write_stream<T, I>(
        &self,
        source: SourceKind,
        records: I,
        batch_id: &BatchId,
        date: Option<NaiveDate>,
    ) -> Result<usize>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let path = self.file_path(source, batch_id, date.unwrap_or_else(today));
        let stamped = records.into_iter().map(|r| stamp(&r, source, batch_id));
        let count = self.write_file(&path, stamped)?;
        tracing::info!(source = %source, batch_id = %batch_id, count, "Wrote record stream");
        Ok(count)
    }

    fn write_file<I>(&self, final_path: &Path, records: I) -> Result<usize>
    where
        I: Iterator<Item = Result<Value>>,
    {
        let dir = final_path
            .parent()
            .ok_or_else(|| IngestError::Storage(format!("No parent for {}", final_path.display())))?;
        fs::create_dir_all(dir).map_err(|e| storage_err("create partition", dir, e))?;

        let file_name = final_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("batch");
        let temp_path = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

        let result = self
            .write_temp(&temp_path, records)
            .and_then(|count| {
                fs::rename(&temp_path, final_path)
                    .map_err(|e| storage_err("publish", final_path, e))?;
                Ok(count)
            });

        if result.is_err() && temp_path.exists() {
            if let Err(e) = fs::remove_file(&temp_path) {
                tracing::warn!(path = %temp_path.display(), error = %e, "Failed to remove temp file");
            }
        }
        result
    }

    fn write_temp<I>(&self, temp_path: &Path, records: I) -> Result<usize>
    where
        I: Iterator<Item = Result<Value>>,
    {
        let file = File::create(temp_path).map_err(|e| storage_err("create", temp_path, e))?;
        let mut sink = Sink::open(file, self.compress);

        let mut count = 0;
        for record in records {
            let record = record?;
            serde_json::to_writer(&mut sink, &record)
                .map_err(|e| IngestError::Storage(format!("Failed to encode record: {e}")))?;
            sink.write_all(b"\n")
                .map_err(|e| storage_err("write", temp_path, e))?;
            count += 1;
            if count % self.flush_interval == 0 {
                sink.flush().map_err(|e| storage_err("flush", temp_path, e))?;
            }
        }

        sink.finish()
            .and_then(|file| file.sync_all())
            .map_err(|e| storage_err("finish", temp_path, e))?;
        Ok(count)
    }

    /// Batch files of a source, optionally restricted to one ingest date
    pub fn list(&self, source: SourceKind, date: Option<NaiveDate>) -> Result<Vec<PathBuf>> {
        let partitions = match date {
            Some(date) => vec![self.partition_dir(source, date)],
            None => {
                let source_dir = self.root.join(source.as_str());
                read_dir_sorted(&source_dir)?
                    .into_iter()
                    .filter(|p| {
                        p.is_dir()
                            && p.file_name()
                                .and_then(|n| n.to_str())
                                .is_some_and(|n| n.starts_with(PARTITION_PREFIX))
                    })
                    .collect()
            }
        };

        let mut files = Vec::new();
        for partition in partitions {
            files.extend(read_dir_sorted(&partition)?.into_iter().filter(|p| is_batch_file(p)));
        }
        Ok(files)
    }

    /// Lazily reads records back, decompressing `.gz` files
    pub fn read(path: impl AsRef<Path>) -> Result<RecordReader> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| storage_err("open", path, e))?;
        let inner: Box<dyn Read + Send> = if path.extension().is_some_and(|e| e == "gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(RecordReader {
            path: path.to_path_buf(),
            lines: BufReader::new(inner).lines(),
        })
    }

    pub fn stats(&self, source: SourceKind) -> Result<StorageStats> {
        let files = self.list(source, None)?;
        let mut total_size_bytes = 0;
        for file in &files {
            total_size_bytes += fs::metadata(file)
                .map_err(|e| storage_err("stat", file, e))?
                .len();
        }
        let partitions: BTreeSet<_> = files.iter().filter_map(|f| f.parent()).collect();
        Ok(StorageStats {
            source,
            file_count: files.len(),
            total_size_bytes,
            partitions: partitions.len(),
        })
    }
}

/// Iterator over the records of one staged file
pub struct RecordReader {
    path: PathBuf,
    lines: Lines<BufReader<Box<dyn Read + Send>>>,
}

impl Iterator for RecordReader {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(storage_err("read", &self.path, e))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(|e| {
                IngestError::Parse(format!("Bad record in {}: {e}", self.path.display()))
            }));
        }
    }
}

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    fn open(file: File, compress: bool) -> Self {
        let buffered = BufWriter::new(file);
        if compress {
            Sink::Gzip(GzEncoder::new(buffered, Compression::default()))
        } else {
            Sink::Plain(buffered)
        }
    }

    /// Writes any trailer, flushes buffers and hands back the file
    fn finish(self) -> std::io::Result<File> {
        let buffered = match self {
            Sink::Plain(w) => w,
            Sink::Gzip(encoder) => encoder.finish()?,
        };
        buffered.into_inner().map_err(|e| e.into_error())
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
        }
    }
}

fn stamp<T: Serialize>(record: &T, source: SourceKind, batch_id: &BatchId) -> Result<Value> {
    let mut value = serde_json::to_value(record)
        .map_err(|e| IngestError::Storage(format!("Failed to encode record: {e}")))?;
    let object = value.as_object_mut().ok_or_else(|| {
        IngestError::Storage("Staged records must serialize to JSON objects".to_string())
    })?;
    object.insert(
        INGESTED_AT_FIELD.to_string(),
        Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    object.insert(SOURCE_FIELD.to_string(), Value::from(source.as_str()));
    object.insert(BATCH_ID_FIELD.to_string(), Value::from(batch_id.as_str()));
    Ok(value)
}

fn is_batch_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| !n.starts_with('.') && (n.ends_with(".ndjson") || n.ends_with(".ndjson.gz")))
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage_err("list", dir, e)),
    };
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| storage_err("list", dir, e))?;
    paths.sort();
    Ok(paths)
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn storage_err(action: &str, path: &Path, e: std::io::Error) -> IngestError {
    IngestError::Storage(format!("Failed to {action} {}: {e}", path.display()))
}
