use crate::file::csv::{
    encoding::{EncodedWriter, decode_file},
    error::SinkError,
    settings::CsvSettings,
};
use chrono::{DateTime, Local, Utc};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use encoding_rs::UTF_8;
use model::{core::identifiers::ExecutionId, records::row::NormalizedRow};
use serde::Serialize;
use std::{
    fs,
    io::{self, BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};
use tracing::{debug, info, warn};

const CSV_EXTENSION: &str = "csv";
const CONSOLIDATED_SUFFIX: &str = "_consolidated.csv";
const STAGING_EXTENSION: &str = "partial";
const UNKNOWN: &str = "unknown";
const PROVENANCE_HEADER: [&str; 3] = ["cluster", "database", "source_file"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub directories: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub line_count: usize,
    pub data_line_count: usize,
}

/// Writes per-target result files under `{storage}/{execution_id}/` and
/// merges them into one consolidated file.
#[derive(Debug, Clone)]
pub struct CsvResultSink {
    settings: CsvSettings,
}

impl CsvResultSink {
    pub fn new(settings: CsvSettings) -> Result<Self, SinkError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn execution_dir(&self, execution_id: &ExecutionId) -> PathBuf {
        self.settings.storage_path.join(execution_id.as_str())
    }

    /// Writes one target's rows. Returns `None` without touching the disk when
    /// there are no rows.
    pub fn write(
        &self,
        execution_id: &ExecutionId,
        cluster_alias: &str,
        database: &str,
        columns: &[Arc<str>],
        rows: &[NormalizedRow],
    ) -> Result<Option<PathBuf>, SinkError> {
        if rows.is_empty() {
            return Ok(None);
        }

        let dir = self.execution_dir(execution_id);
        fs::create_dir_all(&dir)?;

        let stem = format!(
            "{}_{}_{}",
            sanitize(Some(cluster_alias)),
            sanitize(Some(database)),
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = unique_path(&dir, &stem);
        self.publish(&path, |file| self.write_rows(file, columns, rows))?;

        debug!(path = %path.display(), rows = rows.len(), "Wrote target result file");
        Ok(Some(path))
    }

    /// Merges every per-target file of the execution, in file-name order,
    /// prefixing each record with its provenance.
    pub fn consolidate(&self, execution_id: &ExecutionId) -> Result<Option<PathBuf>, SinkError> {
        let sources: Vec<PathBuf> = self
            .list_execution_files(execution_id)?
            .into_iter()
            .filter(|p| !is_consolidated(p))
            .collect();
        if sources.is_empty() {
            return Ok(None);
        }

        let out_path = self
            .execution_dir(execution_id)
            .join(format!("{execution_id}{CONSOLIDATED_SUFFIX}"));
        let records = self.publish(&out_path, |file| self.merge_into(file, &sources))?;

        info!(
            execution_id = %execution_id,
            files = sources.len(),
            records,
            path = %out_path.display(),
            "Consolidated result files"
        );
        Ok(Some(out_path))
    }

    /// Reads a result file for download.
    pub fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, SinkError> {
        let meta = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(SinkError::NotFound(path.display().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SinkError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let limit = self.settings.max_download_bytes;
        if meta.len() > limit {
            return Err(SinkError::PayloadTooLarge {
                path: path.display().to_string(),
                size: meta.len(),
                limit,
            });
        }
        Ok(fs::read(path)?)
    }

    /// Deletes whole execution directories last modified more than `days`
    /// days ago. Directories that cannot be inspected or removed are skipped.
    pub fn purge_older_than(&self, days: u32) -> Result<PurgeReport, SinkError> {
        let root = &self.settings.storage_path;
        let mut report = PurgeReport::default();
        if !root.exists() {
            return Ok(report);
        }

        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(days) * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for entry in fs::read_dir(root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(%err, "Skipping unreadable storage entry");
                    continue;
                }
            };
            let path = entry.path();

            let modified = match entry.metadata().and_then(|m| {
                if m.is_dir() { m.modified().map(Some) } else { Ok(None) }
            }) {
                Ok(Some(modified)) => modified,
                Ok(None) => continue,
                Err(err) => {
                    warn!(path = %path.display(), %err, "Skipping execution directory");
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }

            let size = dir_size(&path);
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), bytes = size, "Purged execution directory");
                    report.directories += 1;
                    report.bytes += size;
                }
                Err(err) => warn!(path = %path.display(), %err, "Failed to purge execution directory"),
            }
        }

        info!(
            directories = report.directories,
            bytes = report.bytes,
            days,
            "Purged old result directories"
        );
        Ok(report)
    }

    /// Result files of an execution in name order; empty when none exist.
    pub fn list_execution_files(&self, execution_id: &ExecutionId) -> Result<Vec<PathBuf>, SinkError> {
        let dir = self.execution_dir(execution_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == CSV_EXTENSION) {
                files.push(path);
            }
        }
        files.sort_by_key(|p| file_name(p));
        Ok(files)
    }

    pub fn file_info(&self, path: &Path) -> Result<FileInfo, SinkError> {
        if !path.is_file() {
            return Err(SinkError::NotFound(path.display().to_string()));
        }
        let meta = fs::metadata(path)?;
        let line_count = BufReader::new(fs::File::open(path)?).split(b'\n').count();
        let data_line_count = if self.settings.include_header {
            line_count.saturating_sub(1)
        } else {
            line_count
        };

        Ok(FileInfo {
            name: file_name(path),
            size: meta.len(),
            modified: DateTime::<Utc>::from(meta.modified()?),
            line_count,
            data_line_count,
        })
    }

    /// Fills a staging file next to `path` and renames it into place only
    /// once `fill` succeeded. On failure the staging file is removed, so a
    /// partially written result never becomes visible to consolidation.
    fn publish<T, F>(&self, path: &Path, fill: F) -> Result<T, SinkError>
    where
        F: FnOnce(fs::File) -> Result<T, SinkError>,
    {
        let staging = path.with_extension(STAGING_EXTENSION);
        let result = fs::File::create(&staging)
            .map_err(SinkError::from)
            .and_then(fill)
            .and_then(|value| {
                fs::rename(&staging, path)?;
                Ok(value)
            });

        if result.is_err() {
            if let Err(err) = fs::remove_file(&staging) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = %staging.display(), %err, "Failed to remove partial result file");
                }
            }
        }
        result
    }

    fn write_rows<W: Write>(
        &self,
        out: W,
        columns: &[Arc<str>],
        rows: &[NormalizedRow],
    ) -> Result<(), SinkError> {
        let mut writer = self.writer(out);
        if self.settings.include_header {
            writer.write_record(columns.iter().map(|c| c.as_bytes()))?;
        }
        for row in rows {
            writer.write_record(row.values().map(|v| v.to_field()))?;
        }
        finish(writer)
    }

    fn merge_into<W: Write>(&self, out: W, sources: &[PathBuf]) -> Result<usize, SinkError> {
        let mut writer = self.writer(out);
        let mut header_written = !self.settings.include_header;
        let mut records = 0usize;

        for source in sources {
            let file_name = file_name(source);
            let (cluster, database) = provenance(&file_name);

            let mut reader = ReaderBuilder::new()
                .delimiter(self.settings.delimiter)
                .has_headers(self.settings.include_header)
                .flexible(true)
                .from_reader(self.open_source(source)?);

            if !header_written {
                let mut header = StringRecord::from(PROVENANCE_HEADER.to_vec());
                header.extend(reader.headers()?.iter());
                writer.write_record(&header)?;
                header_written = true;
            }

            let mut record = StringRecord::new();
            while reader.read_record(&mut record)? {
                let mut out = StringRecord::from(vec![cluster.as_str(), database.as_str(), file_name.as_str()]);
                out.extend(record.iter());
                writer.write_record(&out)?;
                records += 1;
            }
        }
        finish(writer)?;
        Ok(records)
    }

    /// Per-target files are stored in the output encoding; the CSV reader
    /// needs UTF-8.
    fn open_source(&self, path: &Path) -> Result<Box<dyn Read>, SinkError> {
        if self.settings.encoding == UTF_8 {
            return Ok(Box::new(fs::File::open(path)?));
        }
        let text = decode_file(&fs::read(path)?, self.settings.encoding);
        Ok(Box::new(io::Cursor::new(text.into_bytes())))
    }

    fn writer<W: Write>(&self, out: W) -> csv::Writer<EncodedWriter<W>> {
        WriterBuilder::new()
            .delimiter(self.settings.delimiter)
            .quote_style(QuoteStyle::Necessary)
            .from_writer(EncodedWriter::new(out, self.settings.encoding))
    }
}

fn finish<W: Write>(writer: csv::Writer<EncodedWriter<W>>) -> Result<(), SinkError> {
    let encoded = writer.into_inner().map_err(|e| SinkError::Io(e.into_error()))?;
    encoded.finish()?;
    Ok(())
}

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize(name: Option<&str>) -> String {
    match name {
        None => UNKNOWN.to_string(),
        Some(name) => name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect(),
    }
}

/// Cluster and database from the first two `_` segments of a result file's
/// base name.
fn provenance(file_name: &str) -> (String, String) {
    let stem = file_name.strip_suffix(".csv").unwrap_or(file_name);
    let mut parts = stem.split('_');
    match (parts.next(), parts.next()) {
        (Some(cluster), Some(database)) => (cluster.to_string(), database.to_string()),
        _ => (UNKNOWN.to_string(), UNKNOWN.to_string()),
    }
}

fn is_consolidated(path: &Path) -> bool {
    file_name(path).ends_with(CONSOLIDATED_SUFFIX)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.{CSV_EXTENSION}"));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}.{CSV_EXTENSION}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => dir_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}
