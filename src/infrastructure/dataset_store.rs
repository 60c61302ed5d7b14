//! Dataset source/sink
//!
//! Loads the full grid into memory and rewrites it atomically. Two backends:
//! - JSON array of row objects (headers = key order of the first object)
//! - CSV with a header row (ragged records are padded)
//!
//! Cell values are handled as text in both formats. The JSON store keeps the
//! records it loaded and only rewrites the values whose text changed, so keys
//! outside the header list and non-string values survive a save.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::Grid;
use crate::infrastructure::atomic_file::write_atomic;
use crate::infrastructure::errors::{StoreError, StoreResult};

/// Persistent home of the grid.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Path of the backing file.
    fn path(&self) -> &Path;

    async fn load(&self) -> StoreResult<Grid>;

    /// Replace the backing file with the full grid. Must be atomic.
    async fn save(&self, grid: &Grid) -> StoreResult<()>;
}

/// Pick a backend from the file extension.
pub fn open_dataset_store(path: impl Into<PathBuf>) -> StoreResult<Arc<dyn DatasetStore>> {
    let path = path.into();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("json") => Ok(Arc::new(JsonDatasetStore::new(path))),
        Some("csv") => Ok(Arc::new(CsvDatasetStore::new(path))),
        _ => Err(StoreError::UnsupportedFormat(path)),
    }
}

/// Fail with [`StoreError::DatasetMissing`] unless `path` is an existing file.
pub async fn ensure_dataset_exists(path: &Path) -> StoreResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(StoreError::DatasetMissing(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StoreError::DatasetMissing(path.to_path_buf()))
        }
        Err(e) => Err(StoreError::io(path, e)),
    }
}

async fn read_existing(path: &Path) -> StoreResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::DatasetMissing(path.to_path_buf())
        } else {
            StoreError::io(path, e)
        }
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

type Record = Map<String, Value>;

#[derive(Debug)]
pub struct JsonDatasetStore {
    path: PathBuf,
    /// Records as last read or written; the base of the next save
    records: Mutex<Vec<Record>>,
}

impl JsonDatasetStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    fn parse(&self, bytes: &[u8]) -> StoreResult<(Grid, Vec<Record>)> {
        let value: Value = serde_json::from_slice(bytes).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let Value::Array(items) = value else {
            return Err(StoreError::Shape {
                path: self.path.clone(),
                reason: "top level must be an array of row objects".into(),
            });
        };

        let mut records = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(map) => records.push(map),
                _ => {
                    return Err(StoreError::Shape {
                        path: self.path.clone(),
                        reason: format!("row {idx} is not an object"),
                    });
                }
            }
        }

        let headers: Vec<String> = records
            .first()
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default();
        let rows = records
            .iter()
            .map(|record| {
                headers
                    .iter()
                    .map(|h| record.get(h).map(value_to_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok((Grid::new(headers, rows), records))
    }

    /// Overlay the grid on the base records. A value is replaced only when its
    /// text differs from the grid cell; rows past the base are written whole.
    fn render(grid: &Grid, base: &[Record]) -> Vec<Record> {
        grid.rows()
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let original = base.get(idx);
                let mut record = original.cloned().unwrap_or_default();
                for (col, header) in grid.headers().iter().enumerate() {
                    let text = row.get(col).map_or("", String::as_str);
                    let unchanged = match record.get(header) {
                        Some(value) => value_to_text(value) == text,
                        None => original.is_some() && text.is_empty(),
                    };
                    if !unchanged {
                        record.insert(header.clone(), Value::String(text.to_string()));
                    }
                }
                record
            })
            .collect()
    }
}

#[async_trait]
impl DatasetStore for JsonDatasetStore {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<Grid> {
        let bytes = read_existing(&self.path).await?;
        let (grid, records) = self.parse(&bytes)?;
        *self.records.lock().await = records;
        info!(
            "Loaded JSON dataset {:?}: {} columns, {} rows",
            self.path,
            grid.headers().len(),
            grid.row_count()
        );
        Ok(grid)
    }

    async fn save(&self, grid: &Grid) -> StoreResult<()> {
        let mut records = self.records.lock().await;
        let rendered = Self::render(grid, &records);
        let bytes = serde_json::to_vec_pretty(&rendered).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &bytes).await?;
        *records = rendered;
        debug!("Saved JSON dataset {:?} ({} rows)", self.path, grid.row_count());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CsvDatasetStore {
    path: PathBuf,
}

impl CsvDatasetStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn csv_error(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn parse(&self, bytes: &[u8]) -> StoreResult<Grid> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| self.csv_error(e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| self.csv_error(e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Grid::new(headers, rows))
    }

    fn render(&self, grid: &Grid) -> StoreResult<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        if !grid.headers().is_empty() {
            writer
                .write_record(grid.headers())
                .map_err(|e| self.csv_error(e))?;
        }
        for row in grid.rows() {
            writer.write_record(row).map_err(|e| self.csv_error(e))?;
        }
        writer
            .into_inner()
            .map_err(|e| StoreError::io(&self.path, e.into_error()))
    }
}

#[async_trait]
impl DatasetStore for CsvDatasetStore {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<Grid> {
        let bytes = read_existing(&self.path).await?;
        let grid = self.parse(&bytes)?;
        info!(
            "Loaded CSV dataset {:?}: {} columns, {} rows",
            self.path,
            grid.headers().len(),
            grid.row_count()
        );
        Ok(grid)
    }

    async fn save(&self, grid: &Grid) -> StoreResult<()> {
        let bytes = self.render(grid)?;
        write_atomic(&self.path, &bytes).await?;
        debug!("Saved CSV dataset {:?} ({} rows)", self.path, grid.row_count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CellAddress;
    use tempfile::tempdir;

    #[tokio::test]
    async fn json_keeps_header_order_and_stringifies_scalars() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("terms.json");
        std::fs::write(
            &path,
            r#"[
                {"Term": "Dropout", "Zeta": null, "Alpha": 3},
                {"Term": "Attention", "Alpha": "set"}
            ]"#,
        )
        .unwrap();

        let grid = JsonDatasetStore::new(&path).load().await.unwrap();

        assert_eq!(grid.headers(), ["Term", "Zeta", "Alpha"]);
        assert_eq!(grid.cell(CellAddress::new(2, 1)), Some(""));
        assert_eq!(grid.cell(CellAddress::new(2, 2)), Some("3"));
        assert_eq!(grid.cell(CellAddress::new(3, 1)), Some(""));
        assert_eq!(grid.cell(CellAddress::new(3, 2)), Some("set"));
    }

    #[tokio::test]
    async fn json_save_then_load_preserves_cells() {
        let dir = tempdir().unwrap();
        let store = JsonDatasetStore::new(dir.path().join("terms.json"));
        let mut grid = Grid::new(
            vec!["Term".into(), "Definition".into()],
            vec![vec!["Dropout".into(), String::new()]],
        );
        assert!(grid.set(CellAddress::new(2, 1), "Randomly zeroes activations, «ünïcode»"));

        store.save(&grid).await.unwrap();
        let reloaded = store.load().await.unwrap();

        assert_eq!(reloaded, grid);
    }

    #[tokio::test]
    async fn json_save_keeps_untouched_keys_and_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("terms.json");
        std::fs::write(
            &path,
            r#"[
                {"Term": "A", "Def": "", "Rank": 7},
                {"Term": "B", "Def": null, "Notes": "keep me", "Id": 7, "Meta": {"k": [1, 2]}}
            ]"#,
        )
        .unwrap();
        let store = JsonDatasetStore::new(&path);

        let mut grid = store.load().await.unwrap();
        assert_eq!(grid.headers(), ["Term", "Def", "Rank"]);
        assert!(grid.set(CellAddress::new(3, 1), "generated"));
        store.save(&grid).await.unwrap();

        let saved: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            saved,
            serde_json::json!([
                {"Term": "A", "Def": "", "Rank": 7},
                {"Term": "B", "Def": "generated", "Notes": "keep me", "Id": 7, "Meta": {"k": [1, 2]}}
            ])
        );

        // a second save builds on the first one
        assert!(grid.set(CellAddress::new(2, 1), "also generated"));
        store.save(&grid).await.unwrap();
        let saved: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved[0]["Def"], "also generated");
        assert_eq!(saved[0]["Rank"], 7);
        assert_eq!(saved[1]["Notes"], "keep me");
    }

    #[tokio::test]
    async fn json_rejects_non_array_top_level() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"Term": "x"}"#).unwrap();

        let err = JsonDatasetStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Shape { .. }));
    }

    #[tokio::test]
    async fn empty_json_array_is_an_empty_grid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "[]").unwrap();

        let grid = JsonDatasetStore::new(&path).load().await.unwrap();
        assert!(grid.is_empty());
    }

    #[tokio::test]
    async fn csv_pads_ragged_rows_and_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("terms.csv");
        std::fs::write(&path, "Term,Definition,,Example\nDropout,\"a, b\"\nAttention\n").unwrap();
        let store = CsvDatasetStore::new(&path);

        let grid = store.load().await.unwrap();
        assert_eq!(grid.headers().len(), 4);
        assert_eq!(grid.rows()[1].len(), 4);
        assert_eq!(grid.cell(CellAddress::new(2, 1)), Some("a, b"));

        store.save(&grid).await.unwrap();
        assert_eq!(store.load().await.unwrap(), grid);
    }

    #[tokio::test]
    async fn missing_dataset_is_reported_as_such() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.json");

        assert!(matches!(
            ensure_dataset_exists(&path).await,
            Err(StoreError::DatasetMissing(_))
        ));
        assert!(matches!(
            JsonDatasetStore::new(&path).load().await,
            Err(StoreError::DatasetMissing(_))
        ));
    }

    #[test]
    fn store_is_chosen_by_extension() {
        assert!(open_dataset_store("a.JSON").is_ok());
        assert!(open_dataset_store("a.csv").is_ok());
        assert!(matches!(
            open_dataset_store("a.xlsx"),
            Err(StoreError::UnsupportedFormat(_))
        ));
    }
}
