//! Parquet bar store
//!
//! One directory per partition (`{root}/{symbol}/{timeframe}`), one part
//! file per write. Prices are stored as strings for Decimal precision. The
//! set of stored timestamps per partition is loaded lazily from disk and
//! kept in memory for dedup.
//!
//! Each partition has its own async lock, so pollers for different symbols
//! never wait on each other. File work runs on the blocking pool.

use super::BarStore;
use crate::bar::{normalize_bars, Bar, BarSource, Indicators};
use arrow::array::{Array, ArrayRef, StringArray, TimestampMicrosecondArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

type PartitionKey = (String, String);

/// Stored timestamps of one partition, `None` until read from disk
type PartitionIndex = tokio::sync::Mutex<Option<BTreeSet<DateTime<Utc>>>>;

/// Column offset of the first indicator column
const INDICATOR_OFFSET: usize = 6;

/// Column holding the [`BarSource`]
const SOURCE_COLUMN: usize = INDICATOR_OFFSET + Indicators::NAMES.len();

/// Bar schema fields
pub fn bar_schema() -> Schema {
    let mut fields = vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("open", DataType::Utf8, false),
        Field::new("high", DataType::Utf8, false),
        Field::new("low", DataType::Utf8, false),
        Field::new("close", DataType::Utf8, false),
        Field::new("volume", DataType::UInt64, false),
    ];

    for name in Indicators::NAMES {
        fields.push(Field::new(name, DataType::Utf8, true));
    }
    fields.push(Field::new("source", DataType::Utf8, false));

    Schema::new(fields)
}

/// Bar store backed by Parquet part files
pub struct ParquetStore {
    root: PathBuf,
    /// Only held to look up a partition lock, never across I/O
    partitions: Mutex<HashMap<PartitionKey, Arc<PartitionIndex>>>,
}

impl ParquetStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            partitions: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, symbol: &str, timeframe: &str) -> anyhow::Result<PathBuf> {
        for component in [symbol, timeframe] {
            if !is_safe_component(component) {
                anyhow::bail!("Invalid partition component: {:?}", component);
            }
        }
        Ok(self.root.join(symbol).join(timeframe))
    }

    /// Directory and lock for one partition
    fn partition(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> anyhow::Result<(PathBuf, Arc<PartitionIndex>)> {
        let dir = self.partition_dir(symbol, timeframe)?;
        let mut partitions = self
            .partitions
            .lock()
            .map_err(|_| anyhow::anyhow!("Parquet store partition map poisoned"))?;
        let index = partitions
            .entry((symbol.to_string(), timeframe.to_string()))
            .or_default()
            .clone();
        Ok((dir, index))
    }
}

/// Run file work on the blocking pool
async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Stored timestamps for a partition, reading them from disk on first use
async fn loaded<'a>(
    slot: &'a mut Option<BTreeSet<DateTime<Utc>>>,
    dir: &Path,
) -> anyhow::Result<&'a mut BTreeSet<DateTime<Utc>>> {
    if slot.is_none() {
        let path = dir.to_path_buf();
        let bars = blocking(move || read_partition(&path)).await?;
        tracing::debug!(dir = ?dir, bars = bars.len(), "Loaded partition index");
        *slot = Some(bars.into_iter().map(|b| b.timestamp).collect());
    }
    slot.as_mut()
        .ok_or_else(|| anyhow::anyhow!("Partition index missing for {:?}", dir))
}

fn is_safe_component(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('.')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn part_file_name(first: DateTime<Utc>) -> String {
    format!(
        "bars_{}_{}.parquet",
        first.format("%Y%m%d_%H%M%S"),
        uuid::Uuid::new_v4().simple()
    )
}

fn part_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "parquet"))
        .collect();
    files.sort();
    Ok(files)
}

fn subdirs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    Ok(fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect())
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| is_safe_component(n))
        .map(str::to_string)
}

/// Every (symbol, timeframe) partition present under `root`
fn list_partitions(root: &Path) -> anyhow::Result<Vec<PartitionKey>> {
    let mut keys = Vec::new();
    for symbol_dir in subdirs(root)? {
        let Some(symbol) = dir_name(&symbol_dir) else {
            continue;
        };
        for timeframe_dir in subdirs(&symbol_dir)? {
            if let Some(timeframe) = dir_name(&timeframe_dir) {
                keys.push((symbol.clone(), timeframe));
            }
        }
    }
    keys.sort();
    Ok(keys)
}

fn read_partition(dir: &Path) -> anyhow::Result<Vec<Bar>> {
    let mut bars = Vec::new();
    for path in part_files(dir)? {
        bars.extend(read_bars(&path)?);
    }
    Ok(normalize_bars(bars))
}

fn replace_partition(dir: &Path, bars: &[Bar]) -> anyhow::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    if let Some(first) = bars.first() {
        write_bars(&dir.join(part_file_name(first.timestamp)), bars)?;
    }
    Ok(())
}

/// Rewrite part files holding stale live bars; returns the purged timestamps
fn purge_partition(dir: &Path, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<DateTime<Utc>>> {
    let mut purged = Vec::new();
    for path in part_files(dir)? {
        let (stale, kept): (Vec<Bar>, Vec<Bar>) = read_bars(&path)?
            .into_iter()
            .partition(|b| b.source == BarSource::Live && b.timestamp < cutoff);
        if stale.is_empty() {
            continue;
        }

        if let Some(first) = kept.first() {
            write_bars(&dir.join(part_file_name(first.timestamp)), &kept)?;
        }
        fs::remove_file(&path)?;
        purged.extend(stale.iter().map(|b| b.timestamp));
    }
    Ok(purged)
}

/// Write bars to a new Parquet file
fn write_bars(path: &Path, bars: &[Bar]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let schema = Arc::new(bar_schema());
    let file = File::create(path)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_micros()).collect();
    let decimal_column = |f: fn(&Bar) -> Decimal| -> ArrayRef {
        Arc::new(StringArray::from(
            bars.iter().map(|b| f(b).to_string()).collect::<Vec<_>>(),
        ))
    };

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC")),
        decimal_column(|b| b.open),
        decimal_column(|b| b.high),
        decimal_column(|b| b.low),
        decimal_column(|b| b.close),
        Arc::new(UInt64Array::from(
            bars.iter().map(|b| b.volume).collect::<Vec<_>>(),
        )),
    ];

    let indicator_rows: Vec<_> = bars.iter().map(|b| b.indicators.values()).collect();
    for i in 0..Indicators::NAMES.len() {
        let values: Vec<Option<String>> = indicator_rows
            .iter()
            .map(|row| row[i].map(|d| d.to_string()))
            .collect();
        columns.push(Arc::new(StringArray::from(values)));
    }
    columns.push(Arc::new(StringArray::from(
        bars.iter().map(|b| b.source.as_str()).collect::<Vec<_>>(),
    )));

    let batch = RecordBatch::try_new(schema, columns)?;

    writer.write(&batch)?;
    writer.close()?;

    tracing::debug!(path = ?path, count = bars.len(), "Wrote bars to Parquet");

    Ok(())
}

fn string_column<'a>(batch: &'a RecordBatch, idx: usize) -> anyhow::Result<&'a StringArray> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow::anyhow!("Invalid column {}", idx))
}

/// Read bars from a Parquet file
fn read_bars(path: &Path) -> anyhow::Result<Vec<Bar>> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let reader = builder.build()?;

    let mut bars = Vec::new();

    for batch_result in reader {
        let batch = batch_result?;

        let timestamps = batch
            .column(0)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or_else(|| anyhow::anyhow!("Invalid timestamp column"))?;
        let open = string_column(&batch, 1)?;
        let high = string_column(&batch, 2)?;
        let low = string_column(&batch, 3)?;
        let close = string_column(&batch, 4)?;
        let volume = batch
            .column(5)
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| anyhow::anyhow!("Invalid volume column"))?;
        let indicator_columns = (0..Indicators::NAMES.len())
            .map(|i| string_column(&batch, INDICATOR_OFFSET + i))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let source = string_column(&batch, SOURCE_COLUMN)?;

        for i in 0..batch.num_rows() {
            let timestamp = DateTime::from_timestamp_micros(timestamps.value(i))
                .ok_or_else(|| anyhow::anyhow!("Invalid timestamp"))?;

            let mut values = [None; 11];
            for (slot, column) in values.iter_mut().zip(&indicator_columns) {
                if !column.is_null(i) {
                    *slot = Some(Decimal::from_str(column.value(i))?);
                }
            }

            bars.push(Bar {
                timestamp,
                open: Decimal::from_str(open.value(i))?,
                high: Decimal::from_str(high.value(i))?,
                low: Decimal::from_str(low.value(i))?,
                close: Decimal::from_str(close.value(i))?,
                volume: volume.value(i),
                indicators: Indicators::from_values(values),
                source: BarSource::from_str(source.value(i))?,
            });
        }
    }

    Ok(bars)
}

#[async_trait]
impl BarStore for ParquetStore {
    async fn latest_timestamp(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let (dir, index) = self.partition(symbol, timeframe)?;
        let mut slot = index.lock().await;
        let stamps = loaded(&mut *slot, &dir).await?;
        Ok(stamps.last().copied())
    }

    async fn append(&self, symbol: &str, timeframe: &str, bars: &[Bar]) -> anyhow::Result<usize> {
        let (dir, index) = self.partition(symbol, timeframe)?;
        let mut slot = index.lock().await;
        let stamps = loaded(&mut *slot, &dir).await?;

        let fresh: Vec<Bar> = normalize_bars(
            bars.iter()
                .filter(|b| !stamps.contains(&b.timestamp))
                .cloned()
                .collect(),
        );
        let Some(first) = fresh.first() else {
            return Ok(0);
        };

        let path = dir.join(part_file_name(first.timestamp));
        let written: Vec<DateTime<Utc>> = fresh.iter().map(|b| b.timestamp).collect();
        blocking(move || write_bars(&path, &fresh)).await?;

        let count = written.len();
        stamps.extend(written);
        Ok(count)
    }

    async fn replace(&self, symbol: &str, timeframe: &str, bars: &[Bar]) -> anyhow::Result<usize> {
        let (dir, index) = self.partition(symbol, timeframe)?;
        let mut slot = index.lock().await;

        let bars = normalize_bars(bars.to_vec());
        let stamps: BTreeSet<_> = bars.iter().map(|b| b.timestamp).collect();

        if let Err(e) = blocking(move || replace_partition(&dir, &bars)).await {
            // Partition state on disk is unknown, reload on next access
            *slot = None;
            return Err(e);
        }

        let count = stamps.len();
        *slot = Some(stamps);
        Ok(count)
    }

    async fn query(
        &self,
        symbol: &str,
        timeframe: &str,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<Bar>> {
        let (dir, index) = self.partition(symbol, timeframe)?;
        let _slot = index.lock().await;

        let mut bars = blocking(move || read_partition(&dir)).await?;
        if let Some(since) = since {
            bars.retain(|b| b.timestamp >= since);
        }
        Ok(bars)
    }

    async fn purge_live_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
        let root = self.root.clone();
        let keys = blocking(move || list_partitions(&root)).await?;
        let mut removed = 0;

        for (symbol, timeframe) in keys {
            let (dir, index) = self.partition(&symbol, &timeframe)?;
            let mut slot = index.lock().await;

            match blocking(move || purge_partition(&dir, cutoff)).await {
                Ok(purged) => {
                    if let Some(stamps) = slot.as_mut() {
                        for ts in &purged {
                            stamps.remove(ts);
                        }
                    }
                    removed += purged.len();
                }
                Err(e) => {
                    *slot = None;
                    return Err(e);
                }
            }
        }

        tracing::debug!(cutoff = %cutoff, removed, "Purged live bars from Parquet store");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn bar(minute: i64) -> Bar {
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 14, 30, 0).unwrap();
        Bar::new(
            start + Duration::minutes(minute),
            dec!(187.25),
            dec!(187.90),
            dec!(186.80),
            dec!(187.55),
            12_400,
        )
    }

    #[tokio::test]
    async fn test_write_and_query() {
        let dir = tempdir().unwrap();
        let store = ParquetStore::new(dir.path()).unwrap();

        let mut bars = vec![bar(0), bar(1)];
        bars[1].indicators.rsi = Some(dec!(55.12345678));

        assert_eq!(store.append("AAPL", "1m", &bars).await.unwrap(), 2);

        let stored = store.query("AAPL", "1m", None).await.unwrap();
        assert_eq!(stored, bars);
        assert_eq!(stored[1].indicators.rsi, Some(dec!(55.12345678)));
        assert!(stored[0].indicators.sma_20.is_none());
    }

    #[tokio::test]
    async fn test_append_skips_stored_timestamps() {
        let dir = tempdir().unwrap();
        let store = ParquetStore::new(dir.path()).unwrap();

        store.append("AAPL", "1m", &[bar(0), bar(1)]).await.unwrap();
        assert_eq!(store.append("AAPL", "1m", &[bar(1)]).await.unwrap(), 0);
        assert_eq!(store.append("AAPL", "1m", &[bar(1), bar(2)]).await.unwrap(), 1);

        assert_eq!(store.query("AAPL", "1m", None).await.unwrap().len(), 3);
        assert_eq!(
            store.latest_timestamp("AAPL", "1m").await.unwrap(),
            Some(bar(2).timestamp)
        );
    }

    #[tokio::test]
    async fn test_index_reloads_from_disk() {
        let dir = tempdir().unwrap();
        {
            let store = ParquetStore::new(dir.path()).unwrap();
            store.append("MSFT", "5m", &[bar(0), bar(5)]).await.unwrap();
        }

        let reopened = ParquetStore::new(dir.path()).unwrap();
        assert_eq!(
            reopened.latest_timestamp("MSFT", "5m").await.unwrap(),
            Some(bar(5).timestamp)
        );
        assert_eq!(reopened.append("MSFT", "5m", &[bar(5)]).await.unwrap(), 0);
    }

    fn live(minute: i64) -> Bar {
        bar(minute).with_source(BarSource::Live)
    }

    #[tokio::test]
    async fn test_replace_and_purge() {
        let dir = tempdir().unwrap();
        let store = ParquetStore::new(dir.path()).unwrap();

        store.append("TSLA", "1m", &[bar(0), bar(1)]).await.unwrap();
        store
            .replace("TSLA", "1m", &[live(10), live(11), live(12)])
            .await
            .unwrap();
        assert_eq!(store.query("TSLA", "1m", None).await.unwrap().len(), 3);

        let removed = store.purge_live_before(bar(12).timestamp).await.unwrap();
        assert_eq!(removed, 2);

        let left = store.query("TSLA", "1m", None).await.unwrap();
        assert_eq!(left, vec![live(12)]);
        assert_eq!(
            store.latest_timestamp("TSLA", "1m").await.unwrap(),
            Some(bar(12).timestamp)
        );
    }

    #[tokio::test]
    async fn test_purge_keeps_backfill_and_source_survives_reload() {
        let dir = tempdir().unwrap();
        let store = ParquetStore::new(dir.path()).unwrap();

        store.append("NVDA", "1m", &[bar(0), bar(1)]).await.unwrap();
        store.append("NVDA", "1m", &[live(2), live(3)]).await.unwrap();

        let removed = store.purge_live_before(bar(10).timestamp).await.unwrap();
        assert_eq!(removed, 2);

        let reopened = ParquetStore::new(dir.path()).unwrap();
        let left = reopened.query("NVDA", "1m", None).await.unwrap();
        assert_eq!(left, vec![bar(0), bar(1)]);
        assert_eq!(left[0].source, BarSource::Backfill);
        assert_eq!(
            reopened.latest_timestamp("NVDA", "1m").await.unwrap(),
            Some(bar(1).timestamp)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_stay_deduplicated() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ParquetStore::new(dir.path()).unwrap());

        let tasks: Vec<_> = ["AAPL", "MSFT", "TSLA", "AMD"]
            .into_iter()
            .flat_map(|symbol| (0..3).map(move |_| symbol))
            .map(|symbol| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append(symbol, "1m", &[live(0), live(1), live(2)])
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut written = 0;
        for task in tasks {
            written += task.await.unwrap();
        }

        // Each partition accepts the three bars exactly once
        assert_eq!(written, 12);
        for symbol in ["AAPL", "MSFT", "TSLA", "AMD"] {
            let rows: usize = part_files(&dir.path().join(symbol).join("1m"))
                .unwrap()
                .iter()
                .map(|path| read_bars(path).unwrap().len())
                .sum();
            assert_eq!(rows, 3);
        }
    }

    #[tokio::test]
    async fn test_rejects_path_like_symbols() {
        let dir = tempdir().unwrap();
        let store = ParquetStore::new(dir.path()).unwrap();

        assert!(store.append("../etc", "1m", &[bar(0)]).await.is_err());
        assert!(store.query("AAPL", "", None).await.is_err());
    }
}
