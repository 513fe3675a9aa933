//! Directory driver (C5).
//!
//! Public surface over a device's directory: `open`/`close`/`flush`,
//! `append`, `insert`, `sort`, and `query_interval`. Every public
//! operation checks the driver's [`AccessType`] before touching the
//! filesystem, mirroring `requires_access_type` in
//! `examples/original_source/taransaydb/driver.py`.

use std::cell::Cell;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, NaiveTime};
use tempfile::Builder as TempFileBuilder;
use tracing::{instrument, trace};

use crate::access::AccessType;
use crate::cache::{FileMode, ShardHandleCache};
use crate::codec::{format_line, is_data_line, parse_line_time, ValueCodec};
use crate::cursor::Cursor;
use crate::encoding::Encoding;
use crate::error::{signed_line_number, Error, Result};
use crate::reader::{Direction, LineReader, DEFAULT_BLOCK_SIZE};
use crate::shard::{shard_path, shard_paths};

/// Directory-backed database driver for a single device.
pub struct DirectoryDriver<C: ValueCodec> {
    root: PathBuf,
    access_type: AccessType,
    encoding: Encoding,
    codec: C,
    block_size: usize,
    cache: ShardHandleCache,
    is_open: Cell<bool>,
}

impl<C: ValueCodec> DirectoryDriver<C> {
    pub fn new(root: impl Into<PathBuf>, access_type: AccessType, encoding: Encoding, codec: C) -> Self {
        Self {
            root: root.into(),
            access_type,
            encoding,
            codec,
            block_size: DEFAULT_BLOCK_SIZE,
            cache: ShardHandleCache::new(),
            is_open: Cell::new(false),
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn access_type(&self) -> AccessType {
        self.access_type
    }

    pub fn is_open(&self) -> bool {
        self.is_open.get()
    }

    pub(crate) fn cache(&self) -> &ShardHandleCache {
        &self.cache
    }

    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }

    pub(crate) fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub(crate) fn codec(&self) -> &C {
        &self.codec
    }

    /// Marks the driver live. Must be called before any other operation.
    pub fn open(&self) {
        self.is_open.set(true);
        trace!(root = %self.root.display(), access = %self.access_type, "driver opened");
    }

    /// Closes every cached file handle and marks the driver no longer
    /// live. Any [`Cursor`] obtained from this driver fails on its next
    /// iteration step after this call.
    pub fn close(&self) {
        self.cache.close_all();
        self.is_open.set(false);
        trace!(root = %self.root.display(), "driver closed");
    }

    /// Forces buffered writes to the OS for every cached handle. Does not
    /// fsync.
    pub fn flush(&self) -> Result<()> {
        self.require_open("flush")?;
        self.cache.flush_all()?;
        Ok(())
    }

    fn require_open(&self, op: &str) -> Result<()> {
        if !self.is_open.get() {
            return Err(Error::Usage(format!(
                "driver over {} is not open; cannot {op}",
                self.root.display()
            )));
        }
        Ok(())
    }

    fn require(&self, required: AccessType, op: &str) -> Result<()> {
        self.require_open(op)?;
        if !self.access_type.contains(required) {
            return Err(Error::Usage(format!(
                "driver over {} is not opened in a way that supports {op} (opened with {})",
                self.root.display(),
                self.access_type
            )));
        }
        Ok(())
    }

    /// Appends `(tick, value)` to the shard for `tick`'s date. O(1)
    /// amortised; does not check order against the current tail.
    #[instrument(skip(self, value), fields(root = %self.root.display()))]
    pub fn append(&self, tick: NaiveDateTime, value: &C::Value) -> Result<()> {
        self.require(AccessType::APPEND, "appending")?;
        let path = shard_path(&self.root, tick.date());
        let cells = self.codec.format_cells(value);
        let line = format_line(tick.time(), &cells);
        let bytes = self.encoding.encode(&line)?;
        self.cache
            .with_file(&path, FileMode::Append, true, |f| f.write_all(&bytes))?;
        trace!(shard = %path.display(), "appended measurement");
        Ok(())
    }

    /// Inserts `(tick, value)` into its shard in time-of-day order,
    /// rewriting the shard once via a sibling temporary file. Assumes the
    /// shard is already sorted (`spec.md` §4.5 precondition); behavior on
    /// an unsorted shard is undefined.
    #[instrument(skip(self, value), fields(root = %self.root.display()))]
    pub fn insert(&self, tick: NaiveDateTime, value: &C::Value) -> Result<()> {
        self.require(AccessType::WRITE, "inserting")?;
        let path = shard_path(&self.root, tick.date());
        let previous_mode = self.cache.mode_of(&path);

        self.cache.flush_all()?;
        let read_file = self.cache.open_read_clone(&path, true)?;

        let dir = path.parent().expect("shard path always has a parent");
        let mut tmp = TempFileBuilder::new()
            .prefix(".daylog-insert-")
            .tempfile_in(dir)?;

        let pivot_time = tick.time();
        let insert_line = self.encoding.encode(&format_line(pivot_time, &self.codec.format_cells(value)))?;

        let mut pivot_passed = false;
        let mut line_index = 0u64;

        for raw in LineReader::with_block_size(read_file, Direction::Forward, self.block_size)? {
            let raw = raw?;
            line_index += 1;
            let text = self.encoding.decode(&raw)?;

            if !is_data_line(&text) {
                self.write_verbatim(&mut tmp, &text)?;
                continue;
            }

            if pivot_passed {
                self.write_verbatim(&mut tmp, &text)?;
                continue;
            }

            let (line_time, cells) = parse_line_time(&text).map_err(|message| Error::Parse {
                shard: path.clone(),
                line: signed_line_number(line_index, false),
                message,
            })?;

            let _ = cells;
            if line_time > pivot_time {
                tmp.write_all(&insert_line)?;
                pivot_passed = true;
            }

            self.write_verbatim(&mut tmp, &text)?;
        }

        if !pivot_passed {
            tmp.write_all(&insert_line)?;
        }

        self.replace_shard(&path, tmp, previous_mode.unwrap_or(FileMode::Read))?;
        trace!(shard = %path.display(), "inserted measurement");
        Ok(())
    }

    fn write_verbatim(&self, out: &mut impl Write, text: &str) -> Result<()> {
        let mut line = text.to_string();
        line.push('\n');
        out.write_all(&self.encoding.encode(&line)?)?;
        Ok(())
    }

    /// Sorts every shard under the device root independently, using the
    /// recursive split-into-runs + k-way merge algorithm described in
    /// `spec.md` §4.5. Not stable: measurements sharing a timestamp may be
    /// reordered.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn sort(&self) -> Result<()> {
        self.require(AccessType::WRITE, "sorting")?;
        self.cache.flush_all()?;
        for path in shard_paths(&self.root)? {
            self.sort_shard(&path)?;
        }
        Ok(())
    }

    fn sort_shard(&self, path: &Path) -> Result<()> {
        let previous_mode = self.cache.mode_of(path);
        let dir = path.parent().expect("shard path always has a parent");
        let input = self.cache.open_read_clone(path, false)?;

        let mut runs = self.split_into_runs(input, path, dir)?;
        trace!(shard = %path.display(), runs = runs.len(), "split shard into sorted runs");

        let merged = self.merge_runs(&mut runs, path, dir)?;
        drop(runs); // each NamedTempFile deletes its run file on drop

        self.replace_shard(path, merged, previous_mode.unwrap_or(FileMode::Read))?;
        Ok(())
    }

    /// Phase 1: streams `input` forward, writing a strictly increasing
    /// run to a fresh temp file and any out-of-order leftovers to a
    /// second; recurses on the leftovers until none remain.
    fn split_into_runs(
        &self,
        mut input: File,
        shard: &Path,
        dir: &Path,
    ) -> Result<Vec<tempfile::NamedTempFile>> {
        input.seek(SeekFrom::Start(0))?;

        let mut sorted = TempFileBuilder::new().prefix(".daylog-sorted-").tempfile_in(dir)?;
        let mut unsorted = TempFileBuilder::new().prefix(".daylog-unsorted-").tempfile_in(dir)?;

        let mut last_time: Option<NaiveTime> = None;
        let mut has_unsorted = false;
        let mut line_index = 0u64;

        for raw in LineReader::with_block_size(input, Direction::Forward, self.block_size)? {
            let raw = raw?;
            line_index += 1;
            let text = self.encoding.decode(&raw)?;

            if !is_data_line(&text) {
                self.write_verbatim(sorted.as_file_mut(), &text)?;
                continue;
            }

            let (line_time, _cells) = parse_line_time(&text).map_err(|message| Error::Parse {
                shard: shard.to_path_buf(),
                line: signed_line_number(line_index, false),
                message,
            })?;

            let goes_in_sorted_run = match last_time {
                None => true,
                Some(last) => line_time > last,
            };

            if goes_in_sorted_run {
                self.write_verbatim(sorted.as_file_mut(), &text)?;
                last_time = Some(line_time);
            } else {
                self.write_verbatim(unsorted.as_file_mut(), &text)?;
                has_unsorted = true;
            }
        }

        let mut runs = vec![sorted];
        if has_unsorted {
            let mut unsorted_file = unsorted.as_file().try_clone()?;
            unsorted_file.seek(SeekFrom::Start(0))?;
            runs.extend(self.split_into_runs(unsorted_file, shard, dir)?);
        }
        // `unsorted` (if not recursed into further) is dropped here, deleting its
        // temp file; if it was recursed into, this drop still only removes the
        // now-fully-consumed leftovers file itself, not the runs it produced.

        Ok(runs)
    }

    /// Phase 2: merges `runs` (each already strictly increasing) by
    /// ascending time-of-day into one fresh temp file in `dir`.
    fn merge_runs(
        &self,
        runs: &mut [tempfile::NamedTempFile],
        shard: &Path,
        dir: &Path,
    ) -> Result<tempfile::NamedTempFile> {
        type Source = std::iter::Peekable<LineReader<File>>;

        let mut sources: Vec<Source> = runs
            .iter()
            .map(|run| -> Result<Source> {
                let mut file = run.as_file().try_clone()?;
                file.seek(SeekFrom::Start(0))?;
                let reader = LineReader::with_block_size(file, Direction::Forward, self.block_size)?;
                Ok(reader.peekable())
            })
            .collect::<Result<Vec<Source>>>()?;

        let mut merged = TempFileBuilder::new().prefix(".daylog-merged-").tempfile_in(dir)?;
        let mut total = 0usize;

        loop {
            // Comment/blank heads carry no ordering key; flush every such
            // head straight through before picking the next timestamp.
            let mut progressed = true;
            while progressed {
                progressed = false;
                for source in sources.iter_mut() {
                    let Some(raw) = peek_raw(source)? else { continue };
                    let text = self.encoding.decode(&raw)?;
                    if !is_data_line(&text) {
                        source.next();
                        self.write_verbatim(merged.as_file_mut(), &text)?;
                        progressed = true;
                    }
                }
            }

            let mut best: Option<(usize, NaiveTime)> = None;
            for (idx, source) in sources.iter_mut().enumerate() {
                let Some(raw) = peek_raw(source)? else { continue };
                let text = self.encoding.decode(&raw)?;
                let (time, _) = parse_line_time(&text).map_err(|message| Error::Parse {
                    shard: shard.to_path_buf(),
                    line: signed_line_number(total as u64 + 1, false),
                    message,
                })?;
                if best.map(|(_, best_time)| time < best_time).unwrap_or(true) {
                    best = Some((idx, time));
                }
            }

            let Some((idx, _)) = best else { break };
            let raw = sources[idx].next().unwrap()?;
            merged.as_file_mut().write_all(&raw)?;
            merged.as_file_mut().write_all(b"\n")?;
            total += 1;
        }

        trace!(lines = total, "merged sorted runs");
        Ok(merged)
    }

    /// Common tail of `insert`/`sort`: flushes and renames `replacement`
    /// over `path`, then reopens the cache entry in `mode` (§4.5 step 5).
    fn replace_shard(
        &self,
        path: &Path,
        replacement: tempfile::NamedTempFile,
        mode: FileMode,
    ) -> Result<()> {
        replacement.as_file().sync_data()?;
        replacement.persist(path).map_err(|e| e.error)?;
        self.cache.replace(path, mode)?;
        Ok(())
    }

    /// Validates `start <= stop` and returns a lazy cursor over the
    /// half-open interval `[start, stop)`.
    pub fn query_interval(&self, start: NaiveDateTime, stop: NaiveDateTime) -> Result<Cursor<'_, C>> {
        self.require(AccessType::READ, "reading")?;
        Cursor::new(self, start, stop)
    }
}

/// Clones the next raw line off `source` without consuming it, surfacing
/// any I/O error eagerly (by consuming the errored slot) rather than on
/// a later `peek`.
fn peek_raw<R: std::io::Read + Seek>(
    source: &mut std::iter::Peekable<LineReader<R>>,
) -> Result<Option<Vec<u8>>> {
    match source.peek() {
        Some(Ok(raw)) => Ok(Some(raw.clone())),
        Some(Err(_)) => Err(source.next().expect("just peeked Some").unwrap_err().into()),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FloatCodec;
    use chrono::{Duration, NaiveDate};

    fn driver(dir: &Path) -> DirectoryDriver<FloatCodec> {
        let d = DirectoryDriver::new(dir, AccessType::WRITE | AccessType::READ, Encoding::Utf8, FloatCodec);
        d.open();
        d
    }

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, mi, s).unwrap()
    }

    #[test]
    fn append_then_query_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let drv = driver(dir.path());
        let tick = dt(2020, 4, 1, 12, 0, 0);
        drv.append(tick, &vec![1.5, 2.5]).unwrap();

        let cursor = drv.query_interval(dt(2020, 4, 1, 0, 0, 0), dt(2020, 4, 2, 0, 0, 0)).unwrap();
        let rows: Vec<_> = cursor.iter().collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![(tick, vec![1.5, 2.5])]);
    }

    #[test]
    fn insert_places_new_line_before_first_greater_time() {
        let dir = tempfile::tempdir().unwrap();
        let drv = driver(dir.path());

        let tick1 = dt(2020, 2, 15, 11, 57, 35);
        let tick2 = dt(2020, 2, 15, 12, 1, 20);
        let insert_tick = dt(2020, 2, 15, 12, 0, 5);
        let data = vec![3.25];

        drv.append(tick1, &data).unwrap();
        drv.append(tick2, &data).unwrap();
        drv.insert(insert_tick, &data).unwrap();

        let cursor = drv
            .query_interval(tick1, tick2 + Duration::seconds(1))
            .unwrap();
        let rows: Vec<_> = cursor.iter().collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![(tick1, data.clone()), (insert_tick, data.clone()), (tick2, data)]);
    }

    #[test]
    fn sort_recovers_order_from_shuffled_appends() {
        let dir = tempfile::tempdir().unwrap();
        let drv = driver(dir.path());
        let date = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();

        let offsets = [50, 10, 40, 0, 30, 20];
        for &s in &offsets {
            drv.append(date.and_hms_opt(0, 0, s).unwrap(), &vec![s as f64]).unwrap();
        }

        drv.sort().unwrap();

        let cursor = drv
            .query_interval(date.and_hms_opt(0, 0, 0).unwrap(), date.and_hms_opt(23, 59, 59).unwrap())
            .unwrap();
        let values: Vec<f64> = cursor.iter().map(|r| r.unwrap().1[0]).collect();
        assert_eq!(values, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn reverse_iteration_is_exact_reverse_of_forward() {
        let dir = tempfile::tempdir().unwrap();
        let drv = driver(dir.path());
        let date = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();

        for s in 0..10 {
            drv.append(date.and_hms_opt(0, 0, s).unwrap(), &vec![s as f64]).unwrap();
        }

        let start = date.and_hms_opt(0, 0, 0).unwrap();
        let stop = date.and_hms_opt(0, 0, 9).unwrap();
        let cursor = drv.query_interval(start, stop).unwrap();

        let forward: Vec<_> = cursor.iter().collect::<Result<_>>().unwrap();
        let mut reverse: Vec<_> = cursor.iter_rev().collect::<Result<_>>().unwrap();
        reverse.reverse();
        assert_eq!(forward, reverse);
    }

    #[test]
    fn query_spanning_two_days_reads_both_shards() {
        let dir = tempfile::tempdir().unwrap();
        let drv = driver(dir.path());

        drv.append(dt(2020, 4, 1, 23, 59, 0), &vec![1.0]).unwrap();
        drv.append(dt(2020, 4, 2, 0, 1, 0), &vec![2.0]).unwrap();

        let cursor = drv.query_interval(dt(2020, 4, 1, 0, 0, 0), dt(2020, 4, 2, 12, 0, 0)).unwrap();
        let rows: Vec<_> = cursor.iter().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn stop_equal_to_start_is_always_empty() {
        let dir = tempfile::tempdir().unwrap();
        let drv = driver(dir.path());
        let tick = dt(2020, 4, 1, 12, 0, 0);
        drv.append(tick, &vec![1.0]).unwrap();

        let cursor = drv.query_interval(tick, tick).unwrap();
        assert!(cursor.iter().next().is_none());
    }

    #[test]
    fn append_without_append_access_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let drv = DirectoryDriver::new(dir.path(), AccessType::READ, Encoding::Utf8, FloatCodec);
        drv.open();
        let err = drv.append(dt(2020, 1, 1, 0, 0, 0), &vec![1.0]).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn operating_on_a_closed_driver_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let drv = DirectoryDriver::new(dir.path(), AccessType::WRITE, Encoding::Utf8, FloatCodec);
        assert!(matches!(drv.append(dt(2020, 1, 1, 0, 0, 0), &vec![1.0]), Err(Error::Usage(_))));
    }
}
