//! Query cursor (C6).
//!
//! A lazy, reversible sequence over one or more shards defined by a
//! datetime half-open interval. Construction splits `[start, stop)` into
//! one `(date, start_time_of_day, stop_time_of_day)` triple per calendar
//! day spanned, exactly as `Cursor.from_range` does in
//! `examples/original_source/taransaydb/driver.py`.

use std::fs::File;
use std::io;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::codec::{is_data_line, parse_line_time, ValueCodec};
use crate::driver::DirectoryDriver;
use crate::error::{signed_line_number, Error, Result};
use crate::reader::{Direction, LineReader};
use crate::shard::shard_path;

/// The latest representable time-of-day, used as the inclusive upper
/// bound for every shard except the one containing `stop`.
pub fn max_time_of_day() -> NaiveTime {
    NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).expect("valid time")
}

#[derive(Debug, Clone, Copy)]
struct ShardWindow {
    date: NaiveDate,
    start: NaiveTime,
    stop: NaiveTime,
}

/// Query result cursor, bound to the driver that produced it.
pub struct Cursor<'a, C: ValueCodec> {
    driver: &'a DirectoryDriver<C>,
    windows: Vec<ShardWindow>,
}

impl<'a, C: ValueCodec> Cursor<'a, C> {
    pub(crate) fn new(
        driver: &'a DirectoryDriver<C>,
        start: NaiveDateTime,
        stop: NaiveDateTime,
    ) -> Result<Self> {
        if start > stop {
            return Err(Error::range(start, stop));
        }

        let start_date = start.date();
        let stop_date = stop.date();
        let mut windows = Vec::new();
        let mut date = start_date;

        loop {
            let window_start = if date == start_date { start.time() } else { NaiveTime::MIN };
            let window_stop = if date == stop_date { stop.time() } else { max_time_of_day() };
            windows.push(ShardWindow {
                date,
                start: window_start,
                stop: window_stop,
            });
            if date == stop_date {
                break;
            }
            date += Duration::days(1);
        }

        Ok(Self { driver, windows })
    }

    /// Iterates the cursor's measurements in ascending time order.
    pub fn iter(&self) -> CursorIter<'a, '_, C> {
        CursorIter::new(self.driver, &self.windows, Direction::Forward)
    }

    /// Iterates the cursor's measurements in descending time order. Exact
    /// reverse of [`Cursor::iter`] on the same data (`spec.md` §8,
    /// "Reverse symmetry").
    pub fn iter_rev(&self) -> CursorIter<'a, '_, C> {
        CursorIter::new(self.driver, &self.windows, Direction::Reverse)
    }
}

impl<'a, 'c, C: ValueCodec> IntoIterator for &'c Cursor<'a, C> {
    type Item = Result<(NaiveDateTime, C::Value)>;
    type IntoIter = CursorIter<'a, 'c, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

struct ActiveShard {
    reader: LineReader<File>,
    path: PathBuf,
    date: NaiveDate,
    start: NaiveTime,
    stop: NaiveTime,
    line_index: u64,
}

/// Iterator driving one pass (forward or reverse) over a cursor's shards.
pub struct CursorIter<'a, 'c, C: ValueCodec> {
    driver: &'a DirectoryDriver<C>,
    windows: Vec<ShardWindow>,
    direction: Direction,
    next_window: usize,
    active: Option<ActiveShard>,
    _marker: std::marker::PhantomData<&'c ()>,
}

impl<'a, 'c, C: ValueCodec> CursorIter<'a, 'c, C> {
    fn new(driver: &'a DirectoryDriver<C>, windows: &[ShardWindow], direction: Direction) -> Self {
        let mut ordered = windows.to_vec();
        if direction == Direction::Reverse {
            ordered.reverse();
        }
        Self {
            driver,
            windows: ordered,
            direction,
            next_window: 0,
            active: None,
            _marker: std::marker::PhantomData,
        }
    }

    fn advance_shard(&mut self) -> Option<Result<()>> {
        loop {
            let window = *self.windows.get(self.next_window)?;
            self.next_window += 1;

            let path = shard_path(self.driver.root(), window.date);
            match self.driver.cache().open_read_clone(&path, false) {
                Ok(file) => {
                    let reader =
                        match LineReader::with_block_size(file, self.direction, self.driver.block_size())
                        {
                            Ok(r) => r,
                            Err(e) => return Some(Err(Error::Io(e))),
                        };
                    self.active = Some(ActiveShard {
                        reader,
                        path,
                        date: window.date,
                        start: window.start,
                        stop: window.stop,
                        line_index: 0,
                    });
                    return Some(Ok(()));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Some(Err(Error::Io(e))),
            }
        }
    }
}

impl<'a, 'c, C: ValueCodec> Iterator for CursorIter<'a, 'c, C> {
    type Item = Result<(NaiveDateTime, C::Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.driver.is_open() {
                return Some(Err(Error::Usage(
                    "cursor's driver has been closed".to_string(),
                )));
            }

            if self.active.is_none() {
                match self.advance_shard() {
                    None => return None,
                    Some(Err(e)) => return Some(Err(e)),
                    Some(Ok(())) => {}
                }
            }

            let shard = self.active.as_mut().expect("just ensured");
            match shard.reader.next() {
                None => {
                    self.active = None;
                    continue;
                }
                Some(Err(e)) => return Some(Err(Error::Io(e))),
                Some(Ok(raw)) => {
                    shard.line_index += 1;
                    let text = match self.driver.encoding().decode(&raw) {
                        Ok(t) => t,
                        Err(e) => return Some(Err(e)),
                    };
                    if !is_data_line(&text) {
                        continue;
                    }

                    let reverse = self.direction == Direction::Reverse;
                    let (line_time, cells) = match parse_line_time(&text) {
                        Ok(v) => v,
                        Err(message) => {
                            return Some(Err(Error::Parse {
                                shard: shard.path.clone(),
                                line: signed_line_number(shard.line_index, reverse),
                                message,
                            }))
                        }
                    };

                    let stop_shard = if reverse {
                        line_time < shard.start
                    } else {
                        line_time >= shard.stop
                    };
                    if stop_shard {
                        self.active = None;
                        continue;
                    }

                    let skip = if reverse {
                        line_time >= shard.stop
                    } else {
                        line_time < shard.start
                    };
                    if skip {
                        continue;
                    }

                    let date = shard.date;
                    let line_index = shard.line_index;
                    let path = shard.path.clone();
                    match self.driver.codec().parse_cells(cells) {
                        Ok(value) => {
                            let dt = NaiveDateTime::new(date, line_time);
                            return Some(Ok((dt, value)));
                        }
                        Err(message) => {
                            return Some(Err(Error::Parse {
                                shard: path,
                                line: signed_line_number(line_index, reverse),
                                message,
                            }))
                        }
                    }
                }
            }
        }
    }
}
