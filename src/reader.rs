//! Block line reader (C2).
//!
//! Streams the lines of a seekable byte stream forward or backward in
//! fixed-size block reads, so a shard of any size can be scanned in
//! constant memory and reverse iteration costs the same as forward.
//! Ported from the remainder-carrying algorithm in `taransaydb`'s
//! `_read_lines` (`examples/original_source/taransaydb/driver.py`).

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};

pub const DEFAULT_BLOCK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Lazy, reversible iterator over the complete lines (newline excluded) of
/// a seekable byte stream. Yields raw bytes; callers decode with the
/// shard's configured [`crate::encoding::Encoding`].
pub struct LineReader<R> {
    inner: R,
    block_size: usize,
    direction: Direction,
    offset: u64,
    len: u64,
    remainder: Vec<u8>,
    finished: bool,
    pending: VecDeque<Vec<u8>>,
}

impl<R: Read + Seek> LineReader<R> {
    pub fn new(inner: R, direction: Direction) -> io::Result<Self> {
        Self::with_block_size(inner, direction, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(
        mut inner: R,
        direction: Direction,
        block_size: usize,
    ) -> io::Result<Self> {
        assert!(block_size > 0, "block size must be positive");
        let len = inner.seek(SeekFrom::End(0))?;
        let offset = match direction {
            Direction::Forward => 0,
            Direction::Reverse => len,
        };
        Ok(Self {
            inner,
            block_size,
            direction,
            offset,
            len,
            remainder: Vec::new(),
            finished: false,
            pending: VecDeque::new(),
        })
    }

    fn next_block(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.direction {
            Direction::Forward => {
                if self.offset >= self.len {
                    return Ok(None);
                }
                self.inner.seek(SeekFrom::Start(self.offset))?;
                let to_read = self.block_size.min((self.len - self.offset) as usize);
                let mut buf = vec![0u8; to_read];
                self.inner.read_exact(&mut buf)?;
                self.offset += to_read as u64;
                Ok(Some(buf))
            }
            Direction::Reverse => {
                if self.offset == 0 {
                    return Ok(None);
                }
                let block_size = self.block_size.min(self.offset as usize);
                self.offset -= block_size as u64;
                self.inner.seek(SeekFrom::Start(self.offset))?;
                let mut buf = vec![0u8; block_size];
                self.inner.read_exact(&mut buf)?;
                Ok(Some(buf))
            }
        }
    }

    /// Pulls blocks until at least one complete line is ready to yield, or
    /// the stream (and its final remainder) is exhausted.
    fn fill_pending(&mut self) -> io::Result<()> {
        while self.pending.is_empty() && !self.finished {
            match self.next_block()? {
                None => {
                    self.finished = true;
                    if !self.remainder.is_empty() {
                        self.pending.push_back(std::mem::take(&mut self.remainder));
                    }
                }
                Some(block) => {
                    let mut lines = split_on_newline(&block);
                    match self.direction {
                        Direction::Forward => {
                            if !self.remainder.is_empty() {
                                let mut combined = std::mem::take(&mut self.remainder);
                                combined.extend_from_slice(&lines[0]);
                                lines[0] = combined;
                            }
                            // The last fragment may straddle into the next block.
                            self.remainder = lines.pop().expect("split yields >= 1 element");
                            for line in lines {
                                if !line.is_empty() {
                                    self.pending.push_back(line);
                                }
                            }
                        }
                        Direction::Reverse => {
                            if !self.remainder.is_empty() {
                                if let Some(last) = lines.last_mut() {
                                    last.extend_from_slice(&self.remainder);
                                }
                            }
                            // The first fragment may straddle into the preceding block.
                            self.remainder = lines.remove(0);
                            for line in lines.into_iter().rev() {
                                if !line.is_empty() {
                                    self.pending.push_back(line);
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl<R: Read + Seek> Iterator for LineReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.fill_pending() {
            return Some(Err(e));
        }
        self.pending.pop_front().map(Ok)
    }
}

fn split_on_newline(block: &[u8]) -> Vec<Vec<u8>> {
    block.split(|&b| b == b'\n').map(<[u8]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lines(bytes: &[u8], direction: Direction, block_size: usize) -> Vec<String> {
        LineReader::with_block_size(Cursor::new(bytes.to_vec()), direction, block_size)
            .unwrap()
            .map(|r| String::from_utf8(r.unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn forward_reads_every_line_once() {
        let data = b"one\ntwo\nthree\n";
        assert_eq!(lines(data, Direction::Forward, 4), vec!["one", "two", "three"]);
    }

    #[test]
    fn reverse_is_exact_reverse_of_forward() {
        let data = b"one\ntwo\nthree\nfour\nfive\n";
        for block_size in [1, 2, 3, 4, 8192] {
            let fwd = lines(data, Direction::Forward, block_size);
            let mut rev = lines(data, Direction::Reverse, block_size);
            rev.reverse();
            assert_eq!(fwd, rev, "block_size={block_size}");
        }
    }

    #[test]
    fn skips_blank_lines() {
        let data = b"one\n\ntwo\n\n\nthree\n";
        assert_eq!(lines(data, Direction::Forward, 8192), vec!["one", "two", "three"]);
    }

    #[test]
    fn handles_missing_trailing_newline() {
        let data = b"one\ntwo\nthree";
        assert_eq!(lines(data, Direction::Forward, 8192), vec!["one", "two", "three"]);
    }

    #[test]
    fn reverse_handles_missing_trailing_newline() {
        let data = b"one\ntwo\nthree";
        let mut rev = lines(data, Direction::Reverse, 3);
        rev.reverse();
        assert_eq!(rev, vec!["one", "two", "three"]);
    }

    #[test]
    fn empty_stream_yields_nothing() {
        assert!(lines(b"", Direction::Forward, 8192).is_empty());
        assert!(lines(b"", Direction::Reverse, 8192).is_empty());
    }
}
