// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;
use std::io;
use std::io::{Read, Seek, SeekFrom};

use super::{MediaSource, ReadBytes};

const BUFFER_LEN: usize = 8 * 1024;

/// A `MediaSourceStream` is a buffered, position-tracking stream over a [`MediaSource`].
///
/// The buffer is invalidated on every out-of-buffer seek, so random access is cheap only when the
/// underlying source seeks cheaply. The absolute stream position reported by [`ReadBytes::pos`] is
/// always exact, whether the last operation was a read or a seek.
pub struct MediaSourceStream {
    /// The source of all reads and seeks.
    inner: Box<dyn MediaSource>,
    /// The read-ahead buffer.
    buf: Box<[u8]>,
    /// The number of valid bytes in the buffer.
    end: usize,
    /// The next byte of the buffer to consume.
    cursor: usize,
    /// The absolute stream position of the first byte of the buffer.
    base: u64,
}

impl MediaSourceStream {
    /// Instantiate a new `MediaSourceStream` over the given source.
    pub fn new(inner: Box<dyn MediaSource>) -> Self {
        MediaSourceStream {
            inner,
            buf: vec![0u8; BUFFER_LEN].into_boxed_slice(),
            end: 0,
            cursor: 0,
            base: 0,
        }
    }

    /// Returns if the underlying source is seekable.
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// Returns the total length of the underlying source in bytes, if known.
    pub fn byte_len(&self) -> Option<u64> {
        self.inner.byte_len()
    }

    /// Destroys the stream and returns the underlying source.
    pub fn into_inner(self) -> Box<dyn MediaSource> {
        self.inner
    }

    /// Refill the buffer if it is fully consumed. Returns the number of readable bytes, which is
    /// 0 at the end of the stream.
    fn fetch(&mut self) -> io::Result<usize> {
        if self.cursor == self.end {
            self.base += self.end as u64;
            self.cursor = 0;
            self.end = self.inner.read(&mut self.buf)?;
        }
        Ok(self.end - self.cursor)
    }
}

impl ReadBytes for MediaSourceStream {
    fn read_byte(&mut self) -> io::Result<u8> {
        if self.fetch()? < 1 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        self.cursor += 1;
        Ok(self.buf[self.cursor - 1])
    }

    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]> {
        let mut bytes = [0u8; 2];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]> {
        let mut bytes = [0u8; 4];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut written = 0;
        while written < buf.len() {
            if self.fetch()? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            let count = cmp::min(buf.len() - written, self.end - self.cursor);
            buf[written..written + count].copy_from_slice(&self.buf[self.cursor..self.cursor + count]);
            self.cursor += count;
            written += count;
        }
        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        // Consume out of the buffer when possible, otherwise seek (or read-and-discard for an
        // unseekable source).
        let buffered = (self.end - self.cursor) as u64;
        if count <= buffered {
            self.cursor += count as usize;
            Ok(())
        }
        else if self.inner.is_seekable() {
            self.seek(SeekFrom::Current((count - buffered) as i64)).map(|_| ())
        }
        else {
            self.cursor = self.end;
            let mut remaining = count - buffered;
            while remaining > 0 {
                if self.fetch()? == 0 {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                let discard = cmp::min(remaining, (self.end - self.cursor) as u64);
                self.cursor += discard as usize;
                remaining -= discard;
            }
            Ok(())
        }
    }

    fn pos(&self) -> u64 {
        self.base + self.cursor as u64
    }
}

impl Read for MediaSourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fetch()?;
        let count = cmp::min(buf.len(), available);
        buf[..count].copy_from_slice(&self.buf[self.cursor..self.cursor + count]);
        self.cursor += count;
        Ok(count)
    }
}

impl Seek for MediaSourceStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => {
                let pos = self.pos();
                if delta.is_negative() {
                    pos.checked_sub(delta.unsigned_abs())
                        .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?
                }
                else {
                    pos + delta as u64
                }
            }
            SeekFrom::End(_) => {
                let target = self.inner.seek(pos)?;
                self.base = target;
                self.cursor = 0;
                self.end = 0;
                return Ok(target);
            }
        };

        // A target within the buffered window does not require touching the source.
        if target >= self.base && target <= self.base + self.end as u64 {
            self.cursor = (target - self.base) as usize;
        }
        else {
            self.inner.seek(SeekFrom::Start(target))?;
            self.base = target;
            self.cursor = 0;
            self.end = 0;
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::io::{Seek, SeekFrom};

    use super::MediaSourceStream;
    use crate::io::ReadBytes;

    fn make_stream(len: u8) -> MediaSourceStream {
        let data: Vec<u8> = (0..len).collect();
        MediaSourceStream::new(Box::new(Cursor::new(data)))
    }

    #[test]
    fn verify_read_and_pos() {
        let mut mss = make_stream(16);
        assert_eq!(mss.read_byte().unwrap(), 0);
        assert_eq!(mss.read_be_u16().unwrap(), 0x0102);
        assert_eq!(mss.pos(), 3);
        mss.ignore_bytes(4).unwrap();
        assert_eq!(mss.read_byte().unwrap(), 7);
    }

    #[test]
    fn verify_seek_restores_position() {
        let mut mss = make_stream(64);
        mss.ignore_bytes(10).unwrap();
        mss.seek(SeekFrom::Start(2)).unwrap();
        assert_eq!(mss.pos(), 2);
        assert_eq!(mss.read_byte().unwrap(), 2);
        mss.seek(SeekFrom::Current(1)).unwrap();
        assert_eq!(mss.read_byte().unwrap(), 4);
        let end = mss.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(end, 64);
        assert!(mss.read_byte().is_err());
    }

    #[test]
    fn verify_eof() {
        let mut mss = make_stream(2);
        assert!(mss.read_quad_bytes().is_err());
    }
}
