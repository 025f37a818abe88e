//! Line framing over non-blocking descriptors.
//!
//! A message is a sequence of bytes terminated by `\n`. Readers accumulate
//! whatever the descriptor has and hand out complete lines; writers append
//! the terminator and drain until the descriptor would block.

use std::fs::File;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::fd::{wait_ready, Readiness};

const READ_CHUNK: usize = 16 * 1024;

/// Accumulates bytes from a descriptor and splits them into lines.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    buf: Vec<u8>,
    /// Bytes before this offset are known not to contain `\n`.
    scanned: usize,
    eof: bool,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from `reader` until it would block or reaches end of file.
    ///
    /// Returns the number of bytes appended.
    pub fn fill_from<R: Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    fn newline_position(&mut self) -> Option<usize> {
        match self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(offset) => Some(self.scanned + offset),
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    /// Whether a complete line is buffered.
    pub fn has_line(&mut self) -> bool {
        self.newline_position().is_some()
    }

    /// Remove and return the next complete line, without its terminator.
    ///
    /// Bytes after the terminator stay buffered for the next call.
    pub fn take_line(&mut self) -> io::Result<Option<String>> {
        let Some(end) = self.newline_position() else {
            return Ok(None);
        };
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        line.pop();
        self.scanned = 0;
        String::from_utf8(line)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// The reader reported end of file.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Bytes buffered but not yet returned as a line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Wait for and return one complete line from `file`.
    ///
    /// Readiness is awaited in slices of `interval`. End of file before a
    /// full line arrives is an `UnexpectedEof` error.
    pub fn block_read_line(&mut self, file: &File, interval: Duration) -> io::Result<String> {
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(line);
            }
            if self.eof {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("pipe closed with {} bytes of partial line", self.buf.len()),
                ));
            }
            if wait_ready(file, Readiness::Read, interval)? {
                self.fill_from(file)?;
            }
        }
    }
}

/// One outgoing message and how much of it has reached the descriptor.
///
/// Dropping the buffer syncs the descriptor. Pipes reject fsync, so the
/// result is ignored.
#[derive(Debug)]
pub struct WriteBuffer<'a> {
    file: &'a File,
    buf: Vec<u8>,
    pos: usize,
}

impl<'a> WriteBuffer<'a> {
    /// Frame `message` for `file`.
    ///
    /// # Errors
    ///
    /// A message containing `\n` would split into two frames and is
    /// rejected as `InvalidInput`.
    pub fn new(file: &'a File, message: &str) -> io::Result<Self> {
        if message.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "message contains a raw newline",
            ));
        }
        let mut buf = Vec::with_capacity(message.len() + 1);
        buf.extend_from_slice(message.as_bytes());
        buf.push(b'\n');
        Ok(Self { file, buf, pos: 0 })
    }

    /// Write until the descriptor would block or the message is done.
    ///
    /// Returns the number of bytes written by this call.
    pub fn flush_to_fd(&mut self) -> io::Result<usize> {
        let start = self.pos;
        let mut file = self.file;
        while self.pos < self.buf.len() {
            match file.write(&self.buf[self.pos..]) {
                Ok(0) => break,
                Ok(n) => self.pos += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(self.pos - start)
    }

    /// Bytes not yet written.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Write the whole message, waiting for writability in slices of `interval`.
    pub fn block_write(&mut self, interval: Duration) -> io::Result<()> {
        self.flush_to_fd()?;
        while self.remaining() > 0 {
            if wait_ready(self.file, Readiness::Write, interval)? {
                self.flush_to_fd()?;
            }
        }
        Ok(())
    }
}

impl Drop for WriteBuffer<'_> {
    fn drop(&mut self) {
        let _ = self.file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd::{create_pipe, set_nonblocking};
    use std::os::fd::AsRawFd;
    use std::thread;

    const SLICE: Duration = Duration::from_millis(20);

    fn nonblocking_pipe() -> (File, File) {
        let (read_end, write_end) = create_pipe().unwrap();
        set_nonblocking(read_end.as_raw_fd()).unwrap();
        set_nonblocking(write_end.as_raw_fd()).unwrap();
        (File::from(read_end), File::from(write_end))
    }

    #[test]
    fn splits_lines_and_keeps_remainder() {
        let (reader, mut writer) = nonblocking_pipe();
        writer.write_all(b"first\nsecond\nthi").unwrap();

        let mut buffer = ReadBuffer::new();
        assert_eq!(buffer.fill_from(&reader).unwrap(), 16);
        assert!(buffer.has_line());
        assert_eq!(buffer.take_line().unwrap().as_deref(), Some("first"));
        assert_eq!(buffer.take_line().unwrap().as_deref(), Some("second"));
        assert!(!buffer.has_line());
        assert_eq!(buffer.take_line().unwrap(), None);
        assert_eq!(buffer.pending(), 3);

        writer.write_all(b"rd\n").unwrap();
        buffer.fill_from(&reader).unwrap();
        assert_eq!(buffer.take_line().unwrap().as_deref(), Some("third"));
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn empty_line_is_a_line() {
        let (reader, mut writer) = nonblocking_pipe();
        writer.write_all(b"\n").unwrap();
        let mut buffer = ReadBuffer::new();
        buffer.fill_from(&reader).unwrap();
        assert_eq!(buffer.take_line().unwrap().as_deref(), Some(""));
    }

    #[test]
    fn fill_stops_when_pipe_is_empty() {
        let (reader, _writer) = nonblocking_pipe();
        let mut buffer = ReadBuffer::new();
        assert_eq!(buffer.fill_from(&reader).unwrap(), 0);
        assert!(!buffer.is_eof());
    }

    #[test]
    fn fill_notices_closed_writer() {
        let (reader, writer) = nonblocking_pipe();
        drop(writer);
        let mut buffer = ReadBuffer::new();
        buffer.fill_from(&reader).unwrap();
        assert!(buffer.is_eof());
    }

    #[test]
    fn block_read_waits_for_late_line() {
        let (reader, writer) = nonblocking_pipe();
        let handle = thread::spawn(move || {
            let mut writer = writer;
            thread::sleep(Duration::from_millis(60));
            writer.write_all(b"par").unwrap();
            thread::sleep(Duration::from_millis(30));
            writer.write_all(b"tial\n").unwrap();
            writer
        });

        let mut buffer = ReadBuffer::new();
        let line = buffer.block_read_line(&reader, SLICE).unwrap();
        assert_eq!(line, "partial");
        handle.join().unwrap();
    }

    #[test]
    fn block_read_reports_eof_before_line() {
        let (reader, mut writer) = nonblocking_pipe();
        writer.write_all(b"no terminator").unwrap();
        drop(writer);

        let mut buffer = ReadBuffer::new();
        let err = buffer.block_read_line(&reader, SLICE).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn invalid_utf8_is_invalid_data() {
        let (reader, mut writer) = nonblocking_pipe();
        writer.write_all(&[0xff, 0xfe, b'\n']).unwrap();
        let mut buffer = ReadBuffer::new();
        buffer.fill_from(&reader).unwrap();
        let err = buffer.take_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn write_appends_single_terminator() {
        let (reader, writer) = nonblocking_pipe();
        let mut out = WriteBuffer::new(&writer, "hello").unwrap();
        assert_eq!(out.remaining(), 6);
        out.block_write(SLICE).unwrap();
        assert_eq!(out.remaining(), 0);
        drop(out);

        let mut buffer = ReadBuffer::new();
        buffer.fill_from(&reader).unwrap();
        assert_eq!(buffer.take_line().unwrap().as_deref(), Some("hello"));
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn raw_newline_is_rejected() {
        let (_reader, writer) = nonblocking_pipe();
        let err = WriteBuffer::new(&writer, "two\nframes").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn message_larger_than_pipe_capacity() {
        let (reader, writer) = nonblocking_pipe();
        let message = "x".repeat(1 << 20);
        let expected = message.clone();

        let drain = thread::spawn(move || {
            let mut buffer = ReadBuffer::new();
            buffer.block_read_line(&reader, SLICE).unwrap()
        });

        let mut out = WriteBuffer::new(&writer, &message).unwrap();
        out.block_write(SLICE).unwrap();
        drop(out);

        assert_eq!(drain.join().unwrap(), expected);
    }
}
