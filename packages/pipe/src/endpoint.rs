//! The child's side of the two pipes.

use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use procbridge_core::{Error, Result};

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::fd::{is_open, set_nonblocking};

/// Request and response pipes as seen from inside a spawned child.
///
/// The read buffer persists across calls, so lines that arrive together are
/// handed out one at a time.
#[derive(Debug)]
pub struct ChildEndpoint {
    requests: File,
    responses: File,
    buffer: ReadBuffer,
    poll_interval: Duration,
}

impl ChildEndpoint {
    /// Adopt the descriptors named by the last two command-line arguments.
    pub fn from_args(request_fd: &str, response_fd: &str, poll_interval: Duration) -> Result<Self> {
        let request_fd = parse_fd(request_fd)?;
        let response_fd = parse_fd(response_fd)?;
        if request_fd == response_fd {
            return Err(Error::protocol(format!(
                "request and response descriptors are both {}",
                request_fd
            )));
        }
        for fd in [request_fd, response_fd] {
            if !is_open(fd) {
                return Err(Error::protocol(format!("descriptor {} is not open", fd)));
            }
        }
        // SAFETY: the parent handed these descriptors to this process for its
        // exclusive use; both were checked to be open and distinct.
        let (requests, responses) =
            unsafe { (OwnedFd::from_raw_fd(request_fd), OwnedFd::from_raw_fd(response_fd)) };
        Self::new(requests, responses, poll_interval)
    }

    /// Wrap descriptors the caller already owns.
    pub fn new(requests: OwnedFd, responses: OwnedFd, poll_interval: Duration) -> Result<Self> {
        set_nonblocking(requests.as_raw_fd())?;
        set_nonblocking(responses.as_raw_fd())?;
        Ok(Self {
            requests: File::from(requests),
            responses: File::from(responses),
            buffer: ReadBuffer::new(),
            poll_interval,
        })
    }

    /// Block until the parent sends a line.
    ///
    /// A closed request pipe is an `Io` error of kind `UnexpectedEof`.
    pub fn read_line(&mut self) -> Result<String> {
        Ok(self.buffer.block_read_line(&self.requests, self.poll_interval)?)
    }

    /// Send one line to the parent.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        let mut out = WriteBuffer::new(&self.responses, line)?;
        out.block_write(self.poll_interval)?;
        Ok(())
    }
}

fn parse_fd(arg: &str) -> Result<RawFd> {
    arg.parse::<RawFd>()
        .ok()
        .filter(|fd| *fd >= 0)
        .ok_or_else(|| Error::protocol(format!("invalid descriptor argument: {:?}", arg)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd::create_pipe;
    use std::io::{self, Read, Write};

    const SLICE: Duration = Duration::from_millis(10);

    #[test]
    fn reads_batched_lines_one_at_a_time() {
        let (request_read, request_write) = create_pipe().unwrap();
        let (response_read, response_write) = create_pipe().unwrap();
        let mut endpoint = ChildEndpoint::new(request_read, response_write, SLICE).unwrap();

        let mut parent = File::from(request_write);
        parent.write_all(b"[1, 2]\n0\n-1\n").unwrap();

        assert_eq!(endpoint.read_line().unwrap(), "[1, 2]");
        assert_eq!(endpoint.read_line().unwrap(), "0");
        assert_eq!(endpoint.read_line().unwrap(), "-1");

        endpoint.write_line("reply").unwrap();
        drop(endpoint);
        let mut reply = String::new();
        File::from(response_read).read_to_string(&mut reply).unwrap();
        assert_eq!(reply, "reply\n");
    }

    #[test]
    fn closed_parent_is_unexpected_eof() {
        let (request_read, request_write) = create_pipe().unwrap();
        let (_response_read, response_write) = create_pipe().unwrap();
        let mut endpoint = ChildEndpoint::new(request_read, response_write, SLICE).unwrap();
        drop(request_write);

        match endpoint.read_line() {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected eof, got {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_descriptor_arguments() {
        assert!(matches!(
            ChildEndpoint::from_args("abc", "4", SLICE),
            Err(Error::Protocol { .. })
        ));
        assert!(matches!(
            ChildEndpoint::from_args("-3", "4", SLICE),
            Err(Error::Protocol { .. })
        ));
        assert!(matches!(
            ChildEndpoint::from_args("7", "7", SLICE),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn rejects_closed_descriptor() {
        assert!(matches!(
            ChildEndpoint::from_args("999998", "999999", SLICE),
            Err(Error::Protocol { .. })
        ));
    }
}
