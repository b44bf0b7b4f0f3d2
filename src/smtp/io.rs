//! Line-oriented transport used by a session

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use crate::smtp::error::{SmtpError, SmtpLimits};

/// What a session needs from its connection
pub trait SmtpIo {
    /// Read one command line without its terminator. `None` at end of stream.
    fn read_line(&mut self) -> Result<Option<String>, SmtpError>;

    /// Append a DATA block to `buf`, up to the line holding only `.`.
    ///
    /// The terminator and the line break preceding it are not stored, and a
    /// leading dot is removed from dot-stuffed lines.
    fn read_data(&mut self, buf: &mut Vec<u8>) -> Result<(), SmtpError>;

    /// Write one line followed by CRLF
    fn write_line(&mut self, line: &str) -> Result<(), SmtpError>;
}

/// [`SmtpIo`] over any reader/writer pair
#[derive(Debug)]
pub struct LineIo<R, W> {
    reader: BufReader<R>,
    writer: W,
    max_data_size: usize,
}

impl LineIo<TcpStream, TcpStream> {
    /// Use both directions of a TCP connection
    pub fn from_tcp(stream: TcpStream) -> Result<Self, SmtpError> {
        let reader = stream.try_clone()?;
        Ok(Self::new(reader, stream))
    }
}

impl<R: Read, W: Write> LineIo<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            max_data_size: SmtpLimits::MAX_DATA_SIZE,
        }
    }

    /// Override the DATA size limit
    pub fn with_max_data_size(mut self, max_data_size: usize) -> Self {
        self.max_data_size = max_data_size;
        self
    }

    /// Everything written so far, for callers that own an in-memory writer
    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl<R: Read, W: Write> SmtpIo for LineIo<R, W> {
    fn read_line(&mut self) -> Result<Option<String>, SmtpError> {
        let mut line = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut line)
            .map_err(SmtpError::from_read)?;
        if read == 0 {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&line);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
    }

    fn read_data(&mut self, buf: &mut Vec<u8>) -> Result<(), SmtpError> {
        let limit = buf.len() + self.max_data_size;
        let mut line = Vec::new();

        loop {
            line.clear();
            // bound a single unterminated line by what the block may still hold
            let budget = (limit.saturating_sub(buf.len()) + 3) as u64;
            let read = self
                .reader
                .by_ref()
                .take(budget)
                .read_until(b'\n', &mut line)
                .map_err(SmtpError::from_read)?;
            if read == 0 {
                return Err(SmtpError::ConnectionClosed);
            }

            if line == b".\r\n" || line == b".\n" {
                break;
            }

            let content = if line.starts_with(b"..") {
                &line[1..]
            } else {
                &line[..]
            };
            if buf.len() + content.len() > limit {
                return Err(SmtpError::TooMuchData {
                    max: self.max_data_size,
                });
            }
            buf.extend_from_slice(content);
        }

        if buf.ends_with(b"\r\n") {
            buf.truncate(buf.len() - 2);
        } else if buf.ends_with(b"\n") {
            buf.truncate(buf.len() - 1);
        }

        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<(), SmtpError> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
