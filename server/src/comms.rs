//! Line-oriented CSV transport between the server and one client.
//!
//! Every message is a newline-terminated line of comma-separated fields.
//! Reads carry a timeout: the default window stays fixed at 60 s while
//! one-off reads ([`Comms::read_within`]) use their own window without
//! disturbing the default.

use crate::error::ServerError;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

pub const DEFAULT_READ_WINDOW: Duration = Duration::from_secs(shared::DEFAULT_READ_WINDOW_SECS);

pub struct Comms<S> {
    reader: BufReader<tokio::io::ReadHalf<S>>,
    writer: tokio::io::WriteHalf<S>,
    read_window: Duration,
}

impl<S: AsyncRead + AsyncWrite> Comms<S> {
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Comms {
            reader: BufReader::new(read_half),
            writer: write_half,
            read_window: DEFAULT_READ_WINDOW,
        }
    }

    /// Reads one line under the default window and splits it into fields.
    pub async fn read(&mut self) -> Result<Vec<String>, ServerError> {
        let window = self.read_window;
        self.read_within(window).await
    }

    /// Reads one line under a one-off window. The default window is untouched.
    pub async fn read_within(&mut self, window: Duration) -> Result<Vec<String>, ServerError> {
        let mut line = String::new();
        let read = timeout(window, self.reader.read_line(&mut line))
            .await
            .map_err(|_| ServerError::ProtocolTimeout)??;
        if read == 0 {
            return Err(ServerError::ConnectionClosed);
        }
        Ok(split_fields(&line))
    }

    /// Writes one line, appending the newline terminator.
    pub async fn write(&mut self, line: &str) -> Result<(), ServerError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Splits a wire line into trimmed fields.
pub fn split_fields(line: &str) -> Vec<String> {
    line.trim_end_matches(['\r', '\n'])
        .split(',')
        .map(|field| field.trim().to_string())
        .collect()
}
