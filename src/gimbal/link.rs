use std::time::Duration as StdDuration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::error::GimbalError;
use super::protocol::{parse_status, Reply, Request};

/// Request/response channel to a rotator.
///
/// `transact` returns the reply only for a zero status; a nonzero status is
/// `GimbalError::Rejected` and leaves the link usable. Any other error means
/// the link has dropped itself and must be reconnected.
#[allow(async_fn_in_trait)]
pub trait RotatorLink {
    async fn connect(&mut self) -> Result<(), GimbalError>;
    fn is_connected(&self) -> bool;
    fn disconnect(&mut self);
    async fn transact(&mut self, request: Request) -> Result<Reply, GimbalError>;
}

/// rotctld over TCP.
pub struct RotctldLink {
    address: String,
    timeout: StdDuration,
    stream: Option<BufReader<TcpStream>>,
}

impl RotctldLink {
    pub fn new(address: impl Into<String>, timeout: StdDuration) -> Self {
        Self {
            address: address.into(),
            timeout,
            stream: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn exchange(&mut self, line: &str) -> Result<(Vec<String>, i32), GimbalError> {
        let stream = self.stream.as_mut().ok_or(GimbalError::NotConnected)?;
        exchange_within(stream, line, self.timeout).await
    }
}

/// Write one request line and read its reply, all within `deadline`.
async fn exchange_within<S>(
    stream: &mut S,
    line: &str,
    deadline: StdDuration,
) -> Result<(Vec<String>, i32), GimbalError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    match timeout(deadline, send_and_read(stream, line)).await {
        Ok(reply) => reply,
        Err(_) => Err(GimbalError::Timeout),
    }
}

async fn send_and_read<S>(stream: &mut S, line: &str) -> Result<(Vec<String>, i32), GimbalError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    stream.write_all(format!("{}\n", line).as_bytes()).await?;
    stream.flush().await?;
    read_reply(stream).await
}

/// Read lines up to and including the status line. Nothing is returned
/// unless the whole reply arrived.
async fn read_reply<S>(stream: &mut S) -> Result<(Vec<String>, i32), GimbalError>
where
    S: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut buf = String::new();
    loop {
        buf.clear();
        if stream.read_line(&mut buf).await? == 0 {
            return Err(GimbalError::Malformed(format!(
                "connection closed after {} reply lines",
                lines.len()
            )));
        }
        if let Some(code) = parse_status(&buf) {
            return Ok((lines, code?));
        }
        lines.push(buf.trim_end().to_string());
    }
}

impl RotatorLink for RotctldLink {
    async fn connect(&mut self) -> Result<(), GimbalError> {
        self.stream = None;
        let failed = |message: String| GimbalError::ConnectionFailed {
            address: self.address.clone(),
            message,
        };
        let stream = match timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(failed(e.to_string())),
            Err(_) => return Err(failed("connect timed out".to_string())),
        };
        log::info!("Connected to rotator at {}", self.address);
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("Closed rotator link to {}", self.address);
        }
    }

    async fn transact(&mut self, request: Request) -> Result<Reply, GimbalError> {
        let line = request.to_string();
        log::debug!("rotator <- {}", line);
        let (lines, code) = match self.exchange(&line).await {
            Ok(reply) => reply,
            Err(e) => {
                self.disconnect();
                return Err(e);
            }
        };
        log::debug!("rotator -> {} lines, RPRT {}", lines.len(), code);
        if code != 0 {
            return Err(GimbalError::Rejected {
                command: line,
                code,
            });
        }
        Ok(Reply { lines })
    }
}
