//! Synchronous client for the docgate daemon.
//!
//! One TCP connection per request cycle, mirroring the daemon's framed
//! protocol with blocking I/O. Used by integration tests and suitable for
//! control scripts.

use crate::protocol::{decode_header, decode_length, encode_header, Header, LENGTH_DIGITS};
use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Default timeout for client requests (5 minutes, conversions can be slow).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Outcome of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliveStatus {
    /// The daemon is configured and ready for commands.
    Ready,
    /// The daemon wants an activation descriptor first.
    NeedsConfig,
}

pub struct Client {
    addr: String,
    timeout: Duration,
}

impl Client {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr)
            .with_context(|| format!("Failed to connect to daemon at {}", self.addr))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .context("Failed to set read timeout")?;
        stream
            .set_write_timeout(Some(self.timeout))
            .context("Failed to set write timeout")?;
        Ok(stream)
    }

    /// Probe the daemon. Note that a `NeedsConfig` answer leaves the daemon
    /// waiting for a descriptor on that connection; this method hangs up
    /// instead, and `configure` should be used to actually deliver one.
    pub fn alive(&self) -> Result<AliveStatus> {
        let mut stream = self.connect()?;
        write_header(&mut stream, Header::Alive)?;
        match read_header(&mut stream)? {
            Header::Ack => Ok(AliveStatus::Ready),
            Header::NeedsConfig => Ok(AliveStatus::NeedsConfig),
            other => bail!("unexpected response to ALIVE: {other:?}"),
        }
    }

    /// Deliver an activation descriptor through the liveness handshake.
    pub fn configure(&self, descriptor: &str) -> Result<()> {
        let mut stream = self.connect()?;
        write_header(&mut stream, Header::Alive)?;
        match read_header(&mut stream)? {
            Header::NeedsConfig => {}
            Header::Ack => return Ok(()), // already configured
            other => bail!("unexpected response to ALIVE: {other:?}"),
        }
        write_string(&mut stream, descriptor)?;
        write_header(&mut stream, Header::Config)?;
        expect_ack(&mut stream, "CONFIG")
    }

    /// Convert one file's bytes to the target extension.
    pub fn convert(&self, bytes: &[u8], from_ext: &str, to_ext: &str) -> Result<Vec<u8>> {
        let mut stream = self.command(Header::Convert)?;
        write_payload(&mut stream, bytes)?;
        write_string(&mut stream, from_ext)?;
        write_string(&mut stream, to_ext)?;

        match read_header(&mut stream)? {
            Header::Done => read_payload(&mut stream),
            Header::Error => bail!("daemon reported a conversion error"),
            other => bail!("unexpected response to CONVERT: {other:?}"),
        }
    }

    /// Compare two document versions; returns the produced extension and the
    /// comparison document's bytes.
    pub fn compare(
        &self,
        prev: &[u8],
        prev_ext: &str,
        next: &[u8],
        next_ext: &str,
        format_flag: &str,
    ) -> Result<(String, Vec<u8>)> {
        let mut stream = self.command(Header::Compare)?;
        write_payload(&mut stream, prev)?;
        write_string(&mut stream, prev_ext)?;
        write_payload(&mut stream, next)?;
        write_string(&mut stream, next_ext)?;
        write_string(&mut stream, format_flag)?;

        match read_header(&mut stream)? {
            Header::Done => {
                let ext = read_string(&mut stream)?;
                let bytes = read_payload(&mut stream)?;
                Ok((ext, bytes))
            }
            Header::Error => bail!("daemon reported a comparison error"),
            other => bail!("unexpected response to COMPARE: {other:?}"),
        }
    }

    /// Process one stored document: indexing, metadata, and conversion to the
    /// given target extensions.
    pub fn process_document(&self, doc_id: &str, targets: &[&str], additional: &str) -> Result<()> {
        let mut stream = self.command(Header::ProcessDocument)?;
        write_string(&mut stream, doc_id)?;
        write_string(&mut stream, &targets.join(","))?;
        write_string(&mut stream, additional)?;

        match read_header(&mut stream)? {
            Header::Done => Ok(()),
            Header::Error => bail!("daemon failed to process document {doc_id}"),
            other => bail!("unexpected response to PROCESS_DOCUMENT: {other:?}"),
        }
    }

    /// Open a command cycle: INIT, ACK, command header, ACK.
    fn command(&self, command: Header) -> Result<TcpStream> {
        let mut stream = self.connect()?;
        write_header(&mut stream, Header::Init)?;
        expect_ack(&mut stream, "INIT")?;
        write_header(&mut stream, command)?;
        expect_ack(&mut stream, command.token())?;
        Ok(stream)
    }
}

fn expect_ack(stream: &mut TcpStream, after: &str) -> Result<()> {
    match read_header(stream)? {
        Header::Ack => Ok(()),
        Header::Error => bail!("daemon rejected {after}"),
        other => bail!("unexpected response to {after}: {other:?}"),
    }
}

fn write_header(stream: &mut TcpStream, header: Header) -> Result<()> {
    stream.write_all(&encode_header(header))?;
    stream.flush()?;
    Ok(())
}

fn read_header(stream: &mut TcpStream) -> Result<Header> {
    let mut buf = [0u8; crate::protocol::HEADER_LEN];
    stream.read_exact(&mut buf)?;
    Ok(decode_header(&buf)?)
}

fn write_string(stream: &mut TcpStream, value: &str) -> Result<()> {
    stream.write_all(format!("{:0LENGTH_DIGITS$}", value.len()).as_bytes())?;
    stream.write_all(value.as_bytes())?;
    stream.flush()?;
    Ok(())
}

fn read_string(stream: &mut TcpStream) -> Result<String> {
    let mut len_buf = [0u8; LENGTH_DIGITS];
    stream.read_exact(&mut len_buf)?;
    let len = decode_length(&len_buf)?;
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn write_payload(stream: &mut TcpStream, bytes: &[u8]) -> Result<()> {
    write_string(stream, &bytes.len().to_string())?;
    stream.write_all(bytes)?;
    stream.flush()?;
    Ok(())
}

fn read_payload(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let declared = read_string(stream)?;
    let len: usize = declared
        .trim()
        .parse()
        .with_context(|| format!("malformed payload length {declared:?}"))?;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}
