//! Framed wire protocol for client-daemon communication.
//!
//! Every frame element is self-describing: headers are fixed-width 8-byte
//! ASCII tokens, strings carry a 10-digit zero-padded decimal byte length
//! before their UTF-8 bytes, and file payloads travel as raw bytes preceded
//! by their length encoded as a string. A reader always knows exactly how
//! many bytes to consume; there are no delimiters and no reliance on EOF.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Width of a header token on the wire.
pub const HEADER_LEN: usize = 8;
/// Width of a string length field on the wire.
pub const LENGTH_DIGITS: usize = 10;
/// Upper bound on any single string or file payload (256 MiB).
pub const MAX_FRAME_BYTES: u64 = 256 * 1024 * 1024;

/// Closed set of request and response header codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    // Requests
    Init,
    Alive,
    Config,
    ProcessDocument,
    Convert,
    Compare,
    // Responses
    Ack,
    NeedsConfig,
    Done,
    Error,
}

impl Header {
    pub fn token(self) -> &'static str {
        match self {
            Header::Init => "INIT",
            Header::Alive => "ALIVE",
            Header::Config => "CONFIG",
            Header::ProcessDocument => "PROCDOC",
            Header::Convert => "CONVERT",
            Header::Compare => "COMPARE",
            Header::Ack => "ACK",
            Header::NeedsConfig => "NEEDCONF",
            Header::Done => "DONE",
            Header::Error => "ERROR",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "INIT" => Header::Init,
            "ALIVE" => Header::Alive,
            "CONFIG" => Header::Config,
            "PROCDOC" => Header::ProcessDocument,
            "CONVERT" => Header::Convert,
            "COMPARE" => Header::Compare,
            "ACK" => Header::Ack,
            "NEEDCONF" => Header::NeedsConfig,
            "DONE" => Header::Done,
            "ERROR" => Header::Error,
            _ => return None,
        })
    }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unknown header token: {0:?}")]
    UnknownHeader(String),

    #[error("malformed length field: {0:?}")]
    BadLength(String),

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    FrameTooLarge(u64),

    #[error("string payload is not valid UTF-8")]
    BadString(#[from] std::string::FromUtf8Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a header into its fixed-width wire form.
pub fn encode_header(header: Header) -> [u8; HEADER_LEN] {
    let mut buf = [b' '; HEADER_LEN];
    buf[..header.token().len()].copy_from_slice(header.token().as_bytes());
    buf
}

/// Decode a fixed-width header field, trailing spaces stripped.
pub fn decode_header(buf: &[u8; HEADER_LEN]) -> Result<Header, ProtocolError> {
    let token = std::str::from_utf8(buf)
        .map(|s| s.trim_end_matches(' '))
        .unwrap_or("");
    Header::from_token(token)
        .ok_or_else(|| ProtocolError::UnknownHeader(String::from_utf8_lossy(buf).into_owned()))
}

/// Decode a fixed-width decimal length field.
pub fn decode_length(buf: &[u8; LENGTH_DIGITS]) -> Result<u64, ProtocolError> {
    let text = std::str::from_utf8(buf).unwrap_or("");
    let len: u64 = text
        .parse()
        .map_err(|_| ProtocolError::BadLength(String::from_utf8_lossy(buf).into_owned()))?;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    Ok(len)
}

pub async fn send_header<W>(writer: &mut W, header: Header) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_header(header)).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn receive_header<R>(reader: &mut R) -> Result<Header, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut buf).await?;
    decode_header(&buf)
}

pub async fn send_string<W>(writer: &mut W, value: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("{:0LENGTH_DIGITS$}", value.len()).as_bytes())
        .await?;
    writer.write_all(value.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn receive_string<R>(reader: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_DIGITS];
    reader.read_exact(&mut len_buf).await?;
    let len = decode_length(&len_buf)?;

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(String::from_utf8(buf)?)
}

/// Send a file payload: its byte count as a decimal string, then raw bytes.
pub async fn send_payload<W>(writer: &mut W, bytes: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    send_string(writer, &bytes.len().to_string()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Receive a file payload announced by a decimal-string byte count.
pub async fn receive_payload<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let declared = receive_string(reader).await?;
    let len: u64 = declared
        .trim()
        .parse()
        .map_err(|_| ProtocolError::BadLength(declared))?;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}
