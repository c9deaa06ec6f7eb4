//! A minimal RESP2 codec: enough of the Redis wire protocol for the
//! commands in §4.5 to be driven by an off-the-shelf client. Command
//! dispatch (mapping a parsed argument vector to [`crate::dispatch`]) is
//! the boundary the design treats the wire server as external to; this
//! module is the thin adapter that makes the binary actually speak RESP.

use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// A value as encoded on the wire, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    NullBulk,
    Array(Vec<RespValue>),
    NullArray,
}

impl RespValue {
    #[must_use]
    pub fn ok() -> Self {
        RespValue::Simple("OK".to_string())
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        RespValue::Bulk(bytes)
    }

    #[must_use]
    pub fn from_optional_bytes(bytes: Option<Vec<u8>>) -> Self {
        bytes.map_or(RespValue::NullBulk, RespValue::Bulk)
    }

    #[must_use]
    pub fn from_strings(strings: Vec<String>) -> Self {
        RespValue::Array(strings.into_iter().map(|s| RespValue::Bulk(s.into_bytes())).collect())
    }

    #[must_use]
    pub fn from_byte_vecs(items: Vec<Vec<u8>>) -> Self {
        RespValue::Array(items.into_iter().map(RespValue::Bulk).collect())
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            RespValue::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                out.push(b'-');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                out.push(b':');
                out.extend_from_slice(n.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Bulk(bytes) => {
                out.push(b'$');
                out.extend_from_slice(bytes.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(bytes);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::NullBulk => out.extend_from_slice(b"$-1\r\n"),
            RespValue::NullArray => out.extend_from_slice(b"*-1\r\n"),
            RespValue::Array(items) => {
                out.push(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

/// Reads one command (a RESP multibulk array, or a plain inline line for
/// `telnet`/`nc`-style clients) from `reader` and returns its argument
/// vector, lower-cased command name first. Returns `Ok(None)` on a clean
/// EOF between commands.
pub async fn read_command<R>(reader: &mut R) -> io::Result<Option<Vec<Vec<u8>>>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut first_line = Vec::new();
    let n = read_line(reader, &mut first_line).await?;
    if n == 0 {
        return Ok(None);
    }

    if first_line.first() == Some(&b'*') {
        let count: i64 = parse_ascii_i64(&first_line[1..])?;
        if count <= 0 {
            return Ok(Some(Vec::new()));
        }
        let mut args = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut len_line = Vec::new();
            read_line(reader, &mut len_line).await?;
            if len_line.first() != Some(&b'$') {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "expected bulk string header"));
            }
            let len: i64 = parse_ascii_i64(&len_line[1..])?;
            if len < 0 {
                args.push(Vec::new());
                continue;
            }
            let mut buf = vec![0u8; len as usize];
            reader.read_exact(&mut buf).await?;
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf).await?;
            args.push(buf);
        }
        Ok(Some(args))
    } else {
        // Inline command: whitespace-separated tokens on one line.
        let args = first_line.split(|b| *b == b' ').filter(|s| !s.is_empty()).map(<[u8]>::to_vec).collect();
        Ok(Some(args))
    }
}

/// Reads one `\r\n`- or `\n`-terminated line into `buf` (without the
/// terminator). Returns the number of bytes read including the
/// terminator, or 0 on EOF with no partial line.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    use tokio::io::AsyncBufReadExt;
    let n = reader.read_until(b'\n', buf).await?;
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(n)
}

fn parse_ascii_i64(bytes: &[u8]) -> io::Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "expected an integer length prefix"))
}

/// Writes `value`'s encoding to `writer` and flushes.
pub async fn write_reply<W>(writer: &mut W, value: &RespValue) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    value.encode(&mut buf);
    writer.write_all(&buf).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn parses_multibulk_array() {
        let input = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(input));
        let cmd = read_command(&mut reader).await.unwrap().unwrap();
        assert_eq!(cmd, vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]);
    }

    #[tokio::test]
    async fn parses_inline_command() {
        let input = b"PING\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(input));
        let cmd = read_command(&mut reader).await.unwrap().unwrap();
        assert_eq!(cmd, vec![b"PING".to_vec()]);
    }

    #[tokio::test]
    async fn eof_returns_none() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        assert!(read_command(&mut reader).await.unwrap().is_none());
    }

    #[test]
    fn encodes_bulk_string() {
        let mut out = Vec::new();
        RespValue::Bulk(b"hi".to_vec()).encode(&mut out);
        assert_eq!(out, b"$2\r\nhi\r\n");
    }

    #[test]
    fn encodes_null_bulk() {
        let mut out = Vec::new();
        RespValue::NullBulk.encode(&mut out);
        assert_eq!(out, b"$-1\r\n");
    }

    #[test]
    fn encodes_nested_array() {
        let mut out = Vec::new();
        RespValue::Array(vec![RespValue::Integer(1), RespValue::Bulk(b"a".to_vec())]).encode(&mut out);
        assert_eq!(out, b"*2\r\n:1\r\n$1\r\na\r\n");
    }
}
