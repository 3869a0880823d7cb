//! Wire helpers shared by the fake IMAP server's handlers.
//!
//! Writes flush eagerly so every response reaches the client before the
//! handler returns. Literals are framed the way RFC 3501 counts them:
//! `{n}\r\n` followed by exactly `n` bytes.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Write a string to the stream and flush.
pub async fn write_line<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    line: &str,
) -> std::io::Result<()> {
    stream.get_mut().write_all(line.as_bytes()).await?;
    stream.get_mut().flush().await
}

/// Write `prefix`, a counted literal holding `data`, then `suffix`.
pub async fn write_literal<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    prefix: &str,
    data: &[u8],
    suffix: &str,
) -> std::io::Result<()> {
    let writer = stream.get_mut();
    writer
        .write_all(format!("{prefix}{{{}}}\r\n", data.len()).as_bytes())
        .await?;
    writer.write_all(data).await?;
    writer.write_all(suffix.as_bytes()).await?;
    writer.flush().await
}

/// Read a client-sent literal of `len` bytes plus the CRLF that ends
/// the command line after it.
pub async fn read_literal<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    len: usize,
) -> std::io::Result<Vec<u8>> {
    let mut data = vec![0; len];
    stream.read_exact(&mut data).await?;
    let mut rest = String::new();
    stream.read_line(&mut rest).await?;
    Ok(data)
}

/// Split a quoted string or atom off the front of a command's
/// arguments, returning it unescaped with the remaining arguments.
pub fn take_string(s: &str) -> Option<(String, &str)> {
    if let Some(rest) = s.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => out.push(chars.next()?.1),
                '"' => return Some((out, rest[i + 1..].trim_start())),
                _ => out.push(c),
            }
        }
        None
    } else {
        let end = s.find(' ').unwrap_or(s.len());
        Some((s[..end].to_string(), s[end..].trim_start()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_string_unquotes_and_unescapes() {
        let (name, rest) = take_string(r#""[Gmail]/All \"Mail\"" (\Seen)"#).unwrap();
        assert_eq!(name, r#"[Gmail]/All "Mail""#);
        assert_eq!(rest, r"(\Seen)");
    }

    #[test]
    fn take_string_reads_atoms() {
        assert_eq!(
            take_string("INBOX {12}"),
            Some(("INBOX".to_string(), "{12}"))
        );
        assert_eq!(take_string(r#""unterminated"#), None);
    }

    #[tokio::test]
    async fn literal_is_counted() {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);

        write_literal(&mut stream, "* 1 FETCH (BODY[] ", b"hello", ")\r\n")
            .await
            .unwrap();
        drop(stream);

        let mut buf = Vec::new();
        AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        assert_eq!(buf, b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n");
    }

    #[tokio::test]
    async fn read_literal_consumes_trailing_crlf() {
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(b"abc\r\nA2 NOOP\r\n").await.unwrap();
        let mut stream = BufReader::new(server);

        assert_eq!(read_literal(&mut stream, 3).await.unwrap(), b"abc");
        let mut next = String::new();
        stream.read_line(&mut next).await.unwrap();
        assert_eq!(next, "A2 NOOP\r\n");
    }
}
