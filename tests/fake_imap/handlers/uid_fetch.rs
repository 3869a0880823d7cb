//! UID FETCH command handler.
//!
//! Message content travels as **counted literals**:
//!
//! ```text
//! * <seq> FETCH (UID <uid> BODY[] {<length>}
//! <exactly length bytes of raw RFC 2822 message>
//! )
//! ```
//!
//! Two shapes are served. A full fetch returns `BODY[]`. A header
//! fetch (`BODY.PEEK[HEADER.FIELDS (...)]`) returns FLAGS, INTERNALDATE
//! and only the requested header fields, echoing the field list back
//! in the section name as RFC 3501 Section 7.4.2 requires.
//!
//! The sequence number is the 1-based index of the message within the
//! folder.

use super::sequence::contains;
use crate::fake_imap::io::{write_line, write_literal};
use crate::fake_imap::mailbox::{Mailbox, TestEmail};
use imap_codec::imap_types::sequence::SequenceSet;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// The header field names inside `HEADER.FIELDS (...)`, if the raw
/// command line asks for a header subset.
pub fn requested_header_fields(line: &str) -> Option<Vec<String>> {
    let upper = line.to_ascii_uppercase();
    let start = upper.find("HEADER.FIELDS (")? + "HEADER.FIELDS (".len();
    let len = upper[start..].find(')')?;
    Some(
        upper[start..start + len]
            .split_whitespace()
            .map(ToString::to_string)
            .collect(),
    )
}

/// The header lines of `raw` whose field name is in `fields`
/// (case-insensitive), continuation lines included, followed by the
/// blank line that ends a header block.
fn header_subset(raw: &[u8], fields: &[String]) -> Vec<u8> {
    let text = String::from_utf8_lossy(raw);
    let head = text.split("\r\n\r\n").next().unwrap_or_default();

    let mut out = String::new();
    let mut keep = false;
    for line in head.split("\r\n") {
        if line.starts_with([' ', '\t']) {
            if keep {
                out.push_str(line);
                out.push_str("\r\n");
            }
            continue;
        }
        let name = line.split(':').next().unwrap_or_default().trim();
        keep = fields.iter().any(|f| f.eq_ignore_ascii_case(name));
        if keep {
            out.push_str(line);
            out.push_str("\r\n");
        }
    }
    out.push_str("\r\n");
    out.into_bytes()
}

/// The untagged response up to the literal, and the literal itself.
fn fetch_prelude(seq: usize, email: &TestEmail, fields: Option<&[String]>) -> (String, Vec<u8>) {
    let uid = email.uid;
    match fields {
        Some(fields) => {
            let prelude = format!(
                "* {seq} FETCH (UID {uid} FLAGS ({}) INTERNALDATE \"{}\" \
                 BODY[HEADER.FIELDS ({})] ",
                email.flags.join(" "),
                email.internal_date,
                fields.join(" "),
            );
            (prelude, header_subset(&email.raw, fields))
        }
        None => (format!("* {seq} FETCH (UID {uid} BODY[] "), email.raw.clone()),
    }
}

/// Handle the UID FETCH command. Returns either the whole message or
/// the requested header fields as an IMAP literal.
pub async fn handle_uid_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    header_fields: Option<&[String]>,
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let Some(folder) = mailbox.get_folder(folder_name) else {
        let resp = format!("{tag} BAD Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let largest = folder.emails.iter().map(|e| e.uid).max().unwrap_or(0);
    for (idx, email) in folder.emails.iter().enumerate() {
        if !contains(sequence_set, email.uid, largest) {
            continue;
        }

        let (prelude, body) = fetch_prelude(idx + 1, email, header_fields);
        if write_literal(stream, &prelude, &body, ")\r\n").await.is_err() {
            return;
        }
    }

    let resp = format!("{tag} OK FETCH completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use imap_codec::imap_types::sequence::{SeqOrUid, Sequence};
    use std::num::NonZeroU32;
    use tokio::io::BufReader;

    fn make_raw_email() -> Vec<u8> {
        b"From: a@b.com\r\nSubject: Test\r\n\tcontinued\r\nX-Spam: yes\r\n\r\nBody".to_vec()
    }

    fn uid_set(uid: u32) -> SequenceSet {
        SequenceSet(
            vec![Sequence::Single(SeqOrUid::Value(
                NonZeroU32::new(uid).unwrap(),
            ))]
            .try_into()
            .unwrap(),
        )
    }

    async fn run(
        tag: &str,
        sequence_set: &SequenceSet,
        header_fields: Option<&[String]>,
        mailbox: &Mailbox,
        selected: Option<&str>,
    ) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        handle_uid_fetch(tag, sequence_set, header_fields, mailbox, selected, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn fetches_email_by_uid() {
        let raw = make_raw_email();
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(42, false, &raw)
            .build();

        let output = run("A1", &uid_set(42), None, &mailbox, Some("INBOX")).await;

        // Sequence number is 1 (1st message), UID is 42
        assert!(output.contains("* 1 FETCH (UID 42 BODY[]"));
        assert!(output.contains(&format!("{{{}}}", raw.len())));
        assert!(output.contains("X-Spam: yes"));
        assert!(output.contains("A1 OK FETCH completed"));
    }

    #[tokio::test]
    async fn header_fetch_returns_requested_fields_only() {
        let raw = make_raw_email();
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(7, true, &raw)
            .build();
        let fields = vec!["FROM".to_string(), "SUBJECT".to_string()];

        let output = run("A1", &uid_set(7), Some(&fields), &mailbox, Some("INBOX")).await;

        assert!(output.contains("FLAGS (\\Seen)"));
        assert!(output.contains("INTERNALDATE \"01-Jan-2024 12:00:00 +0000\""));
        assert!(output.contains("BODY[HEADER.FIELDS (FROM SUBJECT)]"));
        assert!(output.contains("Subject: Test\r\n\tcontinued\r\n"));
        assert!(!output.contains("X-Spam"));
        assert!(!output.contains("Body"));
    }

    #[tokio::test]
    async fn missing_uid_returns_only_ok() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let output = run("A1", &uid_set(99), None, &mailbox, Some("INBOX")).await;

        assert!(!output.contains("FETCH (UID"));
        assert!(output.contains("A1 OK FETCH completed"));
    }

    #[tokio::test]
    async fn no_folder_selected_returns_bad() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let output = run("A1", &uid_set(1), None, &mailbox, None).await;

        assert!(output.contains("A1 BAD No folder selected"));
    }

    #[test]
    fn parses_header_field_list() {
        let line = "A5 UID FETCH 3 (UID FLAGS INTERNALDATE BODY.PEEK[HEADER.FIELDS (FROM TO DATE)])\r\n";
        assert_eq!(
            requested_header_fields(line),
            Some(vec!["FROM".into(), "TO".into(), "DATE".into()])
        );
        assert_eq!(requested_header_fields("A6 UID FETCH 3 (BODY.PEEK[])\r\n"), None);
    }
}
