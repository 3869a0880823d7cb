//! LIST command handler.
//!
//! Responds with one `* LIST` line per folder, followed by the tagged
//! OK. Special-use attributes (RFC 6154) travel alongside
//! `\HasNoChildren`, which is how clients find the all-messages
//! folder whatever it is called:
//!
//! ```text
//! * LIST (\HasNoChildren \All) "/" "[Gmail]/All Mail"
//! * LIST (\HasNoChildren) "/" "Work"
//! A0002 OK LIST completed
//! ```

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LIST command. Emits one `* LIST` line per folder.
pub async fn handle_list<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) {
    for folder in &mailbox.folders {
        let mut attributes = vec!["\\HasNoChildren"];
        attributes.extend(folder.attributes.iter().map(String::as_str));
        let line = format!(
            "* LIST ({}) \"/\" \"{}\"\r\n",
            attributes.join(" "),
            folder.name
        );
        if write_line(stream, &line).await.is_err() {
            return;
        }
    }
    let resp = format!("{tag} OK LIST completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use tokio::io::BufReader;

    async fn run(tag: &str, mailbox: &Mailbox) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        handle_list(tag, mailbox, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn lists_all_folders() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .folder("Work")
            .folder("[Gmail]/Trash")
            .build();

        let output = run("A1", &mailbox).await;

        assert!(output.contains("\"INBOX\""));
        assert!(output.contains("\"Work\""));
        assert!(output.contains("\"[Gmail]/Trash\""));
    }

    #[tokio::test]
    async fn carries_special_use_attributes() {
        let mailbox = MailboxBuilder::new()
            .folder_with("[Gmail]/All Mail", &["\\All"])
            .folder_with("[Gmail]", &["\\Noselect"])
            .build();

        let output = run("T1", &mailbox).await;

        assert!(output.contains("* LIST (\\HasNoChildren \\All) \"/\" \"[Gmail]/All Mail\""));
        assert!(output.contains("* LIST (\\HasNoChildren \\Noselect) \"/\" \"[Gmail]\""));
    }

    #[tokio::test]
    async fn empty_mailbox_returns_only_ok() {
        let mailbox = MailboxBuilder::new().build();
        let output = run("T2", &mailbox).await;

        assert_eq!(output, "T2 OK LIST completed\r\n");
    }
}
