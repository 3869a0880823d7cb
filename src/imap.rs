//! IMAP-backed mailbox access
//!
//! Connects over implicit TLS or STARTTLS, logs in, and implements
//! [`MailboxAccess`] on the resulting `async-imap` session.

use crate::config::{ImapConfig, TlsMode};
use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::folder::FolderInfo;
use crate::identity::HEADER_FIELDS;
use crate::mailbox::{HeaderFetch, MailboxAccess, SelectInfo};
use async_imap::Session;
use async_imap::types::{Fetch, Flag as ImapFlag, NameAttribute};
use futures::StreamExt;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

/// A TLS-wrapped IMAP session.
pub type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// IMAP `date-time` rendering used for internal dates.
const INTERNAL_DATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S %z";

/// A logged-in IMAP session plus the state needed to discover UIDs of
/// appended messages.
pub struct ImapMailbox {
    session: ImapSession,
    selected: Option<String>,
    uid_next: Option<u32>,
}

impl ImapMailbox {
    /// Connect, negotiate TLS and log in.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection, TLS handshake or LOGIN
    /// fails.
    pub async fn connect(config: &ImapConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        debug!("Connecting to IMAP server at {}", addr);

        let tcp_stream = TcpStream::connect(&addr).await?;

        let tcp_stream = match config.tls {
            TlsMode::Implicit => tcp_stream,
            TlsMode::StartTls => {
                let mut client = async_imap::Client::new(tcp_stream.compat());
                client
                    .run_command_and_check_ok("STARTTLS", None)
                    .await
                    .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;
                client.into_inner().into_inner()
            }
        };

        let connector = tls_connector(config.accept_invalid_certs)?;
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;

        let tls_client = async_imap::Client::new(tls_stream.compat());

        let session = tls_client
            .login(&config.username, &config.password)
            .await
            .map_err(|(e, _)| Error::Imap(format!("Login failed: {e}")))?;

        info!("Connected to IMAP server");
        Ok(Self {
            session,
            selected: None,
            uid_next: None,
        })
    }

    /// Collect a UID FETCH into owned responses.
    async fn fetch(&mut self, uid: u32, query: &str) -> Result<Vec<Fetch>> {
        let mut stream = self
            .session
            .uid_fetch(uid.to_string(), query)
            .await
            .map_err(|e| Error::Imap(format!("Fetch of UID {uid} failed: {e}")))?;

        let mut fetches = Vec::new();
        while let Some(item) = stream.next().await {
            fetches.push(item.map_err(|e| Error::Imap(format!("Fetch error: {e}")))?);
        }
        Ok(fetches)
    }

    /// The UID the server gave the message just appended to the
    /// selected folder: the highest UID at or above the pre-append
    /// UIDNEXT.
    async fn appended_uid(&mut self, uid_next: u32) -> Result<Option<u32>> {
        let found = self
            .session
            .uid_search(format!("UID {uid_next}:*"))
            .await
            .map_err(|e| Error::Imap(format!("Search failed: {e}")))?;

        let uid = found.into_iter().filter(|u| *u >= uid_next).max();
        if let Some(uid) = uid {
            self.uid_next = uid.checked_add(1);
        }
        Ok(uid)
    }
}

impl MailboxAccess for ImapMailbox {
    async fn list_folders(&mut self) -> Result<Vec<FolderInfo>> {
        let mut stream = self
            .session
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| Error::Imap(format!("List folders failed: {e}")))?;

        let mut folders = Vec::new();
        while let Some(item) = stream.next().await {
            let name = item.map_err(|e| Error::Imap(format!("List error: {e}")))?;
            let attributes: Vec<String> =
                name.attributes().iter().filter_map(attribute_str).collect();
            folders.push(FolderInfo::from_attributes(name.name(), &attributes));
        }
        Ok(folders)
    }

    async fn select(&mut self, folder: &str, read_only: bool) -> Result<SelectInfo> {
        let mailbox = if read_only {
            self.session.examine(folder).await
        } else {
            self.session.select(folder).await
        }
        .map_err(|e| Error::Imap(format!("Failed to select {folder}: {e}")))?;

        self.selected = Some(folder.to_string());
        self.uid_next = mailbox.uid_next;

        Ok(SelectInfo {
            uid_validity: mailbox.uid_validity.unwrap_or_default(),
            exists: mailbox.exists,
            flags: mailbox
                .flags
                .iter()
                .map(Flag::from)
                .collect(),
        })
    }

    async fn search_range(&mut self, first: u32, last: u32) -> Result<Vec<u32>> {
        let found = self
            .session
            .uid_search(format!("{first}:{last}"))
            .await
            .map_err(|e| Error::Imap(format!("Search {first}:{last} failed: {e}")))?;

        let mut uids: Vec<u32> = found.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_header(&mut self, uid: u32) -> Result<HeaderFetch> {
        let query = format!(
            "(UID FLAGS INTERNALDATE BODY.PEEK[HEADER.FIELDS ({})])",
            HEADER_FIELDS.join(" ").to_ascii_uppercase()
        );
        let fetches = self.fetch(uid, &query).await?;
        let fetch = fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .or_else(|| fetches.first())
            .ok_or_else(|| Error::Imap(format!("No such message: UID {uid}")))?;

        let internal_date = fetch
            .internal_date()
            .map(|d| d.format(INTERNAL_DATE_FORMAT).to_string())
            .ok_or_else(|| Error::Imap(format!("No INTERNALDATE for UID {uid}")))?;

        let header = fetch
            .header()
            .or_else(|| fetch.body())
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        Ok(HeaderFetch {
            uid,
            flags: fetch.flags().map(|f| Flag::from(&f)).collect(),
            internal_date,
            header,
        })
    }

    async fn fetch_raw(&mut self, uid: u32) -> Result<Vec<u8>> {
        let fetches = self.fetch(uid, "(BODY.PEEK[])").await?;
        fetches
            .iter()
            .find_map(|f| f.body().map(<[u8]>::to_vec))
            .ok_or_else(|| Error::Imap(format!("No body found for UID {uid}")))
    }

    async fn append(
        &mut self,
        folder: &str,
        flags: &[Flag],
        internal_date: &str,
        content: &[u8],
    ) -> Result<Option<u32>> {
        let flags = format!("({})", Flag::join_appendable(flags));
        let date = format!("\"{internal_date}\"");

        self.session
            .append(folder, Some(flags.as_str()), Some(date.as_str()), content)
            .await
            .map_err(|e| Error::Imap(format!("Append to {folder} failed: {e}")))?;

        match self.uid_next {
            Some(uid_next) if self.selected.as_deref() == Some(folder) => {
                self.appended_uid(uid_next).await
            }
            _ => Ok(None),
        }
    }

    async fn copy(&mut self, uid: u32, folder: &str) -> Result<()> {
        self.session
            .uid_copy(uid.to_string(), folder)
            .await
            .map_err(|e| Error::Imap(format!("Copy of UID {uid} to {folder} failed: {e}")))
    }

    async fn create(&mut self, folder: &str) -> Result<()> {
        self.session
            .create(folder)
            .await
            .map_err(|e| Error::Imap(format!("Create {folder} failed: {e}")))
    }

    async fn logout(&mut self) -> Result<()> {
        self.session
            .logout()
            .await
            .map_err(|e| Error::Imap(format!("Logout failed: {e}")))
    }
}

impl From<&ImapFlag<'_>> for Flag {
    fn from(flag: &ImapFlag<'_>) -> Self {
        match flag {
            ImapFlag::Seen => Self::Seen,
            ImapFlag::Answered => Self::Answered,
            ImapFlag::Flagged => Self::Flagged,
            ImapFlag::Deleted => Self::Deleted,
            ImapFlag::Draft => Self::Draft,
            ImapFlag::Recent => Self::Recent,
            // `\*` only appears in PERMANENTFLAGS.
            ImapFlag::MayCreate => Self::Keyword("\\*".to_string()),
            ImapFlag::Custom(name) => Self::from(name.as_ref()),
        }
    }
}

fn attribute_str(attr: &NameAttribute<'_>) -> Option<String> {
    let s = match attr {
        NameAttribute::NoSelect => "\\Noselect",
        NameAttribute::All => "\\All",
        NameAttribute::Drafts => "\\Drafts",
        NameAttribute::Flagged => "\\Flagged",
        NameAttribute::Junk => "\\Junk",
        NameAttribute::Sent => "\\Sent",
        NameAttribute::Trash => "\\Trash",
        NameAttribute::Extension(ext) => return Some(ext.to_string()),
        _ => return None,
    };
    Some(s.to_string())
}

/// Build a TLS connector, verifying against the webpki roots unless
/// `accept_invalid_certs` is set (self-signed bridges, test servers).
fn tls_connector(accept_invalid_certs: bool) -> Result<TlsConnector> {
    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Tls(e.to_string()))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Certificate verifier that accepts all certificates.
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
