//! Negotiated session details
//!
//! Captured from the OpenSSL session once the handshake completes.

use openssl::nid::Nid;
use openssl::ssl::{NameType, SslRef};

/// Session details available after the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Negotiated protocol version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// SNI servername
    pub servername: Option<String>,

    /// Negotiated ALPN protocol
    pub alpn: Option<String>,

    /// Common name of the peer certificate, if the peer presented one
    pub peer_subject: Option<String>,

    /// Whether the session was resumed
    pub resumed: bool,
}

impl SessionInfo {
    /// Read the session details from an SSL connection
    pub fn from_ssl(ssl: &SslRef) -> Self {
        let peer_subject = ssl.peer_certificate().and_then(|cert| {
            cert.subject_name()
                .entries_by_nid(Nid::COMMONNAME)
                .next()
                .map(|entry| String::from_utf8_lossy(entry.data().as_slice()).into_owned())
        });

        SessionInfo {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl.servername(NameType::HOST_NAME).map(|s| s.to_string()),
            alpn: ssl
                .selected_alpn_protocol()
                .map(|p| String::from_utf8_lossy(p).to_string()),
            peer_subject,
            resumed: ssl.session_reused(),
        }
    }
}
