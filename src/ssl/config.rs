//! TLS configuration
//!
//! This module provides configuration builders for client and server
//! engines. A built [`TlsConfig`] is immutable and creates one
//! [`OpenSslEngine`] per connection.

use super::connection::SslConnection;
use super::openssl_engine::OpenSslEngine;
use super::selfsigned;
use super::tasks::TaskRunner;
use crate::error::{Result, SslError};
use crate::io::TcpChannel;
use openssl::pkey::PKey;
use openssl::ssl::{Ssl, SslContext, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::X509;
use std::fs;
use std::net::TcpStream;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> SslVersion {
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Version as reported by OpenSSL
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

impl FromStr for TlsVersion {
    type Err = SslError;

    /// Parse TLS version from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TLSV1.0" | "TLS1.0" | "TLSV1" | "TLS1" => Ok(TlsVersion::Tls10),
            "TLSV1.1" | "TLS1.1" => Ok(TlsVersion::Tls11),
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(SslError::InvalidVersion(s.to_string())),
        }
    }
}

/// Client certificate verification mode (server-side)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientVerify {
    /// Don't request client certificates
    None,
    /// Request client certificate but don't require it
    Optional,
    /// Require client certificate
    Required,
}

/// TLS configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    ctx: SslContext,
    is_server: bool,
    servername: Option<String>,
    verify_peer: bool,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> Result<ClientConfigBuilder> {
        ClientConfigBuilder::new()
    }

    /// Create a new server configuration builder
    pub fn server() -> Result<ServerConfigBuilder> {
        ServerConfigBuilder::new()
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// SNI servername sent by clients
    pub fn servername(&self) -> Option<&str> {
        self.servername.as_deref()
    }

    /// Create a fresh engine for one connection
    pub fn new_engine(&self) -> Result<OpenSslEngine> {
        let mut ssl = Ssl::new(&self.ctx)?;

        if self.is_server {
            return OpenSslEngine::server(ssl);
        }

        if let Some(ref servername) = self.servername {
            ssl.set_hostname(servername)?;
            if self.verify_peer {
                ssl.param_mut().set_host(servername)?;
            }
        }
        OpenSslEngine::client(ssl)
    }

    /// Start a client connection over a TCP stream
    pub fn connect(
        &self,
        stream: TcpStream,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<SslConnection<OpenSslEngine, TcpChannel, TcpChannel>> {
        if self.is_server {
            return Err(SslError::InvalidConfig(
                "Cannot use server config for client connection".to_string(),
            ));
        }
        SslConnection::from_tcp(stream, self.new_engine()?, runner)
    }

    /// Start a server connection over an accepted TCP stream
    pub fn accept(
        &self,
        stream: TcpStream,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<SslConnection<OpenSslEngine, TcpChannel, TcpChannel>> {
        if !self.is_server {
            return Err(SslError::InvalidConfig(
                "Cannot use client config for server accept".to_string(),
            ));
        }
        SslConnection::from_tcp(stream, self.new_engine()?, runner)
    }
}

fn set_versions(ctx: &mut SslContextBuilder, min: TlsVersion, max: TlsVersion) -> Result<()> {
    if min > max {
        return Err(SslError::InvalidConfig(format!(
            "minimum version {} above maximum {}",
            min.as_str(),
            max.as_str()
        )));
    }
    ctx.set_min_proto_version(Some(min.to_openssl_version()))?;
    ctx.set_max_proto_version(Some(max.to_openssl_version()))?;
    Ok(())
}

/// Load a PEM bundle holding a certificate and its private key
fn load_identity(ctx: &mut SslContextBuilder, path: &Path) -> Result<()> {
    let pem = fs::read(path)?;

    let cert = X509::from_pem(&pem)
        .map_err(|e| SslError::Certificate(format!("Failed to load certificate: {}", e)))?;
    ctx.set_certificate(&cert)?;

    let key = PKey::private_key_from_pem(&pem)
        .map_err(|e| SslError::Certificate(format!("Failed to load private key: {}", e)))?;
    ctx.set_private_key(&key)?;
    ctx.check_private_key()
        .map_err(|e| SslError::Certificate(format!("Certificate and key don't match: {}", e)))?;

    Ok(())
}

/// Client configuration builder
pub struct ClientConfigBuilder {
    ctx_builder: SslContextBuilder,
    servername: Option<String>,
    verify_peer: bool,
}

impl ClientConfigBuilder {
    fn new() -> Result<Self> {
        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;

        // Default: don't verify peer
        ctx_builder.set_verify(SslVerifyMode::NONE);

        Ok(ClientConfigBuilder {
            ctx_builder,
            servername: None,
            verify_peer: false,
        })
    }

    /// Set TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Result<Self> {
        self.version_range(version, version)
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Result<Self> {
        set_versions(&mut self.ctx_builder, min, max)?;
        Ok(self)
    }

    /// Set cipher list (for TLS <= 1.2)
    pub fn cipher_list(mut self, ciphers: &str) -> Result<Self> {
        self.ctx_builder.set_cipher_list(ciphers)?;
        Ok(self)
    }

    /// Set cipher suites (for TLS 1.3)
    pub fn ciphersuites(mut self, ciphers: &str) -> Result<Self> {
        self.ctx_builder.set_ciphersuites(ciphers)?;
        Ok(self)
    }

    /// Set ALPN protocols, in preference order
    pub fn alpn(mut self, protocols: &[&str]) -> Result<Self> {
        let mut alpn_bytes = Vec::new();
        for proto in protocols {
            if proto.is_empty() || proto.len() > 255 {
                return Err(SslError::InvalidConfig(format!("invalid ALPN protocol {:?}", proto)));
            }
            alpn_bytes.push(proto.len() as u8);
            alpn_bytes.extend_from_slice(proto.as_bytes());
        }
        self.ctx_builder.set_alpn_protos(&alpn_bytes)?;
        Ok(self)
    }

    /// Set SNI servername
    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    /// Enable/disable peer certificate verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        if verify {
            self.ctx_builder.set_verify(SslVerifyMode::PEER);
        } else {
            self.ctx_builder.set_verify(SslVerifyMode::NONE);
        }
        self
    }

    /// Trust the CA certificates in a PEM file
    pub fn ca_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.ctx_builder.set_ca_file(path.as_ref())?;
        Ok(self)
    }

    /// Load client certificate and key from a PEM file
    pub fn cert_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        load_identity(&mut self.ctx_builder, path.as_ref())?;
        Ok(self)
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig> {
        Ok(TlsConfig {
            ctx: self.ctx_builder.build(),
            is_server: false,
            servername: self.servername,
            verify_peer: self.verify_peer,
        })
    }
}

/// Server configuration builder
pub struct ServerConfigBuilder {
    ctx_builder: SslContextBuilder,
    has_cert: bool,
    common_name: String,
}

impl ServerConfigBuilder {
    fn new() -> Result<Self> {
        let ctx_builder = SslContextBuilder::new(SslMethod::tls_server())?;

        Ok(ServerConfigBuilder {
            ctx_builder,
            has_cert: false,
            common_name: selfsigned::DEFAULT_COMMON_NAME.to_string(),
        })
    }

    /// Set TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Result<Self> {
        self.version_range(version, version)
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Result<Self> {
        set_versions(&mut self.ctx_builder, min, max)?;
        Ok(self)
    }

    /// Set cipher list (for TLS <= 1.2)
    pub fn cipher_list(mut self, ciphers: &str) -> Result<Self> {
        self.ctx_builder.set_cipher_list(ciphers)?;
        Ok(self)
    }

    /// Set cipher suites (for TLS 1.3)
    pub fn ciphersuites(mut self, ciphers: &str) -> Result<Self> {
        self.ctx_builder.set_ciphersuites(ciphers)?;
        Ok(self)
    }

    /// Set the ALPN protocols this server accepts
    pub fn alpn(mut self, protocols: &[&str]) -> Result<Self> {
        let supported: Vec<Vec<u8>> = protocols.iter().map(|p| p.as_bytes().to_vec()).collect();

        // Pick the client's first offer that we support
        self.ctx_builder.set_alpn_select_callback(move |_ssl, client_protos| {
            let mut pos = 0;
            while pos < client_protos.len() {
                let len = client_protos[pos] as usize;
                pos += 1;
                if pos + len > client_protos.len() {
                    break;
                }
                let offered = &client_protos[pos..pos + len];
                if supported.iter().any(|p| p.as_slice() == offered) {
                    return Ok(offered);
                }
                pos += len;
            }
            Err(openssl::ssl::AlpnError::NOACK)
        });
        Ok(self)
    }

    /// Load server certificate and key from a PEM file
    pub fn cert_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        load_identity(&mut self.ctx_builder, path.as_ref())?;
        self.has_cert = true;
        Ok(self)
    }

    /// Common name for the generated certificate when none is loaded
    pub fn common_name(mut self, name: impl Into<String>) -> Self {
        self.common_name = name.into();
        self
    }

    /// Set client certificate verification mode
    pub fn client_verify(mut self, mode: ClientVerify) -> Self {
        let verify_mode = match mode {
            ClientVerify::None => SslVerifyMode::NONE,
            ClientVerify::Optional => SslVerifyMode::PEER,
            ClientVerify::Required => SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
        };

        self.ctx_builder.set_verify(verify_mode);
        self
    }

    /// Set CA file for client certificate verification
    pub fn client_verify_ca<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.ctx_builder.set_ca_file(path.as_ref())?;
        Ok(self)
    }

    /// Build the TLS configuration
    pub fn build(mut self) -> Result<TlsConfig> {
        if !self.has_cert {
            let (cert, key) = selfsigned::generate(&self.common_name)?;
            self.ctx_builder.set_certificate(&cert)?;
            self.ctx_builder.set_private_key(&key)?;
        }

        Ok(TlsConfig {
            ctx: self.ctx_builder.build(),
            is_server: true,
            servername: None,
            verify_peer: false,
        })
    }
}
