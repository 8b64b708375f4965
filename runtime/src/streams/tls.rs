//! # TLS Stream Overlay
//!
//! `tokio_rustls` already bridges an async byte stream to rustls's
//! synchronous BIO-style `read_tls`/`write_tls` calls — the idiomatic Rust
//! answer to the "BIO coupling" problem spec.md §9 raises by hand (a
//! ring-buffer + `WANT_READ` bridge is exactly what `tokio_rustls::Connect`/
//! `Accept` futures do internally). Reimplementing that by hand over a raw
//! `ssl` binding would be the non-idiomatic path; the teacher project
//! already depends on the `rustls` ecosystem for every TLS need it has, so
//! this overlay keeps using it.

use std::os::fd::AsRawFd;
use std::sync::Arc as StdArc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::{TlsAcceptor, TlsConnector, client::TlsStream as ClientTlsStream, server::TlsStream as ServerTlsStream};

use crate::error::TlsError;
use crate::streams::core::{LiveHandles, StreamCore, StreamHandle};
use crate::streams::event_sink::{NullSink, SharedSink};

const READ_CHUNK: usize = 64 * 1024;

/// State machine mirrored unchanged from spec.md §3/§4.3: read and write are
/// only permitted in `Io`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsState {
    /// Constructed, handshake not yet started.
    Init,
    /// Handshake in progress (folded into the connect/accept future itself
    /// here, since `tokio_rustls` only returns once it settles).
    Handshaking,
    /// Handshake complete; read/write permitted.
    Io,
    /// `close_notify` in flight.
    Closing,
}

enum ReadSide {
    Client(ReadHalf<ClientTlsStream<TcpStream>>),
    Server(ReadHalf<ServerTlsStream<TcpStream>>),
}

enum WriteSide {
    Client(WriteHalf<ClientTlsStream<TcpStream>>),
    Server(WriteHalf<ServerTlsStream<TcpStream>>),
}

fn split_client(s: ClientTlsStream<TcpStream>) -> (ReadSide, WriteSide) {
    let (r, w) = tokio::io::split(s);
    (ReadSide::Client(r), WriteSide::Client(w))
}

fn split_server(s: ServerTlsStream<TcpStream>) -> (ReadSide, WriteSide) {
    let (r, w) = tokio::io::split(s);
    (ReadSide::Server(r), WriteSide::Server(w))
}

/// A TLS-wrapped TCP stream, implementing [`StreamHandle`] like every other
/// variant so callers past the connect/accept boundary can treat it
/// identically to a plain `TcpStreamHandle`.
///
/// Read and write halves are split via `tokio::io::split` and guarded by
/// separate mutexes, for the same reason [`crate::streams::tcp::TcpStreamHandle`]
/// does: a read loop holds its lock across a pending `read()`, so sharing one
/// mutex between reading and writing would starve writes behind it.
pub struct TlsStreamHandle {
    core: StreamCore,
    reader: Mutex<Option<ReadSide>>,
    writer: Mutex<Option<WriteSide>>,
    sink: Mutex<SharedSink>,
    state: Mutex<TlsState>,
    reading: AtomicBool,
    /// Captured from the raw TCP socket before the handshake splits it
    /// behind `tokio::io::split`, which exposes no way back to the
    /// underlying stream afterward.
    raw_fd: i32,
}

/// A verifier that accepts any certificate, used only when
/// `reject_unauthorized == false` — an explicit opt-in the caller must make,
/// never a default.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Builds a `ClientConfig` for `hostname`, honoring `reject_unauthorized`
/// (spec.md §3's "reject unauthorized" flag) and trusting the platform's
/// native root store when verification is on.
pub fn client_config(reject_unauthorized: bool) -> ClientConfig {
    if reject_unauthorized {
        let mut roots = RootCertStore::empty();
        for cert in webpki_roots_native() {
            let _ = roots.add(cert);
        }
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(StdArc::new(NoVerification))
            .with_no_client_auth()
    }
}

fn webpki_roots_native() -> Vec<CertificateDer<'static>> {
    rustls_native_certs::load_native_certs()
        .certs
        .into_iter()
        .collect()
}

/// Builds a `ServerConfig` from a PEM cert chain and private key, the shape
/// `TlsStreamHandle::accept` needs for the server side of a handshake.
pub fn server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    key: rustls::pki_types::PrivateKeyDer<'static>,
) -> Result<ServerConfig, TlsError> {
    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| TlsError {
            message: e.to_string(),
            verify_result: None,
        })
}

impl TlsStreamHandle {
    /// Connects a TCP socket to `addr` and performs a TLS handshake as the
    /// client. Per spec.md §4.3, the returned future (the connect promise's
    /// equivalent) only resolves once the handshake itself completes, not
    /// merely the TCP-level connect.
    pub async fn connect(
        live_handles: StdArc<LiveHandles>,
        addr: std::net::SocketAddr,
        server_name: ServerName<'static>,
        config: ClientConfig,
    ) -> Result<StdArc<Self>, TlsError> {
        let tcp = TcpStream::connect(addr).await.map_err(|e| TlsError {
            message: e.to_string(),
            verify_result: None,
        })?;
        let raw_fd = tcp.as_raw_fd();
        let connector = TlsConnector::from(StdArc::new(config));
        let tls = connector.connect(server_name, tcp).await.map_err(|e| {
            let verify_result = if e.to_string().contains("certificate") {
                Some(e.to_string())
            } else {
                None
            };
            TlsError {
                message: e.to_string(),
                verify_result,
            }
        })?;
        let (reader, writer) = split_client(tls);
        Ok(StdArc::new(Self {
            core: StreamCore::new(live_handles),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            sink: Mutex::new(StdArc::new(NullSink)),
            state: Mutex::new(TlsState::Io),
            reading: AtomicBool::new(false),
            raw_fd,
        }))
    }

    /// Accepts a TLS handshake as the server over an already-accepted TCP
    /// connection.
    pub async fn accept(
        live_handles: StdArc<LiveHandles>,
        tcp: TcpStream,
        config: StdArc<ServerConfig>,
    ) -> Result<StdArc<Self>, TlsError> {
        let raw_fd = tcp.as_raw_fd();
        let acceptor = TlsAcceptor::from(config);
        let tls = acceptor.accept(tcp).await.map_err(|e| TlsError {
            message: e.to_string(),
            verify_result: None,
        })?;
        let (reader, writer) = split_server(tls);
        Ok(StdArc::new(Self {
            core: StreamCore::new(live_handles),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            sink: Mutex::new(StdArc::new(NullSink)),
            state: Mutex::new(TlsState::Io),
            reading: AtomicBool::new(false),
            raw_fd,
        }))
    }

    /// Installs the sink the read loop reports through.
    pub async fn set_sink(&self, sink: SharedSink) {
        *self.sink.lock().await = sink;
    }

    /// Current handshake/io state.
    pub async fn state(&self) -> TlsState {
        *self.state.lock().await
    }

    /// Spawns the background decrypt-and-deliver read loop.
    pub fn spawn_read_loop(self: &StdArc<Self>) {
        if self.reading.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = StdArc::clone(self);
        tokio::spawn(async move {
            this.core.begin_reading().await;
            loop {
                if this.core.is_closed() {
                    break;
                }
                let mut buf = vec![0u8; READ_CHUNK];
                let n = {
                    let mut guard = this.reader.lock().await;
                    match guard.as_mut() {
                        Some(ReadSide::Client(s)) => {
                            tokio::select! {
                                r = s.read(&mut buf) => r,
                                _ = this.core.closed() => break,
                            }
                        }
                        Some(ReadSide::Server(s)) => {
                            tokio::select! {
                                r = s.read(&mut buf) => r,
                                _ = this.core.closed() => break,
                            }
                        }
                        None => break,
                    }
                };
                match n {
                    // Distinguishing EOF from other errors falls out of
                    // `io::Result` itself here; the original's
                    // assignment-vs-comparison bug on `nread == UV_EOF` has
                    // no Rust analogue to reproduce.
                    Ok(0) => {
                        this.sink.lock().await.on_close();
                        break;
                    }
                    Ok(n) => {
                        buf.truncate(n);
                        this.sink.lock().await.on_message(&buf);
                    }
                    Err(e) => {
                        this.sink.lock().await.on_error(&crate::error::TransportError::from_io(&e));
                        break;
                    }
                }
            }
        });
    }
}

impl StreamHandle for TlsStreamHandle {
    async fn close(&self) {
        if self.core.mark_closed().await {
            *self.state.lock().await = TlsState::Closing;
            let mut guard = self.writer.lock().await;
            match guard.as_mut() {
                Some(WriteSide::Client(s)) => {
                    let _ = s.shutdown().await;
                }
                Some(WriteSide::Server(s)) => {
                    let _ = s.shutdown().await;
                }
                None => {}
            }
            *guard = None;
            *self.reader.lock().await = None;
            self.core.mark_finalized().await;
        }
    }

    async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut guard = self.writer.lock().await;
        self.core.add_buffered(data.len() as i64);
        let result = match guard.as_mut() {
            Some(WriteSide::Client(s)) => s.write_all(data).await,
            Some(WriteSide::Server(s)) => s.write_all(data).await,
            None => Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "closed")),
        };
        self.core.sub_buffered(data.len() as i64);
        result
    }

    async fn read_start(&self) {}

    fn fileno(&self) -> Option<i32> {
        Some(self.raw_fd)
    }

    fn ref_handle(&self) {
        self.core.ref_handle();
    }

    fn unref_handle(&self) {
        self.core.unref_handle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn self_signed() -> (Vec<CertificateDer<'static>>, rustls::pki_types::PrivateKeyDer<'static>) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let cert_der = cert.cert.der().clone();
        let key_der = rustls::pki_types::PrivatePkcs8KeyDer::from(cert.signing_key.serialize_der());
        (vec![cert_der], key_der.into())
    }

    #[tokio::test]
    async fn handshake_succeeds_end_to_end_with_verification_disabled() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let (chain, key) = self_signed();
        let server_cfg = Arc::new(server_config(chain, key).unwrap());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let live = Arc::new(LiveHandles::new());
        let live_server = Arc::clone(&live);
        let server_task = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            TlsStreamHandle::accept(live_server, tcp, server_cfg).await.unwrap()
        });

        let client_cfg = client_config(false);
        let name = ServerName::try_from("localhost").unwrap();
        let client = TlsStreamHandle::connect(live, addr, name, client_cfg).await.unwrap();
        assert_eq!(client.state().await, TlsState::Io);

        let server = server_task.await.unwrap();
        assert_eq!(server.state().await, TlsState::Io);
    }

    #[tokio::test]
    async fn handshake_fails_when_server_rejects_client_hello() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // No TLS server on the other end at all: a plain TCP accept that
        // immediately drops the connection stands in for a server that
        // rejects the handshake outright.
        let server_task = tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
        });

        let client_cfg = client_config(false);
        let name = ServerName::try_from("localhost").unwrap();
        let live = Arc::new(LiveHandles::new());
        let result = TlsStreamHandle::connect(live, addr, name, client_cfg).await;
        server_task.await.unwrap();
        assert!(result.is_err());
    }
}
