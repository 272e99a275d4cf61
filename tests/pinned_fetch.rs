//! Texture fetches over real TLS connections through the pinned client.
//!
//! A local rustls server presents the fixture leaf for
//! `imagery.earth-viewer.test`, issued by the fixture CA; the client resolves
//! that name to the server's loopback address. Whether the handshake succeeds
//! is decided by the pin set alone.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use earth_viewer::config::AUDIT_LOG_FILE_NAME;
use earth_viewer::initialization::{pinned_tls_config, redirect_policy};
use earth_viewer::{
    CertificatePinner, ErrorType, FetchOutcome, PinnedCertificateSet, RetryRegistry, RetryScope,
    SecureLogger, TextureDescriptor, TextureFetcher, TextureKind,
};
use httptest::Server;
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::RootCertStore;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

const CA_DER: &[u8] = include_bytes!("fixtures/pki/ca.der");
const LEAF_DER: &[u8] = include_bytes!("fixtures/pki/leaf.der");
const LEAF_KEY_DER: &[u8] = include_bytes!("fixtures/pki/leaf.key.der");

const DOMAIN: &str = "imagery.earth-viewer.test";
const LEAF_PIN: &str = "sha256//c42911277f80a83e671a27357b9357c846a78e1345a10e70bc5149271ae52e28";
const ROGUE_PIN: &str = "sha256//cddd7dac0c65aab8c0c9d7bde3eaa38d1507a938125e30f897b97e0bf94fe14d";

/// One initial request plus five retries.
const REQUESTS_PER_FETCH: usize = 6;

struct TlsServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl TlsServer {
    /// Answers every request on every connection with `reply`, then closes.
    async fn start(reply: Vec<u8>) -> Self {
        let cert = CertificateDer::from(LEAF_DER.to_vec());
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(LEAF_KEY_DER.to_vec()));
        let mut config =
            rustls::ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
                .with_safe_default_protocol_versions()
                .expect("protocol versions")
                .with_no_client_auth()
                .with_single_cert(vec![cert], key)
                .expect("fixture leaf and key should match");
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local address");
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);
        let reply = Arc::new(reply);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let acceptor = acceptor.clone();
                let reply = Arc::clone(&reply);
                tokio::spawn(async move {
                    // The handshake fails whenever the client refuses the pin.
                    let Ok(mut tls) = acceptor.accept(stream).await else {
                        return;
                    };
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match tls.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let _ = tls.write_all(&reply).await;
                    let _ = tls.shutdown().await;
                });
            }
        });

        Self { addr, connections }
    }

    fn url(&self, path: &str) -> String {
        format!("https://{DOMAIN}:{}{path}", self.addr.port())
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn ok_reply(body: &[u8]) -> Vec<u8> {
    let mut reply = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    reply.extend_from_slice(body);
    reply
}

fn redirect_reply(location: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 302 Found\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    )
    .into_bytes()
}

fn jpeg(len: usize) -> Vec<u8> {
    let mut body = vec![0xFF, 0xD8, 0xFF, 0xE0];
    body.resize(len, 0x33);
    body
}

struct Harness {
    _dir: TempDir,
    resources: PathBuf,
    logs: PathBuf,
    fetcher: TextureFetcher,
}

impl Harness {
    fn new(pins: PinnedCertificateSet, server: &TlsServer, https_only: bool) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let resources = dir.path().join("Resources");
        let logs = dir.path().join("Logs");
        let audit = Arc::new(SecureLogger::in_dir(&logs));

        let mut roots = RootCertStore::empty();
        roots
            .add(CertificateDer::from(CA_DER.to_vec()))
            .expect("test CA should be a valid trust anchor");
        let pinner = Arc::new(
            CertificatePinner::with_roots(pins, roots, Arc::clone(&audit))
                .expect("pinner should build"),
        );

        let client = reqwest::Client::builder()
            .use_preconfigured_tls(
                pinned_tls_config(Arc::clone(&pinner)).expect("TLS config should build"),
            )
            .resolve(DOMAIN, server.addr)
            .redirect(redirect_policy())
            .https_only(https_only)
            .build()
            .expect("client should build");

        let fetcher = TextureFetcher::new(
            client,
            resources.clone(),
            Arc::new(RetryRegistry::with_limits(
                RetryScope::Shared,
                5,
                Duration::from_millis(1),
            )),
            audit,
        )
        .with_pinner(pinner);

        Self {
            _dir: dir,
            resources,
            logs,
            fetcher,
        }
    }

    fn audit_log(&self) -> String {
        std::fs::read_to_string(self.logs.join(AUDIT_LOG_FILE_NAME)).unwrap_or_default()
    }

    fn seed(&self, name: &str, bytes: &[u8]) {
        std::fs::create_dir_all(&self.resources).expect("create resources");
        std::fs::write(self.resources.join(name), bytes).expect("seed texture");
    }
}

fn pins(pin: &str) -> PinnedCertificateSet {
    PinnedCertificateSet::new()
        .with_pin(DOMAIN, pin)
        .expect("valid pin")
}

fn goes_east(server: &TlsServer) -> TextureDescriptor {
    TextureDescriptor::remote(
        TextureKind::GoesEast,
        server.url("/GOES19/ABI/FD/GEOCOLOR/1808x1808.jpg"),
        "goes_east.jpg",
    )
}

#[tokio::test]
async fn pinned_server_is_downloaded_over_tls() {
    let body = jpeg(64 * 1024);
    let server = TlsServer::start(ok_reply(&body)).await;
    let harness = Harness::new(pins(LEAF_PIN), &server, true);

    let outcome = harness.fetcher.fetch(&goes_east(&server)).await;

    match outcome {
        FetchOutcome::Downloaded(image) => assert_eq!(image.bytes, body),
        other => panic!("Expected Downloaded, got {:?}", other),
    }
    assert_eq!(server.connections(), 1);
    assert_eq!(
        harness
            .fetcher
            .stats()
            .get_error_count(ErrorType::PinningRejected),
        0
    );
    assert!(!harness.audit_log().contains("Certificate pinning rejected"));
}

#[tokio::test]
async fn mismatched_pin_is_rejected_on_every_attempt_and_falls_back() {
    let server = TlsServer::start(ok_reply(&jpeg(1024))).await;
    let harness = Harness::new(pins(ROGUE_PIN), &server, true);
    let stored = jpeg(2048);
    harness.seed("goes_east.jpg", &stored);

    let outcome = harness.fetcher.fetch(&goes_east(&server)).await;

    match outcome {
        FetchOutcome::Cached(image) => assert_eq!(image.bytes, stored),
        other => panic!("Expected Cached, got {:?}", other),
    }
    assert_eq!(server.connections(), REQUESTS_PER_FETCH);
    let stats = harness.fetcher.stats();
    assert_eq!(
        stats.get_error_count(ErrorType::PinningRejected),
        REQUESTS_PER_FETCH
    );
    assert_eq!(stats.total_errors(), REQUESTS_PER_FETCH);

    let log = harness.audit_log();
    assert_eq!(
        str::matches(
            &log,
            "] [ERROR] Certificate pinning rejected imagery.earth-viewer.test: leaf public key does not match any pin"
        )
        .count(),
        REQUESTS_PER_FETCH
    );
    assert!(!log.contains("cddd7dac0c65aab8"));
}

#[tokio::test]
async fn unpinned_domain_fails_closed_without_stored_copy() {
    let server = TlsServer::start(ok_reply(&jpeg(1024))).await;
    let harness = Harness::new(PinnedCertificateSet::new(), &server, true);

    let outcome = harness.fetcher.fetch(&goes_east(&server)).await;

    assert_eq!(outcome, FetchOutcome::Unavailable);
    assert_eq!(
        harness
            .fetcher
            .stats()
            .get_error_count(ErrorType::PinningRejected),
        REQUESTS_PER_FETCH
    );
    assert!(harness
        .audit_log()
        .contains("no pins configured for imagery.earth-viewer.test"));
    assert!(!harness.resources.join("goes_east.jpg").exists());
}

#[tokio::test]
async fn redirect_from_pinned_https_to_plain_http_is_refused() {
    // No expectations: any request reaching this server fails the test on drop.
    let plain = Server::run();
    let server = TlsServer::start(redirect_reply(&plain.url_str("/goes_east.jpg"))).await;
    // Plain HTTP allowed, as with --allow-insecure-http.
    let harness = Harness::new(pins(LEAF_PIN), &server, false);

    let outcome = harness.fetcher.fetch(&goes_east(&server)).await;

    assert_eq!(outcome, FetchOutcome::Unavailable);
    assert_eq!(server.connections(), REQUESTS_PER_FETCH);
    let stats = harness.fetcher.stats();
    assert_eq!(
        stats.get_error_count(ErrorType::HttpRequestRedirectError),
        REQUESTS_PER_FETCH
    );
    assert_eq!(stats.get_error_count(ErrorType::PinningRejected), 0);
}
