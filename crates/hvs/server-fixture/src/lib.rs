//! A stub HVS fixture for testing.
//!
//! Serves the host key certification endpoints over TLS with a certificate
//! generated at startup, answers every certification request with a canned
//! response and records the requests it receives.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::{
    body::Incoming,
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    HeaderMap, Method, Request, Response,
};
use hyper_util::rt::TokioIo;
use rcgen::{BasicConstraints, CertificateParams, CertifiedKey, DnType, IsCa, KeyPair};
use rustls::{Certificate, PrivateKey, ServerConfig};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error};

pub use hyper::StatusCode;

/// The domain name bound to the fixture certificates.
pub static SERVER_DOMAIN: &str = "hvs.test";
/// Path prefix under which the stub serves its endpoints.
pub static BASE_PATH: &str = "/hvs/v2";
/// Endpoints answered with the canned response, relative to [`BASE_PATH`].
pub static CERTIFY_ENDPOINTS: [&str; 2] = [
    "/rpc/certify-host-binding-key",
    "/rpc/certify-host-signing-key",
];

/// TLS identity presented by the stub.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    /// DER certificates, leaf first.
    pub chain: Vec<Vec<u8>>,
    /// PKCS#8 DER private key of the leaf certificate.
    pub key_der: Vec<u8>,
}

impl ServerIdentity {
    /// Generates a self-signed leaf certificate.
    pub fn self_signed() -> anyhow::Result<Self> {
        let CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(vec![
            SERVER_DOMAIN.to_string(),
            "127.0.0.1".to_string(),
        ])?;

        Ok(Self {
            chain: vec![cert.der().to_vec()],
            key_der: key_pair.serialize_der(),
        })
    }

    /// Generates a leaf certificate signed by a freshly generated CA and
    /// presents both, leaf first.
    pub fn ca_signed() -> anyhow::Result<Self> {
        let ca_key = KeyPair::generate()?;
        let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "HVS Test Root CA");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key)?;

        let leaf_key = KeyPair::generate()?;
        let leaf_params =
            CertificateParams::new(vec![SERVER_DOMAIN.to_string(), "127.0.0.1".to_string()])?;
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key)?;

        Ok(Self {
            chain: vec![leaf_cert.der().to_vec(), ca_cert.der().to_vec()],
            key_der: leaf_key.serialize_der(),
        })
    }

    /// Returns the DER leaf certificate.
    pub fn leaf(&self) -> &[u8] {
        &self.chain[0]
    }
}

/// Response returned for every certification request.
#[derive(Debug, Clone)]
pub struct StubResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response body.
    pub body: Bytes,
}

impl StubResponse {
    /// Creates a new canned response.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// A request received by the stub.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

struct State {
    response: Mutex<StubResponse>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// A running stub HVS. The server stops when this is dropped.
pub struct StubHvs {
    addr: SocketAddr,
    identity: ServerIdentity,
    state: Arc<State>,
    task: JoinHandle<()>,
}

impl StubHvs {
    /// Starts a stub presenting a self-signed certificate on a random local
    /// port.
    pub async fn start(response: StubResponse) -> anyhow::Result<Self> {
        Self::start_with_identity(ServerIdentity::self_signed()?, response).await
    }

    /// Starts a stub presenting the given identity on a random local port.
    pub async fn start_with_identity(
        identity: ServerIdentity,
        response: StubResponse,
    ) -> anyhow::Result<Self> {
        let certificates = identity.chain.iter().cloned().map(Certificate).collect();
        let mut server_config = ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(certificates, PrivateKey(identity.key_der.clone()))?;
        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(State {
            response: Mutex::new(response),
            requests: Mutex::new(Vec::new()),
        });

        debug!("Stub HVS listening at {addr}");

        let task = tokio::spawn(serve(listener, acceptor, state.clone()));

        Ok(Self {
            addr,
            identity,
            state,
            task,
        })
    }

    /// Returns the base URL of the stub, including [`BASE_PATH`].
    pub fn base_url(&self) -> String {
        format!("https://127.0.0.1:{}{}", self.addr.port(), BASE_PATH)
    }

    /// Returns the presented identity.
    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Replaces the canned response.
    pub fn set_response(&self, response: StubResponse) {
        *lock(&self.state.response) = response;
    }

    /// Returns the requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state.requests).clone()
    }
}

impl Drop for StubHvs {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn serve(listener: TcpListener, acceptor: TlsAcceptor, state: Arc<State>) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                error!("Failed to accept connection: {err}");
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(socket).await {
                Ok(stream) => stream,
                Err(err) => {
                    debug!("TLS handshake with {peer} failed: {err}");
                    return;
                }
            };

            let service = service_fn(move |request| handle(state.clone(), request));
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Connection with {peer} closed with error: {err}");
            }
        });
    }
}

async fn handle(
    state: Arc<State>,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = request.into_parts();
    let body = body.collect().await?.to_bytes();
    let path = parts.uri.path().to_string();

    let is_certify_endpoint = path
        .strip_prefix(BASE_PATH)
        .is_some_and(|endpoint| CERTIFY_ENDPOINTS.contains(&endpoint));

    lock(&state.requests).push(RecordedRequest {
        method: parts.method.clone(),
        path,
        headers: parts.headers,
        body,
    });

    let (status, body) = if parts.method == Method::POST && is_certify_endpoint {
        let canned = lock(&state.response).clone();
        (canned.status, canned.body)
    } else {
        (StatusCode::NOT_FOUND, Bytes::from_static(b"not found"))
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(response)
}
