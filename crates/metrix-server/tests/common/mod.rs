#![allow(dead_code)]

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use flate2::write::GzEncoder;
use flate2::Compression;
use metrix_common::crypto::{PayloadDecryptor, PayloadEncryptor};
use metrix_common::signing::Signer;
use metrix_common::MetricStore;
use metrix_server::app;
use metrix_server::ingest::IngestPipeline;
use metrix_server::middleware::TrustedSubnet;
use metrix_server::state::AppState;
use metrix_storage::file::FileSnapshotStore;
use metrix_storage::manager::PersistenceManager;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const TEST_KEY: &str = "test-secret";

#[derive(Default)]
pub struct Options {
    pub key: Option<&'static str>,
    pub decryptor: Option<PayloadDecryptor>,
    pub trusted_subnet: Option<&'static str>,
    /// Save to `metrics.json` in the temp dir after every ingest.
    pub sync_file: bool,
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub store: Arc<MetricStore>,
    pub state: AppState,
    pub app: axum::Router,
}

impl TestContext {
    pub fn snapshot_path(&self) -> PathBuf {
        self.temp_dir.path().join("metrics.json")
    }
}

pub fn build_test_context(options: Options) -> TestContext {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MetricStore::new());

    let persistence = options.sync_file.then(|| {
        PersistenceManager::new(
            Arc::new(FileSnapshotStore::new(temp_dir.path().join("metrics.json"))),
            Arc::clone(&store),
            Duration::ZERO,
        )
    });
    let signer = options.key.map(|k| Signer::new(k).expect("hmac key"));
    let subnet = options
        .trusted_subnet
        .map(|s| s.parse::<TrustedSubnet>().expect("cidr"));

    let pipeline = IngestPipeline::new(Arc::clone(&store))
        .with_signer(signer)
        .with_decryptor(options.decryptor)
        .with_persistence(persistence);
    let state = AppState::new(pipeline, subnet);
    let app = app::build_http_app(state.clone());

    TestContext {
        temp_dir,
        store,
        state,
        app,
    }
}

/// 1024-bit pair, small enough to keep tests fast.
pub fn key_pair() -> (PayloadEncryptor, PayloadDecryptor) {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, 1024).expect("rsa key");
    let public = RsaPublicKey::from(&private);
    let public_pem = public.to_public_key_pem(LineEnding::LF).expect("public pem");
    let private_pem = private.to_pkcs8_pem(LineEnding::LF).expect("private pem");
    (
        PayloadEncryptor::from_pem(&public_pem).expect("encryptor"),
        PayloadDecryptor::from_pem(&private_pem).expect("decryptor"),
    )
}

pub fn gzip(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response should be json")
    }
}

pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body)).expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    Reply {
        status,
        headers,
        body,
    }
}

pub async fn post_json(app: &axum::Router, uri: &str, body: &str) -> Reply {
    send(
        app,
        "POST",
        uri,
        &[("content-type", "application/json")],
        body.as_bytes().to_vec(),
    )
    .await
}

pub async fn get(app: &axum::Router, uri: &str) -> Reply {
    send(app, "GET", uri, &[], Vec::new()).await
}
