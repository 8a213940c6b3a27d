//! In-process stand-in for the Blob service.
//!
//! Serves path-style URLs (`/{account}/{container}/{*blob}`) the way the
//! Azurite emulator does, keeps blobs in memory, and checks what a real
//! endpoint checks: Shared Key signatures, SAS signatures and expiry, and the
//! transactional Content-MD5.

#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::Response,
    routing::{head, put},
};
use azure_blob_exporter::{
    models::{
        content_settings::ContentSetting,
        credentials::{DEV_ACCOUNT_KEY, DEV_ACCOUNT_NAME, StorageCredentials},
        metadata::METADATA_HEADER_PREFIX,
    },
    services::{auth, sas},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Url;
use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
    sync::{Arc, RwLock},
};
use tokio::{net::TcpListener, task::JoinHandle};

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub data: Bytes,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    /// Content settings keyed by response header name.
    pub content_headers: BTreeMap<&'static str, String>,
    pub metadata: BTreeMap<String, String>,
}

type Containers = HashMap<String, HashMap<String, StoredBlob>>;

#[derive(Clone)]
struct MockState {
    credentials: Arc<StorageCredentials>,
    containers: Arc<RwLock<Containers>>,
}

pub struct MockBlobService {
    pub addr: SocketAddr,
    state: MockState,
    server: JoinHandle<()>,
}

impl MockBlobService {
    /// Start a mock endpoint that already has `containers`.
    pub async fn start(containers: &[&str]) -> Self {
        let credentials = StorageCredentials::from_account_key(DEV_ACCOUNT_NAME, DEV_ACCOUNT_KEY)
            .expect("emulator credentials");
        let state = MockState {
            credentials: Arc::new(credentials),
            containers: Arc::new(RwLock::new(
                containers
                    .iter()
                    .map(|name| (name.to_string(), HashMap::new()))
                    .collect(),
            )),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("mock address");
        let app = routes().with_state(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn blob_endpoint(&self) -> String {
        format!("http://{}/{}", self.addr, DEV_ACCOUNT_NAME)
    }

    /// Connection string for the emulator account pointed at this server.
    pub fn connection_string(&self) -> String {
        format!(
            "DefaultEndpointsProtocol=http;AccountName={};AccountKey={};BlobEndpoint={}",
            DEV_ACCOUNT_NAME,
            DEV_ACCOUNT_KEY,
            self.blob_endpoint()
        )
    }

    pub fn credentials(&self) -> StorageCredentials {
        StorageCredentials::from_connection_string(&self.connection_string())
            .expect("mock connection string")
    }

    pub fn stored(&self, container: &str, blob: &str) -> Option<StoredBlob> {
        self.state
            .containers
            .read()
            .unwrap()
            .get(container)
            .and_then(|blobs| blobs.get(blob))
            .cloned()
    }
}

impl Drop for MockBlobService {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn routes() -> Router<MockState> {
    Router::new()
        .route("/{account}/{container}", head(container_properties))
        .route(
            "/{account}/{container}/{*blob}",
            put(put_blob).get(get_blob).head(head_blob),
        )
}

/// HEAD `/{account}/{container}?restype=container`
async fn container_properties(
    State(state): State<MockState>,
    Path((account, container)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = check_shared_key(&state, &account, &method, &uri, &headers) {
        return resp;
    }
    if state.containers.read().unwrap().contains_key(&container) {
        empty(StatusCode::OK)
    } else {
        error(StatusCode::NOT_FOUND, "ContainerNotFound", "The specified container does not exist.")
    }
}

/// PUT `/{account}/{container}/{*blob}` (Put Blob)
async fn put_blob(
    State(state): State<MockState>,
    Path((account, container, blob)): Path<(String, String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = check_shared_key(&state, &account, &method, &uri, &headers) {
        return resp;
    }

    let expected_md5 = general_purpose::STANDARD.encode(md5::compute(&body).0);
    if let Some(sent) = headers.get("content-md5").and_then(|v| v.to_str().ok()) {
        if sent != expected_md5 {
            return error(StatusCode::BAD_REQUEST, "Md5Mismatch", "MD5 mismatch");
        }
    }

    let mut containers = state.containers.write().unwrap();
    let Some(blobs) = containers.get_mut(&container) else {
        return error(StatusCode::NOT_FOUND, "ContainerNotFound", "The specified container does not exist.");
    };

    let content_headers = ContentSetting::all()
        .filter_map(|setting| {
            let value = headers.get(setting.request_header())?.to_str().ok()?;
            Some((setting.response_header(), value.to_string()))
        })
        .collect();
    let metadata = headers
        .iter()
        .filter_map(|(key, value)| {
            let key = key.as_str().strip_prefix(METADATA_HEADER_PREFIX)?;
            Some((key.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();

    let stored = StoredBlob {
        etag: format!("\"{:x}-{}\"", md5::compute(&body), uuid::Uuid::new_v4().simple()),
        data: body,
        last_modified: Utc::now(),
        content_headers,
        metadata,
    };

    let mut response = empty(StatusCode::CREATED);
    set_validators(response.headers_mut(), &stored);
    blobs.insert(blob, stored);
    response
}

/// GET `/{account}/{container}/{*blob}`, Shared Key or SAS.
async fn get_blob(
    State(state): State<MockState>,
    Path((account, container, blob)): Path<(String, String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    read_blob(&state, &account, &container, &blob, &method, &uri, &headers, true)
}

/// HEAD `/{account}/{container}/{*blob}`, GET headers without the body.
async fn head_blob(
    State(state): State<MockState>,
    Path((account, container, blob)): Path<(String, String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    read_blob(&state, &account, &container, &blob, &method, &uri, &headers, false)
}

#[allow(clippy::too_many_arguments)]
fn read_blob(
    state: &MockState,
    account: &str,
    container: &str,
    blob: &str,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    with_body: bool,
) -> Response {
    let authorized = if headers.contains_key(header::AUTHORIZATION) {
        check_shared_key(state, account, method, uri, headers)
    } else {
        check_sas(state, account, container, blob, uri)
    };
    if let Err(resp) = authorized {
        return resp;
    }

    let containers = state.containers.read().unwrap();
    let Some(blobs) = containers.get(container) else {
        return error(StatusCode::NOT_FOUND, "ContainerNotFound", "The specified container does not exist.");
    };
    let Some(stored) = blobs.get(blob) else {
        return error(StatusCode::NOT_FOUND, "BlobNotFound", "The specified blob does not exist.");
    };

    let mut response = if with_body {
        Response::new(Body::from(stored.data.clone()))
    } else {
        Response::new(Body::empty())
    };
    let out = response.headers_mut();
    set_validators(out, stored);
    out.insert(header::CONTENT_LENGTH, HeaderValue::from(stored.data.len()));
    for (name, value) in &stored.content_headers {
        if let Ok(value) = HeaderValue::from_str(value) {
            out.insert(*name, value);
        }
    }
    for (key, value) in &stored.metadata {
        if let (Ok(name), Ok(value)) = (
            header::HeaderName::from_bytes(format!("{}{}", METADATA_HEADER_PREFIX, key).as_bytes()),
            HeaderValue::from_str(value),
        ) {
            out.insert(name, value);
        }
    }
    response
}

fn check_shared_key(
    state: &MockState,
    account: &str,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<(), Response> {
    let forbidden = || {
        error(
            StatusCode::FORBIDDEN,
            "AuthenticationFailed",
            "Server failed to authenticate the request.",
        )
    };
    if account != state.credentials.account_name {
        return Err(forbidden());
    }
    let Some(sent) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("SharedKey "))
    else {
        return Err(forbidden());
    };

    let url = Url::parse(&format!("http://mock{}", uri)).map_err(|_| forbidden())?;
    let to_sign = auth::string_to_sign(method.as_str(), &url, headers, account);
    let expected = auth::compute_signature(&state.credentials, &to_sign).map_err(|_| forbidden())?;
    if sent != format!("{}:{}", account, expected) {
        return Err(forbidden());
    }
    Ok(())
}

fn check_sas(
    state: &MockState,
    account: &str,
    container: &str,
    blob: &str,
    uri: &Uri,
) -> Result<(), Response> {
    let forbidden = |message: &str| error(StatusCode::FORBIDDEN, "AuthenticationFailed", message);
    if account != state.credentials.account_name {
        return Err(forbidden("unknown account"));
    }

    let url = Url::parse(&format!("http://mock{}", uri)).map_err(|_| forbidden("bad uri"))?;
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    let field = |name: &str| params.get(name).map(String::as_str).unwrap_or("");

    if !field("sp").contains('r') {
        return Err(forbidden("read permission not granted"));
    }
    let expiry = NaiveDateTime::parse_from_str(field("se"), sas::SAS_TIME_FORMAT)
        .map_err(|_| forbidden("bad expiry"))?
        .and_utc();
    if expiry <= Utc::now() {
        return Err(forbidden("Signed expiry time has passed"));
    }

    let to_sign = sas::string_to_sign(
        field("sp"),
        field("se"),
        &sas::canonical_resource(account, container, blob),
        field("sv"),
        field("sr"),
    );
    let expected =
        auth::compute_signature(&state.credentials, &to_sign).map_err(|_| forbidden("bad key"))?;
    if expected != field("sig") {
        return Err(forbidden("Signature did not match"));
    }
    Ok(())
}

fn set_validators(headers: &mut HeaderMap, stored: &StoredBlob) {
    if let Ok(value) = HeaderValue::from_str(&stored.etag) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&auth::http_date(stored.last_modified)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn error(status: StatusCode, code: &'static str, message: &str) -> Response {
    let xml = format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<Error><Code>{}</Code><Message>{}</Message></Error>"#
        ),
        code, message
    );
    let mut response = Response::new(Body::from(xml));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
    headers.insert("x-ms-error-code", HeaderValue::from_static(code));
    response
}
