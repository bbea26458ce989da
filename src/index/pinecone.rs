//! Pinecone REST client implementing [`VectorStore`].
//!
//! The control plane (`/indexes`) resolves or creates the index; the data
//! plane host serves `/vectors/upsert` and `/query`.

use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ChunkMetadata, IndexError, RetrievedChunk, VectorRecord, VectorStore};
use crate::config::{IndexConfig, PineconeCredentials};

const API_VERSION: &str = "2024-07";

/// Vectors per upsert request; keeps bodies well under the 2 MB limit.
const UPSERT_BATCH: usize = 50;

const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const READY_TIMEOUT: Duration = Duration::from_secs(300);

pub struct PineconeStore {
    client: Client,
    host: String,
    namespace: Option<String>,
}

fn build_client(api_key: &str, timeout: Option<Duration>) -> Result<Client, IndexError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Api-Key",
        HeaderValue::from_str(api_key.trim())
            .map_err(|_| IndexError::Config("invalid Pinecone API key".into()))?,
    );
    headers.insert(
        "X-Pinecone-API-Version",
        HeaderValue::from_static(API_VERSION),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

/// Data-plane hosts come back without a scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn check_status(resp: Response) -> Result<Response, IndexError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(IndexError::Api {
        status: status.as_u16(),
        body,
    })
}

// ── Control plane ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: String,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'static str,
    spec: IndexSpec<'a>,
}

#[derive(Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

struct ControlPlane<'a> {
    client: &'a Client,
    base: String,
}

impl ControlPlane<'_> {
    fn describe(&self, name: &str) -> Result<Option<IndexDescription>, IndexError> {
        let resp = self
            .client
            .get(format!("{}/indexes/{name}", self.base))
            .send()?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check_status(resp)?.json()?))
    }

    fn create(&self, request: &CreateIndexRequest<'_>) -> Result<(), IndexError> {
        let resp = self
            .client
            .post(format!("{}/indexes", self.base))
            .json(request)
            .send()?;
        // 409: created concurrently by someone else
        if resp.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        check_status(resp)?;
        Ok(())
    }

    fn wait_until_ready(&self, name: &str) -> Result<IndexDescription, IndexError> {
        let started = Instant::now();
        loop {
            if let Some(desc) = self.describe(name)? {
                if desc.status.ready {
                    return Ok(desc);
                }
                debug!(index = name, state = %desc.status.state, "waiting for index");
            }
            if started.elapsed() >= READY_TIMEOUT {
                return Err(IndexError::Config(format!(
                    "index {name} not ready after {}s",
                    READY_TIMEOUT.as_secs()
                )));
            }
            thread::sleep(READY_POLL_INTERVAL);
        }
    }
}

// ── Data plane ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a ChunkMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f64,
    metadata: Option<MatchMetadata>,
}

/// Pinecone returns numeric metadata as floats.
#[derive(Debug, Deserialize)]
struct MatchMetadata {
    text: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    page: Option<f64>,
    #[serde(default)]
    position: f64,
}

impl PineconeStore {
    /// Connects to an already-resolved data-plane host.
    pub fn with_host(
        api_key: &str,
        host: &str,
        namespace: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, IndexError> {
        if api_key.trim().is_empty() {
            return Err(IndexError::Config("missing Pinecone API key".into()));
        }
        Ok(Self {
            client: build_client(api_key, timeout)?,
            host: normalize_host(host),
            namespace,
        })
    }

    /// Resolves the index host, creating the index first when
    /// `create_if_missing` is set and it does not exist.
    pub fn connect(
        creds: &PineconeCredentials,
        settings: &IndexConfig,
        dimension: usize,
        create_if_missing: bool,
        timeout: Option<Duration>,
    ) -> Result<Self, IndexError> {
        match &creds.host {
            Some(host) if !create_if_missing => {
                return Self::with_host(&creds.api_key, host, settings.namespace.clone(), timeout);
            }
            _ => {}
        }

        let client = build_client(&creds.api_key, timeout)?;
        let control = ControlPlane {
            client: &client,
            base: settings.pinecone_controller.trim_end_matches('/').to_string(),
        };
        let name = creds.index_name.as_str();

        let desc = match control.describe(name)? {
            Some(desc) if desc.status.ready || !create_if_missing => desc,
            Some(_) => control.wait_until_ready(name)?,
            None if create_if_missing => {
                info!(
                    index = name,
                    dimension,
                    region = %creds.environment,
                    "creating Pinecone index"
                );
                control.create(&CreateIndexRequest {
                    name,
                    dimension,
                    metric: "cosine",
                    spec: IndexSpec {
                        serverless: ServerlessSpec {
                            cloud: &settings.pinecone_cloud,
                            region: &creds.environment,
                        },
                    },
                })?;
                control.wait_until_ready(name)?
            }
            None => {
                return Err(IndexError::Config(format!(
                    "Pinecone index {name} does not exist; run ingestion first"
                )));
            }
        };

        let host = creds.host.as_deref().unwrap_or(&desc.host);
        Ok(Self {
            client,
            host: normalize_host(host),
            namespace: settings.namespace.clone(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl VectorStore for PineconeStore {
    fn upsert(&self, records: &[VectorRecord]) -> Result<usize, IndexError> {
        let mut total = 0;
        for batch in records.chunks(UPSERT_BATCH) {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|r| UpsertVector {
                        id: &r.id,
                        values: &r.values,
                        metadata: &r.metadata,
                    })
                    .collect(),
                namespace: self.namespace.as_deref(),
            };
            let resp = self
                .client
                .post(format!("{}/vectors/upsert", self.host))
                .json(&request)
                .send()?;
            let parsed: UpsertResponse = check_status(resp)?.json()?;
            total += parsed.upserted_count;
        }
        Ok(total)
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };
        let resp = self
            .client
            .post(format!("{}/query", self.host))
            .json(&request)
            .send()?;
        let parsed: QueryResponse = check_status(resp)?.json()?;

        parsed
            .matches
            .into_iter()
            .map(|m| {
                let meta = m.metadata.ok_or_else(|| {
                    IndexError::InvalidResponse(format!("match {} has no metadata", m.id))
                })?;
                Ok(RetrievedChunk {
                    id: m.id,
                    source: meta.source,
                    page: meta.page.map(|p| p as u32),
                    position: meta.position as usize,
                    text: meta.text,
                    score: m.score,
                })
            })
            .collect()
    }
}
