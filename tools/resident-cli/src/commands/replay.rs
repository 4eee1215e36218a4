//! Send requests through an in-process bridge and show what came back.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context as _, Result};
use resident_kernel::resident_core::{
    IncomingRequest, Method, OutgoingBody, OutgoingResponse, StreamFrame, UploadStatus,
    UploadedFile,
};
use resident_kernel::resident_quarantine::QuarantineReport;
use resident_kernel::resident_session::MemorySessionStore;
use resident_kernel::Bridge;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{factory, ReplayArgs};
use crate::context::Context;
use crate::output::{format_bytes, status_badge};

/// One request as described in a replay file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub target: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub files: Vec<ReplayFile>,
}

/// An uploaded file in a replay file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayFile {
    pub field: String,
    pub filename: String,
    #[serde(default = "default_media_type")]
    pub media_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_status")]
    pub status: UploadStatus,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_media_type() -> String {
    "application/octet-stream".to_string()
}

fn default_status() -> UploadStatus {
    UploadStatus::Ok
}

impl ReplayRequest {
    fn to_incoming(&self) -> Result<IncomingRequest> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("Invalid method {:?}", self.method))?;

        let mut request = IncomingRequest::from_target(method, &self.target);
        for (name, value) in &self.headers {
            request = request.with_header(name, value);
        }
        if let Some(body) = &self.body {
            request = request.with_body(body.as_bytes().to_vec());
        }
        for file in &self.files {
            request = request.with_file(if file.status.is_ok() {
                UploadedFile::ok(
                    &file.field,
                    &file.filename,
                    &file.media_type,
                    file.content.as_bytes().to_vec(),
                )
            } else {
                UploadedFile::failed(&file.field, &file.filename, file.status)
            });
        }
        Ok(request)
    }
}

/// What one replayed request produced.
#[derive(Debug, Serialize)]
pub struct ReplayResult {
    pub method: String,
    pub target: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub streamed: Option<StreamSummary>,
    pub quarantine: QuarantineSummary,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct StreamSummary {
    pub chunks: usize,
    pub bytes: usize,
    pub complete: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct QuarantineSummary {
    pub actions_run: usize,
    pub failures: usize,
    pub session_closed: bool,
    pub uploads_removed: usize,
    pub output_discarded: usize,
    pub headers_discarded: usize,
}

impl From<&QuarantineReport> for QuarantineSummary {
    fn from(report: &QuarantineReport) -> Self {
        Self {
            actions_run: report.actions_run,
            failures: report.failures.len(),
            session_closed: report.session_closed,
            uploads_removed: report.uploads.removed,
            output_discarded: report.output_discarded,
            headers_discarded: report.headers_discarded,
        }
    }
}

/// Drives a bridge like a transport would, optionally acting as a browser
/// that returns cookies.
pub struct Replayer {
    bridge: Bridge,
    jar: Option<Vec<(String, String)>>,
}

impl Replayer {
    pub fn new(bridge: Bridge, keep_cookies: bool) -> Self {
        Self {
            bridge,
            jar: keep_cookies.then(Vec::new),
        }
    }

    pub async fn send(&mut self, request: &ReplayRequest) -> Result<ReplayResult> {
        let mut incoming = request.to_incoming()?;
        if let Some(jar) = &self.jar {
            for (name, value) in jar {
                incoming = incoming.with_cookie(name, value);
            }
        }

        let started = Instant::now();
        let mut frames: Vec<StreamFrame> = Vec::new();
        let response = self.bridge.handle(incoming, &mut frames).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Some(jar) = &mut self.jar {
            remember_cookies(jar, &response);
        }

        let quarantine = self
            .bridge
            .last_quarantine()
            .map(QuarantineSummary::from)
            .unwrap_or_default();

        Ok(summarize(request, response, &frames, quarantine, elapsed_ms))
    }
}

fn summarize(
    request: &ReplayRequest,
    response: OutgoingResponse,
    frames: &[StreamFrame],
    quarantine: QuarantineSummary,
    elapsed_ms: u64,
) -> ReplayResult {
    let (body, streamed) = match &response.body {
        OutgoingBody::Buffered(bytes) => (String::from_utf8_lossy(bytes).into_owned(), None),
        OutgoingBody::Streamed {
            chunks,
            bytes,
            complete,
        } => {
            let data: Vec<u8> = frames
                .iter()
                .filter_map(|frame| match frame {
                    StreamFrame::Data(chunk) => Some(chunk.as_slice()),
                    _ => None,
                })
                .flatten()
                .copied()
                .collect();
            let summary = StreamSummary {
                chunks: *chunks,
                bytes: *bytes,
                complete: *complete,
            };
            (String::from_utf8_lossy(&data).into_owned(), Some(summary))
        }
    };

    ReplayResult {
        method: request.method.to_ascii_uppercase(),
        target: request.target.clone(),
        status: response.status.as_u16(),
        headers: response
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        body,
        streamed,
        quarantine,
        elapsed_ms,
    }
}

/// Store `name=value` from every `Set-Cookie`, replacing older values.
fn remember_cookies(jar: &mut Vec<(String, String)>, response: &OutgoingResponse) {
    for header in response.headers.get_all("Set-Cookie") {
        let pair = header.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim().to_string();
        jar.retain(|(existing, _)| *existing != name);
        jar.push((name, value.trim().to_string()));
    }
}

/// Parse a `Name: value` header argument.
fn parse_header(raw: &str) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("Invalid header {:?}, expected `Name: value`", raw),
    }
}

fn load_requests(path: &Path) -> Result<Vec<ReplayRequest>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse replay file: {}", path.display()))
}

/// Run the replay command.
pub async fn run(args: ReplayArgs, ctx: &Context) -> Result<()> {
    let requests = match &args.file {
        Some(path) => load_requests(path)?,
        None => vec![ReplayRequest {
            method: args.method.clone(),
            target: args.target.clone(),
            headers: args
                .headers
                .iter()
                .map(|raw| parse_header(raw))
                .collect::<Result<_>>()?,
            body: args.body.clone(),
            files: Vec::new(),
        }],
    };

    let config = &ctx.config;
    let identifier = args
        .bootstrap
        .clone()
        .unwrap_or_else(|| config.bootstrap.identifier.clone());

    let mut bridge = Bridge::from_config(config, Arc::new(MemorySessionStore::new()));
    if let Err(e) = bridge.bootstrap(
        &factory(),
        &identifier,
        &config.bootstrap.env,
        config.bootstrap.debug,
    ) {
        ctx.output
            .warn(&format!("Bootstrap failed, requests will be refused: {}", e));
    }

    info!(
        bootstrap = %identifier,
        requests = requests.len(),
        rounds = args.repeat.max(1),
        "replaying requests"
    );
    let mut replayer = Replayer::new(bridge, args.keep_cookies);
    let mut results = Vec::new();
    for _ in 0..args.repeat.max(1) {
        for request in &requests {
            let result = replayer.send(request).await?;
            print_result(&result, ctx);
            results.push(result);
        }
    }

    if ctx.output.is_json() {
        ctx.output.json(&results);
    }
    Ok(())
}

fn print_result(result: &ReplayResult, ctx: &Context) {
    let Ok(status) = resident_kernel::resident_core::StatusCode::from_u16(result.status) else {
        return;
    };
    ctx.output
        .header(&format!("{} {}", result.method, result.target));
    ctx.output.kv("Status", &status_badge(status));
    for (name, value) in &result.headers {
        ctx.output.kv(name, value);
    }
    if let Some(streamed) = &result.streamed {
        ctx.output.kv(
            "Streamed",
            &format!(
                "{} chunks, {}{}",
                streamed.chunks,
                format_bytes(streamed.bytes as u64),
                if streamed.complete { "" } else { " (aborted)" }
            ),
        );
    }
    ctx.output.raw(&result.body);

    let q = &result.quarantine;
    ctx.output.debug(&format!(
        "quarantine: {} actions, {} failures, session closed: {}, {} uploads removed, {} headers discarded ({} ms)",
        q.actions_run,
        q.failures,
        q.session_closed,
        q.uploads_removed,
        q.headers_discarded,
        result.elapsed_ms,
    ));
    if q.failures > 0 {
        ctx.output
            .warn(&format!("{} quarantine steps failed", q.failures));
    }
}
