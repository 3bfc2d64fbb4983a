//! Development server with live reload support.
//!
//! Built on `tiny_http`:
//!
//! - `/static/...` is served from the static directory
//! - `/reload` streams rebuild events (only with reload enabled)
//! - everything else is served from the build output
//! - graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Watcher Thread  │     │  Stream Threads  │
//! │  (HTTP Server)  │     │  (File Monitor)  │     │  (one per /reload)│
//! └────────┬────────┘     └────────┬─────────┘     └────────┬─────────┘
//!          │                       │  notify()              │ wait()
//!          ▼                       └──────► ReloadChannel ◄─┘
//!    Serve files                   │
//!          ▲                       ▼
//!          └──────────── config.build.output
//! ```
//!
//! No lock guards the output tree: a request served mid-rebuild may see a
//! partially written file.

mod files;
mod reload;

pub use reload::ReloadChannel;

use crate::{config::SiteConfig, log, watch::watch_for_changes_blocking};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use files::Resolved;
use std::{
    borrow::Cow,
    fs,
    net::{IpAddr, SocketAddr},
    path::Path,
    sync::Arc,
    thread,
    time::SystemTime,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

/// URL prefix mapped onto the static directory
const STATIC_PREFIX: &str = "/static/";

/// HTTP date format used by `Last-Modified`
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

// ============================================================================
// Server Entry Point
// ============================================================================

/// Serve the build output, rebuilding on change when watching is enabled.
///
/// Blocks until Ctrl+C is received.
pub fn serve_site(config: &'static SiteConfig) -> Result<()> {
    let interface: IpAddr = config.serve.interface.parse()?;
    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    let channel = Arc::new(ReloadChannel::new());

    if config.serve.watch {
        let channel = Arc::clone(&channel);
        thread::spawn(move || {
            if let Err(err) = watch_for_changes_blocking(config, &channel) {
                log!("watch"; "{err:#}");
            }
        });
    }

    log!("serve"; "http://{}", addr);
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, config, &channel) {
            log!("serve"; "request error: {e}");
        }
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr)> {
    let mut last_err = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_err = Some(e),
        }
    }

    let last_port = base_port.saturating_add(max_retries.saturating_sub(1));
    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        last_port,
        last_err.map_or_else(|| "no attempt made".to_owned(), |e| e.to_string())
    ))
}

// ============================================================================
// Request Handling
// ============================================================================

/// Route a single HTTP request.
fn handle_request(
    request: Request,
    config: &SiteConfig,
    channel: &Arc<ReloadChannel>,
) -> Result<()> {
    // Strip query string (e.g., ?t=123456) before decoding
    let raw = request.url().split('?').next().unwrap_or("/");
    let url_path = urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_owned());

    if config.serve.reload && url_path == reload::RELOAD_PATH {
        let channel = Arc::clone(channel);
        thread::spawn(move || reload::serve_events(request, &channel));
        return Ok(());
    }

    if url_path == STATIC_PREFIX.trim_end_matches('/') {
        return respond(request, Resolved::Redirect(STATIC_PREFIX.to_owned()));
    }

    let resolved = match url_path.strip_prefix(STATIC_PREFIX) {
        Some(rest) => match files::resolve(&config.build.static_dir, &format!("/{rest}")) {
            Resolved::Redirect(to) => Resolved::Redirect(format!("/static{to}")),
            other => other,
        },
        None => files::resolve(&config.build.output, &url_path),
    };

    respond(request, resolved)
}

// ============================================================================
// Response Helpers
// ============================================================================

fn respond(request: Request, resolved: Resolved) -> Result<()> {
    match resolved {
        Resolved::File { path, modified } => serve_file(request, &path, modified),
        Resolved::Redirect(to) => {
            let location = header("Location", &encode_location(&to))?;
            let response = Response::empty(StatusCode(301)).with_header(location);
            request.respond(response)?;
            Ok(())
        }
        Resolved::Error { status, body } => serve_error(request, status, body),
    }
}

/// Serve a file with content type and modification time handling.
fn serve_file(request: Request, path: &Path, modified: Option<SystemTime>) -> Result<()> {
    let last_modified = modified.map(DateTime::<Utc>::from);

    if let Some(time) = last_modified
        && !modified_since(&request, time)
    {
        request.respond(Response::empty(StatusCode(304)))?;
        return Ok(());
    }

    let content = match fs::read(path) {
        Ok(content) => content,
        Err(err) => return respond(request, Resolved::from_io(&err)),
    };

    let mut response =
        Response::from_data(content).with_header(header("Content-Type", guess_content_type(path))?);
    if let Some(time) = last_modified {
        let stamp = time.format(HTTP_DATE).to_string();
        response = response.with_header(header("Last-Modified", &stamp)?);
    }
    request.respond(response)?;
    Ok(())
}

/// Plain-text error response. The body is sent as is.
fn serve_error(request: Request, status: u16, body: String) -> Result<()> {
    let response = Response::from_string(body)
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", "text/plain; charset=utf-8")?);
    request.respond(response)?;
    Ok(())
}

/// Whether the file changed after the request's `If-Modified-Since`.
///
/// Requests without a parseable header always count as modified.
fn modified_since(request: &Request, modified: DateTime<Utc>) -> bool {
    let since = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("If-Modified-Since"))
        .and_then(|h| DateTime::parse_from_rfc2822(h.value.as_str()).ok());

    // HTTP dates carry whole seconds only
    since.is_none_or(|since| modified.timestamp() > since.timestamp())
}

/// Percent-encode each segment of a redirect target.
fn encode_location(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes())
        .map_err(|()| anyhow!("invalid header `{name}: {value}`"))
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md" | "markdown") => "text/markdown; charset=utf-8",

        _ => "application/octet-stream",
    }
}
