//! Development server with live reload support.
//!
//! Built on `tiny_http`. Each request runs on its own thread so a slow page
//! module only stalls its own response.
//!
//! # Request pipeline
//!
//! ```text
//! request
//!    │
//!    ├── /__tspages/reload     ──► WebSocket upgrade, joins ReloadHub
//!    ├── page router           ──► render page module (+ client script)
//!    ├── /__tspages/client.js  ──► reload client
//!    ├── serve.public/<path>   ──► static file
//!    └── 404
//! ```
//!
//! # Threads
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Watcher Thread  │
//! │  (accept loop)  │     │  (page root)     │
//! └────────┬────────┘     └────────┬─────────┘
//!          │ spawn per request     │ on_change
//!          ▼                       ▼
//!     handle_request ◄──────── ReloadHub ──► browsers
//! ```

use crate::{
    config::SiteConfig,
    log,
    plugin::{PageResponse, PagesPlugin},
    reload::{self, CLIENT_PATH, RELOAD_PATH, ReloadHub, header},
    watch::watch_for_changes_blocking,
};
use anyhow::{Context, Result, anyhow};
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
    thread,
};
use tiny_http::{Method, Request, Response, Server, StatusCode};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

/// Everything a request handler needs, shared across request threads.
struct ServeState {
    plugin: Arc<PagesPlugin>,
    hub: Arc<ReloadHub>,
    public: PathBuf,
    watch: bool,
}

// ============================================================================
// Server Entry Point
// ============================================================================

/// Start the development server with optional file watching.
///
/// Blocks until Ctrl+C is received.
pub fn serve_site(config: &SiteConfig) -> Result<()> {
    let interface: IpAddr = config
        .serve
        .interface
        .parse()
        .with_context(|| format!("invalid [serve.interface] `{}`", config.serve.interface))?;

    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    let state = Arc::new(ServeState {
        plugin: Arc::new(PagesPlugin::from_config(config)),
        hub: Arc::new(ReloadHub::new()),
        public: config.serve.public.clone(),
        watch: config.serve.watch,
    });

    log!("serve"; "http://{}", addr);

    if state.watch {
        let plugin = Arc::clone(&state.plugin);
        let hub = Arc::clone(&state.hub);
        thread::spawn(move || {
            if let Err(err) = watch_for_changes_blocking(&plugin, &*hub) {
                log!("watch"; "{err:#}");
            }
        });
    }

    for request in server.incoming_requests() {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            if let Err(e) = handle_request(request, &state) {
                log!("serve"; "request error: {e:#}");
            }
        });
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
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

    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Request Handling
// ============================================================================

/// Where a request ends up in the pipeline.
#[derive(Debug, PartialEq, Eq)]
enum Route {
    Reload,
    Page(PageResponse),
    Error(String),
    Client,
    Static(PathBuf),
    NotFound,
}

fn handle_request(request: Request, state: &ServeState) -> Result<()> {
    match route(state, request.method(), request.url()) {
        Route::Reload => state.hub.accept(request),
        Route::Page(page) => serve_page(request, page),
        Route::Error(message) => serve_error(request, &message),
        Route::Client => reload::serve_client(request),
        Route::Static(file) => serve_file(request, &file),
        Route::NotFound => serve_not_found(request),
    }
}

/// Decide how to answer `method url`. Pages are rendered here, with the
/// reload client already injected when watching.
fn route(state: &ServeState, method: &Method, url: &str) -> Route {
    let path = url.split('?').next().unwrap_or_default();

    if path == RELOAD_PATH && state.watch {
        return Route::Reload;
    }
    if !matches!(method, Method::Get | Method::Head) {
        return Route::NotFound;
    }

    match state.plugin.handle_request(url) {
        Ok(Some(mut page)) => {
            if state.watch {
                page.body = reload::inject_client(&page.body);
            }
            return Route::Page(page);
        }
        Ok(None) => {}
        Err(err) => {
            let err = anyhow::Error::from(err);
            log!("error"; "{path}: {err:#}");
            return Route::Error(format!("{err:#}"));
        }
    }

    if path == CLIENT_PATH && state.watch {
        return Route::Client;
    }

    resolve_static(&state.public, path).map_or(Route::NotFound, Route::Static)
}

/// Map a URL path onto a file under `public`, refusing anything that would
/// escape it.
fn resolve_static(public: &Path, url_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(url_path).ok()?;
    let rel = Path::new(decoded.trim_start_matches('/'));
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }

    let local = public.join(rel);
    if local.is_file() {
        return Some(local);
    }
    let index = local.join("index.html");
    index.is_file().then_some(index)
}

// ============================================================================
// Response Helpers
// ============================================================================

fn serve_page(request: Request, page: PageResponse) -> Result<()> {
    let content_type = format!("{}; charset=utf-8", page.content_type);
    let response = Response::from_string(page.body)
        .with_status_code(StatusCode(page.status))
        .with_header(header("Content-Type", &content_type)?)
        .with_header(header("Cache-Control", "no-cache")?);
    request.respond(response).context("Failed to send page")
}

fn serve_file(request: Request, path: &Path) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let response =
        Response::from_data(content).with_header(header("Content-Type", guess_content_type(path))?);
    request.respond(response).context("Failed to send file")
}

fn serve_error(request: Request, message: &str) -> Result<()> {
    let response = Response::from_string(message)
        .with_status_code(StatusCode(500))
        .with_header(header("Content-Type", "text/plain; charset=utf-8")?);
    request.respond(response).context("Failed to send error")
}

fn serve_not_found(request: Request) -> Result<()> {
    let response = Response::from_string("404 Not Found")
        .with_status_code(StatusCode(404))
        .with_header(header("Content-Type", "text/plain")?);
    request.respond(response).context("Failed to send 404")
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",

        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        _ => "application/octet-stream",
    }
}
