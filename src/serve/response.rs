//! HTTP response handlers.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tiny_http::{Header, Method, Request, Response, StatusCode};

use super::devserver::DevServer;
use crate::embed::serve::{PREVIEW_JS, RENDER_ERROR_HTML, RenderErrorVars};
use crate::utils::mime::{self, types};

/// How a served HTML page relates to the project.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageInfo<'a> {
    /// Project-relative input that renders to the page.
    pub input_file: Option<&'a str>,
    pub is_presentation: bool,
}

/// Respond with a file from the output tree, injecting the live-reload
/// client into HTML.
pub fn respond_file(request: Request, path: &Path, page: PageInfo<'_>) -> Result<()> {
    let content_type = mime::from_path(path);

    if is_head_request(&request) {
        return send_head(request, 200, content_type);
    }

    if let Some(range) = header(&request, "Range") {
        return respond_range(request, path, content_type, &range);
    }

    let body = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let body = if mime::is_html(content_type) {
        DevServer::inject_client(body, page.input_file, page.is_presentation)
    } else {
        body
    };
    send_body(request, 200, content_type, body)
}

/// Partial content for media seeking.
fn respond_range(request: Request, path: &Path, content_type: &'static str, range: &str) -> Result<()> {
    use std::io::{Read, Seek, SeekFrom};

    let file_size = fs::metadata(path)?.len();
    if file_size == 0 {
        return send_body(request, 200, content_type, Vec::new());
    }

    let range = range.strip_prefix("bytes=").unwrap_or(range);
    let (start, end) = parse_range(range, file_size);
    if start > end {
        let response = Response::empty(StatusCode(416))
            .with_header(make_header("Content-Range", &format!("bytes */{file_size}"))?);
        request.respond(response)?;
        return Ok(());
    }
    let length = end - start + 1;

    let mut file = fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let reader = file.take(length);

    let response = Response::new(
        StatusCode(206),
        vec![
            make_header("Content-Type", content_type)?,
            make_header("Content-Range", &format!("bytes {start}-{end}/{file_size}"))?,
            make_header("Accept-Ranges", "bytes")?,
        ],
        reader,
        usize::try_from(length).ok(),
        None,
    );
    request.respond(response)?;
    Ok(())
}

/// Parse `start-end`, `start-` or `-suffix` into an inclusive byte range.
fn parse_range(range: &str, file_size: u64) -> (u64, u64) {
    let last = file_size - 1;
    match range.trim().split_once('-') {
        Some((s, e)) if !s.is_empty() && !e.is_empty() => {
            let start = s.trim().parse().unwrap_or(0);
            let end: u64 = e.trim().parse().unwrap_or(last);
            (start, end.min(last))
        }
        Some((s, "")) if !s.is_empty() => (s.trim().parse().unwrap_or(0), last),
        Some(("", e)) if !e.is_empty() => {
            let suffix: u64 = e.trim().parse().unwrap_or(0);
            (file_size.saturating_sub(suffix), last)
        }
        _ => (0, last),
    }
}

/// Respond with the output tree's `404.html` when present, else plain text.
pub fn respond_not_found(request: Request, output_root: &Path) -> Result<()> {
    let custom_404 = output_root.join("404.html");

    if is_head_request(&request) {
        let content_type = if custom_404.is_file() { types::HTML } else { types::PLAIN };
        return send_head(request, 404, content_type);
    }

    if let Ok(body) = fs::read(&custom_404) {
        let body = DevServer::inject_client(body, None, false);
        return send_body(request, 404, types::HTML, body);
    }
    send_body(request, 404, types::PLAIN, b"404 Not Found".to_vec())
}

/// Render error page (500). The message sits in the marker element and the
/// client script shows it; the page still reloads on the next render.
pub fn respond_render_error(request: Request, title: &str, message: &str) -> Result<()> {
    let body = render_error_page(title, message);
    let body = DevServer::inject_client(body.into_bytes(), None, false);
    send_body(request, 500, types::HTML, body)
}

pub fn render_error_page(title: &str, message: &str) -> String {
    RENDER_ERROR_HTML.render(&RenderErrorVars { title, message })
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(request, 503, types::PLAIN, b"503 Service Unavailable".to_vec())
}

/// Respond with the live-reload client from memory.
pub fn respond_preview_js(request: Request) -> Result<()> {
    send_body(request, 200, types::JAVASCRIPT, PREVIEW_JS.as_bytes().to_vec())
}

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn header(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.to_string())
}

fn send_head(request: Request, status: u16, content_type: &'static str) -> Result<()> {
    let response = Response::empty(StatusCode(status))
        .with_header(make_header("Content-Type", content_type)?)
        .with_header(make_header("Cache-Control", "no-store")?);
    request.respond(response)?;
    Ok(())
}

fn send_body(request: Request, status: u16, content_type: &'static str, body: Vec<u8>) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type)?)
        .with_header(make_header("Cache-Control", "no-store")?);
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &str, value: &str) -> Result<Header> {
    Header::from_bytes(key, value).map_err(|()| anyhow::anyhow!("invalid header {key}: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0-499", 1000), (0, 499));
        assert_eq!(parse_range("500-", 1000), (500, 999));
        assert_eq!(parse_range("-100", 1000), (900, 999));
        assert_eq!(parse_range("900-5000", 1000), (900, 999));
        assert_eq!(parse_range("garbage", 1000), (0, 999));
    }

    #[test]
    fn test_render_error_page_carries_marker() {
        let page = render_error_page("index.qmd", "Error: missing file");
        assert!(page.contains(
            r#"<script id="quire-render-error" type="text/plain">Error: missing file</script>"#
        ));
        assert!(page.contains("<title>index.qmd Render Error</title>"));
    }
}
