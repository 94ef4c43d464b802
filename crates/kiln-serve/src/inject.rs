//! Live-reload client script and its injection into HTML pages

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::{CLIENT_PATH, WS_PATH};

/// Largest HTML page that is rewritten
const MAX_HTML_BYTES: usize = 16 * 1024 * 1024;

/// Browser side of the live-reload protocol.
///
/// `inject` events swap matching stylesheet links in place; `reload` events
/// reload the page. The socket reconnects after the server restarts.
pub const CLIENT_JS: &str = r#"(function () {
  var url = (location.protocol === "https:" ? "wss://" : "ws://") + location.host + "__WS_PATH__";

  function matches(href, path) {
    var clean = href.split("?")[0];
    return clean === path || clean.slice(-(path.length + 1)) === "/" + path;
  }

  function inject(paths) {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    Array.prototype.forEach.call(links, function (link) {
      var href = link.getAttribute("href");
      if (!href) return;
      var hit = paths.some(function (path) { return matches(href, path); });
      if (hit) link.setAttribute("href", href.split("?")[0] + "?kiln=" + Date.now());
    });
  }

  function connect() {
    var socket = new WebSocket(url);
    socket.onmessage = function (message) {
      var event;
      try { event = JSON.parse(message.data); } catch (e) { return; }
      if (event.type === "inject") inject(event.paths || []);
      else if (event.type === "reload") location.reload();
    };
    socket.onclose = function () { setTimeout(connect, 1000); };
  }

  connect();
})();
"#;

/// The client script with the websocket path filled in
pub fn client_script() -> String {
    CLIENT_JS.replace("__WS_PATH__", WS_PATH)
}

/// Insert the client `<script>` tag before the last `</body>`, or append it
pub fn inject_script(html: &[u8]) -> Vec<u8> {
    let tag = format!(r#"<script src="{}"></script>"#, CLIENT_PATH);
    let lower = html.to_ascii_lowercase();
    let position = lower
        .windows(b"</body>".len())
        .rposition(|w| w == b"</body>")
        .unwrap_or(html.len());

    let mut out = Vec::with_capacity(html.len() + tag.len());
    out.extend_from_slice(&html[..position]);
    out.extend_from_slice(tag.as_bytes());
    out.extend_from_slice(&html[position..]);
    out
}

/// Middleware rewriting successful HTML responses to load the client
pub async fn inject_client(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_HTML_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to buffer HTML response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(inject_script(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: &str = r#"<script src="/__kiln/client.js"></script>"#;

    #[test]
    fn test_inject_before_body_end() {
        let html = b"<html><body><p>hi</p></BODY></html>";
        let out = String::from_utf8(inject_script(html)).unwrap();
        assert_eq!(out, format!("<html><body><p>hi</p>{}</BODY></html>", TAG));
    }

    #[test]
    fn test_inject_uses_last_body_end() {
        let html = b"<body><pre>&lt;/body&gt; </body></pre></body>";
        let out = String::from_utf8(inject_script(html)).unwrap();
        assert!(out.ends_with(&format!("{}</body>", TAG)));
    }

    #[test]
    fn test_inject_appends_without_body() {
        let out = String::from_utf8(inject_script(b"<p>fragment</p>")).unwrap();
        assert_eq!(out, format!("<p>fragment</p>{}", TAG));
    }

    #[test]
    fn test_client_script_points_at_socket() {
        let script = client_script();
        assert!(script.contains("\"/__kiln/ws\""));
        assert!(!script.contains("__WS_PATH__"));
    }
}
