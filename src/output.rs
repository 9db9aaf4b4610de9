use std::fmt::Write as _;

use crate::event::RecordedEvent;
use crate::types::{Message, MessageType};

/// Serialize parsed [`Message`]s to a JSON array.
///
/// When `pretty` is `true` the output is indented for readability.
pub fn format_json(messages: &[Message], pretty: bool) -> String {
    let result = if pretty {
        serde_json::to_string_pretty(messages)
    } else {
        serde_json::to_string(messages)
    };
    result.unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

/// Serialize a recorded event log to a JSON array.
pub fn format_events(events: &[RecordedEvent], pretty: bool) -> String {
    let result = if pretty {
        serde_json::to_string_pretty(events)
    } else {
        serde_json::to_string(events)
    };
    result.unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

fn start_line(message: &Message) -> String {
    let head = &message.head;
    match head.kind {
        MessageType::Request => {
            let method = head.method.map_or("?", |m| m.as_str());
            format!("{} {} {}", method, head.url, head.version)
        }
        MessageType::Response => format!(
            "{} {} {}",
            head.version,
            head.status_code.unwrap_or_default(),
            head.status_message.as_deref().unwrap_or_default()
        ),
    }
}

/// Render a [`Message`] in a human-readable debug format.
pub fn format_debug(message: &Message) -> String {
    let head = &message.head;
    let mut out = String::with_capacity(256);

    match head.kind {
        MessageType::Request => {
            out.push_str("=== HTTP Request ===\n");
            if let Some(method) = head.method {
                let _ = writeln!(out, "Method:     {method}");
            }
            let _ = writeln!(out, "URL:        {}", head.url);
        }
        MessageType::Response => {
            out.push_str("=== HTTP Response ===\n");
            let _ = writeln!(out, "Status:     {}", head.status_code.unwrap_or_default());
            let _ = writeln!(
                out,
                "Reason:     {}",
                head.status_message.as_deref().unwrap_or_default()
            );
        }
    }
    let _ = writeln!(out, "Version:    {}", head.version);
    let _ = writeln!(out, "Keep-Alive: {}", head.keep_alive);
    if head.upgrade {
        out.push_str("Upgrade:    true\n");
    }

    let _ = write!(out, "\n--- Headers ({}) ---\n", head.headers.len());
    for header in &head.headers {
        let _ = writeln!(out, "  {}: {}", header.name, header.value);
    }

    if message.body.is_empty() {
        out.push_str("\n--- No Body ---\n");
    } else {
        let framing = if head.chunked { ", chunked" } else { "" };
        let _ = write!(out, "\n--- Body ({} bytes{framing}) ---\n", message.body.len());
        match message.body_as_str() {
            Some(s) => out.push_str(s),
            None => {
                let _ = write!(out, "<binary data: {} bytes>", message.body.len());
            }
        }
        out.push('\n');
    }

    if !message.trailers.is_empty() {
        let _ = write!(out, "\n--- Trailers ({}) ---\n", message.trailers.len());
        for trailer in &message.trailers {
            let _ = writeln!(out, "  {}: {}", trailer.name, trailer.value);
        }
    }

    if !message.complete {
        out.push_str("\n(incomplete)\n");
    }
    out.push_str("====================\n");
    out
}

/// Render only the start line and headers (no body).
pub fn format_headers_only(message: &Message) -> String {
    let head = &message.head;
    let mut out = String::with_capacity(64 + head.headers.len() * 40);

    out.push_str(&start_line(message));
    out.push('\n');
    for header in &head.headers {
        let _ = writeln!(out, "{}: {}", header.name, header.value);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_messages;

    #[test]
    fn headers_only_request() {
        let msgs = parse_messages(
            MessageType::Request,
            b"GET /a HTTP/1.1\r\nHost: x\r\nAccept: */*\r\n\r\n",
        )
        .unwrap();
        assert_eq!(
            format_headers_only(&msgs[0]),
            "GET /a HTTP/1.1\nHost: x\nAccept: */*\n"
        );
    }

    #[test]
    fn headers_only_response() {
        let msgs = parse_messages(
            MessageType::Response,
            b"HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n",
        )
        .unwrap();
        assert_eq!(
            format_headers_only(&msgs[0]),
            "HTTP/1.0 404 Not Found\nContent-Length: 0\n"
        );
    }

    #[test]
    fn debug_shows_chunked_body_and_trailers() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    3\r\nabc\r\n0\r\nEtag: x\r\n\r\n";
        let msgs = parse_messages(MessageType::Response, raw).unwrap();
        let out = format_debug(&msgs[0]);
        assert!(out.starts_with("=== HTTP Response ===\n"));
        assert!(out.contains("--- Body (3 bytes, chunked) ---\nabc\n"));
        assert!(out.contains("--- Trailers (1) ---\n  Etag: x\n"));
    }

    #[test]
    fn json_is_an_array_of_messages() {
        let msgs = parse_messages(
            MessageType::Request,
            b"POST /p HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi",
        )
        .unwrap();
        let v: serde_json::Value = serde_json::from_str(&format_json(&msgs, false)).unwrap();
        assert_eq!(v[0]["method"], "POST");
        assert_eq!(v[0]["url"], "/p");
        assert_eq!(v[0]["version"], "HTTP/1.1");
        assert_eq!(v[0]["body"], "hi");
        assert_eq!(v[0]["content_length"], 2);
        assert_eq!(v[0]["complete"], true);
    }

    #[test]
    fn events_are_tagged() {
        let events = vec![RecordedEvent::MessageBegin, RecordedEvent::Url("/".into())];
        assert_eq!(
            format_events(&events, false),
            r#"[{"event":"message_begin"},{"event":"url","data":"/"}]"#
        );
    }
}
