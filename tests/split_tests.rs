//! Property tests: parsing must not depend on how the input is cut into
//! `execute` calls, and a reset session must behave like a fresh one.

use proptest::prelude::*;

use h1stream::{Collector, Engine, Message, MessageType, Method, Session};

// =============================================================================
// Strategies
// =============================================================================

fn method() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::Get),
        Just(Method::Post),
        Just(Method::Put),
        Just(Method::Patch),
        Just(Method::Delete),
        Just(Method::MSearch),
        Just(Method::Propfind),
    ]
}

fn path() -> impl Strategy<Value = String> {
    "/[a-z0-9/._-]{0,24}(\\?[a-z0-9=&]{1,12})?"
}

fn headers() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("X-[A-Za-z0-9-]{1,10}", "[!-~]([ !-~]{0,15}[!-~])?"), 0..6)
}

#[derive(Debug, Clone)]
enum Framing {
    Length,
    Chunked(Vec<usize>),
}

fn framing() -> impl Strategy<Value = Framing> {
    prop_oneof![
        Just(Framing::Length),
        prop::collection::vec(1usize..20, 1..5).prop_map(Framing::Chunked),
    ]
}

fn build_request(
    method: Method,
    path: &str,
    headers: &[(String, String)],
    body: &[u8],
    framing: &Framing,
) -> Vec<u8> {
    let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: example.com\r\n").into_bytes();
    for (name, value) in headers {
        raw.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    match framing {
        Framing::Length => {
            raw.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
            raw.extend_from_slice(body);
        }
        Framing::Chunked(sizes) => {
            raw.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
            let mut rest = body;
            let mut sizes = sizes.iter().cycle();
            while !rest.is_empty() {
                let n = sizes.next().copied().unwrap_or(1).min(rest.len());
                raw.extend_from_slice(format!("{n:x}\r\n").as_bytes());
                raw.extend_from_slice(&rest[..n]);
                raw.extend_from_slice(b"\r\n");
                rest = &rest[n..];
            }
            raw.extend_from_slice(b"0\r\n\r\n");
        }
    }
    raw
}

fn request() -> impl Strategy<Value = Vec<u8>> {
    (
        method(),
        path(),
        headers(),
        prop::collection::vec(any::<u8>(), 0..48),
        framing(),
    )
        .prop_map(|(m, p, h, body, f)| build_request(m, &p, &h, &body, &f))
}

fn status_code() -> impl Strategy<Value = u16> {
    prop::sample::select(vec![200u16, 201, 202, 206, 301, 302, 400, 404, 418, 500, 503])
}

fn reason() -> impl Strategy<Value = String> {
    "[A-Za-z]([A-Za-z ]{0,14}[A-Za-z])?"
}

#[derive(Debug, Clone)]
enum ResponseFraming {
    Framed(Framing),
    UntilClose,
}

fn response_framing() -> impl Strategy<Value = ResponseFraming> {
    prop_oneof![
        framing().prop_map(ResponseFraming::Framed),
        Just(ResponseFraming::UntilClose),
    ]
}

fn build_response(
    status: u16,
    reason: &str,
    headers: &[(String, String)],
    body: &[u8],
    framing: &ResponseFraming,
) -> Vec<u8> {
    let mut raw = format!("HTTP/1.1 {status} {reason}\r\n").into_bytes();
    for (name, value) in headers {
        raw.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    match framing {
        ResponseFraming::Framed(Framing::Length) => {
            raw.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
            raw.extend_from_slice(body);
        }
        ResponseFraming::Framed(Framing::Chunked(sizes)) => {
            raw.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
            let mut rest = body;
            let mut sizes = sizes.iter().cycle();
            while !rest.is_empty() {
                let n = sizes.next().copied().unwrap_or(1).min(rest.len());
                raw.extend_from_slice(format!("{n:x}\r\n").as_bytes());
                raw.extend_from_slice(&rest[..n]);
                raw.extend_from_slice(b"\r\n");
                rest = &rest[n..];
            }
            raw.extend_from_slice(b"0\r\n\r\n");
        }
        ResponseFraming::UntilClose => {
            raw.extend_from_slice(b"\r\n");
            raw.extend_from_slice(body);
        }
    }
    raw
}

fn response() -> impl Strategy<Value = Vec<u8>> {
    (
        status_code(),
        reason(),
        headers(),
        prop::collection::vec(any::<u8>(), 0..48),
        response_framing(),
    )
        .prop_map(|(code, r, h, body, f)| build_response(code, &r, &h, &body, &f))
}

// =============================================================================
// Helpers
// =============================================================================

fn new_session(kind: MessageType) -> Session<Collector> {
    Engine::new().session(kind, Collector::new(kind))
}

fn parse_whole(raw: &[u8]) -> Vec<Message> {
    let mut s = new_session(MessageType::Request);
    s.execute(raw).expect("generated request is valid");
    s.into_handler().into_messages()
}

fn feed_in_pieces(s: &mut Session<Collector>, raw: &[u8], cuts: &[usize]) {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (raw.len() + 1)).collect();
    points.sort_unstable();
    let mut start = 0;
    for point in points.into_iter().chain(std::iter::once(raw.len())) {
        s.execute(&raw[start..point]).expect("generated message is valid");
        start = point;
    }
}

fn parse_in_pieces(raw: &[u8], cuts: &[usize]) -> Vec<Message> {
    let mut s = new_session(MessageType::Request);
    feed_in_pieces(&mut s, raw, cuts);
    s.into_handler().into_messages()
}

/// Responses may be delimited by the end of input, so both paths call `finish`.
fn parse_response_whole(raw: &[u8]) -> Vec<Message> {
    let mut s = new_session(MessageType::Response);
    s.execute(raw).expect("generated response is valid");
    s.finish().expect("generated response is complete");
    s.into_handler().into_messages()
}

fn parse_response_in_pieces(raw: &[u8], cuts: &[usize]) -> Vec<Message> {
    let mut s = new_session(MessageType::Response);
    feed_in_pieces(&mut s, raw, cuts);
    s.finish().expect("generated response is complete");
    s.into_handler().into_messages()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn split_points_do_not_change_the_result(
        raw in request(),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let whole = parse_whole(&raw);
        prop_assert_eq!(whole.len(), 1);
        prop_assert!(whole[0].complete);
        prop_assert_eq!(parse_in_pieces(&raw, &cuts), whole);
    }

    #[test]
    fn byte_at_a_time_matches_whole(raw in request()) {
        let cuts: Vec<usize> = (1..raw.len()).collect();
        prop_assert_eq!(parse_in_pieces(&raw, &cuts), parse_whole(&raw));
    }

    #[test]
    fn pipelined_requests_split_anywhere(
        first in request(),
        second in request(),
        cut in any::<usize>(),
    ) {
        let mut raw = first.clone();
        raw.extend_from_slice(&second);
        let messages = parse_in_pieces(&raw, &[cut]);
        prop_assert_eq!(messages.len(), 2);
        prop_assert_eq!(&messages[0], &parse_whole(&first)[0]);
        prop_assert_eq!(&messages[1], &parse_whole(&second)[0]);
    }

    #[test]
    fn response_split_points_do_not_change_the_result(
        raw in response(),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let whole = parse_response_whole(&raw);
        prop_assert_eq!(whole.len(), 1);
        prop_assert!(whole[0].complete);
        prop_assert_eq!(parse_response_in_pieces(&raw, &cuts), whole);
    }

    #[test]
    fn response_byte_at_a_time_matches_whole(raw in response()) {
        let cuts: Vec<usize> = (1..raw.len()).collect();
        prop_assert_eq!(parse_response_in_pieces(&raw, &cuts), parse_response_whole(&raw));
    }

    #[test]
    fn reset_is_equivalent_to_a_fresh_session(
        garbage in prop::collection::vec(any::<u8>(), 0..64),
        raw in request(),
    ) {
        let mut s = new_session(MessageType::Request);
        let _ = s.execute(&garbage);
        s.reset();
        prop_assert!(s.error().is_none());
        s.execute(&raw).expect("generated request is valid");

        let fresh = parse_whole(&raw);
        prop_assert_eq!(s.handler().messages().last(), fresh.last());
    }
}
