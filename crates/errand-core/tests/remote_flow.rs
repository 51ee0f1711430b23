use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread::{self, JoinHandle};

use chrono::{FixedOffset, TimeZone};
use errand_core::calendar::{CalendarBridge, GoogleCalendar};
use errand_core::config::Config;
use errand_core::error::{CalendarError, StoreError};
use errand_core::store::{TaskStore, open_store};
use errand_core::task::{NewTask, Status};

/// Answers one connection per canned `(status, body)` pair and returns the
/// request heads it saw, in order.
fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream);

            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read request line");
                if line.trim_end().is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().expect("content length");
                }
                head.push_str(&line);
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).expect("read body");
            seen.push(head);

            let reason = match status {
                200 => "OK",
                201 => "Created",
                204 => "No Content",
                401 => "Unauthorized",
                _ => "Service Unavailable",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let mut stream = reader.into_inner();
            stream
                .write_all(response.as_bytes())
                .expect("write response");
            stream.flush().expect("flush");
        }
        seen
    });

    (base, handle)
}

fn remote_config(base: &str) -> Config {
    let mut cfg = Config::with_defaults();
    cfg.apply_overrides([
        ("backend".to_string(), "remote".to_string()),
        ("remote.url".to_string(), base.to_string()),
        ("remote.key".to_string(), "anon-key".to_string()),
    ]);
    cfg
}

fn calendar_config(base: &str) -> Config {
    let mut cfg = Config::with_defaults();
    cfg.apply_overrides([
        ("calendar".to_string(), "on".to_string()),
        ("calendar.token".to_string(), "access-token".to_string()),
        ("calendar.url".to_string(), base.to_string()),
    ]);
    cfg
}

#[test]
fn server_error_is_unavailable() {
    let (base, server) = serve(vec![(503, "{\"message\":\"maintenance\"}")]);
    let store = open_store(&remote_config(&base), Path::new(".")).expect("open remote store");

    match store.list(None) {
        Err(StoreError::Unavailable(message)) => {
            assert!(message.contains("503"), "message: {message}");
            assert!(message.contains("maintenance"), "message: {message}");
        }
        other => panic!("expected unavailable, got {other:?}"),
    }

    let seen = server.join().expect("server thread");
    assert!(seen[0].starts_with("GET /rest/v1/tasks?select=*&order="));
    assert!(seen[0].to_ascii_lowercase().contains("apikey: anon-key"));
    assert!(seen[0].contains("Bearer anon-key"));
}

#[test]
fn empty_representation_is_not_found() {
    let (base, server) = serve(vec![(200, "[]"), (200, "[]"), (200, "[]")]);
    let mut store = open_store(&remote_config(&base), Path::new(".")).expect("open remote store");

    assert!(matches!(
        store.set_status(9, Status::Completed),
        Err(StoreError::NotFound(9))
    ));
    assert!(matches!(store.delete(9), Err(StoreError::NotFound(9))));
    assert!(store.get(9).expect_err("missing row").is_not_found());

    let seen = server.join().expect("server thread");
    assert!(seen[0].starts_with("PATCH /rest/v1/tasks?id=eq.9"));
    assert!(seen[0].contains("return=representation"));
    assert!(seen[1].starts_with("DELETE /rest/v1/tasks?id=eq.9"));
    assert!(seen[2].starts_with("GET /rest/v1/tasks?id=eq.9"));
}

#[test]
fn inserted_row_comes_back_with_its_id() {
    let (base, server) = serve(vec![(
        201,
        r#"[{"id": 41, "title": "Pay rent", "status": "pending", "priority": "medium",
             "due_at": null, "created_at": "2026-10-18T08:00:00+00:00"}]"#,
    )]);
    let mut store = open_store(&remote_config(&base), Path::new(".")).expect("open remote store");

    let task = store.add(NewTask::titled("Pay rent")).expect("add");
    assert_eq!(task.id, 41);
    assert_eq!(task.status, Status::Pending);

    let seen = server.join().expect("server thread");
    assert!(seen[0].starts_with("POST /rest/v1/tasks "));
}

#[test]
fn blank_title_never_reaches_the_server() {
    let (base, _server) = serve(vec![]);
    let mut store = open_store(&remote_config(&base), Path::new(".")).expect("open remote store");

    assert!(matches!(
        store.add(NewTask::titled("  ")),
        Err(StoreError::Validation(_))
    ));
}

#[test]
fn calendar_rejection_carries_status_and_body() {
    let (base, server) = serve(vec![
        (401, "{\"error\":\"invalid_token\"}"),
        (200, "{\"id\":\"evt-9\",\"status\":\"confirmed\"}"),
        (204, ""),
    ]);
    let calendar = GoogleCalendar::from_config(&calendar_config(&base))
        .expect("calendar settings")
        .expect("calendar enabled");
    let start = FixedOffset::east_opt(0)
        .expect("offset")
        .with_ymd_and_hms(2026, 10, 23, 10, 0, 0)
        .single()
        .expect("valid instant");

    match calendar.create("Submit report", None, start, None) {
        Err(CalendarError::Rejected { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("invalid_token"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    let event_id = calendar
        .create("Submit report", Some("quarterly"), start, None)
        .expect("create event");
    assert_eq!(event_id, "evt-9");
    calendar.delete(&event_id).expect("delete event");

    let seen = server.join().expect("server thread");
    assert!(seen[0].starts_with("POST /calendars/primary/events "));
    assert!(seen[0].contains("Bearer access-token"));
    assert!(seen[2].starts_with("DELETE /calendars/primary/events/evt-9 "));
}
