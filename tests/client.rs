use std::{
    io::{BufRead, BufReader, Read, Write},
    net::TcpListener,
    sync::mpsc,
    thread,
    time::Duration,
};

use wbs_loader::{
    client::{D1Client, QueryExecutor},
    config::D1Config,
    data::Param,
    error::WbsError,
};

struct CapturedRequest {
    head: String,
    body: String,
}

/// Serves exactly one HTTP response and hands back the request it received.
fn one_shot_server(
    status: &'static str,
    body: &'static str,
    delay: Duration,
) -> (String, mpsc::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream);
        let mut head = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read header");
            if line == "\r\n" || line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse().expect("length");
            }
            head.push_str(&line);
        }
        let mut buf = vec![0u8; content_length];
        reader.read_exact(&mut buf).expect("read body");
        let _ = tx.send(CapturedRequest {
            head,
            body: String::from_utf8(buf).expect("utf8 body"),
        });
        thread::sleep(delay);
        let mut stream = reader.into_inner();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
    });
    (format!("http://{addr}/query"), rx)
}

fn client(endpoint: &str, timeout: Duration) -> D1Client {
    D1Client::with_endpoint(endpoint, "secret-token", timeout).expect("client")
}

#[test]
fn posts_sql_and_params_with_bearer_token() {
    let (endpoint, requests) = one_shot_server(
        "200 OK",
        r#"{"success":true,"errors":[],"messages":[],"result":[{"results":[],"success":true,"meta":{"changes":2}}]}"#,
        Duration::ZERO,
    );
    let envelope = client(&endpoint, Duration::from_secs(5))
        .query(
            "INSERT OR IGNORE INTO wbs_2 (WBS_ELEMENT_CDE) VALUES (?), (?)",
            &[Param::from("A.1"), Param::Null],
        )
        .expect("envelope");
    assert_eq!(envelope.changes(), 2);

    let request = requests.recv().expect("captured request");
    assert!(request.head.starts_with("POST /query "));
    assert!(
        request
            .head
            .to_ascii_lowercase()
            .contains("authorization: bearer secret-token")
    );
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["params"], serde_json::json!(["A.1", null]));
    assert!(body["sql"].as_str().unwrap().starts_with("INSERT OR IGNORE"));
}

#[test]
fn statements_without_params_omit_the_key() {
    let (endpoint, requests) = one_shot_server(
        "200 OK",
        r#"{"success":true,"result":[{"results":[{"total":7}]}]}"#,
        Duration::ZERO,
    );
    let envelope = client(&endpoint, Duration::from_secs(5))
        .query("SELECT COUNT(*) AS total FROM wbs_2", &[])
        .unwrap();
    assert_eq!(envelope.scalar_i64("total"), Some(7));
    let body: serde_json::Value = serde_json::from_str(&requests.recv().unwrap().body).unwrap();
    assert!(body.get("params").is_none());
}

#[test]
fn server_error_becomes_remote_failure() {
    let (endpoint, _requests) = one_shot_server("500 Internal Server Error", r#"{"error":"boom"}"#, Duration::ZERO);
    let err = client(&endpoint, Duration::from_secs(5))
        .query("SELECT 1", &[])
        .unwrap_err();
    match err {
        WbsError::Remote { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("boom"));
        }
        other => panic!("expected remote failure, got {other:?}"),
    }
}

#[test]
fn unsuccessful_envelope_becomes_query_failure() {
    let (endpoint, _requests) = one_shot_server(
        "200 OK",
        r#"{"success":false,"errors":[{"code":7500,"message":"no such table: wbs_3"}],"result":[]}"#,
        Duration::ZERO,
    );
    let err = client(&endpoint, Duration::from_secs(5))
        .query("SELECT * FROM wbs_3", &[])
        .unwrap_err();
    assert!(matches!(err, WbsError::Query { .. }));
    assert!(err.to_string().contains("no such table: wbs_3 (code 7500)"));
}

#[test]
fn slow_response_becomes_transport_failure() {
    let (endpoint, _requests) = one_shot_server("200 OK", r#"{"success":true}"#, Duration::from_secs(3));
    let err = client(&endpoint, Duration::from_millis(300))
        .query("SELECT 1", &[])
        .unwrap_err();
    assert!(err.is_transport(), "unexpected {err:?}");
}

#[test]
fn refused_connection_becomes_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}/query", listener.local_addr().unwrap());
    drop(listener);
    let err = client(&endpoint, Duration::from_secs(2))
        .query("SELECT 1", &[])
        .unwrap_err();
    assert!(err.is_transport());
}

#[test]
fn config_builds_account_scoped_endpoint() {
    let config = D1Config::from_lookup(|name| match name {
        "CF_ACCOUNT_ID" => Some("acct".to_string()),
        "CF_D1_DATABASE_ID" => Some("db".to_string()),
        "CF_API_TOKEN" => Some("tok".to_string()),
        "CF_API_BASE_URL" => Some("http://127.0.0.1:9/client/v4/".to_string()),
        _ => None,
    })
    .unwrap();
    let client = D1Client::new(&config, Duration::from_secs(1)).unwrap();
    assert_eq!(
        client.endpoint(),
        "http://127.0.0.1:9/client/v4/accounts/acct/d1/database/db/query"
    );
}
