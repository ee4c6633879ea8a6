//! SWORD client integration tests against a one-shot local HTTP server

use dip_core::connector::{Auth, DepositRequest, Payload};
use dip_core::{
    DepositOptions, Depositor, Dip, DipError, Endpoint, PackagerRegistry, RepositoryConnector,
};
use dip_sword::{ClientConfig, SwordClient};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use tempfile::TempDir;

const RECEIPT: &str = r#"<entry xmlns="http://www.w3.org/2005/Atom">
  <link rel="edit" href="http://repo/edit/1"/>
  <link rel="edit-media" href="http://repo/em/1"/>
  <link rel="http://purl.org/net/sword/terms/statement" type="application/atom+xml;type=feed" href="http://repo/st/1"/>
</entry>"#;

#[derive(Debug)]
struct Captured {
    request_line: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Serve exactly one request with the given status and body.
fn serve_once(status: &'static str, response_body: &'static str) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut headers = HashMap::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').unwrap();
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        let length: usize = headers
            .get("content-length")
            .map(|v| v.parse().unwrap())
            .unwrap_or(0);
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).unwrap();

        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {}\r\nContent-Type: application/atom+xml;type=entry\r\nLocation: http://repo/edit/1\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            response_body.len(),
            response_body
        )
        .unwrap();
        Captured {
            request_line: request_line.trim_end().to_string(),
            headers,
            body,
        }
    });
    (url, handle)
}

fn client() -> SwordClient {
    SwordClient::new(&ClientConfig::default()).unwrap()
}

#[test]
fn test_create_entry_sends_sword_headers() {
    let (url, server) = serve_once("201 Created", RECEIPT);
    let auth = Auth {
        username: Some("user".into()),
        password: Some("pass".into()),
        on_behalf_of: Some("someone".into()),
    };
    let request = DepositRequest {
        target: &format!("{}/col", url),
        payload: Payload::Entry("<entry xmlns=\"http://www.w3.org/2005/Atom\"/>"),
        in_progress: true,
        auth: &auth,
    };

    let receipt = client().create(&request).unwrap();
    assert_eq!(receipt.code, 201);
    assert!(receipt.is_success());
    assert_eq!(receipt.edit.as_deref(), Some("http://repo/edit/1"));
    assert_eq!(receipt.edit_media.as_deref(), Some("http://repo/em/1"));
    assert_eq!(receipt.statement.as_deref(), Some("http://repo/st/1"));
    assert_eq!(receipt.location.as_deref(), Some("http://repo/edit/1"));

    let captured = server.join().unwrap();
    assert_eq!(captured.request_line, "POST /col HTTP/1.1");
    assert_eq!(captured.headers["content-type"], "application/atom+xml;type=entry");
    assert_eq!(captured.headers["in-progress"], "true");
    assert_eq!(captured.headers["on-behalf-of"], "someone");
    assert!(captured.headers["authorization"].starts_with("Basic "));
    assert_eq!(captured.headers["content-md5"].len(), 32);
    assert_eq!(
        String::from_utf8(captured.body).unwrap(),
        "<entry xmlns=\"http://www.w3.org/2005/Atom\"/>"
    );
}

#[test]
fn test_error_status_is_a_receipt_not_an_error() {
    let (url, server) = serve_once("500 Internal Server Error", "Internal Server Error");
    let receipt = client()
        .get_deposit_receipt(&format!("{}/edit/1", url), &Auth::default())
        .unwrap();
    assert_eq!(receipt.code, 500);
    assert!(!receipt.is_success());
    assert!(receipt.edit.is_none());
    assert_eq!(receipt.body.as_deref(), Some("Internal Server Error"));

    let captured = server.join().unwrap();
    assert!(captured.request_line.starts_with("GET /edit/1"));
    assert!(!captured.headers.contains_key("authorization"));
}

#[test]
fn test_unreachable_server_is_a_connector_error() {
    // bind then drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let tmp = TempDir::new().unwrap();
    let mut dip = Dip::open(tmp.path()).unwrap();
    dip.set_endpoint(
        Endpoint::new(format!("http://127.0.0.1:{}/sd", port))
            .with_id("local")
            .with_col_iri(format!("http://127.0.0.1:{}/col", port)),
    )
    .unwrap();

    let sword = client();
    let packagers = PackagerRegistry::with_defaults();
    let err = Depositor::new(&sword, &packagers)
        .deposit(&mut dip, "local", &DepositOptions::metadata_only())
        .unwrap_err();
    assert!(matches!(err, DipError::Connector(_)));
    assert!(dip.endpoint("local").unwrap().edit_iri.is_none());
    assert_eq!(dip.history().list("local").unwrap().len(), 2);
}
