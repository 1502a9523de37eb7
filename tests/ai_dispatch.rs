use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

const REPLY_DELAY: Duration = Duration::from_millis(1500);

/// Minimal generateContent endpoint that answers every call after a delay.
fn spawn_slow_service(text: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind service");
    let addr = listener.local_addr().expect("service addr");
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            std::thread::spawn(move || answer_slowly(stream, text));
        }
    });
    format!("http://{}", addr)
}

fn answer_slowly(mut stream: TcpStream, text: &str) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        let head = String::from_utf8_lossy(&buf).to_string();
        let Some(end) = head.find("\r\n\r\n") else { continue };
        let length = head[..end]
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| v.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            break;
        }
    }

    std::thread::sleep(REPLY_DELAY);
    let body = json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string();
    let _ = write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.flush();
}

fn spawn_sidecar(endpoint: &str) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_plaafpd");
    let mut child = Command::new(exe)
        .env("PLAAFPD_AI_API_KEY", "test-key")
        .env("PLAAFPD_AI_ENDPOINT", endpoint)
        .env_remove("PLAAFPD_AI_MODEL")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn plaafpd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send(stdin: &mut ChildStdin, id: &str, method: &str, params: serde_json::Value) {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
}

fn read_reply(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "sidecar closed its output");
    serde_json::from_str(line.trim()).expect("parse response json")
}

#[test]
fn slow_suggestion_does_not_hold_up_later_requests() {
    let endpoint = spawn_slow_service("enjoys robotics club");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&endpoint);

    let started = Instant::now();
    send(
        &mut stdin,
        "1",
        "ai.suggest",
        json!({ "locator": { "field": "strengths" } }),
    );
    send(&mut stdin, "2", "preview.render", json!({}));
    send(
        &mut stdin,
        "3",
        "record.setField",
        json!({ "field": "grade", "value": "6th" }),
    );

    let render = read_reply(&mut reader);
    assert_eq!(render["id"], json!("2"));
    assert_eq!(render["ok"], json!(true));
    assert!(
        started.elapsed() < REPLY_DELAY,
        "preview.render waited {:?} for the suggestion",
        started.elapsed()
    );

    let edit = read_reply(&mut reader);
    assert_eq!(edit["id"], json!("3"));
    assert_eq!(edit["result"]["record"]["strengths"], json!(""));

    // The suggestion lands on the record as edited in the meantime.
    let suggestion = read_reply(&mut reader);
    assert_eq!(suggestion["id"], json!("1"));
    assert_eq!(suggestion["ok"], json!(true), "{}", suggestion);
    assert_eq!(suggestion["result"]["applied"], json!(true));
    assert_eq!(
        suggestion["result"]["record"]["strengths"],
        json!("enjoys robotics club")
    );
    assert_eq!(suggestion["result"]["record"]["grade"], json!("6th"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn pending_suggestion_is_answered_after_input_closes() {
    let endpoint = spawn_slow_service("Not found");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&endpoint);

    send(
        &mut stdin,
        "only",
        "ai.suggest",
        json!({ "locator": { "field": "behavior" } }),
    );
    drop(stdin);

    let reply = read_reply(&mut reader);
    assert_eq!(reply["id"], json!("only"));
    assert_eq!(reply["result"]["applied"], json!(false));
    assert_eq!(reply["result"]["suggestion"], json!(null));

    let status = child.wait().expect("wait for exit");
    assert!(status.success());
}
