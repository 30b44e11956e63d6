use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use conjure::generator::{GenerationError, Generator, ModelGenerator};

/// Serves exactly one HTTP response and hands back the request body it received.
fn one_shot_server(status: &str, body: &str) -> Result<(String, JoinHandle<String>)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let endpoint = format!("http://{}", listener.local_addr()?);
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("client should connect");
        let mut reader = BufReader::new(stream);
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("request header");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().expect("numeric length");
                }
            }
        }
        let mut request = vec![0; content_length];
        reader.read_exact(&mut request).expect("request body");

        let mut stream = reader.into_inner();
        stream.write_all(response.as_bytes()).expect("response");
        stream.flush().expect("flush");
        String::from_utf8(request).expect("utf-8 request")
    });

    Ok((endpoint, handle))
}

fn generator(endpoint: &str) -> ModelGenerator<conjure::generator::OllamaTransport> {
    ModelGenerator::ollama(endpoint, "test-model", Some(Duration::from_secs(5)))
}

#[test]
fn fenced_replies_are_cleaned() -> Result<()> {
    let reply = serde_json::json!({
        "model": "test-model",
        "message": {
            "role": "assistant",
            "content": "```python\ndef fibonacci(n: int) -> int:\n    return n if n < 2 else fibonacci(n-1) + fibonacci(n-2)\n```",
        },
        "done": true,
    });
    let (endpoint, server) = one_shot_server("200 OK", &reply.to_string())?;

    let source = generator(&endpoint).generate(
        "fibonacci",
        "(n: int) -> int",
        Some("Returns the nth Fibonacci number."),
    )?;
    assert_eq!(
        source,
        "def fibonacci(n: int) -> int:\n    return n if n < 2 else fibonacci(n-1) + fibonacci(n-2)"
    );

    let request: serde_json::Value = serde_json::from_str(&server.join().expect("server thread"))?;
    assert_eq!(request["model"], "test-model");
    assert_eq!(request["stream"], false);
    assert_eq!(request["messages"][0]["role"], "system");
    let prompt = request["messages"][1]["content"].as_str().unwrap_or_default();
    assert!(prompt.contains("fibonacci"));
    assert!(prompt.contains("(n: int) -> int"));
    assert!(prompt.contains("Returns the nth Fibonacci number."));
    Ok(())
}

#[test]
fn error_statuses_are_reported() -> Result<()> {
    let (endpoint, server) = one_shot_server(
        "404 Not Found",
        r#"{"error":"model 'test-model' not found"}"#,
    )?;

    let err = generator(&endpoint)
        .generate("square", "(x)", None)
        .expect_err("a 404 is a failure");
    server.join().expect("server thread");
    match err {
        GenerationError::Status { code, body } => {
            assert_eq!(code, 404);
            assert!(body.contains("not found"));
        }
        other => panic!("expected a status error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn malformed_bodies_are_reported() -> Result<()> {
    let (endpoint, server) = one_shot_server("200 OK", r#"{"unexpected": true}"#)?;

    let err = generator(&endpoint)
        .generate("square", "(x)", None)
        .expect_err("no message field");
    server.join().expect("server thread");
    assert!(matches!(err, GenerationError::MalformedResponse(_)));
    Ok(())
}

#[test]
fn blank_replies_are_empty_responses() -> Result<()> {
    let reply = serde_json::json!({"message": {"role": "assistant", "content": "```\n```"}});
    let (endpoint, server) = one_shot_server("200 OK", &reply.to_string())?;

    let err = generator(&endpoint)
        .generate("square", "(x)", None)
        .expect_err("nothing usable");
    server.join().expect("server thread");
    assert_eq!(err, GenerationError::EmptyResponse);
    Ok(())
}

#[test]
fn unreachable_servers_are_transport_errors() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let endpoint = format!("http://{}", listener.local_addr()?);
    drop(listener);

    let err = generator(&endpoint)
        .generate("square", "(x)", None)
        .expect_err("nobody is listening");
    assert!(matches!(err, GenerationError::Transport(_)));
    Ok(())
}
