use std::collections::HashMap;

use kestrel::http::request::{HttpVersion, Method, Request};

fn request_with_headers(headers: &[(&str, &str)]) -> Request {
    Request {
        method: Method::GET,
        target: "/".to_string(),
        version: HttpVersion::Http11,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: Vec::new(),
    }
}

#[test]
fn test_method_from_token() {
    let methods = vec![
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("HEAD", Method::HEAD),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
    ];

    for (token, expected) in methods {
        assert_eq!(Method::from_token(token), Some(expected));
    }
}

#[test]
fn test_method_from_token_is_case_sensitive() {
    assert_eq!(Method::from_token("get"), None);
    assert_eq!(Method::from_token("Get"), None);
    assert_eq!(Method::from_token("BREW"), None);
}

#[test]
fn test_version_tokens_round_trip() {
    assert_eq!(HttpVersion::from_token("HTTP/1.0"), Some(HttpVersion::Http10));
    assert_eq!(HttpVersion::from_token("HTTP/1.1"), Some(HttpVersion::Http11));
    assert_eq!(HttpVersion::Http10.as_str(), "HTTP/1.0");
    assert_eq!(HttpVersion::Http11.as_str(), "HTTP/1.1");
}

#[test]
fn test_unknown_version_tokens_rejected() {
    assert_eq!(HttpVersion::from_token("HTTP/2"), None);
    assert_eq!(HttpVersion::from_token("HTTP/0.9"), None);
    assert_eq!(HttpVersion::from_token("http/1.1"), None);
}

#[test]
fn test_header_lookup() {
    let req = request_with_headers(&[("Host", "example.com"), ("Accept", "*/*")]);

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("Accept"), Some("*/*"));
    assert_eq!(req.header("User-Agent"), None);
}

#[test]
fn test_content_length_helper() {
    let req = request_with_headers(&[("Content-Length", "42")]);
    assert_eq!(req.content_length(), 42);

    let missing = request_with_headers(&[]);
    assert_eq!(missing.content_length(), 0);

    let garbled = request_with_headers(&[("Content-Length", "many")]);
    assert_eq!(garbled.content_length(), 0);
}

#[test]
fn test_request_is_cloneable() {
    let mut headers = HashMap::new();
    headers.insert("Host".to_string(), "example.com".to_string());
    let req = Request {
        method: Method::POST,
        target: "/upload".to_string(),
        version: HttpVersion::Http11,
        headers,
        body: vec![1, 2, 3],
    };

    let copy = req.clone();
    assert_eq!(copy.method, req.method);
    assert_eq!(copy.target, req.target);
    assert_eq!(copy.body, req.body);
}
