//! SoapClient against a local axum server

use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use ccp_sync::{RemoteAdapter, RemoteCallError, SoapClient};
use serde_json::json;
use std::time::Duration;

const RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns1="urn:FC">
  <SOAP-ENV:Body>
    <ns1:getFCResponse>
      <return>
        <item><child_id>K-1</child_id><open_date>2024-01-02</open_date></item>
        <item><child_id>K-2</child_id><open_date/></item>
      </return>
    </ns1:getFCResponse>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

async fn echo_case(headers: HeaderMap, body: String) -> (StatusCode, String) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("text/xml") || !body.contains("<case_id>") {
        return (StatusCode::BAD_REQUEST, "bad request".to_string());
    }
    (StatusCode::OK, RESPONSE.to_string())
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/soap", post(echo_case))
        .route(
            "/broken",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "backend exploded") }),
        )
        .route("/garbage", post(|| async { "<unclosed><tag>" }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_post_decodes_soap_response() {
    let base = spawn_server().await;
    let client = SoapClient::new(format!("{}/soap", base), Duration::from_secs(5)).unwrap();

    let doc = client
        .post("<x><case_id>C-1</case_id></x>".to_string())
        .await
        .unwrap();

    let ret = &doc["SOAP-ENV:Envelope"]["SOAP-ENV:Body"]["ns1:getFCResponse"]["return"];
    assert_eq!(
        ret["item"],
        json!([
            {"child_id": "K-1", "open_date": "2024-01-02"},
            {"child_id": "K-2", "open_date": null}
        ])
    );
}

#[tokio::test]
async fn test_non_success_status_is_call_error() {
    let base = spawn_server().await;
    let client = SoapClient::new(format!("{}/broken", base), Duration::from_secs(5)).unwrap();

    let err = client.post("<x/>".to_string()).await.unwrap_err();

    assert_eq!(err, RemoteCallError::Status(500, "backend exploded".to_string()));
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let base = spawn_server().await;
    let client = SoapClient::new(format!("{}/garbage", base), Duration::from_secs(5)).unwrap();

    let err = client.post("<x/>".to_string()).await.unwrap_err();

    assert!(matches!(err, RemoteCallError::Parse(_)));
}
