//! Maps engine errors to the cloud-service XML error envelope and HTTP
//! status, mirroring the teacher's `rustpress-server::error::HttpError`
//! `IntoResponse` pattern, generalized from JSON problem bodies to XML.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use emu_core::EngineError;

pub struct HttpError(pub EngineError, pub String);

impl HttpError {
    pub fn new(err: EngineError) -> Self {
        let request_id = uuid::Uuid::new_v4().to_string();
        Self(err, request_id)
    }
}

impl From<EngineError> for HttpError {
    fn from(err: EngineError) -> Self {
        HttpError::new(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let HttpError(err, request_id) = self;
        let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = format!(
            r#"<?xml version="1.0"?>
<ErrorResponse xmlns="http://queue.amazonaws.com/doc/2012-11-05/">
  <Error>
    <Type>Sender</Type>
    <Code>{}</Code>
    <Message>{}</Message>
  </Error>
  <RequestId>{}</RequestId>
</ErrorResponse>"#,
            err.code(),
            xml_escape(&err.to_string()),
            request_id
        );
        (status, [("Content-Type", "text/xml")], body).into_response()
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
