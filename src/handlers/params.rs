use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use std::collections::BTreeMap;

use crate::models::Parameters;

use super::ApiError;

/// Request parameters from a JSON object or a form-encoded body.
/// An empty body yields no parameters.
pub struct Params(pub Parameters);

#[async_trait]
impl<S> FromRequest<S> for Params
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        if is_form {
            let Form(fields) = Form::<BTreeMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            return Ok(Params(Parameters::from_form(fields)));
        }

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        parse_json(&body).map(Params)
    }
}

fn parse_json(body: &[u8]) -> Result<Parameters, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Parameters::new());
    }
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("could not parse request body: {}", e)))?;
    Parameters::from_value(value).map_err(ApiError::bad_request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    async fn extract(content_type: Option<&str>, body: &'static str) -> Result<Parameters, ApiError> {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        let req = builder.body(Body::from(body)).unwrap();
        Params::from_request(req, &()).await.map(|p| p.0)
    }

    #[tokio::test]
    async fn test_json_body() {
        let params = extract(Some("application/json"), r#"{"hostname": "fw1", "port": 22}"#)
            .await
            .unwrap();
        assert_eq!(params.text("hostname").as_deref(), Some("fw1"));
        assert_eq!(params.text("port").as_deref(), Some("22"));
    }

    #[tokio::test]
    async fn test_form_body() {
        let params = extract(
            Some("application/x-www-form-urlencoded"),
            "hostname=fw1&bootstrap_template=None",
        )
        .await
        .unwrap();
        assert_eq!(params.text("hostname").as_deref(), Some("fw1"));
        assert_eq!(params.text("bootstrap_template").as_deref(), Some("None"));
    }

    #[tokio::test]
    async fn test_empty_body_is_empty_parameters() {
        let params = extract(None, "").await.unwrap();
        assert!(params.as_map().is_empty());
    }

    #[tokio::test]
    async fn test_non_object_json_is_rejected() {
        let err = extract(Some("application/json"), "[1, 2]").await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);

        let err = extract(Some("application/json"), "{not json").await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
