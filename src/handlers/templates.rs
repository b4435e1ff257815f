use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::assembler::variable_payload;
use crate::models::*;
use crate::AppState;

use super::params::Params;
use super::{ApiError, StatusResponse};

const DEFAULT_DESCRIPTION: &str = "Imported Template";

/// Template listing: {"success", "templates", "status_code"}
#[derive(Serialize)]
pub struct TemplateListResponse {
    pub success: bool,
    pub templates: Vec<TemplateSummary>,
    pub status_code: u16,
}

impl TemplateListResponse {
    fn ok(templates: Vec<TemplateSummary>) -> Json<Self> {
        Json(Self {
            success: true,
            templates,
            status_code: 200,
        })
    }
}

fn text_plain(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

fn required_text(params: &Parameters, name: &str) -> Result<String, ApiError> {
    params
        .text(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{} is required", name)))
}

/// Build an upsert from `name`, `template` (URL-quoted), `description` and `type`
fn template_upsert(params: &Parameters) -> Result<TemplateUpsert, ApiError> {
    let name = required_text(params, "name")?;
    let quoted = required_text(params, "template")?;
    let content = urlencoding::decode(&quoted)
        .map_err(|e| ApiError::bad_request(format!("template is not valid UTF-8: {}", e)))?
        .into_owned();

    let kind = match params.text("type").filter(|t| !t.is_empty()) {
        Some(kind) => kind.parse().map_err(ApiError::bad_request)?,
        None => TemplateKind::Bootstrap,
    };
    let description = params
        .text("description")
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    Ok(TemplateUpsert {
        name,
        description,
        kind,
        content,
    })
}

fn wants_placeholders(params: &Parameters) -> bool {
    params.text(param::FORMAT).as_deref() == Some("aframe")
}

/// Bootstrap templates, led by the "None" sentinel
pub async fn list_templates(State(state): State<Arc<AppState>>) -> Json<TemplateListResponse> {
    let mut templates = vec![TemplateSummary::none_sentinel()];
    templates.extend(state.store.list_templates(TemplateKind::Bootstrap).await);
    TemplateListResponse::ok(templates)
}

pub async fn list_init_cfg_templates(State(state): State<Arc<AppState>>) -> Json<TemplateListResponse> {
    TemplateListResponse::ok(state.store.list_templates(TemplateKind::InitConfig).await)
}

/// Raw template body as text/plain
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    let name = required_text(&params, param::TEMPLATE_NAME)?;
    let template = state
        .store
        .get_template(&name)
        .await
        .ok_or_else(|| ApiError::not_found("template"))?;
    Ok(text_plain(template.content))
}

/// Insert a template; an existing name is left as is
pub async fn import_template(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    let upsert = template_upsert(&params)?;
    let ok = state.store.import_template(&upsert).await;
    Ok(StatusResponse::from_outcome(
        ok,
        "Imported Template Successfully",
        "Could not import template repository to the configured database",
    ))
}

/// Insert or replace a template by name
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    let upsert = template_upsert(&params)?;
    let ok = state.store.update_template(&upsert).await;
    Ok(StatusResponse::from_outcome(
        ok,
        "Updated Template Successfully",
        "Could not update template",
    ))
}

pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    let name = required_text(&params, param::TEMPLATE_NAME)?;
    let ok = state.store.delete_template(&name).await;
    Ok(StatusResponse::from_outcome(
        ok,
        "Deleted Template Successfully",
        "Could not delete template",
    ))
}

/// Render a stored template against the posted variables
pub async fn render_template(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    let rendered = state
        .assembler
        .compile_template(&state.store, &params)
        .await?;
    Ok(text_plain(rendered))
}

/// Request skeleton for a bootstrap package build
pub async fn get_bootstrap_variables(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Json<Value> {
    let variables = state
        .assembler
        .bootstrap_variables(&state.store, &params)
        .await;

    let mut payload = variable_payload(&variables, wants_placeholders(&params));
    payload.insert(param::ARCHIVE_TYPE.into(), json!("tgz"));
    payload.insert(param::AUTH_CODE.into(), json!("VALID-PAN-AUTH-CODE"));
    for name in [param::BOOTSTRAP_TEMPLATE, param::INIT_CFG_TEMPLATE] {
        if let Some(value) = params.text(name).filter(|v| !v.is_empty()) {
            payload.insert(name.into(), Value::String(value));
        }
    }

    Json(json!({
        "success": true,
        "payload": payload,
        "status_code": 200,
    }))
}

/// Request skeleton for rendering a single template
pub async fn get_template_variables(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Json<Value>, ApiError> {
    let name = required_text(&params, param::TEMPLATE_NAME)?;
    let variables = state
        .assembler
        .template_variables(&state.store, &name)
        .await?;

    let mut payload = variable_payload(&variables, wants_placeholders(&params));
    payload.insert(param::TEMPLATE_NAME.into(), Value::String(name));

    Ok(Json(json!({
        "success": true,
        "payload": payload,
        "status_code": 200,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Parameters {
        Parameters::from_value(value).unwrap()
    }

    #[test]
    fn test_template_upsert_defaults_and_unquoting() {
        let upsert = template_upsert(&params(json!({
            "name": "edge",
            "template": "hostname%3D%7B%7B%20hostname%20%7D%7D",
        })))
        .unwrap();
        assert_eq!(upsert.content, "hostname={{ hostname }}");
        assert_eq!(upsert.description, DEFAULT_DESCRIPTION);
        assert_eq!(upsert.kind, TemplateKind::Bootstrap);

        let upsert = template_upsert(&params(json!({
            "name": "edge",
            "template": "x",
            "type": "init-cfg",
            "description": "Edge init",
        })))
        .unwrap();
        assert_eq!(upsert.kind, TemplateKind::InitConfig);
        assert_eq!(upsert.description, "Edge init");
    }

    #[test]
    fn test_template_upsert_requires_name_and_body() {
        let err = template_upsert(&params(json!({"template": "x"}))).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        let err = template_upsert(&params(json!({"name": "edge"}))).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        let err = template_upsert(&params(json!({"name": "e", "template": "x", "type": "firmware"})))
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
