use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::assembler::BootstrapError;
use crate::models::*;
use crate::packager::{ArchiveFile, PackageOutput};
use crate::services::bootstrap::{build_package, BuildTarget};
use crate::AppState;

use super::params::Params;
use super::ApiError;

/// Stream a finished archive as an attachment
async fn archive_response(archive: ArchiveFile) -> Result<Response, ApiError> {
    let file_name = archive.file_name.clone();
    let mime = archive.mime;
    let (file, len) = archive.open().await?;

    tracing::info!("Sending {} ({} bytes)", file_name, len);
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response())
}

async fn build(state: &AppState, params: &Parameters, target: BuildTarget) -> Result<Response, ApiError> {
    let output = build_package(&state.assembler, &state.packager, &state.store, params, target).await;

    match output {
        Ok(PackageOutput::Archive(archive)) => archive_response(archive).await,
        Ok(PackageOutput::Uploaded(location)) => {
            Ok(Json(serde_json::json!({ "response": location })).into_response())
        }
        Err(BootstrapError::RequiredParameters(message)) => {
            // tell the caller everything the chosen templates can use
            let variables = state
                .assembler
                .bootstrap_variables(&state.store, params)
                .await;
            let names: Vec<&str> = variables.iter().map(String::as_str).collect();
            Err(ApiError::bad_request(format!(
                "{}; required: {}; template variables: {}",
                message,
                param::HOSTNAME,
                names.join(", ")
            )))
        }
        Err(e) => Err(e.into()),
    }
}

fn fixed(archive_type: ArchiveType) -> BuildTarget {
    BuildTarget::Fixed {
        archive_type,
        openstack: false,
    }
}

/// Build a package for the requested `archive_type` (operator default otherwise)
pub async fn generate_bootstrap_package(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    build(&state, &params, BuildTarget::FromRequest).await
}

/// Zip package with the OpenStack Heat overlay
pub async fn bootstrap_openstack(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    let target = BuildTarget::Fixed {
        archive_type: ArchiveType::Zip,
        openstack: true,
    };
    build(&state, &params, target).await
}

/// ISO package for KVM config drives
pub async fn bootstrap_kvm(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    build(&state, &params, fixed(ArchiveType::Iso)).await
}

pub async fn bootstrap_tgz(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    build(&state, &params, fixed(ArchiveType::Tgz)).await
}

pub async fn bootstrap_aws(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    build(&state, &params, fixed(ArchiveType::S3)).await
}

pub async fn bootstrap_azure(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    build(&state, &params, fixed(ArchiveType::Azure)).await
}

pub async fn bootstrap_gcp(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Response, ApiError> {
    build(&state, &params, fixed(ArchiveType::Gcp)).await
}
