use async_trait::async_trait;

use super::{
    check_response, credential, storage_name, PackageError, PackageOutput, PackageTarget,
    StagedPackage,
};
use crate::models::Parameters;

const PROJECT_PARAM: &str = "gcp_project_id";
const TOKEN_PARAM: &str = "gcp_access_token";
const STORAGE_API: &str = "https://storage.googleapis.com";

/// Upload to a Google Cloud Storage bucket named after the package
pub struct GcpTarget {
    client: reqwest::Client,
}

impl GcpTarget {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn upload(
        &self,
        token: &str,
        bucket: &str,
        object: &str,
        body: Vec<u8>,
    ) -> Result<(), PackageError> {
        let action = format!("upload gs://{}/{}", bucket, object);
        let response = self
            .client
            .post(object_url(bucket, object))
            .bearer_auth(token)
            .header("content-type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| PackageError::Upload(format!("{}: {}", action, e)))?;
        check_response(response, &action, &[]).await
    }
}

#[async_trait]
impl PackageTarget for GcpTarget {
    fn required_parameters(&self) -> &'static [&'static str] {
        &[PROJECT_PARAM, TOKEN_PARAM]
    }

    async fn package(
        &self,
        staged: &StagedPackage,
        parameters: &Parameters,
    ) -> Result<PackageOutput, PackageError> {
        let project = credential(parameters, PROJECT_PARAM)?;
        let token = credential(parameters, TOKEN_PARAM)?;
        let bucket = storage_name(&staged.name);

        let action = format!("create bucket {}", bucket);
        let response = self
            .client
            .post(format!(
                "{}/storage/v1/b?project={}",
                STORAGE_API,
                urlencoding::encode(&project)
            ))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "name": bucket }))
            .send()
            .await
            .map_err(|e| PackageError::Upload(format!("{}: {}", action, e)))?;
        // 409 covers both "already yours" and "taken"; a taken name fails on the first upload
        check_response(response, &action, &["conflict"]).await?;

        let mut uploaded = 0;
        for entry in staged.entries()? {
            if entry.is_dir {
                self.upload(&token, &bucket, &format!("{}/", entry.relative), Vec::new())
                    .await?;
            } else {
                let body = tokio::fs::read(&entry.path).await?;
                self.upload(&token, &bucket, &entry.relative, body).await?;
                uploaded += 1;
            }
        }

        tracing::info!("Uploaded {} files to gs://{}", uploaded, bucket);
        Ok(PackageOutput::Uploaded(format!(
            "Uploaded {} files to gs://{} in project {}",
            uploaded, bucket, project
        )))
    }
}

fn object_url(bucket: &str, object: &str) -> String {
    format!(
        "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
        STORAGE_API,
        urlencoding::encode(bucket),
        urlencoding::encode(object)
    )
}
