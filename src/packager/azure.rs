use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use std::collections::BTreeMap;

use super::{
    check_response, credential, hmac_sha256, storage_name, PackageError, PackageOutput,
    PackageTarget, StagedPackage,
};
use crate::models::Parameters;

const ACCOUNT_PARAM: &str = "azure_account_name";
const KEY_PARAM: &str = "azure_account_key";
const API_VERSION: &str = "2019-02-02";
/// Largest range accepted by a single Put Range call
const MAX_RANGE: usize = 4 * 1024 * 1024;

/// Upload to an Azure Files share named after the package
pub struct AzureTarget {
    client: reqwest::Client,
}

impl AzureTarget {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

struct Account {
    name: String,
    key: Vec<u8>,
}

/// One Azure Files REST call before signing
struct FileRequest<'a> {
    resource: String,
    query: Vec<(&'a str, &'a str)>,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl<'a> FileRequest<'a> {
    fn new(resource: String) -> Self {
        Self {
            resource,
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    fn query(mut self, name: &'a str, value: &'a str) -> Self {
        self.query.push((name, value));
        self
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    /// SMB properties required when creating a directory or file
    fn smb_properties(self, attributes: &str) -> Self {
        self.header("x-ms-file-attributes", attributes)
            .header("x-ms-file-permission", "inherit")
            .header("x-ms-file-creation-time", "now")
            .header("x-ms-file-last-write-time", "now")
    }

    fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// SharedKey string-to-sign for a PUT
    fn string_to_sign(&self, account: &str) -> String {
        let content_length = if self.body.is_empty() {
            String::new()
        } else {
            self.body.len().to_string()
        };
        let range = self.headers.get("range").cloned().unwrap_or_default();

        let mut canonical_headers = String::new();
        for (name, value) in self.headers.iter().filter(|(n, _)| n.starts_with("x-ms-")) {
            canonical_headers.push_str(&format!("{}:{}\n", name, value.trim()));
        }

        let mut canonical_resource = format!("/{}/{}", account, self.resource);
        let mut query = self.query.clone();
        query.sort();
        for (name, value) in query {
            canonical_resource.push_str(&format!("\n{}:{}", name.to_lowercase(), value));
        }

        // verb, encoding, language, length, md5, type, date,
        // if-modified-since, if-match, if-none-match, if-unmodified-since, range
        format!(
            "PUT\n\n\n{}\n\n\n\n\n\n\n\n{}\n{}{}",
            content_length, range, canonical_headers, canonical_resource
        )
    }
}

#[async_trait]
impl PackageTarget for AzureTarget {
    fn required_parameters(&self) -> &'static [&'static str] {
        &[ACCOUNT_PARAM, KEY_PARAM]
    }

    async fn package(
        &self,
        staged: &StagedPackage,
        parameters: &Parameters,
    ) -> Result<PackageOutput, PackageError> {
        let account = Account {
            name: credential(parameters, ACCOUNT_PARAM)?,
            key: STANDARD
                .decode(credential(parameters, KEY_PARAM)?)
                .map_err(|e| PackageError::MissingCredentials(format!("{} is not base64: {}", KEY_PARAM, e)))?,
        };
        let share = storage_name(&staged.name);

        let create_share = FileRequest::new(share.clone()).query("restype", "share");
        self.send(&account, create_share, &format!("create share {}", share), &["ShareAlreadyExists"])
            .await?;

        let mut uploaded = 0;
        for entry in staged.entries()? {
            let resource = format!("{}/{}", share, encode_path(&entry.relative));
            if entry.is_dir {
                let request = FileRequest::new(resource)
                    .query("restype", "directory")
                    .smb_properties("Directory");
                self.send(&account, request, &format!("create directory {}", entry.relative), &["ResourceAlreadyExists"])
                    .await?;
                continue;
            }

            let contents = tokio::fs::read(&entry.path).await?;
            let request = FileRequest::new(resource.clone())
                .header("x-ms-type", "file")
                .header("x-ms-content-length", contents.len().to_string())
                .smb_properties("None");
            self.send(&account, request, &format!("create file {}", entry.relative), &[])
                .await?;

            for (offset, chunk) in contents.chunks(MAX_RANGE).enumerate() {
                let start = offset * MAX_RANGE;
                let range = format!("bytes={}-{}", start, start + chunk.len() - 1);
                let request = FileRequest::new(resource.clone())
                    .query("comp", "range")
                    .header("x-ms-range", range)
                    .header("x-ms-write", "update")
                    .body(chunk.to_vec());
                self.send(&account, request, &format!("write {}", entry.relative), &[])
                    .await?;
            }
            uploaded += 1;
        }

        tracing::info!("Uploaded {} files to Azure share {}", uploaded, share);
        Ok(PackageOutput::Uploaded(format!(
            "Uploaded {} files to https://{}.file.core.windows.net/{}",
            uploaded, account.name, share
        )))
    }
}

impl AzureTarget {
    async fn send(
        &self,
        account: &Account,
        request: FileRequest<'_>,
        action: &str,
        tolerated: &[&str],
    ) -> Result<(), PackageError> {
        let now = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let request = request
            .header("x-ms-date", now)
            .header("x-ms-version", API_VERSION);

        let signature = STANDARD.encode(hmac_sha256(
            &account.key,
            request.string_to_sign(&account.name).as_bytes(),
        )?);

        let query: Vec<String> = request
            .query
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        let url = format!(
            "https://{}.file.core.windows.net/{}?{}",
            account.name,
            request.resource,
            query.join("&")
        );

        let mut builder = self
            .client
            .put(url.trim_end_matches('?'))
            .header("authorization", format!("SharedKey {}:{}", account.name, signature));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| PackageError::Upload(format!("{}: {}", action, e)))?;
        check_response(response, action, tolerated).await
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_sign_for_range_write() {
        let request = FileRequest::new("fw1/config/init-cfg.txt".to_string())
            .query("comp", "range")
            .header("x-ms-write", "update")
            .header("x-ms-range", "bytes=0-4")
            .header("x-ms-date", "Fri, 01 Mar 2024 12:30:00 GMT")
            .header("x-ms-version", API_VERSION)
            .body(b"hello".to_vec());

        let expected = "PUT\n\n\n5\n\n\n\n\n\n\n\n\n\
            x-ms-date:Fri, 01 Mar 2024 12:30:00 GMT\n\
            x-ms-range:bytes=0-4\n\
            x-ms-version:2019-02-02\n\
            x-ms-write:update\n\
            /acct/fw1/config/init-cfg.txt\ncomp:range";
        assert_eq!(request.string_to_sign("acct"), expected);
    }

    #[test]
    fn test_string_to_sign_empty_body_has_blank_length() {
        let request = FileRequest::new("fw1".to_string())
            .query("restype", "share")
            .header("x-ms-version", API_VERSION);
        assert_eq!(
            request.string_to_sign("acct"),
            "PUT\n\n\n\n\n\n\n\n\n\n\n\nx-ms-version:2019-02-02\n/acct/fw1\nrestype:share"
        );
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path("config/init-cfg.txt"), "config/init-cfg.txt");
        assert_eq!(encode_path("content/a b"), "content/a%20b");
    }
}
