use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::{
    check_response, credential, hmac_sha256, storage_name, PackageError, PackageOutput,
    PackageTarget, StagedPackage,
};
use crate::models::Parameters;

const REGION_PARAM: &str = "aws_location";
const ACCESS_KEY_PARAM: &str = "aws_key";
const SECRET_KEY_PARAM: &str = "aws_secret";
const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// Upload to an S3 bucket named after the package, signed with SigV4
pub struct S3Target {
    client: reqwest::Client,
}

impl S3Target {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

struct Credentials {
    region: String,
    access_key: String,
    secret_key: String,
}

#[async_trait]
impl PackageTarget for S3Target {
    fn required_parameters(&self) -> &'static [&'static str] {
        &[REGION_PARAM, ACCESS_KEY_PARAM, SECRET_KEY_PARAM]
    }

    async fn package(
        &self,
        staged: &StagedPackage,
        parameters: &Parameters,
    ) -> Result<PackageOutput, PackageError> {
        let creds = Credentials {
            region: credential(parameters, REGION_PARAM)?,
            access_key: credential(parameters, ACCESS_KEY_PARAM)?,
            secret_key: credential(parameters, SECRET_KEY_PARAM)?,
        };
        let bucket = storage_name(&staged.name);
        let host = format!("{}.s3.{}.amazonaws.com", bucket, creds.region);

        let create_body = if creds.region == "us-east-1" {
            Vec::new()
        } else {
            format!(
                "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                 <LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
                creds.region
            )
            .into_bytes()
        };
        self.put(&creds, &host, "", create_body, &format!("create bucket {}", bucket), &["BucketAlreadyOwnedByYou"])
            .await?;

        let mut uploaded = 0;
        for entry in staged.entries()? {
            if entry.is_dir {
                let marker = format!("{}/", entry.relative);
                self.put(&creds, &host, &marker, Vec::new(), &format!("create folder {}", marker), &[])
                    .await?;
            } else {
                let body = tokio::fs::read(&entry.path).await?;
                self.put(&creds, &host, &entry.relative, body, &format!("upload {}", entry.relative), &[])
                    .await?;
                uploaded += 1;
            }
        }

        tracing::info!("Uploaded {} files to s3://{}", uploaded, bucket);
        Ok(PackageOutput::Uploaded(format!(
            "Uploaded {} files to s3://{} in {}",
            uploaded, bucket, creds.region
        )))
    }
}

impl S3Target {
    async fn put(
        &self,
        creds: &Credentials,
        host: &str,
        key: &str,
        body: Vec<u8>,
        action: &str,
        tolerated: &[&str],
    ) -> Result<(), PackageError> {
        let path = canonical_uri(key);
        let headers = sign_request(creds, "PUT", host, &path, &body, Utc::now())?;

        let mut request = self.client.put(format!("https://{}{}", host, path));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| PackageError::Upload(format!("{}: {}", action, e)))?;
        check_response(response, action, tolerated).await
    }
}

/// `/` followed by the key with every segment percent-encoded
fn canonical_uri(key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("/{}", encoded.join("/"))
}

/// Headers (`x-amz-date`, `x-amz-content-sha256`, `authorization`) for a
/// request without query string
fn sign_request(
    creds: &Credentials,
    method: &str,
    host: &str,
    path: &str,
    payload: &[u8],
    now: DateTime<Utc>,
) -> Result<Vec<(&'static str, String)>, PackageError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let payload_hash = hex::encode(Sha256::digest(payload));

    let canonical = canonical_request(method, path, host, &payload_hash, &amz_date);
    let scope = format!("{}/{}/{}/aws4_request", date, creds.region, SERVICE);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical.as_bytes()))
    );

    let key = signing_key(&creds.secret_key, &date, &creds.region, SERVICE)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(vec![
        ("x-amz-date", amz_date),
        ("x-amz-content-sha256", payload_hash),
        (
            "authorization",
            format!(
                "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                creds.access_key, scope, SIGNED_HEADERS, signature
            ),
        ),
    ])
}

fn canonical_request(method: &str, path: &str, host: &str, payload_hash: &str, amz_date: &str) -> String {
    format!(
        "{}\n{}\n\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
        method, path, host, payload_hash, amz_date, SIGNED_HEADERS, payload_hash
    )
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>, PackageError> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_signing_key_derivation() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_canonical_uri_encodes_segments() {
        assert_eq!(canonical_uri("config/init-cfg.txt"), "/config/init-cfg.txt");
        assert_eq!(canonical_uri("config/"), "/config/");
        assert_eq!(canonical_uri(""), "/");
        assert_eq!(canonical_uri("content/a b+c"), "/content/a%20b%2Bc");
    }

    #[test]
    fn test_sign_request_headers() {
        let creds = Credentials {
            region: "us-west-2".to_string(),
            access_key: "AKIDEXAMPLE".to_string(),
            secret_key: "secret".to_string(),
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let headers = sign_request(&creds, "PUT", "fw1.s3.us-west-2.amazonaws.com", "/config/", b"", now).unwrap();

        assert_eq!(headers[0], ("x-amz-date", "20240301T123000Z".to_string()));
        // sha256 of the empty payload
        assert_eq!(
            headers[1].1,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let auth = &headers[2].1;
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240301/us-west-2/s3/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));
        let signature = auth.rsplit('=').next().unwrap();
        assert_eq!(signature.len(), 64);

        // deterministic for identical input
        let again = sign_request(&creds, "PUT", "fw1.s3.us-west-2.amazonaws.com", "/config/", b"", now).unwrap();
        assert_eq!(headers, again);
    }

    #[test]
    fn test_required_parameters() {
        let target = S3Target::new(reqwest::Client::new());
        assert_eq!(
            target.required_parameters(),
            &["aws_location", "aws_key", "aws_secret"]
        );
    }
}
