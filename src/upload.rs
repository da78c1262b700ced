use std::{
    fs,
    io::Read,
    path::Path,
};

use anyhow::{anyhow, bail, Context, Result};
use curl::easy::{Easy, List};
use serde::{Deserialize, Serialize};
use url::Url;

const STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
const GENOMICS_ENDPOINT: &str = "https://genomics.googleapis.com/v1";
const TOKEN_VAR: &str = "GOOGLE_OAUTH_TOKEN";

/// Handle for an asynchronous variant-import job. The store processes the
/// import on its own; no polling happens here.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportJob {
    pub name: String,
}

/// Stages a finished VCF into a storage bucket and asks the variant store to
/// import it. The only contract with the rest of the tool is a path to a
/// complete, valid output file.
#[derive(Debug)]
pub struct Uploader {
    project: String,
    bucket: String,
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportRequest<'a> {
    variant_set_id: &'a str,
    source_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantSet {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantSetList {
    #[serde(default)]
    variant_sets: Vec<VariantSet>,
}

impl Uploader {
    pub fn new(project: &str, staging_bucket: &str) -> Result<Self> {
        let bucket = parse_bucket(staging_bucket)?;
        let token = std::env::var(TOKEN_VAR)
            .with_context(|| format!("{TOKEN_VAR} is not set; cannot authenticate"))?;

        Ok(Self {
            project: project.to_string(),
            bucket,
            token,
        })
    }

    /// Stage the file and start the import. Returns the job handle.
    pub fn import_vcf(
        &self,
        input: &Path,
        dataset_name: &str,
        variant_set_name: &str,
    ) -> Result<ImportJob> {
        let staged_uri = self.stage_vcf(input)?;
        let dataset = self.get_or_create_dataset(dataset_name)?;
        let variant_set = self.get_or_create_variant_set(&dataset.id, variant_set_name)?;

        let request = ImportRequest {
            variant_set_id: &variant_set.id,
            source_uris: vec![staged_uri],
        };
        let body = self.post_json(
            &format!("{GENOMICS_ENDPOINT}/variants:import"),
            &serde_json::to_vec(&request)?,
        )?;
        let job: ImportJob =
            serde_json::from_slice(&body).context("malformed variant import response")?;

        tracing::info!(job = %job.name, "variant import started");
        Ok(job)
    }

    fn stage_vcf(&self, input: &Path) -> Result<String> {
        let object = object_name(input)?;
        let bucket = self.bucket.as_str();
        let uri = format!("gs://{bucket}/{object}");

        if self.object_exists(bucket, &object) {
            tracing::info!(%uri, "staged object already exists, skipping upload");
            return Ok(uri);
        }

        let data = fs::read(input)
            .with_context(|| format!("failed to read staged input {}", input.display()))?;
        let url = format!(
            "{STORAGE_ENDPOINT}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={object}"
        );
        self.put_object(&url, &data)
            .with_context(|| format!("failed to stage {} into {bucket}", input.display()))?;

        Ok(uri)
    }

    fn object_exists(&self, bucket: &str, object: &str) -> bool {
        let url = format!("{STORAGE_ENDPOINT}/storage/v1/b/{bucket}/o/{object}");
        self.get(&url).is_ok()
    }

    fn get_or_create_dataset(&self, name: &str) -> Result<Dataset> {
        let body = self.get(&format!(
            "{GENOMICS_ENDPOINT}/datasets?projectId={}",
            self.project
        ))?;
        let list: DatasetList =
            serde_json::from_slice(&body).context("malformed dataset list response")?;
        if let Some(dataset) = list.datasets.into_iter().find(|d| d.name == name) {
            return Ok(dataset);
        }

        let request = serde_json::json!({ "name": name, "projectId": self.project });
        let body = self.post_json(
            &format!("{GENOMICS_ENDPOINT}/datasets"),
            &serde_json::to_vec(&request)?,
        )?;
        serde_json::from_slice(&body).context("malformed dataset create response")
    }

    fn get_or_create_variant_set(&self, dataset_id: &str, name: &str) -> Result<VariantSet> {
        let request = serde_json::json!({ "datasetIds": [dataset_id] });
        let body = self.post_json(
            &format!("{GENOMICS_ENDPOINT}/variantsets/search"),
            &serde_json::to_vec(&request)?,
        )?;
        let list: VariantSetList =
            serde_json::from_slice(&body).context("malformed variant set search response")?;
        if let Some(set) = list.variant_sets.into_iter().find(|s| s.name == name) {
            return Ok(set);
        }

        let request = serde_json::json!({ "datasetId": dataset_id, "name": name });
        let body = self.post_json(
            &format!("{GENOMICS_ENDPOINT}/variantsets"),
            &serde_json::to_vec(&request)?,
        )?;
        serde_json::from_slice(&body).context("malformed variant set create response")
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.http_headers(self.headers(None)?)?;
        perform(&mut easy, None)
    }

    fn post_json(&self, url: &str, body: &[u8]) -> Result<Vec<u8>> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.post(true)?;
        easy.post_fields_copy(body)?;
        easy.http_headers(self.headers(Some("application/json"))?)?;
        perform(&mut easy, None)
    }

    fn put_object(&self, url: &str, data: &[u8]) -> Result<Vec<u8>> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.upload(true)?;
        easy.in_filesize(data.len() as u64)?;
        easy.http_headers(self.headers(None)?)?;
        perform(&mut easy, Some(data))
    }

    fn headers(&self, content_type: Option<&str>) -> Result<List> {
        let mut list = List::new();
        list.append(&format!("Authorization: Bearer {}", self.token))?;
        if let Some(content_type) = content_type {
            list.append(&format!("Content-Type: {content_type}"))?;
        }
        Ok(list)
    }
}

fn perform(easy: &mut Easy, payload: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    {
        let mut transfer = easy.transfer();
        if let Some(mut data) = payload {
            transfer.read_function(move |into| Ok(data.read(into).unwrap_or(0)))?;
        }
        transfer.write_function(|chunk| {
            body.extend_from_slice(chunk);
            Ok(chunk.len())
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        bail!(
            "request failed with HTTP {code}: {}",
            String::from_utf8_lossy(&body)
        );
    }
    Ok(body)
}

fn parse_bucket(staging_bucket: &str) -> Result<String> {
    let url = Url::parse(staging_bucket)
        .with_context(|| format!("invalid staging bucket url {staging_bucket}"))?;
    if url.scheme() != "gs" {
        bail!("staging bucket must be a gs:// url, got {staging_bucket}");
    }
    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("staging bucket url {staging_bucket} names no bucket"))
}

fn object_name(input: &Path) -> Result<String> {
    input
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("input path {} has no file name", input.display()))
}
