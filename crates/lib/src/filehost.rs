//! File hosting collaborator: upload bytes, get back a shareable URL.
//!
//! `GofileHost` talks to gofile.io: ask the API for the best upload server, then multipart-POST
//! the file to it. Responses look like `{"status":"ok","data":{...}}`.

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum FileHostError {
    #[error("file host request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("file host returned status `{0}`")]
    Status(String),

    #[error("file host response is missing `{0}`")]
    Missing(&'static str),
}

#[async_trait]
pub trait FileHost: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String, FileHostError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ApiResponse {
    fn into_ok_data(self) -> Result<serde_json::Value, FileHostError> {
        if self.status != "ok" {
            return Err(FileHostError::Status(self.status));
        }
        Ok(self.data)
    }
}

/// Pick the upload server name out of a `getServer` response.
fn server_from_response(res: ApiResponse) -> Result<String, FileHostError> {
    res.into_ok_data()?
        .get("server")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(FileHostError::Missing("data.server"))
}

/// Build the download page URL out of an `uploadFile` response.
fn download_url(server_base: &str, res: ApiResponse) -> Result<String, FileHostError> {
    let code = res
        .into_ok_data()?
        .get("code")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(FileHostError::Missing("data.code"))?;
    Ok(format!("{}d/{}", server_base, code))
}

pub struct GofileHost {
    client: reqwest::Client,
    api_base: String,
    file_name: String,
}

impl GofileHost {
    /// `api_base` is the API root, e.g. "https://apiv2.gofile.io" (`fileHost.apiBase`).
    pub fn new(api_base: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            file_name: file_name.into(),
        }
    }

    fn server_url(&self) -> String {
        format!("{}/getServer", self.api_base)
    }

    async fn best_server(&self) -> Result<String, FileHostError> {
        let url = self.server_url();
        let res: ApiResponse = self.client.get(&url).send().await?.json().await?;
        server_from_response(res)
    }
}

#[async_trait]
impl FileHost for GofileHost {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String, FileHostError> {
        let server = self.best_server().await?;
        let server_base = format!("https://{}.gofile.io/", server);
        let part = reqwest::multipart::Part::bytes(bytes).file_name(self.file_name.clone());
        let form = reqwest::multipart::Form::new().part("file", part);
        let res: ApiResponse = self
            .client
            .post(format!("{}uploadFile", server_base))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        let url = download_url(&server_base, res)?;
        log::debug!("uploaded {} to {}", self.file_name, url);
        Ok(url)
    }
}
