//! `github-download`: fetch a release asset

use super::archive::extract_zip_async;
use super::{expect_mapping, required};
use crate::executor::{CommandHandler, StepContext, StepOutput};
use crate::pipeline::{Params, StepError};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

const API_BASE: &str = "https://api.github.com";

/// One downloadable file of a release
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    /// File name
    pub name: String,
    /// Public download URL
    pub browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

/// First asset whose name contains `arch`
#[must_use]
pub fn select_asset<'a>(assets: &'a [ReleaseAsset], arch: &str) -> Option<&'a ReleaseAsset> {
    assets.iter().find(|asset| asset.name.contains(arch))
}

/// Downloads a release asset matching an architecture
///
/// The downloaded path is exported as `zipName` for later steps.
#[derive(Debug, Clone)]
pub struct GithubDownloadCommand {
    client: Client,
    api_base: String,
}

impl Default for GithubDownloadCommand {
    fn default() -> Self {
        Self {
            client: Client::new(),
            api_base: API_BASE.to_string(),
        }
    }
}

#[derive(Debug)]
struct DownloadRequest {
    owner: String,
    repo: String,
    tag: String,
    arch: String,
    token: Option<String>,
    location: PathBuf,
    unzip: Option<PathBuf>,
}

impl DownloadRequest {
    fn from_params(params: &Params) -> Result<Self, StepError> {
        const CMD: &str = "github-download";
        expect_mapping(params, CMD)?;
        let location = params
            .get_str("location")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        let unzip = match params.get("unzip") {
            None | Some(Params::Null | Params::Bool(false)) => None,
            Some(Params::Bool(true)) => Some(location.clone()),
            Some(other) => other
                .to_text()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        };

        Ok(Self {
            owner: required(params, "owner", CMD)?,
            repo: required(params, "repo", CMD)?,
            tag: required(params, "tag", CMD)?,
            arch: required(params, "arch", CMD)?,
            token: params.get_str("token").filter(|t| !t.trim().is_empty()),
            location,
            unzip,
        })
    }
}

impl GithubDownloadCommand {
    /// Points the command at another API root, e.g. GitHub Enterprise
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// URL of the release metadata for a tag
    #[must_use]
    pub fn release_url(&self, owner: &str, repo: &str, tag: &str) -> String {
        format!("{}/repos/{owner}/{repo}/releases/tags/{tag}", self.api_base)
    }

    fn get(&self, url: &str, token: Option<&str>) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("buildstep/", env!("CARGO_PKG_VERSION")));
        match token {
            Some(token) => request.header(AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl CommandHandler for GithubDownloadCommand {
    fn name(&self) -> &str {
        "github-download"
    }

    fn help(&self) -> &str {
        "Download (and optionally unzip) a GitHub release asset"
    }

    async fn execute(&self, params: &Params, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let req = DownloadRequest::from_params(params)?;
        let url = self.release_url(&req.owner, &req.repo, &req.tag);
        tracing::info!(step = %ctx.step_name, %url, arch = %req.arch, "Fetching release");

        let response = self
            .get(&url, req.token.as_deref())
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StepError::Http(format!("{url} returned {status}: {body}")));
        }
        let release: Release = response.json().await?;

        let asset = select_asset(&release.assets, &req.arch).ok_or_else(|| {
            StepError::Http(format!(
                "no asset matching '{}' in {}/{} {}",
                req.arch, req.owner, req.repo, req.tag
            ))
        })?;

        let bytes = self
            .get(&asset.browser_download_url, req.token.as_deref())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::create_dir_all(&req.location).await?;
        let zip_path = req.location.join(&asset.name);
        tokio::fs::write(&zip_path, &bytes).await?;
        let zip_name = zip_path.display().to_string();
        tracing::info!(asset = %asset.name, path = %zip_name, bytes = bytes.len(), "Downloaded release asset");

        let mut response = json!({
            "asset": asset.name,
            "zipName": zip_name,
            "bytes": bytes.len(),
        });
        if let Some(dest) = req.unzip {
            let files = extract_zip_async(zip_path, dest.clone()).await?;
            response["unzippedTo"] = json!(dest.display().to_string());
            response["files"] = json!(files.len());
        }

        Ok(StepOutput::respond(response).export("zipName", zip_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets() -> Vec<ReleaseAsset> {
        ["app-amd64.zip", "app-armv7.zip", "app-arm64.zip"]
            .into_iter()
            .map(|name| ReleaseAsset {
                name: name.to_string(),
                browser_download_url: format!("https://example.invalid/{name}"),
            })
            .collect()
    }

    #[test]
    fn test_select_asset_by_arch() {
        let assets = assets();
        assert_eq!(
            select_asset(&assets, "armv7").map(|a| a.name.as_str()),
            Some("app-armv7.zip")
        );
        assert_eq!(
            select_asset(&assets, "arm").map(|a| a.name.as_str()),
            Some("app-armv7.zip")
        );
        assert!(select_asset(&assets, "riscv").is_none());
    }

    #[test]
    fn test_release_json_shape() {
        let release: Release = serde_json::from_str(
            r#"{"tag_name":"v1.0.0","assets":[{"name":"a-amd64.zip","browser_download_url":"https://x/a","size":3}]}"#,
        )
        .unwrap();
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].browser_download_url, "https://x/a");
    }

    #[test]
    fn test_release_url() {
        let cmd = GithubDownloadCommand::default().with_api_base("https://ghe.local/api/v3/");
        assert_eq!(
            cmd.release_url("NubeIO", "driver", "v1.2.0"),
            "https://ghe.local/api/v3/repos/NubeIO/driver/releases/tags/v1.2.0"
        );
    }

    #[test]
    fn test_request_params() {
        let params = Params::mapping([
            ("owner", Params::scalar("o")),
            ("repo", Params::scalar("r")),
            ("tag", Params::scalar("v1")),
            ("arch", Params::scalar("amd64")),
            ("location", Params::scalar("/tmp/dl")),
            ("unzip", Params::Bool(true)),
        ]);
        let req = DownloadRequest::from_params(&params).unwrap();
        assert_eq!(req.location, PathBuf::from("/tmp/dl"));
        assert_eq!(req.unzip, Some(PathBuf::from("/tmp/dl")));
        assert_eq!(req.token, None);
    }

    #[test]
    fn test_missing_arch() {
        let params = Params::mapping([
            ("owner", Params::scalar("o")),
            ("repo", Params::scalar("r")),
            ("tag", Params::scalar("v1")),
        ]);
        let err = DownloadRequest::from_params(&params).unwrap_err();
        assert!(err.to_string().contains("missing 'arch'"));
    }

    #[test]
    fn test_token_header_only_when_given() {
        let cmd = GithubDownloadCommand::default();
        let anon = cmd.get("https://x/a", None).build().unwrap();
        assert!(anon.headers().get(AUTHORIZATION).is_none());
        assert!(anon.headers()[USER_AGENT].to_str().unwrap().starts_with("buildstep/"));

        let authed = cmd.get("https://x/a", Some("abc")).build().unwrap();
        assert_eq!(authed.headers()[AUTHORIZATION], "token abc");
    }
}
