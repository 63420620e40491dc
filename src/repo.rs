//! Content Store access: fetching the catalog and stage images from a GitHub repository.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use futures::join;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;

use crate::content::{
    ContentCatalog, parse_images, parse_stages, parse_tags, validate_structure,
};
use crate::error::{DataLoadError, FetchError, ImageFetchError};
use crate::settings::Settings;

const GITHUB_RAW: &str = "application/vnd.github.v3.raw";
const DEFAULT_IMAGE_TYPE: &str = "image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredFile {
    pub name: &'static str,
    pub path: &'static str,
}

pub const REQUIRED_FILES: [RequiredFile; 3] = [
    RequiredFile {
        name: "stages",
        path: "stages.json",
    },
    RequiredFile {
        name: "images",
        path: "images.json",
    },
    RequiredFile {
        name: "tags",
        path: "imageTags.json",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FetchedImage {
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        )
    }
}

/// Read-only access to the content repository.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_json(&self, path: &str) -> Result<Value, FetchError>;

    async fn fetch_image(&self, url: &str) -> Result<FetchedImage, FetchError>;
}

pub struct GithubSource {
    client: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl GithubSource {
    pub fn new(
        api_url: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            owner: owner.into(),
            repo: repo.into(),
            token,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.github_api_url.clone(),
            settings.repo_owner.clone(),
            settings.repo_name.clone(),
            settings.repo_token.clone(),
        )
    }

    pub fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url.trim_end_matches('/'),
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, GITHUB_RAW)
            .header(USER_AGENT, env!("CARGO_PKG_NAME"));
        match &self.token {
            Some(token) if !token.is_empty() => {
                request.header(AUTHORIZATION, format!("token {token}"))
            }
            _ => request,
        }
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl ContentSource for GithubSource {
    async fn fetch_json(&self, path: &str) -> Result<Value, FetchError> {
        log::debug!("[Fetch] Requesting {path} from GitHub API");
        let text = self.send(&self.contents_url(path)).await?.text().await?;
        serde_json::from_str(&text).map_err(|source| {
            log::error!("[Fetch] JSON Parse Error in {path}: {text}");
            FetchError::Json {
                path: path.to_string(),
                source,
            }
        })
    }

    async fn fetch_image(&self, url: &str) -> Result<FetchedImage, FetchError> {
        log::debug!("[Fetch] Requesting image {url}");
        let response = self.send(url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| value.starts_with("image/"))
            .unwrap_or(DEFAULT_IMAGE_TYPE)
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        Ok(FetchedImage {
            content_type,
            bytes,
        })
    }
}

pub fn resource_path(base_path: &str, file: &str) -> String {
    let base = base_path.trim_matches('/');
    if base.is_empty() {
        file.to_string()
    } else {
        format!("{base}/{file}")
    }
}

async fn fetch_validated(
    source: &dyn ContentSource,
    base_path: &str,
    file: &RequiredFile,
) -> Result<Value, DataLoadError> {
    log::debug!("[Custom Data] Starting fetch for {}...", file.name);
    let data = source
        .fetch_json(&resource_path(base_path, file.path))
        .await
        .map_err(|source| DataLoadError::Fetch {
            resource: file.name.to_string(),
            source,
        })?;

    if !validate_structure(&data) {
        return Err(DataLoadError::InvalidStructure(file.name.to_string()));
    }
    log::info!("[Custom Data] Successfully loaded {} data", file.name);
    Ok(data)
}

/// Fetches the three catalog resources concurrently. All-or-nothing: the error carries
/// the cause for every resource that failed to fetch, validate or parse.
pub async fn load_catalog(
    source: &dyn ContentSource,
    base_path: &str,
) -> Result<ContentCatalog, DataLoadError> {
    let [stages_file, images_file, tags_file] = &REQUIRED_FILES;
    let (stages, images, tags) = join!(
        fetch_validated(source, base_path, stages_file),
        fetch_validated(source, base_path, images_file),
        fetch_validated(source, base_path, tags_file),
    );

    let stages = stages.and_then(parse_stages);
    let images = images.and_then(parse_images);
    let tags = tags.and_then(parse_tags);

    match (stages, images, tags) {
        (Ok(stages), Ok(images), Ok(tags)) => Ok(ContentCatalog {
            stages,
            images,
            tags,
        }),
        (stages, images, tags) => {
            let failures: Vec<DataLoadError> = [stages.err(), images.err(), tags.err()]
                .into_iter()
                .flatten()
                .inspect(|error| log::error!("[Custom Data] {error}"))
                .collect();
            Err(DataLoadError::Failed(failures))
        }
    }
}

pub async fn fetch_image_data(
    source: &dyn ContentSource,
    url: &str,
) -> Result<String, ImageFetchError> {
    Ok(source.fetch_image(url).await?.to_data_uri())
}

/// GitHub-hosted references become data URIs; anything else, or a failed fetch, keeps
/// the original reference.
pub async fn resolve_image_reference(source: &dyn ContentSource, url: &str) -> String {
    if !url.contains("github.com") {
        return url.to_string();
    }
    match fetch_image_data(source, url).await {
        Ok(data_uri) => data_uri,
        Err(e) => {
            log::error!("[Github fetching] Error: {e}");
            url.to_string()
        }
    }
}
