use std::path::{Component, Path};
use std::time::Duration;

use crate::error::prelude::ApiError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};

pub const GITHUB_API: &str = "https://api.github.com/";
pub const DEFAULT_REPO_NAME: &str = "gemini-voice-companion";
const REPO_DESCRIPTION: &str = "Gemini Voice Companion - AI Assistant";

/// One named text file of a repository snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
}

impl RepoFile {
    /// Read `path` from disk. Its repository path is taken relative to the
    /// current directory.
    pub fn read(path: &Path) -> Result<Self, ApiError> {
        let base = std::env::current_dir().map_err(|e| ApiError::ReadFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::read_relative_to(path, &base)
    }

    fn read_relative_to(path: &Path, base: &Path) -> Result<Self, ApiError> {
        let repo_path = repo_path(path, base)?;
        let content = std::fs::read_to_string(base.join(path)).map_err(|e| ApiError::ReadFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            path: repo_path,
            content,
        })
    }
}

/// Slash-separated path of `path` below `base`. Anything that would land
/// outside `base` is refused.
fn repo_path(path: &Path, base: &Path) -> Result<String, ApiError> {
    let outside = || ApiError::OutsideWorkingDir(path.display().to_string());
    let relative = if path.is_absolute() {
        path.strip_prefix(base).map_err(|_| outside())?
    } else {
        path
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(outside());
            }
        }
    }
    if parts.is_empty() {
        return Err(outside());
    }
    Ok(parts.join("/"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentInfo {
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    auto_init: bool,
}

#[derive(Debug, Serialize)]
struct PutContentRequest {
    message: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    message: Option<String>,
}

/// Pushes snapshots of text files to a GitHub repository over the REST API.
#[derive(Clone)]
pub struct GitHubClient {
    base: Url,
    http: reqwest::Client,
    token: String,
    owner: Option<String>,
}

impl GitHubClient {
    pub fn new(token: &str) -> Result<Self, ApiError> {
        Self::with_base_url(GITHUB_API, token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, ApiError> {
        if token.trim().is_empty() {
            return Err(ApiError::MissingInput("GitHub token"));
        }
        let base = Url::parse(base_url).map_err(|e| ApiError::Url(e.to_string()))?;
        Ok(Self {
            base,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent(concat!("live-voice/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| ApiError::Http(e.to_string()))?,
            token: token.trim().to_string(),
            owner: None,
        })
    }

    fn url(&self, endpoint: &str) -> Result<Url, ApiError> {
        self.base
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| ApiError::Url(e.to_string()))
    }

    fn prepare_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = req.send().await.map_err(|e| ApiError::Http(e.to_string()))?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Remote(error_message(status, &body)))
    }

    pub async fn authenticated_user(&mut self) -> Result<String, ApiError> {
        if let Some(owner) = &self.owner {
            return Ok(owner.clone());
        }
        let url = self.url("user")?;
        let user = self
            .send(self.prepare_request(Method::GET, url))
            .await?
            .json::<GitHubUser>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        self.owner = Some(user.login.clone());
        Ok(user.login)
    }

    /// Create the repository if it doesn't exist. Returns true if it already
    /// existed.
    pub async fn ensure_repo_exists(&mut self, repo: &str) -> Result<bool, ApiError> {
        if repo.trim().is_empty() {
            return Err(ApiError::MissingInput("repository name"));
        }
        let owner = self.authenticated_user().await?;

        let url = self.url(&format!("repos/{owner}/{repo}"))?;
        if self.send(self.prepare_request(Method::GET, url)).await.is_ok() {
            return Ok(true);
        }

        let url = self.url("user/repos")?;
        let body = CreateRepoRequest {
            name: repo,
            description: REPO_DESCRIPTION,
            private: false,
            auto_init: true,
        };
        self.send(self.prepare_request(Method::POST, url).json(&body))
            .await?;
        tracing::info!(repo = %format!("{owner}/{repo}"), "created repository");
        Ok(false)
    }

    /// Create or update each file in turn.
    pub async fn push_files(&mut self, repo: &str, files: &[RepoFile]) -> Result<(), ApiError> {
        let owner = self.authenticated_user().await?;

        for file in files {
            let url = self.url(&format!("repos/{owner}/{repo}/contents/{}", file.path))?;

            // Existing files need their sha to be updated
            let sha = match self.send(self.prepare_request(Method::GET, url.clone())).await {
                Ok(resp) => resp.json::<ContentInfo>().await.ok().map(|info| info.sha),
                Err(_) => None,
            };

            let body = put_content_request(file, sha);
            self.send(self.prepare_request(Method::PUT, url).json(&body))
                .await?;
            tracing::debug!(path = %file.path, "file pushed");
        }
        Ok(())
    }
}

fn put_content_request(file: &RepoFile, sha: Option<String>) -> PutContentRequest {
    PutContentRequest {
        message: format!("Sync {} from Gemini Voice Companion", file.path),
        content: BASE64.encode(file.content.as_bytes()),
        sha,
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<GitHubErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("GitHub API error: {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_empty_token_when_client_created_then_missing_input() {
        assert!(matches!(
            GitHubClient::new("  "),
            Err(ApiError::MissingInput("GitHub token"))
        ));
    }

    #[test]
    fn given_endpoint_when_joined_then_relative_to_api_root() {
        let client = GitHubClient::with_base_url("https://example.test/api/", "t").unwrap();

        let url = client.url("/repos/me/demo/contents/src/main.rs").unwrap();

        assert_eq!(
            url.as_str(),
            "https://example.test/api/repos/me/demo/contents/src/main.rs"
        );
    }

    #[test]
    fn given_new_file_when_body_built_then_no_sha_and_base64_content() {
        // Given
        let file = RepoFile {
            path: "README.md".to_string(),
            content: "héllo".to_string(),
        };

        // When
        let body = serde_json::to_value(put_content_request(&file, None)).unwrap();

        // Then
        assert_eq!(body["message"], "Sync README.md from Gemini Voice Companion");
        assert_eq!(body["content"], BASE64.encode("héllo".as_bytes()));
        assert!(body.get("sha").is_none());
    }

    #[test]
    fn given_existing_file_when_body_built_then_sha_included() {
        let file = RepoFile {
            path: "a.txt".to_string(),
            content: String::new(),
        };

        let request = put_content_request(&file, Some("abc".to_string()));
        let body = serde_json::to_value(request).unwrap();

        assert_eq!(body["sha"], "abc");
    }

    #[test]
    fn given_error_body_when_mapped_then_api_message_used() {
        assert_eq!(
            error_message(StatusCode::CONFLICT, r#"{"message":"Secret detected"}"#),
            "Secret detected"
        );
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, "<html>"),
            "GitHub API error: 404"
        );
    }

    #[test]
    fn given_relative_path_when_mapped_then_repo_path_uses_slashes() {
        let base = Path::new("/work");

        assert_eq!(
            repo_path(Path::new("./src/audio/mod.rs"), base).unwrap(),
            "src/audio/mod.rs"
        );
    }

    #[test]
    fn given_absolute_path_inside_base_when_mapped_then_base_stripped() {
        let base = Path::new("/tmp/x");

        let path = repo_path(Path::new("/tmp/x/notes/today.txt"), base).unwrap();

        assert_eq!(path, "notes/today.txt");
    }

    #[test]
    fn given_path_leaving_base_when_mapped_then_refused() {
        let base = Path::new("/tmp/x");

        assert!(matches!(
            repo_path(Path::new("/tmp/y/notes.txt"), base),
            Err(ApiError::OutsideWorkingDir(_))
        ));
        assert!(matches!(
            repo_path(Path::new("../secret.txt"), base),
            Err(ApiError::OutsideWorkingDir(_))
        ));
        assert!(matches!(
            repo_path(Path::new("."), base),
            Err(ApiError::OutsideWorkingDir(_))
        ));
    }

    #[test]
    fn given_file_on_disk_when_read_then_content_loaded() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/notes.txt"), "hello").unwrap();

        // When
        let file = RepoFile::read_relative_to(Path::new("docs/notes.txt"), dir.path()).unwrap();

        // Then
        assert_eq!(file.content, "hello");
        assert_eq!(file.path, "docs/notes.txt");
    }
}
