//! GitLab REST API (v4) access: authentication, namespace resolution and
//! paginated group listings.

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ClonerError;

/// Page size requested from list endpoints (GitLab maximum)
pub const PER_PAGE: usize = 100;

/// GitLab group (namespace) as returned by the groups endpoints
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GitLabGroup {
    pub id: u64,
    pub name: String,
    /// Group slug
    pub path: String,
    /// Full path (e.g., "parent/child")
    pub full_path: String,
}

/// GitLab project, the fields needed to clone it
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GitLabProject {
    pub id: u64,
    pub name: String,
    /// Project slug
    pub path: String,
    /// Full path including namespace (e.g., "group/subgroup/project")
    pub path_with_namespace: String,
    #[serde(default)]
    pub http_url_to_repo: Option<String>,
    #[serde(default)]
    pub ssh_url_to_repo: Option<String>,
}

/// Authenticated user
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabUser {
    pub id: u64,
    pub username: String,
}

/// The namespace listing operations the enumerator needs
#[async_trait]
pub trait NamespaceApi: Send + Sync {
    /// Verify the token and return the user it belongs to
    async fn authenticate(&self) -> Result<GitLabUser, ClonerError>;

    /// Resolve a namespace path such as `acme/platform` to its group
    async fn resolve_namespace(&self, path: &str) -> Result<GitLabGroup, ClonerError>;

    /// Direct subgroups of a group, all pages drained
    async fn list_subgroups(&self, group_id: u64) -> Result<Vec<GitLabGroup>, ClonerError>;

    /// Direct projects of a group, all pages drained
    async fn list_projects(&self, group_id: u64) -> Result<Vec<GitLabProject>, ClonerError>;
}

/// GitLab API client authenticated with a bearer token
pub struct GitLabClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl GitLabClient {
    /// Create a client for `base_url` (e.g. `https://gitlab.com`)
    pub fn new(base_url: &str, token: &str) -> Result<Self, ClonerError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClonerError::Argument(format!("invalid GitLab URL '{}': {}", base_url, e)))?;

        let http = Client::builder()
            .user_agent(concat!("gitlab-cloner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClonerError::api(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            token: token.to_string(),
        })
    }

    /// Build `<base>/api/v4/<segments...>`; each segment is percent-encoded,
    /// so a namespace path becomes a single `acme%2Fplatform` segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClonerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClonerError::api(format!("cannot use {} as API base", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v4"])
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, ClonerError> {
        debug!("GET {}", url);
        Ok(self.http.get(url).bearer_auth(&self.token).send().await?)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, ClonerError> {
        let response = self.send(url).await?;
        error_for_status(response).await
    }

    /// GET every page of a list endpoint
    async fn get_all_pages<T: DeserializeOwned + Send>(
        &self,
        segments: &[&str],
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, ClonerError> {
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut url = self.endpoint(segments)?;
            url.query_pairs_mut()
                .extend_pairs(params)
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let response = self.get(url).await?;
            let next = next_page(response.headers());
            let page_items: Vec<T> = parse_json(response).await?;
            let fetched = page_items.len();
            items.extend(page_items);

            page = match next {
                NextPage::Page(n) if n > page => n,
                NextPage::Page(n) => {
                    return Err(ClonerError::api(format!(
                        "pagination did not advance: page {} points to page {}",
                        page, n
                    )))
                }
                NextPage::Last => break,
                NextPage::Unknown if fetched == PER_PAGE => page + 1,
                NextPage::Unknown => break,
            };
        }

        Ok(items)
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ClonerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClonerError::from_status(status, &body))
}

async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClonerError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ClonerError::api(format!("malformed response: {}", e)))
}

/// What the pagination headers say about the following page
#[derive(Debug, PartialEq, Eq)]
enum NextPage {
    Page(u32),
    Last,
    Unknown,
}

/// GitLab sends `X-Next-Page`, left empty on the last page.
fn next_page(headers: &HeaderMap) -> NextPage {
    match headers.get("x-next-page").map(|v| v.to_str()) {
        None => NextPage::Unknown,
        Some(Ok(value)) if value.trim().is_empty() => NextPage::Last,
        Some(Ok(value)) => value
            .trim()
            .parse()
            .map(NextPage::Page)
            .unwrap_or(NextPage::Unknown),
        Some(Err(_)) => NextPage::Unknown,
    }
}

#[async_trait]
impl NamespaceApi for GitLabClient {
    async fn authenticate(&self) -> Result<GitLabUser, ClonerError> {
        let url = self.endpoint(&["user"])?;
        let user: GitLabUser = parse_json(self.get(url).await?).await?;
        info!("Authenticated as GitLab user: {}", user.username);
        Ok(user)
    }

    async fn resolve_namespace(&self, path: &str) -> Result<GitLabGroup, ClonerError> {
        let url = self.endpoint(&["groups", path])?;
        let response = self.send(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClonerError::NamespaceNotFound(path.to_string()));
        }

        let group: GitLabGroup = parse_json(error_for_status(response).await?).await?;
        debug!("Resolved namespace {} to group id {}", group.full_path, group.id);
        Ok(group)
    }

    async fn list_subgroups(&self, group_id: u64) -> Result<Vec<GitLabGroup>, ClonerError> {
        let id = group_id.to_string();
        self.get_all_pages(&["groups", &id, "subgroups"], &[]).await
    }

    async fn list_projects(&self, group_id: u64) -> Result<Vec<GitLabProject>, ClonerError> {
        let id = group_id.to_string();
        // Projects shared in from other namespaces live outside this tree.
        self.get_all_pages(&["groups", &id, "projects"], &[("with_shared", "false")])
            .await
    }
}
