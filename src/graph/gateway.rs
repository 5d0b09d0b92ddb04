//! Microsoft Graph drive gateway
//!
//! Implements the paged children listing, per-item permission lookup and
//! content download used by the browser engine. Everything goes through the
//! [`ListingGateway`] trait so the engine and sweep can run against an
//! in-memory gateway in tests.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::RequestBuilder;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::http_retry::send_with_retry;
use super::types::{DriveError, Entry, GraphConfig, ListingPage, PermissionGrant, ROOT_FOLDER_ID};
use crate::session::Session;

/// Remote listing gateway seam.
///
/// One page per `list_children` call; the engine owns the continuation
/// cursor and decides when to ask for more.
#[async_trait]
pub trait ListingGateway: Send + Sync {
    /// List one page of a folder's children. `cursor` is the opaque
    /// continuation token from the previous page, or `None` for the first
    /// page of a folder.
    async fn list_children(
        &self,
        folder_id: &str,
        cursor: Option<&str>,
    ) -> Result<ListingPage, DriveError>;

    /// Fetch the sharing grants known for one item, in service order.
    async fn item_permissions(&self, item_id: &str) -> Result<Vec<PermissionGrant>, DriveError>;

    /// Stream an item's content into `dest`; returns the byte count.
    async fn download(
        &self,
        item_id: &str,
        dest: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, DriveError>;
}

// ---------------------------------------------------------------------------
// Graph DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: Option<String>,
    #[serde(default)]
    folder: Option<FolderFacet>,
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FolderFacet {
    #[allow(dead_code)]
    child_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

impl From<DriveItem> for Entry {
    fn from(item: DriveItem) -> Self {
        Entry {
            is_folder: item.folder.is_some(),
            name: item.name.unwrap_or_else(|| item.id.clone()),
            id: item.id,
            download_url: item.download_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionDto {
    granted_to: Option<GrantedTo>,
    invitation: Option<Invitation>,
    link: Option<SharingLink>,
}

#[derive(Debug, Deserialize)]
struct GrantedTo {
    user: Option<GrantedUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantedUser {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Invitation {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharingLink {
    web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PermissionsResponse {
    value: Vec<PermissionDto>,
}

/// Map one raw permission to a grant descriptor.
///
/// A permission with no grantee but a sharing link is an anonymous link;
/// everything else is treated as a named grant, even when the identity
/// fields are partially missing.
fn to_grant(dto: PermissionDto) -> PermissionGrant {
    let web_url = dto.link.and_then(|l| l.web_url);
    if dto.granted_to.is_none() {
        if let Some(web_url) = web_url {
            return PermissionGrant::AnonymousLink { web_url };
        }
    }
    PermissionGrant::Named {
        display_name: dto
            .granted_to
            .and_then(|g| g.user)
            .and_then(|u| u.display_name),
        email: dto.invitation.and_then(|i| i.email),
    }
}

// ---------------------------------------------------------------------------
// GraphGateway
// ---------------------------------------------------------------------------

/// Concrete gateway over the Graph `/me/drive` endpoints.
pub struct GraphGateway {
    client: reqwest::Client,
    session: Session,
    config: GraphConfig,
}

impl GraphGateway {
    pub fn new(session: Session, config: GraphConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            session,
            config,
        }
    }

    /// URL of an item; the root sentinel has its own endpoint.
    fn item_url(&self, item_id: &str) -> String {
        if item_id == ROOT_FOLDER_ID {
            format!("{}/me/drive/root", self.config.api_base)
        } else {
            format!(
                "{}/me/drive/items/{}",
                self.config.api_base,
                urlencoding::encode(item_id)
            )
        }
    }

    /// First-page children URL with the configured page-size hint.
    fn children_url(&self, folder_id: &str) -> String {
        format!(
            "{}/children?$top={}",
            self.item_url(folder_id),
            self.config.page_size
        )
    }

    /// Build a GET with the current bearer token. Called once per retry
    /// attempt so a refreshed token is picked up mid-backoff.
    fn get(&self, url: &str) -> RequestBuilder {
        let mut req = self.client.get(url).header(ACCEPT, "application/json");
        if let Some(token) = self.session.token() {
            req = req.bearer_auth(token.expose_secret());
        }
        req
    }

    async fn send(&self, url: &str, what: &str) -> Result<reqwest::Response, DriveError> {
        if self.session.token().is_none() {
            return Err(DriveError::NoCredential);
        }

        let response = send_with_retry(|| self.get(url), &self.config.retry)
            .await
            .map_err(|e| DriveError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 401 {
            return Err(DriveError::AuthRejected);
        }
        if status.as_u16() == 404 {
            return Err(DriveError::NotFound(what.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        Err(DriveError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ListingGateway for GraphGateway {
    async fn list_children(
        &self,
        folder_id: &str,
        cursor: Option<&str>,
    ) -> Result<ListingPage, DriveError> {
        // The continuation token is a complete URL; use it verbatim.
        let url = match cursor {
            Some(link) => link.to_string(),
            None => self.children_url(folder_id),
        };

        let payload: ChildrenResponse = self
            .send(&url, folder_id)
            .await?
            .json()
            .await
            .map_err(|e| DriveError::Parse(e.to_string()))?;

        debug!(
            "listed {} children of {} (more: {})",
            payload.value.len(),
            folder_id,
            payload.next_link.is_some()
        );

        Ok(ListingPage {
            entries: payload.value.into_iter().map(Entry::from).collect(),
            next: payload.next_link,
        })
    }

    async fn item_permissions(&self, item_id: &str) -> Result<Vec<PermissionGrant>, DriveError> {
        let url = format!("{}/permissions", self.item_url(item_id));

        let payload: PermissionsResponse = self
            .send(&url, item_id)
            .await?
            .json()
            .await
            .map_err(|e| DriveError::Parse(e.to_string()))?;

        Ok(payload.value.into_iter().map(to_grant).collect())
    }

    async fn download(
        &self,
        item_id: &str,
        dest: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, DriveError> {
        let url = format!("{}/content", self.item_url(item_id));
        let response = self.send(&url, item_id).await?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DriveError::Network(e.to_string()))?;
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;

        debug!("downloaded {} bytes of {}", written, item_id);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> GraphGateway {
        let (_handle, session) = Session::with_token("test-token");
        GraphGateway::new(session, GraphConfig::default())
    }

    #[test]
    fn test_children_url_root_and_item() {
        let gw = gateway();
        assert_eq!(
            gw.children_url(ROOT_FOLDER_ID),
            "https://graph.microsoft.com/v1.0/me/drive/root/children?$top=20"
        );
        assert_eq!(
            gw.children_url("01ABCDEF"),
            "https://graph.microsoft.com/v1.0/me/drive/items/01ABCDEF/children?$top=20"
        );
    }

    #[test]
    fn test_item_id_is_percent_encoded() {
        let gw = gateway();
        assert_eq!(
            gw.item_url("a b/c"),
            "https://graph.microsoft.com/v1.0/me/drive/items/a%20b%2Fc"
        );
    }

    #[test]
    fn test_children_response_parses_next_link() {
        let json = r#"{
            "value": [
                {"id": "1", "name": "Reports", "folder": {"childCount": 3}},
                {"id": "2", "name": "notes.txt",
                 "@microsoft.graph.downloadUrl": "https://dl.example/notes"}
            ],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/next?$skiptoken=abc"
        }"#;
        let payload: ChildrenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(payload.value.len(), 2);
        assert_eq!(
            payload.next_link.as_deref(),
            Some("https://graph.microsoft.com/v1.0/next?$skiptoken=abc")
        );

        let entries: Vec<Entry> = payload.value.into_iter().map(Entry::from).collect();
        assert!(entries[0].is_folder);
        assert_eq!(entries[0].name, "Reports");
        assert!(!entries[1].is_folder);
        assert_eq!(entries[1].download_url.as_deref(), Some("https://dl.example/notes"));
    }

    #[test]
    fn test_children_response_without_next_link() {
        let json = r#"{"value": []}"#;
        let payload: ChildrenResponse = serde_json::from_str(json).unwrap();
        assert!(payload.value.is_empty());
        assert!(payload.next_link.is_none());
    }

    #[test]
    fn test_link_only_permission_is_anonymous_grant() {
        // No grantedTo, but a sharing link: exactly one anonymous-link grant.
        let json = r#"{"value": [{"link": {"webUrl": "https://1drv.ms/doc1"}}]}"#;
        let payload: PermissionsResponse = serde_json::from_str(json).unwrap();
        let grants: Vec<PermissionGrant> = payload.value.into_iter().map(to_grant).collect();
        assert_eq!(
            grants,
            vec![PermissionGrant::AnonymousLink {
                web_url: "https://1drv.ms/doc1".to_string()
            }]
        );
    }

    #[test]
    fn test_named_permission_grant() {
        let json = r#"{"value": [{
            "grantedTo": {"user": {"displayName": "Ada Lovelace"}},
            "invitation": {"email": "ada@example.com"}
        }]}"#;
        let payload: PermissionsResponse = serde_json::from_str(json).unwrap();
        let grants: Vec<PermissionGrant> = payload.value.into_iter().map(to_grant).collect();
        assert_eq!(
            grants,
            vec![PermissionGrant::Named {
                display_name: Some("Ada Lovelace".to_string()),
                email: Some("ada@example.com".to_string()),
            }]
        );
    }

    #[test]
    fn test_grantee_with_link_is_named_not_anonymous() {
        // A grant that has both an identity and a link stays a named grant.
        let json = r#"{"value": [{
            "grantedTo": {"user": {"displayName": "Ada Lovelace"}},
            "link": {"webUrl": "https://1drv.ms/doc1"}
        }]}"#;
        let payload: PermissionsResponse = serde_json::from_str(json).unwrap();
        let grants: Vec<PermissionGrant> = payload.value.into_iter().map(to_grant).collect();
        assert!(matches!(grants[0], PermissionGrant::Named { .. }));
    }
}
