//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Upstream directory contract and adapters."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_common::{DirectoryConfig, IdentityConfig};

use crate::{
    DirectoryClient, DirectoryError, Endpoint, LogicalServersResponse, Result, SessionCredentials,
};

const LOGICALS_PATH: &str = "/vpn/logicals";
const REFRESH_PATH: &str = "/auth/refresh";

/// Directory client speaking the upstream REST API over `reqwest`.
///
/// The session is produced by an external login step and read from
/// `identity.session_file`; this client only refreshes and persists it.
pub struct HttpDirectoryClient {
    http: Client,
    api_url: String,
    app_version: String,
    session_file: PathBuf,
    credentials: SessionCredentials,
    endpoint_port: u16,
}

impl std::fmt::Debug for HttpDirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDirectoryClient")
            .field("api_url", &self.api_url)
            .field("session_file", &self.session_file)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "ResponseType")]
    response_type: &'a str,
    #[serde(rename = "GrantType")]
    grant_type: &'a str,
    #[serde(rename = "RefreshToken")]
    refresh_token: &'a str,
    #[serde(rename = "RedirectURI")]
    redirect_uri: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(rename = "AccessToken")]
    access_token: String,
    #[serde(rename = "RefreshToken")]
    refresh_token: String,
    #[serde(rename = "UID", default)]
    uid: Option<String>,
}

impl HttpDirectoryClient {
    /// Build a client from configuration, loading the session file.
    ///
    /// Fails with [`DirectoryError::MissingCredentials`] when no session exists.
    pub fn from_config(
        directory: &DirectoryConfig,
        identity: &IdentityConfig,
        endpoint_port: u16,
    ) -> Result<Self> {
        let credentials = SessionCredentials::load(&identity.session_file)?;
        let http = Client::builder()
            .timeout(directory.request_timeout)
            .build()
            .map_err(transport_error)?;
        info!(
            session_file = %identity.session_file.display(),
            user = identity.username.as_deref().unwrap_or("unknown"),
            "directory session loaded"
        );
        Ok(Self {
            http,
            api_url: directory.api_url.trim_end_matches('/').to_owned(),
            app_version: directory.app_version.clone(),
            session_file: identity.session_file.clone(),
            credentials,
            endpoint_port,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.credentials.access_token)
            .header("x-pm-uid", &self.credentials.uid)
            .header("x-pm-appversion", &self.app_version)
    }
}

fn transport_error(err: reqwest::Error) -> DirectoryError {
    DirectoryError::other(0, err.to_string())
}

/// Map a non-success response onto the tagged error kinds.
async fn status_error(response: Response) -> DirectoryError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => DirectoryError::AuthExpired,
        StatusCode::SERVICE_UNAVAILABLE => DirectoryError::ServiceUnavailable,
        other => {
            let body = response.text().await.unwrap_or_default();
            DirectoryError::other(other.as_u16(), body.trim().to_owned())
        }
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn fetch(&mut self) -> Result<Vec<Endpoint>> {
        let response = self
            .authorized(self.http.get(self.url(LOGICALS_PATH)))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let listing: LogicalServersResponse = response.json().await.map_err(transport_error)?;
        debug!(count = listing.logical_servers.len(), "directory listing received");
        Ok(listing.into_endpoints(self.endpoint_port))
    }

    async fn refresh_credential(&mut self) -> Result<()> {
        let body = RefreshRequest {
            response_type: "token",
            grant_type: "refresh_token",
            refresh_token: &self.credentials.refresh_token,
            redirect_uri: "https://protonmail.ch",
        };
        let response = self
            .authorized(self.http.post(self.url(REFRESH_PATH)))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let refreshed: RefreshResponse = response.json().await.map_err(transport_error)?;
        self.credentials.access_token = refreshed.access_token;
        self.credentials.refresh_token = refreshed.refresh_token;
        if let Some(uid) = refreshed.uid.filter(|uid| !uid.is_empty()) {
            self.credentials.uid = uid;
        }
        Ok(())
    }

    async fn persist_credential(&self) -> Result<()> {
        self.credentials.save(&self.session_file)?;
        debug!(session_file = %self.session_file.display(), "session saved");
        Ok(())
    }

    /// Reload the session written by the external login step.
    ///
    /// Unchanged tokens are kept and logged at `warn`; if they stay rejected
    /// only a new login can recover the session.
    async fn reauthenticate(&mut self) -> Result<()> {
        let reloaded = match SessionCredentials::load(&self.session_file) {
            Ok(reloaded) => reloaded,
            Err(err) => {
                warn!(
                    session_file = %self.session_file.display(),
                    error = %err,
                    "session file unusable; an external login is required"
                );
                return Err(err);
            }
        };
        if reloaded == self.credentials {
            warn!(
                session_file = %self.session_file.display(),
                "session file unchanged since the last rejection; an external login may be required"
            );
            return Ok(());
        }
        self.credentials = reloaded;
        info!(session_file = %self.session_file.display(), "session reloaded from disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(dir: &std::path::Path) -> IdentityConfig {
        IdentityConfig {
            username: Some("tester".into()),
            session_file: dir.join("session.json"),
        }
    }

    #[test]
    fn construction_requires_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = HttpDirectoryClient::from_config(
            &DirectoryConfig::default(),
            &identity(dir.path()),
            51820,
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn reauthenticate_fails_when_session_file_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let identity = identity(dir.path());
        SessionCredentials {
            uid: "uid-1".into(),
            access_token: "a1".into(),
            refresh_token: "r1".into(),
        }
        .save(&identity.session_file)
        .unwrap();
        let mut client =
            HttpDirectoryClient::from_config(&DirectoryConfig::default(), &identity, 51820).unwrap();

        std::fs::remove_file(&identity.session_file).unwrap();
        let err = client.reauthenticate().await.unwrap_err();
        assert!(matches!(err, DirectoryError::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn reauthenticate_reloads_session_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let identity = identity(dir.path());
        let first = SessionCredentials {
            uid: "uid-1".into(),
            access_token: "a1".into(),
            refresh_token: "r1".into(),
        };
        first.save(&identity.session_file).unwrap();

        let directory = DirectoryConfig {
            api_url: "https://directory.invalid/".into(),
            ..DirectoryConfig::default()
        };
        let mut client = HttpDirectoryClient::from_config(&directory, &identity, 51820).unwrap();
        assert_eq!(client.url(LOGICALS_PATH), "https://directory.invalid/vpn/logicals");

        client.reauthenticate().await.unwrap();
        assert_eq!(client.credentials, first);

        let second = SessionCredentials {
            access_token: "a2".into(),
            ..first.clone()
        };
        second.save(&identity.session_file).unwrap();
        client.reauthenticate().await.unwrap();
        assert_eq!(client.credentials, second);
    }
}
