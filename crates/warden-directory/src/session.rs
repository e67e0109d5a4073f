//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Upstream directory contract and adapters."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use tracing::{error, info, warn};

use crate::{DirectoryClient, DirectoryError, Endpoint};

/// Wraps a [`DirectoryClient`] with the expired-authorization recovery rules.
///
/// An expired credential is refreshed once and the fetch retried once. When
/// either step fails the cycle yields no data and the next fetch first
/// re-authenticates. Every other failure yields no data without a retry.
pub struct DirectorySession {
    client: Box<dyn DirectoryClient>,
    reauth_required: bool,
}

impl std::fmt::Debug for DirectorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySession")
            .field("reauth_required", &self.reauth_required)
            .finish_non_exhaustive()
    }
}

impl DirectorySession {
    /// Wrap a client.
    pub fn new(client: Box<dyn DirectoryClient>) -> Self {
        Self {
            client,
            reauth_required: false,
        }
    }

    /// Whether the next fetch will re-authenticate first.
    pub fn reauth_required(&self) -> bool {
        self.reauth_required
    }

    /// Fetch the endpoint listing. Failures are logged and yield an empty list.
    pub async fn fetch_endpoints(&mut self) -> Vec<Endpoint> {
        if self.reauth_required {
            info!("re-authenticating before directory fetch");
            if let Err(err) = self.client.reauthenticate().await {
                error!(error = %err, "re-authentication failed");
                return Vec::new();
            }
            self.reauth_required = false;
        }

        match self.client.fetch().await {
            Ok(endpoints) => endpoints,
            Err(DirectoryError::AuthExpired) => {
                info!("authorization expired; refreshing session");
                self.refresh_and_retry().await
            }
            Err(DirectoryError::ServiceUnavailable) => {
                warn!("directory service unavailable");
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "directory fetch failed");
                Vec::new()
            }
        }
    }

    async fn refresh_and_retry(&mut self) -> Vec<Endpoint> {
        if let Err(err) = self.client.refresh_credential().await {
            error!(error = %err, "failed to refresh session");
            self.reauth_required = true;
            return Vec::new();
        }
        if let Err(err) = self.client.persist_credential().await {
            warn!(error = %err, "failed to persist refreshed session");
        }
        info!("session refreshed; retrying directory fetch");
        match self.client.fetch().await {
            Ok(endpoints) => endpoints,
            Err(err) => {
                error!(error = %err, "directory fetch failed after refresh");
                self.reauth_required = true;
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::Result;

    #[derive(Default)]
    struct Script {
        fetches: VecDeque<Result<Vec<Endpoint>>>,
        refresh_ok: bool,
        calls: Vec<&'static str>,
    }

    struct ScriptedClient(Arc<Mutex<Script>>);

    #[async_trait]
    impl DirectoryClient for ScriptedClient {
        async fn fetch(&mut self) -> Result<Vec<Endpoint>> {
            let mut script = self.0.lock();
            script.calls.push("fetch");
            script.fetches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn refresh_credential(&mut self) -> Result<()> {
            let mut script = self.0.lock();
            script.calls.push("refresh");
            if script.refresh_ok {
                Ok(())
            } else {
                Err(DirectoryError::other(400, "refresh rejected"))
            }
        }

        async fn persist_credential(&self) -> Result<()> {
            self.0.lock().calls.push("persist");
            Ok(())
        }

        async fn reauthenticate(&mut self) -> Result<()> {
            self.0.lock().calls.push("reauth");
            Ok(())
        }
    }

    fn session(script: Script) -> (DirectorySession, Arc<Mutex<Script>>) {
        let shared = Arc::new(Mutex::new(script));
        (
            DirectorySession::new(Box::new(ScriptedClient(shared.clone()))),
            shared,
        )
    }

    fn listing() -> Vec<Endpoint> {
        vec![Endpoint::new("US-CA#1", "US", "San Jose", 10)]
    }

    #[tokio::test]
    async fn expired_auth_refreshes_and_retries_once() {
        let (mut session, script) = session(Script {
            fetches: VecDeque::from([Err(DirectoryError::AuthExpired), Ok(listing())]),
            refresh_ok: true,
            ..Script::default()
        });

        assert_eq!(session.fetch_endpoints().await, listing());
        assert_eq!(
            script.lock().calls,
            vec!["fetch", "refresh", "persist", "fetch"]
        );
        assert!(!session.reauth_required());
    }

    #[tokio::test]
    async fn failed_refresh_forces_reauth_on_next_fetch() {
        let (mut session, script) = session(Script {
            fetches: VecDeque::from([Err(DirectoryError::AuthExpired), Ok(listing())]),
            refresh_ok: false,
            ..Script::default()
        });

        assert!(session.fetch_endpoints().await.is_empty());
        assert!(session.reauth_required());

        assert_eq!(session.fetch_endpoints().await, listing());
        assert_eq!(
            script.lock().calls,
            vec!["fetch", "refresh", "reauth", "fetch"]
        );
        assert!(!session.reauth_required());
    }

    #[tokio::test]
    async fn failed_retry_yields_empty_and_requires_reauth() {
        let (mut session, script) = session(Script {
            fetches: VecDeque::from([
                Err(DirectoryError::AuthExpired),
                Err(DirectoryError::AuthExpired),
            ]),
            refresh_ok: true,
            ..Script::default()
        });

        assert!(session.fetch_endpoints().await.is_empty());
        assert!(session.reauth_required());
        assert_eq!(script.lock().calls.iter().filter(|c| **c == "fetch").count(), 2);
    }

    #[tokio::test]
    async fn unavailable_and_other_errors_do_not_retry() {
        let (mut session, script) = session(Script {
            fetches: VecDeque::from([
                Err(DirectoryError::ServiceUnavailable),
                Err(DirectoryError::other(500, "boom")),
            ]),
            refresh_ok: true,
            ..Script::default()
        });

        assert!(session.fetch_endpoints().await.is_empty());
        assert!(session.fetch_endpoints().await.is_empty());
        assert_eq!(script.lock().calls, vec!["fetch", "fetch"]);
        assert!(!session.reauth_required());
    }
}
