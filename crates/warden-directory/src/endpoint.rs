//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Upstream directory contract and adapters."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Availability state published by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    /// Accepting connections.
    Active,
    /// Offline.
    Inactive,
    /// Any other published state.
    Maintenance,
}

impl EndpointStatus {
    /// Map the directory's numeric status code.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => EndpointStatus::Active,
            0 => EndpointStatus::Inactive,
            _ => EndpointStatus::Maintenance,
        }
    }
}

/// Candidate network exit point, as returned by one directory poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Unique endpoint name.
    pub name: String,
    /// Entry country code.
    pub country: String,
    /// City the endpoint is located in.
    pub city: String,
    /// Published availability.
    pub status: EndpointStatus,
    /// Load in percent, 0–100.
    pub load: u8,
    /// Address the tunnel connects to.
    pub entry_address: String,
    /// Public key of the entry server, when published.
    pub connection_key: Option<String>,
    /// Port the tunnel connects to.
    pub port: u16,
}

impl Endpoint {
    /// Construct an active endpoint with the default port and no connection details.
    pub fn new(
        name: impl Into<String>,
        country: impl Into<String>,
        city: impl Into<String>,
        load: u8,
    ) -> Self {
        Self {
            name: name.into(),
            country: country.into(),
            city: city.into(),
            status: EndpointStatus::Active,
            load: load.min(100),
            entry_address: String::new(),
            connection_key: None,
            port: LogicalServer::DEFAULT_PORT,
        }
    }

    /// Override the published status.
    pub fn with_status(mut self, status: EndpointStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach entry address and connection key.
    pub fn with_connection(
        mut self,
        entry_address: impl Into<String>,
        connection_key: impl Into<String>,
    ) -> Self {
        self.entry_address = entry_address.into();
        self.connection_key = Some(connection_key.into());
        self
    }

    /// Whether the endpoint currently accepts connections.
    pub fn is_active(&self) -> bool {
        self.status == EndpointStatus::Active
    }
}

/// Wire representation of the directory listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogicalServersResponse {
    /// Upstream status code embedded in the payload.
    #[serde(rename = "Code", default)]
    pub code: Option<i64>,
    /// Listed logical servers.
    #[serde(rename = "LogicalServers", default)]
    pub logical_servers: Vec<LogicalServer>,
}

impl LogicalServersResponse {
    /// Convert the listing into endpoints, keeping the directory's order.
    pub fn into_endpoints(self, port: u16) -> Vec<Endpoint> {
        self.logical_servers
            .into_iter()
            .map(|server| server.into_endpoint(port))
            .collect()
    }
}

/// A logical server entry of the directory listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogicalServer {
    /// Logical server name.
    #[serde(rename = "Name", default)]
    pub name: String,
    /// Entry country code.
    #[serde(rename = "EntryCountry", default)]
    pub entry_country: String,
    /// City, when published.
    #[serde(rename = "City", default)]
    pub city: Option<String>,
    /// Numeric status, `1` meaning active.
    #[serde(rename = "Status", default)]
    pub status: i64,
    /// Load in percent.
    #[serde(rename = "Load", default)]
    pub load: Option<i64>,
    /// Physical servers backing this logical server.
    #[serde(rename = "Servers", default)]
    pub servers: Vec<PhysicalServer>,
}

/// A physical server behind a logical server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhysicalServer {
    /// Address clients connect to.
    #[serde(rename = "EntryIP", default)]
    pub entry_ip: String,
    /// WireGuard public key.
    #[serde(rename = "X25519PublicKey", default)]
    pub x25519_public_key: Option<String>,
}

impl LogicalServer {
    /// Standard WireGuard port; the directory does not publish one.
    pub const DEFAULT_PORT: u16 = 51820;

    /// Convert into an [`Endpoint`]. A missing load counts as fully loaded.
    pub fn into_endpoint(self, port: u16) -> Endpoint {
        let keyed = self
            .servers
            .iter()
            .find(|server| {
                server
                    .x25519_public_key
                    .as_deref()
                    .is_some_and(|key| !key.is_empty())
            })
            .or_else(|| self.servers.first());
        let (entry_address, connection_key) = match keyed {
            Some(server) => (
                server.entry_ip.clone(),
                server
                    .x25519_public_key
                    .clone()
                    .filter(|key| !key.is_empty()),
            ),
            None => (String::new(), None),
        };
        Endpoint {
            name: self.name,
            country: self.entry_country,
            city: self.city.unwrap_or_default(),
            status: EndpointStatus::from_code(self.status),
            load: self.load.unwrap_or(100).clamp(0, 100) as u8,
            entry_address,
            connection_key,
            port,
        }
    }
}
