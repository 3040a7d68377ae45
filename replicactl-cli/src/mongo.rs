//! MongoDB driver implementation of the admin seam.

use std::time::Duration;

use async_trait::async_trait;
use bson::Document;
use mongodb::Client;
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use replicactl_core::db::{
    DbError, InitiateRequest, ReconfigRequest, ReplicaSetAdmin, StatusRequest,
};
use replicactl_core::host::HostPort;
use replicactl_core::replset::{MemberState, MemberStatus, ReplicaSetConfig, ReplicaSetStatus};
use serde::Deserialize;

/// Environment variable the database password is read from.
pub const MONGO_PASSWORD_ENV: &str = "REPLICACTL_MONGO_PASSWORD";

/// Server error codes raised when a reconfig loses to a concurrent change.
const VERSION_CONFLICT_CODES: [i32; 2] = [103, 109];

/// Connection settings for [`MongoAdmin`].
#[derive(Debug, Clone)]
pub struct MongoOptions {
    /// Node to connect to.
    pub endpoint: HostPort,
    /// Username, when the deployment requires auth.
    pub username: Option<String>,
    /// Password paired with the username.
    pub password: Option<String>,
    /// Budget for connecting and selecting the server.
    pub connect_timeout: Duration,
}

/// Admin-command access to a single node over the MongoDB driver.
///
/// Connections are direct (no topology discovery): membership surgery has to
/// land on the node the operator points at, even when that node is not
/// currently reachable through the replica set topology.
pub struct MongoAdmin {
    client: Client,
}

impl MongoAdmin {
    pub fn connect(options: MongoOptions) -> Result<Self, DbError> {
        let mut client_options = ClientOptions::default();
        client_options.hosts = vec![ServerAddress::Tcp {
            host: options.endpoint.address().to_string(),
            port: Some(options.endpoint.port()),
        }];
        client_options.direct_connection = Some(true);
        client_options.connect_timeout = Some(options.connect_timeout);
        client_options.server_selection_timeout = Some(options.connect_timeout);
        client_options.app_name = Some("replicactl".to_string());
        if let Some(username) = options.username {
            let mut credential = Credential::default();
            credential.username = Some(username);
            credential.password = options.password;
            credential.source = Some("admin".to_string());
            client_options.credential = Some(credential);
        }

        let client = Client::with_options(client_options).map_err(|e| map_db_error(&e, None))?;
        Ok(Self { client })
    }

    async fn run_admin_command(
        &self,
        command: Document,
        submitted: Option<i64>,
    ) -> Result<Document, DbError> {
        self.client
            .database("admin")
            .run_command(command, None)
            .await
            .map_err(|e| map_db_error(&e, submitted))
    }
}

#[async_trait]
impl ReplicaSetAdmin for MongoAdmin {
    async fn fetch_config(&self) -> Result<ReplicaSetConfig, DbError> {
        let collection = self
            .client
            .database("local")
            .collection::<Document>("system.replset");
        let count = collection
            .count_documents(None, None)
            .await
            .map_err(|e| map_db_error(&e, None))?;
        if count != 1 {
            return Err(DbError::UnexpectedConfigShape { count });
        }
        let document = collection
            .find_one(None, None)
            .await
            .map_err(|e| map_db_error(&e, None))?
            .ok_or(DbError::UnexpectedConfigShape { count: 0 })?;
        bson::from_document(document).map_err(|e| DbError::Codec(e.to_string()))
    }

    async fn fetch_status(&self) -> Result<ReplicaSetStatus, DbError> {
        let command = bson::to_document(&StatusRequest::default())
            .map_err(|e| DbError::Codec(e.to_string()))?;
        let reply = self.run_admin_command(command, None).await?;
        decode_status(reply)
    }

    async fn apply_reconfig(&self, config: &ReplicaSetConfig) -> Result<(), DbError> {
        let command = bson::to_document(&ReconfigRequest { config })
            .map_err(|e| DbError::Codec(e.to_string()))?;
        self.run_admin_command(command, Some(config.version)).await?;
        Ok(())
    }

    async fn initiate(&self) -> Result<(), DbError> {
        let command = bson::to_document(&InitiateRequest::default())
            .map_err(|e| DbError::Codec(e.to_string()))?;
        self.run_admin_command(command, None).await?;
        Ok(())
    }
}

/// Sort a driver error into the engine's failure taxonomy.
fn map_db_error(error: &MongoError, submitted: Option<i64>) -> DbError {
    match &*error.kind {
        ErrorKind::Command(command) => match (submitted, command.code) {
            (Some(submitted), code) if VERSION_CONFLICT_CODES.contains(&code) => {
                DbError::VersionConflict {
                    submitted,
                    message: command.message.clone(),
                }
            }
            (_, code) => DbError::Command {
                code: Some(code),
                message: command.message.clone(),
            },
        },
        ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            DbError::Timeout(error.to_string())
        }
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => {
            DbError::Connection(error.to_string())
        }
        _ => DbError::Command {
            code: None,
            message: error.to_string(),
        },
    }
}

#[derive(Debug, Deserialize)]
struct StatusWire {
    set: String,
    members: Vec<StatusMemberWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusMemberWire {
    name: HostPort,
    state: MemberState,
    state_str: String,
    health: Option<f64>,
    // Absent for the member the command ran on.
    last_heartbeat: Option<bson::DateTime>,
}

/// Decode a `replSetGetStatus` reply into the engine's view of it.
fn decode_status(reply: Document) -> Result<ReplicaSetStatus, DbError> {
    let wire: StatusWire = bson::from_document(reply).map_err(|e| DbError::Codec(e.to_string()))?;
    Ok(ReplicaSetStatus {
        set: wire.set,
        members: wire
            .members
            .into_iter()
            .map(|member| MemberStatus {
                name: member.name,
                state: member.state,
                state_str: member.state_str,
                health: member.health,
                last_heartbeat: member.last_heartbeat.map(bson::DateTime::to_chrono),
            })
            .collect(),
    })
}
