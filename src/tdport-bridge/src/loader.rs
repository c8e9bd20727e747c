//! [`SessionLoader`] implementation on top of [`BridgeProcess`].
//!
//! Loading spawns one helper per attempt. The desktop session and the client
//! created from it share that helper, which is stopped by
//! [`TargetClient::disconnect`] or, at the latest, when both are dropped.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tdport_batch::{
    AccountInfo, CollaboratorError, DesktopSession, LoadMode, LoadOutcome, SelfIdentity,
    SessionFlag, SessionLoader, TargetClient,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::process::BridgeProcess;
use crate::protocol::{AuthorizedResult, LoadResult, Operation};
use crate::{BridgeConfig, BridgeError};

type SharedProcess = Arc<Mutex<BridgeProcess>>;

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, BridgeError> {
    Ok(serde_json::from_value(value)?)
}

/// Loads `tdata` directories through the helper.
#[derive(Debug, Clone)]
pub struct BridgeLoader {
    config: BridgeConfig,
}

impl BridgeLoader {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    async fn try_load(
        &self,
        tdata: &Path,
        mode: LoadMode,
    ) -> Result<Option<BridgeDesktop>, BridgeError> {
        let mut process = BridgeProcess::spawn(&self.config)?;
        let result: LoadResult = decode(
            process
                .request(Operation::Load {
                    tdata: tdata.to_path_buf(),
                    legacy: mode == LoadMode::Legacy,
                })
                .await?,
        )?;

        if !result.loaded || result.accounts.is_empty() {
            process.shutdown().await?;
            return Ok(None);
        }

        Ok(Some(BridgeDesktop {
            process: Arc::new(Mutex::new(process)),
            accounts: result.accounts,
        }))
    }
}

#[async_trait]
impl SessionLoader for BridgeLoader {
    type Desktop = BridgeDesktop;

    async fn load(&self, tdata: &Path, mode: LoadMode) -> LoadOutcome<BridgeDesktop> {
        match self.try_load(tdata, mode).await {
            Ok(Some(desktop)) => LoadOutcome::Loaded(desktop),
            Ok(None) => LoadOutcome::NotLoaded,
            Err(e) => LoadOutcome::Malformed(e.to_string()),
        }
    }
}

/// Accounts loaded by a running helper.
pub struct BridgeDesktop {
    process: SharedProcess,
    accounts: Vec<AccountInfo>,
}

impl fmt::Debug for BridgeDesktop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeDesktop")
            .field("accounts", &self.accounts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DesktopSession for BridgeDesktop {
    fn accounts(&self) -> &[AccountInfo] {
        &self.accounts
    }

    async fn to_client(
        &self,
        session: &Path,
        flag: SessionFlag,
    ) -> Result<Box<dyn TargetClient>, CollaboratorError> {
        self.process
            .lock()
            .await
            .request(Operation::Convert {
                session: session.to_path_buf(),
                flag,
            })
            .await?;

        Ok(Box::new(BridgeClient {
            process: Arc::clone(&self.process),
        }))
    }
}

/// Client for a session converted by the helper.
pub struct BridgeClient {
    process: SharedProcess,
}

impl BridgeClient {
    async fn call(&self, op: Operation) -> Result<Value, BridgeError> {
        self.process.lock().await.request(op).await
    }
}

#[async_trait]
impl TargetClient for BridgeClient {
    async fn connect(&mut self) -> Result<(), CollaboratorError> {
        self.call(Operation::Connect).await?;
        Ok(())
    }

    async fn is_authorized(&mut self) -> Result<bool, CollaboratorError> {
        let result: AuthorizedResult = decode(self.call(Operation::IsAuthorized).await?)?;
        Ok(result.authorized)
    }

    async fn get_me(&mut self) -> Result<SelfIdentity, CollaboratorError> {
        Ok(decode(self.call(Operation::GetMe).await?)?)
    }

    async fn disconnect(&mut self) -> Result<(), CollaboratorError> {
        let mut process = self.process.lock().await;
        let disconnected = if process.is_running() {
            process.request(Operation::Disconnect).await.map(drop)
        } else {
            Ok(())
        };
        let stopped = process.shutdown().await;
        debug!("Bridge client released");

        disconnected?;
        stopped?;
        Ok(())
    }
}
