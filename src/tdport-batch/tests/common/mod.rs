//! In-memory collaborator used by the integration tests.
//!
//! Behaviour is scripted per account identifier (the name of the directory
//! holding `tdata/`). Every client reports into a shared [`Tally`] so tests
//! can check that connections were released.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tdport_batch::{
    AccountInfo, CollaboratorError, DesktopSession, LoadMode, LoadOutcome, SelfIdentity,
    SessionFlag, SessionLoader, TargetClient,
};
use tracing::Dispatch;

// =============================================================================
// Scripts
// =============================================================================

/// How the loader reacts to a `tdata` directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadScript {
    Loaded,
    NotLoaded,
    Malformed,
    /// Only the legacy layout loads.
    LegacyOnly,
    Panic,
}

/// Scripted behaviour of one account.
#[derive(Debug, Clone)]
pub struct Script {
    pub load: LoadScript,
    pub authorized: bool,
    pub identity_fails: bool,
    pub writes_session: bool,
    pub hangs_on_connect: bool,
    pub conversion_fails: bool,
    pub disconnect: DisconnectScript,
}

/// How the client reacts to `disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectScript {
    Clean,
    Fails,
    Hangs,
}

impl Script {
    pub fn healthy() -> Self {
        Self {
            load: LoadScript::Loaded,
            authorized: true,
            identity_fails: false,
            writes_session: true,
            hangs_on_connect: false,
            conversion_fails: false,
            disconnect: DisconnectScript::Clean,
        }
    }

    pub fn load(mut self, load: LoadScript) -> Self {
        self.load = load;
        self
    }

    pub fn unauthorized(mut self) -> Self {
        self.authorized = false;
        self
    }

    pub fn identity_fails(mut self) -> Self {
        self.identity_fails = true;
        self
    }

    pub fn no_write(mut self) -> Self {
        self.writes_session = false;
        self
    }

    pub fn hangs(mut self) -> Self {
        self.hangs_on_connect = true;
        self
    }

    pub fn conversion_fails(mut self) -> Self {
        self.conversion_fails = true;
        self
    }

    pub fn disconnect(mut self, disconnect: DisconnectScript) -> Self {
        self.disconnect = disconnect;
        self
    }
}

// =============================================================================
// Tally
// =============================================================================

/// Shared counters updated by every mock client.
#[derive(Debug, Default)]
pub struct Tally {
    open: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    loads: Mutex<Vec<(String, LoadMode)>>,
}

impl Tally {
    /// Connections currently open.
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> Vec<(String, LoadMode)> {
        self.loads.lock().unwrap().clone()
    }
}

// =============================================================================
// Loader, desktop and client doubles
// =============================================================================

pub struct MockLoader {
    scripts: HashMap<String, Script>,
    default: Script,
    tally: Arc<Tally>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            default: Script::healthy(),
            tally: Arc::new(Tally::default()),
        }
    }

    pub fn script(mut self, identifier: &str, script: Script) -> Self {
        self.scripts.insert(identifier.to_string(), script);
        self
    }

    pub fn tally(&self) -> Arc<Tally> {
        Arc::clone(&self.tally)
    }
}

fn identifier_of(tdata: &Path) -> String {
    tdata
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl SessionLoader for MockLoader {
    type Desktop = MockDesktop;

    async fn load(&self, tdata: &Path, mode: LoadMode) -> LoadOutcome<MockDesktop> {
        let identifier = identifier_of(tdata);
        self.tally
            .loads
            .lock()
            .unwrap()
            .push((identifier.clone(), mode));

        let script = self
            .scripts
            .get(&identifier)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        let loads = match (script.load, mode) {
            (LoadScript::Loaded, _) | (LoadScript::LegacyOnly, LoadMode::Legacy) => true,
            (LoadScript::LegacyOnly, LoadMode::Standard) | (LoadScript::NotLoaded, _) => false,
            (LoadScript::Malformed, _) => {
                return LoadOutcome::Malformed(format!("unreadable key data in {identifier}"));
            }
            (LoadScript::Panic, _) => panic!("loader exploded on {identifier}"),
        };

        if !loads {
            return LoadOutcome::NotLoaded;
        }

        LoadOutcome::Loaded(MockDesktop {
            script,
            accounts: vec![AccountInfo {
                user_id: Some(42),
                label: Some(identifier),
            }],
            tally: Arc::clone(&self.tally),
        })
    }
}

#[derive(Debug)]
pub struct MockDesktop {
    script: Script,
    accounts: Vec<AccountInfo>,
    tally: Arc<Tally>,
}

#[async_trait]
impl DesktopSession for MockDesktop {
    fn accounts(&self) -> &[AccountInfo] {
        &self.accounts
    }

    async fn to_client(
        &self,
        session: &Path,
        flag: SessionFlag,
    ) -> Result<Box<dyn TargetClient>, CollaboratorError> {
        assert_eq!(flag, SessionFlag::UseCurrentSession);
        if self.script.conversion_fails {
            return Err(CollaboratorError::Rejected("api id mismatch".into()));
        }
        if self.script.writes_session {
            std::fs::write(session, b"converted")?;
        }
        Ok(Box::new(MockClient {
            script: self.script.clone(),
            tally: Arc::clone(&self.tally),
            connected: false,
            session: session.to_path_buf(),
        }))
    }
}

pub struct MockClient {
    script: Script,
    tally: Arc<Tally>,
    connected: bool,
    session: PathBuf,
}

#[async_trait]
impl TargetClient for MockClient {
    async fn connect(&mut self) -> Result<(), CollaboratorError> {
        self.connected = true;
        self.tally.open.fetch_add(1, Ordering::SeqCst);
        self.tally.connects.fetch_add(1, Ordering::SeqCst);
        if self.script.hangs_on_connect {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn is_authorized(&mut self) -> Result<bool, CollaboratorError> {
        Ok(self.script.authorized)
    }

    async fn get_me(&mut self) -> Result<SelfIdentity, CollaboratorError> {
        if self.script.identity_fails {
            return Err(CollaboratorError::Rejected("AUTH_KEY_UNREGISTERED".into()));
        }
        Ok(SelfIdentity {
            id: 42,
            first_name: Some("Test".into()),
            username: self
                .session
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned()),
            ..Default::default()
        })
    }

    async fn disconnect(&mut self) -> Result<(), CollaboratorError> {
        match self.script.disconnect {
            DisconnectScript::Clean => {}
            DisconnectScript::Fails => {
                return Err(CollaboratorError::Rejected("connection reset".into()));
            }
            DisconnectScript::Hangs => std::future::pending::<()>().await,
        }
        if self.connected {
            self.connected = false;
            self.tally.open.fetch_sub(1, Ordering::SeqCst);
        }
        self.tally.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Create `{root}/{name}/tdata` and return the account directory.
pub fn account(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(dir.join("tdata")).unwrap();
    dir
}

/// Sorted file names in `dir`, empty when it does not exist.
pub fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Collects formatted log output of one test.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn dispatch(&self) -> Dispatch {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        Dispatch::new(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
