//! Persistent node configuration and the store that owns it.
//!
//! The store keeps a single JSON document (`node.json`) inside the node's
//! data directory. Writes go through a temp-file-and-rename step so a crash
//! mid-save never leaves a half-written document observable to a reader. The
//! identity key is secret material: it is written with restrictive
//! permissions and redacted from every `Debug`/log rendering.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use camino::Utf8PathBuf;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tempfile::Builder;
use thiserror::Error;

use agora_config::ApiEndpoint;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// File name of the persisted node configuration inside the data directory.
pub const NODE_CONFIG_FILE: &str = "node.json";

/// Schema number stamped into the persisted document.
const NODE_CONFIG_SCHEMA: u32 = 1;

const IDENTITY_KEY_LEN: usize = 32;

/// Opaque secret identifying this node on the overlay.
///
/// Generated once at initialisation and immutable for the life of the node
/// unless an explicit destructive re-initialisation is requested.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityKey([u8; IDENTITY_KEY_LEN]);

impl IdentityKey {
    /// Generates a fresh random key from the OS entropy source.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; IDENTITY_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Reconstructs a key from its hex encoding, e.g. when importing an
    /// identity from another node.
    pub fn from_hex(encoded: &str) -> Result<Self, IdentityKeyError> {
        let bytes = hex::decode(encoded).map_err(|_| IdentityKeyError::Malformed)?;
        let bytes: [u8; IDENTITY_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| IdentityKeyError::WrongLength)?;
        Ok(Self(bytes))
    }

    /// Hex encoding used for persistence and import/export.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// The key must never appear in logs or error chains.
impl fmt::Debug for IdentityKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("IdentityKey(redacted)")
    }
}

impl Serialize for IdentityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IdentityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_hex(&encoded).map_err(D::Error::custom)
    }
}

/// Errors encountered while decoding an [`IdentityKey`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityKeyError {
    /// The encoding was not valid hex.
    #[error("identity key is not valid hex")]
    Malformed,
    /// The decoded key had the wrong length.
    #[error("identity key must be {IDENTITY_KEY_LEN} bytes")]
    WrongLength,
}

/// The node's persistent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Secret identity of this node. Never logged.
    pub identity_key: IdentityKey,
    /// Data directory this configuration belongs to.
    pub data_dir: Utf8PathBuf,
    /// Ordered seed addresses used to join the overlay on first start.
    pub bootstrap_peers: Vec<String>,
    /// Tag of the overlay community this node participates in.
    pub community: String,
    /// Control endpoint the daemon exposes once running.
    pub api_endpoint: ApiEndpoint,
}

#[derive(Serialize, Deserialize)]
struct StoredNodeConfig {
    schema: u32,
    #[serde(flatten)]
    config: NodeConfig,
}

/// Reads and writes the persisted [`NodeConfig`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    data_dir: Utf8PathBuf,
}

impl ConfigStore {
    /// Builds a store rooted at the given data directory.
    #[must_use]
    pub fn new(data_dir: Utf8PathBuf) -> Self {
        Self { data_dir }
    }

    /// Path of the persisted configuration document.
    #[must_use]
    pub fn path(&self) -> Utf8PathBuf {
        self.data_dir.join(NODE_CONFIG_FILE)
    }

    /// Loads the persisted configuration.
    ///
    /// A corrupt or schema-incompatible document is reported as
    /// [`StoreError::Corrupt`] / [`StoreError::Schema`]; it is never repaired
    /// or overwritten here.
    pub fn load(&self) -> Result<NodeConfig, StoreError> {
        let path = self.path();
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { path });
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        let stored: StoredNodeConfig =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
        if stored.schema != NODE_CONFIG_SCHEMA {
            return Err(StoreError::Schema {
                path,
                found: stored.schema,
            });
        }
        Ok(stored.config)
    }

    /// Persists the configuration atomically.
    pub fn save(&self, config: &NodeConfig) -> Result<(), StoreError> {
        let path = self.path();
        let stored = StoredNodeConfig {
            schema: NODE_CONFIG_SCHEMA,
            config: config.clone(),
        };
        let payload = serde_json::to_vec_pretty(&stored).map_err(StoreError::Serialise)?;
        atomic_write(path.as_std_path(), &payload).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })
    }
}

/// Errors raised by the config store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No configuration has been persisted yet.
    #[error("no node configuration found at '{path}'")]
    NotFound { path: Utf8PathBuf },
    /// The configuration file could not be read.
    #[error("failed to read node configuration '{path}': {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The configuration file exists but does not parse.
    #[error("node configuration '{path}' is corrupt: {source}")]
    Corrupt {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The configuration carries an unsupported schema number.
    #[error("node configuration '{path}' has unsupported schema {found}")]
    Schema { path: Utf8PathBuf, found: u32 },
    /// Serialising the configuration failed.
    #[error("failed to serialise node configuration: {0}")]
    Serialise(#[source] serde_json::Error),
    /// Writing the configuration failed.
    #[error("failed to write node configuration '{path}': {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes the provided bytes to the path using an atomic persist step.
///
/// Data is flushed and fsync'd before the temporary file is renamed into
/// place so readers never observe a partially written payload.
fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "target path did not have a parent directory",
        )
    })?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("agora"),
    );
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        builder.permissions(Permissions::from_mode(0o600));
    }

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
