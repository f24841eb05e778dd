//! Configuration manager for adboard.

use std::fs::File;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::asset::AvatarNaming;
use crate::asset::validator::DEFAULT_MAX_FILE_SIZE;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Listening socket.
    pub address: String,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    /// The in-memory record store is used when absent.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Image buckets.
    pub storage: Storage,
    /// Whether `role: ADMIN` is accepted on registration.
    pub allow_admin_registration: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: "adboard".into(),
            address: DEFAULT_ADDRESS.into(),
            version: VERSION.to_owned(),
            path: PathBuf::new(),
            postgres: None,
            argon2: None,
            storage: Storage::default(),
            allow_admin_registration: false,
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Filesystem buckets for images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub avatar_dir: PathBuf,
    pub ad_image_dir: PathBuf,
    /// Upload ceiling in bytes.
    pub max_file_size: u64,
    pub avatar_naming: AvatarNaming,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            avatar_dir: PathBuf::from("images/avatars"),
            ad_image_dir: PathBuf::from("images/ads"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            avatar_naming: AvatarNaming::default(),
        }
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Parsed listening socket.
    pub fn socket(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.address.parse()
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let file = match File::open(&file_path) {
            Ok(file) => file,
            Err(err) => return Arc::new(self.error(err)),
        };

        match serde_yaml::from_reader::<_, Configuration>(file) {
            Ok(mut config) => {
                config.version = VERSION.to_owned();
                config.path = file_path;
                Arc::new(config)
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, path = %self.path.display(), "`config.yaml` could not be read, using defaults");
        Self::default()
    }
}
