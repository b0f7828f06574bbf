use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt};

/// Extensions accepted for upload. Documents and images only; the
/// original deployment deliberately refused archives and executables.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "ppt", "pptx", "pptm", "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff",
];

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

pub const DEFAULT_PRESIGN_TTL_SECS: i64 = 300;

/// What an upload must satisfy before anything is signed or stored.
/// Enforced twice: by the transfer broker before it asks for a URL, and
/// by the server when minting one.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Lowercase extensions (without the dot) allowed for upload.
    pub allowed_extensions: Vec<String>,

    /// Hard cap on payload size in bytes.
    pub max_upload_bytes: u64,
}

impl UploadPolicy {
    /// Whether `filename`'s extension is on the allowlist. Filenames
    /// without an extension are refused.
    pub fn allows(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            }
            _ => false,
        }
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub root_prefix: String,
    /// Base URL clients reach this server at; presigned URLs are minted
    /// against it. Defaults to the bind address when unset.
    pub public_base_url: Option<String>,
    pub presign_secret: Option<String>,
    pub presign_ttl_secs: i64,
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Field/category file catalog API")]
pub struct Args {
    /// Host to bind to (overrides FILESHELF_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILESHELF_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides FILESHELF_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FILESHELF_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Root key prefix all objects live under (overrides FILESHELF_ROOT_PREFIX)
    #[arg(long)]
    pub root_prefix: Option<String>,

    /// Public base URL for presigned links (overrides FILESHELF_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Secret for signing presigned URLs (overrides FILESHELF_PRESIGN_SECRET)
    #[arg(long)]
    pub presign_secret: Option<String>,

    /// Presigned URL lifetime in seconds (overrides FILESHELF_PRESIGN_TTL_SECS)
    #[arg(long)]
    pub presign_ttl_secs: Option<i64>,

    /// Comma-separated upload extension allowlist (overrides FILESHELF_ALLOWED_EXTENSIONS)
    #[arg(long)]
    pub allowed_extensions: Option<String>,

    /// Maximum upload size in bytes (overrides FILESHELF_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("FILESHELF_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("FILESHELF_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FILESHELF_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading FILESHELF_PORT"),
        };
        let env_storage =
            env::var("FILESHELF_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("FILESHELF_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/fileshelf.db".into());
        let env_root = env::var("FILESHELF_ROOT_PREFIX").unwrap_or_else(|_| "uploadedfiles".into());
        let env_public_base = env::var("FILESHELF_PUBLIC_BASE_URL").ok();
        let env_secret = env::var("FILESHELF_PRESIGN_SECRET").ok();
        let env_ttl = match env::var("FILESHELF_PRESIGN_TTL_SECS") {
            Ok(value) => value
                .parse::<i64>()
                .with_context(|| format!("parsing FILESHELF_PRESIGN_TTL_SECS value `{}`", value))?,
            Err(env::VarError::NotPresent) => DEFAULT_PRESIGN_TTL_SECS,
            Err(err) => return Err(err).context("reading FILESHELF_PRESIGN_TTL_SECS"),
        };
        let env_extensions = env::var("FILESHELF_ALLOWED_EXTENSIONS").ok();
        let env_max_bytes = match env::var("FILESHELF_MAX_UPLOAD_BYTES") {
            Ok(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing FILESHELF_MAX_UPLOAD_BYTES value `{}`", value))?,
            Err(env::VarError::NotPresent) => DEFAULT_MAX_UPLOAD_BYTES,
            Err(err) => return Err(err).context("reading FILESHELF_MAX_UPLOAD_BYTES"),
        };

        // --- Merge ---
        let extensions = args
            .allowed_extensions
            .or(env_extensions)
            .map(|list| parse_extension_list(&list))
            .unwrap_or_else(|| {
                DEFAULT_ALLOWED_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            });

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            root_prefix: args.root_prefix.unwrap_or(env_root),
            public_base_url: args.public_base_url.or(env_public_base),
            presign_secret: args.presign_secret.or(env_secret),
            presign_ttl_secs: args.presign_ttl_secs.unwrap_or(env_ttl),
            allowed_extensions: extensions,
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_bytes),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            allowed_extensions: self.allowed_extensions.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

// Manual Debug: the startup log prints the whole config and must not
// leak the signing secret.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("root_prefix", &self.root_prefix)
            .field("public_base_url", &self.public_base_url)
            .field(
                "presign_secret",
                &self.presign_secret.as_ref().map(|_| "<set>"),
            )
            .field("presign_ttl_secs", &self.presign_ttl_secs)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

fn parse_extension_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
