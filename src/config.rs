use std::path::PathBuf;

use clap::Parser;

use crate::size::parse_size_arg;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory holding the stored files
    #[arg(long, env = "STORE_DIRECTORY", default_value = "store")]
    pub store_dir: PathBuf,

    /// Staging directory for uploads in flight
    #[arg(long, env = "TEMP_DIRECTORY", default_value = "tmp")]
    pub temp_dir: PathBuf,

    /// Static front-end assets, served when the directory exists
    #[arg(long, env = "PUBLIC_DIRECTORY", default_value = "public")]
    pub public_dir: PathBuf,

    /// Maximum size of a single uploaded file, e.g. "5GB" or "100MB"
    #[arg(long, env = "MAX_FILE_SIZE", default_value = "5GB", value_parser = parse_size_arg)]
    pub max_file_size: u64,

    /// Comma-separated extension allow-list; empty allows everything
    #[arg(long, env = "ALLOWED_EXTENSIONS", value_delimiter = ',')]
    pub allowed_extensions: Vec<String>,

    /// Enable debug mode (error detail in server error responses)
    #[arg(long, env = "DEBUG")]
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaginationConfig {
    pub default_limit: usize,
    pub allowed_limits: Vec<usize>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            allowed_limits: vec![10, 50, 100],
        }
    }
}

/// Immutable settings shared by every handler.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub public_dir: PathBuf,
    pub max_file_size: u64,
    /// Lower-case, without the leading dot.
    pub allowed_extensions: Vec<String>,
    pub pagination: PaginationConfig,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            store_dir: PathBuf::from("store"),
            temp_dir: PathBuf::from("tmp"),
            public_dir: PathBuf::from("public"),
            max_file_size: 5 * 1024 * 1024 * 1024,
            allowed_extensions: Vec::new(),
            pagination: PaginationConfig::default(),
            debug: false,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let allowed_extensions = args
            .allowed_extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Self {
            host: args.host,
            port: args.port,
            store_dir: args.store_dir,
            temp_dir: args.temp_dir,
            public_dir: args.public_dir,
            max_file_size: args.max_file_size,
            allowed_extensions,
            pagination: PaginationConfig::default(),
            debug: args.debug,
        }
    }
}

impl Config {
    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}
