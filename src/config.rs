use std::fs::read_to_string;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

/// log level, mirrors [`log::LevelFilter`] so it can be deserialized
/// directly from the config file.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default = "Log::path")]
    pub path: PathBuf,
}

impl Log {
    fn path() -> PathBuf {
        PathBuf::from("rendezvous.log")
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            path: Self::path(),
        }
    }
}

/// Per-IP cap and entry lifetime, tunable for tests; production deployments
/// should leave these at the spec's defaults.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub struct Tunables {
    #[serde(default = "Tunables::cap")]
    pub cap: usize,
    #[serde(default = "Tunables::ttl_secs")]
    pub ttl_secs: u64,
}

impl Tunables {
    fn cap() -> usize {
        registry::DEFAULT_CAP
    }

    fn ttl_secs() -> u64 {
        registry::DEFAULT_TTL_SECS
    }
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            cap: Self::cap(),
            ttl_secs: Self::ttl_secs(),
        }
    }
}

fn default_bind() -> SocketAddr {
    "0.0.0.0:48800".parse().unwrap()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Shared by both the UDP and TCP listeners.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default)]
    pub tunables: Tunables,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tunables: Tunables::default(),
            log: Log::default(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    /// Path to a JSON5 configuration file. If omitted, built-in defaults
    /// are used (bind 0.0.0.0:48800, cap 5, ttl 30s).
    #[arg(long, short)]
    config: Option<String>,
}

impl Config {
    /// Load command line parameters, then the configuration file if one was
    /// specified, falling back to built-in defaults for anything the file
    /// omits (or for everything, if no file was given at all).
    pub fn load() -> Result<Self> {
        let cli = Cli::parse();

        Ok(match cli.config {
            Some(path) => serde_json5::from_str(&read_to_string(path)?)?,
            None => Self::default(),
        })
    }
}
