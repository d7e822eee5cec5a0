//! Configuration loading
//!
//! The bridge is configured from a line-oriented file (default `knx.cfg`):
//!
//! ```text
//! logdir /var/log/knx
//! port 8001
//! gateway 192.168.1.11 1/ 2/5/
//! device 1.1.10 myroom.thermostat
//! address 2/5/7 9.001 myroom/temperature
//! ```
//!
//! `#` starts a comment. Command line flags (see [`CliArgs`]) are merged on
//! top of the file into a [`ServerConfig`].

use crate::address::{GroupAddr, IndividualAddr};
use crate::dpt;
use crate::error::{KnxError, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default KNXnet/IP port
pub const KNX_DEFAULT_PORT: u16 = 3671;

/// Default HTTP port of the query surface
pub const DEFAULT_HTTP_PORT: u16 = 8001;

/// Seconds without inbound traffic before a gateway link is considered stalled
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// A gateway to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gateway {
    /// `host:port`
    pub address: String,
    /// Group address prefixes this gateway is expected to carry (informational)
    pub groups: Vec<String>,
}

impl Gateway {
    pub fn new(address: &str) -> Self {
        Self {
            address: with_default_port(address),
            groups: Vec::new(),
        }
    }
}

/// Configured name and type of a group address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub name: String,
    pub dpt: String,
}

/// Contents of a configuration file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub logdir: Option<PathBuf>,
    pub port: Option<u16>,
    pub gateways: Vec<Gateway>,
    pub devices: BTreeMap<IndividualAddr, String>,
    pub addresses: BTreeMap<GroupAddr, AddressEntry>,
}

impl Config {
    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            KnxError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse configuration text; `filename` is only used in error messages
    pub fn parse(text: &str, filename: &str) -> Result<Self> {
        let mut config = Config::default();

        for (index, raw) in text.lines().enumerate() {
            let line_num = index + 1;
            let line = match raw.find('#') {
                Some(i) => &raw[..i],
                None => raw,
            };
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(keyword) = tokens.first() else {
                continue;
            };
            let syntax = |msg: String| KnxError::config_syntax(filename, line_num, msg);
            let expect_args = |n: usize| {
                if tokens.len() == n + 1 {
                    Ok(())
                } else {
                    Err(syntax(format!(
                        "{keyword} takes {n} argument(s), got {}",
                        tokens.len() - 1
                    )))
                }
            };

            match *keyword {
                "logdir" => {
                    expect_args(1)?;
                    config.logdir = Some(PathBuf::from(tokens[1]));
                }
                "port" => {
                    expect_args(1)?;
                    let port = tokens[1]
                        .parse()
                        .map_err(|e| syntax(format!("invalid port {:?}: {e}", tokens[1])))?;
                    config.port = Some(port);
                }
                "gateway" => {
                    if tokens.len() < 2 {
                        return Err(syntax("gateway needs an address".to_string()));
                    }
                    let mut gateway = Gateway::new(tokens[1]);
                    gateway.groups = tokens[2..].iter().map(|s| s.to_string()).collect();
                    config.gateways.push(gateway);
                }
                "device" => {
                    expect_args(2)?;
                    let addr: IndividualAddr =
                        tokens[1].parse().map_err(|e: KnxError| syntax(e.to_string()))?;
                    config.devices.insert(addr, tokens[2].to_string());
                }
                "address" => {
                    expect_args(3)?;
                    let addr: GroupAddr =
                        tokens[1].parse().map_err(|e: KnxError| syntax(e.to_string()))?;
                    config.addresses.insert(
                        addr,
                        AddressEntry {
                            name: tokens[3].to_string(),
                            dpt: tokens[2].to_string(),
                        },
                    );
                }
                other => return Err(syntax(format!("unrecognized token {other}"))),
            }
        }

        Ok(config)
    }
}

fn with_default_port(address: &str) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{address}:{KNX_DEFAULT_PORT}")
    }
}

/// Command line flags
#[derive(Parser, Debug, Clone)]
#[command(name = "knxweb-server")]
#[command(about = "Bridge KNX gateways to an HTTP query and command surface")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct CliArgs {
    /// Configuration file
    #[arg(long, env = "KNXWEB_CONFIG", default_value = "knx.cfg")]
    pub config: PathBuf,

    /// Additional gateway address (repeatable)
    #[arg(long = "knx", env = "KNXWEB_GATEWAY", value_delimiter = ',')]
    pub gateways: Vec<String>,

    /// Port to listen for HTTP requests (overrides the config file)
    #[arg(short, long, env = "KNXWEB_PORT")]
    pub port: Option<u16>,

    /// Directory for the traffic log (overrides the config file)
    #[arg(long, env = "KNXWEB_LOGDIR")]
    pub logdir: Option<PathBuf>,

    /// Where the latest value of every address is persisted
    #[arg(long, env = "KNXWEB_STATE_FILE", default_value = "knx-state.json")]
    pub state_file: PathBuf,

    /// Seconds without traffic before reconnecting a gateway
    #[arg(long, env = "KNXWEB_IDLE_TIMEOUT", default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub idle_timeout: u64,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Enable CORS (permissive mode)
    #[arg(long)]
    pub enable_cors: bool,
}

/// Effective runtime configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub logdir: Option<PathBuf>,
    pub state_file: PathBuf,
    pub idle_timeout: Duration,
    pub enable_cors: bool,
    pub debug: bool,
    pub gateways: Vec<Gateway>,
    pub devices: BTreeMap<IndividualAddr, String>,
    pub addresses: BTreeMap<GroupAddr, AddressEntry>,
}

impl ServerConfig {
    /// Merge a parsed file with command line flags; flags win
    pub fn merge(file: Config, args: &CliArgs) -> Result<Self> {
        // one supervisor per gateway address; the first entry wins
        let mut gateways: Vec<Gateway> = Vec::new();
        let extra = args.gateways.iter().map(|address| Gateway::new(address));
        for gateway in file.gateways.into_iter().chain(extra) {
            if !gateways.iter().any(|g| g.address == gateway.address) {
                gateways.push(gateway);
            }
        }

        let config = Self {
            port: args.port.or(file.port).unwrap_or(DEFAULT_HTTP_PORT),
            logdir: args.logdir.clone().or(file.logdir),
            state_file: args.state_file.clone(),
            idle_timeout: Duration::from_secs(args.idle_timeout),
            enable_cors: args.enable_cors,
            debug: args.debug,
            gateways,
            devices: file.devices,
            addresses: file.addresses,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `args.config` and merge
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let file = Config::load(&args.config)?;
        Self::merge(file, args)
    }

    /// Configured addresses whose datapoint type is not registered
    pub fn unknown_types(&self) -> Vec<(GroupAddr, &str)> {
        self.addresses
            .iter()
            .filter(|(_, entry)| dpt::lookup(&entry.dpt).is_none())
            .map(|(addr, entry)| (*addr, entry.dpt.as_str()))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateways.is_empty() {
            return Err(KnxError::config(
                "No KNX gateway specified. Add a `gateway` line to the config file or use --knx",
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(KnxError::config("idle timeout must be at least one second"));
        }
        Ok(())
    }
}
