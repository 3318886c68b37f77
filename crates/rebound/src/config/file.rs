use crate::config::{constants, LogFormat, LogSpanEvents, ReportMode};
use anyhow::Context;
use etcetera::BaseStrategy;
use ipnetwork::Ipv4Network;
use rebound_core::defaults;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "rebound.toml";
const DEFAULT_HIDDEN_CONFIG_FILE: &str = ".rebound.toml";

/// Read the config from the default location of user config for the platform.
///
/// Returns the parsed `Some(ConfigFile)` if the config file exists, `None` otherwise.
///
/// A `rebound.toml` or `.rebound.toml` file is searched for in the following locations:
///     - the current directory
///     - the user home directory
///     - the XDG config directory: `$XDG_CONFIG_HOME` or `~/.config`
///     - the XDG app config directory: `$XDG_CONFIG_HOME/rebound` or `~/.config/rebound`
///
/// Only the first config file found is used.
pub fn read_default_config_file() -> anyhow::Result<Option<ConfigFile>> {
    use etcetera::base_strategy as base;
    if let Some(file) = read_files("")? {
        Ok(Some(file))
    } else {
        let basedirs = base::choose_base_strategy()?;
        if let Some(file) = read_files(basedirs.home_dir())? {
            Ok(Some(file))
        } else if let Some(file) = read_files(basedirs.config_dir())? {
            Ok(Some(file))
        } else if let Some(file) = read_files(basedirs.config_dir().join("rebound"))? {
            Ok(Some(file))
        } else {
            Ok(None)
        }
    }
}

/// Read the config from the given path.
pub fn read_config_file<P: AsRef<Path>>(path: P) -> anyhow::Result<ConfigFile> {
    let contents = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("config file not found: {}", path.as_ref().display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("invalid config file: {}", path.as_ref().display()))
}

fn read_files<P: AsRef<Path>>(dir: P) -> anyhow::Result<Option<ConfigFile>> {
    if let Some(file) = read_file(dir.as_ref(), DEFAULT_CONFIG_FILE)? {
        Ok(Some(file))
    } else if let Some(file) = read_file(dir.as_ref(), DEFAULT_HIDDEN_CONFIG_FILE)? {
        Ok(Some(file))
    } else {
        Ok(None)
    }
}

fn read_file<P: AsRef<Path>>(dir: P, file: &str) -> anyhow::Result<Option<ConfigFile>> {
    let path = dir.as_ref().join(file);
    if path.exists() {
        Ok(Some(read_config_file(path)?))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFile {
    pub harness: Option<ConfigHarness>,
    pub log: Option<ConfigLog>,
    pub report: Option<ConfigReport>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            harness: Some(ConfigHarness::default()),
            log: Some(ConfigLog::default()),
            report: Some(ConfigReport::default()),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigHarness {
    #[serde(default)]
    #[serde(deserialize_with = "network_deser")]
    pub tun_network: Option<Ipv4Network>,
    #[serde(default)]
    #[serde(deserialize_with = "addr_deser")]
    pub dut_addr: Option<Ipv4Addr>,
    #[serde(default)]
    #[serde(deserialize_with = "addr_deser")]
    pub peer_addr: Option<Ipv4Addr>,
    pub peer_port_base: Option<u16>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub call_timeout: Option<Duration>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub expect_timeout: Option<Duration>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub scenario_timeout: Option<Duration>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub teardown_timeout: Option<Duration>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub settle_delay: Option<Duration>,
    pub payload: Option<String>,
    pub max_recv_len: Option<usize>,
    pub parallelism: Option<NonZeroUsize>,
}

impl Default for ConfigHarness {
    fn default() -> Self {
        Self {
            tun_network: Ipv4Network::new(
                defaults::DEFAULT_TUN_NETWORK_ADDR,
                defaults::DEFAULT_TUN_NETWORK_PREFIX,
            )
            .ok(),
            dut_addr: Some(defaults::DEFAULT_DUT_ADDR),
            peer_addr: Some(defaults::DEFAULT_PEER_ADDR),
            peer_port_base: Some(defaults::DEFAULT_PEER_PORT_BASE),
            call_timeout: Some(defaults::DEFAULT_CALL_TIMEOUT),
            expect_timeout: Some(defaults::DEFAULT_EXPECT_TIMEOUT),
            scenario_timeout: Some(defaults::DEFAULT_SCENARIO_TIMEOUT),
            teardown_timeout: Some(defaults::DEFAULT_TEARDOWN_TIMEOUT),
            settle_delay: Some(defaults::DEFAULT_SETTLE_DELAY),
            payload: Some(String::from_utf8_lossy(defaults::DEFAULT_PAYLOAD).into_owned()),
            max_recv_len: Some(defaults::DEFAULT_MAX_RECV_LEN),
            parallelism: Some(defaults::DEFAULT_PARALLELISM),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigLog {
    pub format: Option<LogFormat>,
    pub filter: Option<String>,
    pub span_events: Option<LogSpanEvents>,
}

impl Default for ConfigLog {
    fn default() -> Self {
        Self {
            format: Some(constants::DEFAULT_LOG_FORMAT),
            filter: Some(String::from(constants::DEFAULT_LOG_FILTER)),
            span_events: Some(constants::DEFAULT_LOG_SPAN_EVENTS),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigReport {
    pub mode: Option<ReportMode>,
    pub filter: Option<String>,
}

impl Default for ConfigReport {
    fn default() -> Self {
        Self {
            mode: Some(constants::DEFAULT_MODE),
            filter: None,
        }
    }
}

fn humantime_deser<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    humantime::parse_duration(&String::deserialize(deserializer)?)
        .map_err(serde::de::Error::custom)
        .map(Some)
}

fn addr_deser<'de, D>(deserializer: D) -> Result<Option<Ipv4Addr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ipv4Addr::from_str(&String::deserialize(deserializer)?)
        .map_err(serde::de::Error::custom)
        .map(Some)
}

fn network_deser<'de, D>(deserializer: D) -> Result<Option<Ipv4Network>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ipv4Network::from_str(&String::deserialize(deserializer)?)
        .map_err(serde::de::Error::custom)
        .map(Some)
}
