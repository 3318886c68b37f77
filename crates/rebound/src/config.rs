use anyhow::anyhow;
use clap::ValueEnum;
use file::ConfigFile;
use rebound_core::{defaults, Builder, HarnessConfig, Matrix};
use rebound_privilege::Privilege;
use serde::Deserialize;

mod cmd;
mod constants;
mod file;

pub use cmd::Args;

/// The report mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportMode {
    /// Generate a pretty text table report.
    Pretty,
    /// Generate a Markdown text table report.
    Markdown,
    /// Generate a JSON report.
    Json,
    /// Print one line per scenario as it completes.
    Stream,
}

/// The debug log format.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Display log data in a compact format.
    Compact,
    /// Display log data in a pretty format.
    Pretty,
    /// Display log data in a json format.
    Json,
}

/// The debug log span events.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogSpanEvents {
    /// Do not display event spans.
    Off,
    /// Display enter and exit event spans.
    Active,
    /// Display all event spans.
    Full,
}

/// The action to perform.
#[derive(Debug, Eq, PartialEq)]
pub enum ReboundAction {
    /// Run the selected scenarios.
    Run(ReboundConfig),
    /// List the selected scenarios and exit.
    ListScenarios(Matrix),
    /// Print a template toml config file and exit.
    PrintConfigTemplate,
}

impl ReboundAction {
    pub fn from(args: Args, privilege: &Privilege) -> anyhow::Result<Self> {
        Ok(if args.print_config_template {
            Self::PrintConfigTemplate
        } else if args.list_scenarios {
            Self::ListScenarios(select(args.filter.as_deref())?)
        } else {
            Self::Run(ReboundConfig::from(args, privilege)?)
        })
    }
}

/// Fully parsed and validated configuration.
#[derive(Debug, Eq, PartialEq)]
pub struct ReboundConfig {
    pub harness: HarnessConfig,
    pub matrix: Matrix,
    pub mode: ReportMode,
    pub verbose: bool,
    pub log_format: LogFormat,
    pub log_filter: String,
    pub log_span_events: LogSpanEvents,
}

impl ReboundConfig {
    pub fn from(args: Args, privilege: &Privilege) -> anyhow::Result<Self> {
        let cfg_file = if let Some(cfg) = &args.config_file {
            file::read_config_file(cfg)?
        } else {
            file::read_default_config_file()?.unwrap_or_default()
        };
        Self::build_config(args, cfg_file, privilege)
    }

    fn build_config(
        args: Args,
        cfg_file: ConfigFile,
        privilege: &Privilege,
    ) -> anyhow::Result<Self> {
        let cfg_file_harness = cfg_file.harness.unwrap_or_default();
        let cfg_file_log = cfg_file.log.unwrap_or_default();
        let cfg_file_report = cfg_file.report.unwrap_or_default();
        let mode = cfg_layer(args.mode, cfg_file_report.mode, constants::DEFAULT_MODE);
        let filter = cfg_layer_opt(args.filter, cfg_file_report.filter);
        let verbose = args.verbose;
        let log_format = cfg_layer(
            args.log_format,
            cfg_file_log.format,
            constants::DEFAULT_LOG_FORMAT,
        );
        let log_filter = cfg_layer(
            args.log_filter,
            cfg_file_log.filter,
            String::from(constants::DEFAULT_LOG_FILTER),
        );
        let log_span_events = cfg_layer(
            args.log_span_events,
            cfg_file_log.span_events,
            constants::DEFAULT_LOG_SPAN_EVENTS,
        );
        let mut builder = Builder::new();
        if let Some(network) = cfg_layer_opt(args.tun_network, cfg_file_harness.tun_network) {
            builder = builder.tun_network(network);
        }
        let harness = builder
            .dut_addr(cfg_layer(
                args.dut_addr,
                cfg_file_harness.dut_addr,
                defaults::DEFAULT_DUT_ADDR,
            ))
            .peer_addr(cfg_layer(
                args.peer_addr,
                cfg_file_harness.peer_addr,
                defaults::DEFAULT_PEER_ADDR,
            ))
            .peer_port_base(cfg_layer(
                args.peer_port_base,
                cfg_file_harness.peer_port_base,
                defaults::DEFAULT_PEER_PORT_BASE,
            ))
            .call_timeout(cfg_layer(
                args.call_timeout,
                cfg_file_harness.call_timeout,
                defaults::DEFAULT_CALL_TIMEOUT,
            ))
            .expect_timeout(cfg_layer(
                args.expect_timeout,
                cfg_file_harness.expect_timeout,
                defaults::DEFAULT_EXPECT_TIMEOUT,
            ))
            .scenario_timeout(cfg_layer(
                args.scenario_timeout,
                cfg_file_harness.scenario_timeout,
                defaults::DEFAULT_SCENARIO_TIMEOUT,
            ))
            .teardown_timeout(cfg_layer(
                args.teardown_timeout,
                cfg_file_harness.teardown_timeout,
                defaults::DEFAULT_TEARDOWN_TIMEOUT,
            ))
            .settle_delay(cfg_layer(
                args.settle_delay,
                cfg_file_harness.settle_delay,
                defaults::DEFAULT_SETTLE_DELAY,
            ))
            .payload(cfg_layer_opt(args.payload, cfg_file_harness.payload).map_or_else(
                || defaults::DEFAULT_PAYLOAD.to_vec(),
                String::into_bytes,
            ))
            .max_recv_len(cfg_layer(
                args.max_recv_len,
                cfg_file_harness.max_recv_len,
                defaults::DEFAULT_MAX_RECV_LEN,
            ))
            .parallelism(cfg_layer(
                args.parallelism,
                cfg_file_harness.parallelism,
                defaults::DEFAULT_PARALLELISM,
            ))
            .build()?;
        let matrix = select(filter.as_deref())?;
        validate_privilege(privilege.has_privileges())?;
        Ok(Self {
            harness,
            matrix,
            mode,
            verbose,
            log_format,
            log_filter,
            log_span_events,
        })
    }
}

/// Select the scenarios to run.
fn select(filter: Option<&str>) -> anyhow::Result<Matrix> {
    let matrix = Matrix::all();
    Ok(match filter {
        Some(pattern) => matrix.filter(pattern)?,
        None => matrix,
    })
}

fn cfg_layer<T>(fst: Option<T>, snd: Option<T>, def: T) -> T {
    match (fst, snd) {
        (Some(val), _) | (None, Some(val)) => val,
        (None, None) => def,
    }
}

fn cfg_layer_opt<T>(fst: Option<T>, snd: Option<T>) -> Option<T> {
    match (fst, snd) {
        (Some(val), _) | (None, Some(val)) => Some(val),
        (None, None) => None,
    }
}

/// Validate privileges.
fn validate_privilege(has_privileges: bool) -> anyhow::Result<()> {
    if has_privileges {
        Ok(())
    } else {
        Err(anyhow!(
            "privileges are required to create the tun device (requires {})",
            Privilege::requirement()
        ))
    }
}
