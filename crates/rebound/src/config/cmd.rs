use crate::config::{LogFormat, LogSpanEvents, ReportMode};
use clap::builder::Styles;
use clap::Parser;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

/// Check how a network stack delivers ICMP errors to UDP sockets
#[derive(Parser, Debug)]
#[command(name = "rebound", author, version, about, long_about = None, styles=Styles::styled())]
pub struct Args {
    /// Config file
    #[arg(short = 'c', long, value_hint = clap::ValueHint::FilePath)]
    pub config_file: Option<String>,

    /// Output mode [default: pretty]
    #[arg(value_enum, short = 'm', long)]
    pub mode: Option<ReportMode>,

    /// Only run scenarios whose name contains this text, ignoring case
    #[arg(short = 'f', long)]
    pub filter: Option<String>,

    /// The network routed to the tun device [default: 10.0.0.0/24]
    #[arg(long, value_parser = parse_network)]
    pub tun_network: Option<Ipv4Network>,

    /// The address of the tun device, used by the DUT sockets [default: 10.0.0.1]
    #[arg(long, value_parser = parse_addr)]
    pub dut_addr: Option<Ipv4Addr>,

    /// The address the peers send from [default: 10.0.0.2]
    #[arg(long, value_parser = parse_addr)]
    pub peer_addr: Option<Ipv4Addr>,

    /// The first port handed out to peers [default: 50000]
    #[arg(long)]
    pub peer_port_base: Option<u16>,

    /// The bound on a bounded DUT send or receive [default: 1s]
    #[arg(long, value_parser = parse_duration)]
    pub call_timeout: Option<Duration>,

    /// How long a peer waits for a datagram from the DUT [default: 1s]
    #[arg(long, value_parser = parse_duration)]
    pub expect_timeout: Option<Duration>,

    /// The deadline after which a scenario is cancelled [default: 10s]
    #[arg(long, value_parser = parse_duration)]
    pub scenario_timeout: Option<Duration>,

    /// The bound on closing a DUT socket [default: 1s]
    #[arg(long, value_parser = parse_duration)]
    pub teardown_timeout: Option<Duration>,

    /// The pause between injecting an ICMP error and detecting it [default: 20ms]
    #[arg(long, value_parser = parse_duration)]
    pub settle_delay: Option<Duration>,

    /// The UDP payload sent by the DUT and the peers [default: empty]
    #[arg(long)]
    pub payload: Option<String>,

    /// The maximum number of bytes read by a DUT receive [default: 100]
    #[arg(long)]
    pub max_recv_len: Option<usize>,

    /// The number of scenarios run concurrently [default: 1]
    #[arg(short = 'j', long, value_parser = parse_parallelism)]
    pub parallelism: Option<NonZeroUsize>,

    /// List the selected scenarios and exit
    #[arg(long)]
    pub list_scenarios: bool,

    /// Print a template toml config file and exit
    #[arg(long)]
    pub print_config_template: bool,

    /// The debug log format [default: pretty]
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// The debug log filter [default: rebound=debug]
    #[arg(long)]
    pub log_filter: Option<String>,

    /// The debug log span events [default: off]
    #[arg(long)]
    pub log_span_events: Option<LogSpanEvents>,

    /// Enable verbose debug logging
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

fn parse_duration(value: &str) -> anyhow::Result<Duration> {
    Ok(humantime::parse_duration(value)?)
}

fn parse_addr(value: &str) -> anyhow::Result<Ipv4Addr> {
    Ok(Ipv4Addr::from_str(value)?)
}

fn parse_network(value: &str) -> anyhow::Result<Ipv4Network> {
    Ok(Ipv4Network::from_str(value)?)
}

fn parse_parallelism(value: &str) -> anyhow::Result<NonZeroUsize> {
    Ok(NonZeroUsize::from_str(value)?)
}
