#![warn(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::option_if_let_else,
    clippy::missing_const_for_fn,
    clippy::cast_possible_truncation,
    clippy::redundant_pub_crate,
    clippy::struct_excessive_bools
)]
#![forbid(unsafe_code)]

use crate::config::ReboundAction;
use clap::Parser;
use config::Args;
use rebound_privilege::Privilege;
use std::process;

mod app;
mod config;
mod print;
mod report;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let privilege = Privilege::acquire_privileges()?;
    match ReboundAction::from(args, &privilege)? {
        ReboundAction::Run(cfg) => {
            if !app::run_rebound(&cfg)? {
                process::exit(1);
            }
        }
        ReboundAction::ListScenarios(matrix) => print::print_scenarios(&matrix),
        ReboundAction::PrintConfigTemplate => print::print_config_template(),
    }
    Ok(())
}
