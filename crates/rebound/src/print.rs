use rebound_core::Matrix;
use std::process;

pub fn print_config_template() {
    println!("{}", include_str!("../rebound-config-sample.toml"));
    process::exit(0);
}

pub fn print_scenarios(matrix: &Matrix) {
    for scenario in matrix.scenarios() {
        println!("{scenario} (expected: {})", scenario.expected);
    }
    process::exit(0);
}
