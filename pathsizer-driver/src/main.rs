// SPDX-License-Identifier: Apache-2.0

//! Command line driver for drive-strength selection on a timing path.
//!
//! Commands are given like:
//!
//! ```text
//! pathsizer-driver <global-options> <command> <command-args-and-options>
//! ```
//!
//! Commands are:
//!
//! - parse-liberty: Parses Liberty files and reports cell and family counts.
//! - build-model: Builds a path model from a path-extraction JSON, Liberty
//!   files and a SPEF file.
//! - solve: Searches for a passing assignment, checking candidates against
//!   the configured timing tool.
//! - estimate: Prints the modeled timing of an existing solution file.
//!
//! Sample usage:
//!
//! ```shell
//! $ pathsizer-driver build-model --path-json critical_path_data.json \
//!     --lib-dir platforms/sky130hd/lib --spef 6_final.spef \
//!     --output solver_input.json
//! $ pathsizer-driver --config pathsizer.toml solve --model solver_input.json
//! ```

mod build_model;
mod parse_liberty;
mod report_cli_error;
mod sizer_config;
mod solve;

use crate::sizer_config::SizerConfig;
use clap::{Arg, ArgAction};
use report_cli_error::{report_cli_error_and_exit, report_error_chain_and_exit};

trait AppExt {
    fn add_model_arg(self) -> Self;
    fn add_flag(self, id: &'static str, long: &'static str, help: &'static str) -> Self;
}

impl AppExt for clap::Command {
    fn add_model_arg(self) -> Self {
        self.arg(
            Arg::new("model")
                .long("model")
                .value_name("MODEL_JSON")
                .help("Path model written by build-model")
                .required(true)
                .action(ArgAction::Set),
        )
    }

    fn add_flag(self, id: &'static str, long: &'static str, help: &'static str) -> Self {
        self.arg(
            Arg::new(id)
                .long(long)
                .help(help)
                .action(ArgAction::SetTrue),
        )
    }
}

fn load_config(matches: &clap::ArgMatches) -> Option<SizerConfig> {
    let mut path = matches.get_one::<String>("config").map(std::path::PathBuf::from);

    // Without an explicit flag, pick up pathsizer.toml from the working
    // directory if there is one.
    if path.is_none() {
        let candidate = std::path::Path::new("pathsizer.toml");
        if candidate.exists() {
            log::info!("Using pathsizer.toml in current directory");
            path = Some(candidate.to_path_buf());
        }
    }

    path.map(|path| {
        if !path.exists() {
            report_cli_error_and_exit(
                "config file does not exist",
                None,
                vec![("path", &path.display().to_string())],
            );
        }
        match SizerConfig::from_path(&path) {
            Ok(config) => config,
            Err(e) => report_error_chain_and_exit("config", &e),
        }
    })
}

fn main() {
    let _ = env_logger::try_init();

    log::info!(
        "pathsizer-driver starting; version: {}",
        env!("CARGO_PKG_VERSION")
    );

    let matches = clap::Command::new("pathsizer-driver")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Drive-strength selection for timing-critical paths")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("CONFIG_TOML")
                .help("Path to a pathsizer.toml file")
                .action(ArgAction::Set),
        )
        .subcommand(clap::Command::new("version").about("Prints the version of the driver"))
        .subcommand(
            clap::Command::new("parse-liberty")
                .about("Parses Liberty files and reports what was found")
                .arg(
                    Arg::new("liberty_files")
                        .help("Liberty files (optionally .gz)")
                        .required(true)
                        .num_args(1..)
                        .action(ArgAction::Append),
                )
                .add_flag("families", "families", "List every drive-strength family"),
        )
        .subcommand(
            clap::Command::new("build-model")
                .about("Builds a path model for the solver")
                .arg(
                    Arg::new("path_json")
                        .long("path-json")
                        .value_name("PATH_JSON")
                        .help("Critical path JSON from the extraction script")
                        .required(true)
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("liberty")
                        .long("liberty")
                        .value_name("LIB")
                        .help("Liberty file; may be repeated")
                        .num_args(1..)
                        .action(ArgAction::Append)
                        .conflicts_with("lib_dir"),
                )
                .arg(
                    Arg::new("lib_dir")
                        .long("lib-dir")
                        .value_name("DIR")
                        .help("Directory whose .lib/.lib.gz files are all read")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("spef")
                        .long("spef")
                        .value_name("SPEF")
                        .help("Extracted parasitics for the design")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("convention")
                        .long("convention")
                        .value_name("CONVENTION")
                        .help("Delay convention: nominal or min_max")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_name("MODEL_JSON")
                        .help("Where to write the path model")
                        .required(true)
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            clap::Command::new("solve")
                .about("Selects one variant per stage that meets timing")
                .add_model_arg()
                .arg(
                    Arg::new("solution")
                        .long("solution")
                        .value_name("SOLUTION")
                        .help("Where to write the solution (default: buffers.sol)")
                        .action(ArgAction::Set),
                )
                .add_flag(
                    "dry_run",
                    "dry-run",
                    "Trust the linear model instead of running the timing tool",
                ),
        )
        .subcommand(
            clap::Command::new("estimate")
                .about("Prints the modeled timing of a solution file")
                .add_model_arg()
                .arg(
                    Arg::new("solution")
                        .long("solution")
                        .value_name("SOLUTION")
                        .required(true)
                        .action(ArgAction::Set),
                ),
        )
        .get_matches();

    let config = load_config(&matches);

    let result = match matches.subcommand() {
        Some(("parse-liberty", sub)) => parse_liberty::handle_parse_liberty(sub),
        Some(("build-model", sub)) => build_model::handle_build_model(sub, &config),
        Some(("solve", sub)) => solve::handle_solve(sub, &config),
        Some(("estimate", sub)) => solve::handle_estimate(sub),
        Some(("version", _)) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        _ => report_cli_error_and_exit("No valid subcommand provided.", None, vec![]),
    };
    if let Err(e) = result {
        let subcommand = matches.subcommand_name().unwrap_or("pathsizer-driver");
        report_error_chain_and_exit(subcommand, &e);
    }
}
