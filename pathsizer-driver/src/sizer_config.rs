// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use clap::ArgMatches;
use pathsizer::delay_model::DelayConvention;
use pathsizer::oracle::OracleConfig;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct TimingConfig {
    /// Which delay corners the fitted models describe.
    pub convention: Option<DelayConvention>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SizerConfig {
    #[serde(default)]
    pub timing: TimingConfig,

    /// The static timing tool that checks each candidate. Without it `solve`
    /// falls back to trusting the linear model.
    pub oracle: Option<OracleConfig>,
}

impl SizerConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("parse sizer config")
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read sizer config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// The delay convention from the command line flag, if given, otherwise from
/// the config, otherwise the default.
pub fn get_convention(
    matches: &ArgMatches,
    config: &Option<SizerConfig>,
) -> anyhow::Result<DelayConvention> {
    if let Some(text) = matches.get_one::<String>("convention") {
        return text.parse::<DelayConvention>().map_err(anyhow::Error::msg);
    }
    Ok(config
        .as_ref()
        .and_then(|c| c.timing.convention)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, ArgAction};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn parses_full_config() {
        let config = SizerConfig::from_toml_str(
            r#"
[timing]
convention = "min_max"

[oracle]
command = "/opt/OpenROAD/bin/sta"
setup_script = "setup_sta.tcl"
solution_path = "out/buffers.sol"
"#,
        )
        .unwrap();
        assert_eq!(config.timing.convention, Some(DelayConvention::MinMax));
        let oracle = config.oracle.unwrap();
        assert_eq!(oracle.command, "/opt/OpenROAD/bin/sta");
        assert_eq!(oracle.args, vec!["-no_init".to_string()]);
        assert_eq!(oracle.solution_path, Path::new("out/buffers.sol"));
        assert_eq!(oracle.hold_marker, "worst slack min");
    }

    #[test]
    fn empty_config_has_no_oracle() {
        let config = SizerConfig::from_toml_str("").unwrap();
        assert!(config.oracle.is_none());
        assert_eq!(config.timing.convention, None);
    }

    #[test]
    fn unknown_convention_is_rejected() {
        assert!(SizerConfig::from_toml_str("[timing]\nconvention = \"typical\"\n").is_err());
    }

    fn convention_matches(args: &[&str]) -> ArgMatches {
        clap::Command::new("build-model")
            .arg(
                Arg::new("convention")
                    .long("convention")
                    .action(ArgAction::Set),
            )
            .get_matches_from(std::iter::once("build-model").chain(args.iter().copied()))
    }

    #[test_case(&[], None, DelayConvention::Nominal; "default")]
    #[test_case(&[], Some("min_max"), DelayConvention::MinMax; "from config")]
    #[test_case(&["--convention", "nominal"], Some("min_max"), DelayConvention::Nominal; "flag overrides config")]
    #[test_case(&["--convention", "minmax"], None, DelayConvention::MinMax; "flag alias")]
    fn convention_precedence(args: &[&str], configured: Option<&str>, want: DelayConvention) {
        let config = configured.map(|c| {
            SizerConfig::from_toml_str(&format!("[timing]\nconvention = \"{}\"\n", c)).unwrap()
        });
        let got = get_convention(&convention_matches(args), &config).unwrap();
        assert_eq!(got, want);
    }

    #[test]
    fn bad_convention_flag_is_an_error() {
        let matches = convention_matches(&["--convention", "typical"]);
        assert!(get_convention(&matches, &None).is_err());
    }
}
