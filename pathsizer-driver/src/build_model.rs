// SPDX-License-Identifier: Apache-2.0

use crate::sizer_config::{get_convention, SizerConfig};
use anyhow::Context;
use clap::ArgMatches;
use pathsizer::liberty::TimingLibrary;
use pathsizer::path_model::{PathArtifact, PathModel};
use pathsizer::spef::SpefFile;
use pathsizer::SizerError;
use std::path::{Path, PathBuf};

fn is_liberty_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".lib") || name.ends_with(".lib.gz")
}

/// Explicit `--liberty` files, or every Liberty file directly inside
/// `--lib-dir` in name order.
fn collect_liberty_paths(matches: &ArgMatches) -> anyhow::Result<Vec<PathBuf>> {
    if let Some(files) = matches.get_many::<String>("liberty") {
        return Ok(files.map(PathBuf::from).collect());
    }
    let Some(dir) = matches.get_one::<String>("lib_dir") else {
        anyhow::bail!("one of --liberty or --lib-dir is required");
    };
    let mut paths = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read liberty directory {}", dir))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_liberty_file(&path) {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(SizerError::data(dir.as_str(), "no liberty files found").into());
    }
    paths.sort();
    Ok(paths)
}

pub fn handle_build_model(
    matches: &ArgMatches,
    config: &Option<SizerConfig>,
) -> anyhow::Result<()> {
    let convention = get_convention(matches, config)?;
    let path_json = matches
        .get_one::<String>("path_json")
        .context("--path-json is required")?;
    let output = matches
        .get_one::<String>("output")
        .context("--output is required")?;

    // Every input is opened before any stage is processed.
    let artifact = PathArtifact::from_path(Path::new(path_json))?;
    let spef = match matches.get_one::<String>("spef") {
        Some(path) => Some(SpefFile::from_path(Path::new(path))?),
        None => {
            log::warn!("no SPEF given; nets carry no wire parasitics");
            None
        }
    };
    let library = TimingLibrary::from_files(&collect_liberty_paths(matches)?)?;

    let model = PathModel::build(&artifact, &library, spef.as_ref(), convention)?;
    std::fs::write(output, model.to_json()?)
        .with_context(|| format!("write path model {}", output))?;
    println!(
        "wrote {}: {} stages, {} candidate assignments",
        output,
        model.stages.len(),
        model.choice_space_size()
    );
    for stage in &model.stages {
        let estimated = stage.choices.iter().filter(|c| c.c_in.is_estimate()).count();
        println!(
            "  {} {} ({} choices, {} estimated input caps)",
            stage.instance,
            stage.cell,
            stage.choices.len(),
            estimated
        );
    }
    Ok(())
}
