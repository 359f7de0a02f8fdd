// SPDX-License-Identifier: Apache-2.0

use clap::ArgMatches;
use pathsizer::liberty::TimingLibrary;
use std::path::PathBuf;

pub fn handle_parse_liberty(matches: &ArgMatches) -> anyhow::Result<()> {
    let files: Vec<PathBuf> = matches
        .get_many::<String>("liberty_files")
        .into_iter()
        .flatten()
        .map(PathBuf::from)
        .collect();
    let library = TimingLibrary::from_files(&files)?;
    println!("cells: {}", library.cell_count());
    println!("families: {}", library.families().count());
    if matches.get_flag("families") {
        for family in library.families() {
            println!("  {}: {}", family.base, family.cell_names().join(" "));
        }
    }
    Ok(())
}
