// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Builds an `.isassetpackage` from files and directories.
//!
//! ```text
//! resource_packer <packagePath> <packageName> <input>... <outputPath>
//! ```

use clap::Parser;
use resource_engine::AssetPackage;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "resource_packer", about = "Pack assets into an asset package")]
struct Args {
    /// Package root; entry names are relative to it
    package_path: PathBuf,

    /// Package name, used for the archive name when the output is a directory
    package_name: String,

    /// Files or directories to add (directories are walked recursively)
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Archive file or directory to write to
    output_path: PathBuf,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let file_layer = match args.log_file.as_ref().map(File::create) {
        Some(Ok(file)) => Some(file),
        Some(Err(e)) => {
            eprintln!("cannot create log file: {e}");
            None
        }
        None => None,
    }
    .map(tracing_appender::non_blocking);
    let (file_writer, _guard) = match file_layer {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false)))
        .init();

    let mut package = AssetPackage::new(&args.package_path, &args.package_name);
    for input in &args.inputs {
        match package.add_path(input) {
            Ok(added) => tracing::info!(input = %input.display(), added, "input scanned"),
            Err(e) => tracing::error!(input = %input.display(), "skipping input: {e}"),
        }
    }

    match package.build(&args.output_path) {
        Ok(path) => {
            tracing::info!(output = %path.display(), assets = package.len(), "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("failed to build package: {e}");
            ExitCode::FAILURE
        }
    }
}
