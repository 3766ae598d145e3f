use mixweave::*;

use clap::{Arg, ArgAction, Command};
use std::fs::File;
use std::io;
use std::path::PathBuf;

fn main() -> Result<(), weave::Error> {
    env_logger::init();

    let matches = Command::new("mixweave")
        .version(clap::crate_version!())
        .about("Weaves mixin patches into the methods of a stack machine program")
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("PATH")
                .help("Where to write the woven program (defaults to stdout)"),
        )
        .arg(
            Arg::new("dump patches")
                .long("dump-patches")
                .value_name("PATH")
                .help("Write a JSON snapshot of every scanned patch"),
        )
        .arg(
            Arg::new("debug markers")
                .long("debug-markers")
                .action(ArgAction::SetTrue)
                .help("Annotate the boundaries of every spliced region"),
        )
        .arg(
            Arg::new("disassemble")
                .long("disassemble")
                .action(ArgAction::SetTrue)
                .help("Print the patched method bodies to stderr"),
        )
        .arg(
            Arg::new("MANIFEST")
                .help("JSON file with the program and the mixins to weave into it")
                .required(true)
                .index(1),
        )
        .get_matches();

    let mut settings = weave::Settings::new();
    settings.debug_markers = matches.get_flag("debug markers");
    settings.dump_path = matches.get_one::<String>("dump patches").map(PathBuf::from);

    let manifest_path = matches
        .get_one::<String>("MANIFEST")
        .map(PathBuf::from)
        .unwrap_or_default();
    log::info!("Reading '{}'", manifest_path.display());
    let mut manifest = manifest::Manifest::from_path(&manifest_path)?;

    let report = weave::Weaver::new(&mut manifest.program, settings).weave(&manifest.mixins)?;
    for (patch, count) in &report.injection_counts {
        log::info!("{} applied {} times", patch, count);
    }
    if matches.get_flag("disassemble") {
        for method in &report.patched_methods {
            if let Some(code) = vm::Host::method_body(&manifest.program, method) {
                eprintln!("{}:\n{}", method, code);
            }
        }
    }

    match matches.get_one::<String>("output") {
        Some(output) => {
            log::info!("Writing '{}'", output);
            manifest::write_program(&manifest.program, File::create(output)?)?;
        }
        None => manifest::write_program(&manifest.program, io::stdout().lock())?,
    }

    Ok(())
}
