use std::path::Path;

use clap::{
    app_from_crate, crate_authors, crate_description, crate_name, crate_version, AppSettings, Arg,
    ArgMatches, SubCommand,
};
use log::debug;

use mpq_engine::driver;
use mpq_engine::{Error, FormatVersion};

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .setting(AppSettings::SubcommandRequired)
        .setting(AppSettings::DisableHelpSubcommand)
        .setting(AppSettings::GlobalVersion)
        .setting(AppSettings::ColorNever)
        .subcommand(
            SubCommand::with_name("list")
                .about("lists the files in an archive")
                .arg(
                    Arg::with_name("archive")
                        .index(1)
                        .value_name("archive")
                        .help("archive file to list")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("search")
                        .value_name("pattern")
                        .short("s")
                        .long("search")
                        .help("only list files whose name contains the pattern, ignoring case")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("extract")
                .about("extracts files from an archive")
                .arg(
                    Arg::with_name("archive")
                        .index(1)
                        .value_name("archive")
                        .help("archive file to extract from")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("output")
                        .value_name("dir")
                        .short("o")
                        .long("output")
                        .help("directory where to output extracted files")
                        .default_value("./")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("file")
                        .value_name("filename")
                        .long("file")
                        .short("f")
                        .help("if specified, will only extract this file")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("create")
                .about("creates an archive from a directory")
                .arg(
                    Arg::with_name("directory")
                        .index(1)
                        .value_name("dir")
                        .help("directory whose files will be archived")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("version")
                        .value_name("version")
                        .short("v")
                        .long("format-version")
                        .help("archive format version")
                        .possible_values(&["1", "2"])
                        .default_value("1")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("output")
                        .value_name("file")
                        .short("o")
                        .long("output")
                        .help("archive to write, defaults to <dir>.mpq")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("add")
                .about("adds a file to an existing archive")
                .arg(
                    Arg::with_name("archive")
                        .index(1)
                        .value_name("archive")
                        .help("archive file to add to")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("file")
                        .index(2)
                        .value_name("file")
                        .help("file to add")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("path")
                        .value_name("path")
                        .short("p")
                        .long("path")
                        .help("name of the file inside the archive, defaults to its file name")
                        .takes_value(true),
                ),
        )
        .get_matches_safe();

    let result = match matches {
        Err(error) => error.exit(),
        Ok(matches) => match matches.subcommand() {
            ("list", Some(matches)) => command_list(matches),
            ("extract", Some(matches)) => command_extract(matches),
            ("create", Some(matches)) => command_create(matches),
            ("add", Some(matches)) => command_add(matches),
            (cmd, _) => {
                eprintln!("Unknown subcommand {} encountered", cmd);
                std::process::exit(1)
            }
        },
    };

    if let Err(error) = result {
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}

// clap enforces required arguments and defaults, so lookups below can't miss
fn arg<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches.value_of(name).unwrap_or_default()
}

fn command_list(matches: &ArgMatches) -> Result<(), Error> {
    let archive = arg(matches, "archive");

    let files = match matches.value_of("search") {
        Some(pattern) => driver::search_files(archive, pattern)?,
        None => driver::list_files(archive)?,
    };

    for file in files {
        println!("{}", file);
    }

    Ok(())
}

fn command_extract(matches: &ArgMatches) -> Result<(), Error> {
    let archive = arg(matches, "archive");
    let output = Path::new(arg(matches, "output"));

    if let Some(file) = matches.value_of("file") {
        let path = driver::extract_one(archive, file, Some(output))?;
        debug!("wrote {}", path.display());
        return Ok(());
    }

    let report = driver::extract_all(archive, output)?;
    for (name, size) in &report.extracted {
        debug!("{} ({} bytes)", name, size);
    }

    if !report.is_complete() {
        for (name, error) in &report.failed {
            eprintln!("failed to extract {}: {}", name, error);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn command_create(matches: &ArgMatches) -> Result<(), Error> {
    let directory = arg(matches, "directory");
    let version = match arg(matches, "version") {
        "2" => FormatVersion::V2,
        _ => FormatVersion::V1,
    };
    let output = matches.value_of("output").map(Path::new);

    let path = driver::create_archive(directory, version, output)?;
    println!("{}", path.display());

    Ok(())
}

fn command_add(matches: &ArgMatches) -> Result<(), Error> {
    let archive = arg(matches, "archive");
    let file = Path::new(arg(matches, "file"));

    driver::add_files(archive, &[(file, matches.value_of("path"))])
}
