//! Convert compiler dependency output into the graupel deplist format.

use {
    anyhow::Context,
    clap::{CommandFactory, Parser, ValueEnum},
    graupel_deps::{
        deplist,
        depfile::{Depfile, ParseOptions},
        showincludes,
    },
    graupel_util::logger::BasicLogger,
    std::{
        fs::{self, File},
        io::{self, Write},
        path::PathBuf,
        process::exit,
    },
};

/// Convert dependency output into the graupel deplist format.
#[derive(Parser)]
#[command(name = "graupel-deplist-helper")]
struct Args
{
    /// Input format: gcc Makefile-like output,
    /// or MSVC cl.exe /showIncludes output.
    #[arg(short = 'f', long = "format", value_enum,
          default_value_t = Format::Gcc)]
    format: Format,

    /// Write the deplist to FILE (default: stdout).
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// File holding the compiler output to convert.
    input: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format
{
    Gcc,
    Cl,
}

fn main() -> anyhow::Result<()>
{
    let args = Args::parse();

    let Some(input) = args.input
        else {
            Args::command().print_help().context("writing usage")?;
            exit(1);
        };

    let content = fs::read(&input)
        .with_context(|| format!("loading {}", input.display()))?;

    match args.format {
        Format::Gcc => {
            let depfile =
                Depfile::parse(content, &ParseOptions::default(), &BasicLogger)
                .with_context(|| format!("parsing {}", input.display()))?;
            let ins: Vec<&[u8]> = depfile.ins().collect();
            write_deplist(args.output.as_deref(), &ins)?;
        },
        Format::Cl => {
            let mut includes = Vec::new();
            let filtered = showincludes::filter(&content, &mut includes);
            io::stdout().write_all(&filtered)
                .context("writing filtered compiler output")?;
            write_deplist(args.output.as_deref(), &includes)?;
        },
    }

    Ok(())
}

fn write_deplist(output: Option<&std::path::Path>, paths: &[&[u8]])
    -> anyhow::Result<()>
{
    match output {
        Some(path) => {
            let mut file = File::create(path)
                .with_context(|| format!("opening {}", path.display()))?;
            deplist::write(&mut file, paths)
                .with_context(|| format!("writing {}", path.display()))?;
        },
        None => {
            deplist::write(&mut io::stdout().lock(), paths)
                .context("writing deplist")?;
        },
    }
    Ok(())
}
