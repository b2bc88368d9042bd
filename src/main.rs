use anyhow::{Context, Error, Result};
use bstr::ByteSlice;
use camino::Utf8PathBuf;
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use ipmeta::input::{for_each_line, FileOrStdin};
use ipmeta::{output, pfx2as, Engine, IndexKind, IndexRegistry, ProviderMask, RecordSet};

/// Check if the error chain contains a broken pipe error.
#[inline(always)]
fn is_broken_pipe(err: &Error) -> bool {
    let broken = |io_err: &io::Error| io_err.kind() == io::ErrorKind::BrokenPipe;
    for cause in err.chain() {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if broken(io_err) {
                return true;
            }
        }
        if let Some(ipmeta::Error::Io(io_err)) = cause.downcast_ref::<ipmeta::Error>() {
            if broken(io_err) {
                return true;
            }
        }
    }
    false
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Prefix index backend. Use --list-backends to see the choices
    #[clap(short, long, env = "IPMETA_BACKEND", default_value = "patricia")]
    backend: String,

    /// Load a CAIDA RouteViews prefix-to-AS file and enable the pfx2as provider
    #[clap(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pfx2as: Option<Utf8PathBuf>,

    /// Read queries, one per line, from FILE. Use "-" for stdin
    #[clap(short = 'f', long = "file", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    file: Option<Utf8PathBuf>,

    /// Only report these providers (comma separated names)
    #[clap(short = 'm', long, value_name = "NAMES", value_delimiter = ',')]
    providers: Vec<String>,

    /// Output one JSON object per match
    #[clap(long)]
    json: bool,

    /// Print a header line before the results
    #[clap(long, conflicts_with = "json")]
    headers: bool,

    /// List available index backends
    #[clap(long)]
    list_backends: bool,

    /// List known providers
    #[clap(long)]
    list_providers: bool,

    /// Log level (trace / debug / info / warn / error)
    #[clap(long, default_value = "warn")]
    log_level: String,

    /// Addresses or prefixes to look up, e.g. 8.8.8.8 or 8.8.0.0/16. Reads
    /// stdin when neither queries nor --file are given
    #[clap(value_name = "QUERY")]
    queries: Vec<String>,
}

fn main() -> ExitCode {
    // Use a separate run function to handle the actual work
    let err = match run_main() {
        Ok(code) => return code,
        Err(err) => err,
    };

    // Handle broken pipe errors gracefully
    if is_broken_pipe(&err) {
        return ExitCode::SUCCESS;
    }

    // Print detailed error information based on environment variables
    let mut stderr = io::stderr();
    let _ = if std::env::var("RUST_BACKTRACE").is_ok_and(|v| v == "1")
        && std::env::var("RUST_LIB_BACKTRACE").map_or(true, |v| v == "1")
    {
        writeln!(stderr, "{:?}", err)
    } else {
        writeln!(stderr, "{:#}", err)
    };

    ExitCode::FAILURE
}

fn run_main() -> Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if args.list_backends {
        let registry = IndexRegistry::default();
        for name in registry.available_backends() {
            let description = name
                .parse::<IndexKind>()
                .map(IndexKind::description)
                .unwrap_or_default();
            println!("{}\t{}", name, description);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut engine = Engine::from_backend_name(&args.backend)
        .with_context(|| format!("cannot use backend '{}'", args.backend))?;

    if args.list_providers {
        for provider in engine.providers() {
            println!(
                "{}\t{}\t{}",
                provider.id(),
                provider.name(),
                provider.description()
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(path) = &args.pfx2as {
        let source = FileOrStdin::from_path(path.clone());
        pfx2as::load_from(&mut engine, &source)
            .with_context(|| format!("failed to load pfx2as data from {}", source))?;
    }
    if engine.enabled_mask().is_empty() {
        tracing::warn!("no providers loaded, every lookup will be empty");
    }

    let mut mask = ProviderMask::EMPTY;
    for name in &args.providers {
        let provider = engine
            .provider_by_name(name)
            .with_context(|| format!("unknown provider '{}'", name))?;
        if !engine.is_enabled(provider.id()) {
            tracing::warn!(
                provider = name.as_str(),
                "provider is not loaded, it will match nothing"
            );
        }
        mask.insert(provider.id());
    }

    run(args, &engine, mask)?;
    Ok(ExitCode::SUCCESS)
}

/// Looks up queries and writes their matches.
struct Lookup<'a, W> {
    engine: &'a Engine,
    mask: ProviderMask,
    json: bool,
    out: RecordSet,
    wtr: W,
}

impl<W: Write> Lookup<'_, W> {
    fn query(&mut self, query: &str) -> io::Result<()> {
        let query = query.trim();
        if query.is_empty() || query.starts_with('#') {
            return Ok(());
        }
        if let Err(err) = self.engine.lookup_str(query, self.mask, &mut self.out) {
            tracing::warn!(query, error = %err, "skipping query");
            return Ok(());
        }
        for found in self.engine.resolve(&self.out) {
            if self.json {
                output::write_match_json(&mut self.wtr, query, &found)?;
            } else {
                output::write_match(&mut self.wtr, query, &found)?;
            }
        }
        Ok(())
    }
}

#[inline(always)]
fn run(args: Args, engine: &Engine, mask: ProviderMask) -> Result<()> {
    let mut lookup = Lookup {
        engine,
        mask,
        json: args.json,
        out: RecordSet::with_capacity(ipmeta::MAX_PROVIDERS),
        wtr: io::BufWriter::with_capacity(65536, io::stdout()),
    };

    if args.headers {
        writeln!(lookup.wtr, "{}", output::header())?;
    }

    for query in &args.queries {
        lookup.query(query)?;
    }

    let file = match (args.file, args.queries.is_empty()) {
        (Some(path), _) => Some(FileOrStdin::from_path(path)),
        (None, true) => Some(FileOrStdin::Stdin),
        (None, false) => None,
    };
    if let Some(file) = file {
        let reader = file.reader()?;
        for_each_line(reader, |line_no, line| {
            match line.to_str() {
                Ok(query) => lookup.query(query)?,
                Err(_) => tracing::warn!(line = line_no, source = %file, "skipping non UTF-8 line"),
            }
            Ok(())
        })
        .with_context(|| format!("failed reading queries from {}", file))?;
    }

    lookup.wtr.flush()?;
    Ok(())
}
