use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use t16_compiler::sim::{self, DEFAULT_MAX_STEPS};
use t16_compiler::{compile_to_listing, CompileOptions, TargetKind};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Parser)]
#[command(name = "t16c")]
#[command(about = "A C-subset compiler for the T16 register machine")]
struct Args {
    /// Path to the source file to compile ("-" reads stdin; omitted uses a built-in sample)
    file: Option<PathBuf>,

    /// Emit the debug trace of abstract operations instead of T16 assembly
    #[arg(long)]
    trace: bool,

    /// Run the program on the reference interpreter and print its exit value
    #[arg(long, conflicts_with = "trace")]
    run: bool,

    /// Write the listing here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    werror: bool,

    /// Log compiler internals (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Step budget for --run
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    max_steps: u64,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).without_time())
        .init();
}

fn read_source(file: &Option<PathBuf>) -> Result<(String, String)> {
    match file {
        Some(path) if path.as_os_str() == "-" => {
            let mut src = String::new();
            std::io::stdin()
                .read_to_string(&mut src)
                .context("reading stdin")?;
            Ok((src, "<stdin>".to_string()))
        }
        Some(path) => {
            let src = fs::read_to_string(path)
                .with_context(|| format!("reading '{}'", path.display()))?;
            Ok((src, path.display().to_string()))
        }
        None => Ok((DEFAULT_SAMPLE.trim().to_string(), "<sample>".to_string())),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let (src, file_name) = read_source(&args.file)?;
    let options = CompileOptions {
        target: if args.trace {
            TargetKind::Trace
        } else {
            TargetKind::T16
        },
        file_name,
        warnings_as_errors: args.werror,
    };

    let compilation = compile_to_listing(&src, &options)?;
    for diagnostic in &compilation.diagnostics {
        eprintln!("{diagnostic}");
    }
    if compilation.errors > 0 {
        bail!("{} error(s), {} warning(s)", compilation.errors, compilation.warnings);
    }
    if args.werror && compilation.warnings > 0 {
        bail!("{} warning(s) treated as errors", compilation.warnings);
    }

    let text = compilation.listing.to_string();
    match &args.output {
        Some(path) => fs::write(path, &text)
            .with_context(|| format!("writing '{}'", path.display()))?,
        None => print!("{text}"),
    }

    if args.run {
        let (outcome, _) = sim::execute(&compilation.listing, args.max_steps)
            .context("running the program")?;
        println!("exit value: {} ({} steps)", outcome.exit_value, outcome.steps);
    }
    Ok(())
}

const DEFAULT_SAMPLE: &str = r#"
int table[8];

int square(int n) {
    return n * n;
}

void fill(int count) {
    int i;
    for (i = 0; i < count; i = i + 1) {
        table[i] = square(i);
    }
}

int main() {
    int sum;
    int i;
    fill(8);
    sum = 0;
    i = 0;
    while (i < 8) {
        sum = sum + table[i];
        i = i + 1;
    }
    return sum % 100;
}
"#;
