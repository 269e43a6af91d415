use clap::{Parser, Subcommand};
use sitepipe::engine::Pipeline;
use sitepipe::{config, output, transformers};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup; called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "sitepipe")]
#[command(about = "Dependency-aware static content build pipeline")]
#[command(long_about = "\
Dependency-aware static content build pipeline

Every file under the source root runs through the transformers that accept
it, in the order they are configured, and lands in the destination. Files can
point at each other with @ref(path) tokens; each token is replaced with the
final URL of the referenced file once that file has been built.

Source structure:

  src/
  ├── _includes/          # Leading underscore = excluded, never built
  ├── public/             # Copied byte-for-byte (passthrough)
  │   └── favicon.svg
  ├── blog/
  │   └── first-post.md   # markdown → layout → blog/first-post.html
  ├── index.md            # markdown → layout → index.html
  └── index.css           # css-minify → index.css

Run 'sitepipe gen-config' to generate a documented sitepipe.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file; stock defaults are used when it does not exist
    #[arg(long, default_value = config::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Source directory (overrides the config file)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Output directory (overrides the config file)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Log debug detail for every transformer step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan, transform, and write the site
    Build,
    /// Run the whole pipeline without writing anything
    Check,
    /// Show which transformers each file will run through
    Plan,
    /// Print a stock sitepipe.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let site_config = config::load_config(&cli.config)?;
    init_thread_pool(&site_config.processing);
    let pipeline = build_pipeline(&cli, &site_config)?;

    match cli.command {
        Command::Build => {
            println!(
                "==> Building {} → {}",
                pipeline.config().source.display(),
                pipeline.config().destination.display()
            );
            let result = pipeline.build()?;
            output::print_build_result(&result, true);
            if !result.is_success() {
                return Err(format!("{} file(s) failed", result.errors.len()).into());
            }
        }
        Command::Check => {
            println!("==> Checking {}", pipeline.config().source.display());
            let result = pipeline.run()?;
            output::print_build_result(&result, false);
            if !result.is_success() {
                return Err(format!("{} file(s) failed", result.errors.len()).into());
            }
        }
        Command::Plan => {
            let plan = pipeline.plan()?;
            output::print_plan(&plan);
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Combine the config file with CLI overrides into a ready pipeline.
fn build_pipeline(
    cli: &Cli,
    site_config: &config::SiteConfig,
) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let base_dir = cli
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut build = site_config.build_config(base_dir)?;
    if let Some(source) = &cli.source {
        build.source = source.clone();
    }
    if let Some(output) = &cli.output {
        build.destination = output.clone();
    }

    let registry = transformers::registry_from_names(
        site_config.transformers.as_slice(),
        site_config.layout.as_ref(),
    )?;
    Ok(Pipeline::new(build, registry.freeze()))
}

/// Log to stderr so command output on stdout stays clean.
///
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool) {
    let default = if verbose { "sitepipe=debug" } else { "sitepipe=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
