use clap::{ArgAction, Parser, Subcommand};
use folio::pipeline::{self, BuildOptions};
use folio::{config, output};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

/// Exit status for a bad invocation: unusable input directory or config.
const EXIT_USAGE: u8 = 2;

/// Shared flags for commands that build pages.
#[derive(clap::Args, Clone)]
struct StrictArgs {
    /// Skip (and fail on) any document with an unresolved reference
    #[arg(long)]
    strict: bool,
}

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Static publisher for long-form technical essays")]
#[command(long_about = "\
Static publisher for long-form technical essays

Markdown documents with YAML or TOML front-matter become HTML pages. Every
local image, link and include is checked before anything is written.

Content structure:

  essays/
  ├── config.toml                          # Site config (optional)
  ├── _includes/
  │   └── cpu-table.html                   # {% include cpu-table.html %}
  ├── _posts/
  │   ├── 2026-01-20-virtual-dispatch.md   # Dated essay → virtual-dispatch.html
  │   └── 2026-01-24-x86-tso.md            # {% post_url 2026-01-20-virtual-dispatch %}
  ├── about.md                             # Undated page, listed last
  └── assets/
      └── vtable.png                       # Copied to the same path

Resolution (first available wins):
  Title: front-matter title → first '# ' heading → filename
  Date:  front-matter date → YYYY-MM-DD- filename prefix → none
  Slug:  front-matter slug → filename without date → title

Exit status: 0 success, 1 content errors, 2 invalid invocation.

Run 'folio gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Increase log detail on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate, render and publish the site
    Build {
        /// Input directory of documents and assets
        #[arg(long)]
        input: PathBuf,
        /// Output directory for the generated site
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        strict: StrictArgs,
        /// Ignore the output manifest and rewrite every file
        #[arg(long)]
        no_cache: bool,
    },
    /// Validate and render without writing anything
    Check {
        /// Input directory of documents and assets
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        strict: StrictArgs,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = match cli.command {
        Command::Build {
            input,
            output,
            strict,
            no_cache,
        } => {
            println!("==> Building {} → {}", input.display(), output.display());
            BuildOptions {
                input,
                output: Some(output),
                strict: strict.strict,
                use_cache: !no_cache,
            }
        }
        Command::Check { input, strict } => {
            println!("==> Checking {}", input.display());
            BuildOptions {
                input,
                output: None,
                strict: strict.strict,
                use_cache: false,
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return ExitCode::SUCCESS;
        }
    };

    match pipeline::build(&options) {
        Ok(report) => {
            output::print_report(&report);
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            eprintln!("error: {e}");
            if e.is_invocation() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Diagnostic logging on stderr. Warnings only by default.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
