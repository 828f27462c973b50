// Copyright 2026 Magpie Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use magpie::cli;

#[derive(Parser)]
#[command(
    name = "magpie",
    about = "Archive Mighty Networks discussion threads into JSON and an Obsidian vault",
    version,
    after_help = "Run 'magpie <command> --help' for details on each command.\nCredentials are read from MAGPIE_* environment variables or a .env file."
)]
struct Cli {
    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture discussion threads into JSON archives
    Scrape {
        /// Thread URLs to capture
        urls: Vec<String>,
        /// File with one thread URL per line (# starts a comment)
        #[arg(long)]
        urls_file: Option<PathBuf>,
        /// Also render each capture into the vault
        #[arg(long)]
        vault: bool,
    },
    /// Render captured JSON archives into vault notes
    Convert {
        /// A single capture file (omit to convert every capture)
        capture: Option<PathBuf>,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.quiet {
        std::env::set_var("MAGPIE_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("MAGPIE_VERBOSE", "1");
    }
    cli::init_tracing();

    let result = match cli.command {
        Commands::Scrape {
            urls,
            urls_file,
            vault,
        } => cli::scrape_cmd::run(urls, urls_file.as_deref(), vault).await,
        Commands::Convert { capture } => cli::convert_cmd::run(capture.as_deref()).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "magpie", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
