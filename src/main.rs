use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use browser_e2e::{runner, RunConfig};

#[derive(Parser)]
#[command(name = "browser-e2e")]
#[command(version)]
#[command(about = "End-to-end browser test runner with Allure reports", long_about = None)]
struct Cli {
    /// Config file (defaults to ./e2e.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the spec files and generate the Allure report
    Run {
        /// Glob for spec files
        #[arg(short, long)]
        specs: Option<String>,

        /// Keep the browser visible
        #[arg(long = "show_browser", alias = "show-browser")]
        show_browser: bool,

        /// Open the report viewer after generation
        #[arg(long = "serve_report", alias = "serve-report")]
        serve_report: bool,

        /// Use a running WebDriver server instead of spawning chromedriver
        #[arg(long)]
        webdriver_url: Option<String>,
    },

    /// Generate the Allure report from existing results
    Report {
        /// Open the report viewer after generation
        #[arg(long)]
        serve: bool,
    },
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = RunConfig::load(cli.config.as_deref())?;
    init_logging(&config.log_level);
    let mut config = config.normalized();

    match cli.command {
        Commands::Run {
            specs,
            show_browser,
            serve_report,
            webdriver_url,
        } => {
            if let Some(specs) = specs {
                config.specs = specs;
            }
            config.show_browser |= show_browser;
            config.serve_report |= serve_report;
            if webdriver_url.is_some() {
                config.webdriver_url = webdriver_url;
            }

            println!("{} Running specs: {}", "▶".green().bold(), config.specs.cyan());
            println!(
                "  Browser: {} ({})",
                config.browser_name.cyan(),
                if config.headless() { "hidden" } else { "visible" }
            );
            println!(
                "  Results: {}",
                config.results_dir.display().to_string().cyan()
            );
            if config.serve_report {
                println!("  Serve report: {}", "Enabled".green());
            }

            let summary = runner::run_tests(&config).await?;
            if !summary.all_passed() {
                std::process::exit(1);
            }
        }

        Commands::Report { serve } => {
            config.serve_report |= serve;
            runner::generate_report(&config).await;
        }
    }

    Ok(())
}
