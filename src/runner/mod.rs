pub mod events;
pub mod executor;
pub mod hooks;
pub mod state;

use anyhow::Result;
use colored::Colorize;

use crate::driver::{service, BrowserSession, ChromedriverService, WebDriverClient};
use crate::parser::{discover_specs, parse_spec_file, SpecFile};
use crate::report::{AllureCli, AllureReporter};
use crate::utils::RunConfig;

pub use events::*;
pub use executor::TestExecutor;
pub use hooks::{CompletionOutcome, RunHooks};
pub use state::*;

/// Run all specs matched by the config and build the report.
///
/// Teardown and report generation run even when the run itself failed.
pub async fn run_tests(config: &RunConfig) -> Result<RunSummary> {
    let files = discover_specs(&config.specs)?;
    let specs = files
        .iter()
        .map(|f| parse_spec_file(f))
        .collect::<Result<Vec<_>>>()?;

    let reporter = AllureReporter::new(&config.results_dir)?;
    reporter.write_environment(&[
        ("browser", config.browser_name.clone()),
        ("headless", config.headless().to_string()),
        ("specs", config.specs.clone()),
    ])?;

    let hooks = RunHooks::new(config, Box::new(AllureCli::default()));
    let mut executor = TestExecutor::new(config.clone(), hooks, reporter);

    let mut slot: Option<Box<dyn BrowserSession>> = None;
    let mut driver_service: Option<ChromedriverService> = None;

    let outcome = open_and_run(config, &mut executor, &mut slot, &mut driver_service, &specs).await;
    if let Err(ref e) = outcome {
        println!("{} Run aborted: {:#}", "❌".red(), e);
    }

    let teardown = executor.teardown(&mut slot).await;
    if let Some(service) = driver_service {
        if let Err(e) = service.stop().await {
            log::warn!("{:#}", e);
        }
    }

    executor.complete().await;

    outcome?;
    teardown?;
    Ok(executor.summary().clone())
}

/// Start the WebDriver endpoint, open the first session and run every spec
async fn open_and_run(
    config: &RunConfig,
    executor: &mut TestExecutor,
    slot: &mut Option<Box<dyn BrowserSession>>,
    driver_service: &mut Option<ChromedriverService>,
    specs: &[SpecFile],
) -> Result<()> {
    let (endpoint, spawned) = service::resolve_endpoint(config).await?;
    *driver_service = spawned;

    let mut client = WebDriverClient::new(&endpoint, config)?;
    client.new_session().await?;
    *slot = Some(Box::new(client));

    executor.run_specs(slot, specs).await
}

/// Only build the report from existing raw results
pub async fn generate_report(config: &RunConfig) -> CompletionOutcome {
    RunHooks::new(config, Box::new(AllureCli::default()))
        .on_complete()
        .await
}
