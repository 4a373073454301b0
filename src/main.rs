use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use testpanel::config::Config;
use testpanel::panel::{PanelClient, TestStatus};

#[derive(Parser)]
#[command(
    name = "testpanel",
    about = "Dashboard backend and client for Playwright test jobs on Jenkins",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dashboard backend (JSON API + Jenkins adapter)
    Serve {
        /// Bind address override
        #[arg(long)]
        bind: Option<String>,
    },

    /// List the test catalog known to a running backend
    List {
        /// Backend base URL
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,
    },

    /// Trigger one test and follow it to its verdict
    Run {
        /// Catalog path of the test, e.g. tests/checkout.spec.ts
        #[arg(long)]
        test: String,

        /// Label to track the run under; defaults to the catalog name
        #[arg(long)]
        name: Option<String>,

        /// Backend base URL
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,

        /// In-flight job journal
        #[arg(long, default_value = "ongoingTests.json")]
        journal: PathBuf,
    },

    /// Run every catalog test sequentially via the backend
    RunAll {
        /// Backend base URL
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,
    },

    /// Resume journaled jobs and mirror in-progress builds live
    Watch {
        /// Backend base URL
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,

        /// In-flight job journal
        #[arg(long, default_value = "ongoingTests.json")]
        journal: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_or_default();

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "starting testpanel backend");
            testpanel::serve(config).await?;
        }

        Commands::List { server } => {
            let client = panel_client(&server, &config, Path::new("ongoingTests.json"))?;
            let tests = client.fetch_test_list().await?;
            if tests.is_empty() {
                println!("No tests in the catalog.");
            } else {
                println!("{:<25} | {:<40} | Description", "Name", "Path");
                println!("{:-<25}-|-{:-<40}-|-{:-<30}", "", "", "");
                for test in tests {
                    println!(
                        "{:<25} | {:<40} | {}",
                        test.name,
                        test.path,
                        test.description.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        Commands::Run {
            test,
            name,
            server,
            journal,
        } => {
            let client = panel_client(&server, &config, &journal)?;
            let test_id = match name {
                Some(name) => name,
                None => resolve_name(&client, &test).await,
            };

            tracing::info!(test = %test_id, path = %test, "triggering test");
            let (status, message) = client.run_to_verdict(&test, &test_id).await?;

            println!("\n{} : {}", test_id, status.to_string().to_uppercase());
            if !message.is_empty() {
                println!("{}", message);
            }
            if status == TestStatus::Failure {
                std::process::exit(1);
            }
        }

        Commands::RunAll { server } => {
            let client = panel_client(&server, &config, Path::new("ongoingTests.json"))?;
            println!("Running all catalog tests, this can take a while...");
            let results = client.run_all().await?;

            println!("\n{:<25} | Result", "Test");
            println!("{:-<25}-|-{:-<8}", "", "");
            let mut all_passed = true;
            for entry in &results {
                all_passed &= entry.result;
                println!(
                    "{:<25} | {}",
                    entry.test_name,
                    if entry.result { "SUCCESS" } else { "FAILURE" }
                );
            }
            println!(
                "\nBatch outcome: {}",
                if all_passed { "SUCCESS" } else { "FAILURE" }
            );
            if !all_passed {
                std::process::exit(1);
            }
        }

        Commands::Watch { server, journal } => {
            let client = panel_client(&server, &config, &journal)?;
            client.resume().await;
            let refresh = client.spawn_refresh_loop();

            println!("Watching test runs (Ctrl-C to stop)...");
            let mut last: Vec<(String, TestStatus)> = Vec::new();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        let snapshot = client.snapshot();
                        for (test_id, status) in &snapshot {
                            let previous = last
                                .iter()
                                .find(|(id, _)| id == test_id)
                                .map(|(_, s)| *s);
                            if previous != Some(*status) {
                                println!("{:<25} -> {}", test_id, status.to_string().to_uppercase());
                            }
                        }
                        last = snapshot;
                    }
                }
            }

            refresh.abort();
            client.shutdown();
            println!("Stopped.");
        }
    }

    Ok(())
}

fn panel_client(server: &str, config: &Config, journal: &Path) -> Result<PanelClient> {
    PanelClient::new(
        server,
        journal,
        &config.monitor,
        &config.screenshots.base_url,
    )
}

/// Best effort: use the catalog name for a test path so the run shows up
/// under the same label the dashboard uses.
async fn resolve_name(client: &PanelClient, test_path: &str) -> String {
    match client.fetch_test_list().await {
        Ok(tests) => testpanel::catalog::name_for_path(&tests, test_path),
        Err(_) => test_path.to_string(),
    }
}
