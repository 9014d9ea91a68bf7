mod cli;

use batchforge::{
    config,
    conversion::{BatchStatus, JobStatus, RunCoordinator, RunReport},
    server, state,
};
use batchforge_av::{build_transcoder, ToolRegistry};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // CLI flags win over the config file and PORT
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting batchforge server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let state = state::AppState::new();
    server::start_server(config, state).await
}

struct RunOverrides {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    batch_size: Option<usize>,
    engine: Option<batchforge_av::EngineKind>,
}

async fn run_conversion(config_path: Option<&Path>, overrides: RunOverrides, json: bool) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(engine) = overrides.engine {
        config.conversion.engine = engine;
    }

    let mut run_config = config.run_config();
    if let Some(input) = overrides.input {
        run_config.input_dir = input;
    }
    if let Some(output) = overrides.output {
        run_config.output_dir = output;
    }
    if let Some(batch_size) = overrides.batch_size {
        run_config.batch_size = batch_size;
    }

    let tools = ToolRegistry::discover(&config.tools);
    let transcoder = build_transcoder(
        config.conversion.engine,
        &tools,
        &config.conversion.engine_settings(),
    )
    .with_context(|| format!("Engine '{}' is not available", config.conversion.engine))?;

    let coordinator =
        RunCoordinator::new(transcoder).with_job_timeout(config.conversion.job_timeout());

    let report = coordinator.invoke(&run_config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    match report.halt_error() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn print_report(report: &RunReport) {
    let run = &report.run;
    println!(
        "Run {}: {} -> {}",
        run.id,
        run.input_directory.display(),
        run.output_directory.display()
    );

    for batch in &run.batches {
        let label = match batch.status {
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Aborted => "not started",
            BatchStatus::Pending => "pending",
            BatchStatus::InProgress => "in progress",
        };
        println!("\nBatch {} ({} files) - {}", batch.index, batch.len(), label);

        for job in &batch.jobs {
            let name = job
                .input_path()
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match job.status {
                JobStatus::Completed => println!("  ✓ {} -> {}", name, job.output_path().display()),
                JobStatus::Failed => println!(
                    "  ✗ {}: {}",
                    name,
                    job.error.as_deref().unwrap_or("unknown error")
                ),
                JobStatus::Cancelled => println!("  - {} (cancelled)", name),
                JobStatus::Queued | JobStatus::Running => println!("  · {}", name),
            }
        }
    }

    println!();
    println!("{} ({} ms)", report.message(), report.elapsed_ms);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "batchforge=trace,batchforge_av=trace,batchforge_common=debug,tower_http=debug".to_string()
        } else {
            "batchforge=info,batchforge_av=info,tower_http=info".to_string()
        }
    });

    // Logs go to stderr so `run --json` output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Run {
            input,
            output,
            batch_size,
            engine,
            json,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            let overrides = RunOverrides {
                input,
                output,
                batch_size,
                engine,
            };
            rt.block_on(run_conversion(cli.config.as_deref(), overrides, json))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate { file } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("batchforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All engine tools are available!");
    } else {
        println!(
            "Some tools are missing. The configured engine ({}) must be installed to run conversions.",
            config.conversion.engine
        );
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let run_config = config.run_config();
    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Input: {}", run_config.input_dir.display());
    println!("  Output: {}", run_config.output_dir.display());
    println!(
        "  Conversion: .{} -> .{} with {}",
        config.conversion.source_extension, config.conversion.target_extension, config.conversion.engine
    );
    println!("  Batch size: {}", config.conversion.batch_size);
    match config.conversion.job_timeout() {
        Some(t) => println!("  Job timeout: {}s", t.as_secs()),
        None => println!("  Job timeout: none"),
    }

    Ok(())
}
