//! Vultra - command-line entry point

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use vultra::{
    Config,
    application::{ApplicationError, ResolutionPipeline, VulnerabilityError, render_json, render_text},
    domain::{Ecosystem, ResolutionReport},
    infrastructure::{
        AdapterFactory, AdvisorySource, GhsaClient, MultiplexRegistryClient, NvdClient,
        PackageRegistryClient, RetryConfig,
    },
    init_tracing,
};

/// Resolve known vulnerabilities across a project's dependency tree
#[derive(Parser, Debug)]
#[command(name = "vultra", version, about)]
struct Cli {
    /// Package ecosystem of the manifest (mvn or npm); inferred from the file name when omitted
    #[arg(short, long)]
    ecosystem: Option<Ecosystem>,

    /// Path to the manifest (pom.xml or package.json)
    #[arg(short, long)]
    file: PathBuf,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value = "json")]
    format: ReportFormat,

    /// Exit with status 1 when any dependency is vulnerable
    #[arg(long)]
    fail_on_vulnerable: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ReportFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(report) if cli.fail_on_vulnerable && report.has_vulnerabilities() => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Resolution failed");
            eprintln!("{}", e.to_json());
            ExitCode::from(2)
        }
    }
}

async fn run(cli: &Cli) -> Result<ResolutionReport, ApplicationError> {
    let config = Config::load().map_err(|e| ApplicationError::Configuration {
        message: e.to_string(),
    })?;
    config
        .validate()
        .map_err(|message| ApplicationError::Configuration { message })?;
    init_tracing(&config.logging).map_err(|e| ApplicationError::Configuration {
        message: format!("failed to initialize logging: {}", e),
    })?;

    if config.apis.ghsa.token.as_deref().is_none_or(str::is_empty) {
        return Err(ApplicationError::Configuration {
            message: "GitHub token missing; set GITHUB_ACCESS_TOKEN or apis.ghsa.token".to_string(),
        });
    }

    let ecosystem = resolve_ecosystem(cli)?;
    tracing::info!(
        ecosystem = %ecosystem,
        manifest = %cli.file.display(),
        "Starting vultra"
    );

    let adapter = AdapterFactory::system(config.tools.clone()).create_adapter(ecosystem);
    let root = adapter.build(&cli.file).await?;

    let retry = RetryConfig::with_attempts(config.resolution.retry_attempts);
    let registry: Arc<dyn PackageRegistryClient> = Arc::new(
        MultiplexRegistryClient::new(&config.apis.registries).map_err(VulnerabilityError::from)?,
    );
    let sources: Vec<Arc<dyn AdvisorySource>> = vec![
        Arc::new(GhsaClient::new(config.apis.ghsa.clone(), retry.clone())?),
        Arc::new(NvdClient::new(config.apis.nvd.clone(), retry, registry)?),
    ];

    let pipeline = ResolutionPipeline::from_config(ecosystem, sources, &config.resolution);
    let report = pipeline.resolve(&root).await?;

    let rendered = match cli.format {
        ReportFormat::Json => render_json(&report)?,
        ReportFormat::Text => render_text(&report),
    };
    match &cli.output {
        Some(path) => {
            tokio::fs::write(path, rendered).await?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => println!("{}", rendered),
    }

    Ok(report)
}

/// The explicit `--ecosystem`, or the one the manifest's file name implies
fn resolve_ecosystem(cli: &Cli) -> Result<Ecosystem, ApplicationError> {
    cli.ecosystem
        .or_else(|| AdapterFactory::detect_ecosystem(&cli.file))
        .ok_or_else(|| ApplicationError::Configuration {
            message: format!(
                "cannot infer the ecosystem of {}; pass --ecosystem",
                cli.file.display()
            ),
        })
}
