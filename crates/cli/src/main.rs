use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scaffold_code_merge::{DbProvider, Orchestrator, ScaffoldRequest, BUILTIN_SCENARIOS};
use std::path::PathBuf;

mod project;
mod report;

#[derive(Parser)]
#[command(name = "scaffold")]
#[command(about = "Merge scaffolded registrations into C# entry-point files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add Identity registration and middleware
    Identity(IdentityArgs),

    /// Add an endpoints mapping, optionally with a data context
    #[command(name = "minimal-api")]
    MinimalApi(MinimalApiArgs),

    /// Add a data context and controller routing
    #[command(name = "ef-controller")]
    EfController(EfControllerArgs),

    /// List built-in scenarios
    Scenarios,
}

#[derive(Args)]
struct ProjectArgs {
    /// Project directory containing the .csproj
    #[arg(short, long, default_value = ".")]
    project: PathBuf,

    /// Suggest prerelease package installs
    #[arg(long)]
    prerelease: bool,

    /// Report missing packages as notes instead of failing
    #[arg(long)]
    ide_mode: bool,

    /// Treat a package as referenced (repeatable)
    #[arg(long = "package", value_name = "ID")]
    packages: Vec<String>,

    /// Extra scenario flag for option gates (repeatable)
    #[arg(long = "flag", value_name = "NAME")]
    flags: Vec<String>,

    /// Directory with <scenario>.json / <scenario>.toml overrides
    #[arg(long)]
    spec_dir: Option<PathBuf>,

    /// Log unresolved anchors as warnings
    #[arg(long)]
    strict_anchors: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DataArgs {
    /// Data context class name
    #[arg(long = "context", value_name = "CLASS")]
    context: Option<String>,

    /// Database provider: sqlserver | sqlite | postgres
    #[arg(long, value_parser = parse_provider)]
    provider: Option<DbProvider>,

    /// Connection string key (default: <Context>Connection)
    #[arg(long)]
    connection_key: Option<String>,
}

#[derive(Args)]
struct IdentityArgs {
    #[command(flatten)]
    project: ProjectArgs,

    #[command(flatten)]
    data: DataArgs,

    /// User class name
    #[arg(long = "user", value_name = "CLASS")]
    user: Option<String>,
}

#[derive(Args)]
struct MinimalApiArgs {
    #[command(flatten)]
    project: ProjectArgs,

    #[command(flatten)]
    data: DataArgs,

    /// Model class whose endpoints are mapped
    #[arg(long = "model", value_name = "CLASS")]
    model: Option<String>,
}

#[derive(Args)]
struct EfControllerArgs {
    #[command(flatten)]
    project: ProjectArgs,

    #[command(flatten)]
    data: DataArgs,

    /// Model class the controller serves
    #[arg(long = "model", value_name = "CLASS")]
    model: Option<String>,
}

fn parse_provider(raw: &str) -> Result<DbProvider, String> {
    raw.parse().map_err(|e: scaffold_code_merge::MergeError| e.to_string())
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();

    let json_output = match &cli.command {
        Commands::Identity(args) => args.project.json,
        Commands::MinimalApi(args) => args.project.json,
        Commands::EfController(args) => args.project.json,
        Commands::Scenarios => false,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Identity(args) => {
            let mut request = request("identity", &args.project, &args.data)?;
            request.user_class = args.user;
            request.ef_scenario = args.data.provider.is_some();
            run(request, &args.project)?;
        }
        Commands::MinimalApi(args) => {
            let mut request = request("minimalApi", &args.project, &args.data)?;
            request.model_class = args.model;
            request.ef_scenario = args.data.provider.is_some();
            run(request, &args.project)?;
        }
        Commands::EfController(args) => {
            let mut request = request("efController", &args.project, &args.data)?;
            request.model_class = args.model;
            request.ef_scenario = true;
            run(request, &args.project)?;
        }
        Commands::Scenarios => {
            for scenario in BUILTIN_SCENARIOS {
                println!("{scenario}");
            }
        }
    }

    Ok(())
}

fn request(scenario: &str, project: &ProjectArgs, data: &DataArgs) -> Result<ScaffoldRequest> {
    let mut request = ScaffoldRequest::new(&project.project, scenario);
    request.context_class = data.context.clone();
    request.provider = data.provider;
    request.connection_key = data.connection_key.clone();
    request.prerelease = project.prerelease;
    request.flags = project.flags.clone();

    if project.project.is_dir() {
        request.package_references = project::package_references(&project.project)?;
    }
    request.package_references.extend(project.packages.iter().cloned());
    Ok(request)
}

fn run(request: ScaffoldRequest, args: &ProjectArgs) -> Result<()> {
    let mut config = if args.project.is_dir() {
        project::load_config(&args.project)?
    } else {
        scaffold_code_merge::MergeConfig::for_cli()
    };
    config.ide_mode |= args.ide_mode;
    config.strict_anchors |= args.strict_anchors;
    if args.spec_dir.is_some() {
        config.spec_dir = args.spec_dir.clone();
    }

    let orchestrator = Orchestrator::new(config).context("Invalid configuration")?;
    let outcome = orchestrator
        .run(&request)
        .with_context(|| format!("Scenario '{}' failed", request.scenario))?;

    if args.json {
        report::print_json(&outcome)?;
    } else {
        report::print_summary(&outcome, &request.project_dir);
    }
    Ok(())
}
