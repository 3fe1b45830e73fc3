use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use nowpilot::core::BrowserType;
use nowpilot::workflow::{load_workflow, parse_var};
use nowpilot::{BrowserSession, ChromeBrowser, Config, Preset, Workflow, WorkflowRunner};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "nowpilot")]
#[command(about = "Drive ServiceNow list workflows through a Chromium browser", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML or JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Append logs to this file as well
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a preset or a workflow file
    Run {
        /// Preset name or path to a workflow file
        workflow: String,

        #[command(flatten)]
        overrides: Overrides,

        /// Workflow variable, as key=value (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// List the built-in presets
    List,

    /// Print the resolved workflow as YAML
    Show {
        workflow: String,

        #[command(flatten)]
        overrides: Overrides,

        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },
}

#[derive(clap::Args, Default)]
struct Overrides {
    /// Instance root, e.g. https://acme.service-now.com/
    #[arg(long)]
    instance: Option<String>,

    #[arg(long, value_enum)]
    browser: Option<BrowserArg>,

    /// Browser binary
    #[arg(long)]
    executable: Option<PathBuf>,

    #[arg(long, conflicts_with = "headed")]
    headless: bool,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Browser profile root (--user-data-dir)
    #[arg(long)]
    profile_dir: Option<PathBuf>,

    /// Profile inside the profile root (--profile-directory)
    #[arg(long)]
    profile_name: Option<String>,

    #[arg(long)]
    max_iterations: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BrowserArg {
    Chrome,
    Edge,
}

impl Overrides {
    fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(instance) = &self.instance {
            let url = url::Url::parse(instance)
                .with_context(|| format!("invalid --instance '{}'", instance))?;
            config.presets.instance = Some(url);
        }
        if let Some(browser) = self.browser {
            config.browser.browser_type = match browser {
                BrowserArg::Chrome => BrowserType::Chrome,
                BrowserArg::Edge => BrowserType::Edge,
            };
        }
        if let Some(executable) = &self.executable {
            config.browser.executable = Some(executable.clone());
        }
        if self.headless {
            config.browser.headless = true;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(dir) = &self.profile_dir {
            config.browser.profile_dir = Some(dir.clone());
        }
        if let Some(name) = &self.profile_name {
            config.browser.profile_name = Some(name.clone());
        }
        if let Some(max) = self.max_iterations {
            config.presets.max_iterations = Some(max);
        }
        Ok(())
    }
}

fn init_logging(config: &Config, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},headless_chrome=warn", config.logging.level))
    });

    let file_layer = match log_file.or(config.logging.file.as_deref()) {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

fn resolve_workflow(
    name: &str,
    config: &Config,
    overrides: &Overrides,
    raw_vars: &[String],
) -> anyhow::Result<Workflow> {
    if let Some(preset) = Preset::from_name(name) {
        return Ok(preset.build(&config.presets)?);
    }

    let path = Path::new(name);
    if !path.exists() {
        let presets: Vec<&str> = Preset::ALL.iter().map(|preset| preset.name()).collect();
        bail!(
            "'{}' is neither a preset ({}) nor a workflow file",
            name,
            presets.join(", ")
        );
    }

    let mut vars = HashMap::new();
    if let Some(instance) = &config.presets.instance {
        vars.insert("instance".to_string(), instance.to_string());
    }
    for raw in raw_vars {
        let (key, value) = parse_var(raw)?;
        vars.insert(key, value);
    }

    let mut workflow = load_workflow(path)
        .with_context(|| format!("cannot load workflow {}", path.display()))?
        .substitute(&vars)?;
    if let Some(max) = overrides.max_iterations {
        workflow.max_iterations = Some(max);
    }
    Ok(workflow)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Commands::Run { overrides, .. } | Commands::Show { overrides, .. } = &cli.command {
        overrides.apply(&mut config)?;
    }
    init_logging(&config, cli.log_file.as_deref())?;

    match &cli.command {
        Commands::List => {
            for preset in Preset::ALL {
                println!("{:<18} {}", preset.name(), preset.description());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show {
            workflow,
            overrides,
            vars,
        } => {
            let workflow = resolve_workflow(workflow, &config, overrides, vars)?;
            print!("{}", serde_yaml::to_string(&workflow)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            workflow,
            overrides,
            vars,
        } => {
            let workflow = resolve_workflow(workflow, &config, overrides, vars)?;
            workflow.validate(&ChromeBrowser::supported_capabilities())?;
            info!("launching {:?} for '{}'", config.browser.browser_type, workflow.name);

            let browser = ChromeBrowser::launch(&config.browser)?;
            let session = BrowserSession::new(browser, &config);
            let report = WorkflowRunner::new(session, workflow, &config)?.run().await;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_done() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
