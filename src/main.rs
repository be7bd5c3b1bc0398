//! odata-track: OData change-tracking payload tool
//!
//! Replays session scripts against the tracking engine and prints the bulk
//! update or deep insert request they produce.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use odata_track::{
    cli::{self, LiteralForm, PayloadOptions},
    config::{self, AnnotationStyle, ClientConfig, ConfigPreset, KeyDelimiter, PropertySendOption},
    SaveMode, Validatable,
};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "odata-track")]
#[command(version)]
#[command(about = "OData change tracking, bulk update and deep insert payloads", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Print the delta payload of a session script
    odata-track payload session.yaml

    # Show request line and headers, force deep insert
    odata-track payload session.yaml --headers --mode deep-insert

    # Apply a recorded response and show what happened to each entity
    odata-track payload session.yaml --response response.json

    # Format a URL literal
    odata-track literal Edm.Double 1e15")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(long, global = true, env = "ODATA_TRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Start from a named preset instead of the config file
    #[arg(long, global = true, value_enum)]
    preset: Option<PresetArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    Default,
    Compact,
    Legacy,
}

impl From<PresetArg> for ConfigPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Default => Self::Default,
            PresetArg::Compact => Self::Compact,
            PresetArg::Legacy => Self::Legacy,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    BulkUpdate,
    DeepInsert,
}

impl From<ModeArg> for SaveMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::BulkUpdate => Self::BulkUpdate,
            ModeArg::DeepInsert => Self::DeepInsert,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormArg {
    Uri,
    Json,
}

// ============================================================================
// Command argument structs
// ============================================================================

/// Arguments for the `payload` subcommand
#[derive(Parser)]
struct PayloadArgs {
    /// Session script (YAML or JSON)
    script: PathBuf,

    /// Override the script's save mode
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Print the request line and headers
    #[arg(long)]
    headers: bool,

    /// Pretty-print the body
    #[arg(long)]
    pretty: bool,

    /// Send only the properties that were set
    #[arg(long)]
    only_set_properties: bool,

    /// Write annotations as @odata.id instead of @id
    #[arg(long)]
    prefixed_annotations: bool,

    /// Write keys as path segments (People/1)
    #[arg(long)]
    key_as_segment: bool,

    /// Recorded response body to apply after building the request
    #[arg(long)]
    response: Option<PathBuf>,

    /// HTTP status of the recorded response
    #[arg(long, default_value_t = 200)]
    status: u16,

    /// Output file path (stdout if not specified)
    #[arg(short = 'O', long)]
    output_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a session script and print its save request
    Payload(PayloadArgs),

    /// Format a primitive value as an OData literal
    Literal {
        /// Declared type, e.g. Edm.Double or Collection(Edm.Int32)
        type_name: String,

        /// Value text (JSON or plain)
        value: String,

        /// Literal form
        #[arg(long, value_enum, default_value = "uri")]
        form: FormArg,

        /// Write Int64 and Decimal as JSON strings
        #[arg(long)]
        ieee754: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate JSON Schema for the config file format
    ConfigSchema {
        /// Write schema to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show, discover, or initialize configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Sub-subcommands for the `config` command
#[derive(Subcommand)]
enum ConfigAction {
    /// Print current effective configuration (merged from defaults + file)
    Show,
    /// Print the discovered config file
    Path,
    /// Generate an example .odata-track.yaml in the current directory
    Init,
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let config = match cli.preset {
        Some(preset) => ClientConfig::from_preset(preset.into()),
        None => {
            let (config, loaded_from) = config::load_or_default(cli.config.as_deref());
            if let Some(path) = loaded_from {
                tracing::debug!("loaded config from {}", path.display());
            }
            config
        }
    };
    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("invalid configuration:\n  {}", messages.join("\n  "));
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();

    match &cli.command {
        Commands::Payload(args) => {
            let mut config = load_config(&cli)?;
            let payload = &mut config.payload;
            payload.pretty |= args.pretty;
            if args.only_set_properties {
                payload.send_option = PropertySendOption::OnlySetProperties;
            }
            if args.prefixed_annotations {
                payload.annotation_style = AnnotationStyle::Prefixed;
            }
            if args.key_as_segment {
                payload.key_delimiter = KeyDelimiter::Slash;
            }
            cli::run_payload(PayloadOptions {
                script: args.script.clone(),
                config,
                mode: args.mode.map(Into::into),
                headers: args.headers,
                response: args.response.clone(),
                status: args.status,
                output: args.output_file.clone(),
            })
        }

        Commands::Literal {
            type_name,
            value,
            form,
            ieee754,
        } => {
            let form = match form {
                FormArg::Uri => LiteralForm::Uri,
                FormArg::Json => LiteralForm::Json,
            };
            cli::run_literal(type_name, value, form, *ieee754)
        }

        Commands::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "odata-track", &mut io::stdout());
            Ok(())
        }

        Commands::ConfigSchema { output } => {
            let schema = config::generate_json_schema().context("failed to generate schema")?;
            match output {
                Some(path) => {
                    std::fs::write(path, &schema)?;
                    eprintln!("Schema written to {}", path.display());
                }
                None => {
                    println!("{schema}");
                }
            }
            Ok(())
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let (config, loaded_from) = config::load_or_default(cli.config.as_deref());
                if let Some(path) = &loaded_from {
                    eprintln!("# Loaded from: {}", path.display());
                } else {
                    eprintln!("# No config file found; showing defaults");
                }
                let yaml = serde_yaml_ng::to_string(&config).context("failed to serialize config")?;
                print!("{yaml}");
                Ok(())
            }
            ConfigAction::Path => {
                match config::discover_config_file(cli.config.as_deref()) {
                    Some(path) => eprintln!("Active config file: {}", path.display()),
                    None => eprintln!("No config file found."),
                }
                Ok(())
            }
            ConfigAction::Init => {
                let target = std::env::current_dir()
                    .context("cannot determine current directory")?
                    .join(".odata-track.yaml");
                if target.exists() {
                    anyhow::bail!(
                        "{} already exists. Remove it first to re-initialize.",
                        target.display()
                    );
                }
                let content = config::generate_full_example_config();
                std::fs::write(&target, content)
                    .with_context(|| format!("failed to write {}", target.display()))?;
                eprintln!("Created {}", target.display());
                Ok(())
            }
        },
    }
}
