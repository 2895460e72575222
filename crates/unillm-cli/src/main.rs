mod logging;
mod request;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use unillm_config::{Config, ConfigManager, LoggingConfig};
use unillm_core::ChatMessage;
use unillm_llm::{create_provider, parse_json, LLMProvider, RequestOptions};
use unillm_prompt::{make_prompt, PromptTemplate};

use request::{conversation, read_template, RequestArgs};

#[derive(Parser)]
#[command(name = "unillm")]
#[command(about = "One interface to several LLM providers")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    /// Config file path
    #[arg(long, env = "UNILLM_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the reply
    Prompt {
        message: String,

        /// Print the reply as it is generated
        #[arg(long)]
        stream: bool,

        /// Parse the reply as JSON and pretty-print it; the raw reply goes to stderr
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        request: RequestArgs,
    },
    /// Interactive chat; the conversation is resent on every turn
    Chat {
        /// Wait for whole replies instead of streaming them
        #[arg(long)]
        no_stream: bool,

        #[command(flatten)]
        request: RequestArgs,
    },
    /// Print the prompt that would be sent to an instruct model
    Render {
        /// Turns alternating user and assistant, starting with user
        #[arg(required = true)]
        turns: Vec<String>,

        #[arg(long)]
        system: Option<String>,

        /// File holding a custom prompt template
        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// Configuration management
    Config(ConfigArgs),
}

#[derive(Args, Clone)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Print a value
    Get {
        /// Dotted key, e.g. default_service or services.anthropic.model
        key: String,
    },
    /// Set a value
    Set {
        /// Dotted key, e.g. default_service or services.anthropic.model
        key: String,
        value: String,
    },
    /// Write the default config
    Init {
        /// Overwrite an existing config
        #[arg(long, default_value = "false")]
        force: bool,
    },
    /// Print the whole config
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref())?;

    match cli.command {
        Commands::Config(args) => {
            logging::init(&LoggingConfig::default(), cli.debug)?;
            handle_config(args, &config_path).await
        }
        Commands::Render {
            turns,
            system,
            template,
        } => {
            logging::init(&LoggingConfig::default(), cli.debug)?;
            render(&turns, system.as_deref(), template.as_ref())
        }
        Commands::Prompt {
            message,
            stream,
            json,
            request,
        } => {
            let config = load_config(&config_path, cli.debug).await?;
            run_prompt(&config, &request, message, stream, json).await
        }
        Commands::Chat { no_stream, request } => {
            let config = load_config(&config_path, cli.debug).await?;
            run_interactive_chat(&config, &request, !no_stream).await
        }
    }
}

fn resolve_config_path(flag: Option<&str>) -> anyhow::Result<PathBuf> {
    match flag {
        Some(path) => Ok(unillm_config::expand_tilde(path).unwrap_or_else(|| PathBuf::from(path))),
        None => Ok(ConfigManager::default_config_path()?),
    }
}

async fn load_config(path: &Path, debug: bool) -> anyhow::Result<Config> {
    let config = ConfigManager::load(path).await?.snapshot().await;
    logging::init(&config.logging, debug)?;
    debug!("Loaded config from {:?}", path);
    Ok(config)
}

fn connect(config: &Config, service: Option<&str>) -> anyhow::Result<Arc<dyn LLMProvider>> {
    let provider_config = config.provider_config(service)?;
    let provider = create_provider(&provider_config)?;
    info!(
        "Using service '{}' ({})",
        provider.provider_id(),
        provider_config.model.as_deref().unwrap_or(&provider.metadata().default_model)
    );
    Ok(provider)
}

async fn run_prompt(
    config: &Config,
    request: &RequestArgs,
    message: String,
    stream: bool,
    json: bool,
) -> anyhow::Result<()> {
    let provider = connect(config, request.service.as_deref())?;
    let options = request.options(request.load_template()?, stream);

    let mut messages = request.preamble();
    messages.push(ChatMessage::user(message));

    if !json {
        respond(provider.as_ref(), &messages, &options).await?;
        return Ok(());
    }

    let reply = provider
        .send(&messages, &options)
        .await?
        .into_text(|fragment| eprint!("{}", fragment.dimmed()))
        .await?;
    eprintln!();
    let value = parse_json(&reply)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn run_interactive_chat(config: &Config, request: &RequestArgs, stream: bool) -> anyhow::Result<()> {
    let provider = connect(config, request.service.as_deref())?;
    let options = request.options(request.load_template()?, stream);
    let mut history = request.preamble();

    println!("{}", format!("🤖 unillm chat ({})", provider.metadata().name).cyan().bold());
    println!("{}", "Type 'exit' or 'quit' to leave, '/reset' to clear the conversation".dimmed());
    println!();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("{}", "👋 Goodbye!".cyan());
            break;
        }
        if input == "/reset" {
            history = request.preamble();
            println!("{}", "Conversation cleared".dimmed());
            continue;
        }
        if input.is_empty() {
            continue;
        }

        history.push(ChatMessage::user(input));
        println!("{}", "Assistant:".green().bold());

        match respond(provider.as_ref(), &history, &options).await {
            Ok(reply) => history.push(ChatMessage::assistant(reply)),
            Err(e) => {
                history.pop();
                println!("{}", format!("❌ Error: {}", e).red());
            }
        }

        println!();
    }

    Ok(())
}

/// Print the reply as it arrives and return its full text
async fn respond(
    provider: &dyn LLMProvider,
    messages: &[ChatMessage],
    options: &RequestOptions,
) -> anyhow::Result<String> {
    let mut stdout = io::stdout();
    let reply = provider
        .send(messages, options)
        .await?
        .into_text(|fragment| {
            if let Err(e) = write!(stdout, "{}", fragment).and_then(|_| stdout.flush()) {
                debug!("Failed to write to stdout: {}", e);
            }
        })
        .await?;
    println!();
    Ok(reply)
}

fn render(turns: &[String], system: Option<&str>, template: Option<&PathBuf>) -> anyhow::Result<()> {
    let template = match read_template(template)? {
        Some(source) => PromptTemplate::parse(&source)?,
        None => PromptTemplate::default(),
    };
    let prompt = make_prompt(&conversation(system, turns), &template)?;
    println!("{}", prompt);
    Ok(())
}

async fn handle_config(args: ConfigArgs, config_path: &Path) -> anyhow::Result<()> {
    debug!("Config path: {:?}", config_path);

    match args.command {
        ConfigCommands::Get { key } => {
            let config = ConfigManager::load(config_path).await?.snapshot().await;
            match config.get_value(&key) {
                Some(value) => println!("{}", format!("{} = {}", key, value).green()),
                None => anyhow::bail!("Key not found: {}", key),
            }
        }
        ConfigCommands::Set { key, value } => {
            let manager = ConfigManager::load(config_path).await?;
            manager.update(|config| config.set_value(&key, &value)).await?;
            println!("{}", format!("✅ Set {} = {}", key, value).green());
        }
        ConfigCommands::Init { force } => {
            if config_path.exists() && !force {
                println!("{}", format!("⚠️  Config already exists at {:?}", config_path).yellow());
                println!("{}", "Use --force to overwrite".dimmed());
                return Ok(());
            }
            ConfigManager::init(config_path, force).await?;
            println!("{}", format!("✅ Config initialized at {:?}", config_path).green());
            println!("{}", "You can edit this file to customize your services".dimmed());
        }
        ConfigCommands::Show => {
            let config = ConfigManager::load(config_path).await?.snapshot().await;
            println!("{}", "📋 Current Configuration:".cyan().bold());
            println!();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
