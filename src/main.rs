use clap::{Parser, Subcommand};
use std::sync::Arc;

use carik_dispatch::application::events::{EventKind, HandlerEvent};
use carik_dispatch::domain::entities::{Category, ModuleKind, User};
use carik_dispatch::infrastructure::adapters::console::ConsoleAdapter;
use carik_dispatch::infrastructure::config::Config;
use carik_dispatch::infrastructure::emitter::Emitter;
use carik_dispatch::plugins::{command_source, inhibitor_source, listener_source};
use carik_dispatch::{CommandHandler, HandlerError, InhibitorHandler, ListenerHandler};

#[derive(Parser)]
#[command(name = "carik-dispatch")]
#[command(about = "Module registry and command dispatcher for chat bots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every module and read commands from the console
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
    /// Load every module and print them by category
    List,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            run_bot(&cli.config);
        }
        Commands::Version => {
            println!("carik-dispatch v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config();
        }
        Commands::List => {
            list_modules(&cli.config);
        }
    }
}

fn load_config(config_path: &str) -> Config {
    if std::path::Path::new(config_path).exists() {
        Config::load(config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        })
    } else {
        Config::load_env()
    }
}

/// The three handlers wired together, modules not yet loaded
struct Handlers {
    commands: Arc<CommandHandler>,
    inhibitors: Arc<InhibitorHandler>,
    listeners: ListenerHandler,
}

fn build_handlers(config: &Config, client: Arc<Emitter>) -> Result<Handlers, HandlerError> {
    let listeners = ListenerHandler::new(
        config.handler_options(ModuleKind::Listener),
        Arc::new(listener_source()),
        client,
    )?;
    let inhibitors = Arc::new(InhibitorHandler::new(
        config.handler_options(ModuleKind::Inhibitor),
        Arc::new(inhibitor_source()),
    )?);
    let commands = Arc::new(CommandHandler::new(
        config.handler_options(ModuleKind::Command),
        Arc::new(command_source()),
        config.dispatch_config(),
    )?);
    commands.use_inhibitor_handler(Arc::clone(&inhibitors));
    Ok(Handlers {
        commands,
        inhibitors,
        listeners,
    })
}

impl Handlers {
    fn load_all(&self) -> Result<(), HandlerError> {
        self.listeners.load_all()?;
        self.inhibitors.load_all()?;
        self.commands.load_all()?;
        Ok(())
    }
}

/// Prints dispatch results to the console
fn report(commands: &CommandHandler) {
    let events = commands.events();
    events.subscribe(EventKind::CommandFinished, |event| {
        if let HandlerEvent::CommandFinished { result, .. } = event {
            match result.as_str() {
                Some(text) => println!("{}", text),
                None => println!("{}", result),
            }
        }
    });
    events.subscribe(EventKind::MessageBlocked, |event| {
        if let Some(reason) = event.reason() {
            println!("Blocked: {}", reason);
        }
    });
    events.subscribe(EventKind::CommandBlocked, |event| {
        if let (Some(id), Some(reason)) = (event.command_id(), event.reason()) {
            println!("Command {} blocked: {}", id, reason);
        }
    });
    events.subscribe(EventKind::MessageInvalid, |_| {
        println!("Unknown command");
    });
    events.subscribe(EventKind::MissingPermissions, |event| {
        if let HandlerEvent::MissingPermissions { side, missing, .. } = event {
            println!("Missing {} permissions: {}", side, missing.join(", "));
        }
    });
    events.subscribe(EventKind::Cooldown, |event| {
        if let HandlerEvent::Cooldown { remaining_ms, .. } = event {
            println!("Slow down, try again in {:.1}s", *remaining_ms as f64 / 1000.0);
        }
    });
    events.subscribe(EventKind::Error, |event| {
        if let HandlerEvent::Error { error, .. } = event {
            tracing::error!("Command failed: {}", error);
            println!("Error: {}", error);
        }
    });
}

fn run_bot(config_path: &str) {
    let config = load_config(config_path);
    tracing::info!("Starting carik-dispatch: {}", config.bot.name);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    rt.block_on(async {
        let client = Arc::new(Emitter::new("client"));
        let handlers = match build_handlers(&config, Arc::clone(&client)) {
            Ok(handlers) => handlers,
            Err(e) => {
                tracing::error!("Failed to create handlers: {}", e);
                return;
            }
        };
        if let Err(e) = handlers.load_all() {
            tracing::error!("Failed to load modules: {}", e);
            return;
        }
        tracing::info!(
            "Loaded {} commands, {} inhibitors, {} listeners",
            handlers.commands.len(),
            handlers.inhibitors.len(),
            handlers.listeners.len()
        );

        report(&handlers.commands);
        handlers.commands.bind(&*client);
        client.emit("ready", vec![config.bot.name.clone().into()]).await;

        let mut bot = ConsoleAdapter::new(Arc::clone(&client)).with_prefix(&config.bot.prefix);
        if let Some(owner) = config.bot.owners.first() {
            bot = bot.with_user(User::new(owner).with_username("console"));
        }
        if let Some(guild) = &config.bot.testing_guild {
            bot = bot.in_guild(guild);
        }
        if let Err(e) = bot.run().await {
            tracing::error!("Console adapter stopped: {}", e);
        }

        handlers.commands.unbind(&*client);
        client.close();
    });
}

fn list_modules(config_path: &str) {
    let config = load_config(config_path);
    let handlers = match build_handlers(&config, Arc::new(Emitter::new("client"))) {
        Ok(handlers) => handlers,
        Err(e) => {
            tracing::error!("Failed to create handlers: {}", e);
            return;
        }
    };
    if let Err(e) = handlers.load_all() {
        tracing::error!("Failed to load modules: {}", e);
        return;
    }

    print_categories("Commands", handlers.commands.categories());
    print_categories("Inhibitors", handlers.inhibitors.categories());
    print_categories("Listeners", handlers.listeners.categories());
}

fn print_categories(title: &str, categories: Vec<Category>) {
    println!("{}:", title);
    if categories.iter().all(|c| c.is_empty()) {
        println!("  (none)");
        return;
    }
    for category in categories.iter().filter(|c| !c.is_empty()) {
        println!("  [{}] {}", category.id(), category.ids().collect::<Vec<_>>().join(", "));
    }
}

fn init_config() {
    let config = Config::default();
    match config.to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
        }
        Err(e) => tracing::error!("Failed to render config: {}", e),
    }
}
