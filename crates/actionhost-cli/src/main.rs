//! Command-line host for actionhost plugin modules.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actionhost_core::config::{env_vars, host};
use actionhost_core::{
    Action, ActionEvent, ActionExecutor, ConfigStatus, ConfigureMode, ErrorCode, LibraryVersion,
    LoadError, LoadedModule, Payload, Plugin, PluginAttributes, PluginConfigurator,
    PluginConfiguratorAsync, PluginDescriptor, PluginErrc, PluginVersion,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam::channel::{self, RecvTimeoutError, TrySendError};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// actionhost - load plugin modules and drive their actions.
#[derive(Parser, Debug)]
#[command(name = "actionhost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Show module and plugin metadata.
    Info {
        /// Path to the plugin module (defaults to $ACTIONHOST_PLUGIN_PATH).
        #[arg(short, long)]
        plugin: Option<PathBuf>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Create the plugin, execute its actions and run a configuration.
    Run {
        /// Path to the plugin module (defaults to $ACTIONHOST_PLUGIN_PATH).
        #[arg(short, long)]
        plugin: Option<PathBuf>,
        /// Persistence directory handed to the plugin.
        #[arg(long)]
        persistence_dir: Option<PathBuf>,
        /// Random payloads submitted to every added action.
        #[arg(short = 'n', long, default_value_t = host::DEFAULT_SUBMISSIONS)]
        submissions: usize,
        /// Stop once no event arrived for this many milliseconds.
        #[arg(long, default_value_t = host::DEFAULT_SETTLE_MS)]
        settle_ms: u64,
    },
}

fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n=== PANIC ===");
        if let Some(location) = panic_info.location() {
            eprintln!("Location: {}:{}:{}", location.file(), location.line(), location.column());
        } else {
            eprintln!("Location: <unknown>");
        }
        eprintln!("Message: {}", panic_info);
        eprintln!("==============\n");
    }));

    let args = Args::parse();
    init_logging(args.verbose);

    let result = match args.command {
        Command::Info { plugin, json } => show_info(plugin, json),
        Command::Run {
            plugin,
            persistence_dir,
            submissions,
            settle_ms,
        } => run(
            plugin,
            persistence_dir,
            submissions,
            Duration::from_millis(settle_ms),
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "actionhost=debug"
    } else {
        "actionhost=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Print the failure with the category and code of the first classified cause.
fn report(err: &anyhow::Error) {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<actionhost_core::Error>() {
            eprintln!("Error ({}:{}): {:#}", e.category(), e.code().status(), err);
            return;
        }
        if let Some(e) = cause.downcast_ref::<LoadError>() {
            let kind = match e {
                LoadError::System { .. } => "system",
                LoadError::Incompatible { .. } => "incompatible",
                LoadError::FunctionLoad { .. } => "function_load",
            };
            eprintln!("Error (load:{kind}): {:#}", err);
            return;
        }
    }
    eprintln!("Error: {:#}", err);
}

fn plugin_path(plugin: Option<PathBuf>) -> Result<PathBuf> {
    plugin.or_else(env_vars::plugin_path).with_context(|| {
        format!(
            "no plugin module given; pass --plugin or set {}",
            env_vars::PLUGIN_PATH
        )
    })
}

fn load_module(path: &Path) -> Result<LoadedModule> {
    LoadedModule::load(path).with_context(|| format!("failed to load {}", path.display()))
}

#[derive(Serialize)]
struct InfoReport {
    path: PathBuf,
    library_version: LibraryVersion,
    plugin_version: PluginVersion,
    descriptor: PluginDescriptor,
}

fn show_info(plugin: Option<PathBuf>, json: bool) -> Result<()> {
    let path = plugin_path(plugin)?;
    let module = load_module(&path)?;
    let report = InfoReport {
        path: module.path().to_path_buf(),
        library_version: module.version(),
        plugin_version: PluginVersion::query(&module).context("failed to read plugin version")?,
        descriptor: PluginDescriptor::query(&module).context("failed to read plugin descriptor")?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Plugin Information");
    println!("==================\n");
    println!("Module:          {}", report.path.display());
    println!("Library version: {}", report.library_version);
    println!("Plugin version:  {}", report.plugin_version);
    println!("Name:            {}", report.descriptor.name);
    println!("Description:     {}", report.descriptor.description);
    Ok(())
}

fn persistence_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = dir.or_else(env_vars::persistence_dir).with_context(|| {
        format!(
            "no persistence directory available; pass --persistence-dir or set {}",
            env_vars::PERSISTENCE_DIR
        )
    })?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

fn run(
    plugin: Option<PathBuf>,
    persistence_dir_arg: Option<PathBuf>,
    submissions: usize,
    settle: Duration,
) -> Result<()> {
    let path = plugin_path(plugin)?;
    let persistence = persistence_dir(persistence_dir_arg)?;
    let module = load_module(&path)?;

    actionhost_core::set_default_error_handler(|message, code| {
        error!(
            category = %code.category(),
            status = %code.status(),
            "{} | {}",
            message,
            code.message()
        );
    });

    println!("Module implements library version: {}", module.version());
    println!("Plugin version: {}", PluginVersion::query(&module)?);
    let descriptor = PluginDescriptor::query(&module)?;
    println!("Plugin: {} - {}", descriptor.name, descriptor.description);
    println!("Persistence: {}", persistence.display());

    // Notifications arrive while the plugin holds its registry lock, so the
    // callback only queues them.
    let (tx, rx) = channel::bounded::<(ActionEvent, Action)>(host::EVENT_QUEUE_CAPACITY);
    let attributes = PluginAttributes::new(&persistence).on_event(move |action, event| {
        tx.try_send((event, action)).map_err(|e| match e {
            TrySendError::Full(_) => "event queue is full".into(),
            TrySendError::Disconnected(_) => "event queue is closed".into(),
        })
    });
    let plugin = Plugin::create(&module, attributes).context("failed to create plugin")?;
    let second = plugin.duplicate()?;

    let background = PluginConfiguratorAsync::with_callback(
        second.clone(),
        ConfigureMode::Cli,
        |outcome| {
            debug!(?outcome, "background configuration finished");
            Err("hello from callback".into())
        },
    );
    if let Err(e) = background.start() {
        error!(category = %e.category(), "configuration request failed: {e}");
    }

    let mut rng = rand::thread_rng();
    loop {
        let (event, action) = match rx.recv_timeout(settle) {
            Ok(received) => received,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        };
        match event {
            ActionEvent::Added => {
                println!("Action add");
                match action.descriptor() {
                    Ok(descriptor) => println!("{}: {}", descriptor.name, descriptor.description),
                    Err(e) => error!(category = %e.category(), "error getting descriptor: {e}"),
                }
                let payloads: Vec<i32> = (0..submissions)
                    .map(|_| rng.gen_range(-100..=100))
                    .collect();
                execute_all(action, &payloads);
            }
            ActionEvent::Modified => println!("Action modify"),
            ActionEvent::Removed => println!("Action remove"),
        }
    }

    match background.wait() {
        Some(Ok(status)) => print_config_status(status),
        Some(Err(e)) => error!(category = %e.category(), "configuration failed: {e}"),
        None => debug!("background configuration never started"),
    }

    let configurator = PluginConfigurator::cli(plugin.clone());
    match configure_when_idle(&configurator) {
        Ok(status) => print_config_status(status),
        Err(e) => error!(category = %e.category(), "configuration failed: {e}"),
    }

    info!("done");
    Ok(())
}

/// Submit every payload to `action` and wait for the completions.
fn execute_all(action: Action, payloads: &[i32]) {
    let label = action.to_string();
    let succeeded = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let executor = {
        let succeeded = Arc::clone(&succeeded);
        let failed = Arc::clone(&failed);
        ActionExecutor::new(action, move |outcome| {
            match outcome {
                Ok(()) => succeeded.fetch_add(1, Ordering::Relaxed),
                Err(e) => {
                    debug!(code = %e.code(), "execution failed: {e}");
                    failed.fetch_add(1, Ordering::Relaxed)
                }
            };
            Ok(())
        })
    };

    for &value in payloads {
        if let Err(e) = executor.submit(Payload::Int32(value)) {
            if e.code() == ErrorCode::Plugin(PluginErrc::ActionNotFound) {
                warn!(action = %label, "action does not exist, will receive removed event");
                break;
            }
            error!(category = %e.category(), "error submitting payload: {e}");
        }
    }
    executor.wait();

    println!(
        "Action {label}: {} succeeded, {} failed",
        succeeded.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed)
    );
}

/// Run a configuration, retrying while the plugin still finishes the
/// previous session.
fn configure_when_idle(
    configurator: &PluginConfigurator,
) -> actionhost_core::Result<ConfigStatus> {
    let mut attempts = 0;
    loop {
        match configurator.configure() {
            Err(e)
                if e.code() == ErrorCode::Plugin(PluginErrc::Unavailable)
                    && attempts < host::CONFIGURE_RETRIES =>
            {
                attempts += 1;
                debug!(attempts, "plugin still configuring, retrying");
                std::thread::sleep(host::CONFIGURE_RETRY_INTERVAL);
            }
            outcome => return outcome,
        }
    }
}

fn print_config_status(status: ConfigStatus) {
    match status {
        ConfigStatus::Success => println!("configuration finished"),
        ConfigStatus::Cancel => println!("configuration succeeded but cancelled"),
    }
}
