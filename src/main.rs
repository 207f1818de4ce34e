use std::error::Error;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::thread::{self, sleep};
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use daemonize::Daemonize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use redshift_scheduler::config::{default_config_path, validate_temperature};
use redshift_scheduler::notify::{Notifier, NotifySend, Silent};
use redshift_scheduler::pidfile::{PidFile, DEFAULT_PID_PATH};
use redshift_scheduler::redshift::{Redshift, DEFAULT_PROGRAM};
use redshift_scheduler::status::{StatusFile, DEFAULT_STATUS_PATH};
use redshift_scheduler::{
    evaluate, Clock, Config, FileConfigSource, LocalClock, PollingController, Shutdown, TimeOfDay,
};

type CliResult = Result<(), Box<dyn Error>>;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LOG_ENV: &str = "REDSHIFT_SCHEDULER_LOG";
const ESC_KEY: u8 = 27;
const ESC_POLL: Duration = Duration::from_millis(100);
const DAEMON_STDOUT: &str = "/tmp/redshift-scheduler.log";
const DAEMON_STDERR: &str = "/tmp/redshift-scheduler.err";

fn cli() -> Command {
    Command::new("redshift-scheduler")
        .version(VERSION)
        .about("Switches redshift between day and night temperatures on a fixed schedule")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Config file (default: $XDG_CONFIG_HOME/redshift-scheduler/config.json)")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Display execution details")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("daemon")
                .short('d')
                .long("daemon")
                .help("Run in background (daemon mode)")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("SECS")
                .help("Seconds between schedule checks")
                .default_value("30")
                .value_parser(value_parser!(u64).range(1..))
                .global(true),
        )
        .arg(
            Arg::new("redshift")
                .long("redshift")
                .value_name("PATH")
                .help("redshift executable")
                .default_value(DEFAULT_PROGRAM)
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .help("Give up on a redshift invocation after this many seconds")
                .default_value("10")
                .value_parser(value_parser!(u64).range(1..))
                .global(true),
        )
        .arg(
            Arg::new("status-file")
                .long("status-file")
                .value_name("PATH")
                .default_value(DEFAULT_STATUS_PATH)
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("pid-file")
                .long("pid-file")
                .value_name("PATH")
                .default_value(DEFAULT_PID_PATH)
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("no-notify")
                .long("no-notify")
                .help("Do not send desktop notifications")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("run").about("Run the scheduler (default)"))
        .subcommand(Command::new("now").about("Show the mode the schedule selects right now"))
        .subcommand(Command::new("status").about("Show the mode last applied by the scheduler"))
        .subcommand(Command::new("toggle").about("Flip the enabled switch in the config file"))
        .subcommand(Command::new("enable").about("Enable scheduling"))
        .subcommand(Command::new("disable").about("Disable scheduling"))
        .subcommand(
            Command::new("set")
                .about("Apply a temperature once, outside the schedule")
                .arg(
                    Arg::new("kelvin")
                        .required(true)
                        .value_parser(value_parser!(u32)),
                ),
        )
        .subcommand(
            Command::new("init")
                .about("Write the default config file")
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .help("Overwrite an existing file")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("schedule")
                .about("Set the night window, e.g. `schedule 21:00 08:00`")
                .arg(Arg::new("start").required(true))
                .arg(Arg::new("stop").required(true)),
        )
        .subcommand(
            Command::new("temps")
                .about("Set the day and night temperatures in Kelvin")
                .arg(Arg::new("day").required(true).value_parser(value_parser!(u32)))
                .arg(Arg::new("night").required(true).value_parser(value_parser!(u32))),
        )
}

fn config_path(args: &ArgMatches) -> PathBuf {
    args.get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(default_config_path)
}

fn path_arg(args: &ArgMatches, id: &str) -> PathBuf {
    args.get_one::<PathBuf>(id).cloned().unwrap_or_default()
}

fn secs_arg(args: &ArgMatches, id: &str) -> Duration {
    Duration::from_secs(args.get_one::<u64>(id).copied().unwrap_or(1))
}

fn redshift(args: &ArgMatches) -> Redshift {
    Redshift::new(path_arg(args, "redshift"), secs_arg(args, "timeout"))
}

fn init_logging(verbose: bool, daemon: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = || EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    // Under the service manager, prefer the journal
    let under_systemd = std::env::var_os("JOURNAL_STREAM").is_some()
        && Path::new("/run/systemd/journal/socket").exists();
    if under_systemd {
        match tracing_journald::layer() {
            Ok(journald) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry().with(journald).with(filter()).init();
                return;
            }
            Err(e) => eprintln!("Failed to create journald layer: {}, falling back to stdout", e),
        }
    }

    if daemon {
        // stdout is the log file once detached
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter())
            .with_writer(io::stdout)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter())
            .with_writer(io::stderr)
            .init();
    }
}

fn stdin_is_terminal() -> bool {
    // SAFETY: isatty only inspects the descriptor.
    unsafe { libc::isatty(io::stdin().as_raw_fd()) == 1 }
}

// Non-blocking check for a pending ESC key press
fn check_esc_key() -> bool {
    use termios::{tcsetattr, Termios, ECHO, ICANON, TCSANOW};

    let stdin = io::stdin();
    let fd = stdin.as_raw_fd();

    if let Ok(mut termios) = Termios::from_fd(fd) {
        let original = termios.clone();

        termios.c_lflag &= !(ICANON | ECHO);
        termios.c_cc[termios::VMIN] = 0;
        termios.c_cc[termios::VTIME] = 0;

        if tcsetattr(fd, TCSANOW, &termios).is_ok() {
            let mut buffer = [0; 1];
            let has_esc = io::stdin().read(&mut buffer).is_ok_and(|n| n > 0 && buffer[0] == ESC_KEY);

            let _ = tcsetattr(fd, TCSANOW, &original);
            return has_esc;
        }
    }

    false
}

fn watch_esc_key(shutdown: Shutdown) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !shutdown.is_triggered() {
            if check_esc_key() {
                info!("ESC pressed, exiting");
                shutdown.trigger();
                break;
            }
            sleep(ESC_POLL);
        }
    })
}

fn daemonize() -> CliResult {
    let stdout = File::create(DAEMON_STDOUT)?;
    let stderr = File::create(DAEMON_STDERR)?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()?;
    Ok(())
}

fn run(args: &ArgMatches) -> CliResult {
    let daemon = args.get_flag("daemon");
    if daemon {
        daemonize()?;
    }
    init_logging(args.get_flag("verbose"), daemon);

    let _pid_file = PidFile::acquire(path_arg(args, "pid-file"))?;

    let config_path = config_path(args);
    if !config_path.exists() {
        match Config::initial().save(&config_path) {
            Ok(()) => info!("Created default config at {:?}", config_path),
            Err(e) => warn!("Could not create default config: {}", e),
        }
    }

    let shutdown = Shutdown::new();
    let on_signal = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || on_signal.trigger()) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }
    let esc_watcher = (!daemon && stdin_is_terminal()).then(|| {
        println!("Press ESC to exit");
        watch_esc_key(shutdown.clone())
    });

    let notifier: Box<dyn Notifier> = if args.get_flag("no-notify") {
        Box::new(Silent)
    } else {
        Box::new(NotifySend)
    };
    let redshift = redshift(args);

    info!("redshift-scheduler {} starting", VERSION);
    info!("Config: {:?}", config_path);
    info!("redshift: {:?}", redshift.program());

    let mut controller = PollingController::new(
        FileConfigSource::new(config_path),
        redshift,
        notifier,
        LocalClock,
        secs_arg(args, "interval"),
    )
    .with_status_file(StatusFile::new(path_arg(args, "status-file")));
    controller.run(&shutdown);

    if let Some(handle) = esc_watcher {
        let _ = handle.join();
    }
    info!("Stopped");
    Ok(())
}

fn now(args: &ArgMatches) -> CliResult {
    let path = config_path(args);
    let config = Config::load(&path).unwrap_or_else(|e| {
        eprintln!("{} - using defaults", e);
        Config::default()
    });
    let time = LocalClock.now();
    let mode = evaluate(time, &config.schedule, config.enabled, &config.temps);
    println!(
        "{}: {} (night {}, enabled: {})",
        time, mode, config.schedule, config.enabled
    );
    Ok(())
}

fn status(args: &ArgMatches) -> CliResult {
    let status = StatusFile::new(path_arg(args, "status-file"));
    match status.read() {
        Ok(mode) => println!("{}", mode),
        Err(e) => println!("unknown ({})", e),
    }
    Ok(())
}

fn edit_config(args: &ArgMatches, edit: impl FnOnce(&mut Config)) -> CliResult {
    let path = config_path(args);
    let mut config = Config::load_or_default(&path)?;
    edit(&mut config);
    config.save(&path)?;
    println!(
        "{}: enabled {}, night {}, day {}K, night {}K",
        path.display(),
        config.enabled,
        config.schedule,
        config.temps.day,
        config.temps.night
    );
    Ok(())
}

fn init(args: &ArgMatches) -> CliResult {
    let path = config_path(args);
    if path.exists() && !args.get_flag("force") {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    Config::initial().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn set_schedule(args: &ArgMatches) -> CliResult {
    let arg = |id: &str| args.get_one::<String>(id).map(String::as_str).unwrap_or_default();
    let start: TimeOfDay = arg("start").parse()?;
    let stop: TimeOfDay = arg("stop").parse()?;
    edit_config(args, |config| {
        config.schedule.start = start;
        config.schedule.stop = stop;
    })
}

fn set_temps(args: &ArgMatches) -> CliResult {
    let arg = |id: &str| args.get_one::<u32>(id).copied().unwrap_or_default();
    let day = validate_temperature("day", arg("day"))?;
    let night = validate_temperature("night", arg("night"))?;
    edit_config(args, |config| {
        config.temps.day = day;
        config.temps.night = night;
    })
}

fn set_once(args: &ArgMatches) -> CliResult {
    let kelvin = args.get_one::<u32>("kelvin").copied().unwrap_or_default();
    redshift(args).set_temperature(kelvin)?;
    println!("{}K", kelvin);
    Ok(())
}

fn main() {
    let matches = cli().get_matches();
    let (command, args) = matches.subcommand().unwrap_or(("run", &matches));

    if command != "run" {
        init_logging(args.get_flag("verbose"), false);
    }

    let result = match command {
        "run" => run(args),
        "now" => now(args),
        "status" => status(args),
        "toggle" => edit_config(args, |config| config.enabled = !config.enabled),
        "enable" => edit_config(args, |config| config.enabled = true),
        "disable" => edit_config(args, |config| config.enabled = false),
        "set" => set_once(args),
        "init" => init(args),
        "schedule" => set_schedule(args),
        "temps" => set_temps(args),
        _ => unreachable!("subcommand {} not registered", command),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        exit(1);
    }
}
