use std::fs;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use clap::Parser;

use tlog_monitor::{Error, MonitorConfig, RunStatus, Updater};

/// Check that a transparency log only ever grew since the last time we looked.
///
/// Run it periodically (cron, systemd timer). Only one instance per state file
/// at a time.
#[derive(Parser, Debug)]
#[command(name = "tlog-monitor", version, about)]
struct Args {
	/// Root URL of the log server.
	#[arg(long, short = 's', env = "TLOG_SERVER")]
	server: String,

	/// Where to keep the last verified tree head. Defaults to
	/// ~/.tlog-monitor/state.json.
	#[arg(long, env = "TLOG_STATE_FILE")]
	state_file: Option<PathBuf>,

	/// Log public key (DER or PEM) to pin. Without it, the key sent by the
	/// server is trusted.
	#[arg(long, env = "TLOG_PUBLIC_KEY")]
	public_key: Option<PathBuf>,

	/// Seconds to wait for the log server.
	#[arg(long, env = "TLOG_TIMEOUT", default_value_t = 5)]
	timeout: u64,
}

fn config_from_args(args: &Args) -> Result<MonitorConfig, Error> {
	let mut config = MonitorConfig::new(&args.server)?
		.with_timeout(Duration::from_secs(args.timeout))?;
	if let Some(path) = &args.state_file {
		config = config.with_state_path(path);
	}
	if let Some(path) = &args.public_key {
		let key = fs::read(path).map_err(|e| Error::InvalidArgument(format!("Can't read public key {}: {}", path.to_string_lossy(), &e)))?;
		config = config.with_pinned_key(key);
	}
	Ok(config)
}

fn main() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let args = Args::parse();

	let updater = match config_from_args(&args).and_then(|c| Updater::from_config(&c)) {
		Ok(u) => u,
		Err(e) => {
			eprintln!("{}", &e);
			exit(RunStatus::Aborted.exit_code());
		}
	};

	let result = updater.update();
	let status = RunStatus::of(&result);
	match (&result, status) {
		(Ok(outcome), _) => println!("{}", outcome),
		(Err(e), RunStatus::ViolationDetected) => eprintln!("VIOLATION DETECTED: {}", e),
		(Err(e), RunStatus::NotPersisted) => eprintln!("Verified, but not saved: {}", e),
		(Err(e), _) => eprintln!("Aborted: {}", e),
	}
	exit(status.exit_code());
}
