//! Command-line surface. Everything here is bootstrap-level: it is read
//! once at process start and never touches `config.json` — changing any of
//! it means restarting the process.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use sorter_common::config::{BootstrapConfig, GpioMode as ConfigGpioMode};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GpioModeArg {
    Bcm,
    Board,
}

impl From<GpioModeArg> for ConfigGpioMode {
    fn from(arg: GpioModeArg) -> Self {
        match arg {
            GpioModeArg::Bcm => ConfigGpioMode::Bcm,
            GpioModeArg::Board => ConfigGpioMode::Board,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "sorter", about = "Gated-FIFO conveyor sort controller")]
pub struct Cli {
    /// Directory holding `config.json` and `sort_log.json`. Created if it
    /// does not already exist.
    #[arg(long, default_value = "./data")]
    pub config_dir: PathBuf,

    /// Address the HTTP/WebSocket control plane binds to.
    #[arg(long, default_value = "0.0.0.0:3000")]
    pub bind_addr: SocketAddr,

    /// GPIO pin-numbering scheme. Overrides whatever `config.json` has on
    /// disk; a later `POST /api/config` can still change it, which sets
    /// `restart_required`.
    #[arg(long, value_enum, default_value = "bcm")]
    pub gpio_mode: GpioModeArg,

    /// Use the in-memory mock GPIO provider instead of the real sysfs one.
    /// Mainly for development and tests; required on any host without
    /// `/sys/class/gpio`.
    #[arg(long)]
    pub mock_gpio: bool,

    /// Index of the video capture device the detector pipeline should
    /// open. Unused while the shipped `NullDetector` is wired in.
    #[arg(long, default_value_t = 0)]
    pub camera_index: i32,

    /// BCM pin of the entry/gate sensor.
    #[arg(long, default_value_t = 6)]
    pub entry_sensor_pin: u32,

    /// Require a bearer/query token on every authenticated route.
    #[arg(long)]
    pub auth_enabled: bool,

    /// Admin username, surfaced for operator tooling; not itself checked
    /// against the token.
    #[arg(long, default_value = "admin")]
    pub admin_user: String,

    /// Plaintext admin token. Hashed once at startup into
    /// `BootstrapConfig::admin_password_hash`; never logged or persisted.
    #[arg(long, default_value = "")]
    pub admin_token: String,
}

/// Build the [`BootstrapConfig`] `main` passes down to the API layer. Split
/// out from `Cli` so the plaintext token never lives inside a struct that
/// could accidentally be `Debug`-logged in full.
pub fn build_bootstrap(cli: &Cli) -> BootstrapConfig {
    let admin_password_hash = if cli.admin_token.is_empty() {
        String::new()
    } else {
        sorter_api::auth::hash_token(&cli.admin_token)
    };

    BootstrapConfig {
        auth_enabled: cli.auth_enabled,
        admin_user: cli.admin_user.clone(),
        admin_password_hash,
        camera_index: cli.camera_index,
        bind_addr: cli.bind_addr,
        entry_sensor_pin: cli.entry_sensor_pin,
    }
}
