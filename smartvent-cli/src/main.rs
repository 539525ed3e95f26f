//! SmartVent command-line client
//!
//! Provisions a vent over BLE, remembers the address it gets on the network,
//! and drives it over HTTP from then on.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use smartvent_ble_controller::{
    BleRadio, Handoff, Provisioner, ProvisionerConfig, Radio, SessionConfig,
};
use smartvent_control::{AddressStore, Advisory, ControlClient, FileStore, StateStore};
use smartvent_proto::ble::DEVICE_NAME;
use smartvent_proto::{
    DeviceState, HTTP_PORT, ProvisioningPayload, ServerAddress, Thresholds, WindowAction,
};
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

type CliResult<T = ()> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "smartvent")]
#[command(about = "Provision and control SmartVent window actuators")]
struct Cli {
    /// Advertised BLE name of the device
    #[arg(long, global = true, default_value = DEVICE_NAME)]
    device_name: String,
    /// Port of the device control plane
    #[arg(long, global = true, default_value_t = HTTP_PORT)]
    port: u16,
    /// HTTP request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    request_timeout: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send Wi-Fi credentials, location and thresholds over BLE
    Provision {
        #[arg(long)]
        ssid: String,
        #[arg(long)]
        password: String,
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: String,
        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: String,
        /// Static address for the device to use
        #[arg(long)]
        ip: Option<String>,
        /// Close above this temperature (°C)
        #[arg(long, allow_hyphen_values = true, requires_all = ["temp_min", "aqi_max", "aqi_min"])]
        temp_max: Option<f64>,
        #[arg(long, allow_hyphen_values = true, requires = "temp_max")]
        temp_min: Option<f64>,
        #[arg(long, requires = "temp_max")]
        aqi_max: Option<i32>,
        #[arg(long, requires = "temp_max")]
        aqi_min: Option<i32>,
        /// Seconds allowed for the configuration write
        #[arg(long, default_value_t = 15)]
        configure_timeout: u64,
        /// Seconds allowed for the address read-back
        #[arg(long, default_value_t = 10)]
        address_timeout: u64,
        /// Seconds to wait for the device to reboot onto the network
        #[arg(long, default_value_t = 5)]
        reboot_delay: u64,
    },
    /// Read the device's network address over BLE and remember it
    Address {
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Remember a device address entered by hand (0.0.0.0 forgets it)
    SetAddress { address: String },
    /// Show the current device state
    Status,
    Open,
    Close,
    /// Move to an angle between 0 and 90 degrees
    Angle {
        #[arg(allow_hyphen_values = true)]
        degrees: f64,
    },
    /// Switch automatic mode on or off
    Auto {
        #[arg(value_enum)]
        mode: Toggle,
    },
    /// Clear a safety lockout
    ResetSafety,
    /// Update operating thresholds
    Thresholds {
        #[arg(allow_hyphen_values = true)]
        temp_max: String,
        #[arg(allow_hyphen_values = true)]
        temp_min: String,
        aqi_max: String,
        aqi_min: String,
    },
    /// Refresh and print the device state periodically
    Watch {
        /// Seconds between refreshes
        #[arg(short, long, default_value_t = 5)]
        interval: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let home = smartvent_home();

    if let Err(e) = run(cli, &home).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn smartvent_home() -> PathBuf {
    std::env::var_os("SMARTVENT_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".smartvent")
        })
}

async fn run(cli: Cli, home: &Path) -> CliResult {
    let Cli {
        device_name,
        port,
        request_timeout,
        command,
    } = cli;
    let settings = FileStore::new(home);
    let http = Http {
        port,
        timeout: Duration::from_secs(request_timeout),
    };

    match command {
        Commands::Provision {
            ssid,
            password,
            lat,
            lon,
            ip,
            temp_max,
            temp_min,
            aqi_max,
            aqi_min,
            configure_timeout,
            address_timeout,
            reboot_delay,
        } => {
            let mut payload = ProvisioningPayload::new(ssid, password, lat, lon);
            if let Some(ip) = ip {
                payload = payload.with_address_override(ip);
            }
            if let (Some(temp_max), Some(temp_min), Some(aqi_max), Some(aqi_min)) =
                (temp_max, temp_min, aqi_max, aqi_min)
            {
                payload = payload.with_thresholds(Thresholds {
                    temp_max,
                    temp_min,
                    aqi_max,
                    aqi_min,
                });
            }
            let config = ProvisionerConfig {
                session: SessionConfig {
                    device_name,
                    configure_deadline: Duration::from_secs(configure_timeout),
                    address_deadline: Duration::from_secs(address_timeout),
                },
                reboot_delay: Duration::from_secs(reboot_delay),
            };
            provision(&settings, &http, config, &payload).await
        }
        Commands::Address { timeout } => {
            let config = ProvisionerConfig {
                session: SessionConfig {
                    device_name,
                    address_deadline: Duration::from_secs(timeout),
                    ..SessionConfig::default()
                },
                ..ProvisionerConfig::default()
            };
            read_address(&settings, config).await
        }
        Commands::SetAddress { address } => {
            let address: ServerAddress = address.parse()?;
            settings.save(address)?;
            if address.is_unknown() {
                println!("Device address cleared");
            } else {
                println!("Device address set to {address}");
            }
            Ok(())
        }
        Commands::Watch { interval } => {
            let (client, advisories) = http.connect(&settings)?;
            watch(&client, advisories, Duration::from_secs(interval.max(1))).await
        }
        command => {
            let (client, mut advisories) = http.connect(&settings)?;
            let result = match command {
                Commands::Status => client.fetch_state().await.map(Some),
                Commands::Open => client.send_command(WindowAction::Open).await,
                Commands::Close => client.send_command(WindowAction::Close).await,
                Commands::Angle { degrees } => client.send_angle(degrees).await,
                Commands::Auto { mode } => {
                    client
                        .toggle_auto_mode(matches!(mode, Toggle::On))
                        .await
                }
                Commands::ResetSafety => client.reset_safety_lockout().await,
                Commands::Thresholds {
                    temp_max,
                    temp_min,
                    aqi_max,
                    aqi_min,
                } => {
                    client
                        .update_thresholds(&temp_max, &temp_min, &aqi_max, &aqi_min)
                        .await
                }
                _ => return Ok(()),
            };
            while let Ok(advisory) = advisories.try_recv() {
                println!("{advisory}");
            }
            match result? {
                Some(state) => print_state(&state),
                None => println!("Command accepted; the device status could not be read."),
            }
            Ok(())
        }
    }
}

/// Control-plane connection settings shared by the HTTP subcommands
struct Http {
    port: u16,
    timeout: Duration,
}

impl Http {
    fn connect(
        &self,
        settings: &FileStore,
    ) -> CliResult<(ControlClient, mpsc::UnboundedReceiver<Advisory>)> {
        let address = settings.load()?;
        if address.is_unknown() {
            return Err(
                "no device address known, run `smartvent provision` or `smartvent set-address`"
                    .into(),
            );
        }
        let (client, advisories) = ControlClient::new(address, StateStore::new());
        Ok((
            client.with_port(self.port).with_request_timeout(self.timeout),
            advisories,
        ))
    }
}

async fn provision(
    settings: &FileStore,
    http: &Http,
    config: ProvisionerConfig,
    payload: &ProvisioningPayload,
) -> CliResult {
    let provisioner = Provisioner::new(BleRadio::new().await?, config);

    let handoff = tokio::select! {
        handoff = provisioner.configure_device(payload) => handoff,
        () = print_progress(&provisioner) => return Err("status feed closed".into()),
    };

    match handoff {
        Handoff::Ready(address) => {
            settings.save(address)?;
            println!("Device is online at {address}");
            let (client, _advisories) = http.connect(settings)?;
            match client.fetch_state().await {
                Ok(state) => print_state(&state),
                Err(e) => warn!("first status read failed: {e}"),
            }
            Ok(())
        }
        Handoff::Busy => Err("provisioning already in progress".into()),
        Handoff::Invalid(e) => Err(e.into()),
        Handoff::Failed(_) => Err(provisioner.status().into()),
        Handoff::AddressUnavailable(issue) => {
            warn!(?issue, "no usable address after configuration");
            println!("Configuration was sent, but the device is not reachable yet.");
            println!("Run `smartvent address` once it has joined, or `smartvent set-address <ip>`.");
            Err(provisioner.status().into())
        }
    }
}

async fn read_address(settings: &FileStore, config: ProvisionerConfig) -> CliResult {
    let provisioner = Provisioner::new(BleRadio::new().await?, config);

    let result = tokio::select! {
        result = provisioner.fetch_device_address() => result,
        () = print_progress(&provisioner) => return Err("status feed closed".into()),
    };

    let raw = match result {
        None => return Err("provisioning already in progress".into()),
        Some(Err(_)) => return Err(provisioner.status().into()),
        Some(Ok(raw)) => raw,
    };
    let address: ServerAddress = raw.parse()?;
    if address.is_unknown() {
        return Err("device has not joined the network yet".into());
    }
    settings.save(address)?;
    println!("Device address saved: {address}");
    Ok(())
}

/// Print every status change until the provisioner goes away
async fn print_progress<R: Radio>(provisioner: &Provisioner<R>) {
    let mut phases = provisioner.subscribe();
    let mut notices = provisioner.subscribe_notices();
    let mut last = String::new();

    loop {
        let changed = tokio::select! {
            r = phases.changed() => r,
            r = notices.changed() => r,
        };
        if changed.is_err() {
            return;
        }
        let status = provisioner.status();
        if status != last {
            println!("{status}");
            last = status;
        }
    }
}

async fn watch(
    client: &ControlClient,
    mut advisories: mpsc::UnboundedReceiver<Advisory>,
    interval: Duration,
) -> CliResult {
    let mut states = client.store().subscribe();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // failures are logged by the client and retried on the next tick
                let _ = client.fetch_state().await;
            }
            Ok(()) = states.changed() => {
                if let Some(state) = states.borrow_and_update().clone() {
                    print_state(&state);
                }
            }
            Some(advisory) = advisories.recv() => println!("{advisory}"),
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn print_state(state: &DeviceState) {
    println!(
        "{} at {}°, {}, temp {:.1}°C, AQI {}, load {:.0}{}",
        if state.is_open { "Open" } else { "Closed" },
        state.target_angle,
        if state.auto_mode { "auto" } else { "manual" },
        state.temperature,
        state.aqi,
        state.current_load,
        if state.safety_lockout {
            ", SAFETY LOCKOUT"
        } else {
            ""
        },
    );

    let t = &state.thresholds;
    if t.temp_max.is_some() || t.aqi_max.is_some() {
        println!(
            "  thresholds: temp {}..{}°C, AQI {}..{}",
            show(t.temp_min),
            show(t.temp_max),
            show(t.aqi_min),
            show(t.aqi_max),
        );
    }
}

fn show<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
