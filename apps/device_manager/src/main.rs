mod config;
mod simulated;

use std::{io::Write, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    ChooseMethodViewModel, DeviceListState, DevicesAction, DevicesConfig, DevicesController,
    DevicesViewEvent, UiError, ViewEventStream,
};
use shared::domain::{CryptoDeviceInfo, DeviceId, SessionInfo, TransactionId, UserId};
use tokio::{sync::watch, time::timeout};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use crate::{config::load_settings, simulated::SimulatedHomeserver};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "device_manager.toml")]
    config: PathBuf,
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    device_id: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List,
    Rename {
        device_id: String,
        name: String,
    },
    Delete {
        device_id: String,
        #[arg(long)]
        password: Option<String>,
    },
    Verify {
        device_id: String,
    },
    Trust {
        device_id: String,
    },
}

enum Outcome {
    Settled,
    Failed(UiError),
    PasswordRequested,
    VerificationStarted(TransactionId),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(user_id) = cli.user_id {
        settings.user_id = user_id;
    }
    if let Some(device_id) = cli.device_id {
        settings.device_id = Some(device_id).filter(|id| !id.is_empty());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = SimulatedHomeserver::new(&settings);
    let session = SessionInfo {
        user_id: UserId::new(settings.user_id.clone()),
        device_id: settings.device_id.clone().map(DeviceId::new),
    };
    let controller = DevicesController::spawn(
        session.clone(),
        server.clone(),
        server.clone(),
        DevicesConfig::default(),
    );
    let mut events = controller.subscribe_events();
    let mut state = controller.subscribe_state();
    let limit = settings.operation_timeout();

    if session.device_id.is_none() {
        warn!("no device id configured; the device list stays empty");
    } else {
        match run_until(&mut events, &mut state, limit, |s| s.completed_refreshes > 0).await? {
            Outcome::Failed(err) => bail!("initial refresh failed: {err}"),
            _ => debug!("initial refresh done"),
        }
    }

    match cli.command {
        Command::List => {}
        Command::Rename { device_id, name } => {
            let baseline = state.borrow().completed_refreshes;
            controller.handle(DevicesAction::Rename {
                device_id: DeviceId::new(device_id),
                new_name: name,
            });
            expect_settled(
                run_until(&mut events, &mut state, limit, |s| {
                    s.completed_refreshes > baseline
                })
                .await?,
            )?;
        }
        Command::Delete {
            device_id,
            password,
        } => {
            let baseline = state.borrow().completed_refreshes;
            controller.handle(DevicesAction::Delete(DeviceId::new(device_id)));
            let done = |s: &DeviceListState| s.completed_refreshes > baseline;
            match run_until(&mut events, &mut state, limit, done).await? {
                Outcome::PasswordRequested => {
                    let password = match password {
                        Some(password) => Zeroizing::new(password),
                        None => prompt_password().await?,
                    };
                    controller.handle(DevicesAction::Password(password));
                    expect_settled(run_until(&mut events, &mut state, limit, done).await?)?;
                }
                other => expect_settled(other)?,
            }
        }
        Command::Verify { device_id } => {
            let baseline = state.borrow().completed_refreshes;
            controller.handle(DevicesAction::VerifyMyDevice(DeviceId::new(device_id)));
            let done = |s: &DeviceListState| s.completed_refreshes > baseline;
            match run_until(&mut events, &mut state, limit, done).await? {
                Outcome::VerificationStarted(transaction_id) => {
                    let methods = ChooseMethodViewModel::spawn(
                        server.clone(),
                        session.user_id.clone(),
                        transaction_id.clone(),
                    );
                    info!(transaction_id = %transaction_id, "verification started");
                    expect_settled(run_until(&mut events, &mut state, limit, done).await?)?;
                    let methods = methods.state();
                    println!(
                        "verification {transaction_id}: sas={} show_qr={} scan_qr={}",
                        methods.sas_mode_available,
                        methods.other_can_show_qr_code,
                        methods.other_can_scan_qr_code,
                    );
                }
                other => expect_settled(other)?,
            }
        }
        Command::Trust { device_id } => {
            let device_id = DeviceId::new(device_id);
            let Some(device) = state.borrow().crypto_device(&device_id).cloned() else {
                bail!("unknown device {device_id}");
            };
            controller.handle(DevicesAction::MarkAsManuallyVerified(device));
            expect_settled(
                run_until(&mut events, &mut state, limit, |s| {
                    s.crypto_device(&device_id)
                        .is_some_and(CryptoDeviceInfo::is_verified)
                })
                .await?,
            )?;
        }
    }

    print_devices(&state.borrow());
    Ok(())
}

/// Waits for the controller to either satisfy `done` or emit an event the caller must act on.
async fn run_until(
    events: &mut ViewEventStream<DevicesViewEvent>,
    state: &mut watch::Receiver<DeviceListState>,
    limit: Duration,
    done: impl FnMut(&DeviceListState) -> bool,
) -> Result<Outcome> {
    timeout(limit, next_outcome(events, state, done))
        .await
        .context("timed out waiting for the device list")?
}

async fn next_outcome(
    events: &mut ViewEventStream<DevicesViewEvent>,
    state: &mut watch::Receiver<DeviceListState>,
    mut done: impl FnMut(&DeviceListState) -> bool,
) -> Result<Outcome> {
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(DevicesViewEvent::Failure(err)) => {
                    println!("event: failure ({:?}/{:?}): {err}", err.category(), err.context());
                    return Ok(Outcome::Failed(err));
                }
                Some(DevicesViewEvent::RequestPassword) => {
                    println!("event: password required");
                    return Ok(Outcome::PasswordRequested);
                }
                Some(DevicesViewEvent::ShowVerifyDevice { user_id, transaction_id }) => {
                    println!("event: verify device with {user_id} ({transaction_id})");
                    return Ok(Outcome::VerificationStarted(transaction_id));
                }
                Some(DevicesViewEvent::Loading(message)) => {
                    println!("event: loading{}", message.map(|m| format!(" {m}")).unwrap_or_default());
                }
                Some(other) => println!("event: {other:?}"),
                None => bail!("device controller stopped"),
            },
            changed = state.wait_for(&mut done) => {
                changed.context("device controller stopped")?;
                return Ok(Outcome::Settled);
            }
        }
    }
}

fn expect_settled(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Settled => Ok(()),
        Outcome::Failed(err) => bail!("{err}"),
        Outcome::PasswordRequested => bail!("server asked for a password unexpectedly"),
        Outcome::VerificationStarted(transaction_id) => {
            bail!("unexpected verification {transaction_id}")
        }
    }
}

async fn prompt_password() -> Result<Zeroizing<String>> {
    tokio::task::spawn_blocking(|| {
        print!("password: ");
        std::io::stdout().flush()?;
        let mut line = Zeroizing::new(String::new());
        std::io::stdin().read_line(&mut line)?;
        let trimmed = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
        Ok::<_, anyhow::Error>(trimmed)
    })
    .await?
}

fn print_devices(state: &DeviceListState) {
    let Some(devices) = state.devices.value() else {
        match state.devices.error() {
            Some(err) => println!("devices unavailable: {err}"),
            None => println!("no devices loaded"),
        }
        return;
    };

    for device in devices {
        let verified = state
            .crypto_device(&device.device_id)
            .is_some_and(CryptoDeviceInfo::is_verified);
        let last_seen = device
            .last_seen_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        let marker = if state.my_device_id.as_ref() == Some(&device.device_id) {
            " (this device)"
        } else {
            ""
        };
        println!(
            "{:<14} {:<20} {:<10} {:<16} {}{}",
            device.device_id,
            device.display_name_or_id(),
            if verified { "verified" } else { "unverified" },
            last_seen,
            device.last_seen_ip.as_deref().unwrap_or("-"),
            marker,
        );
    }
}
