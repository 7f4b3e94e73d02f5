// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Command line client for smart sockets
//!
//! ```bash
//! smartdose 192.168.2.17 INFO
//! smartdose socket.local:1502:1 TIMER 3 ACTIVE ON WORKDAYS 06:45
//! smartdose 127.0.0.1:1502 EVERY 10
//! ```

use std::net::SocketAddr;

use clap::error::ErrorKind;
use clap::Parser;
use log::debug;
use smart_socket::client::command::usage;
use smart_socket::client::registers::{format_timer, TABLE_HEADER};
use smart_socket::client::{ClientError, Command, SocketClient, Target};
use smart_socket::device::FULL_ON;
use tokio::time::{sleep, Duration};

/// Modbus client for the smart socket register map
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Socket to address: host[:port[:serverID]]
    target: String,

    /// Command and its arguments, INFO when omitted
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

async fn resolve(target: &Target) -> Result<SocketAddr, ClientError> {
    let resolve_error = |reason: String| ClientError::Resolve {
        host: target.host.clone(),
        reason,
    };
    tokio::net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|err| resolve_error(err.to_string()))?
        .next()
        .ok_or_else(|| resolve_error("no address found".to_string()))
}

fn require(has: bool, command: &'static str, capability: &'static str) -> Result<(), ClientError> {
    if has {
        Ok(())
    } else {
        Err(ClientError::Unsupported {
            command,
            capability,
        })
    }
}

/// INFO output for `loop_count` 0, EVERY table rows after that.
async fn show_state(client: &mut SocketClient, loop_count: u64) -> Result<(), ClientError> {
    let basic = client.basic_info().await?;
    if loop_count == 0 {
        for line in basic.describe() {
            println!("{}", line);
        }
    } else {
        if loop_count % 24 == 1 {
            println!("{}", TABLE_HEADER);
        }
        print!("{}", basic.row(loop_count));
    }

    if basic.has_power_meter() {
        let power = client.power_info().await?;
        if loop_count == 0 {
            for line in power.describe() {
                println!("{}", line);
            }
        } else {
            println!("{}", power.row());
        }
    } else if loop_count > 0 {
        println!();
    }

    if basic.has_timers() && loop_count == 0 {
        for (index, slot) in client.timers().await?.iter().enumerate() {
            println!("{}", format_timer(index + 1, slot));
        }
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), ClientError> {
    let target: Target = args.target.parse()?;
    let command = Command::parse(&args.command)?;
    debug!("Command: {:?}", command);

    let address = resolve(&target).await?;
    println!("Using {}", target);
    let mut client = SocketClient::connect(address, target.server_id).await?;

    match command {
        Command::Info => show_state(&mut client, 0).await?,
        Command::Every(seconds) => {
            let mut loop_count = 0;
            loop {
                show_state(&mut client, loop_count).await?;
                loop_count += 1;
                sleep(Duration::from_secs(seconds)).await;
            }
        }
        Command::On => client.switch(FULL_ON).await?,
        Command::Off => client.switch(0).await?,
        Command::Default(on) => {
            if !client.set_default_on(on).await? {
                println!("Default is already {}", if on { "ON" } else { "OFF" });
            }
        }
        Command::Reset => {
            let flags = client.basic_info().await?;
            require(flags.has_power_meter(), "RESET", "a power meter")?;
            client.reset_energy().await?;
        }
        Command::Adjust(request) => {
            let basic = client.basic_info().await?;
            require(basic.has_power_meter(), "ADJUST", "a power meter")?;
            match request {
                None => {
                    for line in client.power_info().await?.describe_factors() {
                        println!("{}", line);
                    }
                }
                Some((quantity, factor)) => {
                    let factor = client.calibrate(quantity, factor).await?;
                    println!("{}: {:10.5}", quantity.unit(), factor);
                }
            }
        }
        Command::Timer { index, edits } => {
            let basic = client.basic_info().await?;
            require(basic.has_timers(), "TIMER", "timers")?;
            let mut slot = client.timer(index).await?;
            if !edits.is_empty() {
                for edit in edits {
                    edit.apply(&mut slot);
                }
                slot = client.set_timer(index, &slot).await?;
            }
            println!("{}", format_timer(index + 1, &slot));
        }
        Command::Events => {
            let events = client.events().await?;
            if events.is_empty() {
                println!("No events logged");
            }
            for (number, event) in events.iter().enumerate() {
                println!("{:2}: {}", number + 1, event);
            }
        }
        Command::AutoOff(settings) => {
            let basic = client.basic_info().await?;
            require(basic.has_power_meter(), "AUTOOFF", "a power meter")?;
            if let Some((threshold, cycles)) = settings {
                client.set_auto_off(threshold, cycles).await?;
            }
            match client.auto_off().await? {
                (0, _) | (_, 0) => println!("Auto-off disabled"),
                (threshold, cycles) => {
                    println!("Auto-off below {} mA for {} cycles", threshold, cycles)
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "warn"),
    );

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            eprintln!("{}", err);
            println!("{}", usage());
            std::process::exit(-1);
        }
    };

    if let Err(err) = run(args).await {
        match err {
            ClientError::Usage { .. } => {
                println!("{}", err);
                println!("{}", usage());
            }
            _ => eprintln!("{}", err),
        }
        std::process::exit(err.exit_code());
    }
}
