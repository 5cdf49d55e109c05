// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::args::Args;
use crate::host::{ConsoleBus, WorldHost};
use crate::lock::WorldLock;
use clap::Parser;
use dimsum_common::tracing;
use dimsum_db::{EntityStorage, FjallStorage};
use dimsum_kernel::Domain;
use eyre::{Report, eyre};
use flume::RecvTimeoutError;
use std::io::BufRead;
use std::rc::Rc;
use std::sync::Arc;
use ::tracing::{error, info};

mod args;
mod host;
mod lock;

/// Lines from stdin, read on their own thread so the main loop can wait on input and the
/// scheduler at once.
fn spawn_console() -> Result<flume::Receiver<String>, Report> {
    let (tx, rx) = flume::unbounded();
    std::thread::Builder::new()
        .name("dimsum-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::parse();
    tracing::init_tracing(args.debug).map_err(|e| eyre!("Unable to configure logging: {}", e))?;
    let config = args.load_config()?;

    let _lock = WorldLock::acquire(&args.data_dir, &args.player)?;
    let db_path = args.resolved_db_path();
    let (store, fresh) = FjallStorage::open(&db_path)
        .map_err(|e| eyre!("Unable to open entity storage at {:?}: {}", db_path, e))?;
    let store = Arc::new(store);
    info!(
        fresh,
        entities = store.number_of_entities()?,
        "entity storage ready"
    );

    let domain = Domain::builder(store.clone())
        .config(config)
        .bus(Rc::new(ConsoleBus))
        .build();
    let host = WorldHost::open(domain, &args.player)?;
    println!("{}", host.command("look")?);

    let console = spawn_console()?;
    loop {
        let received = match host.next_wake() {
            Some(wait) => console.recv_timeout(wait),
            None => console.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(line) => {
                let line = line.trim();
                if line == "quit" {
                    break;
                }
                if !line.is_empty() {
                    match host.command(line) {
                        Ok(reply) => println!("{reply}"),
                        Err(e) => {
                            error!(%e, command = line, "command failed");
                            println!("That didn't work.");
                            host.recover()?;
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if host.is_due()
            && let Err(e) = host.service()
        {
            error!(%e, "service failed");
            host.recover()?;
        }
    }

    info!("shutting down");
    drop(host);
    store.close()?;
    Ok(())
}
