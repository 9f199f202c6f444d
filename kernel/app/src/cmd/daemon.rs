// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use kernel_app_options::daemon::{DaemonArgs, DaemonCommands};
use kernel_app_settings::Settings;
use kernel_message::{CapData, Value};
use kernel_remote::{Event, OcapRequest, OcapResponse, PeerIdentity, Service};
use kernel_store::tables::directory::RemotePeerRecord;
use kernel_store::KernelStore;
use libp2p::PeerId;
use multiaddr::Multiaddr;
use tracing::{info, warn};

use crate::app::App;
use crate::cmd::Cmd;

crate::cmd! {
  DaemonArgs(self, settings) {
    let DaemonCommands::Run { rpc_listen, remote_listen, sweep_interval_secs } = &self.command;
    run(settings, rpc_listen.clone(), remote_listen.clone(), *sweep_interval_secs).await
  }
}

async fn run(
    settings: Settings,
    rpc_listen: String,
    remote_listen: String,
    sweep_interval_secs: u64,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(settings.db_path().parent().unwrap_or(std::path::Path::new(".")))
        .context("creating database directory")?;
    let store = KernelStore::open(settings.db_path()).context("opening kernel store")?;

    // The incarnation counter bumps once per process start. Every promise
    // already in the store was necessarily issued under the incarnation that
    // just ended, so none of them can be trusted to still resolve.
    let new_incarnation = {
        let mut tx = store.begin()?;
        let incarnation = tx.bump_incarnation()?;
        let stale = CapData::encode(&Value::Error {
            name: "IncarnationBumpError".to_string(),
            message: "kernel restarted; promises issued under the previous incarnation were rejected".to_string(),
        })
        .expect("encoding a fixed error value never fails");
        let rejected = tx.reject_all_unresolved_promises(stale)?;
        tx.commit()?;
        if !rejected.is_empty() {
            info!(count = rejected.len(), incarnation, "rejected stale promises on incarnation bump");
        }
        incarnation
    };
    let known_remotes = store.read().list_remotes()?;

    let app = std::sync::Arc::new(App::new(store, settings.bundles_dir()));

    let scheduler = app.scheduler_handle();
    let crank_task = tokio::spawn(async move {
        loop {
            let ran = {
                let mut scheduler = scheduler.lock().await;
                scheduler.run_one_crank().await
            };
            match ran {
                Ok(true) => continue,
                Ok(false) => tokio::time::sleep(Duration::from_millis(50)).await,
                Err(e) => warn!(error = %e, "crank failed"),
            }
        }
    });

    let sweep_task = if sweep_interval_secs > 0 {
        let scheduler = app.scheduler_handle();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval_secs));
            loop {
                interval.tick().await;
                let mut scheduler = scheduler.lock().await;
                if let Err(e) = scheduler.run_bring_out_your_dead() {
                    warn!(error = %e, "bringOutYourDead sweep failed");
                }
            }
        }))
    } else {
        None
    };

    let key_bytes =
        std::fs::read(settings.remote_key_path()).context("reading remote peer key; run `kernel keygen` first")?;
    let identity = PeerIdentity::from_protobuf_bytes(&key_bytes)?;
    let listen_addr = Multiaddr::from_str(&remote_listen).context("invalid remote listen multiaddr")?;
    let (service, client) = Service::new(identity.keypair().clone(), listen_addr)?;
    info!(peer = %service.peer_id(), "remote peer identity loaded");
    let mut events = service.subscribe();
    let remote_client_for_events = client.clone();
    let app_for_events = app.clone();
    let remote_task = tokio::spawn(async move { service.run().await });

    // Tell every peer we've talked to before that we restarted, so they can
    // drop promises pipelined through our old incarnation. Best-effort: a
    // peer that's offline right now will learn of the bump next time it
    // tries to redeem or send against a stale incarnation instead.
    for remote in known_remotes {
        let peer = match PeerId::from_str(&remote.id) {
            Ok(peer) => peer,
            Err(e) => {
                warn!(peer = %remote.id, error = %e, "remote peer record has an unparseable peer id, skipping bump notice");
                continue;
            }
        };
        let client = client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.notify_incarnation_bump(peer, new_incarnation).await {
                warn!(%peer, error = %e, "failed to notify peer of incarnation bump");
            }
        });
    }

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Inbound { peer, request, channel } => {
                    let response = match request {
                        OcapRequest::Redeem { swiss_num } => {
                            warn!(%peer, %swiss_num, "inbound ocap redemption has no redemption registry wired up yet");
                            OcapResponse::Redeemed { ok: false }
                        }
                        OcapRequest::Send { swiss_num, .. } => {
                            warn!(%peer, %swiss_num, "inbound ocap send has no redemption registry wired up yet");
                            OcapResponse::SendAccepted {
                                ok: false,
                                error: Some("remote redemption is not yet wired to the kernel store".to_string()),
                            }
                        }
                        OcapRequest::IncarnationBump { incarnation } => {
                            info!(%peer, incarnation, "peer kernel restarted under a new incarnation");
                            if let Err(e) = record_peer_incarnation(&app_for_events, peer, incarnation).await {
                                warn!(%peer, error = %e, "failed to record peer incarnation bump");
                            }
                            OcapResponse::Ack
                        }
                    };
                    let _ = remote_client_for_events.respond(channel, response);
                }
            }
        }
    });

    info!(%rpc_listen, "starting RPC facade");
    let rpc_addr: std::net::SocketAddr = rpc_listen.parse().context("invalid RPC listen address")?;
    kernel_rpc::listen(rpc_addr, app).await?;

    crank_task.abort();
    if let Some(task) = sweep_task {
        task.abort();
    }
    remote_task.abort();
    event_task.abort();
    Ok(())
}

/// Updates bookkeeping for a peer's incarnation after it notifies us of its
/// own restart. There is no link from a remote peer to specific local
/// promises, so this does not reject anything by itself; it only lets future
/// redemptions notice a stale incarnation.
async fn record_peer_incarnation(app: &std::sync::Arc<App>, peer: PeerId, incarnation: u64) -> anyhow::Result<()> {
    let scheduler = app.scheduler_handle();
    let scheduler = scheduler.lock().await;
    let mut tx = scheduler.store().begin()?;
    let address = tx.remote(&peer.to_string())?.map(|r| r.address).unwrap_or_default();
    tx.put_remote(&RemotePeerRecord {
        id: peer.to_string(),
        address,
        incarnation,
    })?;
    tx.commit()?;
    Ok(())
}
