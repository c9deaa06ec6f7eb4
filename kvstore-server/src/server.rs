//! RESP TCP listener: one task per connection, each dispatching commands
//! against a shared [`Commands`] instance. A fatal [`EngineError`] (a
//! persistence failure) aborts the whole process rather than just the
//! connection, per the error taxonomy's disposition for `PersistenceError`.

use kvstore_engine::Commands;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::dispatch::{dispatch, DispatchOutcome};
use crate::resp::{read_command, write_reply};

/// Binds `addr` and accepts RESP connections on it until `shutdown`
/// fires. Does not itself wait for in-flight connections to drain on
/// shutdown; the listener simply stops accepting new ones.
pub async fn serve_resp(addr: SocketAddr, commands: Arc<Commands>, shutdown: tokio::sync::watch::Receiver<bool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "RESP listener bound");
    serve_on(listener, commands, shutdown).await
}

/// Like [`serve_resp`] but over an already-bound listener, so callers (and
/// tests) that need the OS-assigned port can read it before serving.
pub async fn serve_on(listener: TcpListener, commands: Arc<Commands>, mut shutdown: tokio::sync::watch::Receiver<bool>) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let commands = commands.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, commands).await {
                        warn!(%peer, error = %e, "connection closed with error");
                    }
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("RESP listener received shutdown signal");
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn handle_connection(stream: tokio::net::TcpStream, commands: Arc<Commands>) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let argv = match read_command(&mut reader).await {
            Ok(Some(argv)) if !argv.is_empty() => argv,
            Ok(Some(_)) => continue,
            Ok(None) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match dispatch(&commands, &argv) {
            DispatchOutcome::Reply(value) => write_reply(&mut write_half, &value).await?,
            DispatchOutcome::Fatal(e) => {
                error!(error = %e, "fatal persistence error, aborting process");
                std::process::exit(2);
            }
        }
    }
}
