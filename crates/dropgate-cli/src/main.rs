//! A thin `send`/`receive` harness over both transfer modes, standing in for
//! the desktop shell that drives `dropgate-client` and `dropgate-p2p`.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use dropgate_client::{DownloadPhase, DownloadSession, FsFileSource, UploadPhase, UploadSession};
use dropgate_crypto::keys;
use dropgate_p2p::receiver::{self, ReceiverEvent};
use dropgate_p2p::sender::{self, SenderEvent};
use dropgate_p2p::{TransferConfig, loopback_pair, new_session_id};

#[derive(Parser)]
#[command(name = "dropgate")]
#[command(author, version, about = "Send and receive files with Dropgate")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file to a Dropgate server.
    Send {
        file: PathBuf,
        #[arg(long, env = "DROPGATE_SERVER", default_value = "http://localhost:3000")]
        server: String,
        #[arg(long)]
        encrypt: bool,
        #[arg(long, default_value_t = 24)]
        lifetime_hours: u64,
    },
    /// Download a file previously shared via `send`.
    ///
    /// `share_url` is whatever `send` printed: a plain URL, or one with a
    /// `#<base64-key>` fragment for an encrypted upload.
    Receive {
        share_url: String,
        output: PathBuf,
    },
    /// Run a sender and receiver against each other in one process, over the
    /// loopback `DataChannel`, to exercise the Direct Transfer Engine without
    /// a live peer or a real signalling server.
    P2pDemo {
        file: PathBuf,
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "dropgate_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Send { file, server, encrypt, lifetime_hours } => run_send(file, server, encrypt, lifetime_hours).await,
        Command::Receive { share_url, output } => run_receive(share_url, output).await,
        Command::P2pDemo { file, output } => run_p2p_demo(file, output).await,
    }
}

async fn run_send(file: PathBuf, server: String, encrypt: bool, lifetime_hours: u64) -> Result<()> {
    let source = FsFileSource::open(&file).with_context(|| format!("opening {}", file.display()))?;
    let session = UploadSession::new(server);

    let outcome = session
        .upload(&source, lifetime_hours * 3_600_000, encrypt, |phase| match phase {
            UploadPhase::ServerInfo => println!("contacting server..."),
            UploadPhase::Chunk { index, total } => println!("uploading chunk {}/{total}", index + 1),
            UploadPhase::Complete => println!("finalizing..."),
            UploadPhase::RetryWait { attempt } => println!("retry {attempt} pending, backing off..."),
            UploadPhase::Retry { attempt } => println!("retrying (attempt {attempt})..."),
            _ => {}
        })
        .await
        .map_err(|e| anyhow::anyhow!("upload failed: {e}"))?;

    println!("done: {}", outcome.share_url);
    Ok(())
}

async fn run_receive(share_url: String, output: PathBuf) -> Result<()> {
    let (base_and_path, key) = match share_url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(keys::key_from_base64(fragment).map_err(|e| anyhow::anyhow!("{e}"))?)),
        None => (share_url.as_str(), None),
    };
    let (base_url, file_id) = base_and_path
        .rsplit_once('/')
        .context("share URL must contain a path component")?;

    let session = DownloadSession::new(base_url);
    let mut file = std::fs::File::create(&output).with_context(|| format!("creating {}", output.display()))?;

    let on_phase = |phase: DownloadPhase| match phase {
        DownloadPhase::ServerInfo => println!("contacting server..."),
        DownloadPhase::Downloading => println!("downloading..."),
        DownloadPhase::Decrypting => println!("decrypting..."),
        _ => {}
    };

    use std::io::Write;
    let write_chunk = |chunk: &[u8]| -> dropgate_types::Result<()> {
        file.write_all(chunk)
            .map_err(|e| dropgate_types::DropgateError::network(format!("cannot write output: {e}")))
    };

    let outcome = if let Some(key) = key {
        session.download_encrypted(file_id, &key, on_phase, write_chunk).await
    } else {
        session.download_plain(file_id, on_phase, write_chunk).await
    }
    .map_err(|e| anyhow::anyhow!("download failed: {e}"))?;

    println!("done: saved as {} -> {}", outcome.name, output.display());
    Ok(())
}

async fn run_p2p_demo(file: PathBuf, output: PathBuf) -> Result<()> {
    let data = Bytes::from(tokio::fs::read(&file).await.with_context(|| format!("reading {}", file.display()))?);
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();

    let (sender_chan, receiver_chan) = loopback_pair();
    let sender_chan: Arc<dyn dropgate_p2p::DataChannel> = Arc::new(sender_chan);
    let receiver_chan: Arc<dyn dropgate_p2p::DataChannel> = Arc::new(receiver_chan);

    let config = TransferConfig::default();
    let (_sender_handle, sender_cancel_rx) = sender::sender_handle_pair();
    let (_receiver_handle, receiver_cancel_rx) = receiver::receiver_handle_pair();
    let session_id = new_session_id();

    let sender_task = tokio::spawn({
        let config = config.clone();
        async move {
            sender::run_sender(sender_chan, session_id, name, "application/octet-stream".to_string(), data, config, sender_cancel_rx, |ev| {
                if let SenderEvent::Progress { sent, total } = ev {
                    println!("sent {sent}/{total} bytes");
                }
            })
            .await
        }
    });

    let receiver_task = tokio::spawn(async move {
        receiver::run_receiver(receiver_chan, config, receiver_cancel_rx, |ev| {
            if let ReceiverEvent::Progress { received, total } = ev {
                println!("received {received}/{total} bytes");
            }
        })
        .await
    });

    let sender_final = sender_task.await?;
    let (receiver_final, received) = receiver_task.await?;
    println!("sender ended in {sender_final:?}, receiver ended in {receiver_final:?}");

    let Some(received) = received else {
        bail!("transfer did not complete");
    };
    tokio::fs::write(&output, &received.data).await.with_context(|| format!("writing {}", output.display()))?;
    println!("done: saved as {}", output.display());
    Ok(())
}
