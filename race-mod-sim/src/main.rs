//! Scripted mod-side WebSocket client: drives a race participant or
//! training session through auth/ready/play/finish for manual testing and
//! load generation against `race-server`.

use std::time::Duration;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use race_contracts::{ClientFrameV1, ServerFrameV1};
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "race-mod-sim")]
#[command(about = "Simulates an in-game mod driving one participant through a race")]
struct Args {
    /// WebSocket URL of the mod endpoint
    #[arg(long, default_value = "ws://localhost:3001/ws/mod")]
    url: String,

    /// Mod token identifying the participant or training session
    #[arg(long)]
    mod_token: String,

    /// Script file describing zone transitions: `zone_id,igt_ms,deaths` per line
    #[arg(long)]
    script: String,

    /// Delay between script steps, milliseconds, on top of each step's own pacing
    #[arg(long, default_value = "50")]
    step_delay_ms: u64,
}

#[derive(Debug, Clone)]
struct ScriptStep {
    zone: String,
    igt_ms: i64,
    deaths: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();
    let script = load_script(&args.script)?;
    run(args, script).await
}

fn load_script(path: &str) -> anyhow::Result<Vec<ScriptStep>> {
    let text = std::fs::read_to_string(path)?;
    let mut steps = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != 3 {
            anyhow::bail!("malformed script line: {line}");
        }
        steps.push(ScriptStep {
            zone: parts[0].trim().to_string(),
            igt_ms: parts[1].trim().parse()?,
            deaths: parts[2].trim().parse()?,
        });
    }
    Ok(steps)
}

async fn run(args: Args, script: Vec<ScriptStep>) -> anyhow::Result<()> {
    let (stream, _) = connect_async(&args.url).await?;
    let (mut write, mut read) = stream.split();

    send(&mut write, &ClientFrameV1::Auth { mod_token: args.mod_token.clone() }).await?;

    let my_participant_id = match read_frame(&mut read).await? {
        Some(ServerFrameV1::AuthOk { my_participant_id, .. }) => {
            info!(participant_id = %my_participant_id, "authenticated");
            my_participant_id
        }
        Some(ServerFrameV1::AuthError { reason }) => {
            anyhow::bail!("auth rejected: {reason}");
        }
        other => anyhow::bail!("unexpected first server frame: {other:?}"),
    };

    // Race sessions require an explicit `ready`; training sessions emit
    // `race_start` immediately and ignore this frame. Harmless to send for both.
    send(&mut write, &ClientFrameV1::Ready {}).await?;

    let mut last_zone: Option<String> = None;
    for step in &script {
        sleep(Duration::from_millis(args.step_delay_ms)).await;

        send(
            &mut write,
            &ClientFrameV1::ZoneEntered {
                from_zone: last_zone.clone(),
                to_zone: step.zone.clone(),
                igt_ms: step.igt_ms,
            },
        )
        .await?;

        if step.deaths > 0 {
            send(
                &mut write,
                &ClientFrameV1::StatusUpdate {
                    igt_ms: step.igt_ms,
                    current_zone: Some(step.zone.clone()),
                    death_count: step.deaths,
                },
            )
            .await?;
        }

        last_zone = Some(step.zone.clone());
        info!(participant_id = %my_participant_id, zone = %step.zone, igt_ms = step.igt_ms, "zone entered");
    }

    if let Some(last) = script.last() {
        send(&mut write, &ClientFrameV1::Finished { igt_ms: last.igt_ms }).await?;
        info!(participant_id = %my_participant_id, igt_ms = last.igt_ms, "finished");
    }

    // Drain a few more frames (leaderboard/race_status_change) before exiting.
    for _ in 0..5 {
        match tokio::time::timeout(Duration::from_millis(500), read_frame(&mut read)).await {
            Ok(Ok(Some(frame))) => info!(?frame, "server frame"),
            Ok(Ok(None)) => break,
            Ok(Err(err)) => {
                warn!(error = %err, "read error while draining");
                break;
            }
            Err(_) => break,
        }
    }

    Ok(())
}

async fn send(
    write: &mut futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        WsMessage,
    >,
    frame: &ClientFrameV1,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(frame)?;
    write.send(WsMessage::Text(json.into())).await?;
    Ok(())
}

async fn read_frame(
    read: &mut futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    >,
) -> anyhow::Result<Option<ServerFrameV1>> {
    loop {
        match read.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return Ok(Some(serde_json::from_str(&text)?));
            }
            Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(err.into()),
        }
    }
}

