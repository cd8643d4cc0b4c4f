use chrono::Local;
use jitsi_rust::conference::{Conference, ConferenceCallbacks, Config};
use jitsi_rust::ice::WebRtcIceFactory;
use jitsi_rust::negotiator::{Negotiator, Progress};
use jitsi_rust::session::{CodecKind, JingleHandler};
use jitsi_rust::transport::{TokioWebSocketTransportFactory, TransportEvent, TransportFactory};
use log::{error, info};
use std::sync::Arc;

// A headless participant that joins a room and answers the bridge's
// session offer.
//
// Usage:
//   cargo run -- HOST ROOM               # join ROOM on HOST
//   cargo run -- HOST ROOM --nick NAME   # with a custom nickname

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut positional: Vec<&String> = Vec::new();
    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with('-') {
            iter.next(); // skip the flag's value
        } else {
            positional.push(arg);
        }
    }
    let (Some(host), Some(room)) = (positional.first(), positional.get(1)) else {
        eprintln!("usage: jitsi-rust HOST ROOM [--nick NAME]");
        std::process::exit(1);
    };
    let nick = parse_arg(&args, "--nick", "-n").unwrap_or_else(|| "jitsi-rust-example".to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    if let Err(e) = rt.block_on(run(host, room, &nick)) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(host: &str, room: &str, nick: &str) -> Result<(), anyhow::Error> {
    let factory = TokioWebSocketTransportFactory::new(host, room);
    let (transport, mut events) = factory.create_transport().await?;

    // obtain our jid and the relay list from the server
    let mut negotiator = Negotiator::new(host, transport.clone());
    negotiator.start_negotiation().await?;
    loop {
        match events.recv().await {
            Some(TransportEvent::TextReceived(text)) => {
                if negotiator.feed(&text).await? == Progress::Done {
                    break;
                }
            }
            Some(TransportEvent::Connected) => {}
            Some(TransportEvent::Disconnected) | None => {
                anyhow::bail!("disconnected during stream negotiation");
            }
        }
    }
    let jid = negotiator
        .jid
        .take()
        .ok_or_else(|| anyhow::anyhow!("negotiation finished without a bound jid"))?;
    let external_services = std::mem::take(&mut negotiator.external_services);

    // join the conference
    let jingle_handler = Arc::new(JingleHandler::new(
        CodecKind::Opus,
        CodecKind::H264,
        jid.clone(),
        external_services,
        Box::new(WebRtcIceFactory),
    ));
    let callbacks = ConferenceCallbacks {
        on_participant_joined: Some(Box::new(|p| {
            info!("participant joined: {} {}", p.participant_id, p.nick)
        })),
        on_participant_left: Some(Box::new(|p| {
            info!("participant left: {}", p.participant_id)
        })),
        on_mute_changed: Some(Box::new(|p, is_audio, muted| {
            info!(
                "mute state changed: {} {}={}",
                p.participant_id,
                if is_audio { "audio" } else { "video" },
                muted
            )
        })),
    };
    let conference = Conference::new(
        Config::new(jid, room, nick),
        callbacks,
        jingle_handler.clone(),
        transport.clone(),
    );
    conference.start_negotiation().await?;

    let feeder = {
        let conference = conference.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::TextReceived(text) => {
                        if let Err(e) = conference.feed(&text).await {
                            error!("fatal protocol error: {e}");
                            conference.terminate().await;
                            break;
                        }
                    }
                    TransportEvent::Disconnected => break,
                    TransportEvent::Connected => {}
                }
            }
        })
    };

    // let the media layer come up before answering
    jingle_handler.session_established().await;
    let accept = jingle_handler.build_accept().await?;
    conference.send_session_accept(&accept).await?;
    info!("session accepted, signaling established");

    feeder.await?;
    info!("connection closed");
    Ok(())
}

fn parse_arg(args: &[String], long: &str, short: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == long || arg == short)
        .and_then(|index| args.get(index + 1))
        .cloned()
}
