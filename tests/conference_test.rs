mod common;

use common::{CaptureTransport, FixedIceFactory};
use jitsi_rust::caps;
use jitsi_rust::conference::{Conference, ConferenceCallbacks, Config, Phase};
use jitsi_rust::session::{CodecKind, JingleHandler};
use jitsi_rust::types::Jid;
use jitsi_rust::xml::{Element, ElementBuilder};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LOCAL_JID: &str = "abc-123-def@meet.example.org/websocket";
const FOCUS_JID: &str = "focus@auth.meet.example.org/focus";

#[derive(Default)]
struct Events {
    joined: Mutex<Vec<String>>,
    left: Mutex<Vec<String>>,
    mutes: Mutex<Vec<(String, bool, bool)>>,
}

fn setup() -> (Arc<Conference>, Arc<CaptureTransport>, Arc<Events>) {
    let transport = CaptureTransport::new();
    let events = Arc::new(Events::default());
    let jid: Jid = LOCAL_JID.parse().unwrap();

    let handler = Arc::new(JingleHandler::new(
        CodecKind::Opus,
        CodecKind::H264,
        jid.clone(),
        Vec::new(),
        Box::new(FixedIceFactory),
    ));

    let callbacks = {
        let (joined, left, mutes) = (events.clone(), events.clone(), events.clone());
        ConferenceCallbacks {
            on_participant_joined: Some(Box::new(move |p| {
                joined.joined.lock().unwrap().push(p.participant_id.clone())
            })),
            on_participant_left: Some(Box::new(move |p| {
                left.left.lock().unwrap().push(p.participant_id.clone())
            })),
            on_mute_changed: Some(Box::new(move |p, is_audio, muted| {
                mutes
                    .mutes
                    .lock()
                    .unwrap()
                    .push((p.participant_id.clone(), is_audio, muted))
            })),
        }
    };

    let conference = Conference::new(
        Config::new(jid, "testroom", "integration-bot"),
        callbacks,
        handler,
        transport.clone(),
    );
    (conference, transport, events)
}

fn session_initiate_frame() -> String {
    let jingle = r#"<jingle xmlns="urn:xmpp:jingle:1" action="session-initiate" sid="sid1" initiator="testroom@conference.meet.example.org/focus"><content creator="initiator" name="audio" senders="both"><description xmlns="urn:xmpp:jingle:apps:rtp:1" media="audio"><payload-type id="111" name="opus" clockrate="48000" channels="2"/><source xmlns="urn:xmpp:jingle:apps:rtp:ssma:0" ssrc="1234"><ssrc-info xmlns="http://jitsi.org/jitmeet" owner="testroom@conference.meet.example.org/peer"/></source></description><transport xmlns="urn:xmpp:jingle:transports:ice-udp:1" ufrag="ruf" pwd="rpw"><web-socket xmlns="http://jitsi.org/protocol/colibri" url="wss://bridge/ws"/></transport></content><content creator="initiator" name="video" senders="both"><description xmlns="urn:xmpp:jingle:apps:rtp:1" media="video"><payload-type id="100" name="H264" clockrate="90000"/></description></content></jingle>"#;
    format!(
        r#"<iq from="testroom@conference.meet.example.org/focus" to="{LOCAL_JID}" id="srv1" type="set">{jingle}</iq>"#
    )
}

async fn drive_to_active(conference: &Arc<Conference>, transport: &CaptureTransport) {
    conference.start_negotiation().await.unwrap();
    let create = transport.take_sent_elements().remove(0);
    let create_id = create.attr("id").unwrap().to_string();
    conference
        .feed(&format!(
            r#"<iq type="result" id="{create_id}" from="{FOCUS_JID}"><conference ready="true"/></iq>"#
        ))
        .await
        .unwrap();
    conference.feed(&session_initiate_frame()).await.unwrap();
    assert_eq!(conference.phase().await, Phase::Active);
}

#[tokio::test]
async fn create_handshake_emits_conference_iq_then_presence() {
    let (conference, transport, _) = setup();

    conference.start_negotiation().await.unwrap();
    assert_eq!(conference.phase().await, Phase::Discovering);

    let frames = transport.take_sent_elements();
    assert_eq!(frames.len(), 1);
    let create = &frames[0];
    assert_eq!(create.name, "iq");
    assert_eq!(create.attr("type"), Some("set"));
    assert_eq!(create.attr("to"), Some(FOCUS_JID));
    let body = create.find_child("conference").unwrap();
    assert_eq!(body.attr("room"), Some("testroom@conference.meet.example.org"));
    assert!(body.attr("machine-uid").is_some());
    let properties: Vec<&Element> = body.children_named("property").collect();
    assert!(properties.iter().any(|p| p.is_attr("stereo", "false")));
    assert!(properties.iter().any(|p| p.is_attr("startBitrate", "800")));

    let create_id = create.attr("id").unwrap();
    conference
        .feed(&format!(
            r#"<iq type="result" id="{create_id}" from="{FOCUS_JID}"><conference ready="true"/></iq>"#
        ))
        .await
        .unwrap();
    assert_eq!(conference.phase().await, Phase::Joining);

    let frames = transport.take_sent_elements();
    assert_eq!(frames.len(), 1);
    let presence = &frames[0];
    assert_eq!(presence.name, "presence");
    assert_eq!(
        presence.attr("to"),
        Some("testroom@conference.meet.example.org/abc")
    );
    let x = presence.find_child("x").unwrap();
    assert_eq!(x.attr("xmlns"), Some("http://jabber.org/protocol/muc"));

    let digest = caps::compute(&caps::disco_info());
    let c = presence.find_child("c").unwrap();
    assert_eq!(c.attr("hash"), Some("sha-1"));
    assert_eq!(c.attr("node"), Some(caps::CAPS_NODE));
    assert_eq!(c.attr("ver"), Some(digest.sha1_b64.as_str()));
    let hash = presence.find_child_path(&["ecaps2", "hash"]).unwrap();
    assert_eq!(hash.attr("algo"), Some("sha-256"));
    assert_eq!(hash.text, digest.sha256_b64);
    assert_eq!(
        presence.find_child("nick").unwrap().text,
        "integration-bot"
    );
}

#[tokio::test]
async fn conference_not_ready_is_fatal() {
    let (conference, transport, _) = setup();
    conference.start_negotiation().await.unwrap();
    let create = transport.take_sent_elements().remove(0);
    let create_id = create.attr("id").unwrap().to_string();

    let result = conference
        .feed(&format!(
            r#"<iq type="result" id="{create_id}" from="{FOCUS_JID}"><conference ready="false"/></iq>"#
        ))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn disco_probe_is_answered_with_cached_info() {
    let (conference, transport, _) = setup();

    conference
        .feed(&format!(
            r#"<iq type="get" id="abc" from="{FOCUS_JID}" to="{LOCAL_JID}"><query xmlns="http://jabber.org/protocol/disco#info"/></iq>"#
        ))
        .await
        .unwrap();

    let frames = transport.take_sent_elements();
    assert_eq!(frames.len(), 1);
    let reply = &frames[0];
    assert_eq!(reply.name, "iq");
    assert_eq!(reply.attr("type"), Some("result"));
    assert_eq!(reply.attr("id"), Some("abc"));
    assert_eq!(reply.attr("to"), Some(FOCUS_JID));
    let query = reply.find_child("query").unwrap();
    let identity = query.find_child("identity").unwrap();
    assert_eq!(identity.attr("category"), Some("client"));
    assert_eq!(identity.attr("type"), Some("bot"));
    assert!(query.children_named("feature").count() >= 8);
}

#[tokio::test]
async fn disco_probe_with_wrong_node_is_silently_dropped() {
    let (conference, transport, _) = setup();

    conference
        .feed(&format!(
            r#"<iq type="get" id="abc" from="{FOCUS_JID}"><query xmlns="http://jabber.org/protocol/disco#info" node="{}#bogushash"/></iq>"#,
            caps::CAPS_NODE
        ))
        .await
        .unwrap();
    assert!(transport.take_sent().is_empty());

    // matching node gets the reply, echoing the node back
    let digest = caps::compute(&caps::disco_info());
    let node = format!("{}#{}", caps::CAPS_NODE, digest.sha1_b64);
    conference
        .feed(&format!(
            r#"<iq type="get" id="def" from="{FOCUS_JID}"><query xmlns="http://jabber.org/protocol/disco#info" node="{node}"/></iq>"#
        ))
        .await
        .unwrap();
    let frames = transport.take_sent_elements();
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0].find_child("query").unwrap().attr("node"),
        Some(node.as_str())
    );
}

#[tokio::test]
async fn correlated_sends_use_distinct_ids_and_matching_delivery() {
    let (conference, transport, _) = setup();

    let fired = Arc::new(Mutex::new(Vec::new()));
    let mut ids = Vec::new();
    for n in 0..5 {
        let fired = fired.clone();
        let iq = ElementBuilder::new("iq").attr("type", "get").build();
        let id = conference
            .send_iq(
                iq,
                Some(Box::new(move |success| {
                    fired.lock().unwrap().push((n, success));
                })),
            )
            .await
            .unwrap();
        ids.push(id);
    }
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    assert_eq!(transport.take_sent().len(), 5);

    // deliver the third request's reply; exactly its handler runs
    conference
        .feed(&format!(r#"<iq type="result" id="{}"/>"#, ids[2]))
        .await
        .unwrap();
    assert_eq!(fired.lock().unwrap().as_slice(), &[(2, true)]);

    // an error reply invokes the handler with failure
    conference
        .feed(&format!(r#"<iq type="error" id="{}"/>"#, ids[0]))
        .await
        .unwrap();
    assert_eq!(fired.lock().unwrap().as_slice(), &[(2, true), (0, false)]);

    // a stray reply is dropped without touching the remaining handlers
    conference
        .feed(r#"<iq type="result" id="iq_99999"/>"#)
        .await
        .unwrap();
    assert_eq!(fired.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn participants_are_tracked_across_presence() {
    let (conference, _transport, events) = setup();
    let muc = "testroom@conference.meet.example.org";

    conference
        .feed(&format!(
            r#"<presence from="{muc}/aaaa"><nick xmlns="http://jabber.org/protocol/nick">alice</nick></presence>"#
        ))
        .await
        .unwrap();
    conference
        .feed(&format!(r#"<presence from="{muc}/bbbb"/>"#))
        .await
        .unwrap();
    // a second presence from a known participant is not a new join
    conference
        .feed(&format!(r#"<presence from="{muc}/aaaa"/>"#))
        .await
        .unwrap();
    // own presence echo is not a participant
    conference
        .feed(&format!(r#"<presence from="{muc}/abc"/>"#))
        .await
        .unwrap();
    conference
        .feed(&format!(r#"<presence from="{muc}/aaaa" type="unavailable"/>"#))
        .await
        .unwrap();

    assert_eq!(events.joined.lock().unwrap().as_slice(), &["aaaa", "bbbb"]);
    assert_eq!(events.left.lock().unwrap().as_slice(), &["aaaa"]);

    let remaining = conference.participants().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].participant_id, "bbbb");
    assert_eq!(events.joined.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn mute_state_changes_fire_the_callback() {
    let (conference, _transport, events) = setup();
    let muc = "testroom@conference.meet.example.org";

    conference
        .feed(&format!(r#"<presence from="{muc}/cccc"/>"#))
        .await
        .unwrap();
    conference
        .feed(&format!(
            r#"<presence from="{muc}/cccc"><audiomuted>true</audiomuted></presence>"#
        ))
        .await
        .unwrap();
    conference
        .feed(&format!(
            r#"<presence from="{muc}/cccc"><audiomuted>true</audiomuted><videomuted>true</videomuted></presence>"#
        ))
        .await
        .unwrap();

    assert_eq!(
        events.mutes.lock().unwrap().as_slice(),
        &[
            ("cccc".to_string(), true, true),
            ("cccc".to_string(), false, true),
        ]
    );
}

#[tokio::test]
async fn session_initiate_is_acked_and_activates_the_session() {
    let (conference, transport, _) = setup();
    drive_to_active(&conference, &transport).await;

    let frames = transport.take_sent_elements();
    // presence from the ready transition, then the initiate ack
    let ack = frames.last().unwrap();
    assert_eq!(ack.name, "iq");
    assert_eq!(ack.attr("type"), Some("result"));
    assert_eq!(ack.attr("id"), Some("srv1"));
    assert_eq!(
        ack.attr("to"),
        Some("testroom@conference.meet.example.org/focus")
    );
}

#[tokio::test]
async fn session_initiate_from_non_focus_is_ignored() {
    let (conference, transport, _) = setup();
    let frame = session_initiate_frame()
        .replace("conference.meet.example.org/focus\" to=", "conference.meet.example.org/peer\" to=");
    conference.feed(&frame).await.unwrap();
    assert!(transport.take_sent().is_empty());
    assert_eq!(conference.phase().await, Phase::Idle);
}

#[tokio::test]
async fn unknown_jingle_action_is_acked_and_ignored() {
    let (conference, transport, _) = setup();
    conference
        .feed(&format!(
            r#"<iq from="testroom@conference.meet.example.org/focus" id="x1" type="set"><jingle xmlns="urn:xmpp:jingle:1" action="futuristic-action" sid="s"/></iq>"#
        ))
        .await
        .unwrap();
    let frames = transport.take_sent_elements();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].attr("type"), Some("result"));
    assert_eq!(frames[0].attr("id"), Some("x1"));
}

#[tokio::test]
async fn session_terminate_shuts_the_controller_down() {
    let (conference, transport, _) = setup();
    drive_to_active(&conference, &transport).await;
    transport.take_sent();

    conference
        .feed(r#"<iq from="testroom@conference.meet.example.org/focus" id="t1" type="set"><jingle xmlns="urn:xmpp:jingle:1" action="session-terminate" sid="sid1"/></iq>"#)
        .await
        .unwrap();

    assert_eq!(conference.phase().await, Phase::Terminated);
    assert!(transport.is_disconnected());
    let frames = transport.take_sent_elements();
    assert!(frames.iter().any(|f| f.is_attr("id", "t1") && f.is_attr("type", "result")));
}

#[tokio::test]
async fn session_accept_failure_is_fatal() {
    let (conference, transport, _) = setup();
    drive_to_active(&conference, &transport).await;
    transport.take_sent();

    let accept = jitsi_rust::jingle::Jingle::new(
        jitsi_rust::jingle::Action::SessionAccept,
        "sid1",
    );
    conference.send_session_accept(&accept).await.unwrap();
    let frames = transport.take_sent_elements();
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0].attr("to"),
        Some("testroom@conference.meet.example.org/focus")
    );
    let accept_id = frames[0].attr("id").unwrap().to_string();

    conference
        .feed(&format!(r#"<iq type="error" id="{accept_id}"/>"#))
        .await
        .unwrap();
    // the failure handler tears the controller down on a spawned task
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(conference.phase().await, Phase::Terminated);
    assert!(transport.is_disconnected());
}

#[tokio::test(start_paused = true)]
async fn heartbeat_pings_every_ten_seconds() {
    let (conference, transport, _) = setup();
    drive_to_active(&conference, &transport).await;
    transport.take_sent();

    tokio::time::advance(Duration::from_secs(10)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let frames = transport.take_sent_elements();
    let pings: Vec<_> = frames
        .iter()
        .filter(|f| f.name == "iq" && f.find_child("ping").is_some())
        .collect();
    assert_eq!(pings.len(), 1);
    assert_eq!(pings[0].attr("type"), Some("get"));

    tokio::time::advance(Duration::from_secs(10)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let frames = transport.take_sent_elements();
    assert_eq!(
        frames
            .iter()
            .filter(|f| f.find_child("ping").is_some())
            .count(),
        1
    );
}
