//! WebRTC peer session to the realtime voice endpoint.
//!
//! Establishment: build a peer connection with an Opus media engine, attach
//! the local microphone track, open the `oai-events` data channel, then
//! exchange SDP over HTTP — the offer is POSTed with the short-lived bearer
//! credential and a model selector, the response body is the answer.
//!
//! After negotiation the session delivers decoded inbound audio frames and
//! parsed server events to the controller, and drains the controller's
//! outbound client events into the data channel once it opens.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{encode_client_event, parse_server_event, ClientEvent};
use super::TransportEvent;

/// Opus frame duration produced by the encoder task.
const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Samples per 20 ms frame at 48 kHz mono.
const FRAME_SAMPLES: usize = 960;

/// Receivers handed to the controller's event loop.
pub struct TransportChannels {
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub inbound_audio: mpsc::Receiver<Vec<f32>>,
}

/// Live peer session. Closing is idempotent and never fails.
pub struct WebRtcHandle {
    pc: Arc<RTCPeerConnection>,
    sender_task: JoinHandle<()>,
    encoder_task: JoinHandle<()>,
}

impl WebRtcHandle {
    /// Tear the session down without blocking the caller.
    ///
    /// Tasks are aborted synchronously; the async peer-connection close runs
    /// detached so a synchronous `stop_session` can call this.
    pub fn close(&self) {
        self.sender_task.abort();
        self.encoder_task.abort();
        let pc = self.pc.clone();
        tokio::spawn(async move {
            if let Err(e) = pc.close().await {
                debug!("Peer connection close: {}", e);
            }
        });
    }
}

/// Establish the peer session.
///
/// `mic_frames` feeds 48 kHz mono 960-sample frames from the capture thread;
/// `outbound` is drained into the data channel once it opens. On any failure
/// every partially constructed resource is released before returning.
pub async fn connect(
    config: &SessionConfig,
    token: &str,
    mic_frames: mpsc::Receiver<Vec<f32>>,
    outbound: mpsc::UnboundedReceiver<ClientEvent>,
) -> Result<(WebRtcHandle, TransportChannels), SessionError> {
    let pc = new_peer_connection().await?;

    match wire_session(pc.clone(), config, token, mic_frames, outbound).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Rollback: the peer connection owns every sub-resource we
            // created (track, channel), so closing it releases them all.
            let _ = pc.close().await;
            Err(e)
        }
    }
}

async fn new_peer_connection() -> Result<Arc<RTCPeerConnection>, SessionError> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| SessionError::Transport(format!("codec registration failed: {e}")))?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(|e| SessionError::Transport(format!("interceptor setup failed: {e}")))?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: vec!["stun:stun.l.google.com:19302".to_owned()],
            ..Default::default()
        }],
        ..Default::default()
    };

    let pc = api
        .new_peer_connection(rtc_config)
        .await
        .map_err(|e| SessionError::Transport(format!("peer connection failed: {e}")))?;

    Ok(Arc::new(pc))
}

async fn wire_session(
    pc: Arc<RTCPeerConnection>,
    config: &SessionConfig,
    token: &str,
    mic_frames: mpsc::Receiver<Vec<f32>>,
    outbound: mpsc::UnboundedReceiver<ClientEvent>,
) -> Result<(WebRtcHandle, TransportChannels), SessionError> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();
    let (audio_tx, audio_rx) = mpsc::channel::<Vec<f32>>(32);

    // Local microphone track, Opus 48 kHz mono.
    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48_000,
            channels: 1,
            ..Default::default()
        },
        "audio".to_owned(),
        "microphone".to_owned(),
    ));

    let rtp_sender = pc
        .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .map_err(|e| SessionError::Transport(format!("failed to add audio track: {e}")))?;

    // Drain RTCP so the interceptors keep running.
    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while let Ok((_, _)) = rtp_sender.read(&mut rtcp_buf).await {}
    });

    // Inbound assistant audio: decode Opus payloads and forward frames.
    {
        let audio_tx = audio_tx.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let audio_tx = audio_tx.clone();
            Box::pin(async move {
                info!("Inbound track attached");
                decode_inbound_track(track, audio_tx).await;
            })
        }));
    }

    // Mid-session drops surface as Closed on the event stream.
    {
        let event_tx = event_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(?state, "Peer connection state");
            if matches!(
                state,
                RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Closed
            ) {
                let _ = event_tx.send(TransportEvent::Closed);
            }
            Box::pin(async {})
        }));
    }

    // Bidirectional event channel.
    let data_channel = pc
        .create_data_channel("oai-events", None)
        .await
        .map_err(|e| SessionError::Transport(format!("data channel failed: {e}")))?;

    let channel_open = Arc::new(Notify::new());
    {
        let channel_open = channel_open.clone();
        data_channel.on_open(Box::new(move || {
            info!("Event channel open");
            channel_open.notify_one();
            Box::pin(async {})
        }));
    }
    {
        let event_tx = event_tx.clone();
        data_channel.on_message(Box::new(move |msg: DataChannelMessage| {
            if let Some(event) = parse_server_event(&msg.data) {
                let _ = event_tx.send(TransportEvent::Message(event));
            }
            Box::pin(async {})
        }));
    }
    {
        let event_tx = event_tx.clone();
        data_channel.on_close(Box::new(move || {
            let _ = event_tx.send(TransportEvent::Closed);
            Box::pin(async {})
        }));
    }

    // Outbound sender: wait for the channel to open, then drain client events.
    let sender_task = {
        let data_channel = data_channel.clone();
        let mut outbound = outbound;
        tokio::spawn(async move {
            channel_open.notified().await;
            while let Some(event) = outbound.recv().await {
                let text = match encode_client_event(&event) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("Failed to encode client event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = data_channel.send_text(text).await {
                    warn!("Event channel send failed: {}", e);
                    break;
                }
            }
            debug!("Outbound sender exiting");
        })
    };

    // Encoder: microphone frames -> Opus -> local track.
    let encoder_task = {
        let track = Arc::clone(&track);
        let mut mic_frames = mic_frames;
        tokio::spawn(async move {
            let mut encoder = match audiopus::coder::Encoder::new(
                audiopus::SampleRate::Hz48000,
                audiopus::Channels::Mono,
                audiopus::Application::Voip,
            ) {
                Ok(enc) => enc,
                Err(e) => {
                    warn!("Opus encoder init failed: {}", e);
                    return;
                }
            };
            let mut pcm = vec![0i16; FRAME_SAMPLES];
            let mut packet = vec![0u8; 1500];
            while let Some(frame) = mic_frames.recv().await {
                if frame.len() != FRAME_SAMPLES {
                    continue;
                }
                for (dst, src) in pcm.iter_mut().zip(frame.iter()) {
                    *dst = (src.clamp(-1.0, 1.0) * 32767.0) as i16;
                }
                let len = match encoder.encode(&pcm, &mut packet[..]) {
                    Ok(len) => len,
                    Err(e) => {
                        warn!("Opus encode error: {}", e);
                        continue;
                    }
                };
                let sample = Sample {
                    data: Bytes::copy_from_slice(&packet[..len]),
                    duration: FRAME_DURATION,
                    ..Default::default()
                };
                if track.write_sample(&sample).await.is_err() {
                    break;
                }
            }
            debug!("Encoder task exiting");
        })
    };

    // Offer/answer over HTTP with the short-lived credential.
    if let Err(e) = negotiate(&pc, config, token).await {
        sender_task.abort();
        encoder_task.abort();
        return Err(e);
    }

    Ok((
        WebRtcHandle {
            pc,
            sender_task,
            encoder_task,
        },
        TransportChannels {
            events: event_rx,
            inbound_audio: audio_rx,
        },
    ))
}

/// SDP offer/answer exchange against the realtime endpoint.
async fn negotiate(
    pc: &Arc<RTCPeerConnection>,
    config: &SessionConfig,
    token: &str,
) -> Result<(), SessionError> {
    let offer = pc
        .create_offer(None)
        .await
        .map_err(|e| SessionError::Transport(format!("create offer failed: {e}")))?;

    let mut gathering_done = pc.gathering_complete_promise().await;
    pc.set_local_description(offer)
        .await
        .map_err(|e| SessionError::Transport(format!("set local description failed: {e}")))?;
    let _ = gathering_done.recv().await;

    let local = pc
        .local_description()
        .await
        .ok_or_else(|| SessionError::Transport("no local description".to_string()))?;

    let url = format!("{}?model={}", config.realtime_endpoint, config.model);
    debug!(%url, "Posting SDP offer");

    let resp = reqwest::Client::new()
        .post(&url)
        .bearer_auth(token)
        .header(reqwest::header::CONTENT_TYPE, "application/sdp")
        .body(local.sdp)
        .send()
        .await
        .map_err(|e| SessionError::Transport(format!("SDP exchange failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(SessionError::Transport(format!(
            "realtime endpoint returned {}: {}",
            status, body
        )));
    }

    let answer_sdp = resp
        .text()
        .await
        .map_err(|e| SessionError::Transport(format!("failed to read SDP answer: {e}")))?;

    let answer = RTCSessionDescription::answer(answer_sdp)
        .map_err(|e| SessionError::Transport(format!("invalid SDP answer: {e}")))?;

    pc.set_remote_description(answer)
        .await
        .map_err(|e| SessionError::Transport(format!("set remote description failed: {e}")))?;

    info!("Remote description set; session is bidirectional");
    Ok(())
}

/// Read RTP from the inbound track, decode Opus, and forward f32 frames.
async fn decode_inbound_track(track: Arc<TrackRemote>, audio_tx: mpsc::Sender<Vec<f32>>) {
    let mut decoder = match audiopus::coder::Decoder::new(
        audiopus::SampleRate::Hz48000,
        audiopus::Channels::Mono,
    ) {
        Ok(dec) => dec,
        Err(e) => {
            warn!("Opus decoder init failed: {}", e);
            return;
        }
    };

    let mut pcm = vec![0i16; FRAME_SAMPLES * 4];
    loop {
        let (packet, _) = match track.read_rtp().await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("Inbound track ended: {}", e);
                return;
            }
        };
        if packet.payload.is_empty() {
            continue;
        }
        let decoded = match decoder.decode(Some(&packet.payload[..]), &mut pcm[..], false) {
            Ok(n) => n,
            Err(e) => {
                debug!("Opus decode error: {}", e);
                continue;
            }
        };
        let frame: Vec<f32> = pcm[..decoded].iter().map(|&s| s as f32 / 32768.0).collect();
        // Level metering only needs the freshest frame; drop when behind.
        let _ = audio_tx.try_send(frame);
    }
}
