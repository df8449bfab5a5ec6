use crate::audio::codec::WireAudioPayload;
use crate::error::session::SessionError;
use crate::session::channel::{OutboundSender, RemoteChannel};
use crate::session::protocol::{ServerMessage, realtime_input, setup_message};
use crate::session::{SessionLink, SessionSetup};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Websocket session with the speech service. One task writes queued audio,
/// one task reads and forwards server messages to the controller.
pub struct LiveChannel {
    outbound: OutboundSender,
    shutdown: Option<oneshot::Sender<()>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl LiveChannel {
    pub async fn connect(setup: &SessionSetup, link: SessionLink) -> Result<Self, SessionError> {
        let url = format!("{LIVE_ENDPOINT}?key={}", setup.api_key);
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::Channel(format!("connect failed: {e}")))?;
        let (mut sink, mut source) = ws.split();

        let setup_frame =
            setup_message(setup).map_err(|e| SessionError::Channel(e.to_string()))?;
        sink.send(Message::Text(setup_frame))
            .await
            .map_err(|e| SessionError::Channel(format!("setup failed: {e}")))?;

        tokio::time::timeout(HANDSHAKE_TIMEOUT, await_setup_complete(&mut source))
            .await
            .map_err(|_| SessionError::Channel("handshake timed out".to_string()))??;
        tracing::info!(model = %setup.model, voice = %setup.voice, "live session open");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let writer = tokio::spawn(write_loop(sink, outbound_rx, shutdown_rx, link.clone()));
        let reader = tokio::spawn(read_loop(source, link));

        Ok(LiveChannel {
            outbound,
            shutdown: Some(shutdown),
            writer: Some(writer),
            reader: Some(reader),
        })
    }
}

impl RemoteChannel for LiveChannel {
    fn outbound(&self) -> OutboundSender {
        self.outbound.clone()
    }

    fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        // The writer sends a close frame and exits on its own.
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.writer.take();
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn frame_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text),
        Message::Binary(bytes) => String::from_utf8(bytes).ok(),
        _ => None,
    }
}

async fn await_setup_complete(source: &mut WsSource) -> Result<(), SessionError> {
    while let Some(frame) = source.next().await {
        let frame = frame.map_err(|e| SessionError::Channel(e.to_string()))?;
        if let Message::Close(reason) = &frame {
            return Err(SessionError::Channel(format!(
                "closed during handshake: {}",
                reason.as_ref().map(|r| r.reason.to_string()).unwrap_or_default()
            )));
        }
        let Some(text) = frame_text(frame) else {
            continue;
        };
        if ServerMessage::parse(&text).is_ok_and(|m| m.is_setup_complete()) {
            return Ok(());
        }
    }
    Err(SessionError::Channel("closed during handshake".to_string()))
}

async fn write_loop(
    mut sink: WsSink,
    mut outbound: mpsc::UnboundedReceiver<WireAudioPayload>,
    mut shutdown: oneshot::Receiver<()>,
    link: SessionLink,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            payload = outbound.recv() => {
                let Some(payload) = payload else {
                    break;
                };
                let frame = match realtime_input(&payload) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode audio frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    link.channel_error(format!("send failed: {e}"));
                    break;
                }
            }
        }
    }
}

async fn read_loop(mut source: WsSource, link: SessionLink) {
    while let Some(frame) = source.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                link.channel_error(e.to_string());
                return;
            }
        };
        if let Message::Close(_) = frame {
            break;
        }
        let Some(text) = frame_text(frame) else {
            continue;
        };

        match ServerMessage::parse(&text) {
            Ok(message) => {
                if message.go_away.is_some() {
                    tracing::warn!("server announced disconnect");
                }
                if let Some(inbound) = message.into_inbound() {
                    link.inbound(inbound);
                }
            }
            Err(e) => tracing::warn!(error = %e, "skipping unparsable server frame"),
        }
    }
    link.channel_closed();
}
