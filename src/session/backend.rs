use crate::audio::AudioError;
use crate::audio::analysis::LevelTap;
use crate::audio::capture::CpalCapture;
use crate::audio::output::CpalOutput;
use crate::audio::playback::PlaybackDevice;
use crate::error::session::SessionError;
use crate::session::channel::{OutboundSender, RemoteChannel};
use crate::session::live::LiveChannel;
use crate::session::{SessionLink, SessionSetup};
use async_trait::async_trait;

/// Microphone input context plus its media stream.
pub trait CaptureDevice: Send {
    /// Begin delivering encoded frames to `sink`. Later device failures are
    /// reported through the session link, not here.
    fn start(&mut self, sink: OutboundSender) -> Result<(), AudioError>;

    /// Release the stream and the device. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Everything a successful start attempt acquired.
pub struct Acquired {
    pub output: Box<dyn PlaybackDevice>,
    pub capture: Box<dyn CaptureDevice>,
    pub channel: Box<dyn RemoteChannel>,
}

impl Acquired {
    pub fn release(mut self) {
        self.channel.close();
        self.capture.close();
        self.output.close();
    }
}

/// Opens the devices and the remote channel for one session.
#[async_trait]
pub trait SessionBackend: Send + Sync + 'static {
    async fn open_output(&self, link: SessionLink) -> Result<Box<dyn PlaybackDevice>, SessionError>;

    async fn open_capture(&self, link: SessionLink)
    -> Result<Box<dyn CaptureDevice>, SessionError>;

    async fn connect(
        &self,
        setup: &SessionSetup,
        link: SessionLink,
    ) -> Result<Box<dyn RemoteChannel>, SessionError>;
}

/// Acquire output, input and channel in that order. Whatever was opened before
/// a failure is released before the error is returned.
pub async fn acquire<B: SessionBackend + ?Sized>(
    backend: &B,
    setup: &SessionSetup,
    link: SessionLink,
) -> Result<Acquired, SessionError> {
    let mut output = backend.open_output(link.clone()).await?;

    let mut capture = match backend.open_capture(link.clone()).await {
        Ok(capture) => capture,
        Err(e) => {
            output.close();
            return Err(e);
        }
    };

    match backend.connect(setup, link).await {
        Ok(channel) => Ok(Acquired {
            output,
            capture,
            channel,
        }),
        Err(e) => {
            capture.close();
            output.close();
            Err(e)
        }
    }
}

/// Real speakers, real microphone, real speech service.
pub struct LiveBackend {
    input_level: LevelTap,
    output_level: LevelTap,
}

impl LiveBackend {
    pub fn new(input_level: LevelTap, output_level: LevelTap) -> Self {
        Self {
            input_level,
            output_level,
        }
    }
}

#[async_trait]
impl SessionBackend for LiveBackend {
    async fn open_output(
        &self,
        link: SessionLink,
    ) -> Result<Box<dyn PlaybackDevice>, SessionError> {
        let output = CpalOutput::open(link, self.output_level.clone()).await?;
        Ok(Box::new(output))
    }

    async fn open_capture(
        &self,
        link: SessionLink,
    ) -> Result<Box<dyn CaptureDevice>, SessionError> {
        let capture = CpalCapture::open(link, self.input_level.clone()).await?;
        tracing::debug!(sample_rate = capture.sample_rate(), "microphone ready");
        Ok(Box::new(capture))
    }

    async fn connect(
        &self,
        setup: &SessionSetup,
        link: SessionLink,
    ) -> Result<Box<dyn RemoteChannel>, SessionError> {
        let channel = LiveChannel::connect(setup, link).await?;
        Ok(Box::new(channel))
    }
}
