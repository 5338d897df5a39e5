//! The remote streaming-session boundary
//!
//! The generation service is an opaque async duplex collaborator: a
//! bidirectional channel opened with a behavior profile, emitting lifecycle
//! and audio events and accepting encoded caller audio. Everything behind
//! these traits — wire protocol, authentication, retries — is the
//! transport's business, not the pipeline's.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::config::LiveConfig;
use crate::voice::EncodedChunk;

/// Events emitted by an open remote session, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The remote confirmed readiness; streaming may begin
    Opened,

    /// A chunk of reply audio (16-bit LE PCM at the output rate)
    Audio(Vec<u8>),

    /// The remote detected the caller speaking over the reply and cut its
    /// own generation short; local playback must be cut in lockstep
    Interrupted,

    /// The session ended normally
    Closed,

    /// The session failed; no further events follow
    Error(String),
}

/// An open remote session
#[async_trait]
pub trait LiveSession: Send {
    /// Send one encoded chunk of caller audio.
    ///
    /// Must be prompt: the caller invokes this from its streaming loop and
    /// a slow send delays event handling.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk could not be handed to the transport;
    /// the caller treats this as best-effort and keeps streaming.
    async fn send_audio(&mut self, chunk: &EncodedChunk) -> Result<()>;

    /// Request an orderly close.
    ///
    /// # Errors
    ///
    /// Returns an error if the close request could not be delivered.
    async fn close(&mut self) -> Result<()>;
}

/// A factory for remote sessions
#[async_trait]
pub trait LiveTransport: Send {
    /// Open a session with the given behavior profile.
    ///
    /// The returned event receiver yields [`SessionEvent::Opened`] first on
    /// success; the session is not usable before that.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be established.
    async fn connect(
        &self,
        config: &LiveConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>)>;
}
