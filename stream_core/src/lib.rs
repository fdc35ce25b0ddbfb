//! Streaming coordination between token generation and speech synthesis.
//!
//! A session pipes the tokens of one [`llm_core::TokenProducer`] through a
//! [`Segmenter`] into an ordered segment [`channel`], while a
//! [`tts_core::Synthesizer`] speaks those segments as they arrive. See
//! [`Coordinator`].

pub mod channel;
mod config;
mod error;
mod handle;
mod segmenter;
mod session;

pub use channel::{ChannelState, ChannelWatch, SegmentReceiver, SegmentSender};
pub use config::SessionConfig;
pub use error::CoordinatorError;
pub use handle::ModelHandle;
pub use segmenter::{SegmentPolicy, Segmenter};
pub use session::{AudioSink, ConsumerStats, Coordinator, SessionReport};
pub use tokio_util::sync::CancellationToken;
