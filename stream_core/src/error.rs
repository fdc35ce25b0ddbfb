use std::time::Duration;

use thiserror::Error;

/// Why a speaking session did not complete.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("generation failed: {0:#}")]
    Producer(anyhow::Error),

    #[error("synthesis failed: {0:#}")]
    Consumer(anyhow::Error),

    #[error("{producer}; {consumer}")]
    Both {
        producer: Box<CoordinatorError>,
        consumer: Box<CoordinatorError>,
    },

    #[error("generation timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("session cancelled")]
    Cancelled,
}

impl CoordinatorError {
    /// Whether the generation side is (at least partly) to blame.
    pub fn is_producer_failure(&self) -> bool {
        match self {
            Self::Producer(_) | Self::Timeout(_) => true,
            Self::Both { producer, .. } => producer.is_producer_failure(),
            _ => false,
        }
    }

    /// Whether the synthesis side is (at least partly) to blame.
    pub fn is_consumer_failure(&self) -> bool {
        match self {
            Self::Consumer(_) => true,
            Self::Both { consumer, .. } => consumer.is_consumer_failure(),
            _ => false,
        }
    }
}
