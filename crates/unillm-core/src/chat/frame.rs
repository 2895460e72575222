use crate::chat::UsageRecord;

/// One decoded unit of a provider stream.
///
/// Providers turn raw chunk bytes into frames; chunks that carry nothing
/// content-related (pings, malformed control frames) decode to `None`
/// instead of a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFrame {
    /// Generated text carried by the chunk
    pub text: Option<String>,
    /// Set on terminal frames
    pub stop_reason: Option<String>,
    /// Measured token counts, when the chunk carries invocation metrics
    pub usage: Option<UsageRecord>,
}

impl StreamFrame {
    /// Create a text frame
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Create a stop frame
    pub fn stop(reason: impl Into<String>) -> Self {
        Self {
            stop_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: UsageRecord) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn is_stop(&self) -> bool {
        self.stop_reason.is_some()
    }
}
