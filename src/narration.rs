//! Text-to-speech backends behind a single "write this text as audio to that file" contract.

pub(crate) mod edge;
pub(crate) mod elevenlabs;
pub(crate) mod synth;

use std::path::Path;

use crate::config::ProviderRole;
use crate::foundation::error::ProviderError;

/// A speech synthesizer that writes one audio file per call.
#[async_trait::async_trait]
pub trait NarrationProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn role(&self) -> ProviderRole;

    /// Synthesize `text` into `out_path`, overwriting it.
    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<(), ProviderError>;
}
