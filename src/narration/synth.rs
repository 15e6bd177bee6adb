use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::foundation::error::{FactoryError, FactoryResult, ProviderError};
use crate::narration::NarrationProvider;
use crate::narration::edge::EdgeTtsProvider;
use crate::narration::elevenlabs::{ElevenLabsClient, ElevenLabsNarrator};

/// Ordered primary -> fallback narration chain.
///
/// Each attempt runs under the provider timeout and must leave a non-empty file behind; anything
/// else counts as a provider failure and the partial output is removed.
pub struct NarrationSynthesizer {
    primary: Option<Box<dyn NarrationProvider>>,
    fallback: Box<dyn NarrationProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for NarrationSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationSynthesizer")
            .field("primary", &self.primary.as_ref().map(|p| p.name().to_owned()))
            .field("fallback", &self.fallback.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl NarrationSynthesizer {
    pub fn new(
        primary: Option<Box<dyn NarrationProvider>>,
        fallback: Box<dyn NarrationProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            timeout,
        }
    }

    /// Build the chain from configuration. Without a shared ElevenLabs client (no credential)
    /// the primary is never constructed.
    pub fn from_config(cfg: &PipelineConfig, elevenlabs: Option<Arc<ElevenLabsClient>>) -> Self {
        let primary = elevenlabs.map(|client| {
            Box::new(ElevenLabsNarrator::new(
                client,
                cfg.narration.primary.clone(),
            )) as Box<dyn NarrationProvider>
        });
        if primary.is_none() {
            info!("no premium narration credential; using fallback narration only");
        }
        let fallback = Box::new(EdgeTtsProvider::new(
            cfg.narration.edge_tts_binary.clone(),
            cfg.narration.fallback.clone(),
        ));
        Self::new(primary, fallback, cfg.provider_timeout())
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Synthesize `text` into `out_path`, falling back once on any primary failure.
    pub async fn synthesize(&self, text: &str, out_path: &Path) -> FactoryResult<PathBuf> {
        if let Some(primary) = &self.primary {
            match self.attempt(primary.as_ref(), text, out_path).await {
                Ok(()) => return Ok(out_path.to_path_buf()),
                Err(e) => warn!(
                    provider = primary.name(),
                    role = ?primary.role(),
                    error = %e,
                    "primary narration failed; retrying with fallback"
                ),
            }
        }

        self.attempt(self.fallback.as_ref(), text, out_path)
            .await
            .map_err(|e| {
                FactoryError::synthesis(format!(
                    "{:?} provider {} failed for '{}': {e}",
                    self.fallback.role(),
                    self.fallback.name(),
                    out_path.display()
                ))
            })?;
        Ok(out_path.to_path_buf())
    }

    async fn attempt(
        &self,
        provider: &dyn NarrationProvider,
        text: &str,
        out_path: &Path,
    ) -> Result<(), ProviderError> {
        remove_if_present(out_path).await;
        let result = match tokio::time::timeout(self.timeout, provider.synthesize(text, out_path))
            .await
        {
            Ok(Ok(())) => validate_output(out_path).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        };
        match &result {
            Ok(()) => debug!(
                provider = provider.name(),
                role = ?provider.role(),
                path = %out_path.display(),
                "narration written"
            ),
            Err(_) => remove_if_present(out_path).await,
        }
        result
    }
}

async fn validate_output(path: &Path) -> Result<(), ProviderError> {
    match tokio::fs::metadata(path).await {
        Ok(m) if m.len() > 0 => Ok(()),
        Ok(_) => Err(ProviderError::EmptyOutput(format!(
            "'{}' is empty",
            path.display()
        ))),
        Err(_) => Err(ProviderError::EmptyOutput(format!(
            "'{}' was not written",
            path.display()
        ))),
    }
}

async fn remove_if_present(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove stale narration file");
    }
}
