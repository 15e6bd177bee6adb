use std::ffi::OsString;
use std::path::Path;

use tracing::debug;

use crate::config::{ProviderRole, VoiceConfig};
use crate::foundation::error::ProviderError;
use crate::narration::NarrationProvider;

/// Fallback narration provider: the free `edge-tts` command-line synthesizer.
#[derive(Clone, Debug)]
pub struct EdgeTtsProvider {
    binary: String,
    voice: VoiceConfig,
}

impl EdgeTtsProvider {
    pub fn new(binary: impl Into<String>, voice: VoiceConfig) -> Self {
        Self {
            binary: binary.into(),
            voice,
        }
    }

    /// Command-line arguments for one call. The text rides in the same argv slot as its flag so
    /// a leading `-` is never read as an option.
    fn args(&self, text: &str, out_path: &Path) -> Vec<OsString> {
        let mut write_media = OsString::from("--write-media=");
        write_media.push(out_path);
        vec![
            OsString::from(format!("--voice={}", self.voice.voice_id)),
            OsString::from(format!("--text={text}")),
            write_media,
        ]
    }
}

#[async_trait::async_trait]
impl NarrationProvider for EdgeTtsProvider {
    fn name(&self) -> &str {
        "edge-tts"
    }

    fn role(&self) -> ProviderRole {
        self.voice.provider
    }

    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<(), ProviderError> {
        debug!(binary = %self.binary, voice = %self.voice.voice_id, "spawning edge-tts");
        let out = tokio::process::Command::new(&self.binary)
            .args(self.args(text, out_path))
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProviderError::Command(format!("failed to run '{}': {e}", self.binary)))?;
        if !out.status.success() {
            return Err(ProviderError::Command(format!(
                "'{}' exited with {}: {}",
                self.binary,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(())
    }
}
