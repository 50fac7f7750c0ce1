use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use super::process::run_tool;
use super::{ProviderError, ProviderResult, TimedText, Transcriber};

static WHISPER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d+):(\d{2}):(\d{2})\.(\d{3}) --> [^\]]+\]\s*(.*)$")
        .expect("whisper timestamp pattern")
});

/// Decode with ffmpeg to 16 kHz mono WAV, then run a whisper.cpp-style CLI.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    ffmpeg: Option<String>,
    whisper: String,
    model: Option<PathBuf>,
}

impl WhisperTranscriber {
    #[must_use]
    pub fn new(ffmpeg: Option<String>, whisper: impl Into<String>, model: Option<PathBuf>) -> Self {
        Self {
            ffmpeg,
            whisper: whisper.into(),
            model,
        }
    }
}

#[async_trait::async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, bytes: &[u8]) -> ProviderResult<Vec<TimedText>> {
        let Some(ffmpeg) = &self.ffmpeg else {
            return Err(ProviderError::Unavailable(
                "no audio decoder configured (ffmpeg)".to_string(),
            ));
        };
        let Some(model) = &self.model else {
            return Err(ProviderError::Unavailable(
                "no whisper model configured".to_string(),
            ));
        };

        let dir = tempfile::tempdir()
            .map_err(|e| ProviderError::Transient(format!("temp dir: {e}")))?;
        let input = dir.path().join("input.media");
        let wav = dir.path().join("audio.wav");
        tokio::fs::write(&input, bytes)
            .await
            .map_err(|e| ProviderError::Transient(format!("temp file: {e}")))?;

        let input = input.to_string_lossy();
        let wav = wav.to_string_lossy();
        run_tool(
            ffmpeg,
            &[
                "-y", "-i", &*input, "-vn", "-ac", "1", "-ar", "16000", "-f", "wav", &*wav,
            ],
            None,
        )
        .await?;

        let model = model.to_string_lossy();
        let out = run_tool(&self.whisper, &["-m", &*model, "-f", &*wav], None).await?;
        Ok(parse_whisper_output(&String::from_utf8_lossy(&out)))
    }
}

/// Parse `[hh:mm:ss.mmm --> hh:mm:ss.mmm]  text` lines. Output without
/// timestamps becomes a single segment at offset zero.
#[must_use]
pub fn parse_whisper_output(raw: &str) -> Vec<TimedText> {
    let mut timed = Vec::new();
    for line in raw.lines() {
        let Some(caps) = WHISPER_LINE.captures(line.trim()) else {
            continue;
        };
        let text = caps[5].trim();
        if text.is_empty() {
            continue;
        }
        let field = |i: usize| caps[i].parse::<i64>().unwrap_or_default();
        let offset_ms = ((field(1) * 60 + field(2)) * 60 + field(3)) * 1000 + field(4);
        timed.push(TimedText {
            offset_ms,
            text: text.to_string(),
        });
    }

    if timed.is_empty() {
        let text = raw.trim();
        if !text.is_empty() {
            timed.push(TimedText {
                offset_ms: 0,
                text: text.to_string(),
            });
        }
    }
    timed
}
