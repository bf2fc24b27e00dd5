use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SynthesisConfig;
use crate::error::{Result, SynthesisError};
use crate::script::MediaRef;
use crate::session::AspectRatio;
use crate::synthesis::{ImageGenerator, SpeechSynthesizer};

/// Enforces a minimum spacing between consecutive provider calls
///
/// Callers queue on the lock, so the spacing holds across concurrent tasks.
pub struct Pacer {
    spacing: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until the spacing since the previous call has elapsed
    pub async fn wait_turn(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.spacing {
                let wait = self.spacing - elapsed;
                debug!("Spacing provider call by {:?}", wait);
                sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Paced, retrying front end to the speech and image providers
pub struct MediaSynthesizer {
    speech: Arc<dyn SpeechSynthesizer>,
    images: Arc<dyn ImageGenerator>,
    pacer: Pacer,
    config: SynthesisConfig,
}

impl MediaSynthesizer {
    pub fn new(
        speech: Arc<dyn SpeechSynthesizer>,
        images: Arc<dyn ImageGenerator>,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            speech,
            images,
            pacer: Pacer::new(config.call_spacing()),
            config,
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Synthesize `text` and write it under the session's media directory
    ///
    /// Every call writes a new file, so references held by earlier snapshots
    /// stay valid.
    pub async fn speech_to_file(&self, session_id: &str, part_index: usize, text: &str, voice_id: &str) -> Result<MediaRef> {
        info!("🎙️  Synthesizing speech for part {} ({} chars, voice '{}')", part_index, text.len(), voice_id);

        let language = self.config.language.clone();
        let audio = self
            .with_retries("speech", || self.speech.synthesize(text, voice_id, &language))
            .await?;

        if audio.is_empty() {
            return Err(SynthesisError::EmptyResult.into());
        }

        let path = self.media_path(session_id, part_index, audio_extension(&audio)).await?;
        tokio::fs::write(&path, &audio).await?;

        debug!("Wrote {} bytes of speech to {:?}", audio.len(), path);
        Ok(MediaRef::File(path))
    }

    /// Generate one image for `prompt` and write it under the session's media directory
    pub async fn image_to_file(
        &self,
        session_id: &str,
        part_index: usize,
        prompt: &str,
        aspect_ratio: AspectRatio,
        model: &str,
    ) -> Result<MediaRef> {
        info!("🖼️  Generating image for part {} ({}, model '{}')", part_index, aspect_ratio, model);

        let images = self
            .with_retries("image", || self.images.generate(prompt, aspect_ratio, model, 1))
            .await?;

        let image = images
            .into_iter()
            .find(|bytes| !bytes.is_empty())
            .ok_or(SynthesisError::EmptyResult)?;

        let path = self.media_path(session_id, part_index, image_extension(&image)).await?;
        tokio::fs::write(&path, &image).await?;

        debug!("Wrote {} bytes of image to {:?}", image.len(), path);
        Ok(MediaRef::File(path))
    }

    /// Run a provider call with pacing and bounded, linearly backed-off retries
    async fn with_retries<T, F, Fut>(&self, what: &str, mut call: F) -> std::result::Result<T, SynthesisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, SynthesisError>>,
    {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.pacer.wait_turn().await;

            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && attempt < max_attempts => {
                    let backoff = self.config.retry_delay() * attempt;
                    warn!("{} provider call failed (attempt {}/{}): {}; retrying in {:?}",
                          what, attempt, max_attempts, e, backoff);
                    sleep(backoff).await;
                }
                Err(e) if is_retryable(&e) => {
                    return Err(SynthesisError::RetriesExhausted {
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn media_path(&self, session_id: &str, part_index: usize, extension: &str) -> Result<PathBuf> {
        let dir = self.config.media_dir.join(session_id);
        tokio::fs::create_dir_all(&dir).await?;

        let unique = Uuid::new_v4().simple().to_string();
        Ok(dir.join(format!("part_{:02}_{}.{}", part_index, &unique[..8], extension)))
    }
}

fn is_retryable(error: &SynthesisError) -> bool {
    matches!(error, SynthesisError::RateLimited | SynthesisError::Failed { .. })
}

fn audio_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"RIFF") {
        "wav"
    } else {
        "mp3"
    }
}

fn image_extension(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "jpg",
        Ok(image::ImageFormat::WebP) => "webp",
        Ok(image::ImageFormat::Gif) => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n rest";

    struct FlakySpeech {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for FlakySpeech {
        async fn synthesize(&self, text: &str, voice_id: &str, _language: &str) -> std::result::Result<Vec<u8>, SynthesisError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(SynthesisError::RateLimited);
            }
            Ok(format!("{voice_id}:{text}").into_bytes())
        }
    }

    struct FixedImages {
        reply: std::result::Result<Vec<Vec<u8>>, SynthesisError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageGenerator for FixedImages {
        async fn generate(
            &self,
            _prompt: &str,
            _aspect_ratio: AspectRatio,
            _model: &str,
            _count: usize,
        ) -> std::result::Result<Vec<Vec<u8>>, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn config(media_dir: PathBuf, max_retries: u32) -> SynthesisConfig {
        SynthesisConfig {
            max_retries,
            retry_delay_ms: 10,
            call_spacing_ms: 0,
            media_dir,
            ..SynthesisConfig::default()
        }
    }

    fn synthesizer(speech: FlakySpeech, images: FixedImages, config: SynthesisConfig) -> MediaSynthesizer {
        MediaSynthesizer::new(Arc::new(speech), Arc::new(images), config)
    }

    fn images(reply: std::result::Result<Vec<Vec<u8>>, SynthesisError>) -> FixedImages {
        FixedImages { reply, calls: AtomicUsize::new(0) }
    }

    #[tokio::test]
    async fn test_speech_retries_then_writes_file() {
        let dir = tempdir().unwrap();
        let media = synthesizer(
            FlakySpeech { failures: 2, calls: AtomicUsize::new(0) },
            images(Ok(vec![])),
            config(dir.path().to_path_buf(), 3),
        );

        let reference = media.speech_to_file("s1", 0, "hello", "amy").await.unwrap();
        let path = reference.path().unwrap();

        assert!(path.starts_with(dir.path().join("s1")));
        assert_eq!(path.extension().unwrap(), "mp3");
        assert_eq!(std::fs::read(path).unwrap(), b"amy:hello");
    }

    #[tokio::test]
    async fn test_speech_gives_up_after_retry_budget() {
        let dir = tempdir().unwrap();
        let media = synthesizer(
            FlakySpeech { failures: 10, calls: AtomicUsize::new(0) },
            images(Ok(vec![])),
            config(dir.path().to_path_buf(), 1),
        );

        let err = media.speech_to_file("s1", 0, "hello", "amy").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::CompositorError::Synthesis(SynthesisError::RetriesExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_image_written_with_sniffed_extension() {
        let dir = tempdir().unwrap();
        let media = synthesizer(
            FlakySpeech { failures: 0, calls: AtomicUsize::new(0) },
            images(Ok(vec![vec![], PNG_MAGIC.to_vec()])),
            config(dir.path().to_path_buf(), 0),
        );

        let reference = media
            .image_to_file("s1", 3, "a lighthouse", AspectRatio::Portrait, "default")
            .await
            .unwrap();
        let path = reference.path().unwrap();

        assert_eq!(path.extension().unwrap(), "png");
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("part_03_"));
    }

    #[test]
    fn test_image_extension_follows_payload() {
        assert_eq!(image_extension(PNG_MAGIC), "png");
        assert_eq!(image_extension(b"\xff\xd8\xff\xe0 jfif"), "jpg");
        assert_eq!(image_extension(b"RIFF\x1a\x00\x00\x00WEBPVP8L"), "webp");
        assert_eq!(image_extension(b"GIF89a\x01\x00"), "gif");
    }

    #[tokio::test]
    async fn test_empty_image_reply_is_an_error_without_retry() {
        let dir = tempdir().unwrap();
        let generator = Arc::new(images(Ok(vec![])));
        let media = MediaSynthesizer::new(
            Arc::new(FlakySpeech { failures: 0, calls: AtomicUsize::new(0) }),
            generator.clone(),
            config(dir.path().to_path_buf(), 3),
        );

        let err = media
            .image_to_file("s1", 0, "x", AspectRatio::Square, "default")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::CompositorError::Synthesis(SynthesisError::EmptyResult)));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_spaces_calls() {
        let pacer = Pacer::new(Duration::from_millis(500));
        let started = Instant::now();

        pacer.wait_turn().await;
        pacer.wait_turn().await;
        pacer.wait_turn().await;

        assert!(started.elapsed() >= Duration::from_millis(1000));
    }
}
