use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, ScriptError, SessionError};
use crate::script::{MediaRef, Part, ScriptParser};
use crate::session::store::SessionStore;
use crate::session::types::{EditingSession, PrepareOptions, RenderOptions, ScriptInput};
use crate::synthesis::MediaSynthesizer;

/// Which media a bulk synthesis pass should (re)generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisScope {
    /// Only parts whose reference is absent or does not resolve
    Missing,
    /// Every part
    All,
}

/// A part whose media could not be generated during a bulk pass
#[derive(Debug, Clone)]
pub struct PartFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of a bulk synthesis pass
#[derive(Debug, Clone, Default)]
pub struct SynthesisReport {
    pub audio_generated: usize,
    pub images_generated: usize,
    pub failures: Vec<PartFailure>,
}

impl SynthesisReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Operations a client editor performs on a session before finalizing
pub struct SessionEditor {
    store: Arc<SessionStore>,
    synthesizer: Arc<MediaSynthesizer>,
    parser: ScriptParser,
    defaults: RenderOptions,
}

impl SessionEditor {
    pub fn new(store: Arc<SessionStore>, synthesizer: Arc<MediaSynthesizer>, defaults: RenderOptions) -> Self {
        Self {
            store,
            synthesizer,
            parser: ScriptParser::new(),
            defaults,
        }
    }

    /// Editor with render defaults taken from the configuration
    pub fn from_config(store: Arc<SessionStore>, synthesizer: Arc<MediaSynthesizer>, config: &Config) -> Self {
        let defaults = RenderOptions {
            aspect_ratio: config.session.default_aspect_ratio,
            voice_id: config.synthesis.default_voice.clone(),
            image_model: config.synthesis.default_image_model.clone(),
        };
        Self::new(store, synthesizer, defaults)
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Create a session from a script
    pub async fn prepare(&self, input: ScriptInput, options: PrepareOptions) -> Result<(String, Vec<Part>)> {
        let parts = match input {
            ScriptInput::Raw(raw) => {
                if raw.trim().is_empty() {
                    return Err(ScriptError::Empty.into());
                }
                if self.parser.is_menu_text(&raw) {
                    return Err(SessionError::NotNarration.into());
                }
                let parts = self.parser.parse(&raw);
                if parts.is_empty() {
                    return Err(ScriptError::Unparseable.into());
                }
                parts
            }
            ScriptInput::Preformatted(drafts) => {
                if drafts.is_empty() {
                    return Err(ScriptError::Empty.into());
                }
                let mut parts = Vec::with_capacity(drafts.len());
                for (index, draft) in drafts.into_iter().enumerate() {
                    let speech = draft.speech_text.trim();
                    if speech.is_empty() {
                        return Err(SessionError::EmptyNarration { index }.into());
                    }
                    let mut part = Part::new(index, speech, draft.image_description.trim());
                    part.audio_ref = draft.audio_ref;
                    part.image_ref = draft.image_ref;
                    parts.push(part);
                }
                parts
            }
        };

        let session_id = Uuid::new_v4().to_string();
        let options = options.resolve(&self.defaults);
        info!("📝 Prepared session {} with {} parts ({})", session_id, parts.len(), options.aspect_ratio);

        self.store
            .insert(EditingSession::new(session_id.clone(), parts.clone(), options))
            .await;
        Ok((session_id, parts))
    }

    pub async fn get(&self, session_id: &str) -> Result<EditingSession> {
        self.store.get(session_id).await
    }

    /// Replace one part's speech audio
    ///
    /// With `override_text`, the stored speech text becomes the text that was spoken.
    pub async fn regenerate_audio(
        &self,
        session_id: &str,
        part_index: usize,
        voice: Option<&str>,
        override_text: Option<&str>,
    ) -> Result<MediaRef> {
        let lease = self.store.lock_part(session_id, part_index).await?;

        let text = override_text.unwrap_or(&lease.part.speech_text).trim().to_string();
        if text.is_empty() {
            return Err(SessionError::EmptyNarration { index: part_index }.into());
        }
        let voice = voice.unwrap_or(&lease.options.voice_id);

        let audio = self
            .synthesizer
            .speech_to_file(session_id, part_index, &text, voice)
            .await?;

        let replace_text = override_text.is_some();
        let reference = audio.clone();
        self.store
            .update_part(session_id, lease.part.id, move |part| {
                part.audio_ref = Some(reference);
                if replace_text {
                    part.speech_text = text;
                }
            })
            .await?;

        Ok(audio)
    }

    /// Replace one part's image
    ///
    /// A given prompt becomes the part's image description. Without one the
    /// stored description is used, falling back to the speech text.
    pub async fn regenerate_image(&self, session_id: &str, part_index: usize, prompt: Option<&str>) -> Result<MediaRef> {
        let lease = self.store.lock_part(session_id, part_index).await?;

        let description = prompt
            .map(str::trim)
            .unwrap_or_else(|| lease.part.image_description.trim())
            .to_string();
        let prompt_text = if description.is_empty() {
            lease.part.speech_text.trim().to_string()
        } else {
            description.clone()
        };
        if prompt_text.is_empty() {
            return Err(SessionError::EmptyNarration { index: part_index }.into());
        }

        let image = self
            .synthesizer
            .image_to_file(
                session_id,
                part_index,
                &prompt_text,
                lease.options.aspect_ratio,
                &lease.options.image_model,
            )
            .await?;

        let replace_description = prompt.is_some();
        let reference = image.clone();
        self.store
            .update_part(session_id, lease.part.id, move |part| {
                part.image_ref = Some(reference);
                if replace_description {
                    part.image_description = description;
                }
            })
            .await?;

        Ok(image)
    }

    /// Generate media for every part, one provider call at a time
    ///
    /// A part that fails is reported and the pass moves on.
    pub async fn synthesize(&self, session_id: &str, scope: SynthesisScope) -> Result<SynthesisReport> {
        let session = self.store.get(session_id).await?;
        let mut report = SynthesisReport::default();

        let needs = |reference: &Option<MediaRef>| match scope {
            SynthesisScope::All => true,
            SynthesisScope::Missing => !reference.as_ref().map(MediaRef::is_resolvable).unwrap_or(false),
        };

        for part in &session.parts {
            if needs(&part.audio_ref) {
                match self.regenerate_audio(session_id, part.index, None, None).await {
                    Ok(_) => report.audio_generated += 1,
                    Err(e) => {
                        warn!("⚠️  Speech for part {} failed: {}", part.index, e);
                        report.failures.push(PartFailure { index: part.index, error: e.to_string() });
                        continue;
                    }
                }
            }

            if needs(&part.image_ref) {
                match self.regenerate_image(session_id, part.index, None).await {
                    Ok(_) => report.images_generated += 1,
                    Err(e) => {
                        warn!("⚠️  Image for part {} failed: {}", part.index, e);
                        report.failures.push(PartFailure { index: part.index, error: e.to_string() });
                    }
                }
            }
        }

        info!(
            "✅ Synthesis pass for {}: {} audio, {} images, {} failures",
            session_id,
            report.audio_generated,
            report.images_generated,
            report.failures.len()
        );
        Ok(report)
    }

    /// Put parts in a new order
    ///
    /// `order[i]` is the current index of the part that moves to position `i`.
    pub async fn reorder(&self, session_id: &str, order: &[usize]) -> Result<Vec<Part>> {
        self.store
            .update(session_id, |session| {
                let count = session.parts.len();
                validate_permutation(order, count)?;

                let mut slots: Vec<Option<Part>> = session.parts.drain(..).map(Some).collect();
                for (position, &from) in order.iter().enumerate() {
                    if let Some(mut part) = slots[from].take() {
                        part.index = position;
                        session.parts.push(part);
                    }
                }
                Ok(session.parts.clone())
            })
            .await
    }

    /// Change render options; unset fields keep their current value
    pub async fn update_options(&self, session_id: &str, options: PrepareOptions) -> Result<RenderOptions> {
        self.store
            .update(session_id, |session| {
                session.options = options.resolve(&session.options);
                Ok(session.options.clone())
            })
            .await
    }

    pub async fn discard(&self, session_id: &str) -> bool {
        self.store.discard(session_id).await
    }
}

fn validate_permutation(order: &[usize], count: usize) -> std::result::Result<(), SessionError> {
    if order.len() != count {
        return Err(SessionError::InvalidOrder {
            reason: format!("expected {} positions, got {}", count, order.len()),
        });
    }

    let mut seen = HashSet::with_capacity(count);
    for &index in order {
        if index >= count {
            return Err(SessionError::InvalidOrder {
                reason: format!("index {} out of range", index),
            });
        }
        if !seen.insert(index) {
            return Err(SessionError::InvalidOrder {
                reason: format!("index {} appears twice", index),
            });
        }
    }
    Ok(())
}
