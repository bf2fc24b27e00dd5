use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::{
    composition::{build_cues, to_srt, Cue, DurationPolicy, SubtitleMode, ZoomMotion},
    config::Config,
    error::{PipelineError, Result, ToolchainError},
    script::Part,
    session::{EditingSession, SessionStore},
    store::{NewVideoRecord, OutputStore, VideoRecordStore},
    timeline::{Clip, ClipKind, Timeline, TimelineState},
    toolchain::{MediaToolchain, MusicMix, RenderWorkspace, SegmentRequest},
};

/// Where a finalize run is, for logging and error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStage {
    Validate,
    RenderSegments,
    Concatenate,
    GenerateSubtitles,
    MixMusic,
    Persist,
    Done,
    Failed,
}

impl fmt::Display for FinalizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinalizeStage::Validate => "validate",
            FinalizeStage::RenderSegments => "render-segments",
            FinalizeStage::Concatenate => "concatenate",
            FinalizeStage::GenerateSubtitles => "generate-subtitles",
            FinalizeStage::MixMusic => "mix-music",
            FinalizeStage::Persist => "persist",
            FinalizeStage::Done => "done",
            FinalizeStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Slice of a music file to lay under the narration
#[derive(Debug, Clone, PartialEq)]
pub struct MusicSelection {
    pub path: PathBuf,
    pub start: f64,
    pub end: Option<f64>,
}

/// What to finalize and how to label the result
#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub session_id: String,
    pub title: String,
    pub owner_id: Option<String>,
    pub music: Option<MusicSelection>,
}

impl FinalizeRequest {
    pub fn new(session_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            title: title.into(),
            owner_id: None,
            music: None,
        }
    }
}

/// A part left out of the final video
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPart {
    pub index: usize,
    pub reason: String,
}

/// Result of a successful finalize run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionOutput {
    pub video_id: String,
    pub storage_key: String,
    pub public_url: String,
    pub subtitle_url: String,
    pub duration: f64,
    pub part_count: usize,
    pub cues: Vec<Cue>,
    pub skipped_parts: Vec<SkippedPart>,
    pub timeline: TimelineState,
}

struct EligiblePart<'a> {
    part: &'a Part,
    audio: PathBuf,
    image: PathBuf,
}

struct RenderedSegment<'a> {
    source: EligiblePart<'a>,
    path: PathBuf,
    duration: f64,
}

/// Turns an editing session into a stored, subtitled video
///
/// The pipeline runs its stages in a fixed order:
/// 1. Validate - keep parts whose audio and image resolve to real media
/// 2. Render segments - one zooming clip per part, as long as its audio
/// 3. Concatenate - join segments in part order
/// 4. Generate subtitles - back-to-back cues from the rendered durations
/// 5. Mix music - optional background bed under the narration
/// 6. Persist - output store, then the video record
///
/// Parts are processed one at a time. Scratch files live in a
/// [`RenderWorkspace`] and are gone when the run returns.
pub struct FinalizationPipeline {
    config: Config,
    sessions: Arc<SessionStore>,
    toolchain: Arc<dyn MediaToolchain>,
    outputs: Arc<dyn OutputStore>,
    records: Arc<dyn VideoRecordStore>,
}

impl FinalizationPipeline {
    pub fn new(
        config: Config,
        sessions: Arc<SessionStore>,
        toolchain: Arc<dyn MediaToolchain>,
        outputs: Arc<dyn OutputStore>,
        records: Arc<dyn VideoRecordStore>,
    ) -> Self {
        Self {
            config,
            sessions,
            toolchain,
            outputs,
            records,
        }
    }

    /// Render, subtitle and store the session's current parts
    ///
    /// Only one run per session can be in flight; a second call fails with
    /// `SessionError::FinalizeInProgress`. The session is left intact when the
    /// run fails.
    pub async fn finalize(&self, request: FinalizeRequest) -> Result<CompositionOutput> {
        let music = self.music_mix(request.music.as_ref())?;
        let guard = self.sessions.begin_finalize(&request.session_id).await?;

        info!("🎬 Finalizing session {} ({} parts)", request.session_id, guard.snapshot.parts.len());
        info!("   Title: {}", request.title);
        info!("   Canvas: {}", guard.snapshot.options.aspect_ratio);

        let mut stage = FinalizeStage::Validate;
        let result = self.run(&guard.snapshot, &request, music.as_ref(), &mut stage).await;

        match &result {
            Ok(output) => {
                info!("🎉 Finalized {} -> {} ({:.1}s)", request.session_id, output.public_url, output.duration);
            }
            Err(e) => {
                error!("❌ Finalize of {} failed during {}: {}", request.session_id, stage, e);
            }
        }

        drop(guard);
        if result.is_ok() && self.config.session.discard_after_finalize {
            self.sessions.discard(&request.session_id).await;
        }
        result
    }

    async fn run(
        &self,
        session: &EditingSession,
        request: &FinalizeRequest,
        music: Option<&MusicMix>,
        stage: &mut FinalizeStage,
    ) -> Result<CompositionOutput> {
        // Stage 1: Validate
        let (eligible, mut skipped) = self.validate(session).await?;
        let workspace = RenderWorkspace::new(self.config.render.work_dir.as_deref())?;

        // Stage 2: Render segments
        *stage = FinalizeStage::RenderSegments;
        let attempted = eligible.len();
        let segments = self.render_segments(session, eligible, &workspace, &mut skipped).await?;
        if segments.is_empty() {
            return Err(PipelineError::NoRenderedSegments { attempted }.into());
        }
        let timeline = self.build_timeline(&segments)?;

        // Stage 3: Concatenate
        *stage = FinalizeStage::Concatenate;
        let mut video = self.concatenate(&segments, &workspace).await?;

        // Stage 4: Subtitles
        *stage = FinalizeStage::GenerateSubtitles;
        let cues = build_cues(segments.iter().map(|s| (s.duration, s.source.part.speech_text.as_str())));
        let srt = to_srt(&cues);
        let srt_path = workspace.file("subtitles.srt");
        tokio::fs::write(&srt_path, &srt).await?;
        video = self.attach_subtitles(&video, &srt_path, &workspace).await?;

        // Stage 5: Music
        if let Some(music) = music {
            *stage = FinalizeStage::MixMusic;
            video = self.mix_music(&video, music, &workspace).await?;
        }

        // Stage 6: Persist
        *stage = FinalizeStage::Persist;
        let fingerprint = self.fingerprint(session, &srt, music);
        let output = self
            .persist(session, request, &fingerprint, &video, &srt_path, cues, skipped, segments.len(), timeline)
            .await?;

        *stage = FinalizeStage::Done;
        Ok(output)
    }

    // ==========================================
    // STAGE 1: VALIDATE
    // ==========================================

    async fn validate<'a>(&self, session: &'a EditingSession) -> Result<(Vec<EligiblePart<'a>>, Vec<SkippedPart>)> {
        info!("🔍 Step 1: Checking part media...");

        let mut eligible = Vec::new();
        let mut skipped = Vec::new();

        for part in &session.parts {
            let checked = match eligibility(part) {
                Ok(source) => readable_image(&source.image).await.map(|()| source),
                Err(reason) => Err(reason),
            };
            match checked {
                Ok(source) => eligible.push(source),
                Err(reason) => {
                    warn!("   Part {} is not renderable: {}", part.index, reason);
                    skipped.push(SkippedPart { index: part.index, reason });
                }
            }
        }

        if eligible.is_empty() {
            return Err(PipelineError::NoEligibleParts { total: session.parts.len() }.into());
        }

        info!("   ✅ {} of {} parts eligible", eligible.len(), session.parts.len());
        Ok((eligible, skipped))
    }

    // ==========================================
    // STAGE 2: RENDER SEGMENTS
    // ==========================================

    async fn render_segments<'a>(
        &self,
        session: &EditingSession,
        eligible: Vec<EligiblePart<'a>>,
        workspace: &RenderWorkspace,
        skipped: &mut Vec<SkippedPart>,
    ) -> Result<Vec<RenderedSegment<'a>>> {
        info!("🎞️  Step 2: Rendering {} segments...", eligible.len());

        let render = &self.config.render;
        let canvas = session.options.aspect_ratio.canvas();
        let mut segments = Vec::with_capacity(eligible.len());

        for source in eligible {
            let index = source.part.index;

            let duration = match self.segment_duration(&source).await {
                Ok(Some(duration)) => duration,
                Ok(None) => {
                    skipped.push(SkippedPart { index, reason: "audio duration unknown".to_string() });
                    continue;
                }
                Err(e) => {
                    self.part_failed(index, e, skipped)?;
                    continue;
                }
            };

            let request = SegmentRequest {
                part_index: index,
                image: source.image.clone(),
                audio: source.audio.clone(),
                output: workspace.segment_path(index),
                duration,
                canvas,
                fps: render.fps,
                motion: ZoomMotion::for_part(index, render.max_zoom),
            };

            match self.toolchain.render_segment(&request).await {
                Ok(path) => {
                    debug!("   Part {} rendered ({:.2}s)", index, duration);
                    segments.push(RenderedSegment { source, path, duration });
                }
                Err(e) => self.part_failed(index, e, skipped)?,
            }
        }

        info!("   ✅ {} segments rendered, {} parts skipped", segments.len(), skipped.len());
        Ok(segments)
    }

    /// Probed audio length, with the configured policy applied to unusable values
    async fn segment_duration(&self, source: &EligiblePart<'_>) -> std::result::Result<Option<f64>, ToolchainError> {
        let probed = match self.toolchain.probe_duration(&source.audio).await {
            Ok(duration) => Some(duration),
            Err(ToolchainError::ProbeFailed { reason, .. }) => {
                warn!("   Part {}: {}", source.part.index, reason);
                None
            }
            Err(e) => return Err(e),
        };

        let usable = probed.filter(|d| d.is_finite() && *d > 0.0);
        if usable.is_some() {
            return Ok(usable);
        }

        match self.config.render.duration_policy {
            DurationPolicy::Substitute => {
                let fallback = self.config.render.fallback_duration;
                warn!("   Part {}: unusable duration {:?}, using {:.1}s", source.part.index, probed, fallback);
                Ok(Some(fallback))
            }
            DurationPolicy::Skip => {
                warn!("   Part {}: unusable duration {:?}, skipping", source.part.index, probed);
                Ok(None)
            }
        }
    }

    /// Record a part-level toolchain failure, or abort when skipping is off
    fn part_failed(&self, index: usize, e: ToolchainError, skipped: &mut Vec<SkippedPart>) -> Result<()> {
        if !self.config.render.skip_failed_parts {
            return Err(PipelineError::Segment { part_index: index, source: e }.into());
        }
        warn!("⚠️  Part {} failed to render, skipping: {}", index, e);
        skipped.push(SkippedPart { index, reason: e.to_string() });
        Ok(())
    }

    fn build_timeline(&self, segments: &[RenderedSegment<'_>]) -> Result<Timeline> {
        let mut timeline = Timeline::from_config(&self.config.timeline);
        for segment in segments {
            let name = format!("Part {}", segment.source.part.index + 1);
            let visual = Clip::new(
                ClipKind::PrimaryVisual,
                segment.source.image.display().to_string(),
                name.clone(),
                segment.duration,
            );
            let speech = Clip::new(
                ClipKind::SpeechAudio,
                segment.source.audio.display().to_string(),
                name,
                segment.duration,
            );
            timeline.append(visual)?;
            timeline.append(speech)?;
        }
        Ok(timeline)
    }

    // ==========================================
    // STAGE 3: CONCATENATE
    // ==========================================

    async fn concatenate(&self, segments: &[RenderedSegment<'_>], workspace: &RenderWorkspace) -> Result<PathBuf> {
        info!("🔗 Step 3: Joining segments...");

        let paths: Vec<PathBuf> = segments.iter().map(|s| s.path.clone()).collect();
        let joined = self
            .toolchain
            .concat(&paths, &workspace.file("joined.mp4"), workspace.path())
            .await
            .map_err(PipelineError::Concatenate)?;

        workspace.remove_files(&paths).await;
        Ok(joined)
    }

    // ==========================================
    // STAGE 4: SUBTITLES
    // ==========================================

    async fn attach_subtitles(&self, video: &Path, srt: &Path, workspace: &RenderWorkspace) -> Result<PathBuf> {
        let mode = self.config.render.subtitle_mode;
        info!("💬 Step 4: Subtitles ({:?})...", mode);

        if mode == SubtitleMode::Sidecar {
            return Ok(video.to_path_buf());
        }

        let attached = self
            .toolchain
            .attach_subtitles(video, srt, mode, &workspace.file("subtitled.mp4"))
            .await
            .map_err(PipelineError::Subtitles)?;
        Ok(attached)
    }

    // ==========================================
    // STAGE 5: MUSIC
    // ==========================================

    fn music_mix(&self, selection: Option<&MusicSelection>) -> Result<Option<MusicMix>> {
        let Some(selection) = selection else {
            return Ok(None);
        };

        let start_ok = selection.start.is_finite() && selection.start >= 0.0;
        let end_ok = selection.end.map_or(true, |end| end.is_finite() && end > selection.start);
        if !start_ok || !end_ok {
            return Err(PipelineError::InvalidMusicWindow {
                start: selection.start,
                end: selection.end.unwrap_or(f64::NAN),
            }
            .into());
        }

        Ok(Some(MusicMix {
            path: selection.path.clone(),
            start: selection.start,
            end: selection.end,
            gain: self.config.music.gain,
        }))
    }

    async fn mix_music(&self, video: &Path, music: &MusicMix, workspace: &RenderWorkspace) -> Result<PathBuf> {
        info!("🎵 Step 5: Mixing background music...");
        let mixed = self
            .toolchain
            .mix_music(video, music, &workspace.file("mixed.mp4"))
            .await
            .map_err(PipelineError::MixMusic)?;
        Ok(mixed)
    }

    // ==========================================
    // STAGE 6: PERSIST
    // ==========================================

    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        session: &EditingSession,
        request: &FinalizeRequest,
        fingerprint: &str,
        video: &Path,
        srt: &Path,
        cues: Vec<Cue>,
        skipped: Vec<SkippedPart>,
        part_count: usize,
        timeline: Timeline,
    ) -> Result<CompositionOutput> {
        info!("💾 Step 6: Storing output...");

        let stem = format!("{}-{}-{}", slugify(&request.title), session.session_id, fingerprint);
        let storage_key = format!("{}.mp4", stem);

        let public_url = self.outputs.store(video, &storage_key, "video/mp4").await?;
        let subtitle_url = self
            .outputs
            .store(srt, &format!("{}.srt", stem), "application/x-subrip")
            .await?;

        let size_mb = tokio::fs::metadata(video).await?.len() as f64 / (1024.0 * 1024.0);
        let video_id = self
            .records
            .insert(NewVideoRecord {
                filename: storage_key.clone(),
                storage_key: storage_key.clone(),
                public_url: public_url.clone(),
                size_mb,
                title: request.title.clone(),
                script: script_text(&session.parts),
                owner_id: request.owner_id.clone(),
            })
            .await?;

        Ok(CompositionOutput {
            video_id,
            storage_key,
            public_url,
            subtitle_url,
            duration: timeline.duration(),
            part_count,
            cues,
            skipped_parts: skipped,
            timeline: timeline.state(),
        })
    }

    /// Short digest of everything that shapes the stored output
    ///
    /// Retries of an unchanged session map to the same storage key, any edit
    /// to a part, the options, the render settings or the music gets a new one.
    fn fingerprint(&self, session: &EditingSession, srt: &str, music: Option<&MusicMix>) -> String {
        let mut hasher = Sha256::new();
        for part in &session.parts {
            hasher.update(part.id.as_bytes());
            hasher.update(part.speech_text.as_bytes());
            for reference in [&part.audio_ref, &part.image_ref] {
                let text = reference.as_ref().map(|r| r.to_string()).unwrap_or_default();
                hasher.update([0u8]);
                hasher.update(text.as_bytes());
            }
        }
        hasher.update(format!("{:?}", session.options).as_bytes());
        hasher.update(format!("{:?}", self.config.render).as_bytes());
        hasher.update(format!("{:?}", music).as_bytes());
        hasher.update(srt.as_bytes());

        hasher.finalize().iter().take(6).map(|b| format!("{:02x}", b)).collect()
    }
}

/// Resolve a part's media, or say why it cannot be rendered
fn eligibility(part: &Part) -> std::result::Result<EligiblePart<'_>, String> {
    let audio = match &part.audio_ref {
        None => return Err("no audio".to_string()),
        Some(reference) if !reference.is_resolvable() => {
            return Err(format!("audio '{}' does not resolve", reference));
        }
        Some(reference) => reference.path().map(|p| p.to_path_buf()),
    };
    let image = match &part.image_ref {
        None => return Err("no image".to_string()),
        Some(reference) if !reference.is_resolvable() => {
            return Err(format!("image '{}' does not resolve", reference));
        }
        Some(reference) => reference.path().map(|p| p.to_path_buf()),
    };

    match (audio, image) {
        (Some(audio), Some(image)) => Ok(EligiblePart { part, audio, image }),
        _ => Err("media reference has no file path".to_string()),
    }
}

/// Decode the image header off the async runtime, sniffing the format from content
async fn readable_image(path: &Path) -> std::result::Result<(), String> {
    let owned = path.to_path_buf();
    let header = tokio::task::spawn_blocking(move || -> image::ImageResult<(u32, u32)> {
        image::io::Reader::open(&owned)?.with_guessed_format()?.into_dimensions()
    })
    .await;

    match header {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("image {:?} is not readable: {}", path, e)),
        Err(e) => Err(format!("image check for {:?} did not finish: {}", path, e)),
    }
}

/// Plain-text script stored with the video record
fn script_text(parts: &[Part]) -> String {
    parts
        .iter()
        .map(|p| p.speech_text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Lowercase, dash-separated form of a title for use in storage keys
fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= 60 {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "video".to_string()
    } else {
        slug.to_string()
    }
}
