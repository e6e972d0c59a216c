//! Scene clip rendering.
//!
//! Every clip comes out with the same encoding (H.264 yuv420p at the canvas
//! frame rate, stereo 44.1 kHz AAC) so the final cut can be joined with
//! stream copy.
//!
//! Text is passed to `drawtext` through temporary text files, which avoids
//! escaping narration inside the filter graph.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use reel_models::{AspectRatio, AspectRatioSettings, MediaKind};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::convert::{fit_filter, CropMode};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::ensure_parent_dir;

/// Seconds each still image stays on screen.
pub const IMAGE_SLOT_SECS: f64 = 2.5;

/// Words shown per burned-in subtitle phrase.
pub const WORDS_PER_PHRASE: usize = 3;

const GRADIENT_TOP: &str = "0xADD8E6";
const GRADIENT_BOTTOM: &str = "0x00008B";
const SAMPLE_RATE: u32 = 44_100;

/// Output frame geometry and rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Canvas {
    pub fn for_ratio(ratio: AspectRatio) -> Self {
        let s = ratio.settings();
        Self {
            width: s.screen_width,
            height: s.screen_height,
            fps: 24,
        }
    }

    fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// A converted asset available to a body scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Visual {
    pub path: PathBuf,
    pub kind: MediaKind,
    /// Known clip length for videos
    pub duration: Option<f64>,
}

impl Visual {
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: MediaKind::Image,
            duration: None,
        }
    }

    pub fn video(path: impl Into<PathBuf>, duration: Option<f64>) -> Self {
        Self {
            path: path.into(),
            kind: MediaKind::Video,
            duration,
        }
    }

    /// Screen time one pass of this visual takes.
    fn slot(&self) -> f64 {
        match (self.kind, self.duration) {
            (MediaKind::Video, Some(d)) if d > 0.0 => d,
            _ => IMAGE_SLOT_SECS,
        }
    }
}

/// One timed piece of a body scene's picture track.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub visual: Visual,
    pub duration: f64,
}

/// Lay visuals end to end, cycling through them until `total` seconds are
/// covered. The last segment is cut short to land exactly on `total`.
pub fn plan_segments(visuals: &[Visual], total: f64) -> Vec<Segment> {
    let mut segments = Vec::new();
    if visuals.is_empty() || total <= 0.0 {
        return segments;
    }

    let mut covered = 0.0;
    for visual in visuals.iter().cycle() {
        let remaining = total - covered;
        if remaining <= 1e-6 {
            break;
        }
        let duration = visual.slot().min(remaining);
        segments.push(Segment {
            visual: visual.clone(),
            duration,
        });
        covered += duration;
    }
    segments
}

/// Where a clip's audio comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneAudio {
    /// Synthesized narration file
    Narration(PathBuf),
    /// The first visual's own soundtrack
    Embedded,
    Silence,
}

/// A timed subtitle phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Split narration into short phrases timed in proportion to their word count.
pub fn subtitle_phrases(narration: &str, total: f64, words_per_phrase: usize) -> Vec<Phrase> {
    let words: Vec<&str> = narration.split_whitespace().collect();
    if words.is_empty() || total <= 0.0 || words_per_phrase == 0 {
        return Vec::new();
    }

    let per_word = total / words.len() as f64;
    let mut start = 0.0;
    words
        .chunks(words_per_phrase)
        .map(|chunk| {
            let end = start + per_word * chunk.len() as f64;
            let phrase = Phrase {
                text: chunk.join(" "),
                start,
                end,
            };
            start = end;
            phrase
        })
        .collect()
}

/// Greedy word wrap to at most `max_chars` per line. Words longer than a
/// line are split after a hyphen when possible, otherwise hard.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: String = word.to_string();

        while word.chars().count() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_chars).collect();
            let cut = head.rfind('-').map(|i| i + 1).unwrap_or(head.len());
            lines.push(word[..cut].to_string());
            word = word[cut..].to_string();
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Characters per line for text `font_size` pixels tall across `width` pixels.
fn chars_per_line(width: f64, font_size: u32) -> usize {
    ((width / (font_size as f64 * 0.55)).floor() as usize).max(8)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// `drawtext` reading from `file`, centred horizontally at pixel row `y`.
fn drawtext(file: &Path, font_file: Option<&Path>, font_size: u32, y: &str, extra: &str) -> String {
    let mut filter = format!(
        "drawtext=textfile={}:fontcolor=white:fontsize={}:x=(w-text_w)/2:y={}",
        quote(&file.to_string_lossy()),
        font_size,
        y
    );
    if let Some(font) = font_file {
        filter.push_str(&format!(":fontfile={}", quote(&font.to_string_lossy())));
    }
    if !extra.is_empty() {
        filter.push(':');
        filter.push_str(extra);
    }
    filter
}

fn encode(cmd: FfmpegCommand, canvas: &Canvas, duration: f64) -> FfmpegCommand {
    cmd.duration(duration)
        .video_codec("libx264")
        .preset("veryfast")
        .crf(20)
        .output_args(["-pix_fmt", "yuv420p", "-r"])
        .output_arg(canvas.fps.to_string())
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_arg("-ar")
        .output_arg(SAMPLE_RATE.to_string())
        .output_args(["-ac", "2"])
        .output_args(["-movflags", "+faststart"])
}

/// Subtitle text files written for one render.
#[derive(Debug, Default)]
pub struct SubtitleTrack {
    pub entries: Vec<(PathBuf, Phrase)>,
    pub font_size: u32,
    pub y: u32,
}

impl SubtitleTrack {
    /// Phrases drawn near the bottom of the canvas, one at a time.
    pub async fn write(dir: &Path, narration: &str, duration: f64, canvas: &Canvas) -> MediaResult<Self> {
        let font_size = (canvas.height / 32).max(12);
        let max_chars = chars_per_line(canvas.width as f64 * 0.9, font_size);
        let mut entries = Vec::new();
        for (i, phrase) in subtitle_phrases(narration, duration, WORDS_PER_PHRASE)
            .into_iter()
            .enumerate()
        {
            let path = dir.join(format!("subtitle_{:03}.txt", i));
            tokio::fs::write(&path, wrap_text(&phrase.text, max_chars).join("\n")).await?;
            entries.push((path, phrase));
        }
        Ok(Self {
            entries,
            font_size,
            y: (canvas.height as f64 * 0.8).round() as u32,
        })
    }

    fn filters(&self, font_file: Option<&Path>) -> Vec<String> {
        self.entries
            .iter()
            .map(|(path, phrase)| {
                drawtext(
                    path,
                    font_file,
                    self.font_size,
                    &self.y.to_string(),
                    &format!(
                        "borderw=3:bordercolor=black:enable='between(t,{:.3},{:.3})'",
                        phrase.start, phrase.end
                    ),
                )
            })
            .collect()
    }
}

/// A body or speech clip built from converted assets.
#[derive(Debug, Clone)]
pub struct BodyClip {
    pub canvas: Canvas,
    pub visuals: Vec<Visual>,
    /// Clip length in seconds
    pub duration: f64,
    pub audio: SceneAudio,
    /// Narration to burn in as subtitles
    pub subtitles: Option<String>,
    pub font_file: Option<PathBuf>,
}

/// Build the FFmpeg command for a body clip. Subtitle text files must
/// already exist.
pub fn build_body_command(clip: &BodyClip, subtitles: &SubtitleTrack, output: &Path) -> MediaResult<FfmpegCommand> {
    if clip.duration <= 0.0 {
        return Err(MediaError::empty_input("clip duration must be positive"));
    }
    if clip.audio == SceneAudio::Embedded && clip.visuals.first().map(|v| v.kind) != Some(MediaKind::Video) {
        return Err(MediaError::empty_input("embedded audio needs a video asset"));
    }

    let canvas = &clip.canvas;
    let fit = fit_filter(canvas.width, canvas.height, CropMode::Contain, "black");
    let mut cmd = FfmpegCommand::without_input(output).label("render_body");
    let mut graph: Vec<String> = Vec::new();

    let segments = plan_segments(&clip.visuals, clip.duration);
    if segments.is_empty() {
        cmd = cmd.lavfi_input(format!(
            "color=c=black:s={}:r={}:d={:.3}",
            canvas.size(),
            canvas.fps,
            clip.duration
        ));
        graph.push("[0:v]format=yuv420p,setsar=1[base]".to_string());
    } else {
        let mut labels = String::new();
        for (i, segment) in segments.iter().enumerate() {
            let t = format!("{:.3}", segment.duration);
            let path = segment.visual.path.to_string_lossy().to_string();
            cmd = match segment.visual.kind {
                MediaKind::Image => cmd.input_with(
                    ["-loop".to_string(), "1".to_string(), "-framerate".to_string(), canvas.fps.to_string(), "-t".to_string(), t.clone()],
                    path,
                ),
                MediaKind::Video if segment.visual.duration.is_none() => {
                    cmd.input_with(["-stream_loop", "-1", "-t", t.as_str()], path)
                }
                MediaKind::Video => cmd.input_with(["-t", t.as_str()], path),
            };
            graph.push(format!(
                "[{i}:v]{fit},fps={fps},format=yuv420p,trim=duration={t},setpts=PTS-STARTPTS[v{i}]",
                i = i,
                fit = fit,
                fps = canvas.fps,
                t = t
            ));
            labels.push_str(&format!("[v{}]", i));
        }
        graph.push(format!("{}concat=n={}:v=1:a=0[base]", labels, segments.len()));
    }

    let text = subtitles.filters(clip.font_file.as_deref());
    if text.is_empty() {
        graph.push("[base]null[vout]".to_string());
    } else {
        graph.push(format!("[base]{}[vout]", text.join(",")));
    }

    let audio_map = match &clip.audio {
        SceneAudio::Narration(path) => {
            let index = cmd.input_count();
            cmd = cmd.input(path);
            format!("{}:a", index)
        }
        SceneAudio::Embedded => "0:a".to_string(),
        SceneAudio::Silence => {
            let index = cmd.input_count();
            cmd = cmd.lavfi_input(format!("anullsrc=r={}:cl=stereo", SAMPLE_RATE));
            format!("{}:a", index)
        }
    };

    let cmd = cmd
        .filter_complex(graph.join(";"))
        .map("[vout]")
        .map(audio_map);
    Ok(encode(cmd, canvas, clip.duration))
}

/// Render a body clip (image slideshow, trimmed video, or black canvas) to `output`.
pub async fn render_body(clip: &BodyClip, output: impl AsRef<Path>) -> MediaResult<()> {
    let output = output.as_ref();
    ensure_parent_dir(output).await?;

    let workdir = tempfile::tempdir()?;
    let subtitles = match &clip.subtitles {
        Some(text) => SubtitleTrack::write(workdir.path(), text, clip.duration, &clip.canvas).await?,
        None => SubtitleTrack::default(),
    };

    let cmd = build_body_command(clip, &subtitles, output)?;
    info!(
        output = %output.display(),
        visuals = clip.visuals.len(),
        duration = clip.duration,
        "Rendering body clip"
    );
    FfmpegRunner::new().run(&cmd).await
}

/// A title, middle-title or outro card.
#[derive(Debug, Clone)]
pub struct TitleCard {
    pub canvas: Canvas,
    pub layout: AspectRatioSettings,
    pub narration: String,
    pub brand_link: Option<String>,
    pub logo: Option<PathBuf>,
    pub narration_audio: PathBuf,
    /// Card length in seconds, normally the narration length
    pub duration: f64,
    pub font_file: Option<PathBuf>,
}

impl TitleCard {
    fn font_size(&self) -> u32 {
        (self.canvas.height / 25).max(12)
    }
}

/// Text files a title card draws from.
#[derive(Debug, Clone)]
pub struct CardText {
    pub narration: PathBuf,
    pub brand_link: Option<PathBuf>,
}

impl CardText {
    pub async fn write(dir: &Path, card: &TitleCard) -> MediaResult<Self> {
        let max_chars = chars_per_line(card.canvas.width as f64 * 0.8, card.font_size());
        let narration = dir.join("narration.txt");
        tokio::fs::write(&narration, wrap_text(&card.narration, max_chars).join("\n")).await?;

        let brand_link = match card.brand_link.as_deref().filter(|l| !l.trim().is_empty()) {
            Some(link) => {
                let path = dir.join("brand_link.txt");
                tokio::fs::write(&path, link.trim()).await?;
                Some(path)
            }
            None => None,
        };
        Ok(Self { narration, brand_link })
    }
}

/// Build the FFmpeg command for a title card.
pub fn build_title_command(card: &TitleCard, text: &CardText, output: &Path) -> MediaResult<FfmpegCommand> {
    if card.duration <= 0.0 {
        return Err(MediaError::empty_input("card duration must be positive"));
    }

    let canvas = &card.canvas;
    let h = canvas.height as f64;
    let font_size = card.font_size();
    let font = card.font_file.as_deref();

    let mut cmd = FfmpegCommand::without_input(output)
        .label("render_title")
        .lavfi_input(format!(
            "gradients=s={}:c0={}:c1={}:x0=0:y0=0:x1=0:y1={}:d={:.3}:r={}",
            canvas.size(),
            GRADIENT_TOP,
            GRADIENT_BOTTOM,
            canvas.height,
            card.duration,
            canvas.fps
        ));

    let mut graph = vec!["[0:v]format=yuv420p,setsar=1[bg]".to_string()];
    let mut current = "bg".to_string();

    if let Some(logo) = &card.logo {
        cmd = cmd.input_with(["-loop", "1"], logo.to_string_lossy());
        let logo_w = ((canvas.width as f64 * card.layout.logo_relative_size).round() as u32).max(2);
        let centre_y = (h * card.layout.logo_bottom_spacing).round() as u32;
        graph.push(format!(
            "[1:v]scale={}:-1,format=rgba,\
             geq=r='r(X,Y)':g='g(X,Y)':b='b(X,Y)':a='if(lte(hypot(X-W/2,Y-H/2),min(W,H)/2),alpha(X,Y),0)'[logo]",
            logo_w
        ));
        graph.push(format!(
            "[{}][logo]overlay=x=(W-w)/2:y={}-h/2:shortest=1[withlogo]",
            current, centre_y
        ));
        current = "withlogo".to_string();
    }

    let mut text_filters = vec![drawtext(
        &text.narration,
        font,
        font_size,
        &((h * card.layout.top_spacing).round() as u32).to_string(),
        &format!("line_spacing={}", font_size / 3),
    )];
    if let Some(brand) = &text.brand_link {
        text_filters.push(drawtext(
            brand,
            font,
            (font_size as f64 * 0.6).round() as u32,
            &((h * card.layout.bottom_spacing).round() as u32).to_string(),
            "",
        ));
    }
    graph.push(format!("[{}]{}[vout]", current, text_filters.join(",")));

    let audio_index = cmd.input_count();
    let cmd = cmd
        .input(&card.narration_audio)
        .filter_complex(graph.join(";"))
        .map("[vout]")
        .map(format!("{}:a", audio_index));
    Ok(encode(cmd, canvas, card.duration))
}

/// Render a gradient card with narration text, optional logo and brand link.
pub async fn render_title_card(card: &TitleCard, output: impl AsRef<Path>) -> MediaResult<()> {
    let output = output.as_ref();
    ensure_parent_dir(output).await?;

    let workdir = tempfile::tempdir()?;
    let text = CardText::write(workdir.path(), card).await?;
    let cmd = build_title_command(card, &text, output)?;

    debug!(output = %output.display(), logo = card.logo.is_some(), "Rendering title card");
    FfmpegRunner::new().run(&cmd).await
}
