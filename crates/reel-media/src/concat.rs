//! Joining scene clips into the final cut.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::ensure_parent_dir;
use crate::probe::probe_media;

/// Concat demuxer list body for `inputs`.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    let mut body = String::new();
    for path in inputs {
        body.push_str("file '");
        body.push_str(&path.to_string_lossy().replace('\'', "'\\''"));
        body.push_str("'\n");
    }
    body
}

fn build_concat_command(list: &Path, output: &Path, fade: Option<(f64, f64)>) -> FfmpegCommand {
    let cmd = FfmpegCommand::without_input(output)
        .label("concat")
        .input_with(["-f", "concat", "-safe", "0"], list.to_string_lossy());

    match fade {
        // Clips share one encoding, so the streams can be copied as-is.
        None => cmd.output_args(["-c", "copy", "-movflags", "+faststart"]),
        Some((secs, total)) => {
            let out_start = (total - secs).max(0.0);
            cmd.video_filter(format!(
                "fade=t=in:st=0:d={secs:.3},fade=t=out:st={out_start:.3}:d={secs:.3}"
            ))
            .output_arg("-af")
            .output_arg(format!(
                "afade=t=in:st=0:d={secs:.3},afade=t=out:st={out_start:.3}:d={secs:.3}"
            ))
            .video_codec("libx264")
            .preset("veryfast")
            .crf(20)
            .output_args(["-pix_fmt", "yuv420p"])
            .audio_codec("aac")
            .audio_bitrate("192k")
            .output_args(["-movflags", "+faststart"])
        }
    }
}

/// Concatenate clips in order into `output`.
///
/// With a positive `fade_secs` the result fades in from and out to black,
/// which needs a re-encode; otherwise streams are copied.
pub async fn concatenate(inputs: &[PathBuf], output: impl AsRef<Path>, fade_secs: f64) -> MediaResult<()> {
    let output = output.as_ref();
    if inputs.is_empty() {
        return Err(MediaError::empty_input("no clips to concatenate"));
    }
    for input in inputs {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.clone()));
        }
    }
    ensure_parent_dir(output).await?;

    let fade = if fade_secs > 0.0 {
        let mut total = 0.0;
        for input in inputs {
            total += probe_media(input).await?.duration.unwrap_or(0.0);
        }
        Some((fade_secs, total))
    } else {
        None
    };

    let workdir = tempfile::tempdir()?;
    let list_path = workdir.path().join("clips.txt");
    tokio::fs::write(&list_path, concat_list(inputs)).await?;

    info!(output = %output.display(), clips = inputs.len(), fade = fade_secs, "Concatenating clips");
    FfmpegRunner::new().run(&build_concat_command(&list_path, output, fade)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_quotes_paths() {
        let list = concat_list(&[PathBuf::from("/m/a.mp4"), PathBuf::from("/m/it's.mp4")]);
        assert_eq!(list, "file '/m/a.mp4'\nfile '/m/it'\\''s.mp4'\n");
    }

    #[test]
    fn test_concat_copies_without_fade() {
        let args = build_concat_command(Path::new("l.txt"), Path::new("o.mp4"), None).build_args();
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-f", "concat"]));
    }

    #[test]
    fn test_concat_fade_reencodes() {
        let args = build_concat_command(Path::new("l.txt"), Path::new("o.mp4"), Some((0.5, 20.0))).build_args();
        assert!(args.contains(&"fade=t=in:st=0:d=0.500,fade=t=out:st=19.500:d=0.500".to_string()));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
    }

    #[tokio::test]
    async fn test_concat_rejects_empty_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("final.mp4");
        assert!(matches!(concatenate(&[], &out, 0.0).await, Err(MediaError::EmptyInput(_))));
        assert!(matches!(
            concatenate(&[dir.path().join("missing.mp4")], &out, 0.0).await,
            Err(MediaError::FileNotFound(_))
        ));
    }
}
