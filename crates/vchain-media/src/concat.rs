//! Stream-copy concatenation through the concat demuxer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{probe_video_with, VideoInfo};
use crate::progress::PercentCallback;

/// Name of the manifest file written next to the inputs.
pub const MANIFEST_NAME: &str = "concat.txt";

/// Name of the joined output inside the scratch directory.
pub const OUTPUT_NAME: &str = "output.mp4";

/// Scratch file name of the `index`th input.
pub fn input_name(index: usize) -> String {
    format!("input_{}.mp4", index)
}

/// Build an ffconcat manifest listing `names` in order.
///
/// Single quotes inside a name are closed, escaped and reopened, which is the
/// only quoting the concat demuxer understands.
pub fn concat_manifest<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|name| format!("file '{}'\n", name.as_ref().replace('\'', r"'\''")))
        .collect()
}

/// Join the files already written under `dir` as `input_0.mp4..input_{count-1}.mp4`.
///
/// Returns the path of the joined file inside `dir`.
pub async fn concatenate_in_dir(
    runner: &FfmpegRunner,
    ffprobe: &Path,
    dir: &Path,
    count: usize,
    on_progress: PercentCallback,
) -> MediaResult<PathBuf> {
    let names: Vec<String> = (0..count).map(input_name).collect();

    let manifest_path = dir.join(MANIFEST_NAME);
    tokio::fs::write(&manifest_path, concat_manifest(&names)).await?;

    let total_ms = total_duration_ms(ffprobe, dir, &names).await;
    let output_path = dir.join(OUTPUT_NAME);

    let cmd = FfmpegCommand::new(&manifest_path, &output_path)
        .concat_demuxer()
        .stream_copy();

    let report = Arc::clone(&on_progress);
    runner
        .run_with_progress(&cmd, move |p| {
            report(p.percentage(total_ms).round() as u8);
        })
        .await?;

    on_progress(100);
    Ok(output_path)
}

/// Summed duration of the inputs in milliseconds, zero if any probe fails.
async fn total_duration_ms(ffprobe: &Path, dir: &Path, names: &[String]) -> i64 {
    let mut infos: Vec<VideoInfo> = Vec::with_capacity(names.len());
    for name in names {
        match probe_video_with(ffprobe, dir.join(name)).await {
            Ok(info) => infos.push(info),
            Err(e) => {
                debug!("Probe of {} failed, progress will be coarse: {}", name, e);
                return 0;
            }
        }
    }

    if let Some(first) = infos.first() {
        if infos.iter().any(|i| !first.is_stream_compatible(i)) {
            warn!("Inputs differ in codec or resolution; stream copy may produce a broken join");
        }
    }

    (infos.iter().map(|i| i.duration).sum::<f64>() * 1000.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_format() {
        let names: Vec<String> = (0..3).map(input_name).collect();
        assert_eq!(
            concat_manifest(&names),
            "file 'input_0.mp4'\nfile 'input_1.mp4'\nfile 'input_2.mp4'\n"
        );
    }

    #[test]
    fn test_manifest_escapes_quotes() {
        assert_eq!(concat_manifest(&["it's.mp4"]), "file 'it'\\''s.mp4'\n");
    }
}
