//! Downloader adapter (C5): invokes the external `aniworld` binary as an
//! opaque subprocess and classifies its outcome. Grounded on the teacher's
//! own subprocess-spawning shape in `ffmpeg.rs`/`chrome.rs` (locate a binary
//! on `PATH` via `pathsearch`, spawn with `tokio::process::Command`, capture
//! output) but driving a single fire-and-classify call instead of a
//! long-lived managed process.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::fs_layout;
use crate::model::Language;

const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(600);
const VERIFY_ATTEMPTS: u32 = 5;
const VERIFY_INTERVAL: Duration = Duration::from_secs(2);
const POST_SUCCESS_SETTLE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterResult {
    Ok,
    NoStreams,
    LanguageError,
    Failed,
    Timeout,
}

const NO_STREAMS_MARKER: &str = "No streams available for episode";
const LANGUAGE_ERROR_MARKER: &str = "No provider found for language";
const FAILED_MARKERS: &[&str] = &[
    "Something went wrong",
    "No direct link found",
    "Failed to execute any anime actions",
    "Invalid action configuration",
    "codec can't encode",
    "Unexpected download error",
];

/// `run(episode_url, language, output_dir)`. Single call, no internal
/// retries — retrying across languages is the pipeline's job (§4.6).
pub async fn run(episode_url: &str, language: Language, output_dir: &Path) -> AdapterResult {
    std::fs::create_dir_all(output_dir).ok();

    let binary = pathsearch::find_executable_in_path("aniworld").unwrap_or_else(|| "aniworld".into());
    let mut command = Command::new(binary);
    command
        .arg("--language")
        .arg(language.to_string())
        .arg("-o")
        .arg(output_dir)
        .arg("--episode")
        .arg(episode_url)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(windows)]
    {
        command.env("PYTHONIOENCODING", "utf-8");
    }

    let spawned = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            log::error!("[DownloaderFailure] failed to spawn aniworld binary: {err:#}");
            return AdapterResult::Failed;
        }
    };

    let output = match timeout(SUBPROCESS_TIMEOUT, spawned.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            log::error!("[DownloaderFailure] aniworld binary error: {err:#}");
            return AdapterResult::Failed;
        }
        Err(_) => {
            log::warn!("[TimeoutError] aniworld binary exceeded {SUBPROCESS_TIMEOUT:?}, killing");
            return AdapterResult::Timeout;
        }
    };

    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    let result = classify(&combined, output.status.success());

    if result == AdapterResult::Ok {
        tokio::time::sleep(POST_SUCCESS_SETTLE).await;
    }

    result
}

fn classify(output: &str, exit_success: bool) -> AdapterResult {
    if output.contains(NO_STREAMS_MARKER) {
        AdapterResult::NoStreams
    } else if output.contains(LANGUAGE_ERROR_MARKER) {
        AdapterResult::LanguageError
    } else if FAILED_MARKERS.iter().any(|marker| output.contains(marker)) {
        AdapterResult::Failed
    } else if exit_success {
        AdapterResult::Ok
    } else {
        AdapterResult::Failed
    }
}

/// Separate verification step: polls for up to `VERIFY_ATTEMPTS *
/// VERIFY_INTERVAL` looking for a `.mp4` carrying the downloader's own
/// fresh-output naming pattern, directly under `base_path` (the `-o`
/// directory the CLI was invoked with) — mirroring `AniLoader.py:1426-1438`.
/// This runs *before* `rename_downloaded`, so it must not look for the final
/// placed-file naming token (`already_downloaded` checks that, under the
/// series folder, after the move has happened).
pub async fn verify_placed(base_path: &Path, episode: u32, is_film: bool) -> bool {
    for attempt in 0..VERIFY_ATTEMPTS {
        if fs_layout::fresh_file_placed(base_path, episode, is_film) {
            return true;
        }
        if attempt + 1 < VERIFY_ATTEMPTS {
            tokio::time::sleep(VERIFY_INTERVAL).await;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_no_streams_before_other_markers() {
        let output = "No streams available for episode\nSomething went wrong";
        assert_eq!(classify(output, false), AdapterResult::NoStreams);
    }

    #[test]
    fn classifies_language_error() {
        assert_eq!(classify("No provider found for language", false), AdapterResult::LanguageError);
    }

    #[test]
    fn classifies_failed_markers() {
        for marker in FAILED_MARKERS {
            assert_eq!(classify(marker, false), AdapterResult::Failed);
        }
    }

    #[test]
    fn exit_code_zero_with_no_markers_is_ok() {
        assert_eq!(classify("done", true), AdapterResult::Ok);
        assert_eq!(classify("done", false), AdapterResult::Failed);
    }
}
