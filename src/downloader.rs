use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Pre-muxed MP4 first, then separate MP4 video + M4A audio, then anything.
const FORMAT: &str = "best[ext=mp4]/bestvideo[ext=mp4]+bestaudio[ext=m4a]/best";

const OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";

/// Resolves a video URL into a local file inside `dest`.
///
/// Implementations block until the file is complete, so callers on the async
/// runtime must run them through `spawn_blocking`.
pub trait VideoFetcher: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf>;
}

/// The subset of yt-dlp's info dict printed after the file is moved into place.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: String,
    ext: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    filepath: Option<PathBuf>,
}

impl VideoInfo {
    fn output_path(&self, dest: &Path) -> PathBuf {
        self.filepath
            .clone()
            .unwrap_or_else(|| dest.join(format!("{}.{}", self.id, self.ext)))
    }
}

fn parse_info(stdout: &str) -> Result<VideoInfo> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .context("yt-dlp did not report the downloaded file")?;
    serde_json::from_str(line).context("Failed to parse yt-dlp video info")
}

/// Downloads through the `yt-dlp` command line tool.
pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, url: &str, dest: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--format")
            .arg(FORMAT)
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("--no-simulate")
            .arg("--output")
            .arg(dest.join(OUTPUT_TEMPLATE))
            .arg("--print")
            .arg("after_move:%()j")
            .arg("--")
            .arg(url);
        cmd
    }

    /// Report the installed yt-dlp version. Blocking.
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;
        if !output.status.success() {
            anyhow::bail!(
                "{} --version exited with {}",
                self.binary.display(),
                output.status
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl VideoFetcher for YtDlp {
    fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        debug!("Running {} for {}", self.binary.display(), url);

        let output = self
            .command(url, dest)
            .output()
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp exited with {}: {}", output.status, stderr.trim());
        }

        let info = parse_info(&String::from_utf8_lossy(&output.stdout))?;
        let path = info.output_path(dest);
        if !path.is_file() {
            anyhow::bail!("yt-dlp reported missing file: {}", path.display());
        }

        debug!(
            "Downloaded {} ({}) to {}",
            info.id,
            info.title.as_deref().unwrap_or("untitled"),
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Writing an executable while another test forks can fail with ETXTBSY.
    static SCRIPTS: Mutex<()> = Mutex::new(());

    #[test]
    fn test_parse_info_uses_reported_filepath() {
        let stdout = r#"{"id": "7301", "ext": "mp4", "title": "clip", "filepath": "/tmp/x/7301.mp4"}"#;
        let info = parse_info(stdout).unwrap();
        assert_eq!(info.title.as_deref(), Some("clip"));
        assert_eq!(
            info.output_path(Path::new("/ignored")),
            PathBuf::from("/tmp/x/7301.mp4")
        );
    }

    #[test]
    fn test_parse_info_falls_back_to_template_name() {
        let stdout = "[info] something\n{\"id\": \"7301\", \"ext\": \"mp4\"}\n";
        let info = parse_info(stdout).unwrap();
        assert_eq!(
            info.output_path(Path::new("/scratch")),
            PathBuf::from("/scratch/7301.mp4")
        );
    }

    #[test]
    fn test_parse_info_without_json() {
        assert!(parse_info("").is_err());
        assert!(parse_info("[download] 100%").is_err());
    }

    #[test]
    fn test_command_arguments() {
        let ytdlp = YtDlp::new("yt-dlp");
        let cmd = ytdlp.command("https://vm.tiktok.com/ABC/", Path::new("/scratch"));
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let after = |flag: &str| {
            let pos = args.iter().position(|a| a == flag).unwrap();
            args[pos + 1].clone()
        };
        assert_eq!(after("--format"), FORMAT);
        assert_eq!(after("--merge-output-format"), "mp4");
        assert_eq!(after("--output"), "/scratch/%(id)s.%(ext)s");
        assert_eq!(after("--print"), "after_move:%()j");
        assert!(args.contains(&"--quiet".to_string()));
        assert!(args.contains(&"--no-warnings".to_string()));
        assert_eq!(args.last().unwrap(), "https://vm.tiktok.com/ABC/");
    }

    #[test]
    fn test_missing_binary() {
        let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = YtDlp::new(dir.path().join("no-such-yt-dlp"));
        assert!(ytdlp.fetch("https://vm.tiktok.com/ABC/", dir.path()).is_err());
        assert!(ytdlp.version().is_err());
    }

    #[cfg(unix)]
    mod fake_binary {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_ytdlp(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        const DOWNLOADS: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --version) echo "2025.01.15"; exit 0 ;;
    --output) out="$2"; shift ;;
  esac
  shift
done
dir=$(dirname "$out")
printf 'not really an mp4' > "$dir/7301.mp4"
echo "[TikTok] noise that should be skipped"
printf '{"id": "7301", "ext": "mp4", "title": "clip", "filepath": "%s"}\n' "$dir/7301.mp4"
"#;

        #[test]
        fn test_fetch_returns_downloaded_file() {
            let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
            let bin_dir = tempfile::tempdir().unwrap();
            let dest = tempfile::tempdir().unwrap();
            let ytdlp = YtDlp::new(fake_ytdlp(bin_dir.path(), DOWNLOADS));

            let path = ytdlp
                .fetch("https://vm.tiktok.com/ABC/", dest.path())
                .unwrap();
            assert_eq!(path, dest.path().join("7301.mp4"));
            assert_eq!(std::fs::read(&path).unwrap(), b"not really an mp4");
        }

        #[test]
        fn test_version() {
            let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
            let bin_dir = tempfile::tempdir().unwrap();
            let ytdlp = YtDlp::new(fake_ytdlp(bin_dir.path(), DOWNLOADS));
            assert_eq!(ytdlp.version().unwrap(), "2025.01.15");
        }

        #[test]
        fn test_fetch_failure_carries_stderr() {
            let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
            let bin_dir = tempfile::tempdir().unwrap();
            let dest = tempfile::tempdir().unwrap();
            let ytdlp = YtDlp::new(fake_ytdlp(
                bin_dir.path(),
                "echo 'ERROR: Unsupported URL' >&2\nexit 1",
            ));

            let err = ytdlp
                .fetch("https://vm.tiktok.com/ABC/", dest.path())
                .unwrap_err();
            assert!(err.to_string().contains("Unsupported URL"));
        }

        #[test]
        fn test_fetch_rejects_missing_output() {
            let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
            let bin_dir = tempfile::tempdir().unwrap();
            let dest = tempfile::tempdir().unwrap();
            let ytdlp = YtDlp::new(fake_ytdlp(
                bin_dir.path(),
                r#"echo '{"id": "gone", "ext": "mp4", "filepath": "/nonexistent/gone.mp4"}'"#,
            ));

            let err = ytdlp
                .fetch("https://vm.tiktok.com/ABC/", dest.path())
                .unwrap_err();
            assert!(err.to_string().contains("missing file"));
        }
    }
}
