use crate::config::ScoringConfig;
use crate::error::IngestError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Trait for the trash-scoring model.
///
/// The model is a black box from the pipeline's point of view: given an
/// image on disk it returns an integer score in [0, 100], deterministic
/// for the same image.
#[async_trait]
pub trait TrashScorer: Send + Sync {
    async fn score(&self, image: &Path) -> Result<i64, IngestError>;
}

/// Response printed by the inference sidecar on stdout
#[derive(Debug, Deserialize)]
struct ScoreOutput {
    #[serde(rename = "trashScore")]
    trash_score: f64,
}

/// Scorer that shells out to an external inference command.
///
/// Invokes `{command} {args...} {image_path}` and parses
/// `{"trashScore": <number>}` from stdout. The inference model itself
/// (weights, architecture, runtime) lives entirely in the sidecar.
pub struct SidecarScorer {
    config: ScoringConfig,
}

impl SidecarScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TrashScorer for SidecarScorer {
    async fn score(&self, image: &Path) -> Result<i64, IngestError> {
        debug!(image = %image.display(), command = %self.config.command, "Running inference");

        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout(), command.output())
            .await
            .map_err(|_| {
                scoring_error(
                    image,
                    format!("inference timed out after {}s", self.config.timeout_secs),
                )
            })?
            .map_err(|e| scoring_error(image, format!("failed to spawn inference command: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(scoring_error(
                image,
                format!("inference exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: ScoreOutput = serde_json::from_str(stdout.trim())
            .map_err(|e| scoring_error(image, format!("unparseable inference output: {e}")))?;

        let score = clamp_score(parsed.trash_score);
        debug!(image = %image.display(), score, "Inference complete");

        Ok(score)
    }
}

fn scoring_error(image: &Path, reason: String) -> IngestError {
    IngestError::Scoring {
        path: image.display().to_string(),
        reason,
    }
}

/// Round to integer and cap into [0, 100]
pub(crate) fn clamp_score(raw: f64) -> i64 {
    (raw.round() as i64).clamp(0, 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sidecar(command: &str, args: &[&str]) -> SidecarScorer {
        SidecarScorer::new(ScoringConfig {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_secs: 5,
        })
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(36.6), 37);
        assert_eq!(clamp_score(0.0), 0);
        assert_eq!(clamp_score(150.0), 100);
        assert_eq!(clamp_score(-3.0), 0);
    }

    #[tokio::test]
    async fn test_sidecar_parses_score_from_stdout() {
        let scorer = sidecar("sh", &["-c", r#"echo '{"trashScore": 42.4}'"#]);
        let score = scorer.score(Path::new("/tmp/img.jpg")).await.unwrap();
        assert_eq!(score, 42);
    }

    #[tokio::test]
    async fn test_sidecar_nonzero_exit_is_scoring_error() {
        let scorer = sidecar("false", &[]);
        let err = scorer.score(Path::new("/tmp/img.jpg")).await.unwrap_err();
        assert!(matches!(err, IngestError::Scoring { .. }));
    }

    #[tokio::test]
    async fn test_sidecar_rejects_unparseable_output() {
        let scorer = sidecar("sh", &["-c", "echo not-json"]);
        let err = scorer.score(Path::new("/tmp/img.jpg")).await.unwrap_err();
        assert!(matches!(err, IngestError::Scoring { .. }));
    }
}
