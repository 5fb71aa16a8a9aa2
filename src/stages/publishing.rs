//! Model publishing: copy an accepted model into the saved-models directory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::core::layout::MODEL_FILE_NAME;
use crate::core::{RunContext, Stage};
use crate::data::write_atomic;
use crate::domain::{ModelEvaluationArtifact, ModelPusherArtifact};

use super::blocking;

pub struct ModelPusher;

#[async_trait]
impl Stage for ModelPusher {
    type Input = ModelEvaluationArtifact;
    type Output = ModelPusherArtifact;

    #[instrument(skip_all, fields(accepted = input.is_model_accepted))]
    async fn run(
        &self,
        ctx: &RunContext,
        input: &ModelEvaluationArtifact,
    ) -> Result<ModelPusherArtifact> {
        let input = input.clone();
        let layout = ctx.layout.clone();

        blocking(move || {
            if !input.is_model_accepted {
                // Keep serving the current best model
                let bytes = std::fs::read(&input.best_model_path).with_context(|| {
                    format!("Failed to read {}", input.best_model_path.display())
                })?;
                info!(best = %input.best_model_path.display(), "Model not accepted; nothing published");
                return Ok(ModelPusherArtifact {
                    pushed: false,
                    saved_model_path: input.best_model_path,
                    model_file_path: input.trained_model_path,
                    model_sha256: hex::encode(Sha256::digest(&bytes)),
                });
            }

            let bytes = std::fs::read(&input.trained_model_path).with_context(|| {
                format!("Failed to read {}", input.trained_model_path.display())
            })?;

            let model_file_path = layout.pushed_model_file();
            write_atomic(&model_file_path, &bytes)?;

            let saved_model_path = layout.new_saved_model_dir(Utc::now())?.join(MODEL_FILE_NAME);
            write_atomic(&saved_model_path, &bytes)?;

            let model_sha256 = hex::encode(Sha256::digest(&bytes));
            info!(
                saved = %saved_model_path.display(),
                sha256 = %model_sha256,
                "Model published"
            );
            Ok(ModelPusherArtifact {
                pushed: true,
                saved_model_path,
                model_file_path,
                model_sha256,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{latest_saved_model, ArtifactLayout};
    use crate::domain::ClassificationMetric;
    use std::path::Path;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn evaluation(temp: &Path, accepted: bool) -> ModelEvaluationArtifact {
        let trained = temp.join("trained.json");
        let best = temp.join("best.json");
        std::fs::write(&trained, "{\"trained\":true}").unwrap();
        std::fs::write(&best, "{\"best\":true}").unwrap();
        let metric = ClassificationMetric {
            f1_score: 1.0,
            precision_score: 1.0,
            recall_score: 1.0,
        };
        ModelEvaluationArtifact {
            is_model_accepted: accepted,
            improved_accuracy: 0.1,
            best_model_path: best,
            trained_model_path: trained,
            train_model_metric_artifact: metric,
            best_model_metric_artifact: metric,
            report_file_path: temp.join("report.yaml"),
        }
    }

    fn context(temp: &Path) -> RunContext {
        RunContext {
            run_id: Uuid::new_v4(),
            layout: ArtifactLayout::new(temp.join("run"), temp.join("saved_models")),
        }
    }

    #[tokio::test]
    async fn test_accepted_model_is_saved() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());

        let artifact = ModelPusher
            .run(&ctx, &evaluation(temp.path(), true))
            .await
            .unwrap();

        assert!(artifact.pushed);
        assert_eq!(
            std::fs::read_to_string(&artifact.saved_model_path).unwrap(),
            "{\"trained\":true}"
        );
        assert_eq!(
            latest_saved_model(&temp.path().join("saved_models")).unwrap(),
            Some(artifact.saved_model_path.clone())
        );
        assert_eq!(
            artifact.model_sha256,
            hex::encode(Sha256::digest(b"{\"trained\":true}"))
        );
    }

    #[tokio::test]
    async fn test_rejected_model_keeps_best() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let input = evaluation(temp.path(), false);

        let artifact = ModelPusher.run(&ctx, &input).await.unwrap();

        assert!(!artifact.pushed);
        assert_eq!(artifact.saved_model_path, input.best_model_path);
        assert!(!temp.path().join("saved_models").exists());
    }
}
