//! Model evaluation: compare the trained model with the newest saved one.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::ModelSettings;
use crate::core::{latest_saved_model, RunContext, Stage};
use crate::data::{write_atomic, Frame};
use crate::domain::{ClassificationMetric, EvaluationInput, ModelEvaluationArtifact};
use crate::ml::{classification_score, ModelBundle};

use super::blocking;

pub struct ModelEvaluation {
    improvement_threshold: f64,
}

impl ModelEvaluation {
    pub fn new(settings: &ModelSettings) -> Self {
        Self {
            improvement_threshold: settings.improvement_threshold,
        }
    }
}

/// Score a saved model bundle on a validated (raw) table
fn score(model_path: &Path, frame: &Frame) -> Result<ClassificationMetric> {
    let model = ModelBundle::load(model_path)?;
    let actual = model.targets(frame)?;
    let predicted = model
        .predict_frame(frame)
        .with_context(|| format!("Failed to score {}", model_path.display()))?;
    Ok(classification_score(
        &actual,
        &predicted,
        model.classifier.positive_class(),
    ))
}

#[derive(Serialize)]
struct Report<'a> {
    is_model_accepted: bool,
    improved_accuracy: f64,
    improvement_threshold: f64,
    best_model_path: &'a Path,
    trained_model_path: &'a Path,
    trained_model_metric: &'a ClassificationMetric,
    best_model_metric: &'a ClassificationMetric,
}

#[async_trait]
impl Stage for ModelEvaluation {
    type Input = EvaluationInput;
    type Output = ModelEvaluationArtifact;

    #[instrument(skip_all)]
    async fn run(
        &self,
        ctx: &RunContext,
        input: &EvaluationInput,
    ) -> Result<ModelEvaluationArtifact> {
        let test_path = input.validation.test_file_path.clone();
        let trained_path = input.trainer.trained_model_file_path.clone();
        let threshold = self.improvement_threshold;
        let model_root = ctx.layout.model_root().to_path_buf();
        let report_path = ctx.layout.evaluation_report_file();

        blocking(move || {
            let test = Frame::read_csv(&test_path)?;
            let trained_metric = score(&trained_path, &test)?;

            let (best_path, best_metric, improved, accepted): (PathBuf, _, f64, bool) =
                match latest_saved_model(&model_root)? {
                    None => {
                        info!("No saved model yet; accepting the trained model");
                        (trained_path.clone(), trained_metric, trained_metric.f1_score, true)
                    }
                    Some(best_path) => {
                        let best_metric = score(&best_path, &test)?;
                        let improved = trained_metric.f1_score - best_metric.f1_score;
                        (best_path, best_metric, improved, improved > threshold)
                    }
                };

            let report = Report {
                is_model_accepted: accepted,
                improved_accuracy: improved,
                improvement_threshold: threshold,
                best_model_path: &best_path,
                trained_model_path: &trained_path,
                trained_model_metric: &trained_metric,
                best_model_metric: &best_metric,
            };
            let yaml = serde_yaml::to_string(&report).context("Failed to serialize report")?;
            write_atomic(&report_path, yaml.as_bytes())?;

            info!(
                accepted,
                improved_accuracy = improved,
                trained_f1 = trained_metric.f1_score,
                best_f1 = best_metric.f1_score,
                "Model evaluated"
            );
            Ok(ModelEvaluationArtifact {
                is_model_accepted: accepted,
                improved_accuracy: improved,
                best_model_path: best_path,
                trained_model_path: trained_path,
                train_model_metric_artifact: trained_metric,
                best_model_metric_artifact: best_metric,
                report_file_path: report_path,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layout::MODEL_FILE_NAME;
    use crate::core::ArtifactLayout;
    use crate::domain::{DataValidationArtifact, ModelTrainerArtifact};
    use crate::ml::{KnnImputer, LogisticRegression, TrainParams};
    use tempfile::TempDir;
    use uuid::Uuid;

    const FEATURE: [f64; 10] = [0.0, 1.0, 2.0, 3.0, 4.0, 10.0, 11.0, 12.0, 13.0, 14.0];

    fn label(a: f64) -> f64 {
        if a >= 10.0 {
            1.0
        } else {
            0.0
        }
    }

    /// A model that separates the classes, or one that gets every row wrong
    fn bundle(inverted: bool) -> ModelBundle {
        let columns = vec!["a".to_string()];
        let x: Vec<Vec<f64>> = FEATURE.iter().map(|a| vec![*a]).collect();
        let y: Vec<f64> = FEATURE
            .iter()
            .map(|a| if inverted { 1.0 - label(*a) } else { label(*a) })
            .collect();
        let raw: Vec<Vec<Option<f64>>> = FEATURE.iter().map(|a| vec![Some(*a)]).collect();

        ModelBundle {
            feature_columns: columns.clone(),
            target_column: "label".to_string(),
            preprocessor: KnnImputer::fit(3, columns, &raw).unwrap(),
            classifier: LogisticRegression::fit(
                &x,
                &y,
                TrainParams {
                    epochs: 300,
                    learning_rate: 0.5,
                    l2: 0.0,
                },
            )
            .unwrap(),
        }
    }

    fn perfect() -> ClassificationMetric {
        ClassificationMetric {
            f1_score: 1.0,
            precision_score: 1.0,
            recall_score: 1.0,
        }
    }

    struct Fixture {
        _temp: TempDir,
        ctx: RunContext,
        input: EvaluationInput,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let test_file = root.join("test.csv");
        Frame::new(
            vec!["label".to_string(), "a".to_string()],
            FEATURE
                .iter()
                .map(|a| vec![label(*a).to_string(), a.to_string()])
                .collect(),
        )
        .unwrap()
        .write_csv(&test_file)
        .unwrap();

        let trained_model = root.join("trained").join(MODEL_FILE_NAME);
        bundle(false).save(&trained_model).unwrap();

        let ctx = RunContext {
            run_id: Uuid::new_v4(),
            layout: ArtifactLayout::new(root.join("run"), root.join("saved_models")),
        };
        let input = EvaluationInput {
            validation: DataValidationArtifact {
                validation_status: true,
                train_file_path: root.join("train.csv"),
                test_file_path: test_file,
                drift_report_file_path: root.join("report.yaml"),
            },
            trainer: ModelTrainerArtifact {
                trained_model_file_path: trained_model,
                train_metric_artifact: perfect(),
                test_metric_artifact: perfect(),
            },
        };

        Fixture {
            _temp: temp,
            ctx,
            input,
        }
    }

    /// Publish a model that scores f1 = 0 on the test table
    fn seed_weak_saved_model(ctx: &RunContext) -> PathBuf {
        let path = ctx
            .layout
            .model_root()
            .join("1700000000")
            .join(MODEL_FILE_NAME);
        bundle(true).save(&path).unwrap();
        path
    }

    fn evaluation(improvement_threshold: f64) -> ModelEvaluation {
        ModelEvaluation {
            improvement_threshold,
        }
    }

    #[tokio::test]
    async fn test_first_model_is_accepted() {
        let f = fixture();

        let artifact = evaluation(0.02).run(&f.ctx, &f.input).await.unwrap();

        assert!(artifact.is_model_accepted);
        assert_eq!(artifact.improved_accuracy, 1.0);
        assert_eq!(artifact.best_model_path, f.input.trainer.trained_model_file_path);
        assert!(artifact.report_file_path.is_file());
    }

    #[tokio::test]
    async fn test_better_model_beats_saved_one() {
        let f = fixture();
        let saved = seed_weak_saved_model(&f.ctx);

        let artifact = evaluation(0.02).run(&f.ctx, &f.input).await.unwrap();

        assert!(artifact.is_model_accepted);
        assert!(artifact.improved_accuracy > 0.02);
        assert_eq!(artifact.best_model_path, saved);
        assert_eq!(artifact.best_model_metric_artifact.f1_score, 0.0);
        assert_eq!(artifact.train_model_metric_artifact.f1_score, 1.0);
    }

    #[tokio::test]
    async fn test_improvement_must_exceed_threshold() {
        let f = fixture();
        let saved = seed_weak_saved_model(&f.ctx);

        // Gain of exactly 1.0 against a threshold of 1.0
        let at_threshold = evaluation(1.0).run(&f.ctx, &f.input).await.unwrap();
        assert!(!at_threshold.is_model_accepted);
        assert_eq!(at_threshold.improved_accuracy, 1.0);
        assert_eq!(at_threshold.best_model_path, saved);

        let just_below = evaluation(0.999).run(&f.ctx, &f.input).await.unwrap();
        assert!(just_below.is_model_accepted);
    }

    #[tokio::test]
    async fn test_report_records_decision() {
        let f = fixture();
        seed_weak_saved_model(&f.ctx);

        let artifact = evaluation(1.0).run(&f.ctx, &f.input).await.unwrap();

        let report: serde_yaml::Value =
            serde_yaml::from_str(&std::fs::read_to_string(&artifact.report_file_path).unwrap())
                .unwrap();
        assert_eq!(report["is_model_accepted"], serde_yaml::Value::Bool(false));
        assert_eq!(report["improvement_threshold"].as_f64(), Some(1.0));
    }
}
