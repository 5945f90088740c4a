use anyhow::{Context, Result};
use mongodb::bson::oid::ObjectId;
use std::path::Path;
use tokio::fs;

use super::content_service::ContentService;
use crate::config::Config;
use crate::error::ContentError;
use crate::metrics::record_seed;
use crate::models::course::MicroLessonRecord;
use crate::models::quiz::QuizRecord;
use crate::models::seed::{
    ItemContent, ItemSeed, MicroLessonSeed, ModuleSeed, QuizSeed, SeedBatch, SeedReport,
};
use crate::store::EntityKind;

/// Applies seed batches through [`ContentService`].
///
/// Record-level problems (dangling references, invalid specs, taken sequence
/// slots) are logged and skipped unless `strict` is set, in which case the
/// first one aborts the run. Storage failures always abort.
pub struct SeedRunner {
    content: ContentService,
    strict: bool,
}

/// Sequence orders default to the 1-based position in their list.
fn sequence_or_position(explicit: Option<i32>, index: usize) -> i32 {
    explicit.unwrap_or(index as i32 + 1)
}

impl SeedRunner {
    pub fn new(content: ContentService, strict: bool) -> Self {
        Self { content, strict }
    }

    pub async fn apply(&self, batch: &SeedBatch) -> Result<SeedReport> {
        let mut report = SeedReport::default();
        for module in &batch.modules {
            self.apply_module(module, &mut report).await?;
        }
        tracing::info!(
            "Seed batch applied: {} created, {} already present, {} skipped",
            report.created_total(),
            report.existing_total(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn track(&self, report: &mut SeedReport, kind: EntityKind, created: bool) {
        report.record(kind.as_str(), created);
        record_seed(kind.as_str(), if created { "created" } else { "existing" });
    }

    /// Skips the record, or turns the error into an abort.
    fn skip(
        &self,
        report: &mut SeedReport,
        kind: EntityKind,
        label: &str,
        err: ContentError,
    ) -> Result<()> {
        if self.strict || !err.is_record_level() {
            return Err(err)
                .with_context(|| format!("Seeding {} '{}' failed", kind, label));
        }
        tracing::warn!("Skipping {} '{}': {}", kind, label, err);
        record_seed(kind.as_str(), "skipped");
        report.skip(kind.as_str(), label, err.to_string());
        Ok(())
    }

    async fn apply_module(&self, seed: &ModuleSeed, report: &mut SeedReport) -> Result<()> {
        let module = match self.content.upsert_module(seed).await {
            Ok((module, created)) => {
                self.track(report, EntityKind::CourseModule, created);
                module
            }
            Err(e) => return self.skip(report, EntityKind::CourseModule, &seed.title, e),
        };

        for (index, item) in seed.items.iter().enumerate() {
            let sequence_order = sequence_or_position(item.sequence_order, index);
            self.apply_item(module.id, &module.title, sequence_order, item, report)
                .await?;
        }
        Ok(())
    }

    async fn apply_item(
        &self,
        module_id: ObjectId,
        module_title: &str,
        sequence_order: i32,
        item: &ItemSeed,
        report: &mut SeedReport,
    ) -> Result<()> {
        let item_type = item.content.item_type();
        let title = item.content.title();

        let target = match &item.content {
            ItemContent::Lesson(seed) => self
                .content
                .upsert_lesson(seed)
                .await
                .map(|(lesson, created)| {
                    self.track(report, EntityKind::CourseLesson, created);
                    lesson.id
                }),
            ItemContent::HandsOnLab(seed) => {
                self.content.upsert_lab(seed).await.map(|(lab, created)| {
                    self.track(report, EntityKind::HandsOnLab, created);
                    lab.id
                })
            }
            ItemContent::Quiz(seed) => match self.content.upsert_quiz(seed).await {
                Ok((quiz, created)) => {
                    self.track(report, EntityKind::Quiz, created);
                    self.apply_questions(&quiz, seed, report).await?;
                    Ok(quiz.id)
                }
                Err(e) => Err(e),
            },
            ItemContent::MicroLesson(seed) => {
                match self
                    .content
                    .upsert_micro_lesson(module_id, sequence_order, seed)
                    .await
                {
                    Ok((micro, created)) => {
                        self.track(report, EntityKind::MicroLesson, created);
                        self.apply_exercises(&micro, seed, report).await?;
                        Ok(micro.id)
                    }
                    Err(e) => Err(e),
                }
            }
            ItemContent::Reference { item_type, title } => {
                match self.content.find_by_title(*item_type, title).await {
                    Ok(Some(id)) => Ok(id),
                    Ok(None) => Err(ContentError::DanglingReference {
                        module: module_title.to_string(),
                        item_type: item_type.as_str().to_string(),
                        target: title.clone(),
                    }),
                    Err(e) => Err(e),
                }
            }
        };

        let target = match target {
            Ok(id) => id,
            Err(e) => return self.skip(report, item_type.entity_kind(), title, e),
        };

        let label = format!("{} #{} ({})", module_title, sequence_order, title);
        match self
            .content
            .place_item(module_id, item_type, target, sequence_order, item.required)
            .await
        {
            Ok((_, created)) => {
                self.track(report, EntityKind::ModuleItem, created);
                Ok(())
            }
            Err(e) => self.skip(report, EntityKind::ModuleItem, &label, e),
        }
    }

    async fn apply_questions(
        &self,
        quiz: &QuizRecord,
        seed: &QuizSeed,
        report: &mut SeedReport,
    ) -> Result<()> {
        for (index, question) in seed.questions.iter().enumerate() {
            let sequence_order = sequence_or_position(question.sequence_order, index);
            match self
                .content
                .upsert_question(quiz, sequence_order, question)
                .await
            {
                Ok((_, created)) => self.track(report, EntityKind::QuizQuestion, created),
                Err(e) => {
                    let label = format!("{} #{}", quiz.title, sequence_order);
                    self.skip(report, EntityKind::QuizQuestion, &label, e)?;
                }
            }
        }
        Ok(())
    }

    async fn apply_exercises(
        &self,
        micro: &MicroLessonRecord,
        seed: &MicroLessonSeed,
        report: &mut SeedReport,
    ) -> Result<()> {
        for (index, exercise) in seed.exercises.iter().enumerate() {
            let sequence_order = sequence_or_position(exercise.sequence_order, index);
            match self
                .content
                .upsert_exercise(micro, sequence_order, exercise)
                .await
            {
                Ok((_, created)) => self.track(report, EntityKind::Exercise, created),
                Err(e) => self.skip(report, EntityKind::Exercise, &exercise.title, e)?,
            }
        }
        Ok(())
    }
}

pub async fn load_batch(path: &Path) -> Result<SeedBatch> {
    let contents = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    serde_json::from_str(&contents).context("Failed to deserialize seed batch")
}

/// Applies the configured seed file, if any, on startup.
pub async fn bootstrap(config: &Config, content: ContentService) -> Result<Option<SeedReport>> {
    let path = match &config.seed.file {
        Some(path) => path,
        None => {
            tracing::debug!("No seed file configured, skipping bootstrap");
            return Ok(None);
        }
    };

    if !path.exists() {
        tracing::warn!("Seed file {} not found, skipping bootstrap", path.display());
        return Ok(None);
    }

    tracing::info!(
        "Seeding content from {} (strict: {})",
        path.display(),
        config.seed.strict
    );
    let batch = load_batch(path).await?;
    let report = SeedRunner::new(content, config.seed.strict)
        .apply(&batch)
        .await?;
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::course::ItemType;

    #[test]
    fn sequence_defaults_to_position() {
        assert_eq!(sequence_or_position(None, 0), 1);
        assert_eq!(sequence_or_position(None, 4), 5);
        assert_eq!(sequence_or_position(Some(10), 0), 10);
    }

    #[test]
    fn reference_items_keep_their_item_type() {
        let item = ItemContent::Reference {
            item_type: ItemType::HandsOnLab,
            title: "Networking lab".to_string(),
        };
        assert_eq!(item.item_type().entity_kind(), EntityKind::HandsOnLab);
    }
}
