use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime, Document};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ContentError;
use crate::store::{Entity, EntityKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    Mcq,
    Terminal,
    Sandbox,
    Code,
    ShortAnswer,
}

impl ExerciseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseType::Mcq => "mcq",
            ExerciseType::Terminal => "terminal",
            ExerciseType::Sandbox => "sandbox",
            ExerciseType::Code => "code",
            ExerciseType::ShortAnswer => "short_answer",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub micro_lesson_id: ObjectId,
    pub sequence_order: i32,
    pub title: String,
    pub exercise_type: ExerciseType,
    #[serde(default)]
    pub require_pass: bool,
    #[serde(default)]
    pub exercise_data: Document,
    pub created_at: BsonDateTime,
}

impl Entity for ExerciseRecord {
    const KIND: EntityKind = EntityKind::Exercise;
}

impl ExerciseRecord {
    pub fn spec(&self) -> Result<ExerciseSpec, ContentError> {
        ExerciseSpec::parse(&self.title, self.exercise_type, &self.exercise_data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct McqSpec {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// How free-text answers are canonicalised before comparison. The default is
/// trim-only and case-sensitive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Normalization {
    #[serde(default = "default_true")]
    pub trim: bool,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub collapse_whitespace: bool,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            trim: true,
            case_insensitive: false,
            collapse_whitespace: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ShortAnswerSpec {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputValidation {
    pub must_not_include: Vec<String>,
    #[serde(default)]
    pub must_include: Vec<String>,
    #[serde(default)]
    pub expected_exit_code: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TerminalSpec {
    pub command: String,
    pub validation: OutputValidation,
    pub timeout_sec: u64,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResourceConstraints {
    pub cpus: f64,
    pub mem_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SandboxSpec {
    pub run: String,
    pub constraints: ResourceConstraints,
    pub validation: OutputValidation,
    pub timeout_sec: u64,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CodeTests {
    pub run: String,
    #[serde(default)]
    pub visible: Vec<String>,
    #[serde(default)]
    pub hidden: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CodeSpec {
    pub starter_code: String,
    pub tests: CodeTests,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_test_timeout")]
    pub timeout_sec: u64,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

fn default_test_timeout() -> u64 {
    60
}

impl CodeSpec {
    pub fn all_tests(&self) -> impl Iterator<Item = &String> {
        self.tests.visible.iter().chain(self.tests.hidden.iter())
    }
}

/// Grading contract of one exercise. Parsed from the stored configuration map
/// at load time; unknown keys and missing required fields are rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ExerciseSpec {
    Mcq(McqSpec),
    ShortAnswer(ShortAnswerSpec),
    Terminal(TerminalSpec),
    Sandbox(SandboxSpec),
    Code(CodeSpec),
}

fn decode_variant<T: DeserializeOwned>(data: &Document) -> Result<T, String> {
    mongodb::bson::from_document(data.clone()).map_err(|e| e.to_string())
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} must not be empty", field))
    } else {
        Ok(())
    }
}

fn require_timeout(timeout_sec: u64) -> Result<(), String> {
    if timeout_sec == 0 {
        Err("timeout_sec must be greater than zero".to_string())
    } else {
        Ok(())
    }
}

impl ExerciseSpec {
    pub fn parse(
        label: &str,
        exercise_type: ExerciseType,
        data: &Document,
    ) -> Result<Self, ContentError> {
        Self::parse_inner(exercise_type, data).map_err(|reason| ContentError::InvalidExerciseSpec {
            exercise: label.to_string(),
            reason,
        })
    }

    fn parse_inner(exercise_type: ExerciseType, data: &Document) -> Result<Self, String> {
        let spec = match exercise_type {
            ExerciseType::Mcq => {
                let spec: McqSpec = decode_variant(data)?;
                require_text("question", &spec.question)?;
                if spec.options.is_empty() {
                    return Err("options must not be empty".to_string());
                }
                if spec.correct_answer >= spec.options.len() {
                    return Err(format!(
                        "correct_answer {} is out of range for {} options",
                        spec.correct_answer,
                        spec.options.len()
                    ));
                }
                ExerciseSpec::Mcq(spec)
            }
            ExerciseType::ShortAnswer => {
                let spec: ShortAnswerSpec = decode_variant(data)?;
                require_text("question", &spec.question)?;
                require_text("answer", &spec.answer)?;
                ExerciseSpec::ShortAnswer(spec)
            }
            ExerciseType::Terminal => {
                let spec: TerminalSpec = decode_variant(data)?;
                require_text("command", &spec.command)?;
                require_timeout(spec.timeout_sec)?;
                ExerciseSpec::Terminal(spec)
            }
            ExerciseType::Sandbox => {
                let spec: SandboxSpec = decode_variant(data)?;
                require_text("run", &spec.run)?;
                require_timeout(spec.timeout_sec)?;
                if spec.constraints.cpus <= 0.0 || spec.constraints.mem_mb == 0 {
                    return Err("constraints.cpus and constraints.mem_mb must be positive".to_string());
                }
                ExerciseSpec::Sandbox(spec)
            }
            ExerciseType::Code => {
                let spec: CodeSpec = decode_variant(data)?;
                require_text("tests.run", &spec.tests.run)?;
                require_timeout(spec.timeout_sec)?;
                if spec.all_tests().next().is_none() {
                    return Err("tests.visible and tests.hidden name no tests".to_string());
                }
                ExerciseSpec::Code(spec)
            }
        };
        Ok(spec)
    }

    pub fn exercise_type(&self) -> ExerciseType {
        match self {
            ExerciseSpec::Mcq(_) => ExerciseType::Mcq,
            ExerciseSpec::ShortAnswer(_) => ExerciseType::ShortAnswer,
            ExerciseSpec::Terminal(_) => ExerciseType::Terminal,
            ExerciseSpec::Sandbox(_) => ExerciseType::Sandbox,
            ExerciseSpec::Code(_) => ExerciseType::Code,
        }
    }

    pub fn hints(&self) -> &[String] {
        match self {
            ExerciseSpec::Mcq(spec) => &spec.hints,
            ExerciseSpec::ShortAnswer(spec) => &spec.hints,
            ExerciseSpec::Terminal(spec) => &spec.hints,
            ExerciseSpec::Sandbox(spec) => &spec.hints,
            ExerciseSpec::Code(spec) => &spec.hints,
        }
    }

    pub fn explanation(&self) -> Option<&str> {
        match self {
            ExerciseSpec::Mcq(spec) => spec.explanation.as_deref(),
            ExerciseSpec::ShortAnswer(spec) => spec.explanation.as_deref(),
            ExerciseSpec::Terminal(spec) => spec.explanation.as_deref(),
            ExerciseSpec::Sandbox(spec) => spec.explanation.as_deref(),
            ExerciseSpec::Code(spec) => spec.explanation.as_deref(),
        }
    }
}

/// Learner-facing view: never exposes answers or hidden test names.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExerciseView {
    pub id: String,
    pub micro_lesson_id: String,
    pub sequence_order: i32,
    pub title: String,
    pub exercise_type: ExerciseType,
    pub require_pass: bool,
    pub prompt: Option<String>,
    pub options: Vec<String>,
    pub command: Option<String>,
    pub starter_code: Option<String>,
    pub visible_tests: Vec<String>,
    pub hint_count: usize,
}

impl ExerciseView {
    pub fn from_parts(record: &ExerciseRecord, spec: &ExerciseSpec) -> Self {
        let mut view = Self {
            id: record.id.to_hex(),
            micro_lesson_id: record.micro_lesson_id.to_hex(),
            sequence_order: record.sequence_order,
            title: record.title.clone(),
            exercise_type: record.exercise_type,
            require_pass: record.require_pass,
            prompt: None,
            options: Vec::new(),
            command: None,
            starter_code: None,
            visible_tests: Vec::new(),
            hint_count: spec.hints().len(),
        };
        match spec {
            ExerciseSpec::Mcq(mcq) => {
                view.prompt = Some(mcq.question.clone());
                view.options = mcq.options.clone();
            }
            ExerciseSpec::ShortAnswer(short) => view.prompt = Some(short.question.clone()),
            ExerciseSpec::Terminal(terminal) => view.command = Some(terminal.command.clone()),
            ExerciseSpec::Sandbox(sandbox) => view.command = Some(sandbox.run.clone()),
            ExerciseSpec::Code(code) => {
                view.starter_code = Some(code.starter_code.clone());
                view.visible_tests = code.tests.visible.clone();
            }
        }
        view
    }
}
