pub mod attempt;
pub mod course;
pub mod exercise;
pub mod grading;
pub mod quiz;
pub mod seed;

pub use attempt::{AttemptInput, AttemptRecord, ProgressReport, SubmitAttemptRequest};
pub use course::{
    CourseLessonRecord, CourseModuleRecord, Difficulty, HandsOnLabRecord, ItemType,
    MicroLessonRecord, ModuleItemRecord, ModuleItemView, ModuleOutline,
};
pub use exercise::{ExerciseRecord, ExerciseSpec, ExerciseType, ExerciseView};
pub use grading::{ExecutionRecord, ExitStatus, GradeFeedback, GradeResult, Submission, TestOutcome, TestReport};
pub use quiz::{QuestionType, QuizQuestionRecord, QuizRecord, QuizScore};
pub use seed::{SeedBatch, SeedReport};
