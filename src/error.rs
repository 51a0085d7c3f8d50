use thiserror::Error;

/// Input rejected before any state was touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Give this class a name.")]
    MissingSubject,
    #[error("Use 12-hour format (e.g., 9:00 AM, 2:30 PM) for start time, got {0:?}")]
    InvalidStartTime(String),
    #[error("Use 12-hour format (e.g., 9:00 AM, 2:30 PM) for end time, got {0:?}")]
    InvalidEndTime(String),
    #[error("End time must be after start time")]
    EndNotAfterStart,
    #[error("Please fill in {}.", .0.join(", "))]
    MissingExamFields(Vec<&'static str>),
    #[error("Please enter a valid start time (e.g., 9:00 AM), got {0:?}")]
    InvalidExamStartTime(String),
    #[error("Dates must use DD/MM/YYYY, got {0:?}")]
    InvalidDate(String),
    #[error("Exam end date must not be before the start date")]
    EndDateBeforeStart,
    #[error("At least one exam per day is required")]
    NoExamsPerDay,
    #[error("Exam duration must be at least one hour")]
    ZeroDuration,
    #[error("The last exam of the day would end after midnight")]
    ExamsOverflowDay,
    #[error("Please set exam start and end dates first.")]
    MissingExamDates,
    #[error("Template text must not be empty")]
    EmptyTemplate,
}

impl ValidationError {
    /// Short heading for the message shown to the user.
    pub fn title(&self) -> &'static str {
        match self {
            Self::MissingSubject => "Subject required",
            Self::InvalidStartTime(_) | Self::InvalidEndTime(_) => "Time format",
            Self::EndNotAfterStart => "Invalid time range",
            Self::MissingExamFields(_) => "Missing Information",
            Self::InvalidExamStartTime(_) => "Invalid Start Time",
            Self::InvalidDate(_) | Self::EndDateBeforeStart => "Invalid Dates",
            Self::NoExamsPerDay | Self::ZeroDuration | Self::ExamsOverflowDay => {
                "Invalid Exam Layout"
            }
            Self::MissingExamDates => "Dates Required",
            Self::EmptyTemplate => "Template",
        }
    }
}
