//! Exam timetable generation.
//!
//! An exam plan lays `exams_per_day` back-to-back slots on every day of an
//! inclusive date range. Each slot lasts `duration_hours`; `gap_minutes` only
//! pushes the next slot's start and is not part of any exam.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::error::ValidationError;
use crate::model::{Entry, ExamScheduleTemplate};
use crate::time::{
    ClockTime, MINUTES_PER_DAY, format_day_month_year, parse_day_month_year, parse_time,
};

/// Everything needed to generate an exam timetable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamPlan {
    pub title: String,
    pub subject: String,
    /// `DD/MM/YYYY`, inclusive.
    pub start_date: String,
    /// `DD/MM/YYYY`, inclusive.
    pub end_date: String,
    pub start_time: String,
    pub exams_per_day: u32,
    pub duration_hours: u32,
    pub gap_minutes: u32,
    pub lead: u32,
}

impl ExamPlan {
    /// Take the daily layout (count, duration, gap, start) from a template.
    pub fn apply_template(&mut self, template: &ExamScheduleTemplate) {
        self.exams_per_day = template.exams_per_day;
        self.duration_hours = template.duration;
        self.gap_minutes = template.gap;
        self.start_time = template.start_time.clone();
    }

    /// The layout of this plan as a saveable template.
    pub fn to_template(&self) -> ExamScheduleTemplate {
        ExamScheduleTemplate::custom(
            self.exams_per_day,
            self.duration_hours,
            self.gap_minutes,
            self.start_time.clone(),
        )
    }
}

/// One generated exam sitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamSlot {
    pub day_index: u32,
    pub exam_index: u32,
    pub date: NaiveDate,
    pub start: ClockTime,
    pub end: ClockTime,
}

impl ExamSlot {
    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }
}

struct ValidPlan {
    first_day: NaiveDate,
    total_days: u32,
    base_start: u32,
}

fn validate(plan: &ExamPlan) -> Result<ValidPlan, ValidationError> {
    let required = [
        ("exam title", plan.title.as_str()),
        ("subject", plan.subject.as_str()),
        ("start date", plan.start_date.as_str()),
        ("end date", plan.end_date.as_str()),
        ("start time", plan.start_time.as_str()),
    ];
    let missing: Vec<&'static str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingExamFields(missing));
    }

    let base_start = parse_time(&plan.start_time)
        .ok_or_else(|| ValidationError::InvalidExamStartTime(plan.start_time.clone()))?
        .minutes_since_midnight();
    let first_day = parse_day_month_year(&plan.start_date)
        .ok_or_else(|| ValidationError::InvalidDate(plan.start_date.clone()))?;
    let last_day = parse_day_month_year(&plan.end_date)
        .ok_or_else(|| ValidationError::InvalidDate(plan.end_date.clone()))?;
    if last_day < first_day {
        return Err(ValidationError::EndDateBeforeStart);
    }
    if plan.exams_per_day == 0 {
        return Err(ValidationError::NoExamsPerDay);
    }
    if plan.duration_hours == 0 {
        return Err(ValidationError::ZeroDuration);
    }

    // The last sitting of the day must finish before midnight.
    let stride = u64::from(plan.duration_hours) * 60 + u64::from(plan.gap_minutes);
    let last_end = u64::from(plan.exams_per_day - 1)
        .saturating_mul(stride)
        .saturating_add(u64::from(base_start))
        .saturating_add(u64::from(plan.duration_hours) * 60);
    if last_end >= u64::from(MINUTES_PER_DAY) {
        return Err(ValidationError::ExamsOverflowDay);
    }

    let total_days = (last_day - first_day).num_days() + 1;
    Ok(ValidPlan {
        first_day,
        total_days: u32::try_from(total_days).map_err(|_| ValidationError::EndDateBeforeStart)?,
        base_start,
    })
}

/// Lay out every exam sitting of the plan, day by day.
pub fn plan_slots(plan: &ExamPlan) -> Result<Vec<ExamSlot>, ValidationError> {
    let valid = validate(plan)?;
    let stride = u64::from(plan.duration_hours) * 60 + u64::from(plan.gap_minutes);
    let duration = u64::from(plan.duration_hours) * 60;

    let capacity = (valid.total_days as usize).saturating_mul(plan.exams_per_day as usize);
    let mut slots = Vec::with_capacity(capacity);
    let mut date = valid.first_day;
    for day_index in 0..valid.total_days {
        for exam_index in 0..plan.exams_per_day {
            let start = u64::from(valid.base_start) + u64::from(exam_index) * stride;
            // Both fit within the day; validate() checked the last end.
            let (Some(start), Some(end)) = (
                minutes_of_day(start),
                minutes_of_day(start + duration),
            ) else {
                return Err(ValidationError::ExamsOverflowDay);
            };
            slots.push(ExamSlot {
                day_index,
                exam_index,
                date,
                start,
                end,
            });
        }
        date = date.succ_opt().unwrap_or(date);
    }
    Ok(slots)
}

fn minutes_of_day(minutes: u64) -> Option<ClockTime> {
    ClockTime::from_minutes(u32::try_from(minutes).ok()?)
}

/// Turn a plan into timetable entries, one per sitting.
///
/// Ids are `<id_base>-<day>-<exam>`, so a single generation never repeats an
/// id. Handles are left empty for the caller to schedule.
pub fn generate_exam_entries(plan: &ExamPlan, id_base: i64) -> Result<Vec<Entry>, ValidationError> {
    let subject = format!("{} - {}", plan.title.trim(), plan.subject.trim());

    let entries = plan_slots(plan)?
        .into_iter()
        .map(|slot| Entry {
            id: format!("{id_base}-{}-{}", slot.day_index, slot.exam_index),
            subject: subject.clone(),
            weekday: slot.weekday(),
            start_time: slot.start.to_12_hour(),
            end_time: slot.end.to_12_hour(),
            lead: plan.lead,
            notif_id: None,
            exam_date: Some(format_day_month_year(slot.date)),
        })
        .collect();
    Ok(entries)
}
