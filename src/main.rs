use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDateTime, Timelike, Weekday};
use clap::{Parser, Subcommand};
use smart_table::{
    AppConfig, Entry, EntryDraft, ExamModeClock, ExamPlan, JsonFileStore, LocalScheduler, Notice,
    Notifier, SystemClock, Timetable, ValidationError, config::DefaultsConfig,
    time::{format_date_input, format_time_input, parse_weekday},
    weekday_name, weekday_short,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "smart-table")]
#[command(about = "Class timetable with weekly reminders and exam schedules")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a weekly class
    Add {
        #[arg(long)]
        subject: String,
        /// Weekday name or number (0 = Sunday)
        #[arg(long, value_parser = parse_day)]
        day: Weekday,
        /// Start time, e.g. "9:00 AM" or "14:30"
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Minutes before the start to send a reminder
        #[arg(long)]
        lead: Option<u32>,
    },
    /// Remove an entry and cancel its reminders
    Remove { id: String },
    /// Show the timetable grouped by weekday
    List,
    /// Show today's classes
    Today,
    /// Cancel and re-create every reminder
    Reschedule,
    /// Set the exam period (DD/MM/YYYY)
    ExamWindow { start: String, end: String },
    /// Switch between the regular and the exam timetable
    ExamMode,
    /// Generate exam entries over a date range
    GenerateExams {
        #[arg(long)]
        title: String,
        #[arg(long)]
        subject: String,
        /// First exam day (DD/MM/YYYY)
        #[arg(long)]
        from: String,
        /// Last exam day (DD/MM/YYYY)
        #[arg(long)]
        to: String,
        /// Use a saved schedule template for the daily layout
        #[arg(long)]
        template: Option<String>,
        #[arg(long)]
        start_time: Option<String>,
        #[arg(long)]
        per_day: Option<u32>,
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        gap: Option<u32>,
        #[arg(long)]
        lead: Option<u32>,
        /// Also save the daily layout as a custom template
        #[arg(long)]
        save_template: bool,
    },
    /// Show or save templates
    Templates {
        #[command(subcommand)]
        action: Option<TemplateAction>,
    },
    /// Run headless, firing due reminders every minute
    Watch,
}

#[derive(Subcommand, Debug)]
enum TemplateAction {
    /// Save a subject name
    Subject { name: String },
    /// Save a start/end time pair
    Time {
        start: String,
        end: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Save an exam title
    Title { title: String },
}

/// Accept `01032025` as well as `1/3/2025`.
fn tidy_date(text: &str) -> String {
    if text.contains('/') {
        text.trim().to_string()
    } else {
        format_date_input(text)
    }
}

fn parse_day(text: &str) -> Result<Weekday, String> {
    parse_weekday(text).ok_or_else(|| format!("unknown weekday {text:?}"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("smart_table=debug");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    match args.command {
        Command::Watch => {
            let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
            run_watch(rt, config)
        }
        command => run_command(command, &config),
    }
}

fn notifier() -> Arc<dyn Notifier> {
    #[cfg(feature = "desktop")]
    {
        Arc::new(smart_table::SystemNotifier)
    }
    #[cfg(not(feature = "desktop"))]
    {
        Arc::new(smart_table::LogNotifier)
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<JsonFileStore>> {
    let path = &config.storage.path;
    let store = JsonFileStore::open(path)
        .with_context(|| format!("Failed to open timetable at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn open_timetable(config: &AppConfig) -> Result<(Timetable, Vec<Notice>)> {
    let store = open_store(config)?;
    let backend = Arc::new(LocalScheduler::new(store.clone()));
    let mut timetable = Timetable::new(
        store,
        backend,
        notifier(),
        Arc::new(SystemClock),
        &config.notifications,
    );
    let notices = timetable.load();
    Ok((timetable, notices))
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        println!("{notice}");
    }
}

fn rejected(err: ValidationError) -> anyhow::Error {
    anyhow!(Notice::from(&err).to_string())
}

fn describe(entry: &Entry) -> String {
    let date = entry
        .exam_date
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default();
    format!(
        "[{}] {} {} - {} {}{} (reminder {} min before)",
        entry.id,
        weekday_short(entry.weekday),
        entry.start_time,
        entry.end_time,
        entry.subject,
        date,
        entry.lead
    )
}

fn build_plan(
    defaults: &DefaultsConfig,
    templates: &[smart_table::ExamScheduleTemplate],
    command: GenerateArgs,
) -> Result<ExamPlan> {
    let mut plan = ExamPlan {
        title: command.title,
        subject: command.subject,
        start_date: tidy_date(&command.from),
        end_date: tidy_date(&command.to),
        start_time: defaults.exam_start_time.clone(),
        exams_per_day: defaults.exams_per_day,
        duration_hours: defaults.exam_duration_hours,
        gap_minutes: defaults.exam_gap_minutes,
        lead: command.lead.unwrap_or(defaults.lead_minutes),
    };

    if let Some(name) = command.template {
        let template = templates
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(&name))
            .ok_or_else(|| anyhow!("No schedule template named {name:?}"))?;
        plan.apply_template(template);
    }
    if let Some(start_time) = command.start_time {
        plan.start_time = format_time_input(&start_time);
    }
    if let Some(per_day) = command.per_day {
        plan.exams_per_day = per_day;
    }
    if let Some(duration) = command.duration {
        plan.duration_hours = duration;
    }
    if let Some(gap) = command.gap {
        plan.gap_minutes = gap;
    }
    Ok(plan)
}

struct GenerateArgs {
    title: String,
    subject: String,
    from: String,
    to: String,
    template: Option<String>,
    start_time: Option<String>,
    per_day: Option<u32>,
    duration: Option<u32>,
    gap: Option<u32>,
    lead: Option<u32>,
}

fn run_command(command: Command, config: &AppConfig) -> Result<()> {
    let (mut timetable, notices) = open_timetable(config)?;
    print_notices(&notices);

    match command {
        Command::Add {
            subject,
            day,
            start,
            end,
            lead,
        } => {
            let added = timetable
                .add_entry(EntryDraft {
                    subject,
                    weekday: day,
                    start_time: format_time_input(&start),
                    end_time: format_time_input(&end),
                    lead: lead.unwrap_or(config.defaults.lead_minutes),
                })
                .map_err(rejected)?;
            println!("Added {}", describe(&added.value));
            print_notices(&added.notices);
        }
        Command::Remove { id } => {
            let removed = timetable.remove_entry(&id);
            match &removed.value {
                Some(entry) => println!("Removed {}", describe(entry)),
                None => println!("No entry with id {id}"),
            }
            print_notices(&removed.notices);
        }
        Command::List => {
            let state = timetable.state();
            println!(
                "{} timetable",
                if state.exam_active { "Exam" } else { "Class" }
            );
            for (day, entries) in timetable.grouped_by_weekday() {
                if entries.is_empty() {
                    continue;
                }
                println!("{}", weekday_name(day));
                for entry in entries {
                    println!("  {}", describe(entry));
                }
            }
        }
        Command::Today => {
            let now = chrono::Local::now().naive_local();
            let classes = timetable.classes_on(now.date());
            if classes.is_empty() {
                println!("No classes today");
            }
            for entry in classes {
                let marker = if Timetable::is_class_active(entry, now) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}", describe(entry));
            }
        }
        Command::Reschedule => {
            let outcome = timetable.reschedule_all();
            print_notices(&outcome.notices);
        }
        Command::ExamWindow { start, end } => {
            let notices = timetable
                .set_exam_window(&tidy_date(&start), &tidy_date(&end))
                .map_err(rejected)?;
            print_notices(&notices);
            let window = &timetable.state().window;
            println!(
                "Exam period {} to {} ({})",
                window.start_date,
                window.end_date,
                if window.enabled { "enabled" } else { "disabled" }
            );
        }
        Command::ExamMode => {
            let notices = timetable.toggle_exam_mode().map_err(rejected)?;
            print_notices(&notices);
        }
        Command::GenerateExams {
            title,
            subject,
            from,
            to,
            template,
            start_time,
            per_day,
            duration,
            gap,
            lead,
            save_template,
        } => {
            let plan = build_plan(
                &config.defaults,
                &timetable.state().templates.exam_schedules,
                GenerateArgs {
                    title,
                    subject,
                    from,
                    to,
                    template,
                    start_time,
                    per_day,
                    duration,
                    gap,
                    lead,
                },
            )?;

            let generated = timetable.generate_exam_schedule(&plan).map_err(rejected)?;
            for entry in &generated.value {
                println!("  {}", describe(entry));
            }
            print_notices(&generated.notices);
            print_notices(&timetable.save_exam_title_template(&plan.title).map_err(rejected)?);

            if save_template {
                let notices = timetable.save_exam_schedule_template(&plan).map_err(rejected)?;
                print_notices(&notices);
            }
        }
        Command::Templates { action } => {
            let notices = match action {
                Some(TemplateAction::Subject { name }) => timetable.save_subject_template(&name),
                Some(TemplateAction::Time { start, end, name }) => {
                    timetable.save_time_template(&start, &end, name.as_deref())
                }
                Some(TemplateAction::Title { title }) => timetable.save_exam_title_template(&title),
                None => Ok(Vec::new()),
            }
            .map_err(rejected)?;
            print_notices(&notices);
            print_templates(&timetable);
        }
        Command::Watch => anyhow::bail!("watch is not a one-shot command"),
    }
    Ok(())
}

fn print_templates(timetable: &Timetable) {
    let state = timetable.state();
    let mode = state.editing_mode;
    let templates = &state.templates;

    println!("Subjects ({}): {}", mode.label(), templates.subjects(mode).join(", "));
    println!("Times ({}):", mode.label());
    for time in templates.times(mode) {
        println!("  {}: {} - {}", time.name, time.start_time, time.end_time);
    }
    println!("Exam titles: {}", templates.exam_titles.join(", "));
    println!("Exam schedules:");
    for schedule in &templates.exam_schedules {
        println!(
            "  {}: {} x {}h, {} min gap, from {}",
            schedule.name,
            schedule.exams_per_day,
            schedule.duration,
            schedule.gap,
            schedule.start_time
        );
    }
}

/// Run headless - check the exam window and fire due reminders each tick
fn run_watch(rt: tokio::runtime::Runtime, config: AppConfig) -> Result<()> {
    rt.block_on(async {
        tracing::info!(path = %config.storage.path.display(), "Starting Smart Table watcher");
        let notifier = notifier();

        // Wait until the next full minute before starting
        let now = chrono::Utc::now();
        let seconds_until_next_minute = 60 - (now.timestamp() % 60);
        tracing::info!(
            "Waiting {} seconds until next full minute...",
            seconds_until_next_minute
        );
        tokio::time::sleep(Duration::from_secs(seconds_until_next_minute as u64)).await;

        let interval_secs = config.refresh.tick_interval_secs.max(1);
        tracing::info!("Starting watch loop with interval: {} seconds", interval_secs);

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut last_minute: Option<NaiveDateTime> = None;
        loop {
            interval.tick().await;

            let now = truncate_to_minute(chrono::Local::now().naive_local());
            if let Err(e) = watch_tick(&config, notifier.clone(), last_minute, now) {
                tracing::error!("Watch tick failed: {:#}", e);
            }
            last_minute = Some(now);
        }
    })
}

fn truncate_to_minute(time: NaiveDateTime) -> NaiveDateTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// Minutes after `last` up to and including `now`, at most one hour back.
fn minutes_to_fire(last: Option<NaiveDateTime>, now: NaiveDateTime) -> Vec<NaiveDateTime> {
    let oldest = now - chrono::Duration::minutes(59);
    let mut minute = match last {
        Some(last) if last >= now => return Vec::new(),
        Some(last) => (last + chrono::Duration::minutes(1)).max(oldest),
        None => now,
    };

    let mut minutes = Vec::new();
    while minute <= now {
        minutes.push(minute);
        minute += chrono::Duration::minutes(1);
    }
    minutes
}

fn watch_tick(
    config: &AppConfig,
    notifier: Arc<dyn Notifier>,
    last: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> Result<()> {
    // Reopen each tick so changes made by other invocations are picked up.
    let store = open_store(config)?;

    let check = ExamModeClock::new(store.clone(), notifier.clone()).check(now.date());
    tracing::debug!(active = check.active, expired = check.expired, "Exam mode checked");

    let scheduler = LocalScheduler::new(store);
    for minute in minutes_to_fire(last, now) {
        for due in scheduler.due_at(minute)? {
            tracing::info!(id = %due.identifier, title = %due.content.title, "Reminder due");
            if let Err(e) = notifier.notify(&due.content.title, &due.content.body) {
                tracing::warn!(id = %due.identifier, error = %e, "Failed to show reminder");
            }
        }
    }
    Ok(())
}
