//! rota-runner: headless runner for the clinic rota core.
//!
//! Usage:
//!   rota-runner seed assign validate --seed-file data/rota/demo_clinic.json --clinic demo --year 2025 --month 3
//!   rota-runner assign --db rota.db --clinic demo --year 2025 --month 3 --mode full
//!   rota-runner deploy recompute --db rota.db --clinic demo --year 2025 --month 3 --start 2025-03-01 --end 2025-03-15
//!   rota-runner quota --db rota.db --staff h1 --date 2025-03-20
//!
//! Commands run in the order given, against one database.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use rota_core::{
    calendar::month_range,
    config::RotaConfig,
    engine::{AssignmentEngine, RunRequest},
    leave::LeaveDesk,
    schedule::ScheduleDesk,
    seed::{apply_seed, SeedFile},
    store::{RotaStore, ScheduleRow},
    types::{AssignMode, ScheduleStatus},
    worker::{BackgroundWorker, Job, JobOutcome},
};
use serde::Serialize;
use std::env;
use std::time::Duration;

const COMMANDS: &[&str] = &["seed", "assign", "validate", "deploy", "recompute", "quota"];
const FLAGS_WITHOUT_VALUE: &[&str] = &["--auto-fix", "--quiet"];

/// How long the runner waits on a background job before giving up.
const JOB_TIMEOUT: Duration = Duration::from_secs(600);

struct Options {
    db: String,
    data_dir: String,
    clinic: String,
    year: i32,
    month: u32,
    mode: AssignMode,
    seed_file: Option<String>,
    auto_fix: bool,
    quiet: bool,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    staff: Option<String>,
    date: Option<NaiveDate>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let commands = positional(&args);
    if commands.is_empty() {
        bail!("no command given; expected one or more of {}", COMMANDS.join(", "));
    }
    if let Some(unknown) = commands.iter().find(|c| !COMMANDS.contains(&c.as_str())) {
        bail!("unknown command '{unknown}'; expected one of {}", COMMANDS.join(", "));
    }

    let today = Utc::now().date_naive();
    let mode_text = str_arg(&args, "--mode").unwrap_or("smart").to_uppercase();
    let opts = Options {
        db: str_arg(&args, "--db").unwrap_or(":memory:").to_string(),
        data_dir: str_arg(&args, "--data-dir").unwrap_or("./data").to_string(),
        clinic: str_arg(&args, "--clinic").unwrap_or("demo").to_string(),
        year: parse_arg(&args, "--year", today.year()),
        month: parse_arg(&args, "--month", today.month()),
        mode: AssignMode::parse(&mode_text)
            .with_context(|| format!("--mode must be smart or full, got '{mode_text}'"))?,
        seed_file: str_arg(&args, "--seed-file").map(str::to_string),
        auto_fix: args.iter().any(|a| a == "--auto-fix"),
        quiet: args.iter().any(|a| a == "--quiet"),
        start: opt_arg(&args, "--start")?,
        end: opt_arg(&args, "--end")?,
        staff: str_arg(&args, "--staff").map(str::to_string),
        date: opt_arg(&args, "--date")?,
    };

    if !opts.quiet {
        println!("Clinic rota: rota-runner");
        println!("  commands:  {}", commands.join(" "));
        println!("  db:        {}", opts.db);
        println!("  data_dir:  {}", opts.data_dir);
        println!("  clinic:    {}", opts.clinic);
        println!("  month:     {}-{:02}", opts.year, opts.month);
        println!();
    }

    // A shared-cache URI lets the background worker's connection see the
    // same in-memory database as ours.
    let db_effective = if opts.db == ":memory:" {
        format!("file:rota_{}?mode=memory&cache=shared", chrono_tick())
    } else {
        opts.db.clone()
    };
    let store = RotaStore::open(&db_effective)?;
    store.migrate()?;
    let config = RotaConfig::load(&opts.data_dir)?;

    for command in &commands {
        log::debug!("Running '{command}'");
        match command.as_str() {
            "seed" => cmd_seed(&store, &opts)?,
            "assign" => cmd_assign(&store, &config, &opts)?,
            "validate" => cmd_validate(&store, &db_effective, &config, &opts)?,
            "deploy" => cmd_deploy(&store, &opts)?,
            "recompute" => cmd_recompute(&store, &db_effective, &config, &opts)?,
            "quota" => cmd_quota(&store, &opts)?,
            _ => unreachable!("commands are checked above"),
        }
    }
    Ok(())
}

// ── Commands ─────────────────────────────────────────────────────

fn cmd_seed(store: &RotaStore, opts: &Options) -> Result<()> {
    let path = opts
        .seed_file
        .as_deref()
        .context("seed needs --seed-file")?;
    let seed = SeedFile::load(path)?;
    if seed.clinic_id != opts.clinic {
        log::warn!(
            "Seed file is for clinic '{}', runner targets '{}'",
            seed.clinic_id,
            opts.clinic
        );
    }
    let schedules = apply_seed(store, &seed)?;
    println!("=== SEED ===");
    println!("  clinic:     {}", seed.clinic_id);
    println!("  staff:      {}", seed.staff.len());
    for s in &schedules {
        println!(
            "  schedule {}: {}-{:02} ({})",
            s.schedule_id, s.year, s.month, s.status
        );
    }
    Ok(())
}

fn cmd_assign(store: &RotaStore, config: &RotaConfig, opts: &Options) -> Result<()> {
    let mut req = RunRequest::month(&opts.clinic, opts.year, opts.month, opts.mode);
    if let Some((start, end)) = range(opts)? {
        req = req.with_range(start, end);
    }
    let summary = AssignmentEngine::new(store, config).run(&req);

    println!("=== ASSIGNMENT RUN ===");
    println!("  run_id:         {}", summary.run_id);
    println!("  mode:           {}", summary.mode);
    println!("  success:        {}", summary.success);
    println!("  units ok:       {}", summary.success_count);
    println!("  units failed:   {}", summary.failed_count);
    println!("  days filled:    {}", summary.stats.days_filled);
    println!("  days skipped:   {}", summary.stats.days_skipped);
    println!("  short groups:   {}", summary.stats.slot_groups_short);
    println!("  off flips:      {}", summary.stats.off_flips);
    println!("  holiday OFFs:   {}", summary.stats.holiday_changes);
    println!("  fairness score: {:.1}", summary.fairness_score);
    for w in &summary.warnings {
        let date = w.date.map_or("-".to_string(), |d| d.to_string());
        println!("  [{}/{}] {date} {}", w.severity, json_text(&w.class)?, w.message);
    }
    print_json(&summary)?;

    if let Some(failure) = &summary.failure {
        bail!("assignment run failed: {}", failure.message);
    }
    Ok(())
}

fn cmd_validate(store: &RotaStore, db: &str, config: &RotaConfig, opts: &Options) -> Result<()> {
    let schedule = schedule(store, opts)?;
    let outcome = run_in_background(
        db,
        config,
        Job::Validate {
            schedule_id: schedule.schedule_id,
            auto_fix: opts.auto_fix,
        },
    )?;
    let report = match outcome {
        JobOutcome::Validated(report) => report,
        other => return job_failed(other),
    };

    println!("=== VALIDATION ===");
    println!("  schedule:       {}", report.schedule_id);
    println!("  issues:         {}", report.issues.len());
    println!("  fixed:          {}", report.fixed.len());
    println!("  limit reached:  {}", report.fix_limit_reached);
    for (severity, count) in report.count_by_severity() {
        println!("  {:<14}  {count}", severity.as_str());
    }
    print_json(&report)?;
    Ok(())
}

fn cmd_deploy(store: &RotaStore, opts: &Options) -> Result<()> {
    let schedule = schedule(store, opts)?;
    let (start, end) = match range(opts)? {
        Some(r) => r,
        None => month_range(opts.year, opts.month)?,
    };
    let desk = ScheduleDesk::new(store);
    if schedule.status == ScheduleStatus::Draft {
        log::info!("Schedule {} is DRAFT; confirming before deploy", schedule.schedule_id);
        desk.confirm(schedule.schedule_id)?;
    }
    let deployed = desk.deploy(schedule.schedule_id, start, end)?;

    println!("=== DEPLOY ===");
    println!("  schedule:  {}", deployed.schedule_id);
    println!("  status:    {}", deployed.status);
    println!("  frozen:    {start}..={end}");
    println!("  (run 'recompute' to refresh the fairness ledger)");
    Ok(())
}

fn cmd_recompute(store: &RotaStore, db: &str, config: &RotaConfig, opts: &Options) -> Result<()> {
    let schedule = schedule(store, opts)?;
    let outcome = run_in_background(
        db,
        config,
        Job::Recompute {
            schedule_id: schedule.schedule_id,
        },
    )?;
    let summary = match outcome {
        JobOutcome::Recomputed(summary) => summary,
        other => return job_failed(other),
    };

    println!("=== FAIRNESS RECOMPUTE ===");
    println!("  period:    {}..={}", summary.period.0, summary.period.1);
    println!("  staff:     {}", summary.staff_count);
    println!("  rows:      {}", summary.rows_written);
    print_json(&summary)?;
    Ok(())
}

fn cmd_quota(store: &RotaStore, opts: &Options) -> Result<()> {
    let staff_id = opts.staff.as_deref().context("quota needs --staff")?;
    let date = opts.date.context("quota needs --date YYYY-MM-DD")?;
    let decision = LeaveDesk::new(store).preview(staff_id, date)?;

    println!("=== LEAVE QUOTA: {staff_id} on {date} ===");
    println!("  can approve:  {}", decision.can_approve);
    println!(
        "  binding:      {} ({} of {} used)",
        decision.binding_dimension, decision.approved_count, decision.allowed_count
    );
    for gate in &decision.gates {
        println!(
            "  {:<17} D={:<4} base={:.2} adjusted={:<3} max_off={:<3} used={:<3} +{} {}",
            gate.dimension.as_str(),
            gate.quota.demand_slots,
            gate.quota.base_requirement,
            gate.quota.adjusted_requirement,
            gate.quota.max_allowed_off_slots,
            gate.used_slots,
            gate.requested_slots,
            if gate.passes { "ok" } else { "HOLD" }
        );
    }
    print_json(&decision)?;
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────

fn schedule(store: &RotaStore, opts: &Options) -> Result<ScheduleRow> {
    store
        .find_schedule(&opts.clinic, opts.year, opts.month)?
        .with_context(|| {
            format!(
                "no schedule for clinic '{}' {}-{:02}; run 'seed' first",
                opts.clinic, opts.year, opts.month
            )
        })
}

fn range(opts: &Options) -> Result<Option<(NaiveDate, NaiveDate)>> {
    match (opts.start, opts.end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => Ok(Some((start, end))),
        _ => bail!("--start and --end go together"),
    }
}

fn run_in_background(db: &str, config: &RotaConfig, job: Job) -> Result<JobOutcome> {
    let worker = BackgroundWorker::spawn(db, config.clone())?;
    worker.submit(job)?;
    let outcome = worker
        .recv_timeout(JOB_TIMEOUT)
        .with_context(|| format!("background job {job:?} did not finish"))?;
    worker.shutdown();
    Ok(outcome)
}

fn job_failed(outcome: JobOutcome) -> Result<()> {
    match outcome {
        JobOutcome::Failed { job, message, .. } => bail!("{job:?} failed: {message}"),
        other => bail!("unexpected job outcome: {}", serde_json::to_string(&other)?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    if log::log_enabled!(log::Level::Debug) {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn json_text<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_value(value)?
        .as_str()
        .unwrap_or_default()
        .to_string())
}

/// Arguments that are neither flags nor flag values.
fn positional(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with("--") {
            skip_next = !FLAGS_WITHOUT_VALUE.contains(&arg.as_str());
            continue;
        }
        out.push(arg.clone());
    }
    out
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn opt_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match str_arg(args, flag) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("bad value for {flag} ('{raw}'): {e}")),
    }
}

fn chrono_tick() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
