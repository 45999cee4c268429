//! Row encoding for jobs and triggers.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Params, Row, params};

use hourglass_core::{JobInfo, Trigger, TriggerKind, TriggerState, millis_to_time, time_to_millis};

pub const TRIGGER_COLUMNS: &str = "key, job_key, trigger_type, trigger_value, state, rounds, \
     start_time, end_time, previous_fire_time, next_fire_time, last_completed_time";

const JOB_COLUMNS: &str = "key, description, handler, param";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn conversion(index: usize, err: impl Into<BoxError>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, err.into())
}

fn time_at(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.get(index)?;
    Ok(millis.and_then(millis_to_time))
}

fn millis(time: Option<DateTime<Utc>>) -> Option<i64> {
    time.map(time_to_millis)
}

pub fn trigger_from_row(row: &Row<'_>) -> rusqlite::Result<Trigger> {
    let value: String = row.get(3)?;
    let kind: TriggerKind = serde_json::from_str(&value).map_err(|e| conversion(3, e))?;
    let state: String = row.get(4)?;
    let state: TriggerState = state.parse().map_err(|e: String| conversion(4, e))?;
    let rounds: i64 = row.get(5)?;

    Ok(Trigger {
        key: row.get(0)?,
        job_key: row.get(1)?,
        start_time: time_at(row, 6)?,
        end_time: time_at(row, 7)?,
        previous_fire_time: time_at(row, 8)?,
        next_fire_time: time_at(row, 9)?,
        last_completed_time: time_at(row, 10)?,
        rounds: rounds.max(0) as u64,
        state,
        kind,
    })
}

pub fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobInfo> {
    let param: String = row.get(3)?;
    Ok(JobInfo {
        key: row.get(0)?,
        description: row.get(1)?,
        handler: row.get(2)?,
        param: serde_json::from_str(&param).map_err(|e| conversion(3, e))?,
    })
}

/// Insert or overwrite a trigger row.
pub fn upsert_trigger(conn: &Connection, trigger: &Trigger) -> rusqlite::Result<()> {
    let value = serde_json::to_string(&trigger.kind)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "INSERT INTO triggers (key, job_key, trigger_type, trigger_value, state, rounds,
             start_time, end_time, previous_fire_time, next_fire_time, last_completed_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(key) DO UPDATE SET
             job_key = excluded.job_key,
             trigger_type = excluded.trigger_type,
             trigger_value = excluded.trigger_value,
             state = excluded.state,
             rounds = excluded.rounds,
             start_time = excluded.start_time,
             end_time = excluded.end_time,
             previous_fire_time = excluded.previous_fire_time,
             next_fire_time = excluded.next_fire_time,
             last_completed_time = excluded.last_completed_time",
        params![
            trigger.key,
            trigger.job_key,
            trigger.kind.type_tag(),
            value,
            trigger.state.as_str(),
            trigger.rounds as i64,
            millis(trigger.start_time),
            millis(trigger.end_time),
            millis(trigger.previous_fire_time),
            millis(trigger.next_fire_time),
            millis(trigger.last_completed_time),
        ],
    )?;
    Ok(())
}

/// Insert or overwrite a job row.
pub fn upsert_job(conn: &Connection, job: &JobInfo) -> rusqlite::Result<()> {
    let param = serde_json::to_string(&job.param)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "INSERT INTO jobs (key, description, handler, param) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(key) DO UPDATE SET
             description = excluded.description,
             handler = excluded.handler,
             param = excluded.param",
        params![job.key, job.description, job.handler, param],
    )?;
    Ok(())
}

pub fn load_trigger(conn: &Connection, key: &str) -> rusqlite::Result<Option<Trigger>> {
    conn.query_row(
        &format!("SELECT {} FROM triggers WHERE key = ?1", TRIGGER_COLUMNS),
        [key],
        trigger_from_row,
    )
    .optional()
}

pub fn load_job(conn: &Connection, key: &str) -> rusqlite::Result<Option<JobInfo>> {
    conn.query_row(
        &format!("SELECT {} FROM jobs WHERE key = ?1", JOB_COLUMNS),
        [key],
        job_from_row,
    )
    .optional()
}

pub fn job_exists(conn: &Connection, key: &str) -> rusqlite::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM jobs WHERE key = ?1", [key], |_| Ok(()))
        .optional()?
        .is_some())
}

pub fn trigger_exists(conn: &Connection, key: &str) -> rusqlite::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM triggers WHERE key = ?1", [key], |_| Ok(()))
        .optional()?
        .is_some())
}

/// Run a trigger query; `filter` is everything after `FROM triggers`.
pub fn query_triggers<P: Params>(
    conn: &Connection,
    filter: &str,
    params: P,
) -> rusqlite::Result<Vec<Trigger>> {
    let sql = format!("SELECT {} FROM triggers {}", TRIGGER_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let triggers = stmt
        .query_map(params, trigger_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(triggers)
}

pub fn all_jobs(conn: &Connection) -> rusqlite::Result<Vec<JobInfo>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM jobs ORDER BY key", JOB_COLUMNS))?;
    let jobs = stmt
        .query_map([], job_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(jobs)
}

/// Mark a waiting trigger without a fire time as complete.
pub fn retire_if_exhausted(trigger: &mut Trigger) {
    if trigger.state == TriggerState::Waiting && trigger.next_fire_time.is_none() {
        trigger.state = TriggerState::Complete;
    }
}
