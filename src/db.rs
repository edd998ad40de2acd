use anyhow::{anyhow, Context};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

use crate::roster::Student;
use crate::session::{AttendanceReport, AttendanceStatus, ReportEntry};

pub const DB_FILE_NAME: &str = "rollcall.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            class_id TEXT NOT NULL,
            id TEXT NOT NULL,
            roll_no INTEGER NOT NULL,
            name TEXT NOT NULL,
            avatar TEXT,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(class_id, id),
            UNIQUE(class_id, roll_no),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_reports(
            id TEXT PRIMARY KEY,
            class_id TEXT,
            session_id TEXT NOT NULL,
            date TEXT NOT NULL,
            present INTEGER NOT NULL,
            absent INTEGER NOT NULL,
            unmarked INTEGER NOT NULL,
            total INTEGER NOT NULL,
            revision INTEGER NOT NULL,
            submitted_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_reports_class_date ON attendance_reports(class_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_report_entries(
            report_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(report_id, student_id),
            FOREIGN KEY(report_id) REFERENCES attendance_reports(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is not valid json", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub id: String,
    pub name: String,
    pub student_count: i64,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClassRoster {
    pub id: String,
    pub name: String,
    pub students: Vec<Student>,
}

/// Replaces the stored roster of a class. This is the only write that
/// invalidates a stored roster; open sessions keep their own snapshot.
pub fn class_roster_replace(
    conn: &Connection,
    class_id: &str,
    name: &str,
    students: &[Student],
) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    let now = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO classes(id, name, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           updated_at = excluded.updated_at",
        (class_id, name, &now),
    )?;
    tx.execute("DELETE FROM students WHERE class_id = ?", [class_id])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO students(class_id, id, roll_no, name, avatar, sort_order)
             VALUES(?, ?, ?, ?, ?, ?)",
        )?;
        for (i, s) in students.iter().enumerate() {
            stmt.execute((
                class_id,
                &s.id,
                s.roll_no as i64,
                &s.name,
                s.avatar.as_deref(),
                i as i64,
            ))?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn class_roster_load(conn: &Connection, class_id: &str) -> anyhow::Result<Option<ClassRoster>> {
    let name: Option<String> = conn
        .query_row("SELECT name FROM classes WHERE id = ?", [class_id], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(name) = name else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(
        "SELECT id, roll_no, name, avatar
         FROM students
         WHERE class_id = ?
         ORDER BY sort_order",
    )?;
    let students = stmt
        .query_map([class_id], |r| {
            Ok(Student {
                id: r.get(0)?,
                roll_no: r.get::<_, i64>(1)?.clamp(0, u32::MAX as i64) as u32,
                name: r.get(2)?,
                avatar: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(ClassRoster {
        id: class_id.to_string(),
        name,
        students,
    }))
}

pub fn classes_list(conn: &Connection) -> anyhow::Result<Vec<ClassSummary>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.updated_at,
                (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id)
         FROM classes c
         ORDER BY c.name, c.id",
    )?;
    let classes = stmt
        .query_map([], |r| {
            Ok(ClassSummary {
                id: r.get(0)?,
                name: r.get(1)?,
                updated_at: r.get(2)?,
                student_count: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(classes)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub report_id: String,
    pub class_id: Option<String>,
    pub session_id: String,
    pub date: String,
    pub present: i64,
    pub absent: i64,
    pub unmarked: i64,
    pub total: i64,
    pub revision: i64,
    pub submitted_at: String,
}

pub fn report_insert(conn: &Connection, session_id: &str, report: &AttendanceReport) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO attendance_reports(
            id, class_id, session_id, date, present, absent, unmarked, total, revision, submitted_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &report.report_id,
            report.class_id.as_deref(),
            session_id,
            &report.date,
            report.present as i64,
            report.absent as i64,
            report.unmarked as i64,
            report.total as i64,
            report.revision as i64,
            &report.submitted_at,
        ),
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO attendance_report_entries(report_id, student_id, status, sort_order)
             VALUES(?, ?, ?, ?)",
        )?;
        for (i, e) in report.statuses.iter().enumerate() {
            stmt.execute((&report.report_id, &e.student_id, e.status.as_str(), i as i64))?;
        }
    }
    tx.commit()?;
    Ok(())
}

const REPORT_COLUMNS: &str =
    "id, class_id, session_id, date, present, absent, unmarked, total, revision, submitted_at";

fn report_summary_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ReportSummary> {
    Ok(ReportSummary {
        report_id: r.get(0)?,
        class_id: r.get(1)?,
        session_id: r.get(2)?,
        date: r.get(3)?,
        present: r.get(4)?,
        absent: r.get(5)?,
        unmarked: r.get(6)?,
        total: r.get(7)?,
        revision: r.get(8)?,
        submitted_at: r.get(9)?,
    })
}

/// Newest first. Both filters are optional.
pub fn reports_list(
    conn: &Connection,
    class_id: Option<&str>,
    date: Option<&str>,
) -> anyhow::Result<Vec<ReportSummary>> {
    let mut sql = format!("SELECT {} FROM attendance_reports WHERE 1 = 1", REPORT_COLUMNS);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(cid) = class_id {
        sql.push_str(" AND class_id = ?");
        bind.push(Value::Text(cid.to_string()));
    }
    if let Some(d) = date {
        sql.push_str(" AND date = ?");
        bind.push(Value::Text(d.to_string()));
    }
    sql.push_str(" ORDER BY submitted_at DESC, revision DESC");

    let mut stmt = conn.prepare(&sql)?;
    let reports = stmt
        .query_map(params_from_iter(bind), report_summary_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reports)
}

pub fn report_get(
    conn: &Connection,
    report_id: &str,
) -> anyhow::Result<Option<(ReportSummary, Vec<ReportEntry>)>> {
    let summary = conn
        .query_row(
            &format!("SELECT {} FROM attendance_reports WHERE id = ?", REPORT_COLUMNS),
            [report_id],
            report_summary_from_row,
        )
        .optional()?;
    let Some(summary) = summary else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(
        "SELECT student_id, status
         FROM attendance_report_entries
         WHERE report_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([report_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let entries = rows
        .into_iter()
        .map(|(student_id, status)| {
            let status = AttendanceStatus::parse(&status).ok_or_else(|| {
                anyhow!(
                    "report {} has unknown status {:?} for student {}",
                    report_id,
                    status,
                    student_id
                )
            })?;
            Ok(ReportEntry { student_id, status })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Some((summary, entries)))
}
