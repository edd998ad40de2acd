//! In-memory attendance review over a fixed roster.
//!
//! A session keeps one status per roster student for its whole lifetime.
//! Searching only narrows the list the cursor walks over; it never touches
//! recorded marks. Time is supplied by the caller as a monotonic
//! millisecond clock (`now_ms`) so the auto-advance can be driven without
//! timers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::roster::{normalize_query, Roster, Student};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    #[default]
    Unmarked,
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "unmarked" => Some(Self::Unmarked),
            "present" | "p" => Some(Self::Present),
            "absent" | "a" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unmarked => "unmarked",
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }

    pub fn is_marked(self) -> bool {
        self != Self::Unmarked
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("roster is empty")]
    EmptyRoster,
    #[error("duplicate student id `{0}`")]
    DuplicateStudent(String),
    #[error("duplicate roll number {0}")]
    DuplicateRollNo(u32),
    #[error("unknown student `{0}`")]
    UnknownStudent(String),
    #[error("index {index} out of range for {len} listed students")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no student under the cursor")]
    NoCurrentStudent,
    #[error("cannot mark a student as {}", .0.as_str())]
    InvalidStatus(AttendanceStatus),
}

impl PreconditionError {
    pub fn stable_code(&self) -> &'static str {
        match self {
            Self::EmptyRoster => "empty_roster",
            Self::DuplicateStudent(_) => "duplicate_student",
            Self::DuplicateRollNo(_) => "duplicate_roll_no",
            Self::UnknownStudent(_) => "unknown_student",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::NoCurrentStudent => "no_current_student",
            Self::InvalidStatus(_) => "invalid_status",
        }
    }
}

/// Status per roster position. Same length as the roster, always.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceMap {
    statuses: Vec<AttendanceStatus>,
}

impl AttendanceMap {
    fn unmarked(len: usize) -> Self {
        Self {
            statuses: vec![AttendanceStatus::Unmarked; len],
        }
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn get(&self, pos: usize) -> AttendanceStatus {
        self.statuses.get(pos).copied().unwrap_or_default()
    }

    fn set(&mut self, pos: usize, status: AttendanceStatus) {
        if let Some(slot) = self.statuses.get_mut(pos) {
            *slot = status;
        }
    }

    fn fill(&mut self, status: AttendanceStatus) {
        self.statuses.iter_mut().for_each(|s| *s = status);
    }

    fn count(&self, status: AttendanceStatus) -> usize {
        self.statuses.iter().filter(|s| **s == status).count()
    }
}

/// Counts over the full roster, whatever the current filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub present: usize,
    pub absent: usize,
    pub remaining: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAdvance {
    pub from: usize,
    pub due_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub student_id: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReport {
    pub report_id: String,
    pub class_id: Option<String>,
    pub date: String,
    pub present: usize,
    pub absent: usize,
    pub unmarked: usize,
    pub total: usize,
    pub revision: u32,
    pub submitted_at: String,
    pub statuses: Vec<ReportEntry>,
}

#[derive(Debug, Clone)]
pub struct AttendanceReviewSession {
    class_id: Option<String>,
    roster: Roster,
    marks: AttendanceMap,
    date: NaiveDate,
    query: String,
    filtered: Vec<usize>,
    cursor: usize,
    auto_advance_ms: u64,
    pending: Option<PendingAdvance>,
    report: Option<AttendanceReport>,
    submissions: u32,
}

impl AttendanceReviewSession {
    /// Starts a session with every student unmarked and the cursor on the
    /// first student. `auto_advance_ms == 0` advances synchronously.
    pub fn initialize(
        students: Vec<Student>,
        date: NaiveDate,
        auto_advance_ms: u64,
    ) -> Result<Self, PreconditionError> {
        let roster = Roster::new(students)?;
        let marks = AttendanceMap::unmarked(roster.len());
        let filtered = (0..roster.len()).collect();
        Ok(Self {
            class_id: None,
            roster,
            marks,
            date,
            query: String::new(),
            filtered,
            cursor: 0,
            auto_advance_ms,
            pending: None,
            report: None,
            submissions: 0,
        })
    }

    pub fn with_class_id(mut self, class_id: impl Into<String>) -> Self {
        self.class_id = Some(class_id.into());
        self
    }

    pub fn class_id(&self) -> Option<&str> {
        self.class_id.as_deref()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    #[allow(dead_code)]
    pub fn marks(&self) -> &AttendanceMap {
        &self.marks
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        self.date = date;
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn auto_advance_ms(&self) -> u64 {
        self.auto_advance_ms
    }

    pub fn pending_advance(&self) -> Option<PendingAdvance> {
        self.pending
    }

    pub fn report(&self) -> Option<&AttendanceReport> {
        self.report.as_ref()
    }

    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    pub fn status_of(&self, student_id: &str) -> Option<AttendanceStatus> {
        self.roster.position(student_id).map(|p| self.marks.get(p))
    }

    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    /// Filtered roster in roster order, with each student's status.
    pub fn filtered(&self) -> impl Iterator<Item = (&Student, AttendanceStatus)> + '_ {
        self.filtered
            .iter()
            .filter_map(|&pos| self.roster.get(pos).map(|s| (s, self.marks.get(pos))))
    }

    pub fn current(&self) -> Option<&Student> {
        self.filtered
            .get(self.cursor)
            .and_then(|&pos| self.roster.get(pos))
    }

    pub fn set_filter(&mut self, query: &str) {
        self.query = query.to_string();
        self.filtered = self.roster.matching(query);
        self.cursor = 0;
        self.pending = None;
        tracing::debug!(
            query = %normalize_query(query),
            matches = self.filtered.len(),
            "filter applied"
        );
    }

    pub fn mark(
        &mut self,
        student_id: &str,
        status: AttendanceStatus,
        now_ms: u64,
    ) -> Result<(), PreconditionError> {
        if !status.is_marked() {
            return Err(PreconditionError::InvalidStatus(status));
        }
        let pos = self
            .roster
            .position(student_id)
            .ok_or_else(|| PreconditionError::UnknownStudent(student_id.to_string()))?;
        self.apply_mark(pos, status, now_ms);
        Ok(())
    }

    pub fn mark_current(
        &mut self,
        status: AttendanceStatus,
        now_ms: u64,
    ) -> Result<(), PreconditionError> {
        if !status.is_marked() {
            return Err(PreconditionError::InvalidStatus(status));
        }
        let pos = *self
            .filtered
            .get(self.cursor)
            .ok_or(PreconditionError::NoCurrentStudent)?;
        self.apply_mark(pos, status, now_ms);
        Ok(())
    }

    /// Unmarked and Absent go to Present, Present goes to Absent.
    pub fn toggle(
        &mut self,
        student_id: &str,
        now_ms: u64,
    ) -> Result<AttendanceStatus, PreconditionError> {
        let pos = self
            .roster
            .position(student_id)
            .ok_or_else(|| PreconditionError::UnknownStudent(student_id.to_string()))?;
        let next = match self.marks.get(pos) {
            AttendanceStatus::Present => AttendanceStatus::Absent,
            AttendanceStatus::Unmarked | AttendanceStatus::Absent => AttendanceStatus::Present,
        };
        self.apply_mark(pos, next, now_ms);
        Ok(next)
    }

    pub fn mark_all(&mut self, status: AttendanceStatus) -> Result<(), PreconditionError> {
        if !status.is_marked() {
            return Err(PreconditionError::InvalidStatus(status));
        }
        self.marks.fill(status);
        self.pending = None;
        Ok(())
    }

    pub fn reset_marks(&mut self) {
        self.marks.fill(AttendanceStatus::Unmarked);
        self.pending = None;
    }

    fn apply_mark(&mut self, pos: usize, status: AttendanceStatus, now_ms: u64) {
        self.marks.set(pos, status);
        self.pending = None;

        let on_cursor = self.filtered.get(self.cursor) == Some(&pos);
        if !on_cursor || self.cursor + 1 >= self.filtered.len() {
            return;
        }
        if self.auto_advance_ms == 0 {
            self.cursor += 1;
        } else {
            self.pending = Some(PendingAdvance {
                from: self.cursor,
                due_at_ms: now_ms.saturating_add(self.auto_advance_ms),
            });
        }
    }

    /// Fires a due auto-advance. The advance is dropped if the cursor has
    /// moved since it was scheduled. Returns whether the cursor moved.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let Some(pending) = self.pending else {
            return false;
        };
        if now_ms < pending.due_at_ms {
            return false;
        }
        self.pending = None;
        if self.cursor != pending.from || self.cursor + 1 >= self.filtered.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn go_next(&mut self) {
        self.pending = None;
        if self.cursor + 1 < self.filtered.len() {
            self.cursor += 1;
        }
    }

    pub fn go_previous(&mut self) {
        self.pending = None;
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn jump_to(&mut self, index: usize) -> Result<(), PreconditionError> {
        if index >= self.filtered.len() {
            return Err(PreconditionError::IndexOutOfRange {
                index,
                len: self.filtered.len(),
            });
        }
        self.pending = None;
        self.cursor = index;
        Ok(())
    }

    pub fn counts(&self) -> Counts {
        let present = self.marks.count(AttendanceStatus::Present);
        let absent = self.marks.count(AttendanceStatus::Absent);
        let total = self.marks.len();
        Counts {
            present,
            absent,
            remaining: total - present - absent,
            total,
        }
    }

    /// Share of the roster reviewed so far, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let c = self.counts();
        if c.total == 0 {
            return 0.0;
        }
        (c.present + c.absent) as f64 / c.total as f64
    }

    /// Freezes the current marks into a report and keeps it as the shown
    /// report. Resubmission is allowed and bumps the revision.
    pub fn submit(&mut self, submitted_at: DateTime<Utc>) -> &AttendanceReport {
        let counts = self.counts();
        self.submissions += 1;
        let statuses = self
            .roster
            .students()
            .iter()
            .enumerate()
            .map(|(pos, s)| ReportEntry {
                student_id: s.id.clone(),
                status: self.marks.get(pos),
            })
            .collect();
        self.report.insert(AttendanceReport {
            report_id: uuid::Uuid::new_v4().to_string(),
            class_id: self.class_id.clone(),
            date: self.date.format("%Y-%m-%d").to_string(),
            present: counts.present,
            absent: counts.absent,
            unmarked: counts.remaining,
            total: counts.total,
            revision: self.submissions,
            submitted_at: submitted_at.to_rfc3339(),
            statuses,
        })
    }

    pub fn dismiss_report(&mut self) {
        self.report = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AttendanceStatus::{Absent, Present, Unmarked};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).expect("date")
    }

    fn pair() -> AttendanceReviewSession {
        AttendanceReviewSession::initialize(
            vec![
                Student::new("1", 1, "Aarav Sharma"),
                Student::new("2", 2, "Bhavya Patel"),
            ],
            date(),
            0,
        )
        .expect("session")
    }

    fn class_of_ten(auto_advance_ms: u64) -> AttendanceReviewSession {
        let names = [
            "Aarav Sharma",
            "Bhavya Patel",
            "Chetan Singh",
            "Divya Reddy",
            "Esha Gupta",
            "Farhan Khan",
            "Gayatri Joshi",
            "Harsh Verma",
            "Ishaan Nair",
            "Jhanvi Kapoor",
        ];
        let students = names
            .iter()
            .enumerate()
            .map(|(i, n)| Student::new((i + 1).to_string(), (i + 1) as u32, *n))
            .collect();
        AttendanceReviewSession::initialize(students, date(), auto_advance_ms).expect("session")
    }

    #[test]
    fn initialize_leaves_everyone_unmarked() {
        let s = class_of_ten(300);
        assert_eq!(s.marks().len(), 10);
        assert!((0..10).all(|p| s.marks().get(p) == Unmarked));
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.query(), "");
        assert!(s.report().is_none());
        assert_eq!(s.current().map(|c| c.name.as_str()), Some("Aarav Sharma"));
    }

    #[test]
    fn initialize_rejects_empty_roster() {
        let e = AttendanceReviewSession::initialize(vec![], date(), 0).unwrap_err();
        assert_eq!(e, PreconditionError::EmptyRoster);
        assert_eq!(e.stable_code(), "empty_roster");
    }

    #[test]
    fn two_student_scenario_counts_and_report() {
        let mut s = pair();
        s.mark("1", Present, 0).expect("mark 1");
        s.mark("2", Absent, 0).expect("mark 2");
        assert_eq!(
            s.counts(),
            Counts {
                present: 1,
                absent: 1,
                remaining: 0,
                total: 2
            }
        );
        let report = s.submit(Utc::now()).clone();
        assert_eq!(report.present, 1);
        assert_eq!(report.absent, 1);
        assert_eq!(report.total, 2);
        assert_eq!(report.unmarked, 0);
        assert_eq!(report.date, "2026-10-16");
        assert_eq!(report.revision, 1);
        assert_eq!(report.statuses.len(), 2);
    }

    #[test]
    fn filter_resets_cursor_and_keeps_marks() {
        let mut s = pair();
        s.mark("1", Present, 0).expect("mark");
        assert_eq!(s.cursor(), 1);

        s.set_filter("bhavya");
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.filtered_len(), 1);
        assert_eq!(s.current().map(|c| c.id.as_str()), Some("2"));
        assert_eq!(s.counts().present, 1);

        s.set_filter("");
        assert_eq!(s.filtered_len(), 2);
        assert_eq!(s.status_of("1"), Some(Present));
    }

    #[test]
    fn filter_preserves_roster_order() {
        let mut s = class_of_ten(0);
        s.jump_to(7).expect("jump");
        s.set_filter("a");
        let ids: Vec<&str> = s.filtered().map(|(st, _)| st.id.as_str()).collect();
        let expected: Vec<String> = s
            .roster()
            .students()
            .iter()
            .filter(|st| st.name.to_lowercase().contains('a'))
            .map(|st| st.id.clone())
            .collect();
        assert_eq!(ids, expected);
        assert_eq!(s.cursor(), 0);
    }

    #[test]
    fn navigation_clamps_at_both_ends() {
        let mut s = pair();
        s.go_previous();
        assert_eq!(s.cursor(), 0);
        s.go_next();
        assert_eq!(s.cursor(), 1);
        s.go_next();
        assert_eq!(s.cursor(), 1);
    }

    #[test]
    fn jump_out_of_range_changes_nothing() {
        let mut s = pair();
        s.mark("1", Present, 0).expect("mark");
        let before = s.marks().clone();
        let cursor = s.cursor();
        let e = s.jump_to(5).unwrap_err();
        assert_eq!(e, PreconditionError::IndexOutOfRange { index: 5, len: 2 });
        assert_eq!(s.marks(), &before);
        assert_eq!(s.cursor(), cursor);
    }

    #[test]
    fn marking_twice_is_idempotent() {
        let mut once = class_of_ten(0);
        once.mark("3", Present, 0).expect("mark");
        let mut twice = class_of_ten(0);
        twice.mark("3", Present, 0).expect("mark");
        twice.mark("3", Present, 0).expect("mark");
        assert_eq!(once.marks(), twice.marks());
    }

    #[test]
    fn marks_never_change_map_size_or_filter_membership() {
        let mut s = class_of_ten(0);
        s.set_filter("sh");
        let listed: Vec<String> = s.filtered().map(|(st, _)| st.id.clone()).collect();
        for (i, id) in ["1", "2", "3", "8", "10", "1"].iter().enumerate() {
            let status = if i % 2 == 0 { Present } else { Absent };
            s.mark(id, status, 0).expect("mark");
            assert_eq!(s.marks().len(), 10);
        }
        let after: Vec<String> = s.filtered().map(|(st, _)| st.id.clone()).collect();
        assert_eq!(listed, after);
    }

    #[test]
    fn present_and_absent_toggle_directly() {
        let mut s = pair();
        assert_eq!(s.toggle("2", 0).expect("toggle"), Present);
        assert_eq!(s.toggle("2", 0).expect("toggle"), Absent);
        assert_eq!(s.toggle("2", 0).expect("toggle"), Present);
        s.mark("1", Absent, 0).expect("mark");
        s.mark("1", Present, 0).expect("mark");
        assert_eq!(s.status_of("1"), Some(Present));
    }

    #[test]
    fn mark_rejects_unmarked_and_unknown_ids() {
        let mut s = pair();
        assert_eq!(
            s.mark("1", Unmarked, 0).unwrap_err(),
            PreconditionError::InvalidStatus(Unmarked)
        );
        assert_eq!(
            s.mark("99", Present, 0).unwrap_err(),
            PreconditionError::UnknownStudent("99".to_string())
        );
        assert_eq!(s.counts().remaining, 2);
    }

    #[test]
    fn mark_current_needs_a_current_student() {
        let mut s = pair();
        s.set_filter("nobody");
        assert!(s.current().is_none());
        assert_eq!(
            s.mark_current(Present, 0).unwrap_err(),
            PreconditionError::NoCurrentStudent
        );
        s.go_next();
        s.go_previous();
        assert_eq!(s.cursor(), 0);
    }

    #[test]
    fn auto_advance_waits_for_its_delay() {
        let mut s = class_of_ten(300);
        s.mark_current(Present, 1_000).expect("mark");
        assert_eq!(s.cursor(), 0);
        assert_eq!(
            s.pending_advance(),
            Some(PendingAdvance {
                from: 0,
                due_at_ms: 1_300
            })
        );
        assert!(!s.poll(1_299));
        assert!(s.poll(1_300));
        assert_eq!(s.cursor(), 1);
        assert!(s.pending_advance().is_none());
        assert!(!s.poll(5_000));
    }

    #[test]
    fn manual_navigation_cancels_auto_advance() {
        let mut s = class_of_ten(300);
        s.mark_current(Present, 0).expect("mark");
        s.go_next();
        assert_eq!(s.cursor(), 1);
        assert!(!s.poll(10_000));
        assert_eq!(s.cursor(), 1);
    }

    #[test]
    fn marking_someone_else_cancels_auto_advance() {
        let mut s = class_of_ten(300);
        s.mark_current(Present, 0).expect("mark");
        s.mark("9", Absent, 10).expect("mark other");
        assert!(s.pending_advance().is_none());
        assert!(!s.poll(10_000));
        assert_eq!(s.cursor(), 0);
    }

    #[test]
    fn no_auto_advance_from_last_position() {
        let mut s = class_of_ten(300);
        s.jump_to(9).expect("jump");
        s.mark_current(Absent, 0).expect("mark");
        assert!(s.pending_advance().is_none());
        assert_eq!(s.cursor(), 9);
    }

    #[test]
    fn mark_all_overwrites_full_roster_even_when_filtered() {
        let mut s = class_of_ten(0);
        s.set_filter("bhavya");
        s.mark_all(Present).expect("mark all");
        assert_eq!(s.counts().present, 10);
        s.mark_all(Absent).expect("mark all");
        assert_eq!(s.counts().absent, 10);
        assert!(s.mark_all(Unmarked).is_err());
        s.reset_marks();
        assert_eq!(s.counts().remaining, 10);
    }

    #[test]
    fn remaining_is_scoped_to_full_roster() {
        let mut s = class_of_ten(0);
        s.mark("1", Present, 0).expect("mark");
        s.set_filter("bhavya");
        let c = s.counts();
        assert_eq!(c.remaining, 9);
        assert_eq!(c.total, 10);
        assert!((s.progress() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn dismissed_report_can_be_resubmitted() {
        let mut s = pair();
        s.mark("1", Present, 0).expect("mark");
        let first = s.submit(Utc::now()).clone();
        assert_eq!(first.unmarked, 1);
        s.dismiss_report();
        assert!(s.report().is_none());
        assert_eq!(s.status_of("1"), Some(Present));

        s.mark("2", Present, 0).expect("mark");
        let second = s.submit(Utc::now()).clone();
        assert_eq!(second.revision, 2);
        assert_eq!(second.present, 2);
        assert_ne!(first.report_id, second.report_id);
        assert_eq!(s.submissions(), 2);
    }

    #[test]
    fn status_parse_accepts_short_forms() {
        assert_eq!(AttendanceStatus::parse("P"), Some(Present));
        assert_eq!(AttendanceStatus::parse(" absent "), Some(Absent));
        assert_eq!(AttendanceStatus::parse("unmarked"), Some(Unmarked));
        assert_eq!(AttendanceStatus::parse("late"), None);
    }
}
