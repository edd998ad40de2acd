use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_optional_u64, get_required_str, get_required_u64, get_status,
    get_student_id, now_ms, parse_date,
};
use crate::ipc::types::{AppState, Request};
use crate::roster::parse_students;
use crate::session::AttendanceReviewSession;
use serde_json::json;

fn session_view(session_id: &str, s: &AttendanceReviewSession) -> serde_json::Value {
    let filtered: Vec<serde_json::Value> = s
        .filtered()
        .enumerate()
        .map(|(index, (st, status))| {
            json!({
                "index": index,
                "id": st.id,
                "rollNo": st.roll_no,
                "name": st.name,
                "avatar": st.display_avatar(),
                "status": status,
            })
        })
        .collect();
    let current = s.current().map(|st| {
        json!({
            "id": st.id,
            "rollNo": st.roll_no,
            "name": st.name,
            "avatar": st.display_avatar(),
            "status": s.status_of(&st.id).unwrap_or_default(),
        })
    });
    let position = if current.is_some() { s.cursor() + 1 } else { 0 };

    json!({
        "sessionId": session_id,
        "classId": s.class_id(),
        "date": s.date().format("%Y-%m-%d").to_string(),
        "query": s.query(),
        "cursor": s.cursor(),
        "position": position,
        "filteredTotal": s.filtered_len(),
        "current": current,
        "filtered": filtered,
        "counts": s.counts(),
        "progress": s.progress(),
        "autoAdvanceMs": s.auto_advance_ms(),
        "pendingAdvance": s.pending_advance(),
        "report": s.report(),
        "submissions": s.submissions(),
    })
}

fn session_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?;
    let students = match (params.get("students"), class_id.as_deref()) {
        (Some(raw), _) if !raw.is_null() => {
            parse_students(raw).map_err(|e| HandlerErr::bad_params(e.to_string()))?
        }
        (_, Some(cid)) => {
            let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
            db::class_roster_load(conn, cid)
                .map_err(HandlerErr::db_query)?
                .ok_or_else(|| HandlerErr::not_found("class not found"))?
                .students
        }
        _ => return Err(HandlerErr::bad_params("missing students or classId")),
    };
    let date = match get_optional_str(params, "date")? {
        Some(raw) => parse_date(&raw)?,
        None => chrono::Local::now().date_naive(),
    };
    let auto_advance_ms = match get_optional_u64(params, "autoAdvanceMs")? {
        Some(ms) => ms,
        None => state
            .config
            .effective_auto_advance_ms(state.db.as_ref())
            .map_err(HandlerErr::db_query)?,
    };

    let mut session = AttendanceReviewSession::initialize(students, date, auto_advance_ms)?;
    if let Some(cid) = class_id {
        session = session.with_class_id(cid);
    }
    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        session_id = %session_id,
        class_id = ?session.class_id(),
        students = session.roster().len(),
        date = %date,
        "session opened"
    );
    let view = session_view(&session_id, &session);
    state.sessions.insert(session_id, session);
    Ok(view)
}

/// Looks up the session, lets a due auto-advance land, then applies `op`.
/// A failing `op` leaves the session as it was before the request,
/// including any advance that came due.
fn with_session(
    state: &mut AppState,
    params: &serde_json::Value,
    op: impl FnOnce(&mut AttendanceReviewSession, u64) -> Result<(), HandlerErr>,
) -> Result<serde_json::Value, HandlerErr> {
    let now = now_ms(state, params)?;
    let session_id = get_required_str(params, "sessionId")?;
    let session = state
        .sessions
        .get_mut(&session_id)
        .ok_or_else(|| HandlerErr::not_found("session not found"))?;
    let before = session.clone();
    session.poll(now);
    if let Err(e) = op(session, now) {
        *session = before;
        return Err(e);
    }
    Ok(session_view(&session_id, session))
}

fn session_mark(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let status = get_status(params)?;
    let student_id = get_student_id(params)?;
    with_session(state, params, |s, now| {
        match student_id.as_deref() {
            Some(id) => s.mark(id, status, now)?,
            None => s.mark_current(status, now)?,
        }
        tracing::debug!(student_id = ?student_id, status = status.as_str(), "marked");
        Ok(())
    })
}

fn session_toggle(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_student_id(params)?.ok_or_else(|| HandlerErr::bad_params("missing studentId"))?;
    with_session(state, params, |s, now| {
        let status = s.toggle(&student_id, now)?;
        tracing::debug!(student_id = %student_id, status = status.as_str(), "toggled");
        Ok(())
    })
}

fn session_tick(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let now = now_ms(state, params)?;
    let session_id = get_required_str(params, "sessionId")?;
    let session = state
        .sessions
        .get_mut(&session_id)
        .ok_or_else(|| HandlerErr::not_found("session not found"))?;
    let advanced = session.poll(now);
    let mut view = session_view(&session_id, session);
    view["advanced"] = json!(advanced);
    Ok(view)
}

fn session_submit(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let now = now_ms(state, params)?;
    let session_id = get_required_str(params, "sessionId")?;
    let session = state
        .sessions
        .get_mut(&session_id)
        .ok_or_else(|| HandlerErr::not_found("session not found"))?;
    session.poll(now);
    let report = session.submit(chrono::Utc::now()).clone();
    tracing::info!(
        session_id = %session_id,
        report_id = %report.report_id,
        date = %report.date,
        present = report.present,
        absent = report.absent,
        unmarked = report.unmarked,
        total = report.total,
        revision = report.revision,
        "attendance submitted"
    );

    let mut persist_error = None;
    let persisted = match state.db.as_ref() {
        Some(conn) => match db::report_insert(conn, &session_id, &report) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(report_id = %report.report_id, error = %format!("{e:#}"), "report not persisted");
                persist_error = Some(format!("{e:#}"));
                false
            }
        },
        None => false,
    };

    let mut view = session_view(&session_id, session);
    view["persisted"] = json!(persisted);
    if let Some(e) = persist_error {
        view["persistError"] = json!(e);
    }
    Ok(view)
}

fn session_close(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let Some(session) = state.sessions.remove(&session_id) else {
        return Err(HandlerErr::not_found("session not found"));
    };
    tracing::info!(
        session_id = %session_id,
        submissions = session.submissions(),
        "session closed"
    );
    Ok(json!({ "sessionId": session_id, "closed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let result = match req.method.as_str() {
        "session.open" => session_open(state, params),
        "session.get" => with_session(state, params, |_, _| Ok(())),
        "session.setFilter" => {
            let query = match params.get("query") {
                None | Some(serde_json::Value::Null) => Ok(String::new()),
                Some(serde_json::Value::String(q)) => Ok(q.clone()),
                Some(_) => Err(HandlerErr::bad_params("query must be a string")),
            };
            query.and_then(|q| {
                with_session(state, params, |s, _| {
                    s.set_filter(&q);
                    Ok(())
                })
            })
        }
        "session.mark" => session_mark(state, params),
        "session.toggle" => session_toggle(state, params),
        "session.markAll" => get_status(params).and_then(|status| {
            with_session(state, params, |s, _| Ok(s.mark_all(status)?))
        }),
        "session.reset" => with_session(state, params, |s, _| {
            s.reset_marks();
            Ok(())
        }),
        "session.next" => with_session(state, params, |s, _| {
            s.go_next();
            Ok(())
        }),
        "session.previous" => with_session(state, params, |s, _| {
            s.go_previous();
            Ok(())
        }),
        "session.jumpTo" => get_required_u64(params, "index").and_then(|index| {
            let index = usize::try_from(index).unwrap_or(usize::MAX);
            with_session(state, params, |s, _| Ok(s.jump_to(index)?))
        }),
        "session.tick" => session_tick(state, params),
        "session.setDate" => get_required_str(params, "date")
            .and_then(|raw| parse_date(&raw))
            .and_then(|date| {
                with_session(state, params, |s, _| {
                    s.set_date(date);
                    Ok(())
                })
            }),
        "session.submit" => session_submit(state, params),
        "session.dismissReport" => with_session(state, params, |s, _| {
            s.dismiss_report();
            Ok(())
        }),
        "session.close" => session_close(state, params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            if e.code == "precondition_failed" {
                tracing::debug!(method = %req.method, error = %e.message, "precondition rejected");
            }
            e.response(&req.id)
        }
    })
}
