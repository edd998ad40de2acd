use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::roster::{parse_students, Roster};
use serde_json::json;

fn rosters_import(conn: &rusqlite::Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_str(params, "name")?;
    let raw = params
        .get("students")
        .ok_or_else(|| HandlerErr::bad_params("missing students"))?;
    let students = parse_students(raw).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    // Same checks a session applies, so a stored roster can always be opened.
    Roster::new(students.clone())?;

    db::class_roster_replace(conn, &class_id, &name, &students)
        .map_err(|e| HandlerErr::db_update(e, "students"))?;
    tracing::info!(class_id = %class_id, students = students.len(), "roster imported");
    Ok(json!({
        "classId": class_id,
        "studentCount": students.len(),
    }))
}

fn rosters_list(conn: &rusqlite::Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classes = db::classes_list(conn).map_err(HandlerErr::db_query)?;
    Ok(json!({ "classes": classes }))
}

fn rosters_get(conn: &rusqlite::Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let Some(roster) = db::class_roster_load(conn, &class_id).map_err(HandlerErr::db_query)? else {
        return Err(HandlerErr::not_found("class not found"));
    };
    let students: Vec<serde_json::Value> = roster
        .students
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "rollNo": s.roll_no,
                "name": s.name,
                "avatar": s.display_avatar(),
            })
        })
        .collect();
    Ok(json!({
        "classId": roster.id,
        "name": roster.name,
        "students": students,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "rosters.import" => require_db(state).and_then(|conn| rosters_import(conn, &req.params)),
        "rosters.list" => require_db(state).and_then(|conn| rosters_list(conn, &req.params)),
        "rosters.get" => require_db(state).and_then(|conn| rosters_get(conn, &req.params)),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
