use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, parse_date, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn reports_list(conn: &rusqlite::Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?;
    let date = match get_optional_str(params, "date")? {
        Some(raw) => Some(parse_date(&raw)?.format("%Y-%m-%d").to_string()),
        None => None,
    };
    let reports = db::reports_list(conn, class_id.as_deref(), date.as_deref())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "reports": reports }))
}

fn reports_get(conn: &rusqlite::Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let report_id = get_required_str(params, "reportId")?;
    let Some((summary, entries)) = db::report_get(conn, &report_id).map_err(HandlerErr::db_query)? else {
        return Err(HandlerErr::not_found("report not found"));
    };
    let mut out = json!(summary);
    out["statuses"] = json!(entries);
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.list" => require_db(state).and_then(|conn| reports_list(conn, &req.params)),
        "reports.get" => require_db(state).and_then(|conn| reports_get(conn, &req.params)),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
