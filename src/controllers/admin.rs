use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::NewTicket;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reset", post(reset_all))
        .route("/block-table", post(block_table))
        .route("/unblock-table", post(unblock_table))
        .route("/assignments", get(get_all_assignments))
        .route("/delete-assignment", post(delete_any_assignment))
        .route("/lookup-ticket", get(lookup_ticket))
        .route("/import-tickets", post(import_tickets))
        .route("/ticket-stats", get(ticket_stats))
}

fn internal_error<E: std::fmt::Debug>(context: &'static str) -> impl Fn(E) -> (StatusCode, String) {
    move |e| {
        tracing::error!("{}: {:?}", context, e);
        (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
    }
}

// POST /api/admin/reset
async fn reset_all(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let report = state
        .allocator
        .reset_all()
        .await
        .map_err(internal_error("Failed to reset seating data"))?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "All seating data reset",
            "details": {
                "assignments_deleted": report.assignments_deleted,
                "tickets_released": report.tickets_released,
            }
        })),
    ))
}

// POST /api/admin/block-table
#[derive(Debug, Deserialize)]
struct BlockTableRequest {
    table_number: i32,
    reason: Option<String>,
}

async fn block_table(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BlockTableRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !state.allocator.layout().contains(req.table_number) {
        return Err((StatusCode::BAD_REQUEST, "Invalid table number".to_string()));
    }

    let blocked = state
        .allocator
        .block_table(req.table_number, req.reason)
        .await
        .map_err(internal_error("Failed to block table"))?;

    if blocked {
        Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "message": format!("Table {} blocked", req.table_number) })),
        ))
    } else {
        Err((StatusCode::CONFLICT, "Table already blocked".to_string()))
    }
}

// POST /api/admin/unblock-table
#[derive(Debug, Deserialize)]
struct UnblockTableRequest {
    table_number: i32,
}

async fn unblock_table(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UnblockTableRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let unblocked = state
        .allocator
        .unblock_table(req.table_number)
        .await
        .map_err(internal_error("Failed to unblock table"))?;

    if unblocked {
        Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "message": format!("Table {} unblocked", req.table_number) })),
        ))
    } else {
        Err((StatusCode::NOT_FOUND, "Table not blocked".to_string()))
    }
}

// GET /api/admin/assignments
async fn get_all_assignments(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let assignments = state
        .allocator
        .assignments()
        .await
        .map_err(internal_error("Failed to list assignments"))?;

    Ok((
        StatusCode::OK,
        Json(json!({ "success": true, "assignments": assignments })),
    ))
}

// POST /api/admin/delete-assignment
#[derive(Debug, Deserialize)]
struct DeleteAnyAssignmentRequest {
    assignment_id: Uuid,
}

async fn delete_any_assignment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteAnyAssignmentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let released = state
        .allocator
        .delete_assignment(req.assignment_id)
        .await
        .map_err(internal_error("Failed to delete assignment"))?;

    match released {
        Some(ticket_number) => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Assignment deleted",
                "ticket_number": ticket_number,
            })),
        )),
        None => Err((StatusCode::NOT_FOUND, "Assignment not found".to_string())),
    }
}

// GET /api/admin/lookup-ticket?ticket=GALA-0001
#[derive(Debug, Deserialize)]
struct LookupTicketQuery {
    ticket: String,
}

async fn lookup_ticket(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupTicketQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let ticket = state
        .allocator
        .lookup_ticket(&params.ticket)
        .await
        .map_err(internal_error("Failed to look up ticket"))?;

    let Some(ticket) = ticket else {
        return Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "ticket_exists": false, "assignments": [] })),
        ));
    };

    let assignments = state
        .allocator
        .find_assignments(&ticket.ticket_number)
        .await
        .map_err(internal_error("Failed to look up ticket"))?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "ticket_exists": true,
            "guest_name": ticket.full_name,
            "is_used": ticket.is_used,
            "assignments": assignments,
        })),
    ))
}

// POST /api/admin/import-tickets
#[derive(Debug, Deserialize)]
struct ImportTicketsRequest {
    tickets: Vec<NewTicket>,
}

async fn import_tickets(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportTicketsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.tickets.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No tickets provided".to_string()));
    }

    let submitted = req.tickets.len() as u64;
    let imported = state
        .allocator
        .import_tickets(req.tickets)
        .await
        .map_err(internal_error("Failed to import tickets"))?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "imported": imported,
            "skipped": submitted - imported,
        })),
    ))
}

// GET /api/admin/ticket-stats
async fn ticket_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let stats = state
        .allocator
        .ticket_stats()
        .await
        .map_err(internal_error("Failed to read ticket stats"))?;

    Ok((StatusCode::OK, Json(json!({ "success": true, "stats": stats }))))
}
