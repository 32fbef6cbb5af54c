use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::AllocationError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tables", get(get_tables))
        .route("/assign-seats", post(assign_seats))
        .route("/delete-assignment", post(delete_assignment))
}

// GET /api/tables
async fn get_tables(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tables = state.allocator.snapshot().await.map_err(|e| {
        tracing::error!("snapshot failed: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read table status".to_string(),
        )
    })?;

    Ok((StatusCode::OK, Json(json!({ "success": true, "tables": tables }))))
}

// POST /api/assign-seats
#[derive(Debug, Deserialize)]
struct AssignSeatsRequest {
    ticket_number: String,
    full_name: String,
    tables: Vec<i32>,
}

async fn assign_seats(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AssignSeatsRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let outcome = state
        .allocator
        .assign_seats(&req.ticket_number, &req.full_name, &req.tables)
        .await
        .map_err(allocation_error_response)?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "ticket_number": outcome.ticket_number,
            "assigned": outcome.assigned,
            "fully_assigned": outcome.fully_assigned(),
            "results": outcome.results,
        })),
    ))
}

fn allocation_error_response(err: AllocationError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        AllocationError::TicketInvalid(_) => StatusCode::NOT_FOUND,
        AllocationError::TicketAlreadyUsed(_) => StatusCode::CONFLICT,
        AllocationError::EmptyRequest | AllocationError::HolderNameRequired => {
            StatusCode::BAD_REQUEST
        }
        AllocationError::Persistence(e) => {
            tracing::error!("ticket validation failed: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "success": false, "error": err.to_string() })))
}

// POST /api/delete-assignment
#[derive(Debug, Deserialize)]
struct DeleteAssignmentRequest {
    ticket_number: String,
}

async fn delete_assignment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteAssignmentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let released = state
        .allocator
        .release_ticket(&req.ticket_number)
        .await
        .map_err(|e| {
            tracing::error!("release_ticket failed: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete assignment".to_string(),
            )
        })?;

    if released {
        Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Assignment deleted successfully" })),
        ))
    } else {
        Err((StatusCode::NOT_FOUND, "Assignment not found".to_string()))
    }
}
