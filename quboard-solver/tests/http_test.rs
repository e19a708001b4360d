//! Integration tests for the HTTP solver client against an in-process server

use axum::{http::StatusCode, routing::post, Json, Router};
use quboard_script::{Comparator, Constraint, OptimizationPayload, VariableKind};
use quboard_solver::{HttpSolver, Solver, SolverConfig, SolverError};
use serde_json::{json, Value};
use std::time::Duration;

// ============================================================================
// TEST FIXTURES
// ============================================================================

fn payload() -> OptimizationPayload {
    OptimizationPayload {
        variables: [("x4", VariableKind::Binary), ("x0", VariableKind::Binary)]
            .into_iter()
            .map(|(n, k)| (n.to_string(), k))
            .collect(),
        constraints: vec![Constraint::new("x4 + x0", Comparator::Eq, 1.0)],
        objective: "-9 * x4".into(),
        return_expression: "4 * x4 + 0 * x0".into(),
    }
}

/// Serve `router` on an ephemeral port and return its solve endpoint
async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/quantum", addr)
}

/// A server that always answers with `status` and `body`
async fn canned(status: StatusCode, body: Value) -> HttpSolver {
    let router = Router::new().route(
        "/quantum",
        post(move || {
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    );
    let endpoint = spawn(router).await;
    HttpSolver::new(SolverConfig::default().with_endpoint(endpoint)).unwrap()
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_string_return_selects_position() {
    let solver = canned(StatusCode::OK, json!({"return": "4", "sample": {"x4": 1, "x0": 0}})).await;
    let reply = solver.solve(&payload()).await.unwrap();
    assert_eq!(reply.selected_position, 4);
}

#[tokio::test]
async fn test_request_uses_wire_field_names() {
    let router = Router::new().route(
        "/quantum",
        post(|Json(request): Json<Value>| async move {
            let ok = request["variables"]["x4"]["type"] == "Binary"
                && request["Constraints"][0]["comparison"] == "="
                && request["Constraints"][0]["rhs"] == 1
                && request["Objective"] == "-9 * x4"
                && request["Return"] == "4 * x4 + 0 * x0";
            if ok {
                (StatusCode::OK, Json(json!({"return": 4})))
            } else {
                let error = format!("unexpected body {}", request);
                (StatusCode::BAD_REQUEST, Json(json!({"error": error})))
            }
        }),
    );
    let endpoint = spawn(router).await;
    let solver = HttpSolver::new(SolverConfig::default().with_endpoint(endpoint)).unwrap();
    assert_eq!(solver.solve(&payload()).await.unwrap().selected_position, 4);
}

#[tokio::test]
async fn test_error_field_is_server_failure() {
    let solver = canned(
        StatusCode::BAD_REQUEST,
        json!({"error": "Missing required 'Return' expression in request."}),
    )
    .await;
    let err = solver.solve(&payload()).await.unwrap_err();
    assert_eq!(
        err,
        SolverError::Server {
            status: Some(400),
            message: "Missing required 'Return' expression in request.".into(),
        }
    );
}

#[tokio::test]
async fn test_error_field_on_success_status_is_server_failure() {
    let solver = canned(StatusCode::OK, json!({"error": "annealer offline", "return": "4"})).await;
    assert!(matches!(
        solver.solve(&payload()).await,
        Err(SolverError::Server { status: Some(200), .. })
    ));
}

#[tokio::test]
async fn test_internal_error_status() {
    let solver = canned(StatusCode::INTERNAL_SERVER_ERROR, json!({"detail": "boom"})).await;
    assert!(matches!(
        solver.solve(&payload()).await,
        Err(SolverError::Server { status: Some(500), .. })
    ));
}

#[tokio::test]
async fn test_missing_return_is_semantic() {
    let solver = canned(StatusCode::OK, json!({"sample": {"x4": 1}})).await;
    assert!(matches!(solver.solve(&payload()).await, Err(SolverError::Semantic(_))));
}

#[tokio::test]
async fn test_refused_connection_is_transport() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let config = SolverConfig::default().with_endpoint(format!("http://{}/quantum", addr));
    let solver = HttpSolver::new(config).unwrap();
    let err = solver.solve(&payload()).await.unwrap_err();
    assert!(matches!(err, SolverError::Transport(_)));
    assert!(err.to_string().starts_with("Server did not respond. Is the server running?"));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let router = Router::new().route(
        "/quantum",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"return": 4}))
        }),
    );
    let endpoint = spawn(router).await;
    let config = SolverConfig::default()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_millis(100));
    let solver = HttpSolver::new(config).unwrap();
    assert!(matches!(solver.solve(&payload()).await, Err(SolverError::Transport(_))));
}
