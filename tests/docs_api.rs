use oplog_backend::docs::ApiDoc;
use utoipa::OpenApi;

#[test]
fn openapi_document_lists_all_routes() {
    let doc = ApiDoc::openapi();
    let json = serde_json::to_value(&doc).expect("serialize openapi");
    let paths = json["paths"].as_object().expect("paths object");

    for path in [
        "/logs/requests",
        "/logs/admin-actions",
        "/logs/errors",
        "/logs/errors-page",
        "/logs/endpoints",
        "/logs/http-requests",
        "/logs/users/{id}/activity-logs",
        "/logs/users/{id}/activity-logs/actions",
        "/health",
    ] {
        assert!(paths.contains_key(path), "missing path {path}");
    }
}

#[test]
fn openapi_document_exposes_pagination_schema() {
    let doc = ApiDoc::openapi();
    let json = serde_json::to_value(&doc).expect("serialize openapi");
    let schemas = json["components"]["schemas"]
        .as_object()
        .expect("schemas object");
    assert!(schemas.contains_key("Pagination"));
    assert!(schemas.contains_key("HttpRequestsPageResponse"));
    assert!(schemas.contains_key("ErrorsPageResponse"));
}
