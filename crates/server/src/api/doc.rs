//! OpenAPI documentation aggregator, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "showroom API",
        version = "0.1.0",
        description = "Car showroom sales agent with human approval of protected tool calls.",
    ),
    tags(
        (name = "Health", description = "Readiness and redacted configuration"),
        (name = "Agent", description = "Turn invocation, SSE streaming and approval feedback"),
        (name = "Threads", description = "Persisted conversation threads"),
    ),
    paths(
        crate::api::health::health,
        crate::api::health::config,
        crate::api::chat::invoke,
        crate::api::chat::hitl_chat,
        crate::api::stream::stream,
        crate::api::feedback::approval,
        crate::api::feedback::feedback,
        crate::api::threads::threads_list,
        crate::api::threads::thread_get,
    ),
    components(schemas(
        crate::api::QueryErrorResponse,
        crate::api::InvokeRequest,
        crate::api::feedback::FeedbackRequest,
    ))
)]
pub struct ApiDoc;
