pub mod api_types;
mod mutation_root;
mod server;

use async_graphql::http::GraphiQLSource;
use async_graphql::{Context, EmptySubscription, Request, Response, Schema, SchemaBuilder};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use quill_store::Store;
use tracing::*;

pub use self::mutation_root::MutationRoot;
pub use self::server::QueryRoot;
use crate::depth_guard::{DepthGuard, Verdict};
use crate::metrics;

pub type ApiSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub struct ApiSchemaContext {
    pub store: Store,
}

impl ApiSchemaContext {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

pub fn api_schema_builder() -> SchemaBuilder<QueryRoot, MutationRoot, EmptySubscription> {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
}

pub fn api_schema(ctx: ApiSchemaContext) -> ApiSchema {
    api_schema_builder().data(ctx).finish()
}

pub fn ctx_data<'a>(ctx: &'a Context) -> &'a ApiSchemaContext {
    ctx.data::<ApiSchemaContext>()
        .expect("Failed to get API context")
}

/// Parses `request` and runs it through `guard`. On `Err`, the returned
/// response must be sent back as-is and the request must not be executed.
///
/// The parsed document stays cached on the request, so executing it
/// afterwards doesn't parse it a second time.
pub fn screen_request(guard: &DepthGuard, request: &mut Request) -> Result<(), Response> {
    let document = match request.parsed_query() {
        Ok(document) => document,
        Err(err) => {
            debug!(error = %err.message, "Rejecting GraphQL request with a syntax error");
            metrics()
                .graphql_requests
                .with_label_values(&["syntax_error"])
                .inc();
            return Err(Response::from_errors(vec![err]));
        }
    };

    match guard.evaluate(document) {
        Verdict::Accepted => {
            metrics()
                .graphql_requests
                .with_label_values(&["accepted"])
                .inc();
            Ok(())
        }
        Verdict::Rejected(diagnostics) => {
            for diagnostic in &diagnostics {
                warn!(
                    operation = diagnostic.operation.as_deref().unwrap_or("<anonymous>"),
                    code = diagnostic.violation.code(),
                    limit = guard.limit(),
                    "{}",
                    diagnostic
                );
            }
            metrics()
                .graphql_requests
                .with_label_values(&["rejected"])
                .inc();
            Err(Response::from_errors(
                diagnostics.into_iter().map(Into::into).collect(),
            ))
        }
    }
}

#[derive(Clone)]
struct ApiState {
    schema: ApiSchema,
    guard: DepthGuard,
}

/// Serves the GraphQL API at `/`: GraphiQL on `GET`, queries and mutations on
/// `POST`. Every request is screened by `guard` before it reaches `schema`.
pub fn api_router(schema: ApiSchema, guard: DepthGuard) -> Router {
    Router::new()
        .route("/", get(graphiql_route).post(graphql_handler))
        .with_state(ApiState { schema, guard })
}

async fn graphql_handler(
    State(state): State<ApiState>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = request.into_inner();
    if let Err(response) = screen_request(&state.guard, &mut request) {
        return response.into();
    }

    state.schema.execute(request).await.into()
}

async fn graphiql_route() -> impl IntoResponse {
    axum::response::Html(GraphiQLSource::build().endpoint("/").finish())
}
