use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::DropGuard;
use tracing::debug;
use tracing::warn;
use warp::http::HeaderMap;
use warp::http::HeaderName;
use warp::http::HeaderValue;
use warp::http::Method;
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::path::FullPath;
use warp::reply::Response;
use warp::Filter;

use super::error_response;
use super::json_response;
use super::status;
use super::ApiFilter;
use crate::router::Router;
use crate::Cors;
use crate::DispatchOutcome;
use crate::DispatchRequest;
use crate::Event;
use crate::FunctionResponse;

/// Every path and method of the events listener goes to the router.
pub fn events_routes(router: Arc<Router>) -> ApiFilter {
    warp::method()
        .and(warp::path::full())
        .and(warp::header::headers_cloned())
        .and(warp::query::<BTreeMap<String, String>>())
        .and(warp::body::bytes())
        .and(warp::any().map(move || router.clone()))
        .and_then(handle_event)
        .boxed()
}

async fn handle_event(
    method: Method,
    path: FullPath,
    headers: HeaderMap,
    query: BTreeMap<String, String>,
    body: Bytes,
    router: Arc<Router>,
) -> Result<Response, Infallible> {
    let headers = header_map(&headers);
    let event = match Event::from_http(path.as_str(), method.as_str(), &headers, query, &body) {
        Ok(event) => event,
        Err(e) => return Ok(error_response(status(e.status_code()), e.to_string())),
    };
    debug!(method = %method, path = path.as_str(), event_type = %event.event_type, "event received");

    let request = DispatchRequest::new(path.as_str(), method.as_str(), event).with_headers(headers.clone());
    let (cancel, _disconnect) = request_token();

    let reply = match router.dispatch(request, &cancel).await {
        Ok(DispatchOutcome::Response { response, cors }) => {
            function_reply(response, cors.as_ref(), headers.get("origin").map(String::as_str))
        }
        Ok(DispatchOutcome::Accepted { queued, dropped }) => {
            if dropped > 0 {
                warn!(queued, dropped, "async jobs dropped on a full queue");
            }
            json_response(StatusCode::ACCEPTED, &serde_json::json!({ "queued": queued }))
        }
        Err(e) => error_response(status(e.status_code()), e.to_string()),
    };
    Ok(reply)
}

/// Token bounding one request's sync call. warp drops the handler future
/// when the client disconnects, which drops the guard and fires the token.
pub(crate) fn request_token() -> (CancellationToken, DropGuard) {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    (cancel, guard)
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Function answer verbatim, plus `Access-Control-*` headers when the
/// subscription carries CORS settings.
fn function_reply(
    function: FunctionResponse,
    cors: Option<&Cors>,
    origin: Option<&str>,
) -> Response {
    let mut response = Response::new(Body::from(function.body));
    *response.status_mut() = StatusCode::from_u16(function.status).unwrap_or(StatusCode::BAD_GATEWAY);

    for (name, value) in &function.headers {
        insert_header(&mut response, name, value);
    }
    if let Some(cors) = cors {
        apply_cors(&mut response, cors, origin);
    }
    response
}

fn apply_cors(
    response: &mut Response,
    cors: &Cors,
    origin: Option<&str>,
) {
    let allowed = if cors.origins.iter().any(|o| o == "*") {
        Some("*")
    } else {
        origin.filter(|o| cors.origins.iter().any(|allowed| allowed == o))
    };
    let Some(allowed) = allowed else {
        return;
    };

    insert_header(response, "access-control-allow-origin", allowed);
    if !cors.methods.is_empty() {
        insert_header(response, "access-control-allow-methods", &cors.methods.join(", "));
    }
    if !cors.headers.is_empty() {
        insert_header(response, "access-control-allow-headers", &cors.headers.join(", "));
    }
    if cors.allow_credentials {
        insert_header(response, "access-control-allow-credentials", "true");
    }
}

fn insert_header(
    response: &mut Response,
    name: &str,
    value: &str,
) {
    match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
        (Ok(name), Ok(value)) => {
            response.headers_mut().insert(name, value);
        }
        _ => warn!(header = name, "skip invalid response header"),
    }
}
