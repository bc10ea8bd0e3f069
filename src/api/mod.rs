//! HTTP listeners
//!
//! Two independent warp servers: the events API turns every request into a
//! [`DispatchRequest`](crate::DispatchRequest) for the router, the
//! configuration API exposes [`ConfigService`](crate::service::ConfigService)
//! under `/v1/spaces/{space}/...`. Both build a `BoxedFilter<(Response,)>` so
//! a single [`serve`] handles plain and TLS listeners.
mod config_api;
mod events_api;
pub use config_api::*;
pub use events_api::*;


use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warp::filters::BoxedFilter;
use warp::http::header::CONTENT_TYPE;
use warp::http::HeaderValue;
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::reply::Response;

use crate::Error;
use crate::ListenerConfig;
use crate::Result;

pub type ApiFilter = BoxedFilter<(Response,)>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    errors: Vec<ErrorMessage>,
}

#[derive(Debug, Serialize)]
struct ErrorMessage {
    message: String,
}

/// Serves `filter` on the configured address until `shutdown` is cancelled.
pub async fn serve(
    name: &'static str,
    listener: ListenerConfig,
    filter: ApiFilter,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.listen_address;
    let signal = async move { shutdown.cancelled().await };

    match (&listener.tls_cert_path, &listener.tls_key_path) {
        (Some(cert), Some(key)) => {
            let (bound, server) = warp::serve(filter)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .bind_with_graceful_shutdown(addr, signal);
            info!("{} API listening on {}://{}", name, listener.scheme(), bound);
            server.await;
        }
        _ => {
            let (bound, server) = warp::serve(filter)
                .try_bind_with_graceful_shutdown(addr, signal)
                .map_err(|e| Error::Fatal(format!("{} API failed to bind {}: {}", name, addr, e)))?;
            info!("{} API listening on {}://{}", name, listener.scheme(), bound);
            server.await;
        }
    }
    info!("{} API stopped", name);
    Ok(())
}

pub(crate) fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Response {
    let (status, bytes) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string().into_bytes()),
    };
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub(crate) fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> Response {
    json_response(
        status,
        &ErrorBody {
            errors: vec![ErrorMessage { message: message.into() }],
        },
    )
}

pub(crate) fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Decodes `%XX` escapes of a raw path segment. Invalid escapes are kept.
pub(crate) fn decode_segment(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
