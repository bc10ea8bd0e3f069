use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::reply::Response;
use warp::Filter;

use super::decode_segment;
use super::error_response;
use super::json_response;
use super::status;
use super::ApiFilter;
use crate::service::ConfigService;
use crate::Error;
use crate::Function;
use crate::FunctionKey;
use crate::RegistryError;
use crate::Result;
use crate::Subscription;
use crate::SubscriptionKey;

/// `/v1/spaces/{space}/functions[/{id}]` and
/// `/v1/spaces/{space}/subscriptions[/{id}]`
pub fn config_routes(service: Arc<ConfigService>) -> ApiFilter {
    let with_service = warp::any().map(move || service.clone());

    let functions = warp::path!("v1" / "spaces" / String / "functions");
    let function = warp::path!("v1" / "spaces" / String / "functions" / String);
    let subscriptions = warp::path!("v1" / "spaces" / String / "subscriptions");
    let subscription = warp::path!("v1" / "spaces" / String / "subscriptions" / String)
        .and(warp::path::full())
        .map(|space: String, _id: String, full: FullPath| (space, raw_last_segment(&full)))
        .untuple_one();

    let list_functions = functions
        .clone()
        .and(warp::get())
        .and(with_service.clone())
        .then(|space: String, service: Arc<ConfigService>| async move {
            reply(service.list_functions(&space).await, StatusCode::OK)
        });
    let create_function = functions
        .and(warp::post())
        .and(warp::body::bytes())
        .and(with_service.clone())
        .then(|space: String, body: Bytes, service: Arc<ConfigService>| async move {
            let result = async {
                let function: Function = parse_body(&body, &space, None)?;
                service.create_function(function).await
            };
            reply(result.await, StatusCode::CREATED)
        });
    let get_function = function
        .clone()
        .and(warp::get())
        .and(with_service.clone())
        .then(|space: String, id: String, service: Arc<ConfigService>| async move {
            reply(service.get_function(&FunctionKey::new(space, id)).await, StatusCode::OK)
        });
    let update_function = function
        .clone()
        .and(warp::put())
        .and(warp::body::bytes())
        .and(with_service.clone())
        .then(|space: String, id: String, body: Bytes, service: Arc<ConfigService>| async move {
            let result = async {
                let function: Function = parse_body(&body, &space, Some(("functionId", &id)))?;
                service.update_function(function).await
            };
            reply(result.await, StatusCode::OK)
        });
    let delete_function = function
        .and(warp::delete())
        .and(with_service.clone())
        .then(|space: String, id: String, service: Arc<ConfigService>| async move {
            no_content(service.delete_function(&FunctionKey::new(space, id)).await)
        });

    let list_subscriptions = subscriptions
        .clone()
        .and(warp::get())
        .and(with_service.clone())
        .then(|space: String, service: Arc<ConfigService>| async move {
            reply(service.list_subscriptions(&space).await, StatusCode::OK)
        });
    let create_subscription = subscriptions
        .and(warp::post())
        .and(warp::body::bytes())
        .and(with_service.clone())
        .then(|space: String, body: Bytes, service: Arc<ConfigService>| async move {
            let result = async {
                let subscription: Subscription = parse_body(&body, &space, None)?;
                service.create_subscription(subscription).await
            };
            reply(result.await, StatusCode::CREATED)
        });
    let get_subscription = subscription
        .clone()
        .and(warp::get())
        .and(with_service.clone())
        .then(|space: String, id: String, service: Arc<ConfigService>| async move {
            reply(
                service.get_subscription(&SubscriptionKey::new(space, id)).await,
                StatusCode::OK,
            )
        });
    let update_subscription = subscription
        .clone()
        .and(warp::put())
        .and(warp::body::bytes())
        .and(with_service.clone())
        .then(|space: String, id: String, body: Bytes, service: Arc<ConfigService>| async move {
            let result = async {
                let subscription: Subscription = parse_body(&body, &space, None)?;
                service
                    .update_subscription(&SubscriptionKey::new(space.clone(), id.clone()), subscription)
                    .await
            };
            reply(result.await, StatusCode::OK)
        });
    let delete_subscription = subscription
        .and(warp::delete())
        .and(with_service)
        .then(|space: String, id: String, service: Arc<ConfigService>| async move {
            no_content(service.delete_subscription(&SubscriptionKey::new(space, id)).await)
        });

    list_functions
        .or(create_function)
        .unify()
        .or(get_function)
        .unify()
        .or(update_function)
        .unify()
        .or(delete_function)
        .unify()
        .or(list_subscriptions)
        .unify()
        .or(create_subscription)
        .unify()
        .or(get_subscription)
        .unify()
        .or(update_subscription)
        .unify()
        .or(delete_subscription)
        .unify()
        .recover(handle_rejection)
        .unify()
        .boxed()
}

/// Subscription ids embed an escaped path, so the raw segment is decoded
/// exactly once here, from the raw request path.
fn raw_last_segment(full: &FullPath) -> String {
    let raw = full.as_str().rsplit('/').next().unwrap_or_default();
    decode_segment(raw)
}

/// Parses a JSON body, forcing `space` (and optionally one id field) from
/// the URL.
fn parse_body<T: DeserializeOwned>(
    body: &Bytes,
    space: &str,
    id: Option<(&str, &str)>,
) -> Result<T> {
    let mut value: Value = serde_json::from_slice(body)
        .map_err(|e| RegistryError::Validation(format!("invalid JSON body: {}", e)))?;
    let Value::Object(fields) = &mut value else {
        return Err(RegistryError::Validation("body must be a JSON object".into()).into());
    };
    fields.insert("space".to_string(), Value::String(space.to_string()));
    if let Some((field, id)) = id {
        fields.insert(field.to_string(), Value::String(id.to_string()));
    }
    serde_json::from_value(value)
        .map_err(|e| RegistryError::Validation(format!("invalid body: {}", e)).into())
}

fn reply<T: serde::Serialize>(
    result: Result<T>,
    success: StatusCode,
) -> Response {
    match result {
        Ok(body) => json_response(success, &body),
        Err(e) => failure(e),
    }
}

fn no_content(result: Result<()>) -> Response {
    match result {
        Ok(()) => {
            let mut response = Response::new(warp::hyper::Body::empty());
            *response.status_mut() = StatusCode::NO_CONTENT;
            response
        }
        Err(e) => failure(e),
    }
}

fn failure(e: Error) -> Response {
    let code = status(e.status_code());
    if code.is_server_error() {
        tracing::error!(error = %e, "configuration request failed");
    }
    error_response(code, e.to_string())
}

async fn handle_rejection(rejection: warp::Rejection) -> std::result::Result<Response, Infallible> {
    let response = if rejection.is_not_found() {
        error_response(StatusCode::NOT_FOUND, "route not found")
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    } else {
        error_response(StatusCode::BAD_REQUEST, format!("{:?}", rejection))
    };
    Ok(response)
}
