//! Bridge request handlers

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use hostbridge_protocol::{
    BridgeEvent, ClientId, ErrorBody, PushAck, PushPayload, RegisterRequest, ToolCallResponse,
};

use super::auth::authorize;
use super::BridgeContext;
use crate::broker::BrokerError;

/// Query parameter carrying the executor id
const CLIENT_ID_PARAM: &str = "clientId";

/// Handle one bridge request
///
/// Generic over the body so tests can drive it without a socket.
pub async fn handle_request<B>(
    req: Request<B>,
    ctx: Arc<BridgeContext>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let response = match path.as_str() {
        "/health" if method == Method::GET => serve_health(),
        "/health" => method_not_allowed(),
        "/register" | "/pull" | "/push" | "/status" => {
            match route(req, &method, &path, &ctx).await {
                Ok(response) => response,
                Err(err) => {
                    debug!(method = %method, path = %path, code = err.code(), "Bridge request failed");
                    error_response(&err)
                }
            }
        }
        _ => not_found(),
    };
    Ok(response)
}

async fn route<B>(
    req: Request<B>,
    method: &Method,
    path: &str,
    ctx: &BridgeContext,
) -> Result<Response<Full<Bytes>>, BrokerError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    authorize(req.headers(), &ctx.token)?;

    match (method, path) {
        (&Method::POST, "/register") => {
            let body: RegisterRequest = read_json(req.into_body(), ctx.max_body_bytes).await?;
            let registered = ctx.broker.register(&body.plugin_version);
            Ok(json_response(StatusCode::OK, &registered))
        }
        (&Method::GET, "/pull") => {
            let client_id = client_id_param(req.uri())?;
            let requests = ctx.broker.pull(client_id).await?;
            Ok(json_response(StatusCode::OK, &requests))
        }
        (&Method::POST, "/push") => {
            let client_id = client_id_param(req.uri())?;
            let raw: RawPush = read_json(req.into_body(), ctx.max_body_bytes).await?;
            let (payload, rejected) = raw.into_payload(client_id);
            let ack = ctx.broker.push(client_id, payload)?;
            Ok(json_response(
                StatusCode::OK,
                &PushAck {
                    discarded: ack.discarded + rejected,
                    ..ack
                },
            ))
        }
        (&Method::GET, "/status") => Ok(json_response(StatusCode::OK, &ctx.broker.status())),
        _ => Ok(method_not_allowed()),
    }
}

/// `/push` body with each entry still untyped
///
/// Entries are decoded one at a time so a single malformed response or event
/// never costs the rest of the batch.
#[derive(Debug, Default, Deserialize)]
struct RawPush {
    #[serde(default)]
    responses: Vec<Value>,
    #[serde(default)]
    events: Vec<Value>,
}

impl RawPush {
    /// Decode the well-formed entries; returns the payload and the number of
    /// responses that could not be decoded
    fn into_payload(self, client_id: ClientId) -> (PushPayload, usize) {
        let mut payload = PushPayload::default();
        let mut rejected = 0;

        for raw in self.responses {
            match serde_json::from_value::<ToolCallResponse>(raw) {
                Ok(response) => payload.responses.push(response),
                Err(e) => {
                    warn!(client_id = %client_id, error = %e, "Malformed response in push, discarded");
                    rejected += 1;
                }
            }
        }
        for raw in self.events {
            match serde_json::from_value::<BridgeEvent>(raw) {
                Ok(event) => payload.events.push(event),
                Err(e) => warn!(client_id = %client_id, error = %e, "Malformed event in push, dropped"),
            }
        }

        (payload, rejected)
    }
}

/// Parse the `clientId` query parameter
fn client_id_param(uri: &Uri) -> Result<ClientId, BrokerError> {
    let query = uri.query().unwrap_or_default();
    let raw = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == CLIENT_ID_PARAM)
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| BrokerError::malformed("missing clientId query parameter"))?;

    raw.parse()
        .map_err(|e| BrokerError::malformed(format!("{}", e)))
}

/// Read a size-limited JSON body; an empty body reads as `{}`
async fn read_json<B, T>(body: B, limit: usize) -> Result<T, BrokerError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    T: DeserializeOwned,
{
    let bytes = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|e| BrokerError::malformed(format!("failed to read body: {}", e)))?
        .to_bytes();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_slice(b"{}")
            .map_err(|e| BrokerError::malformed(format!("empty body: {}", e)));
    }
    serde_json::from_slice(&bytes).map_err(|e| BrokerError::malformed(format!("invalid JSON: {}", e)))
}

fn status_for(err: &BrokerError) -> StatusCode {
    match err {
        BrokerError::Auth => StatusCode::UNAUTHORIZED,
        BrokerError::UnknownClient(_) => StatusCode::NOT_FOUND,
        BrokerError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        BrokerError::NoClientConnected { .. } => StatusCode::SERVICE_UNAVAILABLE,
        BrokerError::CallTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BrokerError::DuplicateOrUnknownResponse(_)
        | BrokerError::DuplicateRequest(_)
        | BrokerError::Cancelled { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => build_response(status, "application/json", Bytes::from(bytes)),
        Err(e) => {
            warn!("Failed to serialize response: {}", e);
            build_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain; charset=utf-8",
                Bytes::from_static(b"Internal Server Error"),
            )
        }
    }
}

fn error_response(err: &BrokerError) -> Response<Full<Bytes>> {
    json_response(status_for(err), &ErrorBody::new(err.code(), err.to_string()))
}

fn build_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Liveness probe; needs no token
fn serve_health() -> Response<Full<Bytes>> {
    build_response(
        StatusCode::OK,
        "text/plain; charset=utf-8",
        Bytes::from_static(b"ok"),
    )
}

fn not_found() -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, &ErrorBody::new("not_found", "Not Found"))
}

fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorBody::new("method_not_allowed", "Method Not Allowed"),
    )
}
