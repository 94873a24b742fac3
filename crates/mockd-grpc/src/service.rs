//! Reflective gRPC dispatch
//!
//! A single service answers every RPC on the port: the request path selects
//! the method descriptor, the configured behavior produces the response, and
//! the dynamic codec handles framing for all four streaming shapes.
//! Unconfigured methods fail with `UNIMPLEMENTED`.

use crate::codec::DynamicCodec;
use crate::proto::GrpcSchema;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use mockd_core::model::{GrpcEndpoint, GrpcMethodMock};
use mockd_core::template::{render_value, RenderContext};
use prost_reflect::{DynamicMessage, MethodDescriptor};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tonic::codegen::http;
use tonic::server::{
    ClientStreamingService, Grpc, ServerStreamingService, StreamingService, UnaryService,
};
use tonic::{Code, Request, Response, Status, Streaming};
use tracing::debug;

type DynamicStream = Pin<Box<dyn Stream<Item = Result<DynamicMessage, Status>> + Send>>;

/// Map a canonical status name to a tonic code
pub fn code_from_name(name: &str) -> Code {
    match name.to_uppercase().as_str() {
        "OK" => Code::Ok,
        "CANCELLED" => Code::Cancelled,
        "INVALID_ARGUMENT" => Code::InvalidArgument,
        "DEADLINE_EXCEEDED" => Code::DeadlineExceeded,
        "NOT_FOUND" => Code::NotFound,
        "ALREADY_EXISTS" => Code::AlreadyExists,
        "PERMISSION_DENIED" => Code::PermissionDenied,
        "RESOURCE_EXHAUSTED" => Code::ResourceExhausted,
        "FAILED_PRECONDITION" => Code::FailedPrecondition,
        "ABORTED" => Code::Aborted,
        "OUT_OF_RANGE" => Code::OutOfRange,
        "UNIMPLEMENTED" => Code::Unimplemented,
        "INTERNAL" => Code::Internal,
        "UNAVAILABLE" => Code::Unavailable,
        "DATA_LOSS" => Code::DataLoss,
        "UNAUTHENTICATED" => Code::Unauthenticated,
        _ => Code::Unknown,
    }
}

struct MethodRuntime {
    descriptor: MethodDescriptor,
    mock: GrpcMethodMock,
}

impl MethodRuntime {
    fn check_error(&self) -> Result<(), Status> {
        if let Some(error) = &self.mock.error {
            let message = error.message.clone().unwrap_or_else(|| error.code.clone());
            return Err(Status::new(code_from_name(&error.code), message));
        }
        Ok(())
    }

    fn context_from(&self, input: Option<&DynamicMessage>) -> RenderContext {
        let mut ctx = RenderContext::default();
        if let Some(input) = input {
            ctx.payload = serde_json::to_value(input).ok();
        }
        ctx
    }

    fn render_message(&self, value: &Value, ctx: &RenderContext) -> Result<DynamicMessage, Status> {
        let rendered = render_value(value, ctx);
        let text = rendered.to_string();
        let mut deserializer = serde_json::Deserializer::from_str(&text);
        let options = prost_reflect::DeserializeOptions::new().deny_unknown_fields(false);
        DynamicMessage::deserialize_with_options(self.descriptor.output(), &mut deserializer, &options)
            .map_err(|e| Status::internal(format!("response does not fit output type: {e}")))
    }

    /// Single response value: `response`, else the first of `responses`
    fn single_value(&self) -> Value {
        self.mock
            .response
            .clone()
            .or_else(|| self.mock.responses.first().cloned())
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }

    /// Ordered stream values: `responses`, else the lone `response`
    fn stream_values(&self) -> Vec<Value> {
        if self.mock.responses.is_empty() {
            self.mock.response.clone().into_iter().collect()
        } else {
            self.mock.responses.clone()
        }
    }

    fn stream_delay(&self) -> Duration {
        Duration::from_millis(self.mock.stream_delay_ms.unwrap_or(0))
    }

    fn unary_response(&self, input: Option<&DynamicMessage>) -> Result<DynamicMessage, Status> {
        self.check_error()?;
        let ctx = self.context_from(input);
        self.render_message(&self.single_value(), &ctx)
    }

    fn response_stream(self: &Arc<Self>, input: Option<&DynamicMessage>) -> DynamicStream {
        let ctx = Arc::new(self.context_from(input));
        let delay = self.stream_delay();
        let runtime = Arc::clone(self);
        let stream = futures::stream::iter(self.stream_values().into_iter().enumerate()).then(
            move |(index, value)| {
                let runtime = Arc::clone(&runtime);
                let ctx = Arc::clone(&ctx);
                async move {
                    if index > 0 && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    runtime.render_message(&value, &ctx)
                }
            },
        );
        Box::pin(stream)
    }
}

struct UnaryHandler(Arc<MethodRuntime>);

impl UnaryService<DynamicMessage> for UnaryHandler {
    type Response = DynamicMessage;
    type Future = BoxFuture<'static, Result<Response<DynamicMessage>, Status>>;

    fn call(&mut self, request: Request<DynamicMessage>) -> Self::Future {
        let runtime = Arc::clone(&self.0);
        Box::pin(async move {
            let input = request.into_inner();
            Ok(Response::new(runtime.unary_response(Some(&input))?))
        })
    }
}

struct ServerStreamHandler(Arc<MethodRuntime>);

impl ServerStreamingService<DynamicMessage> for ServerStreamHandler {
    type Response = DynamicMessage;
    type ResponseStream = DynamicStream;
    type Future = BoxFuture<'static, Result<Response<Self::ResponseStream>, Status>>;

    fn call(&mut self, request: Request<DynamicMessage>) -> Self::Future {
        let runtime = Arc::clone(&self.0);
        Box::pin(async move {
            runtime.check_error()?;
            let input = request.into_inner();
            Ok(Response::new(runtime.response_stream(Some(&input))))
        })
    }
}

struct ClientStreamHandler(Arc<MethodRuntime>);

impl ClientStreamingService<DynamicMessage> for ClientStreamHandler {
    type Response = DynamicMessage;
    type Future = BoxFuture<'static, Result<Response<DynamicMessage>, Status>>;

    fn call(&mut self, request: Request<Streaming<DynamicMessage>>) -> Self::Future {
        let runtime = Arc::clone(&self.0);
        Box::pin(async move {
            // Consume the whole inbound stream, then answer once; the last
            // message feeds the template context.
            let mut inbound = request.into_inner();
            let mut last = None;
            while let Some(message) = inbound.message().await? {
                last = Some(message);
            }
            Ok(Response::new(runtime.unary_response(last.as_ref())?))
        })
    }
}

struct BidiHandler(Arc<MethodRuntime>);

impl StreamingService<DynamicMessage> for BidiHandler {
    type Response = DynamicMessage;
    type ResponseStream = DynamicStream;
    type Future = BoxFuture<'static, Result<Response<Self::ResponseStream>, Status>>;

    fn call(&mut self, request: Request<Streaming<DynamicMessage>>) -> Self::Future {
        let runtime = Arc::clone(&self.0);
        Box::pin(async move {
            runtime.check_error()?;
            let values = Arc::new(runtime.stream_values());
            let delay = runtime.stream_delay();
            let inbound = request.into_inner();
            // One configured response after each input, cycling the list.
            let stream = inbound.enumerate().then(move |(index, item)| {
                let runtime = Arc::clone(&runtime);
                let values = Arc::clone(&values);
                async move {
                    let input = item?;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let value = values
                        .get(index % values.len().max(1))
                        .cloned()
                        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                    let ctx = runtime.context_from(Some(&input));
                    runtime.render_message(&value, &ctx)
                }
            });
            Ok(Response::new(Box::pin(stream) as DynamicStream))
        })
    }
}

/// The reflective mock service for one endpoint
#[derive(Clone)]
pub struct MockGrpcService {
    schema: GrpcSchema,
    methods: Arc<HashMap<String, GrpcMethodMock>>,
}

impl MockGrpcService {
    /// Build from a compiled schema and the endpoint's method map
    pub fn new(schema: GrpcSchema, endpoint: &GrpcEndpoint) -> Self {
        Self {
            schema,
            methods: Arc::new(endpoint.methods.clone()),
        }
    }

    /// Configured behavior for `service/method`, by full or short key
    fn behavior(&self, service: &str, method: &str) -> Option<GrpcMethodMock> {
        let short = service.rsplit('.').next().unwrap_or(service);
        [
            format!("{service}/{method}"),
            format!("{service}.{method}"),
            format!("{short}/{method}"),
            format!("{short}.{method}"),
        ]
        .iter()
        .find_map(|key| self.methods.get(key).cloned())
    }

    /// Handle one RPC
    pub async fn dispatch(
        &self,
        req: http::Request<axum::body::Body>,
    ) -> http::Response<axum::body::Body> {
        let path = req.uri().path().to_string();
        let mut parts = path.trim_start_matches('/').splitn(2, '/');
        let (Some(service), Some(method)) = (parts.next(), parts.next()) else {
            return status_response(&Status::unimplemented("malformed rpc path"));
        };

        let Some(descriptor) = self.schema.method(service, method) else {
            debug!(%service, %method, "unknown rpc");
            return status_response(&Status::unimplemented(format!(
                "unknown method {service}/{method}"
            )));
        };
        let Some(mock) = self.behavior(service, method) else {
            debug!(%service, %method, "rpc not configured");
            return status_response(&Status::unimplemented(format!(
                "method {service}/{method} is not configured"
            )));
        };

        let runtime = Arc::new(MethodRuntime {
            descriptor: descriptor.clone(),
            mock,
        });
        let codec = DynamicCodec::new(descriptor.input(), descriptor.output());
        let mut grpc = Grpc::new(codec);

        let response = match (descriptor.is_client_streaming(), descriptor.is_server_streaming()) {
            (false, false) => grpc.unary(UnaryHandler(runtime), req).await,
            (false, true) => grpc.server_streaming(ServerStreamHandler(runtime), req).await,
            (true, false) => grpc.client_streaming(ClientStreamHandler(runtime), req).await,
            (true, true) => grpc.streaming(BidiHandler(runtime), req).await,
        };
        response.map(axum::body::Body::new)
    }
}

/// Trailers-only gRPC error response
fn status_response(status: &Status) -> http::Response<axum::body::Body> {
    let mut builder = http::Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/grpc")
        .header("grpc-status", (status.code() as i32).to_string());
    if !status.message().is_empty() {
        // Percent-encode per the gRPC HTTP/2 spec; keep it conservative.
        let encoded: String = status
            .message()
            .bytes()
            .map(|b| {
                if b.is_ascii_graphic() || b == b' ' {
                    (b as char).to_string()
                } else {
                    format!("%{b:02X}")
                }
            })
            .collect();
        builder = builder.header("grpc-message", encoded);
    }
    builder
        .body(axum::body::Body::empty())
        .unwrap_or_else(|_| http::Response::new(axum::body::Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_map_to_codes() {
        assert_eq!(code_from_name("NOT_FOUND"), Code::NotFound);
        assert_eq!(code_from_name("permission_denied"), Code::PermissionDenied);
        assert_eq!(code_from_name("UNAVAILABLE"), Code::Unavailable);
        assert_eq!(code_from_name("whatever"), Code::Unknown);
    }
}
