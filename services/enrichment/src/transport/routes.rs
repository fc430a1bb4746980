use super::{
    FUNCTION_KEY_HEADER, FUNCTION_KEY_QUERY, HttpRequest, HttpResponse, SkillRuntime,
    authz::{AuthDecision, authorize_function_key},
    request::split_target,
};
use crate::error::SkillError;

/// The parts of a skill invocation that matter once routing is done. Both
/// transports build one from their own request representation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SkillCall<'a> {
    pub(crate) function_key: Option<&'a str>,
    pub(crate) content_type: Option<&'a str>,
    pub(crate) body: &'a [u8],
}

pub(crate) fn handle_request(runtime: &SkillRuntime, request: &HttpRequest) -> HttpResponse {
    let (path, query) = split_target(&request.target);
    match (request.method.as_str(), path.as_str()) {
        ("GET", "/health") => HttpResponse::health(),
        ("GET", "/metrics") => HttpResponse::ok_metrics(runtime.metrics_text()),
        (_, "/health") | (_, "/metrics") => {
            HttpResponse::method_not_allowed("only GET is supported")
        }
        ("GET" | "POST", path) if runtime.is_skill_path(path) => {
            let call = SkillCall {
                function_key: request
                    .headers
                    .get(FUNCTION_KEY_HEADER)
                    .or_else(|| query.get(FUNCTION_KEY_QUERY))
                    .map(String::as_str),
                content_type: request.headers.get("content-type").map(String::as_str),
                body: &request.body,
            };
            handle_skill_call(runtime, call)
        }
        (_, path) if runtime.is_skill_path(path) => {
            HttpResponse::method_not_allowed("only GET and POST are supported")
        }
        _ => HttpResponse::not_found("unknown path"),
    }
}

pub(crate) fn handle_skill_call(runtime: &SkillRuntime, call: SkillCall<'_>) -> HttpResponse {
    if let AuthDecision::Unauthorized(reason) =
        authorize_function_key(call.function_key, runtime.function_key())
    {
        runtime.observe_unauthorized();
        tracing::warn!(skill = runtime.skill().name(), reason, "skill request denied");
        return HttpResponse::unauthorized(reason);
    }
    if let Some(content_type) = call.content_type
        && !content_type
            .to_ascii_lowercase()
            .contains("application/json")
    {
        return HttpResponse::bad_request(&format!(
            "content-type must include application/json for {}",
            runtime.skill_route()
        ));
    }

    match runtime.process(call.body) {
        Ok(response) => match serde_json::to_string(&response) {
            Ok(body) => HttpResponse::ok_json(body),
            Err(err) => {
                tracing::error!(%err, "failed to serialize skill response");
                HttpResponse::internal_server_error("failed to serialize skill response")
            }
        },
        Err(err @ SkillError::MalformedRequest { .. }) => {
            HttpResponse::bad_request_text(&err.to_string())
        }
    }
}
