use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use schema::SkillResponse;

use crate::{
    api::{ContainerLocation, SkillContext},
    config::ServiceConfig,
    error::SkillError,
    handle_skill_request,
};

mod authz;
mod http;
mod request;
mod routes;
mod server_runtime;
#[cfg(test)]
mod tests;

pub(crate) use authz::{FUNCTION_KEY_HEADER, FUNCTION_KEY_QUERY};
pub(crate) use http::{HttpRequest, HttpResponse};
pub(crate) use routes::handle_request;
#[cfg(feature = "async-transport")]
pub(crate) use routes::{SkillCall, handle_skill_call};

use request::RequestHead;

pub(crate) type SharedRuntime = Arc<SkillRuntime>;
pub(crate) const MAX_HTTP_BODY_BYTES: usize = 16 * 1024 * 1024;
const SOCKET_TIMEOUT_SECS: u64 = 5;
const SKILL_ROUTE_PREFIX: &str = "/api/";

/// Everything a request needs: the skill identity, the container it
/// addresses blobs under and the service counters. Shared read-only
/// between transport workers.
pub struct SkillRuntime {
    skill: SkillContext,
    container: ContainerLocation,
    function_key: Option<String>,
    requests_total: AtomicU64,
    malformed_requests_total: AtomicU64,
    unauthorized_total: AtomicU64,
    backpressure_rejected_total: AtomicU64,
    records_enriched_total: AtomicU64,
    record_errors_total: AtomicU64,
    record_warnings_total: AtomicU64,
    started_at: Instant,
}

impl SkillRuntime {
    pub fn new(skill: SkillContext, container: ContainerLocation) -> Self {
        Self {
            skill,
            container,
            function_key: None,
            requests_total: AtomicU64::new(0),
            malformed_requests_total: AtomicU64::new(0),
            unauthorized_total: AtomicU64::new(0),
            backpressure_rejected_total: AtomicU64::new(0),
            records_enriched_total: AtomicU64::new(0),
            record_errors_total: AtomicU64::new(0),
            record_warnings_total: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            SkillContext::new(config.skill_name.clone()),
            config.container.clone(),
        )
        .with_function_key(config.function_key.clone())
    }

    pub fn with_function_key(mut self, function_key: Option<String>) -> Self {
        self.function_key = function_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub fn skill(&self) -> &SkillContext {
        &self.skill
    }

    pub fn container(&self) -> &ContainerLocation {
        &self.container
    }

    pub fn skill_route(&self) -> String {
        format!("{SKILL_ROUTE_PREFIX}{}", self.skill.name())
    }

    /// Route names are matched case-insensitively, like the function host.
    pub(crate) fn accepts_skill_name(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(self.skill.name())
    }

    fn is_skill_path(&self, path: &str) -> bool {
        path.strip_prefix(SKILL_ROUTE_PREFIX)
            .map(|name| name.trim_end_matches('/'))
            .is_some_and(|name| self.accepts_skill_name(name))
    }

    fn function_key(&self) -> Option<&str> {
        self.function_key.as_deref()
    }

    fn process(&self, body: &[u8]) -> Result<SkillResponse, SkillError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        match handle_skill_request(&self.skill, &self.container, body) {
            Ok(response) => {
                let mut errors = 0;
                let mut warnings = 0;
                for record in &response.values {
                    errors += record.errors.len() as u64;
                    warnings += record.warnings.len() as u64;
                }
                self.records_enriched_total
                    .fetch_add(response.values.len() as u64, Ordering::Relaxed);
                self.record_errors_total.fetch_add(errors, Ordering::Relaxed);
                self.record_warnings_total
                    .fetch_add(warnings, Ordering::Relaxed);
                Ok(response)
            }
            Err(err) => {
                self.malformed_requests_total
                    .fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    fn observe_unauthorized(&self) {
        self.unauthorized_total.fetch_add(1, Ordering::Relaxed);
    }

    fn observe_backpressure_rejection(&self) {
        self.backpressure_rejected_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn metrics_text(&self) -> String {
        format!(
            "# TYPE label_skill_requests_total counter\n\
label_skill_requests_total {}\n\
# TYPE label_skill_malformed_requests_total counter\n\
label_skill_malformed_requests_total {}\n\
# TYPE label_skill_unauthorized_total counter\n\
label_skill_unauthorized_total {}\n\
# TYPE label_skill_backpressure_rejected_total counter\n\
label_skill_backpressure_rejected_total {}\n\
# TYPE label_skill_records_enriched_total counter\n\
label_skill_records_enriched_total {}\n\
# TYPE label_skill_record_errors_total counter\n\
label_skill_record_errors_total {}\n\
# TYPE label_skill_record_warnings_total counter\n\
label_skill_record_warnings_total {}\n\
# TYPE label_skill_uptime_seconds gauge\n\
label_skill_uptime_seconds {:.4}\n",
            self.requests_total.load(Ordering::Relaxed),
            self.malformed_requests_total.load(Ordering::Relaxed),
            self.unauthorized_total.load(Ordering::Relaxed),
            self.backpressure_rejected_total.load(Ordering::Relaxed),
            self.records_enriched_total.load(Ordering::Relaxed),
            self.record_errors_total.load(Ordering::Relaxed),
            self.record_warnings_total.load(Ordering::Relaxed),
            self.started_at.elapsed().as_secs_f64()
        )
    }
}

pub fn serve_http_with_workers(
    runtime: SkillRuntime,
    bind_addr: &str,
    worker_count: usize,
) -> std::io::Result<()> {
    server_runtime::serve_http_with_workers(Arc::new(runtime), bind_addr, worker_count)
}

/// Runs one raw HTTP/1.1 request through the router without a socket. The
/// head is held to the same limits as a socket request.
pub fn handle_http_request_bytes(
    runtime: &Arc<SkillRuntime>,
    raw_request: &[u8],
) -> Result<Vec<u8>, String> {
    let request_text =
        std::str::from_utf8(raw_request).map_err(|_| "request must be valid UTF-8".to_string())?;
    let (head_block, body) = request_text
        .split_once("\r\n\r\n")
        .ok_or_else(|| "missing HTTP header terminator".to_string())?;

    let mut lines = head_block.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| "missing request line".to_string())?;
    let head = RequestHead::parse(request_line, lines).map_err(|err| err.to_string())?;
    if head.content_length != body.len() {
        return Err("content-length does not match body size".to_string());
    }

    let request = head.with_body(body.as_bytes().to_vec());
    let response = handle_request(runtime, &request);
    Ok(http::render_response_text(&response).into_bytes())
}
