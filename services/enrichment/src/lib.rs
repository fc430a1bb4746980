pub mod api;
pub mod config;
pub mod error;
pub mod transport;
#[cfg(feature = "async-transport")]
pub mod transport_axum;

use rayon::prelude::*;
use schema::{
    EnrichedImage, InputRecord, LabelCounts, OutputRecord, RecordMessage, SkillRequest,
    SkillResponse,
};
use serde_json::Value;

use crate::api::{ContainerLocation, SkillContext};
pub use crate::error::{ConfigError, RecordError, SkillError};

const LABELS_FIELD: &str = "label";
const LABEL_TEXT_FIELD: &str = "label";
const IMAGE_URL_FIELD: &str = "image_url";
const PATH_SEPARATORS: [char; 2] = ['/', '\\'];

/// Parses a skill request body and enriches every record in it.
///
/// Only an unparseable body or a missing `values` array fails the call;
/// per-record problems are reported on the corresponding output record.
pub fn handle_skill_request(
    skill: &SkillContext,
    container: &ContainerLocation,
    body: &[u8],
) -> Result<SkillResponse, SkillError> {
    tracing::info!(skill = skill.name(), body_bytes = body.len(), "skill request received");
    let records = parse_request_records(skill, body)?;
    let response = process_request_records(&records, container.base_uri());
    tracing::debug!(
        skill = skill.name(),
        records = response.values.len(),
        failed = response.values.iter().filter(|r| !r.is_success()).count(),
        "skill request processed"
    );
    Ok(response)
}

pub fn parse_request_records(
    skill: &SkillContext,
    body: &[u8],
) -> Result<Vec<InputRecord>, SkillError> {
    let malformed = || SkillError::MalformedRequest {
        skill_name: skill.name().to_string(),
    };
    let request: SkillRequest = serde_json::from_slice(body).map_err(|err| {
        tracing::debug!(skill = skill.name(), %err, "skill request body rejected");
        malformed()
    })?;
    request.values.ok_or_else(malformed)
}

/// Enriches records independently and returns them in input order.
pub fn process_request_records(records: &[InputRecord], container_base_uri: &str) -> SkillResponse {
    let values = records
        .par_iter()
        .map(|record| enrich_record(record, container_base_uri))
        .collect();
    SkillResponse { values }
}

pub fn enrich_record(record: &InputRecord, container_base_uri: &str) -> OutputRecord {
    let mut output = OutputRecord::for_input(record);

    let (counts, label_warning) = tally_labels(record.data.get(LABELS_FIELD));
    if let Some(warning) = label_warning {
        output.warnings.push(RecordMessage::new(warning));
    }

    match derive_blob_uri(record.data.get(IMAGE_URL_FIELD), container_base_uri) {
        Ok(blob_uri) => {
            tracing::trace!(
                record_id = %record.record_id,
                labels_counted = counts.total(),
                "record enriched"
            );
            output.data = EnrichedImage { blob_uri, counts }.into_data();
        }
        Err(err) => {
            tracing::warn!(record_id = %record.record_id, %err, "record enrichment failed");
            output.data = EnrichedImage::default().into_data();
            output.errors.push(RecordMessage::new(err.to_string()));
        }
    }
    output
}

/// Counts the recognized categories in a `label` array. A missing or null
/// array counts nothing; any other non-array shape also counts nothing but
/// yields a warning for the record.
pub fn tally_labels(labels: Option<&Value>) -> (LabelCounts, Option<String>) {
    let mut counts = LabelCounts::new();
    match labels {
        None | Some(Value::Null) => (counts, None),
        Some(Value::Array(entries)) => {
            for entry in entries {
                if let Some(label) = entry.get(LABEL_TEXT_FIELD).and_then(Value::as_str) {
                    counts.observe_label(label);
                }
            }
            (counts, None)
        }
        Some(other) => (
            counts,
            Some(format!(
                "\"{LABELS_FIELD}\" must be an array of label objects, found {}",
                json_kind(other)
            )),
        ),
    }
}

pub fn derive_blob_uri(
    image_url: Option<&Value>,
    container_base_uri: &str,
) -> Result<String, RecordError> {
    let image_url = match image_url {
        Some(Value::String(url)) => url.as_str(),
        None | Some(Value::Null) => return Err(RecordError::MissingImageUrl),
        Some(other) => {
            return Err(RecordError::ImageUrlNotString {
                found: json_kind(other),
            });
        }
    };
    let location = blob_location(image_url).ok_or_else(|| RecordError::InvalidImageUrl {
        image_url: image_url.to_string(),
    })?;
    Ok(combine_url(container_base_uri, &location))
}

/// `parentFolder/fileName` taken from the last two segments of an image path.
pub fn blob_location(image_url: &str) -> Option<String> {
    let (rest, file_name) = image_url.rsplit_once(PATH_SEPARATORS)?;
    if file_name.is_empty() {
        return None;
    }
    let rest = rest.trim_end_matches(PATH_SEPARATORS);
    let parent_folder = rest.rsplit(PATH_SEPARATORS).next().unwrap_or(rest);
    if parent_folder.is_empty() {
        return None;
    }
    Some(format!("{parent_folder}/{file_name}"))
}

/// Joins two URL parts with exactly one `/`. Neither part is re-encoded.
pub fn combine_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{path}"),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
