use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Label categories
// ---------------------------------------------------------------------------

/// The closed set of classification labels the skill counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelCategory {
    HeadLamps,
    JobCarts,
    ScissorLifts,
    TaskLighting,
    Conduit,
}

impl LabelCategory {
    pub const ALL: [LabelCategory; 5] = [
        LabelCategory::HeadLamps,
        LabelCategory::JobCarts,
        LabelCategory::ScissorLifts,
        LabelCategory::TaskLighting,
        LabelCategory::Conduit,
    ];

    /// Exact, case-sensitive match against the label text produced by the
    /// classifier. Anything else is not a counted category.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "head lamps" => Some(Self::HeadLamps),
            "Job Carts" => Some(Self::JobCarts),
            "Scissor Lifts" => Some(Self::ScissorLifts),
            "Task Lighting" => Some(Self::TaskLighting),
            "Conduit" => Some(Self::Conduit),
            _ => None,
        }
    }

    /// Output field carrying this category's count.
    pub fn count_field(self) -> &'static str {
        match self {
            Self::HeadLamps => "headLampCount",
            Self::JobCarts => "jobCartCount",
            Self::ScissorLifts => "scissorLiftCount",
            Self::TaskLighting => "taskLightingCount",
            Self::Conduit => "conduitCount",
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::HeadLamps => 0,
            Self::JobCarts => 1,
            Self::ScissorLifts => 2,
            Self::TaskLighting => 3,
            Self::Conduit => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelCounts {
    slots: [u32; 5],
}

impl LabelCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, category: LabelCategory) {
        self.slots[category.slot()] += 1;
    }

    /// Counts `label` if it names a category; returns whether it did.
    pub fn observe_label(&mut self, label: &str) -> bool {
        match LabelCategory::from_label(label) {
            Some(category) => {
                self.increment(category);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, category: LabelCategory) -> u32 {
        self.slots[category.slot()]
    }

    pub fn total(&self) -> u32 {
        self.slots.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LabelCategory, u32)> + '_ {
        LabelCategory::ALL
            .into_iter()
            .map(|category| (category, self.get(category)))
    }
}

// ---------------------------------------------------------------------------
// Skill envelopes: the indexer's custom skill wire contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SkillRequest {
    /// `None` when the field is absent or `null`; both are malformed batches.
    #[serde(default)]
    pub values: Option<Vec<InputRecord>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    #[serde(rename = "recordId")]
    pub record_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResponse {
    pub values: Vec<OutputRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    #[serde(rename = "recordId")]
    pub record_id: String,
    pub data: Map<String, Value>,
    #[serde(default)]
    pub errors: Vec<RecordMessage>,
    #[serde(default)]
    pub warnings: Vec<RecordMessage>,
}

impl OutputRecord {
    pub fn for_input(record: &InputRecord) -> Self {
        Self {
            record_id: record.record_id.clone(),
            data: Map::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMessage {
    pub message: String,
}

impl RecordMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Enrichment payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichedImage {
    pub blob_uri: String,
    pub counts: LabelCounts,
}

impl EnrichedImage {
    /// Renders the payload into the `data` map of an output record.
    pub fn into_data(self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("blobUri".to_string(), Value::String(self.blob_uri));
        for (category, count) in self.counts.iter() {
            data.insert(category.count_field().to_string(), Value::from(count));
        }
        data
    }
}
