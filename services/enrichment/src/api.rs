/// Per-request execution context supplied by the host. The skill name is
/// what the indexer addressed and what diagnostics are prefixed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillContext {
    skill_name: String,
}

impl SkillContext {
    pub fn new(skill_name: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.skill_name
    }
}

/// Root URI of the blob container that enriched images are addressed under.
/// Resolved once at startup and shared read-only across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLocation {
    base_uri: String,
}

impl ContainerLocation {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }
}
