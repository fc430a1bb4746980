pub(crate) const FUNCTION_KEY_HEADER: &str = "x-functions-key";
pub(crate) const FUNCTION_KEY_QUERY: &str = "code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AuthDecision {
    Allowed,
    Unauthorized(&'static str),
}

/// With no key configured every caller is allowed. Callers pick the presented
/// key from the header first and the `code` query parameter second.
pub(super) fn authorize_function_key(
    presented_key: Option<&str>,
    required_key: Option<&str>,
) -> AuthDecision {
    let Some(required_key) = required_key else {
        return AuthDecision::Allowed;
    };
    match presented_key {
        None => AuthDecision::Unauthorized("missing function key"),
        Some(presented) if keys_match(presented, required_key) => AuthDecision::Allowed,
        Some(_) => AuthDecision::Unauthorized("invalid function key"),
    }
}

/// Compares every byte so the time taken does not reveal the matching prefix.
fn keys_match(presented: &str, required: &str) -> bool {
    let (presented, required) = (presented.as_bytes(), required.as_bytes());
    presented.len() == required.len()
        && presented
            .iter()
            .zip(required)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}
