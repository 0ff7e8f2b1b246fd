//! Parameter mapping passed to plugin methods.

/// Keyword-style parameters for a plugin method call.
///
/// A mapping, not a positional list: key order carries no meaning.
pub type Params = serde_json::Map<String, serde_json::Value>;
