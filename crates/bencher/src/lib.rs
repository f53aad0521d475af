//! Shared inputs for the junction benchmarks.

use serde_json::{json, Value};

/// Route paths exercising static, numbered and `{name}` segments.
pub fn sample_paths(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("/api/resource{i}/{{id}}/")).collect()
}

/// A nested payload roughly the shape of a typical API response.
pub fn sample_payload() -> Value {
    json!({
        "id": 42,
        "name": "sample",
        "tags": ["alpha", "beta", "gamma"],
        "nested": {
            "created": "2026-01-01T00:00:00Z",
            "counts": [1, 2, 3, 5, 8, 13],
            "flags": { "active": true, "archived": false }
        }
    })
}
