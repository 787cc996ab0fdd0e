//! Fixture payloads standing in for the protected upstream API.
//!
//! The gateway's responsibility ends at admission; what the backend would
//! have answered is simulated with canned data.

use chrono::Utc;
use serde_json::{json, Value};

/// A canned search result page for `query`.
pub fn search_results(query: &str) -> Value {
    json!({
        "statuses": [
            {
                "id": 850007368138018817u64,
                "text": "Example status matching the search",
                "user": { "screen_name": "fixture_one" }
            },
            {
                "id": 850007368138018818u64,
                "text": "Another example status",
                "user": { "screen_name": "fixture_two" }
            }
        ],
        "search_metadata": {
            "query": query,
            "count": 2,
            "completed_in": 0.021,
            "served_at": Utc::now().to_rfc3339()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_results_echo_the_query() {
        let page = search_results("rust lang");

        assert_eq!(page["search_metadata"]["query"], "rust lang");
        assert_eq!(page["statuses"].as_array().unwrap().len(), 2);
    }
}
