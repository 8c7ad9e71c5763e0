use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct TimestampResponse {
    pub timestamp: i64,
}

/// A single item from a faction news feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewsEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub text: String,
    /// Unix timestamp (seconds) in upstream time.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsResponse {
    #[serde(default)]
    pub news: Vec<NewsEntry>,
}

/// News ids are opaque. Older API versions send them as numbers, newer ones as strings.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected a string or number id, got {other}"))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn news_ids_accept_strings_and_numbers() {
        let json = r#"{"news": [
            {"id": "abc123", "text": "one", "timestamp": 10},
            {"id": 98765, "text": "two", "timestamp": 11}
        ]}"#;
        let response: NewsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.news[0].id, "abc123");
        assert_eq!(response.news[1].id, "98765");
        let bad = r#"{"news": [{"id": null, "text": "x", "timestamp": 1}]}"#;
        assert!(serde_json::from_str::<NewsResponse>(bad).is_err());
        let empty: NewsResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.news.is_empty());
    }
}
