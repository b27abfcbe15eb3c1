//! Flat listing records built from the directory's nested response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One escape-room offering.
///
/// Every field is optional: the directory omits whatever a venue has not
/// filled in, and a partial record is still worth recommending.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Listing {
    pub company_name: Option<String>,
    pub url: Option<String>,
    pub address: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// e.g. "Overwhelmingly Positive"
    pub rating_bucket: Option<String>,
    pub rating_count: Option<u64>,
    pub like_percent: Option<f64>,
    pub love_percent: Option<f64>,
    pub dislike_percent: Option<f64>,
    #[serde(default)]
    pub awards: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub has_awards: bool,
    #[serde(default)]
    pub is_scary: bool,
    pub duration_minutes: Option<u64>,
    pub min_age: Option<u64>,
    pub players_min: Option<u64>,
    pub players_max: Option<u64>,
    pub difficulty: Option<String>,
    pub category: Option<String>,
}

fn text(v: &Value, pointer: &str) -> Option<String> {
    match v.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(v: &Value, pointer: &str) -> Option<f64> {
    match v.pointer(pointer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn count(v: &Value, pointer: &str) -> Option<u64> {
    number(v, pointer).filter(|n| *n >= 0.0).map(|n| n.round() as u64)
}

/// The per-listing nodes, wherever the response keeps them.
///
/// Accepts `data.games.items`, relay-style `data.games.edges[].node`, or a
/// bare `data.games` array.
fn nodes(response: &Value) -> Vec<&Value> {
    let games = response.pointer("/data/games").unwrap_or(&Value::Null);
    if let Some(items) = games.get("items").and_then(Value::as_array) {
        return items.iter().collect();
    }
    if let Some(edges) = games.get("edges").and_then(Value::as_array) {
        return edges.iter().filter_map(|e| e.get("node")).collect();
    }
    games.as_array().map(|a| a.iter().collect()).unwrap_or_default()
}

impl Listing {
    fn from_node(node: &Value) -> Self {
        let awards: Vec<String> = node
            .get("awards")
            .and_then(Value::as_array)
            .map(|awards| {
                awards
                    .iter()
                    .filter_map(|a| match a {
                        Value::String(s) => Some(s.clone()),
                        other => text(other, "/description"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            company_name: text(node, "/company/name"),
            url: text(node, "/company/url"),
            address: text(node, "/location/address"),
            name: text(node, "/name"),
            description: text(node, "/description"),
            rating_bucket: text(node, "/communityScore/bucket"),
            rating_count: count(node, "/communityScore/ratingsCount"),
            like_percent: number(node, "/communityScore/likePercent"),
            love_percent: number(node, "/communityScore/lovePercent"),
            dislike_percent: number(node, "/communityScore/dislikePercent"),
            has_awards: !awards.is_empty(),
            awards,
            latitude: number(node, "/location/latitude"),
            longitude: number(node, "/location/longitude"),
            is_scary: node.get("isScary").and_then(Value::as_bool).unwrap_or(false),
            duration_minutes: count(node, "/minutes"),
            min_age: count(node, "/minAge"),
            players_min: count(node, "/playersMin"),
            players_max: count(node, "/playersMax"),
            difficulty: text(node, "/difficulty"),
            category: text(node, "/category"),
        }
    }
}

/// Flatten a raw directory response into one record per listing.
///
/// Nodes that are not objects are skipped; missing fields become `None`.
pub fn listings_from_response(response: &Value) -> Vec<Listing> {
    nodes(response)
        .into_iter()
        .filter(|n| n.is_object())
        .map(Listing::from_node)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vault() -> Value {
        json!({
            "name": "The Vault",
            "description": "Crack the safe before the guards return.",
            "minutes": 60,
            "minAge": 12,
            "playersMin": 2,
            "playersMax": 8,
            "difficulty": "Hard",
            "category": "Heist",
            "isScary": false,
            "company": { "name": "Boston Escape Co", "url": "https://bostonescape.example" },
            "location": { "address": "1 Main St, Boston, MA", "latitude": 42.5, "longitude": -71.25 },
            "communityScore": {
                "bucket": "Overwhelmingly Positive",
                "ratingsCount": 412,
                "likePercent": 12.5,
                "lovePercent": 85.0,
                "dislikePercent": 2.5
            },
            "awards": [{ "description": "TERPECA Top 50 (2023)" }]
        })
    }

    #[test]
    fn flattens_items() {
        let response = json!({ "data": { "games": { "items": [vault()] } } });
        let listings = listings_from_response(&response);

        assert_eq!(listings.len(), 1);
        let l = &listings[0];
        assert_eq!(l.company_name.as_deref(), Some("Boston Escape Co"));
        assert_eq!(l.url.as_deref(), Some("https://bostonescape.example"));
        assert_eq!(l.name.as_deref(), Some("The Vault"));
        assert_eq!(l.rating_bucket.as_deref(), Some("Overwhelmingly Positive"));
        assert_eq!(l.rating_count, Some(412));
        assert_eq!(l.love_percent, Some(85.0));
        assert_eq!(l.awards, vec!["TERPECA Top 50 (2023)".to_string()]);
        assert!(l.has_awards);
        assert!(!l.is_scary);
        assert_eq!(l.latitude, Some(42.5));
        assert_eq!(l.duration_minutes, Some(60));
        assert_eq!((l.players_min, l.players_max), (Some(2), Some(8)));
        assert_eq!(l.difficulty.as_deref(), Some("Hard"));
        assert_eq!(l.category.as_deref(), Some("Heist"));
    }

    #[test]
    fn accepts_relay_edges() {
        let response = json!({ "data": { "games": { "edges": [{ "node": vault() }, { "node": vault() }] } } });
        assert_eq!(listings_from_response(&response).len(), 2);
    }

    #[test]
    fn sparse_node_yields_partial_record() {
        let response = json!({ "data": { "games": [{ "name": "Mystery Manor", "isScary": true }, 7] } });
        let listings = listings_from_response(&response);

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].name.as_deref(), Some("Mystery Manor"));
        assert!(listings[0].is_scary);
        assert!(!listings[0].has_awards);
        assert_eq!(listings[0].url, None);
    }

    #[test]
    fn unexpected_shape_is_empty() {
        assert!(listings_from_response(&json!({ "data": null })).is_empty());
        assert!(listings_from_response(&json!("nope")).is_empty());
    }
}
