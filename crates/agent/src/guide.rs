//! The guide: a local escape room expert backed by the directory search tool.

use escapist_core::message::Conversation;
use escapist_core::provider::{Provider, ToolDefinition};
use escapist_core::tool::ToolRegistry;
use escapist_tools::{DirectorySearchTool, Listing};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::loop_runner::{ControlLoop, LoopOutcome, LoopSettings};

pub const GUIDE_SYSTEM_PROMPT: &str = "You are an enthusiastic local escape room guide who knows \
the escape room scene well. Your job is to help people find the right rooms for their group.

When asked about escape rooms in a region, call the search_escape_rooms tool to get current \
listings. Then study the results and recommend rooms that fit:

- Group size
- Experience level and preferred difficulty
- Themes and interests (horror, mystery, adventure and so on)
- Time constraints and scheduling preferences
- Budget

When recommending:
1. Favour rooms with strong community scores (\"Overwhelmingly Positive\" or \"Very Positive\")
2. Call out award-winning rooms
3. Mention when a room is scary or has an age restriction
4. Give practical details such as player range and duration
5. Name the company and the room, and give the booking URL
6. Recommend between 10 and 30 rooms when the listings allow it
7. Every recommendation must include the room name and its URL
";

/// The opening user message for a recommendation run.
pub fn guide_query(region: &str, preferences: Option<&str>) -> String {
    let mut query = format!("Find highly rated or awarded escape rooms in {region}.");
    if let Some(p) = preferences.map(str::trim).filter(|p| !p.is_empty()) {
        query.push_str(&format!(" Preferences: {p}"));
    }
    query
}

/// Forced-call tool that turns the guide's answer into records.
pub const RECORD_ROOMS_TOOL: &str = "record_recommendations";

const RECORD_ROOMS_INSTRUCTION: &str = "Record every escape room you recommended above by calling \
record_recommendations. Copy the details from the search results and leave out any field you do not know.";

pub fn record_rooms_definition() -> ToolDefinition {
    let room = json!({
        "type": "object",
        "properties": {
            "company_name": { "type": "string", "description": "The escape room company" },
            "name": { "type": "string", "description": "The room name" },
            "description": { "type": "string" },
            "url": { "type": "string", "description": "Booking URL" },
            "address": { "type": "string" },
            "rating_bucket": { "type": "string", "description": "Community score, e.g. 'Overwhelmingly Positive'" },
            "has_awards": { "type": "boolean" },
            "is_scary": { "type": "boolean" },
            "latitude": { "type": "number" },
            "longitude": { "type": "number" },
            "duration_minutes": { "type": "integer" },
            "players_min": { "type": "integer" },
            "players_max": { "type": "integer" },
            "difficulty": { "type": "string" }
        },
        "required": ["name", "url"]
    });
    ToolDefinition {
        name: RECORD_ROOMS_TOOL.into(),
        description: "Record the recommended escape rooms as structured data.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "escape_rooms": { "type": "array", "items": room }
            },
            "required": ["escape_rooms"]
        }),
    }
}

/// Rooms named in a `record_recommendations` call. Entries that do not fit
/// the listing shape are skipped.
pub fn rooms_from_arguments(arguments: &Value) -> Vec<Listing> {
    let Some(items) = arguments.get("escape_rooms").and_then(Value::as_array) else {
        warn!(agent = "guide", "Recorded recommendations carry no escape_rooms list");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Listing>(item.clone()) {
            Ok(room) => Some(room),
            Err(e) => {
                warn!(agent = "guide", error = %e, "Skipping malformed recorded room");
                None
            }
        })
        .collect()
}

/// Recommendation text together with the rooms it names.
#[derive(Debug, Clone)]
pub struct GuideReport {
    pub text: String,
    pub rooms: Vec<Listing>,
    /// The run ended on the rate-limit message; no rooms were extracted
    pub rate_limited: bool,
}

pub struct Guide {
    control: ControlLoop,
}

impl Guide {
    pub fn new(provider: Arc<dyn Provider>, settings: LoopSettings, search: DirectorySearchTool) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(search));
        Self {
            control: ControlLoop::new("guide", provider, settings, GUIDE_SYSTEM_PROMPT, Arc::new(tools)),
        }
    }

    pub async fn run(&self, region: &str, preferences: Option<&str>) -> escapist_core::Result<LoopOutcome> {
        info!(agent = "guide", region, preferences = preferences.unwrap_or(""), "Getting recommendations");
        self.control
            .run(Conversation::from_user(guide_query(region, preferences)))
            .await
    }

    /// Recommendation text for `region`.
    pub async fn recommend(&self, region: &str, preferences: Option<&str>) -> escapist_core::Result<String> {
        let outcome = self.run(region, preferences).await?;
        info!(agent = "guide", chars = outcome.text.len(), "Recommendations ready");
        Ok(outcome.text)
    }

    /// Recommendations plus one forced `record_recommendations` call that
    /// extracts them as listing records.
    pub async fn recommend_structured(
        &self,
        region: &str,
        preferences: Option<&str>,
    ) -> escapist_core::Result<GuideReport> {
        let outcome = self.run(region, preferences).await?;
        if outcome.retry.rate_limited {
            return Ok(GuideReport {
                text: outcome.text,
                rooms: Vec::new(),
                rate_limited: true,
            });
        }

        let rooms = self
            .control
            .force_tool(&outcome.conversation, RECORD_ROOMS_INSTRUCTION, record_rooms_definition())
            .await?
            .map(|arguments| rooms_from_arguments(&arguments))
            .unwrap_or_default();
        info!(agent = "guide", rooms = rooms.len(), "Structured recommendations ready");

        Ok(GuideReport {
            text: outcome.text,
            rooms,
            rate_limited: false,
        })
    }
}
