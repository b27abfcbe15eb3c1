//! The guide and the reservationist, wrapped as tools for the planner.
//!
//! Each call runs a complete nested control loop and hands its final text
//! back as the tool result. A failed nested run becomes error text; it never
//! aborts the planner.

use async_trait::async_trait;
use escapist_core::error::ToolError;
use escapist_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tracing::{info, warn};

use crate::guide::Guide;
use crate::reservationist::Reservationist;

fn required<'a>(arguments: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    arguments[name]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{name}' argument")))
}

/// `get_escape_room_recommendations`
pub struct RecommendationsTool {
    guide: Arc<Guide>,
}

impl RecommendationsTool {
    pub fn new(guide: Arc<Guide>) -> Self {
        Self { guide }
    }
}

#[async_trait]
impl Tool for RecommendationsTool {
    fn name(&self) -> &str {
        "get_escape_room_recommendations"
    }

    fn description(&self) -> &str {
        "Get escape room recommendations for a region from the local guide. Returns room \
         details, ratings, awards and booking URLs."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "region": {
                    "type": "string",
                    "description": "The city or region to search (e.g., \"Boston\", \"Los Angeles\")"
                },
                "preferences": {
                    "type": "string",
                    "description": "Optional preferences such as difficulty, themes or group size"
                }
            },
            "required": ["region"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let region = required(&arguments, "region")?;
        let preferences = arguments["preferences"].as_str();

        info!(agent = "planner", tool = self.name(), region, "Delegating to guide");
        match self.guide.recommend(region, preferences).await {
            Ok(text) => Ok(ToolResult::ok(text)),
            Err(e) => {
                warn!(agent = "planner", region, error = %e, "Guide run failed");
                Ok(ToolResult::failure(format!(
                    "Error getting recommendations for {region}: {e}"
                )))
            }
        }
    }
}

/// `check_room_availability`
pub struct AvailabilityTool {
    reservationist: Arc<Reservationist>,
}

impl AvailabilityTool {
    pub fn new(reservationist: Arc<Reservationist>) -> Self {
        Self { reservationist }
    }
}

#[async_trait]
impl Tool for AvailabilityTool {
    fn name(&self) -> &str {
        "check_room_availability"
    }

    fn description(&self) -> &str {
        "Check booking availability for one escape room. Returns open time slots on the \
         target date and the days after it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The escape room website URL"
                },
                "room_name": {
                    "type": "string",
                    "description": "The name of the specific escape room"
                },
                "target_date": {
                    "type": "string",
                    "description": "Target date in YYYY-MM-DD format"
                }
            },
            "required": ["url", "room_name", "target_date"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let url = required(&arguments, "url")?;
        let room_name = required(&arguments, "room_name")?;
        let target_date = required(&arguments, "target_date")?;

        info!(agent = "planner", tool = self.name(), room = room_name, "Delegating to reservationist");
        match self.reservationist.check_availability(url, room_name, target_date).await {
            Ok(record) if record.error.is_some() => Ok(ToolResult::failure(record.render())),
            Ok(record) => Ok(ToolResult::ok(record.render())),
            Err(e) => {
                warn!(agent = "planner", room = room_name, error = %e, "Reservationist run failed");
                Ok(ToolResult::failure(format!(
                    "Error checking availability for {room_name}: {e}"
                )))
            }
        }
    }
}
