//! The planner: orchestrates the guide and the reservationist into a
//! day-by-day itinerary.

use chrono::{Days, NaiveDate};
use escapist_config::PlannerConfig;
use escapist_core::message::Conversation;
use escapist_core::provider::Provider;
use escapist_core::tool::ToolRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::guide::Guide;
use crate::loop_runner::{ControlLoop, LoopOutcome, LoopSettings};
use crate::orchestrator_tools::{AvailabilityTool, RecommendationsTool};
use crate::reservationist::Reservationist;

pub const PLANNER_SYSTEM_PROMPT: &str = "You are an expert escape room trip planner who builds \
exciting, well organised multi-day escape room adventures.

1. GATHER RECOMMENDATIONS
   - Use get_escape_room_recommendations to find the best rooms in the target region.
   - Aim for a variety of themes (horror, mystery, adventure, sci-fi).
   - Balance difficulty for the group and favour highly rated, award-winning rooms.

2. CHECK AVAILABILITY
   - Use check_room_availability to verify time slots for your top picks.
   - Check one room at a time.
   - If a room has no availability, note it and move on to an alternative.

3. BUILD THE ITINERARY
   - Plan 2 to 3 rooms per day, allowing 2 to 3 hours per room including travel.
   - Schedule between 10am and 9pm.
   - Group rooms by address to keep travel short, and leave time for meals.
   - Mix difficulty levels across the trip.
   - Only include rooms with CONFIRMED availability.

4. FORMAT
   📅 **Day N - [Date]** - [Theme for the day]

   🔐 **[TIME] - [Room Name]** @ [Venue Name]
      - Theme, difficulty, duration, players, rating
      - URL and address
      - ⭐ Awards, if any

   🍽️ **Lunch/Dinner Break**

   Finish with 💰 **Estimated Total Cost**, 📍 **Key Areas** and 💡 **Pro Tips**.

Be realistic about timing and never overschedule. Mention scary rooms and age restrictions.
";

/// What the user asked the planner for.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRequest {
    pub region: String,
    pub start_date: NaiveDate,
    pub num_days: u32,
    pub group_size: u32,
    pub preferences: Option<String>,
}

impl TripRequest {
    pub fn new(region: impl Into<String>, start_date: NaiveDate) -> Self {
        let defaults = PlannerConfig::default();
        Self {
            region: region.into(),
            start_date,
            num_days: defaults.num_days,
            group_size: defaults.group_size,
            preferences: None,
        }
    }

    pub fn with_num_days(mut self, num_days: u32) -> Self {
        self.num_days = num_days.max(1);
        self
    }

    pub fn with_group_size(mut self, group_size: u32) -> Self {
        self.group_size = group_size;
        self
    }

    pub fn with_preferences(mut self, preferences: impl Into<String>) -> Self {
        let p = preferences.into();
        self.preferences = (!p.trim().is_empty()).then_some(p);
        self
    }

    /// Last day of the trip, inclusive.
    pub fn end_date(&self) -> NaiveDate {
        let extra = u64::from(self.num_days.saturating_sub(1));
        self.start_date
            .checked_add_days(Days::new(extra))
            .unwrap_or(self.start_date)
    }

    /// The opening user message for the planner run.
    pub fn prompt(&self) -> String {
        let region = &self.region;
        let preferences = self.preferences.as_deref().unwrap_or(
            "No specific preferences - looking for a variety of highly-rated experiences",
        );
        format!(
            "Please plan a {days}-day escape room adventure in {region}.

Trip Details:
- Region: {region}
- Start Date: {start}
- End Date: {end}
- Group Size: {group} people
- Preferences: {preferences}

Please:
1. Use get_escape_room_recommendations to find the best escape rooms in {region}
2. From the recommendations, identify your top 10-15 must-do rooms
3. Use check_room_availability for each top room to find available time slots within the trip dates
4. Create a day-by-day itinerary using rooms with CONFIRMED availability
5. Include all details: times, addresses, themes, difficulty, prices

Make the itinerary engaging and practical!
",
            days = self.num_days,
            start = self.start_date,
            end = self.end_date(),
            group = self.group_size,
        )
    }
}

pub struct Planner {
    control: ControlLoop,
}

impl Planner {
    pub fn new(
        provider: Arc<dyn Provider>,
        settings: LoopSettings,
        guide: Arc<Guide>,
        reservationist: Arc<Reservationist>,
    ) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(RecommendationsTool::new(guide)));
        tools.register(Box::new(AvailabilityTool::new(reservationist)));
        Self {
            control: ControlLoop::new("planner", provider, settings, PLANNER_SYSTEM_PROMPT, Arc::new(tools)),
        }
    }

    /// Run the planner; the outcome text is the itinerary.
    pub async fn plan(&self, request: &TripRequest) -> escapist_core::Result<LoopOutcome> {
        info!(
            agent = "planner",
            region = %request.region,
            start = %request.start_date,
            end = %request.end_date(),
            num_days = request.num_days,
            group_size = request.group_size,
            "Planning trip"
        );
        let outcome = self.control.run(Conversation::from_user(request.prompt())).await?;
        info!(agent = "planner", messages = outcome.conversation.len(), "Planning complete");
        Ok(outcome)
    }
}

/// `boston_2026-02-01.md` for a Boston trip starting on 1 February 2026.
pub fn itinerary_filename(region: &str, start_date: NaiveDate) -> String {
    let slug = region.to_lowercase().replace(' ', "_").replace(',', "");
    format!("{slug}_{start_date}.md")
}

/// Write `itinerary` under `dir`, creating the directory if needed.
pub fn save_itinerary(
    dir: &Path,
    itinerary: &str,
    region: &str,
    start_date: NaiveDate,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(itinerary_filename(region, start_date));
    std::fs::write(&path, itinerary)?;
    info!(path = %path.display(), "Itinerary saved");
    Ok(path)
}
