//! The reservationist: reads booking slots off a venue's website by driving
//! a browser through the allow-listed primitives.
//!
//! Each check launches its own browser session and always shuts it down
//! afterwards, whether the run finished, was rate limited or failed.

use escapist_core::message::Conversation;
use escapist_core::provider::Provider;
use escapist_tools::{BrowserLauncher, browser_registry};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

use crate::loop_runner::{ControlLoop, LoopSettings};

pub const RESERVATIONIST_SYSTEM_PROMPT: &str = "You are an escape room booking assistant. You \
navigate escape room websites to find open booking times.

RULES:

1. Stay on the venue's own site.
   - Never open social media links or review sites.
   - Never go to a payment processor before you have found availability.
   - Only follow links to booking or scheduling pages on the same domain.
   - If you end up somewhere else, use browser_go_back right away.

2. Work in a single tab.
   - If a new tab opens, close it with browser_tab_close and carry on in the original tab.

3. Click selectively.
   - Look for labels such as \"Book Now\", \"Book Online\", \"Reservations\", \"Schedule\", \
\"Buy Tickets\", \"Check Availability\" or \"Book This Room\".
   - Ignore \"Learn More\", \"About Us\", \"Contact\", \"FAQ\", social icons and footer links.

WORKFLOW:

Step 1: Navigate to the URL and take a snapshot to see the page structure.
Step 2: Open the booking page. Booking widgets (FareHarbor, Xola, Bookeo, Peek, Checkfront) \
often live in iframes; the snapshot still shows them.
Step 3: Select the requested room. Its listed name may differ slightly; pick the closest match.
Step 4: Open the calendar and go to the target date. If it has no availability, check the next \
3 to 5 days.
Step 5: List every available time slot with its price and group size limits when shown.
Step 6: Report the dates you checked and the slots you found, or say plainly that nothing is \
available.

If the page seems stuck, take another snapshot. If you hit a CAPTCHA or a login wall, report it \
and stop.

CLEANUP: once you have the availability (or know there is none), you are done. ALWAYS call \
browser_close as your FINAL action before you answer.
";

/// One bookable (or sold out) session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`, 24-hour
    pub time: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spots_remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// What one availability check found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingAvailability {
    pub escape_room_name: String,
    /// Only set when the venue name is actually known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_name: Option<String>,
    pub url: String,
    pub target_date: String,
    #[serde(default)]
    pub available_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub dates_checked: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BookingAvailability {
    pub fn new(url: &str, room_name: &str, target_date: &str) -> Self {
        Self {
            escape_room_name: room_name.to_string(),
            venue_name: None,
            url: url.to_string(),
            target_date: target_date.to_string(),
            available_slots: Vec::new(),
            dates_checked: Vec::new(),
            booking_notes: None,
            error: None,
        }
    }

    /// A record for a check that could not run.
    pub fn failed(url: &str, room_name: &str, target_date: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(url, room_name, target_date)
        }
    }

    /// The text handed back to the planner.
    pub fn render(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Error checking availability: {error}");
        }

        let venue = self.venue_name.as_deref().unwrap_or(&self.url);
        let mut out = format!(
            "Availability for {} at {venue}:\nTarget date: {}\n",
            self.escape_room_name, self.target_date
        );

        if self.available_slots.is_empty() {
            out.push_str("\nNo specific slots found. ");
            if let Some(notes) = &self.booking_notes {
                let _ = write!(out, "Notes: {notes}");
            }
            return out;
        }

        out.push_str("\nAvailable slots:\n");
        for slot in &self.available_slots {
            let mark = if slot.available { '✓' } else { '✗' };
            let _ = write!(out, "  {mark} {} at {}", slot.date, slot.time);
            if let Some(price) = &slot.price {
                let _ = write!(out, " - {price}");
            }
            if let Some(spots) = slot.spots_remaining.filter(|n| *n > 0) {
                let _ = write!(out, " ({spots} spots)");
            }
            out.push('\n');
        }
        out
    }
}

/// The opening user message for one check.
pub fn availability_query(url: &str, room_name: &str, target_date: &str) -> String {
    format!(
        "Please find available booking times for this escape room.

Escape room details:
- Website URL: {url}
- Room name: {room_name}
- Target date: {target_date}

Go to the website, find the booking page for \"{room_name}\" and list every available time slot \
on {target_date}. If that date has nothing, check up to 3 days after it.

Report:
- All available time slots with dates and times
- Any prices shown
- Any constraints such as group size
- Which dates you checked
"
    )
}

pub struct Reservationist {
    provider: Option<Arc<dyn Provider>>,
    settings: LoopSettings,
    launcher: Arc<dyn BrowserLauncher>,
}

impl Reservationist {
    /// `provider` is `None` when no API key is configured; checks then
    /// report the missing credential instead of running.
    pub fn new(
        provider: Option<Arc<dyn Provider>>,
        settings: LoopSettings,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            provider,
            settings,
            launcher,
        }
    }

    /// Check `room_name` at `url` around `target_date`.
    ///
    /// Browser and credential problems come back as a record with `error`
    /// set. Only an unexpected model failure is an `Err`.
    pub async fn check_availability(
        &self,
        url: &str,
        room_name: &str,
        target_date: &str,
    ) -> escapist_core::Result<BookingAvailability> {
        info!(agent = "reservationist", room = room_name, url, target_date, "Checking availability");

        let Some(provider) = self.provider.clone() else {
            return Ok(BookingAvailability::failed(
                url,
                room_name,
                target_date,
                "ANTHROPIC_API_KEY not set in environment",
            ));
        };

        let session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(e) => {
                warn!(agent = "reservationist", error = %e, "Browser host failed to start");
                return Ok(BookingAvailability::failed(url, room_name, target_date, e.to_string()));
            }
        };

        let tools = match browser_registry(session.clone()).await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(agent = "reservationist", error = %e, "Could not list browser tools");
                session.shutdown().await;
                return Ok(BookingAvailability::failed(url, room_name, target_date, e.to_string()));
            }
        };

        let control = ControlLoop::new(
            "reservationist",
            provider,
            self.settings.clone(),
            RESERVATIONIST_SYSTEM_PROMPT,
            Arc::new(tools),
        );
        let outcome = control
            .run(Conversation::from_user(availability_query(url, room_name, target_date)))
            .await;
        session.shutdown().await;
        let outcome = outcome?;

        let mut record = BookingAvailability::new(url, room_name, target_date);
        if outcome.retry.rate_limited {
            record.error = Some(outcome.text);
        } else {
            record.booking_notes = Some(outcome.text);
        }
        info!(agent = "reservationist", room = room_name, failed = record.error.is_some(), "Availability check done");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use escapist_core::error::ProviderError;
    use escapist_core::message::Role;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn slot(time: &str, available: bool) -> TimeSlot {
        TimeSlot {
            date: "2026-02-01".into(),
            time: time.into(),
            available,
            spots_remaining: None,
            price: None,
            notes: None,
        }
    }

    #[test]
    fn render_with_slots() {
        let mut record = BookingAvailability::new("https://vault.example", "The Vault", "2026-02-01");
        record.venue_name = Some("Boston Escape Co".into());
        let mut first = slot("19:00", true);
        first.price = Some("$35/person".into());
        first.spots_remaining = Some(4);
        record.available_slots = vec![first, slot("21:00", false)];

        assert_eq!(
            record.render(),
            "Availability for The Vault at Boston Escape Co:\n\
             Target date: 2026-02-01\n\
             \nAvailable slots:\n  \
             ✓ 2026-02-01 at 19:00 - $35/person (4 spots)\n  \
             ✗ 2026-02-01 at 21:00\n"
        );
    }

    #[test]
    fn render_without_slots_uses_url_and_notes() {
        let mut record = BookingAvailability::new("https://vault.example", "The Vault", "2026-02-01");
        record.booking_notes = Some("Saturday 7pm and 9pm are open.".into());
        let text = record.render();
        assert!(text.starts_with("Availability for The Vault at https://vault.example:\n"));
        assert!(text.ends_with("No specific slots found. Notes: Saturday 7pm and 9pm are open."));
    }

    #[test]
    fn render_error() {
        let record = BookingAvailability::failed("u", "r", "2026-02-01", "browser host exited");
        assert_eq!(record.render(), "Error checking availability: browser host exited");
    }

    #[test]
    fn prompt_requires_closing_the_browser() {
        assert!(RESERVATIONIST_SYSTEM_PROMPT.contains("browser_close as your FINAL action"));
        let query = availability_query("https://vault.example", "The Vault", "2026-02-01");
        assert!(query.contains("\"The Vault\""));
        assert!(query.contains("2026-02-01"));
    }

    #[tokio::test]
    async fn missing_provider_reports_error_without_launching() {
        let launcher = FakeLauncher::with(FakeBrowser::new());
        let reservationist = Reservationist::new(None, fast_settings(), launcher.clone());

        let record = reservationist
            .check_availability("https://vault.example", "The Vault", "2026-02-01")
            .await
            .unwrap();
        assert!(record.error.unwrap().contains("ANTHROPIC_API_KEY"));
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn launch_failure_reports_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let reservationist = Reservationist::new(Some(provider.clone()), fast_settings(), FakeLauncher::broken());

        let record = reservationist
            .check_availability("https://vault.example", "The Vault", "2026-02-01")
            .await
            .unwrap();
        assert!(record.error.unwrap().contains("failed to spawn npx"));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn drives_browser_and_closes_session() {
        let browser = FakeBrowser::new();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![
                tool_call("n", "browser_navigate", json!({"url": "https://vault.example"})),
                tool_call("s", "browser_snapshot", json!({})),
            ])),
            Ok(tool_call_response(vec![tool_call("c", "browser_close", json!({}))])),
            Ok(text_response("2026-02-01: 19:00 open")),
        ]));
        let reservationist =
            Reservationist::new(Some(provider.clone()), fast_settings(), FakeLauncher::with(browser.clone()));

        let record = reservationist
            .check_availability("https://vault.example", "The Vault", "2026-02-01")
            .await
            .unwrap();

        assert_eq!(record.booking_notes.as_deref(), Some("2026-02-01: 19:00 open"));
        assert!(record.error.is_none());
        assert_eq!(browser.call_names(), vec!["browser_navigate", "browser_snapshot", "browser_close"]);
        assert!(browser.shut_down.load(Ordering::SeqCst));

        // The model never sees off-list primitives.
        let requests = provider.requests();
        let offered: Vec<&str> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
        assert!(!offered.contains(&"browser_evaluate"));
        assert_eq!(requests[0].system, RESERVATIONIST_SYSTEM_PROMPT);

        let snapshot = requests[1]
            .messages
            .iter()
            .find(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some("s"))
            .unwrap();
        assert!(snapshot.content.contains("Sat 7:00 PM"));
    }

    #[tokio::test]
    async fn model_failure_still_shuts_down_browser() {
        let browser = FakeBrowser::new();
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::AuthenticationFailed(
            "bad key".into(),
        ))]));
        let reservationist = Reservationist::new(Some(provider), fast_settings(), FakeLauncher::with(browser.clone()));

        let result = reservationist
            .check_availability("https://vault.example", "The Vault", "2026-02-01")
            .await;
        assert!(result.is_err());
        assert!(browser.shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_run_sets_error() {
        let browser = FakeBrowser::new();
        let settings = fast_settings();
        let script = (0..=settings.max_retries).map(|_| Err(rate_limited())).collect();
        let provider = Arc::new(ScriptedProvider::new(script));
        let reservationist =
            Reservationist::new(Some(provider), settings.clone(), FakeLauncher::with(browser.clone()));

        let record = reservationist
            .check_availability("https://vault.example", "The Vault", "2026-02-01")
            .await
            .unwrap();
        assert_eq!(record.error.as_deref(), Some(settings.rate_limit_message.as_str()));
        assert!(browser.shut_down.load(Ordering::SeqCst));
    }
}
