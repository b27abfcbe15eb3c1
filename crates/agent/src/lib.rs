//! The Escapist agents.
//!
//! One generic [`ControlLoop`] drives every agent:
//!
//! 1. **Send** the system prompt, conversation and tool schemas to the model
//! 2. **If tool calls**: run them in order, append the results, go to 1
//! 3. **If rate limited**: back off and retry, up to the configured bound
//! 4. **Otherwise**: the last message is the answer
//!
//! The [`Guide`], [`Reservationist`] and [`Planner`] are that loop with a
//! different prompt and tool table. The planner's tools run the other two
//! as nested loops.

pub mod backoff;
pub mod guide;
pub mod loop_runner;
pub mod orchestrator_tools;
pub mod planner;
pub mod reservationist;

#[cfg(test)]
mod test_helpers;

pub use backoff::Backoff;
pub use guide::{Guide, GuideReport, guide_query};
pub use loop_runner::{ControlLoop, LoopOutcome, LoopSettings, LoopState, RetryState};
pub use orchestrator_tools::{AvailabilityTool, RecommendationsTool};
pub use planner::{Planner, TripRequest, itinerary_filename, save_itinerary};
pub use reservationist::{BookingAvailability, Reservationist, TimeSlot, availability_query};
