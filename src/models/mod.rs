pub mod constraints;
pub mod fingerprint;
pub mod issue;
pub mod itinerary;
pub mod poi;

pub use constraints::{Pace, TransportMode, TravelersType, TripConstraints, UserProfile};
pub use fingerprint::{RunFingerprint, RunMode};
pub use issue::{Issue, IssueCode, Severity};
pub use itinerary::{
	BudgetBreakdown, DegradeLevel, Itinerary, ItineraryDay, ScheduleItem, TimeSlot,
};
pub use poi::{FactSource, OpenHours, Poi, PoiArena};
