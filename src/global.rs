pub const LOG_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/logs");
pub const CRASH_LOG: &str = "crash.log";
pub const LATEST_LOG: &str = "latest.log";

/// Default path of the curated POI dataset, overridable via `POI_DATASET_PATH`.
pub const POI_DATASET_PATH_DEFAULT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/pois.json");

// --- Pipeline bounds ---

pub const MAX_REPAIR_ROUNDS_DEFAULT: u32 = 3;
pub const REQUEST_DEADLINE_SECS_DEFAULT: u64 = 60;
pub const MAP_CALL_TIMEOUT_SECS: u64 = 5;
pub const LLM_CALL_TIMEOUT_SECS: u64 = 30;
pub const RETRY_MAX_ATTEMPTS: u32 = 3;
pub const RETRY_BACKOFF_MS: [u64; 2] = [200, 800];

// --- Scheduling constants (minutes since midnight unless noted) ---

pub const DAY_START_MIN: i64 = 9 * 60;
pub const DAY_END_MIN: i64 = 21 * 60;
pub const LUNCH_WINDOW_MIN: (i64, i64) = (11 * 60 + 30, 13 * 60 + 30);
pub const DINNER_WINDOW_MIN: (i64, i64) = (17 * 60 + 30, 19 * 60 + 30);
pub const MEAL_DURATION_MIN: i64 = 60;

/// Activity + travel a single day may hold before spilling into the next.
pub const DAILY_ACTIVITY_BUDGET_MIN: i64 = 8 * 60;
/// Wall-clock ceiling checked by the validator.
pub const MAX_DAY_WALL_CLOCK_MIN: i64 = 12 * 60;
/// Travel share of wall-clock above which a day is flagged.
pub const MAX_TRAVEL_SHARE: f64 = 0.35;

pub const SECURITY_BUFFER_PEAK_MIN: i64 = 30;
pub const SECURITY_BUFFER_RESERVATION_MIN: i64 = 15;
pub const PEAK_BUFFER_FACTOR: f64 = 1.5;
pub const PEAK_WINDOW_DAYS: i64 = 7;

pub const MIN_LEG_TRAVEL_MIN: i64 = 1;
pub const MAX_LEG_TRAVEL_MIN: i64 = 180;

/// Radius for same-theme replacement of a closed POI.
pub const REPLACEMENT_RADIUS_KM: f64 = 2.0;
/// A substitute must sit at no more than this fraction of the current leg.
pub const SUBSTITUTE_DISTANCE_FACTOR: f64 = 0.6;

// --- Budget constants ---

pub const FOOD_MIN_PER_PERSON_PER_DAY_DEFAULT: f64 = 60.0;
/// Tolerance before a plan is flagged over budget.
pub const OVER_BUDGET_TOLERANCE: f64 = 1.05;
/// Fraction of the feasible minimum below which a budget is unrealistic.
pub const BUDGET_UNREALISTIC_FACTOR: f64 = 0.85;

// --- Shared resource defaults ---

pub const CACHE_CAPACITY: usize = 10_000;
pub const CACHE_TTL_SECS: u64 = 3600;
pub const RATE_LIMIT_MAX_DEFAULT: u32 = 30;
pub const RATE_LIMIT_WINDOW_SECS_DEFAULT: u64 = 60;

/// How many POI source calls the retriever may have in flight at once.
pub const RETRIEVER_FANOUT: usize = 4;
