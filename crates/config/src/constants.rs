//! Centralized constants for the decision layer
//!
//! Single source of truth for breaker names, default thresholds and the
//! fixed fallback decisions, so the engine, the server and the tests agree.

/// Registered breaker names
pub mod breakers {
    /// Top-level breaker around `make_decision`
    pub const DECISION_ENGINE: &str = "decision_engine";
    pub const CONVERSION: &str = "prediction.conversion";
    pub const OBJECTIONS: &str = "prediction.objections";
    pub const NEEDS: &str = "prediction.needs";

    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_RECOVERY_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
    pub const DEFAULT_HALF_OPEN_MAX_CALLS: u32 = 3;

    /// Predictor breakers trip a little earlier than the engine breaker
    pub const PREDICTOR_FAILURE_THRESHOLD: u32 = 3;
    pub const PREDICTOR_RECOVERY_TIMEOUT_SECS: u64 = 15;

    /// Call-duration samples kept per breaker
    pub const DURATION_HISTORY: usize = 100;
}

/// Decision engine defaults
pub mod decision {
    pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
    pub const DEFAULT_MAX_RETRIES: u32 = 1;

    /// Confidence attached to every fast-mode decision
    pub const FAST_MODE_CONFIDENCE: f32 = 0.7;

    pub const DEFAULT_CONVERSION_PROBABILITY: f32 = 0.5;
}

/// Fixed fallback decisions
pub mod fallback {
    pub const TIMEOUT_ACTION: &str = "continue_conversation";
    pub const TIMEOUT_CONFIDENCE: f32 = 0.5;
    pub const TIMEOUT_URGENCY: u8 = 5;

    pub const ERROR_ACTION: &str = "build_rapport";
    pub const ERROR_CONFIDENCE: f32 = 0.4;
    pub const ERROR_URGENCY: u8 = 3;
}

/// Decision cache defaults
pub mod cache {
    pub const DEFAULT_MAX_ENTRIES: usize = 1000;
    /// Most recent messages folded into the fingerprint
    pub const DEFAULT_MESSAGE_WINDOW: usize = 5;
    pub const DEFAULT_MESSAGE_TRUNCATE_CHARS: usize = 200;
}

/// Strategy weight bounds
pub mod strategy {
    pub const MIN_WEIGHT: f32 = 0.5;
    pub const MAX_WEIGHT: f32 = 2.0;
    pub const REWARD_FACTOR: f32 = 1.1;
    pub const PENALTY_FACTOR: f32 = 0.9;
    pub const HIGH_PERFORMANCE: f32 = 0.7;
    pub const LOW_PERFORMANCE: f32 = 0.3;
}
