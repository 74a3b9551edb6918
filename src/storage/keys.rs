//! Well-known storage keys shared by every execution context.

/// `bool` in local storage; absent means enabled.
pub const EXTENSION_ENABLED: &str = "extensionEnabled";
/// Extension state blob (enabled flag, filter level, theme, ...), local.
pub const EXTENSION_STATE: &str = "extensionState";
/// Persisted scan configuration, local.
pub const SCAN_CONFIG: &str = "scanConfig";
/// Bearer token of the signed-in user, local.
pub const AUTH_TOKEN: &str = "authToken";
/// Cached user profile, local.
pub const USER: &str = "user";
pub const IS_AUTHENTICATED: &str = "isAuthenticated";

// Aggregate counters (sync)
pub const TOTAL_BLOCKED: &str = "totalBlocked";
pub const TODAY_BLOCKED: &str = "todayBlocked";
pub const WEEKLY_BLOCKED: &str = "weeklyBlocked";

// Preferences (sync)
pub const FILTERS: &str = "filters";
pub const CONTENT_TYPES: &str = "contentTypes";
pub const BLACKLIST: &str = "blacklist";
pub const LANGUAGE: &str = "language";
pub const THEME: &str = "theme";

// Onboarding (local)
pub const ONBOARDING_STATE: &str = "onboardingState";
pub const HAS_COMPLETED_ONBOARDING: &str = "hasCompletedOnboarding";
