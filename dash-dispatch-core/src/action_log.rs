//! Action history with pattern-based filtering and in-memory storage
//!
//! [`ActionLogMiddleware`] records every executed action in a bounded ring
//! buffer and fills in the outcome once the gateway has answered. The buffer
//! is shared, so a clone of the middleware kept outside the dispatcher can read
//! the history while actions are still running.
//!
//! # Example
//!
//! ```
//! use dash_dispatch_core::{ActionLogConfig, ActionLogMiddleware, ActionLogFilter};
//!
//! let filter = ActionLogFilter::new(Some("flip-*,toggle-*"), Some("*-status"));
//! let middleware = ActionLogMiddleware::new(ActionLogConfig::new(50, filter));
//!
//! // Hand a clone to the dispatcher, keep this one for reading
//! let for_dispatcher = middleware.clone();
//! # drop(for_dispatcher);
//! assert!(middleware.snapshot().is_empty());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::action::ActionName;
use crate::middleware::{ExecutionId, Middleware};
use crate::result::ActionResult;

/// Longest payload text kept in an entry summary
const SUMMARY_LIMIT: usize = 80;

/// Include/exclude filter over action names using glob patterns
///
/// Patterns support:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Literal text matches exactly
///
/// # Examples
///
/// - `flip-*` matches flip-resource
/// - `*-cache-*` matches get-cache-rule-status and toggle-cache-rule
/// - `get-analytics` matches only get-analytics
#[derive(Debug, Clone, Default)]
pub struct ActionLogFilter {
    /// If non-empty, only log actions matching these patterns
    pub include_patterns: Vec<String>,
    /// Exclude actions matching these patterns (applied after include)
    pub exclude_patterns: Vec<String>,
}

impl ActionLogFilter {
    /// Create a filter from comma-separated pattern strings
    ///
    /// ```
    /// use dash_dispatch_core::ActionLogFilter;
    ///
    /// let filter = ActionLogFilter::new(Some("get-*,flip-resource"), Some("get-cache-*"));
    /// assert!(filter.should_log("get-analytics"));
    /// assert!(filter.should_log("flip-resource"));
    /// assert!(!filter.should_log("get-cache-rule-status"));
    /// assert!(!filter.should_log("update-config"));
    /// ```
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Self {
        Self {
            include_patterns: include.map(split_patterns).unwrap_or_default(),
            exclude_patterns: exclude.map(split_patterns).unwrap_or_default(),
        }
    }

    /// Create a filter with specific pattern vectors
    pub fn with_patterns(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include_patterns: include,
            exclude_patterns: exclude,
        }
    }

    /// Check if an action name passes the include/exclude patterns
    pub fn should_log(&self, action_name: &str) -> bool {
        if !self.include_patterns.is_empty()
            && !self
                .include_patterns
                .iter()
                .any(|p| glob_match(p, action_name))
        {
            return false;
        }

        !self
            .exclude_patterns
            .iter()
            .any(|p| glob_match(p, action_name))
    }
}

fn split_patterns(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// How a logged action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Succeeded,
    Failed(String),
    /// The execution was dropped before the gateway answered
    Abandoned,
}

/// An entry in the action log
#[derive(Debug, Clone)]
pub struct ActionLogEntry {
    /// Execution this entry belongs to
    pub execution: ExecutionId,
    pub name: ActionName,
    /// Compact payload text, truncated
    pub summary: String,
    /// When the action started
    pub timestamp: Instant,
    /// Sequence number for ordering
    pub sequence: u64,
    /// Set once the action completes
    pub outcome: Option<ActionOutcome>,
    /// Time between start and completion
    pub duration: Option<Duration>,
}

impl ActionLogEntry {
    pub fn new(execution: ExecutionId, name: ActionName, summary: String, sequence: u64) -> Self {
        Self {
            execution,
            name,
            summary,
            timestamp: Instant::now(),
            sequence,
            outcome: None,
            duration: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }

    /// Time since this action was logged
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }

    /// Format the elapsed time for display (e.g., "2.3s", "150ms")
    pub fn elapsed_display(&self) -> String {
        format_duration(self.elapsed())
    }

    fn complete(&mut self, result: &ActionResult) {
        self.finish(match result.error_message() {
            None => ActionOutcome::Succeeded,
            Some(message) => ActionOutcome::Failed(message.to_string()),
        });
    }

    fn finish(&mut self, outcome: ActionOutcome) {
        self.duration = Some(self.timestamp.elapsed());
        self.outcome = Some(outcome);
    }
}

impl fmt::Display for ActionLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:<3} {:<22} {}", self.sequence, self.name, self.summary)?;
        match (&self.outcome, self.duration) {
            (Some(ActionOutcome::Succeeded), Some(d)) => write!(f, " -> ok ({})", format_duration(d)),
            (Some(ActionOutcome::Failed(e)), Some(d)) => {
                write!(f, " -> error: {} ({})", e, format_duration(d))
            }
            (Some(ActionOutcome::Abandoned), Some(d)) => {
                write!(f, " -> abandoned ({})", format_duration(d))
            }
            _ => write!(f, " -> pending ({})", self.elapsed_display()),
        }
    }
}

fn format_duration(d: Duration) -> String {
    if d.as_secs() >= 1 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

fn summarize(payload: &Value) -> String {
    let text = payload.to_string();
    if text.chars().count() <= SUMMARY_LIMIT {
        return text;
    }
    let mut truncated: String = text.chars().take(SUMMARY_LIMIT).collect();
    truncated.push_str("...");
    truncated
}

/// Configuration for the action log ring buffer
#[derive(Debug, Clone)]
pub struct ActionLogConfig {
    /// Maximum number of entries to keep
    pub capacity: usize,
    pub filter: ActionLogFilter,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            filter: ActionLogFilter::default(),
        }
    }
}

impl ActionLogConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    pub fn new(capacity: usize, filter: ActionLogFilter) -> Self {
        Self { capacity, filter }
    }
}

/// In-memory ring buffer of recent actions
///
/// Older entries are discarded when capacity is reached.
#[derive(Debug, Clone)]
pub struct ActionLog {
    entries: VecDeque<ActionLogEntry>,
    config: ActionLogConfig,
    next_sequence: u64,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(ActionLogConfig::default())
    }
}

impl ActionLog {
    pub fn new(config: ActionLogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
            next_sequence: 0,
        }
    }

    /// Record the start of an action (if it passes the filter)
    ///
    /// Returns the entry if it was logged, None if filtered out.
    pub fn record(
        &mut self,
        execution: ExecutionId,
        name: &ActionName,
        payload: &Value,
    ) -> Option<&ActionLogEntry> {
        if self.config.capacity == 0 || !self.config.filter.should_log(name.as_str()) {
            return None;
        }

        let entry = ActionLogEntry::new(
            execution,
            name.clone(),
            summarize(payload),
            self.next_sequence,
        );
        self.next_sequence += 1;

        if self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
        }

        self.entries.push_back(entry);
        self.entries.back()
    }

    /// Attach an outcome to the entry of `execution`
    ///
    /// Returns false when no pending entry exists for it, e.g. because it was
    /// filtered out or already evicted.
    pub fn complete(&mut self, execution: ExecutionId, result: &ActionResult) -> bool {
        self.pending_entry(execution)
            .map(|entry| entry.complete(result))
            .is_some()
    }

    /// Mark the entry of `execution` as abandoned
    pub fn abandon(&mut self, execution: ExecutionId) -> bool {
        self.pending_entry(execution)
            .map(|entry| entry.finish(ActionOutcome::Abandoned))
            .is_some()
    }

    fn pending_entry(&mut self, execution: ExecutionId) -> Option<&mut ActionLogEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.is_pending() && entry.execution == execution)
    }

    /// Get all entries (oldest first)
    pub fn entries(&self) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter()
    }

    /// Get the most recent N entries (newest first)
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter().rev().take(count)
    }

    /// Entries still waiting for an outcome
    pub fn pending(&self) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter().filter(|entry| entry.is_pending())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn config(&self) -> &ActionLogConfig {
        &self.config
    }
}

/// Middleware that keeps an [`ActionLog`] and mirrors it to `tracing`
///
/// Clones share the same log.
#[derive(Debug, Clone)]
pub struct ActionLogMiddleware {
    log: Arc<Mutex<ActionLog>>,
    active: bool,
}

impl Default for ActionLogMiddleware {
    fn default() -> Self {
        Self::new(ActionLogConfig::default())
    }
}

impl ActionLogMiddleware {
    pub fn new(config: ActionLogConfig) -> Self {
        Self {
            log: Arc::new(Mutex::new(ActionLog::new(config))),
            active: true,
        }
    }

    /// Set whether the middleware records anything
    ///
    /// ```
    /// use dash_dispatch_core::ActionLogMiddleware;
    ///
    /// let verbose = false;
    /// let middleware = ActionLogMiddleware::default().active(verbose);
    /// assert!(!middleware.is_active());
    /// ```
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Lock the shared log for reading
    pub fn log(&self) -> MutexGuard<'_, ActionLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of all entries, oldest first
    pub fn snapshot(&self) -> Vec<ActionLogEntry> {
        self.log().entries().cloned().collect()
    }
}

impl Middleware for ActionLogMiddleware {
    fn before(&self, execution: ExecutionId, action: &ActionName, payload: &Value) {
        if !self.active {
            return;
        }
        if let Some(entry) = self.log().record(execution, action, payload) {
            tracing::debug!(action = %action, %execution, sequence = entry.sequence, "action");
        }
    }

    fn after(&self, execution: ExecutionId, _action: &ActionName, result: &ActionResult) {
        if !self.active {
            return;
        }
        self.log().complete(execution, result);
    }

    fn abandoned(&self, execution: ExecutionId, _action: &ActionName) {
        if !self.active {
            return;
        }
        self.log().abandon(execution);
    }
}

/// Simple glob pattern matching supporting `*` and `?`.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        match pattern.get(pi).copied() {
            Some('?') => {
                pi += 1;
                ti += 1;
            }
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some(c) if c == text[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                // Let the last star absorb one more character and retry
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    star = Some((star_pi, star_ti + 1));
                }
                None => return false,
            },
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name(s: &str) -> ActionName {
        ActionName::new(s).unwrap()
    }

    fn id(raw: u64) -> ExecutionId {
        ExecutionId::new(raw)
    }

    fn unfiltered(capacity: usize) -> ActionLog {
        ActionLog::new(ActionLogConfig::new(capacity, ActionLogFilter::default()))
    }

    #[test]
    fn test_glob_match_exact() {
        assert!(glob_match("get-analytics", "get-analytics"));
        assert!(!glob_match("get-analytics", "get-analytic"));
        assert!(!glob_match("flip", "flip-resource"));
    }

    #[test]
    fn test_glob_match_star() {
        assert!(glob_match("flip-*", "flip-resource"));
        assert!(glob_match("flip-*", "flip-"));
        assert!(!glob_match("flip-*", "do-flip-resource"));
        assert!(glob_match("*-rule", "toggle-cache-rule"));
        assert!(glob_match("*cache*", "get-cache-rule-status"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn test_glob_match_question() {
        assert!(glob_match("get-?", "get-a"));
        assert!(!glob_match("get-?", "get-"));
        assert!(!glob_match("get-?", "get-ab"));
    }

    #[test]
    fn test_glob_match_backtracking() {
        assert!(glob_match("*-cache-*-status", "get-cache-rule-status"));
        assert!(glob_match("a*b*c", "axxbyybzc"));
        assert!(!glob_match("a*b*c", "axxbyyb"));
    }

    #[test]
    fn test_filter_include_and_exclude() {
        let filter = ActionLogFilter::new(Some("get-*"), Some("get-cache-*"));
        assert!(filter.should_log("get-analytics"));
        assert!(!filter.should_log("get-cache-rule-status"));
        assert!(!filter.should_log("flip-resource"));
    }

    #[test]
    fn test_filter_default_logs_everything() {
        let filter = ActionLogFilter::default();
        assert!(filter.should_log("flip-resource"));
        assert!(filter.should_log("anything"));
    }

    #[test]
    fn test_filter_ignores_blank_patterns() {
        let filter = ActionLogFilter::new(Some(" , "), None);
        assert!(filter.include_patterns.is_empty());
        assert!(filter.should_log("flip-resource"));
    }

    #[test]
    fn test_log_capacity() {
        let mut log = unfiltered(3);
        for i in 0..4 {
            log.record(id(i), &name("flip-resource"), &json!({}));
        }
        assert_eq!(log.len(), 3);
        // Sequence 0 was evicted
        assert_eq!(log.entries().next().unwrap().sequence, 1);
    }

    #[test]
    fn test_log_recent_newest_first() {
        let mut log = unfiltered(10);
        for i in 0..5 {
            log.record(id(i), &name("get-analytics"), &json!({}));
        }
        let recent: Vec<_> = log.recent(3).map(|e| e.sequence).collect();
        assert_eq!(recent, vec![4, 3, 2]);
    }

    #[test]
    fn test_complete_matches_execution() {
        let mut log = unfiltered(10);
        log.record(id(0), &name("get-analytics"), &json!({"call": 1}));
        log.record(id(1), &name("flip-resource"), &json!({}));
        log.record(id(2), &name("get-analytics"), &json!({"call": 2}));

        // The later call resolves first
        assert!(log.complete(id(2), &ActionResult::success(json!(2))));
        assert!(log.complete(id(0), &ActionResult::failure("first failed")));

        let entries: Vec<_> = log.entries().collect();
        assert_eq!(entries[0].summary, r#"{"call":1}"#);
        assert_eq!(
            entries[0].outcome,
            Some(ActionOutcome::Failed("first failed".to_string()))
        );
        assert_eq!(entries[2].summary, r#"{"call":2}"#);
        assert_eq!(entries[2].outcome, Some(ActionOutcome::Succeeded));
        assert!(entries[0].duration.is_some());
        assert_eq!(log.pending().count(), 1);

        assert!(!log.complete(id(0), &ActionResult::success(json!(1))));
        assert!(!log.complete(id(9), &ActionResult::success(json!(1))));
    }

    #[test]
    fn test_abandoned_entry_is_not_reused() {
        let mut log = unfiltered(10);
        log.record(id(0), &name("test-api-connection"), &json!({}));
        assert!(log.abandon(id(0)));
        log.record(id(1), &name("test-api-connection"), &json!({}));
        assert!(log.complete(id(1), &ActionResult::success(json!({}))));

        let entries: Vec<_> = log.entries().collect();
        assert_eq!(entries[0].outcome, Some(ActionOutcome::Abandoned));
        assert!(entries[0].to_string().contains("-> abandoned ("));
        assert_eq!(entries[1].outcome, Some(ActionOutcome::Succeeded));
        assert!(!log.abandon(id(1)));
    }

    #[test]
    fn test_summary_truncation() {
        let mut log = unfiltered(1);
        let long = "x".repeat(200);
        let entry = log
            .record(id(0), &name("update-config"), &json!({ "v": long }))
            .unwrap();
        assert!(entry.summary.ends_with("..."));
        assert_eq!(entry.summary.chars().count(), SUMMARY_LIMIT + 3);
    }

    #[test]
    fn test_entry_display() {
        let mut entry = ActionLogEntry::new(id(0), name("flip-resource"), "{}".to_string(), 7);
        assert!(entry.to_string().contains("-> pending ("));
        entry.complete(&ActionResult::success(json!(true)));
        let text = entry.to_string();
        assert!(text.starts_with("#7"));
        assert!(text.contains("-> ok ("));
    }

    #[test]
    fn test_middleware_records_and_completes() {
        let middleware =
            ActionLogMiddleware::new(ActionLogConfig::new(10, ActionLogFilter::new(None, Some("get-*"))));
        let reader = middleware.clone();

        middleware.before(id(0), &name("flip-resource"), &json!({}));
        middleware.before(id(1), &name("get-analytics"), &json!({}));
        middleware.after(id(1), &name("get-analytics"), &ActionResult::success(json!({})));
        middleware.after(id(0), &name("flip-resource"), &ActionResult::success(json!({})));

        let entries = reader.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name.as_str(), "flip-resource");
        assert_eq!(entries[0].outcome, Some(ActionOutcome::Succeeded));
    }

    #[test]
    fn test_inactive_middleware_is_noop() {
        let middleware = ActionLogMiddleware::default().active(false);
        middleware.before(id(0), &name("flip-resource"), &json!({}));
        assert!(middleware.log().is_empty());
    }
}
