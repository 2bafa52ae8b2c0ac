//! Idle-tab selection and eviction
//!
//! Every pass partitions the open tabs by window and, per window:
//!
//! 1. Computes each tab's effective last-active time, never earlier than the
//!    last resume from pause.
//! 2. Groups web tabs by hostname to find domains with more than three tabs.
//! 3. Discovers candidates, skipping active, audible, protected pinned and
//!    whitelisted tabs:
//!    - blacklisted → priority 0, always
//!    - empty (new tab, `about:blank`) → priority 1, always
//!    - native (`chrome://`) → priority 2, when idle past the native threshold
//!    - web tab → priority 3, when outside the two most recent tabs of a
//!      crowded domain, or idle past the idle threshold
//! 4. Orders candidates by priority, then oldest first.
//! 5. Closes in that order while the window keeps more than `minTabCount`
//!    tabs, stopping at the first candidate that would reach the floor.
//!
//! Each selected tab is recorded in history before it is removed. Failures are
//! isolated per tab; the next pass retries whatever stayed open.

use crate::domain::{hostname, is_empty_tab_url, is_extension_url, is_native_url};
use crate::error::{BrowserError, Error};
use crate::history::HistoryStore;
use crate::pattern::matches_pattern;
use crate::settings::Settings;
use crate::storage::StateStore;
use crate::tab_data::Tab;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Crowded-domain detection starts above this many tabs per host
const DUPLICATE_DOMAIN_THRESHOLD: usize = 3;
/// Most recently active tabs of a crowded domain that stay open
const DUPLICATE_DOMAIN_KEEP: usize = 2;

/// Enumerates and closes browser tabs
#[async_trait(?Send)]
pub trait TabControl {
    async fn query_all(&self) -> Result<Vec<Tab>, BrowserError>;

    /// Fails if the tab no longer exists
    async fn remove(&self, tab_id: i32) -> Result<(), BrowserError>;
}

/// Why a tab was picked for closing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    Blacklist,
    Empty,
    NativeIdle,
    DuplicateDomain,
    Idle,
}

impl EvictionReason {
    /// Lower closes first
    pub fn priority(self) -> u8 {
        match self {
            EvictionReason::Blacklist => 0,
            EvictionReason::Empty => 1,
            EvictionReason::NativeIdle => 2,
            EvictionReason::DuplicateDomain | EvictionReason::Idle => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvictionCandidate<'t> {
    pub tab: &'t Tab,
    pub priority: u8,
    pub last_active: f64,
    pub reason: EvictionReason,
}

impl<'t> EvictionCandidate<'t> {
    fn new(tab: &'t Tab, last_active: f64, reason: EvictionReason) -> Self {
        EvictionCandidate {
            tab,
            priority: reason.priority(),
            last_active,
            reason,
        }
    }
}

/// Close-list for one window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPlan<'t> {
    pub window_id: i32,
    pub tab_count: usize,
    pub close: Vec<EvictionCandidate<'t>>,
}

/// `max(lastAccessed or now, resume_time)`
pub fn effective_last_active(tab: &Tab, now: f64, resume_time: f64) -> f64 {
    let last_accessed = tab
        .last_accessed
        .filter(|accessed| *accessed > 0.0)
        .unwrap_or(now);
    last_accessed.max(resume_time)
}

fn is_protected(tab: &Tab, settings: &Settings) -> bool {
    tab.active || tab.audible || (tab.pinned && settings.ignore_pinned_tabs)
}

/// Indices of tabs that fall outside the most recent few of a crowded domain
fn crowded_domain_members(tabs: &[&Tab], last_active: &[f64]) -> HashSet<usize> {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, tab) in tabs.iter().enumerate() {
        if let Some(host) = hostname(&tab.url) {
            groups.entry(host).or_default().push(index);
        }
    }

    let mut crowded = HashSet::new();
    for (host, mut members) in groups {
        if members.len() <= DUPLICATE_DOMAIN_THRESHOLD {
            continue;
        }

        members.sort_by(|a, b| last_active[*a].total_cmp(&last_active[*b]));
        let excess = members.len() - DUPLICATE_DOMAIN_KEEP;
        debug!("Domain {} has {} tabs, {} beyond the most recent", host, members.len(), excess);
        crowded.extend(members.into_iter().take(excess));
    }
    crowded
}

/// Tabs in one window eligible for closing, unordered
fn discover_candidates<'t>(tabs: &[&'t Tab], settings: &Settings, now: f64) -> Vec<EvictionCandidate<'t>> {
    let last_active: Vec<f64> = tabs
        .iter()
        .map(|tab| effective_last_active(tab, now, settings.resume_time))
        .collect();
    let crowded = if settings.close_duplicate_domains {
        crowded_domain_members(tabs, &last_active)
    } else {
        HashSet::new()
    };

    let mut candidates = Vec::new();
    for (index, tab) in tabs.iter().copied().enumerate() {
        if is_protected(tab, settings) || matches_pattern(&tab.url, &settings.whitelist) {
            continue;
        }

        let last_active = last_active[index];
        let idle = now - last_active;

        let reason = if matches_pattern(&tab.url, &settings.blacklist) {
            Some(EvictionReason::Blacklist)
        } else if is_empty_tab_url(&tab.url) {
            Some(EvictionReason::Empty)
        } else if is_native_url(&tab.url) {
            (settings.auto_close_native_tabs && idle > settings.native_idle_threshold_ms())
                .then_some(EvictionReason::NativeIdle)
        } else if is_extension_url(&tab.url) {
            None
        } else if crowded.contains(&index) {
            Some(EvictionReason::DuplicateDomain)
        } else if idle > settings.idle_threshold_ms() {
            Some(EvictionReason::Idle)
        } else {
            None
        };

        if let Some(reason) = reason {
            debug!("Candidate {:?} (priority {}): {}", reason, reason.priority(), tab.url);
            candidates.push(EvictionCandidate::new(tab, last_active, reason));
        }
    }
    candidates
}

/// Select which tabs of a single window to close
pub fn plan_window<'t>(tabs: &[&'t Tab], settings: &Settings, now: f64) -> Vec<EvictionCandidate<'t>> {
    let mut candidates = discover_candidates(tabs, settings, now);
    candidates.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.last_active.total_cmp(&b.last_active))
    });

    let floor = settings.min_tab_count;
    let mut remaining = tabs.len();
    let mut close = Vec::new();
    for candidate in candidates {
        if remaining <= floor {
            debug!("Keeping tab to maintain min count ({}): {}", floor, candidate.tab.url);
            break;
        }
        remaining -= 1;
        close.push(candidate);
    }

    while tabs.len().saturating_sub(close.len()) < floor {
        match close.pop() {
            Some(dropped) => warn!("Close-list would breach the floor, keeping {}", dropped.tab.url),
            None => break,
        }
    }

    close
}

/// Select tabs to close in every window; nothing while paused
pub fn plan_pass<'t>(tabs: &'t [Tab], settings: &Settings, now: f64) -> Vec<WindowPlan<'t>> {
    if settings.is_paused {
        return Vec::new();
    }

    let mut windows: BTreeMap<i32, Vec<&'t Tab>> = BTreeMap::new();
    for tab in tabs {
        windows.entry(tab.window_id).or_default().push(tab);
    }

    windows
        .into_iter()
        .map(|(window_id, window_tabs)| WindowPlan {
            window_id,
            tab_count: window_tabs.len(),
            close: plan_window(&window_tabs, settings, now),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTab {
    pub tab_id: i32,
    pub window_id: i32,
    pub reason: EvictionReason,
}

/// Outcome of one eviction pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub paused: bool,
    pub closed: Vec<ClosedTab>,
    /// Tabs selected but left open because recording or removal failed
    pub failed: Vec<i32>,
}

/// Runs eviction passes against the live browser
pub struct EvictionPolicy<'a> {
    tabs: &'a dyn TabControl,
    state: &'a StateStore<'a>,
    history: &'a HistoryStore<'a>,
}

impl<'a> EvictionPolicy<'a> {
    pub fn new(tabs: &'a dyn TabControl, state: &'a StateStore<'a>, history: &'a HistoryStore<'a>) -> Self {
        EvictionPolicy { tabs, state, history }
    }

    /// Load settings and the tab inventory, then evict
    pub async fn run_pass(&self, now: f64) -> Result<PassReport, Error> {
        let settings = self.state.load_settings().await?;
        if settings.is_paused {
            info!("Auto-close is paused");
            return Ok(PassReport {
                paused: true,
                ..PassReport::default()
            });
        }

        let tabs = self.tabs.query_all().await?;
        Ok(self.evict(&tabs, &settings, now).await)
    }

    /// Record and close every selected tab, isolating failures per tab
    pub async fn evict(&self, tabs: &[Tab], settings: &Settings, now: f64) -> PassReport {
        let mut report = PassReport {
            paused: settings.is_paused,
            ..PassReport::default()
        };

        for plan in plan_pass(tabs, settings, now) {
            if !plan.close.is_empty() {
                info!(
                    "Window {}: closing {} of {} tabs",
                    plan.window_id,
                    plan.close.len(),
                    plan.tab_count
                );
            }

            for candidate in plan.close {
                let tab = candidate.tab;

                if let Err(e) = self.history.record(tab, now).await {
                    warn!("Leaving tab {} open, history write failed: {}", tab.id, e);
                    report.failed.push(tab.id);
                    continue;
                }

                match self.tabs.remove(tab.id).await {
                    Ok(()) => {
                        info!("Closed {:?} tab: {}", candidate.reason, tab.title);
                        report.closed.push(ClosedTab {
                            tab_id: tab.id,
                            window_id: tab.window_id,
                            reason: candidate.reason,
                        });
                    }
                    Err(e) => {
                        warn!("{}", e);
                        report.failed.push(tab.id);
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::classifier::oracle::tests::ScriptedTransport;
    use crate::storage::{HISTORY_KEY, MemoryStorage};
    use std::cell::RefCell;

    const NOW: f64 = 1_700_000_000_000.0;
    const MINUTE: f64 = 60_000.0;

    /// Tab controller over a fixed inventory that records removals
    #[derive(Default)]
    pub(crate) struct RecordingTabs {
        pub(crate) tabs: RefCell<Vec<Tab>>,
        pub(crate) removed: RefCell<Vec<i32>>,
        pub(crate) reject: HashSet<i32>,
    }

    impl RecordingTabs {
        pub(crate) fn new(tabs: Vec<Tab>) -> Self {
            RecordingTabs {
                tabs: RefCell::new(tabs),
                removed: RefCell::new(Vec::new()),
                reject: HashSet::new(),
            }
        }
    }

    #[async_trait(?Send)]
    impl TabControl for RecordingTabs {
        async fn query_all(&self) -> Result<Vec<Tab>, BrowserError> {
            Ok(self.tabs.borrow().clone())
        }

        async fn remove(&self, tab_id: i32) -> Result<(), BrowserError> {
            if self.reject.contains(&tab_id) {
                return Err(BrowserError::Remove {
                    tab_id,
                    message: format!("No tab with id: {}", tab_id),
                });
            }
            self.tabs.borrow_mut().retain(|tab| tab.id != tab_id);
            self.removed.borrow_mut().push(tab_id);
            Ok(())
        }
    }

    pub(crate) fn tab(id: i32, window_id: i32, url: &str, idle_minutes: f64) -> Tab {
        Tab {
            last_accessed: Some(NOW - idle_minutes * MINUTE),
            ..Tab::new(id, window_id, url, &format!("Tab {}", id))
        }
    }

    fn closed_ids(tabs: &[Tab], settings: &Settings) -> Vec<i32> {
        plan_pass(tabs, settings, NOW)
            .into_iter()
            .flat_map(|plan| plan.close.into_iter().map(|c| c.tab.id))
            .collect()
    }

    fn settings() -> Settings {
        Settings {
            min_tab_count: 1,
            ..Settings::default()
        }
    }

    #[test]
    fn test_reason_priorities() {
        assert_eq!(EvictionReason::Blacklist.priority(), 0);
        assert_eq!(EvictionReason::Empty.priority(), 1);
        assert_eq!(EvictionReason::NativeIdle.priority(), 2);
        assert_eq!(EvictionReason::DuplicateDomain.priority(), 3);
        assert_eq!(EvictionReason::Idle.priority(), 3);
    }

    #[test]
    fn test_effective_last_active() {
        let mut t = tab(1, 1, "https://a.com", 60.0);
        assert_eq!(effective_last_active(&t, NOW, 0.0), NOW - 60.0 * MINUTE);
        assert_eq!(effective_last_active(&t, NOW, NOW - 5.0 * MINUTE), NOW - 5.0 * MINUTE);

        t.last_accessed = None;
        assert_eq!(effective_last_active(&t, NOW, 0.0), NOW);
    }

    #[test]
    fn test_floor_stops_idle_closing() {
        let mut tabs: Vec<Tab> = (1..=12)
            .map(|i| tab(i, 1, &format!("https://site{}.com", i), 5.0))
            .collect();
        tabs[0].last_accessed = Some(NOW - 45.0 * MINUTE);
        tabs[1].last_accessed = Some(NOW - 47.0 * MINUTE);
        tabs[2].last_accessed = Some(NOW - 46.0 * MINUTE);
        let settings = Settings {
            min_tab_count: 10,
            idle_time: 30,
            ..Settings::default()
        };

        assert_eq!(closed_ids(&tabs, &settings), vec![2, 3]);
    }

    #[test]
    fn test_duplicate_domain_keeps_two_most_recent() {
        let tabs: Vec<Tab> = (1..=5)
            .map(|i| tab(i, 1, &format!("https://example.com/page{}", i), i as f64))
            .collect();

        let plan = plan_pass(&tabs, &settings(), NOW);
        let close = &plan[0].close;

        let ids: Vec<i32> = close.iter().map(|c| c.tab.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
        assert!(close.iter().all(|c| c.reason == EvictionReason::DuplicateDomain));
    }

    #[test]
    fn test_duplicate_domain_needs_more_than_three() {
        let tabs: Vec<Tab> = (1..=3)
            .map(|i| tab(i, 1, &format!("https://example.com/{}", i), i as f64))
            .collect();

        assert!(closed_ids(&tabs, &settings()).is_empty());
    }

    #[test]
    fn test_duplicate_domain_disabled() {
        let tabs: Vec<Tab> = (1..=5)
            .map(|i| tab(i, 1, &format!("https://example.com/{}", i), i as f64))
            .collect();
        let settings = Settings {
            close_duplicate_domains: false,
            ..settings()
        };

        assert!(closed_ids(&tabs, &settings).is_empty());
    }

    #[test]
    fn test_active_and_audible_never_close() {
        let mut tabs = vec![
            tab(1, 1, "https://ads.com", 600.0),
            tab(2, 1, "https://old.com", 600.0),
            tab(3, 1, "about:blank", 600.0),
            tab(4, 1, "https://keep.com", 0.0),
        ];
        tabs[0].active = true;
        tabs[1].audible = true;
        tabs[2].active = true;
        let settings = Settings {
            blacklist: vec!["ads".to_string()],
            ..settings()
        };

        assert!(closed_ids(&tabs, &settings).is_empty());
    }

    #[test]
    fn test_pinned_tabs() {
        let mut tabs = vec![tab(1, 1, "https://old.com", 600.0), tab(2, 1, "https://new.com", 0.0)];
        tabs[0].pinned = true;

        assert!(closed_ids(&tabs, &settings()).is_empty());

        let settings = Settings {
            ignore_pinned_tabs: false,
            ..settings()
        };
        assert_eq!(closed_ids(&tabs, &settings), vec![1]);
    }

    #[test]
    fn test_whitelist_beats_blacklist() {
        let tabs = vec![
            tab(1, 1, "https://mail.example.com", 600.0),
            tab(2, 1, "https://example.com", 0.0),
            tab(3, 1, "https://other.org", 0.0),
        ];
        let settings = Settings {
            whitelist: vec!["MAIL.".to_string()],
            blacklist: vec!["example.com".to_string()],
            ..settings()
        };

        let plan = plan_pass(&tabs, &settings, NOW);
        let close = &plan[0].close;

        assert_eq!(close.len(), 1);
        assert_eq!(close[0].tab.id, 2);
        assert_eq!(close[0].reason, EvictionReason::Blacklist);
    }

    #[test]
    fn test_empty_and_native_tabs() {
        let tabs = vec![
            tab(1, 1, "chrome://newtab/", 0.0),
            tab(2, 1, "chrome://settings", 45.0),
            tab(3, 1, "chrome://history", 10.0),
            tab(4, 1, "chrome-extension://abc/options.html", 600.0),
            tab(5, 1, "https://fresh.com", 0.0),
        ];

        let plan = plan_pass(&tabs, &settings(), NOW);
        let reasons: Vec<(i32, EvictionReason)> = plan[0].close.iter().map(|c| (c.tab.id, c.reason)).collect();

        assert_eq!(reasons, vec![(1, EvictionReason::Empty), (2, EvictionReason::NativeIdle)]);

        let settings = Settings {
            auto_close_native_tabs: false,
            ..settings()
        };
        assert_eq!(closed_ids(&tabs, &settings), vec![1]);
    }

    #[test]
    fn test_priority_order_under_floor() {
        let tabs = vec![
            tab(1, 1, "https://very-old.com", 900.0),
            tab(2, 1, "chrome://settings", 120.0),
            tab(3, 1, "about:blank", 0.0),
            tab(4, 1, "https://tracker.net", 0.0),
            tab(5, 1, "https://fresh.com", 0.0),
        ];
        let settings = Settings {
            min_tab_count: 2,
            blacklist: vec!["tracker".to_string()],
            ..Settings::default()
        };

        let plan = plan_pass(&tabs, &settings, NOW);
        let reasons: Vec<EvictionReason> = plan[0].close.iter().map(|c| c.reason).collect();

        assert_eq!(
            reasons,
            vec![EvictionReason::Blacklist, EvictionReason::Empty, EvictionReason::NativeIdle]
        );
    }

    #[test]
    fn test_resume_time_anchors_idle() {
        let tabs = vec![tab(1, 1, "https://old.com", 600.0), tab(2, 1, "https://new.com", 0.0)];
        let settings = Settings {
            resume_time: NOW - 5.0 * MINUTE,
            ..settings()
        };

        assert!(closed_ids(&tabs, &settings).is_empty());
    }

    #[test]
    fn test_windows_have_separate_floors() {
        let tabs = vec![
            tab(1, 1, "https://a.com", 600.0),
            tab(2, 1, "https://b.com", 600.0),
            tab(3, 2, "https://c.com", 600.0),
            tab(4, 2, "https://d.com", 600.0),
            tab(5, 2, "https://e.com", 600.0),
        ];
        let settings = Settings {
            min_tab_count: 2,
            ..Settings::default()
        };

        let plans = plan_pass(&tabs, &settings, NOW);

        assert_eq!(plans.len(), 2);
        assert!(plans[0].close.is_empty());
        assert_eq!(plans[1].close.len(), 1);
        assert_eq!(plans[1].tab_count, 3);
    }

    #[test]
    fn test_window_below_floor_keeps_everything() {
        let tabs = vec![tab(1, 1, "about:blank", 0.0), tab(2, 1, "https://a.com", 600.0)];
        let settings = Settings {
            min_tab_count: 5,
            blacklist: vec!["a.com".to_string()],
            ..Settings::default()
        };

        assert!(closed_ids(&tabs, &settings).is_empty());
    }

    #[test]
    fn test_paused_plans_nothing() {
        let tabs = vec![tab(1, 1, "https://a.com", 600.0), tab(2, 1, "about:blank", 600.0)];
        let settings = Settings {
            is_paused: true,
            ..settings()
        };

        assert!(plan_pass(&tabs, &settings, NOW).is_empty());
    }

    #[test]
    fn test_floor_invariant_across_sizes() {
        for count in 1..=15 {
            for floor in 0..=12 {
                let tabs: Vec<Tab> = (1..=count)
                    .map(|i| tab(i, 1, &format!("https://s{}.example.org", i), 100.0 + i as f64))
                    .collect();
                let settings = Settings {
                    min_tab_count: floor,
                    ..Settings::default()
                };

                let closed = closed_ids(&tabs, &settings).len();
                let remaining = tabs.len() - closed;

                assert!(remaining >= floor.min(tabs.len()), "count {} floor {}", count, floor);
            }
        }
    }

    async fn run(tabs: &RecordingTabs, storage: &MemoryStorage, settings: &Settings) -> PassReport {
        let state = StateStore::new(storage);
        state.save_settings(settings).await.unwrap();
        let transport = ScriptedTransport::failing(500);
        let classifier = Classifier::new(&transport);
        let history = HistoryStore::new(&state, &classifier);
        let policy = EvictionPolicy::new(tabs, &state, &history);
        policy.run_pass(NOW).await.unwrap()
    }

    #[tokio::test]
    async fn test_run_pass_records_then_removes() {
        let tabs = RecordingTabs::new(vec![
            tab(1, 1, "https://github.com/rust-lang", 600.0),
            tab(2, 1, "https://fresh.com", 0.0),
        ]);
        let storage = MemoryStorage::new();

        let report = run(&tabs, &storage, &settings()).await;

        assert_eq!(*tabs.removed.borrow(), vec![1]);
        assert_eq!(report.closed[0].reason, EvictionReason::Idle);
        let history = StateStore::new(&storage).load_history().await.unwrap();
        assert_eq!(history.items.len(), 1);
        assert_eq!(history.items[0].category, "Development");
        assert_eq!(history.items[0].closed_at, NOW);
    }

    #[tokio::test]
    async fn test_run_pass_paused() {
        let tabs = RecordingTabs::new(vec![tab(1, 1, "about:blank", 600.0), tab(2, 1, "https://a.com", 600.0)]);
        let storage = MemoryStorage::new();
        let settings = Settings {
            is_paused: true,
            ..settings()
        };

        let report = run(&tabs, &storage, &settings).await;

        assert!(report.paused);
        assert!(tabs.removed.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_remove_failure_is_isolated() {
        let mut tabs = RecordingTabs::new(vec![
            tab(1, 1, "https://a.com", 600.0),
            tab(2, 1, "https://b.com", 500.0),
            tab(3, 2, "https://c.com", 600.0),
            tab(4, 2, "https://d.com", 0.0),
            tab(5, 1, "https://e.com", 0.0),
        ]);
        tabs.reject.insert(1);
        let storage = MemoryStorage::new();

        let report = run(&tabs, &storage, &settings()).await;

        assert_eq!(*tabs.removed.borrow(), vec![2, 3]);
        assert_eq!(report.failed, vec![1]);
    }

    #[tokio::test]
    async fn test_history_failure_keeps_tab_open() {
        let tabs = RecordingTabs::new(vec![tab(1, 1, "https://a.com", 600.0), tab(2, 1, "https://b.com", 0.0)]);
        let storage = MemoryStorage::new();
        let state = StateStore::new(&storage);
        state.save_settings(&settings()).await.unwrap();
        storage.fail_key(HISTORY_KEY);
        let transport = ScriptedTransport::failing(500);
        let classifier = Classifier::new(&transport);
        let history = HistoryStore::new(&state, &classifier);
        let policy = EvictionPolicy::new(&tabs, &state, &history);

        let report = policy.run_pass(NOW).await.unwrap();

        assert!(tabs.removed.borrow().is_empty());
        assert_eq!(report.failed, vec![1]);
    }
}
