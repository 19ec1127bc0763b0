//! Single/double-click arbitration for the history list.
//!
//! Tree rows only report single clicks, so two clicks on the same row
//! within the window count as one confirmed activation. A lone click never
//! starts or stops anything. The button bar intentionally bypasses this
//! and toggles on a single activation.

use std::time::{Duration, Instant};

/// Two clicks on the same key within this window count as a double-click
pub const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(350);

/// What the caller should do with a click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
    /// Confirmed double-click: trigger the toggle
    Start,
    /// First click on this key: do nothing, wait for a possible second
    WaitForSecondClick,
}

/// Single-slot click state: the last clicked key and when
#[derive(Debug, Default)]
pub struct ClickDebouncer {
    last: Option<(String, Instant)>,
}

impl ClickDebouncer {
    pub fn new() -> Self {
        ClickDebouncer { last: None }
    }

    /// Register a click on `key` at `now` and decide what it means.
    ///
    /// A second click on the same key inside the window resets the slot
    /// and returns `Start`; anything else replaces the slot and returns
    /// `WaitForSecondClick`.
    pub fn register(&mut self, key: &str, now: Instant) -> ClickAction {
        if let Some((last_key, last_time)) = self.last.take() {
            if last_key == key && now.duration_since(last_time) < DOUBLE_CLICK_WINDOW {
                return ClickAction::Start;
            }
        }
        self.last = Some((key.to_string(), now));
        ClickAction::WaitForSecondClick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_quick_clicks_on_same_key_start() {
        let mut debouncer = ClickDebouncer::new();
        let t1 = Instant::now();
        let t2 = t1 + Duration::from_millis(100);

        assert_eq!(
            debouncer.register("/repo::build", t1),
            ClickAction::WaitForSecondClick
        );
        assert_eq!(debouncer.register("/repo::build", t2), ClickAction::Start);
    }

    #[test]
    fn slow_second_click_waits_again() {
        let mut debouncer = ClickDebouncer::new();
        let t1 = Instant::now();
        let t2 = t1 + DOUBLE_CLICK_WINDOW;

        assert_eq!(
            debouncer.register("/repo::build", t1),
            ClickAction::WaitForSecondClick
        );
        assert_eq!(
            debouncer.register("/repo::build", t2),
            ClickAction::WaitForSecondClick
        );
    }

    #[test]
    fn click_on_a_different_key_replaces_the_slot() {
        let mut debouncer = ClickDebouncer::new();
        let t1 = Instant::now();
        let t2 = t1 + Duration::from_millis(50);
        let t3 = t2 + Duration::from_millis(50);

        debouncer.register("/repo::build", t1);
        assert_eq!(
            debouncer.register("/repo::test", t2),
            ClickAction::WaitForSecondClick
        );
        // The replacement key can itself be double-clicked
        assert_eq!(debouncer.register("/repo::test", t3), ClickAction::Start);
    }

    #[test]
    fn state_resets_after_a_recognized_double_click() {
        let mut debouncer = ClickDebouncer::new();
        let t1 = Instant::now();
        let t2 = t1 + Duration::from_millis(100);
        let t3 = t2 + Duration::from_millis(100);

        debouncer.register("/repo::build", t1);
        assert_eq!(debouncer.register("/repo::build", t2), ClickAction::Start);
        // A third quick click starts a fresh sequence, it is not another Start
        assert_eq!(
            debouncer.register("/repo::build", t3),
            ClickAction::WaitForSecondClick
        );
    }
}
