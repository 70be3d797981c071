//! When to show the "enable notifications" prompt.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::permission::PermissionState;

/// A stored "not now" on the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dismissal {
    At(DateTime<Utc>),
    /// An old marker with no timestamp. Treated as expired.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptDecision {
    Show,
    Hidden,
    /// The dismissal record is stale or moot: delete it, then show.
    ClearAndShow,
    /// Delete the dismissal record and keep the prompt hidden.
    ClearAndHide,
}

impl PromptDecision {
    pub fn shows(self) -> bool {
        matches!(self, Self::Show | Self::ClearAndShow)
    }

    pub fn clears_dismissal(self) -> bool {
        matches!(self, Self::ClearAndShow | Self::ClearAndHide)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PromptPolicy {
    reshow_after: Duration,
}

impl Default for PromptPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl PromptPolicy {
    pub fn new(reshow_after: Duration) -> Self {
        Self { reshow_after }
    }

    pub fn from_hours(hours: u64) -> Self {
        Self::new(Duration::hours(hours as i64))
    }

    pub fn decide(
        &self,
        permission: PermissionState,
        dismissal: Option<Dismissal>,
        now: DateTime<Utc>,
    ) -> PromptDecision {
        match permission {
            PermissionState::Granted if dismissal.is_some() => PromptDecision::ClearAndHide,
            PermissionState::Granted | PermissionState::Denied => PromptDecision::Hidden,
            PermissionState::Default => match dismissal {
                None => PromptDecision::Show,
                Some(Dismissal::Legacy) => PromptDecision::ClearAndShow,
                Some(Dismissal::At(at)) if now - at < self.reshow_after => PromptDecision::Hidden,
                Some(Dismissal::At(_)) => PromptDecision::ClearAndShow,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn decided_permission_never_shows() {
        let policy = PromptPolicy::default();
        assert_eq!(
            policy.decide(PermissionState::Denied, None, t0()),
            PromptDecision::Hidden
        );
        assert_eq!(
            policy.decide(PermissionState::Granted, None, t0()),
            PromptDecision::Hidden
        );
        let decision = policy.decide(PermissionState::Granted, Some(Dismissal::At(t0())), t0());
        assert_eq!(decision, PromptDecision::ClearAndHide);
        assert!(!decision.shows());
        assert!(decision.clears_dismissal());
    }

    #[test]
    fn dismissal_hides_for_a_day() {
        let policy = PromptPolicy::default();
        let dismissed = Some(Dismissal::At(t0()));

        assert_eq!(
            policy.decide(PermissionState::Default, dismissed, t0() + Duration::hours(23)),
            PromptDecision::Hidden
        );
        assert_eq!(
            policy.decide(PermissionState::Default, dismissed, t0() + Duration::hours(24)),
            PromptDecision::ClearAndShow
        );
    }

    #[test]
    fn legacy_marker_is_discarded() {
        let policy = PromptPolicy::from_hours(24);
        assert_eq!(
            policy.decide(PermissionState::Default, Some(Dismissal::Legacy), t0()),
            PromptDecision::ClearAndShow
        );
        assert_eq!(
            policy.decide(PermissionState::Default, None, t0()),
            PromptDecision::Show
        );
    }
}
