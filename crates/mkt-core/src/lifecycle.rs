//! Lifecycle state machines
//!
//! One fixed transition table per entity kind. Documents store states as
//! strings; [`check_transition`] parses both ends and validates against the
//! table for the document's kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::EntityKind;

/// State of one lifecycle table
pub trait LifecycleState: Copy + Eq + fmt::Debug + FromStr + 'static {
    /// State every new entity starts in
    const INITIAL: Self;

    fn as_str(self) -> &'static str;

    /// States reachable in one step
    fn allowed_transitions(self) -> &'static [Self];

    #[inline]
    fn can_transition_to(self, to: Self) -> bool {
        self.allowed_transitions().contains(&to)
    }

    #[inline]
    fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

macro_rules! lifecycle_state {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every state in table order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stored representation
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} `{other}`", stringify!($name))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

lifecycle_state! {
    /// Content workflow
    ContentState {
        Draft => "draft",
        Ready => "ready",
        Published => "published",
    }
}

lifecycle_state! {
    /// Master and micro plan workflow
    PlanState {
        Draft => "draft",
        Review => "review",
        Approved => "approved",
        Active => "active",
    }
}

lifecycle_state! {
    /// Campaign workflow
    CampaignState {
        Draft => "draft",
        Active => "active",
        Completed => "completed",
        Archived => "archived",
    }
}

impl LifecycleState for ContentState {
    const INITIAL: Self = Self::Draft;

    fn as_str(self) -> &'static str {
        self.name()
    }

    fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Ready],
            Self::Ready => &[Self::Draft, Self::Published],
            Self::Published => &[],
        }
    }
}

impl LifecycleState for PlanState {
    const INITIAL: Self = Self::Draft;

    fn as_str(self) -> &'static str {
        self.name()
    }

    fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Review, Self::Approved],
            Self::Review => &[Self::Draft, Self::Approved],
            Self::Approved => &[Self::Active, Self::Draft],
            Self::Active => &[Self::Draft],
        }
    }
}

impl LifecycleState for CampaignState {
    const INITIAL: Self = Self::Draft;

    fn as_str(self) -> &'static str {
        self.name()
    }

    fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Active],
            Self::Active => &[Self::Completed, Self::Archived],
            Self::Completed => &[Self::Archived],
            Self::Archived => &[],
        }
    }
}

/// Validate a transition in one table
///
/// # Errors
/// Returns [`EngineError::InvalidTransition`] naming both states and the
/// allowed set when `to` is not reachable from `from`
pub fn validate_transition<S: LifecycleState>(kind: EntityKind, from: S, to: S) -> Result<(), EngineError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(EngineError::invalid_transition(
            kind,
            from.as_str(),
            to.as_str(),
            &allowed_names(from),
        ))
    }
}

/// Validate a transition between stored state strings
///
/// # Errors
/// - [`EngineError::InvalidRequest`] if `kind` has no lifecycle
/// - [`EngineError::Validation`] if the stored state is not in the table
/// - [`EngineError::InvalidTransition`] if `to` is unknown or unreachable
pub fn check_transition(kind: EntityKind, from: &str, to: &str) -> Result<(), EngineError> {
    match kind {
        EntityKind::Content => check_in::<ContentState>(kind, from, to),
        EntityKind::MasterPlan | EntityKind::MicroPlan => check_in::<PlanState>(kind, from, to),
        EntityKind::Campaign => check_in::<CampaignState>(kind, from, to),
        EntityKind::Brand => Err(EngineError::InvalidRequest(format!("{kind} has no lifecycle"))),
    }
}

/// Start state for a kind, `None` for kinds without a lifecycle
#[must_use]
pub fn initial_state(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Content => Some(ContentState::INITIAL.as_str()),
        EntityKind::MasterPlan | EntityKind::MicroPlan => Some(PlanState::INITIAL.as_str()),
        EntityKind::Campaign => Some(CampaignState::INITIAL.as_str()),
        EntityKind::Brand => None,
    }
}

fn check_in<S: LifecycleState>(kind: EntityKind, from: &str, to: &str) -> Result<(), EngineError> {
    let current = S::from_str(from)
        .map_err(|_| EngineError::Validation(format!("{kind} has unknown stored state `{from}`")))?;
    let Ok(target) = S::from_str(to) else {
        return Err(EngineError::invalid_transition(kind, from, to, &allowed_names(current)));
    };
    validate_transition(kind, current, target)
}

fn allowed_names<S: LifecycleState>(from: S) -> Vec<&'static str> {
    from.allowed_transitions().iter().map(|s| s.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_table() {
        assert!(check_transition(EntityKind::Content, "draft", "ready").is_ok());
        assert!(check_transition(EntityKind::Content, "ready", "published").is_ok());
        assert!(check_transition(EntityKind::Content, "ready", "draft").is_ok());

        assert!(check_transition(EntityKind::Content, "draft", "published").is_err());
        assert!(ContentState::Published.is_terminal());
    }

    #[test]
    fn plan_error_lists_allowed_set() {
        let err = check_transition(EntityKind::MicroPlan, "draft", "active").unwrap_err();
        match err {
            EngineError::InvalidTransition { from, to, allowed, .. } => {
                assert_eq!(from, "draft");
                assert_eq!(to, "active");
                assert_eq!(allowed, vec!["review".to_string(), "approved".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn campaign_table() {
        assert!(check_transition(EntityKind::Campaign, "draft", "active").is_ok());
        assert!(check_transition(EntityKind::Campaign, "completed", "archived").is_ok());
        assert!(check_transition(EntityKind::Campaign, "archived", "draft").is_err());
    }

    #[test]
    fn unknown_target_is_invalid_transition() {
        assert!(matches!(
            check_transition(EntityKind::Content, "draft", "shipped"),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn unknown_stored_state_is_validation_error() {
        assert!(matches!(
            check_transition(EntityKind::Content, "limbo", "ready"),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn brand_has_no_lifecycle() {
        assert!(initial_state(EntityKind::Brand).is_none());
        assert!(matches!(
            check_transition(EntityKind::Brand, "draft", "ready"),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn text_round_trips_through_from_str() {
        for state in PlanState::ALL {
            assert_eq!(state.as_str().parse::<PlanState>(), Ok(*state));
        }
    }
}
