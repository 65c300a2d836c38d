//! Like/dislike membership for a single post.
//!
//! `likes` and `dislikes` are disjoint by construction: every mutation goes
//! through [`InteractionState::apply`], which moves a user between the sets in
//! one step. The denormalized counts are derived from the set sizes and are
//! never tracked independently.

use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::types::InteractionType;

/// What a single toggle did to the caller's membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionChange {
    /// The user was added to the requested set.
    Added,
    /// The user was already in the requested set and has been removed.
    Removed,
    /// The user moved out of the opposite set and into the requested one.
    Switched,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionState {
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub dislikes: Vec<String>,
}

impl InteractionState {
    pub fn new(likes: Vec<String>, dislikes: Vec<String>) -> Self {
        Self { likes, dislikes }
    }

    pub fn has_liked(&self, user_id: &str) -> bool {
        self.likes.iter().any(|uid| uid == user_id)
    }

    pub fn has_disliked(&self, user_id: &str) -> bool {
        self.dislikes.iter().any(|uid| uid == user_id)
    }

    pub fn like_count(&self) -> u64 {
        self.likes.len() as u64
    }

    pub fn dislike_count(&self) -> u64 {
        self.dislikes.len() as u64
    }

    /// Apply one toggle for `user_id`.
    ///
    /// Toggling the set the user is already in removes them from it. Toggling
    /// the opposite set moves them across; the user is never in both.
    pub fn apply(&mut self, user_id: &str, kind: InteractionType) -> InteractionChange {
        let (target, opposite) = match kind {
            InteractionType::Like => (&mut self.likes, &mut self.dislikes),
            InteractionType::Dislike => (&mut self.dislikes, &mut self.likes),
        };

        if target.iter().any(|uid| uid == user_id) {
            target.retain(|uid| uid != user_id);
            return InteractionChange::Removed;
        }

        target.push(user_id.to_string());
        let before = opposite.len();
        opposite.retain(|uid| uid != user_id);
        if opposite.len() != before {
            InteractionChange::Switched
        } else {
            InteractionChange::Added
        }
    }

    /// Reject a state where `user_id` sits in both sets.
    ///
    /// Only the given user is checked, so an overlap left behind by another
    /// user does not block unrelated toggles.
    pub fn validate_user(&self, user_id: &str) -> Result<(), DomainError> {
        if self.has_liked(user_id) && self.has_disliked(user_id) {
            return Err(DomainError::invariant(format!(
                "user `{user_id}` both likes and dislikes the post"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_then_like_again_toggles_off() {
        let mut state = InteractionState::default();

        assert_eq!(state.apply("a", InteractionType::Like), InteractionChange::Added);
        assert_eq!(state.likes, vec!["a".to_string()]);
        assert_eq!(state.like_count(), 1);

        assert_eq!(state.apply("a", InteractionType::Like), InteractionChange::Removed);
        assert!(state.likes.is_empty());
        assert_eq!(state.like_count(), 0);
    }

    #[test]
    fn switching_sides_moves_user_atomically() {
        let mut state = InteractionState::default();
        state.apply("a", InteractionType::Dislike);
        assert_eq!(state.dislike_count(), 1);

        let change = state.apply("a", InteractionType::Like);

        assert_eq!(change, InteractionChange::Switched);
        assert_eq!(state.likes, vec!["a".to_string()]);
        assert!(state.dislikes.is_empty());
        assert!(state.validate_user("a").is_ok());
    }

    #[test]
    fn other_users_are_untouched() {
        let mut state = InteractionState::new(vec!["b".into()], vec!["c".into()]);

        state.apply("a", InteractionType::Dislike);

        assert_eq!(state.likes, vec!["b".to_string()]);
        assert_eq!(state.dislikes, vec!["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn alternating_sequence_keeps_sets_disjoint() {
        let mut state = InteractionState::default();
        let sequence = [
            InteractionType::Like,
            InteractionType::Dislike,
            InteractionType::Dislike,
            InteractionType::Like,
            InteractionType::Like,
            InteractionType::Dislike,
            InteractionType::Like,
        ];

        for kind in sequence {
            state.apply("a", kind);
            assert!(!(state.has_liked("a") && state.has_disliked("a")));
            assert!(state.validate_user("a").is_ok());
            assert_eq!(state.like_count(), state.likes.len() as u64);
            assert_eq!(state.dislike_count(), state.dislikes.len() as u64);
        }
    }

    #[test]
    fn validate_reports_overlap_for_that_user_only() {
        let state = InteractionState::new(vec!["a".into()], vec!["a".into()]);
        assert!(matches!(
            state.validate_user("a"),
            Err(DomainError::Invariant { .. })
        ));
        assert!(state.validate_user("b").is_ok());
    }

    #[test]
    fn legacy_overlap_does_not_block_other_users() {
        let mut state = InteractionState::new(vec!["a".into()], vec!["a".into()]);

        assert_eq!(state.apply("b", InteractionType::Like), InteractionChange::Added);
        assert!(state.validate_user("b").is_ok());
        assert_eq!(state.like_count(), 2);
    }
}
