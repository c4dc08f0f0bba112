use serde::Serialize;
use uuid::Uuid;

use crate::post::models::vote::{Vote, VoteId, VoteValue};

/// The single mutation needed to move a user's vote on a post to the state
/// they asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VoteAction {
    Insert { value: VoteValue },
    Update { id: VoteId, value: VoteValue },
    Delete { id: VoteId },
}

/// Decides what to do with `existing`, the user's current vote on the post,
/// when they press `requested`. Pressing the direction already held takes the
/// vote back.
pub fn reconcile(requested: VoteValue, existing: Option<&Vote>) -> VoteAction {
    match existing {
        None => VoteAction::Insert { value: requested },
        Some(vote) if vote.value == requested => VoteAction::Delete { id: vote.id },
        Some(vote) => VoteAction::Update {
            id: vote.id,
            value: requested,
        },
    }
}

pub fn find_user_vote(votes: &[Vote], user_id: Uuid) -> Option<&Vote> {
    votes.iter().find(|v| v.user_id == user_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VoteTally {
    pub likes: usize,
    pub dislikes: usize,
}

impl VoteTally {
    pub fn from_votes(votes: &[Vote]) -> Self {
        votes
            .iter()
            .fold(VoteTally::default(), |mut tally, v| {
                match v.value {
                    VoteValue::Like => tally.likes += 1,
                    VoteValue::Dislike => tally.dislikes += 1,
                }
                tally
            })
    }
}

/// What a reader sees next to a post: the tally and, when signed in, their
/// own vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteSummary {
    pub likes: usize,
    pub dislikes: usize,
    pub user_vote: Option<VoteValue>,
}

impl VoteSummary {
    pub fn new(tally: VoteTally, votes: &[Vote], viewer: Option<Uuid>) -> Self {
        VoteSummary {
            likes: tally.likes,
            dislikes: tally.dislikes,
            user_vote: viewer
                .and_then(|user_id| find_user_vote(votes, user_id))
                .map(|v| v.value),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vote(id: VoteId, user: u128, value: VoteValue) -> Vote {
        Vote {
            id,
            post_id: 42,
            user_id: Uuid::from_u128(user),
            value,
        }
    }

    #[test]
    fn test_reconcile_without_existing_vote_inserts() {
        assert_eq!(
            reconcile(VoteValue::Like, None),
            VoteAction::Insert {
                value: VoteValue::Like
            }
        );
        assert_eq!(
            reconcile(VoteValue::Dislike, None),
            VoteAction::Insert {
                value: VoteValue::Dislike
            }
        );
    }

    #[test]
    fn test_reconcile_same_direction_toggles_off() {
        let like = vote(3, 1, VoteValue::Like);
        assert_eq!(
            reconcile(VoteValue::Like, Some(&like)),
            VoteAction::Delete { id: 3 }
        );

        let dislike = vote(4, 1, VoteValue::Dislike);
        assert_eq!(
            reconcile(VoteValue::Dislike, Some(&dislike)),
            VoteAction::Delete { id: 4 }
        );
    }

    #[test]
    fn test_reconcile_opposite_direction_updates_in_place() {
        let dislike = vote(5, 1, VoteValue::Dislike);
        assert_eq!(
            reconcile(VoteValue::Like, Some(&dislike)),
            VoteAction::Update {
                id: 5,
                value: VoteValue::Like
            }
        );
    }

    #[test]
    fn test_tally_counts_each_direction() {
        let votes = vec![
            vote(1, 1, VoteValue::Like),
            vote(2, 2, VoteValue::Like),
            vote(3, 3, VoteValue::Dislike),
        ];

        assert_eq!(
            VoteTally::from_votes(&votes),
            VoteTally {
                likes: 2,
                dislikes: 1
            }
        );
        assert_eq!(VoteTally::from_votes(&[]), VoteTally::default());
    }

    #[test]
    fn test_summary_reports_viewer_vote() {
        let votes = vec![vote(1, 1, VoteValue::Like), vote(2, 2, VoteValue::Dislike)];
        let tally = VoteTally::from_votes(&votes);

        let summary = VoteSummary::new(tally, &votes, Some(Uuid::from_u128(2)));
        assert_eq!(summary.user_vote, Some(VoteValue::Dislike));

        let anonymous = VoteSummary::new(tally, &votes, None);
        assert_eq!(anonymous.user_vote, None);
        assert_eq!((anonymous.likes, anonymous.dislikes), (1, 1));
    }

    #[test]
    fn test_vote_value_wire_format() {
        assert_eq!(serde_json::to_string(&VoteValue::Dislike).unwrap(), "-1");
        assert_eq!(
            serde_json::from_str::<VoteValue>("1").unwrap(),
            VoteValue::Like
        );
        assert!(serde_json::from_str::<VoteValue>("0").is_err());

        let action = serde_json::to_value(VoteAction::Update {
            id: 9,
            value: VoteValue::Like,
        })
        .unwrap();
        assert_eq!(
            action,
            serde_json::json!({ "action": "update", "id": 9, "value": 1 })
        );
    }
}
