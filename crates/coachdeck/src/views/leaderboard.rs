use serde::Serialize;

use coachdeck_api::{AccountabilityMember, SyncedEntity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based
    pub rank: usize,
    pub id: String,
    pub label: String,
    pub score: i64,
}

/// Rank entities by `score` descending, ties broken by id ascending.
///
/// The order is total, so the same input always yields the same ranks.
pub fn rank_by<T, F, L>(items: &[T], score: F, label: L) -> Vec<LeaderboardEntry>
where
    T: SyncedEntity,
    F: Fn(&T) -> i64,
    L: Fn(&T) -> String,
{
    let mut scored: Vec<(i64, &T)> = items.iter().map(|item| (score(item), item)).collect();
    scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.id().cmp(b.id())));
    scored
        .into_iter()
        .enumerate()
        .map(|(index, (score, item))| LeaderboardEntry {
            rank: index + 1,
            id: item.id().to_string(),
            label: label(item),
            score,
        })
        .collect()
}

pub fn leaderboard(members: &[AccountabilityMember]) -> Vec<LeaderboardEntry> {
    rank_by(members, AccountabilityMember::score, |m| m.display_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn member(id: &str, points: i64, streak_days: u32, checkins: u32) -> AccountabilityMember {
        AccountabilityMember {
            id: id.to_string(),
            user_id: "coach".to_string(),
            display_name: format!("Member {id}"),
            points,
            streak_days,
            checkins_completed: checkins,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_leaderboard_ranks_and_breaks_ties_by_id() {
        let board = leaderboard(&[
            member("b", 10, 0, 0),
            member("c", 4, 3, 0),
            member("a", 10, 0, 0),
            member("d", 1, 0, 0),
        ]);
        let order: Vec<(&str, usize)> = board.iter().map(|e| (e.id.as_str(), e.rank)).collect();
        assert_eq!(order, vec![("a", 1), ("b", 2), ("c", 3), ("d", 4)]);
        assert_eq!(board[2].score, 10);
    }

    #[test]
    fn test_extreme_points_saturate() {
        let board = leaderboard(&[
            member("max", i64::MAX, 1, 1),
            member("min", i64::MIN, 0, 0),
            member("zero", 0, 0, 0),
        ]);
        assert_eq!(board[0].id, "max");
        assert_eq!(board[0].score, i64::MAX);
        assert_eq!(board[2].score, i64::MIN);
    }

    #[test]
    fn test_empty_leaderboard() {
        assert!(leaderboard(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_leaderboard_is_order_independent(
            scores in prop::collection::vec((0i64..50, 0u32..5, 0u32..5), 0..20),
            rotate in 0usize..20,
        ) {
            let members: Vec<AccountabilityMember> = scores
                .iter()
                .enumerate()
                .map(|(i, (p, s, c))| member(&format!("m{i:02}"), *p, *s, *c))
                .collect();
            let mut shuffled = members.clone();
            if !shuffled.is_empty() {
                let k = rotate % shuffled.len();
                shuffled.rotate_left(k);
            }
            shuffled.reverse();

            let a = leaderboard(&members);
            let b = leaderboard(&shuffled);
            prop_assert_eq!(&a, &b);
            for pair in a.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
