//! Leaderboard snapshot: the top active sessions by score, written as a
//! JSON artifact when the process receives a dump signal.

use crate::context::ServerContext;
use log::{info, warn};
use serde::Serialize;

pub const REPORT_PATH: &str = "top5.json";
pub const TOP_N: usize = 5;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub session_id: u32,
    pub score: i32,
}

/// Ranks (session id, score) pairs highest-score first, ties broken by
/// session id, cut to the top N.
pub fn rank(mut scores: Vec<(u32, i32)>) -> Vec<LeaderboardEntry> {
    scores.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    scores.truncate(TOP_N);
    scores
        .into_iter()
        .enumerate()
        .map(|(i, (session_id, score))| LeaderboardEntry {
            rank: i + 1,
            session_id,
            score,
        })
        .collect()
}

/// Collects every active session's score and writes the ranked report. I/O
/// failures are logged, never fatal.
pub async fn write_report(ctx: &ServerContext) {
    let entries = rank(ctx.slots.active_scores().await);
    let json = match serde_json::to_string_pretty(&entries) {
        Ok(json) => json,
        Err(e) => {
            warn!("leaderboard: cannot serialize report: {e}");
            return;
        }
    };
    match tokio::fs::write(REPORT_PATH, json).await {
        Ok(()) => info!(
            "leaderboard: wrote {} entries to {REPORT_PATH}",
            entries.len()
        ),
        Err(e) => warn!("leaderboard: failed to write {REPORT_PATH}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_sorts_by_score_descending() {
        let entries = rank(vec![(1, 5), (2, 9), (3, 7)]);
        let ids: Vec<u32> = entries.iter().map(|e| e.session_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[2].rank, 3);
    }

    #[test]
    fn test_rank_cuts_to_top_five() {
        let scores: Vec<(u32, i32)> = (0..8u32).map(|id| (id, id as i32)).collect();
        let entries = rank(scores);
        assert_eq!(entries.len(), TOP_N);
        assert_eq!(entries[0].session_id, 7);
        assert_eq!(entries[4].session_id, 3);
    }

    #[test]
    fn test_rank_breaks_ties_by_session_id() {
        let entries = rank(vec![(9, 4), (2, 4), (5, 4)]);
        let ids: Vec<u32> = entries.iter().map(|e| e.session_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_rank_empty_is_empty() {
        assert!(rank(Vec::new()).is_empty());
    }
}
