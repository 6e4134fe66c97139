// Age-based activity ceilings for young accounts
use crate::core::tracker::types::ActivitySnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmupTier {
    New,
    Warming,
    Ready,
    Established,
}

/// Daily ceilings for one tier. A ceiling of 0 means "not tracked".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub max_comments: u32,
    pub max_posts: u32,
    /// Not observable through the public endpoints, reported only
    pub max_votes: u32,
    pub target_score: i64,
}

impl WarmupTier {
    pub const ALL: [WarmupTier; 4] = [
        WarmupTier::New,
        WarmupTier::Warming,
        WarmupTier::Ready,
        WarmupTier::Established,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WarmupTier::New => "new",
            WarmupTier::Warming => "warming",
            WarmupTier::Ready => "ready",
            WarmupTier::Established => "established",
        }
    }

    /// Age range `[start, end)` in days; `None` end is open
    pub fn age_range(&self) -> (u32, Option<u32>) {
        match self {
            WarmupTier::New => (0, Some(7)),
            WarmupTier::Warming => (7, Some(14)),
            WarmupTier::Ready => (14, Some(30)),
            WarmupTier::Established => (30, None),
        }
    }

    pub fn limits(&self) -> TierLimits {
        match self {
            WarmupTier::New => TierLimits {
                max_comments: 3,
                max_posts: 0,
                max_votes: 10,
                target_score: 15,
            },
            WarmupTier::Warming => TierLimits {
                max_comments: 5,
                max_posts: 1,
                max_votes: 20,
                target_score: 100,
            },
            WarmupTier::Ready => TierLimits {
                max_comments: 8,
                max_posts: 2,
                max_votes: 30,
                target_score: 250,
            },
            WarmupTier::Established => TierLimits {
                max_comments: 15,
                max_posts: 3,
                max_votes: 50,
                target_score: 500,
            },
        }
    }
}

impl fmt::Display for WarmupTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn tier_for(age_days: u32) -> WarmupTier {
    WarmupTier::ALL
        .into_iter()
        .find(|tier| match tier.age_range() {
            (start, Some(end)) => (start..end).contains(&age_days),
            (start, None) => age_days >= start,
        })
        .unwrap_or(WarmupTier::Established)
}

/// Warnings for today's activity against the tier's ceilings
pub fn check_thresholds(activity: &ActivitySnapshot, tier: WarmupTier, alert_ratio: f64) -> Vec<String> {
    let limits = tier.limits();
    let mut warnings = Vec::new();

    let metrics = [
        ("comment", activity.comments_today, limits.max_comments),
        ("post", activity.posts_today, limits.max_posts),
    ];

    for (label, actual, ceiling) in metrics {
        if ceiling == 0 {
            continue;
        }
        let ratio = actual as f64 / ceiling as f64;
        if ratio >= 1.0 {
            warnings.push(format!(
                "EXCEEDED: {} has {} {}s (limit: {})",
                activity.account_id, actual, label, ceiling
            ));
        } else if ratio >= alert_ratio {
            warnings.push(format!(
                "WARNING: {} at {}% of {} limit",
                activity.account_id,
                (ratio * 100.0) as u32,
                label
            ));
        }
    }

    warnings
}
