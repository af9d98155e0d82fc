//! Heuristic scores expressed as rule tables.
//!
//! A scorecard starts at its base and, for every rule family, adds the delta
//! of the first tier whose predicate holds. Families stack; tiers within a
//! family do not. The result is clamped to `[0, 100]`.

/// Everything the scoring rules look at.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreInputs {
    pub safe_at_risk_ratio: f64,
    pub job_stop_rate: u32,
    pub near_miss_total: usize,
    pub incidents: usize,
    pub sif_rate: u32,
    pub open_sail: usize,
    pub safe_obs: usize,
    pub at_risk_obs: usize,
    pub days_since_last_submission: i64,
    pub total_leading: usize,
}

#[derive(Clone, Copy)]
pub struct Tier {
    pub when: fn(&ScoreInputs) -> bool,
    pub delta: i32,
}

#[derive(Clone, Copy)]
pub struct RuleFamily {
    pub name: &'static str,
    pub tiers: &'static [Tier],
}

impl RuleFamily {
    /// Delta of the first matching tier, or zero.
    pub fn delta(&self, inputs: &ScoreInputs) -> i32 {
        self.tiers
            .iter()
            .find(|tier| (tier.when)(inputs))
            .map(|tier| tier.delta)
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy)]
pub struct Scorecard {
    pub name: &'static str,
    pub base: i32,
    pub families: &'static [RuleFamily],
}

impl Scorecard {
    pub fn score(&self, inputs: &ScoreInputs) -> u32 {
        let mut raw = self.base;
        for family in self.families {
            let delta = family.delta(inputs);
            if delta != 0 {
                tracing::debug!(
                    scorecard = self.name,
                    family = family.name,
                    delta,
                    "rule applied"
                );
            }
            raw += delta;
        }
        raw.clamp(0, 100) as u32
    }
}

pub const SAFETY_CULTURE: Scorecard = Scorecard {
    name: "safety_culture_index",
    base: 70,
    families: &[
        RuleFamily {
            name: "safe_at_risk_ratio",
            tiers: &[
                Tier { when: |i| i.safe_at_risk_ratio >= 10.0, delta: 10 },
                Tier { when: |i| i.safe_at_risk_ratio >= 5.0, delta: 7 },
                Tier { when: |i| i.safe_at_risk_ratio >= 3.0, delta: 5 },
            ],
        },
        RuleFamily {
            name: "job_stop_rate",
            tiers: &[
                Tier { when: |i| i.job_stop_rate >= 50, delta: 10 },
                Tier { when: |i| i.job_stop_rate >= 25, delta: 5 },
            ],
        },
        RuleFamily {
            name: "near_miss_reporting",
            tiers: &[
                Tier { when: |i| i.near_miss_total >= 10, delta: 10 },
                Tier { when: |i| i.near_miss_total >= 5, delta: 5 },
            ],
        },
        RuleFamily {
            name: "incidents",
            tiers: &[
                Tier { when: |i| i.incidents >= 5, delta: -15 },
                Tier { when: |i| i.incidents >= 1, delta: -5 },
            ],
        },
        RuleFamily {
            name: "sif_rate",
            tiers: &[Tier { when: |i| i.sif_rate >= 30, delta: -10 }],
        },
        RuleFamily {
            name: "open_sail",
            tiers: &[
                Tier { when: |i| i.open_sail >= 5, delta: -10 },
                Tier { when: |i| i.open_sail >= 1, delta: -3 },
            ],
        },
    ],
};

/// Higher is worse.
pub const PREDICTIVE_RISK: Scorecard = Scorecard {
    name: "predictive_risk_score",
    base: 0,
    families: &[
        RuleFamily {
            name: "open_sail",
            tiers: &[
                Tier { when: |i| i.open_sail >= 10, delta: 25 },
                Tier { when: |i| i.open_sail >= 5, delta: 15 },
                Tier { when: |i| i.open_sail >= 1, delta: 5 },
            ],
        },
        RuleFamily {
            name: "sif_rate",
            tiers: &[
                Tier { when: |i| i.sif_rate >= 30, delta: 20 },
                Tier { when: |i| i.sif_rate >= 15, delta: 10 },
            ],
        },
        RuleFamily {
            name: "at_risk_imbalance",
            tiers: &[Tier { when: |i| i.at_risk_obs > i.safe_obs, delta: 15 }],
        },
        RuleFamily {
            name: "staleness",
            tiers: &[
                Tier { when: |i| i.days_since_last_submission > 14, delta: 20 },
                Tier { when: |i| i.days_since_last_submission > 7, delta: 10 },
            ],
        },
        RuleFamily {
            name: "incidents",
            tiers: &[
                Tier { when: |i| i.incidents >= 5, delta: 20 },
                Tier { when: |i| i.incidents >= 1, delta: 10 },
            ],
        },
    ],
};

pub const FORECAST_30_DAY: Scorecard = Scorecard {
    name: "forecast_30_day",
    base: 30,
    families: &[
        RuleFamily {
            name: "staleness",
            tiers: &[Tier { when: |i| i.days_since_last_submission > 7, delta: 15 }],
        },
        RuleFamily {
            name: "open_sail_backlog",
            tiers: &[Tier { when: |i| i.open_sail > 3, delta: 10 }],
        },
        RuleFamily {
            name: "at_risk_imbalance",
            tiers: &[Tier {
                when: |i| i.at_risk_obs as f64 > i.safe_obs as f64 * 0.5,
                delta: 10,
            }],
        },
        RuleFamily {
            name: "leading_volume",
            tiers: &[
                Tier { when: |i| i.total_leading >= 50, delta: -15 },
                Tier { when: |i| i.total_leading >= 20, delta: -8 },
            ],
        },
    ],
};
