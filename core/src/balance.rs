//! Player balances and the pure derivation that produces them.
//!
//! `derive_balance` is the single place the accounting formula lives.
//! Both reconciliation paths and the redemption guard call it.

use crate::{
    config::CapPolicy,
    types::{Category, PlayerName, Points},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryPoints {
    pub attendance: Points,
    pub flag: Points,
    pub dice: Points,
}

impl CategoryPoints {
    pub fn set(&mut self, category: Category, points: Points) {
        match category {
            Category::Attendance => self.attendance = points,
            Category::Flag => self.flag = points,
            Category::Dice => self.dice = points,
        }
    }

    pub fn total(&self) -> Points {
        self.attendance
            .saturating_add(self.flag)
            .saturating_add(self.dice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerBalance {
    pub name: PlayerName,
    pub points: CategoryPoints,
    pub historical: Points,
    pub redeemed: Points,
    pub current: Points,
    pub overflow: Points,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PlayerBalance {
    /// The columns reconciliation owns, compared for change detection.
    /// `last_updated` is not among them.
    pub fn derived_values(&self) -> [Points; 7] {
        [
            self.current,
            self.points.attendance,
            self.points.flag,
            self.points.dice,
            self.historical,
            self.redeemed,
            self.overflow,
        ]
    }

    /// Shift `historical` by a manual adjustment carried over from the
    /// stored row, flooring at 0, and settle again.
    pub fn with_adjustment(mut self, offset: Points, cap: Points, policy: CapPolicy) -> Self {
        if offset == 0 {
            return self;
        }
        self.historical = self.historical.saturating_add(offset).max(0);
        let (current, overflow) = settle(self.historical, self.redeemed, cap, policy);
        self.current = current;
        self.overflow = overflow;
        self
    }
}

/// `current` and `overflow` for a given earned/spent pair.
///
///   current  = clamp(historical - redeemed, 0, cap)
///   overflow = max(historical - redeemed - cap, 0)   (TrackOverflow only)
pub fn settle(historical: Points, redeemed: Points, cap: Points, policy: CapPolicy) -> (Points, Points) {
    let cap = cap.max(0);
    let uncapped = historical.saturating_sub(redeemed);
    let current = uncapped.clamp(0, cap);
    let overflow = match policy {
        CapPolicy::TrackOverflow => uncapped.saturating_sub(cap).max(0),
        CapPolicy::HardClamp => 0,
    };
    (current, overflow)
}

/// Derive a player's balance from aggregated source points and the sum of
/// their redemptions. Pure: no store, no clock.
pub fn derive_balance(
    name: &str,
    points: CategoryPoints,
    redeemed: Points,
    cap: Points,
    policy: CapPolicy,
) -> PlayerBalance {
    let historical = points.total();
    let (current, overflow) = settle(historical, redeemed, cap, policy);
    PlayerBalance {
        name: name.to_string(),
        points,
        historical,
        redeemed,
        current,
        overflow,
        last_updated: None,
    }
}
