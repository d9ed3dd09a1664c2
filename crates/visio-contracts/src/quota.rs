use std::fmt;

use thiserror::Error;

pub const FREE_GENERATION_LIMIT: u64 = 5;

pub const UNBOUNDED_SENTINEL: &str = "Infinity";

// Ordered so that every finite limit sorts below `Unbounded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QuotaLimit {
    Finite(u64),
    Unbounded,
}

impl Default for QuotaLimit {
    fn default() -> Self {
        QuotaLimit::Finite(FREE_GENERATION_LIMIT)
    }
}

impl fmt::Display for QuotaLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaLimit::Finite(limit) => write!(f, "{limit}"),
            QuotaLimit::Unbounded => f.write_str(UNBOUNDED_SENTINEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid coupon code. Please try again.")]
pub struct CouponRejected {
    pub code: String,
}

pub fn can_generate(count: u64, limit: QuotaLimit) -> bool {
    match limit {
        QuotaLimit::Finite(limit) => count < limit,
        QuotaLimit::Unbounded => true,
    }
}

pub fn apply_coupon(code: &str) -> Result<QuotaLimit, CouponRejected> {
    match code.trim().to_uppercase().as_str() {
        "PAID30" => Ok(QuotaLimit::Finite(30)),
        "PAID80" => Ok(QuotaLimit::Finite(80)),
        "PAID99" => Ok(QuotaLimit::Unbounded),
        _ => Err(CouponRejected {
            code: code.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuotaState {
    pub limit: QuotaLimit,
    pub count: u64,
}

impl QuotaState {
    pub fn new(limit: QuotaLimit, count: u64) -> Self {
        Self { limit, count }
    }

    pub fn can_generate(&self) -> bool {
        can_generate(self.count, self.limit)
    }

    pub fn is_exhausted(&self) -> bool {
        !self.can_generate()
    }

    pub fn record_generation(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn redeem(&mut self, code: &str) -> Result<QuotaLimit, CouponRejected> {
        let granted = apply_coupon(code)?;
        self.limit = self.limit.max(granted);
        Ok(self.limit)
    }

    pub fn remaining(&self) -> Option<u64> {
        match self.limit {
            QuotaLimit::Finite(limit) => Some(limit.saturating_sub(self.count)),
            QuotaLimit::Unbounded => None,
        }
    }

    pub fn plan_name(&self) -> String {
        match self.limit {
            QuotaLimit::Unbounded => "Premium Plan".to_string(),
            QuotaLimit::Finite(limit) if limit > FREE_GENERATION_LIMIT => {
                format!("Paid Plan ({limit})")
            }
            QuotaLimit::Finite(_) => "Free Plan".to_string(),
        }
    }

    pub fn limit_reached_message(&self) -> String {
        format!(
            "You have reached your generation limit of {}. Please enter a new coupon code to continue.",
            self.limit
        )
    }

    pub fn status_line(&self) -> String {
        match self.remaining() {
            None => format!("{}: unlimited image generations.", self.plan_name()),
            Some(remaining) => format!(
                "{}: {remaining} / {} generations remaining.",
                self.plan_name(),
                self.limit
            ),
        }
    }
}
