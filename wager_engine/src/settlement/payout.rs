//! Pool splitting between winners.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the pool of all stakes is divided among winners
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutPolicy {
    /// Each winner receives `pool * stake / winning_stake`, rounded down
    #[default]
    ProRata,
    /// Each winner receives `pool / winners`, rounded down
    Equal,
}

impl std::fmt::Display for PayoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutPolicy::ProRata => write!(f, "pro_rata"),
            PayoutPolicy::Equal => write!(f, "equal"),
        }
    }
}

impl FromStr for PayoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pro_rata" | "pro-rata" | "prorata" => Ok(PayoutPolicy::ProRata),
            "equal" => Ok(PayoutPolicy::Equal),
            other => Err(format!("unknown payout policy '{other}'")),
        }
    }
}

impl PayoutPolicy {
    /// Split `pool` between winners with the given stakes
    ///
    /// Payouts line up with `stakes` and always sum to `pool`. Points lost to
    /// rounding go out one at a time: for pro-rata to the largest stakes
    /// first, otherwise in entry order. Ties keep entry order.
    pub fn split(self, pool: i64, stakes: &[i64]) -> Vec<i64> {
        if stakes.is_empty() {
            return Vec::new();
        }

        let mut payouts: Vec<i64> = match self {
            PayoutPolicy::ProRata => {
                let winning_stake: i128 = stakes.iter().map(|&s| i128::from(s)).sum();
                if winning_stake <= 0 {
                    return PayoutPolicy::Equal.split(pool, stakes);
                }
                stakes
                    .iter()
                    .map(|&stake| (i128::from(pool) * i128::from(stake) / winning_stake) as i64)
                    .collect()
            }
            PayoutPolicy::Equal => vec![pool / stakes.len() as i64; stakes.len()],
        };

        let mut order: Vec<usize> = (0..stakes.len()).collect();
        if self == PayoutPolicy::ProRata {
            order.sort_by(|&a, &b| stakes[b].cmp(&stakes[a]));
        }

        let mut dust = pool - payouts.iter().sum::<i64>();
        for &index in order.iter().cycle() {
            if dust <= 0 {
                break;
            }
            payouts[index] += 1;
            dust -= 1;
        }

        payouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pro_rata_even_split() {
        assert_eq!(PayoutPolicy::ProRata.split(20, &[10]), vec![20]);
        assert_eq!(PayoutPolicy::ProRata.split(60, &[10, 20]), vec![20, 40]);
    }

    #[test]
    fn test_pro_rata_dust_to_largest_stake() {
        // 100 * 10 / 30 = 33.3, 100 * 20 / 30 = 66.6
        assert_eq!(PayoutPolicy::ProRata.split(100, &[10, 20]), vec![33, 67]);
        // Equal stakes keep entry order
        assert_eq!(PayoutPolicy::ProRata.split(10, &[5, 5, 5]), vec![4, 3, 3]);
    }

    #[test]
    fn test_equal_split() {
        assert_eq!(PayoutPolicy::Equal.split(100, &[10, 20]), vec![50, 50]);
        assert_eq!(PayoutPolicy::Equal.split(100, &[1, 1, 50]), vec![34, 33, 33]);
    }

    #[test]
    fn test_no_winners() {
        assert!(PayoutPolicy::ProRata.split(100, &[]).is_empty());
        assert!(PayoutPolicy::Equal.split(100, &[]).is_empty());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("pro_rata".parse::<PayoutPolicy>(), Ok(PayoutPolicy::ProRata));
        assert_eq!(" Equal ".parse::<PayoutPolicy>(), Ok(PayoutPolicy::Equal));
        assert!("winner_takes_all".parse::<PayoutPolicy>().is_err());
        assert_eq!(PayoutPolicy::ProRata.to_string(), "pro_rata");
    }

    proptest! {
        #[test]
        fn prop_payouts_sum_to_pool(
            stakes in prop::collection::vec(1i64..1_000, 1..20),
            losing in 0i64..10_000,
            equal in any::<bool>(),
        ) {
            let policy = if equal { PayoutPolicy::Equal } else { PayoutPolicy::ProRata };
            let pool = stakes.iter().sum::<i64>() + losing;
            let payouts = policy.split(pool, &stakes);

            prop_assert_eq!(payouts.len(), stakes.len());
            prop_assert_eq!(payouts.iter().sum::<i64>(), pool);
            prop_assert!(payouts.iter().all(|&p| p >= 1));
        }
    }
}
