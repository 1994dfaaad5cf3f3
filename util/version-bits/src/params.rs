use crate::VERSIONBITS_NUM_BITS;
use thiserror::Error;

/// Sentinel `start_time`: the deployment is active from genesis, no
/// signalling window is ever evaluated.
pub const ALWAYS_ACTIVE: i64 = -1;
/// Sentinel `start_time`: the deployment never activates.
pub const NEVER_ACTIVE: i64 = -2;

/// Rejected at construction; the engine itself never fails once a
/// `DeploymentParams` exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    /// `bit` must be in `0..VERSIONBITS_NUM_BITS`.
    #[error("bit {0} is outside 0..{1}")]
    BitOutOfRange(u8, u8),
    /// A period of zero blocks never reaches a boundary.
    #[error("period must be nonzero")]
    ZeroPeriod,
    /// A threshold above the period can never be met.
    #[error("threshold {threshold} exceeds period {period}")]
    ThresholdExceedsPeriod { threshold: u32, period: u32 },
    /// Sentinel start times never evaluate a signalling window, so a
    /// nonzero activation-height floor could never be honoured.
    #[error("min_activation_height must be 0 for a {0} deployment")]
    MinActivationHeightOnSentinel(&'static str),
}

/// Parameters of one registered soft-fork deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeploymentParams {
    bit: u8,
    start_time: i64,
    timeout: i64,
    min_activation_height: u32,
    period: u32,
    threshold: u32,
}

impl DeploymentParams {
    /// Validates and builds a deployment's parameters.
    pub fn new(
        bit: u8,
        start_time: i64,
        timeout: i64,
        min_activation_height: u32,
        period: u32,
        threshold: u32,
    ) -> Result<Self, ParamsError> {
        if bit >= VERSIONBITS_NUM_BITS {
            return Err(ParamsError::BitOutOfRange(bit, VERSIONBITS_NUM_BITS));
        }
        if period == 0 {
            return Err(ParamsError::ZeroPeriod);
        }
        if threshold > period {
            return Err(ParamsError::ThresholdExceedsPeriod { threshold, period });
        }
        if start_time == ALWAYS_ACTIVE && min_activation_height != 0 {
            return Err(ParamsError::MinActivationHeightOnSentinel("ALWAYS_ACTIVE"));
        }
        if start_time == NEVER_ACTIVE && min_activation_height != 0 {
            return Err(ParamsError::MinActivationHeightOnSentinel("NEVER_ACTIVE"));
        }
        Ok(DeploymentParams {
            bit,
            start_time,
            timeout,
            min_activation_height,
            period,
            threshold,
        })
    }

    /// Builds always-active deployment parameters (state is `Active` from
    /// genesis).
    pub fn always_active(bit: u8) -> Result<Self, ParamsError> {
        Self::new(bit, ALWAYS_ACTIVE, 0, 0, DEFAULT_PERIOD_FALLBACK, 1)
    }

    /// Builds never-active deployment parameters (state is `Failed` from
    /// genesis).
    pub fn never_active(bit: u8) -> Result<Self, ParamsError> {
        Self::new(bit, NEVER_ACTIVE, 0, 0, DEFAULT_PERIOD_FALLBACK, 1)
    }

    /// The version bit this deployment signals on.
    pub fn bit(&self) -> u8 {
        self.bit
    }

    /// Median-time-past at or after which `Defined` may move to `Started`.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Median-time-past at or after which signalling gives up.
    pub fn timeout(&self) -> i64 {
        self.timeout
    }

    /// Earliest height `LockedIn` may be entered at, even if the
    /// threshold was already met.
    pub fn min_activation_height(&self) -> u32 {
        self.min_activation_height
    }

    /// Length, in blocks, of one signalling period.
    pub fn period(&self) -> u32 {
        self.period
    }

    /// Minimum number of signalling blocks in a period to lock in.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether this deployment is the `ALWAYS_ACTIVE` sentinel.
    pub fn is_always_active(&self) -> bool {
        self.start_time == ALWAYS_ACTIVE
    }

    /// Whether this deployment is the `NEVER_ACTIVE` sentinel.
    pub fn is_never_active(&self) -> bool {
        self.start_time == NEVER_ACTIVE
    }
}

// Sentinel deployments never walk a period boundary, so the exact value
// here is irrelevant beyond satisfying `threshold <= period`.
const DEFAULT_PERIOD_FALLBACK: u32 = crate::DEFAULT_PERIOD;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_bit() {
        assert_eq!(
            DeploymentParams::new(29, 0, 0, 0, 2016, 1916),
            Err(ParamsError::BitOutOfRange(29, VERSIONBITS_NUM_BITS))
        );
    }

    #[test]
    fn rejects_threshold_above_period() {
        assert!(matches!(
            DeploymentParams::new(0, 0, 1, 0, 100, 200),
            Err(ParamsError::ThresholdExceedsPeriod { .. })
        ));
    }

    #[test]
    fn rejects_activation_height_on_sentinels() {
        assert!(DeploymentParams::new(0, ALWAYS_ACTIVE, 0, 10, 2016, 1916).is_err());
        assert!(DeploymentParams::new(0, NEVER_ACTIVE, 0, 10, 2016, 1916).is_err());
    }

    #[test]
    fn accepts_well_formed_params() {
        assert!(DeploymentParams::new(0, 0, 1, 0, 2016, 1916).is_ok());
    }
}
