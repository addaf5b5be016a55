//! Sampled PID controller.
//!
//! `update` is rate limited: calls closer together than the sample interval
//! return the previous output and leave the state untouched. Output and
//! integral clamping are opt-in; with both unset the controller is a plain
//! unclamped PID.
//!
//! # Example
//!
//! ```rust
//! use cryotherm::pid::{PidConfig, PidController};
//!
//! let config = PidConfig::default()
//!     .with_gains(1.0, 0.0, 0.0)
//!     .with_setpoint(10.0)
//!     .with_sample_interval_ms(0);
//! let mut pid = PidController::new(config).unwrap();
//!
//! assert_eq!(pid.update(7.0, 0), 3.0);
//! ```

use crate::error::ConfigError;

/// Gains, setpoint and limits for one control axis.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PidConfig {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain (per second).
    pub ki: f64,
    /// Derivative gain (seconds).
    pub kd: f64,
    /// Target value.
    pub setpoint: f64,
    /// Minimum time between samples in milliseconds.
    pub sample_interval_ms: u64,
    /// Optional `(min, max)` output clamp.
    pub output_limits: Option<(f64, f64)>,
    /// Optional symmetric clamp on the integral accumulator.
    pub integral_limit: Option<f64>,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.12,
            ki: 0.004,
            kd: 0.9,
            setpoint: 0.0,
            sample_interval_ms: 250,
            output_limits: None,
            integral_limit: None,
        }
    }
}

impl PidConfig {
    /// Set all three gains
    pub fn with_gains(mut self, kp: f64, ki: f64, kd: f64) -> Self {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self
    }

    /// Set the setpoint
    pub fn with_setpoint(mut self, setpoint: f64) -> Self {
        self.setpoint = setpoint;
        self
    }

    /// Set the sample interval
    pub fn with_sample_interval_ms(mut self, ms: u64) -> Self {
        self.sample_interval_ms = ms;
        self
    }

    /// Clamp the output to `[min, max]`
    pub fn with_output_limits(mut self, min: f64, max: f64) -> Self {
        self.output_limits = Some((min, max));
        self
    }

    /// Clamp the integral accumulator to `[-limit, limit]`
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = Some(limit);
        self
    }

    /// Checks gains and limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [self.kp, self.ki, self.kd, self.setpoint]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(ConfigError::InvalidPid("gains and setpoint must be finite"));
        }
        if let Some((min, max)) = self.output_limits {
            if !(min < max) {
                return Err(ConfigError::InvalidPid(
                    "output minimum must be below maximum",
                ));
            }
        }
        if let Some(limit) = self.integral_limit {
            if !(limit > 0.0) {
                return Err(ConfigError::InvalidPid("integral limit must be positive"));
            }
        }
        Ok(())
    }
}

/// Mutable controller state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PidState {
    /// Accumulated `error · dt`.
    pub integral: f64,
    /// Error at the last accepted sample.
    pub previous_error: f64,
    /// Time of the last accepted sample.
    pub last_sample_ms: Option<u64>,
    /// Output of the last accepted sample.
    pub output: f64,
}

/// PID controller for one axis.
#[derive(Clone, Debug)]
pub struct PidController {
    config: PidConfig,
    state: PidState,
}

impl PidController {
    /// Creates a controller after validating the configuration.
    pub fn new(config: PidConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: PidState::default(),
        })
    }

    /// Feeds one measurement taken at `now_ms` and returns the output.
    ///
    /// The first sample has `dt = 0` and contributes no integral or
    /// derivative term.
    pub fn update(&mut self, measurement: f64, now_ms: u64) -> f64 {
        let dt = match self.state.last_sample_ms {
            Some(last) => {
                let elapsed = now_ms.saturating_sub(last);
                if elapsed < self.config.sample_interval_ms {
                    return self.state.output;
                }
                elapsed as f64 / 1000.0
            }
            None => 0.0,
        };

        let error = self.config.setpoint - measurement;

        let mut integral = self.state.integral + error * dt;
        if let Some(limit) = self.config.integral_limit {
            integral = integral.clamp(-limit, limit);
        }

        let derivative = if dt > 0.0 {
            (error - self.state.previous_error) / dt
        } else {
            0.0
        };

        let mut output =
            self.config.kp * error + self.config.ki * integral + self.config.kd * derivative;
        if let Some((min, max)) = self.config.output_limits {
            output = output.clamp(min, max);
        }

        self.state = PidState {
            integral,
            previous_error: error,
            last_sample_ms: Some(now_ms),
            output,
        };
        output
    }

    /// Changes the setpoint. The integral is kept.
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.config.setpoint = setpoint;
    }

    /// Changes the gains. The integral is kept.
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.config.kp = kp;
        self.config.ki = ki;
        self.config.kd = kd;
    }

    /// Clears all accumulated state.
    pub fn reset(&mut self) {
        self.state = PidState::default();
    }

    /// Current setpoint.
    pub fn setpoint(&self) -> f64 {
        self.config.setpoint
    }

    /// Current `(kp, ki, kd)`.
    pub fn gains(&self) -> (f64, f64, f64) {
        (self.config.kp, self.config.ki, self.config.kd)
    }

    /// Output of the last accepted sample.
    pub fn output(&self) -> f64 {
        self.state.output
    }

    /// Snapshot of the internal state.
    pub fn state(&self) -> PidState {
        self.state
    }

    /// Active configuration.
    pub fn config(&self) -> &PidConfig {
        &self.config
    }
}
