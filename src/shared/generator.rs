//! Synthetic reading generation
//!
//! Sensors are visited round-robin over `[1, N]`. Each reading draws an
//! independent defect flag; defective readings take a value shifted above the
//! normal range so they stay separable by value alone.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::domain::{sensor_key, SensorReading};
use crate::error::GeneratorError;

pub const DEFAULT_SENSOR_COUNT: u32 = 300;
pub const DEFAULT_DEFECT_PROBABILITY: f64 = 0.05;

/// Value ranges for normal and defective readings
///
/// Normal values are drawn from `[normal_min, normal_max)`. Defective values
/// are a normal draw plus an offset from `[defect_offset_min, defect_offset_max]`.
///
/// Fields are private: a profile only exists through [`ValueProfile::new`] or
/// the default, so sampling never sees an empty range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueProfile {
    normal_min: f64,
    normal_max: f64,
    defect_offset_min: f64,
    defect_offset_max: f64,
}

impl Default for ValueProfile {
    fn default() -> Self {
        Self {
            normal_min: 70.0,
            normal_max: 80.0,
            defect_offset_min: 20.0,
            defect_offset_max: 30.0,
        }
    }
}

impl ValueProfile {
    pub fn new(
        normal_min: f64,
        normal_max: f64,
        defect_offset_min: f64,
        defect_offset_max: f64,
    ) -> Result<Self, GeneratorError> {
        if !normal_min.is_finite() || !normal_max.is_finite() || normal_min >= normal_max {
            return Err(GeneratorError::InvalidNormalRange {
                min: normal_min,
                max: normal_max,
            });
        }

        if !defect_offset_min.is_finite()
            || !defect_offset_max.is_finite()
            || defect_offset_min < 0.0
            || defect_offset_min > defect_offset_max
        {
            return Err(GeneratorError::InvalidDefectOffset {
                min: defect_offset_min,
                max: defect_offset_max,
            });
        }

        // Smallest defective value must reach the normal upper bound
        let width = normal_max - normal_min;
        if normal_min + defect_offset_min < normal_max {
            return Err(GeneratorError::NotSeparable {
                offset_min: defect_offset_min,
                width,
            });
        }

        Ok(Self {
            normal_min,
            normal_max,
            defect_offset_min,
            defect_offset_max,
        })
    }

    pub fn normal_min(&self) -> f64 {
        self.normal_min
    }

    /// Exclusive upper bound of normal values; every defective value is at least this
    pub fn normal_max(&self) -> f64 {
        self.normal_max
    }

    /// Largest value a defective reading can take
    pub fn defect_max(&self) -> f64 {
        self.normal_max + self.defect_offset_max
    }

    /// Confidence that a value is defective, scaled to `[0, 1]`
    pub fn defect_confidence(&self, value: f64) -> f64 {
        let span = self.defect_max() - self.normal_min;
        ((value - self.normal_min) / span).clamp(0.0, 1.0)
    }

    fn sample<R: Rng>(&self, rng: &mut R, is_defect: bool) -> f64 {
        let base = rng.gen_range(self.normal_min..self.normal_max);
        if is_defect {
            let value = base + rng.gen_range(self.defect_offset_min..=self.defect_offset_max);
            // Guard the separability bound against float rounding
            value.max(self.normal_max)
        } else {
            base
        }
    }
}

/// Round-robin cursor over sensor indices `[1, count]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorCycle {
    count: u32,
    current: u32,
}

impl SensorCycle {
    pub fn new(count: u32) -> Result<Self, GeneratorError> {
        if count == 0 {
            return Err(GeneratorError::NoSensors);
        }
        Ok(Self { count, current: 1 })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    /// Move to the next sensor, wrapping from `count` back to 1
    pub fn advance(&mut self) {
        self.current = if self.current >= self.count {
            1
        } else {
            self.current + 1
        };
    }
}

/// Generates readings for the sensor the cycle currently points at
#[derive(Debug, Clone)]
pub struct ReadingGenerator<R> {
    cycle: SensorCycle,
    profile: ValueProfile,
    defect_probability: f64,
    rng: R,
}

impl<R: Rng> ReadingGenerator<R> {
    pub fn new(
        sensor_count: u32,
        defect_probability: f64,
        profile: ValueProfile,
        rng: R,
    ) -> Result<Self, GeneratorError> {
        if !(0.0..=1.0).contains(&defect_probability) {
            return Err(GeneratorError::InvalidProbability(defect_probability));
        }

        Ok(Self {
            cycle: SensorCycle::new(sensor_count)?,
            profile,
            defect_probability,
            rng,
        })
    }

    pub fn cycle(&self) -> &SensorCycle {
        &self.cycle
    }

    pub fn profile(&self) -> &ValueProfile {
        &self.profile
    }

    /// Draw a reading for the current sensor without moving the cycle
    pub fn sample(&mut self, timestamp: DateTime<Utc>) -> SensorReading {
        let is_defect = self.rng.gen_bool(self.defect_probability);
        let value = self.profile.sample(&mut self.rng, is_defect);

        SensorReading {
            sensor_id: sensor_key(self.cycle.current()),
            value,
            is_defect,
            timestamp,
        }
    }

    /// Commit the current sensor and move on to the next one
    pub fn advance(&mut self) {
        self.cycle.advance();
    }
}
