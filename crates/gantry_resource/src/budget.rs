//! Resource budget with bounded buckets.
//!
//! The budget is plain counters. All mutation happens under the pool's lock,
//! one critical section per acquire or release.

use crate::error::Refusal;
use crate::event::Bucket;
use crate::request::Reservation;
use gantry_core::ResourceConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A counter with a capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gauge<T> {
    /// Capacity
    pub max: T,
    /// In use
    pub used: T,
}

impl Gauge<u64> {
    /// Free capacity
    #[must_use]
    pub fn available(&self) -> u64 {
        self.max.saturating_sub(self.used)
    }

    /// `used / max`, zero for an empty bucket
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        self.used as f64 / self.max as f64
    }
}

impl Gauge<usize> {
    /// Free capacity
    #[must_use]
    pub fn available(&self) -> usize {
        self.max.saturating_sub(self.used)
    }

    /// `used / max`, zero for an empty bucket
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        self.used as f64 / self.max as f64
    }
}

impl Gauge<u32> {
    /// Free capacity
    #[must_use]
    pub fn available(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }

    /// `used / max`, zero for an empty bucket
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        f64::from(self.used) / f64::from(self.max)
    }
}

/// A bucket whose utilization crossed its warning ratio
#[derive(Debug, Clone, PartialEq)]
pub struct Pressure {
    /// Which bucket
    pub bucket: Bucket,
    /// Current utilization
    pub ratio: f64,
    /// Configured warning ratio
    pub threshold: f64,
}

/// Process wide resource budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBudget {
    /// Megabytes
    pub memory: Gauge<u64>,
    /// Concurrent worker slots
    pub workers: Gauge<usize>,
    /// Named connection pools
    pub connections: IndexMap<String, Gauge<u32>>,
    /// Advisory CPU reserved by outstanding tickets
    pub cpu_reserved: f64,
}

impl ResourceBudget {
    /// Empty budget sized from configuration
    #[must_use]
    pub fn from_config(config: &ResourceConfig) -> Self {
        Self {
            memory: Gauge { max: config.memory_max_mb, used: 0 },
            workers: Gauge { max: config.workers_max, used: 0 },
            connections: config
                .connections
                .iter()
                .map(|(name, max)| (name.clone(), Gauge { max: *max, used: 0 }))
                .collect(),
            cpu_reserved: 0.0,
        }
    }

    /// Check the reservation against free capacity. The first bucket that
    /// cannot cover it is reported; CPU is never checked.
    ///
    /// # Errors
    ///
    /// Returns the refusal for the first short bucket
    pub fn check(&self, reservation: &Reservation) -> Result<(), Refusal> {
        if reservation.memory_mb > self.memory.available() {
            return Err(Refusal::Memory {
                requested_mb: reservation.memory_mb,
                available_mb: self.memory.available(),
            });
        }
        if self.workers.available() < reservation.workers {
            return Err(Refusal::Workers { max: self.workers.max });
        }
        for (name, requested) in &reservation.connections {
            let available = self.connections.get(name).map_or(0, Gauge::<u32>::available);
            if *requested > available {
                return Err(Refusal::Connection {
                    name: name.clone(),
                    requested: *requested,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Take a checked reservation
    pub fn reserve(&mut self, reservation: &Reservation) {
        self.memory.used += reservation.memory_mb;
        self.workers.used += reservation.workers;
        for (name, count) in &reservation.connections {
            if let Some(gauge) = self.connections.get_mut(name) {
                gauge.used += count;
            }
        }
        self.cpu_reserved += reservation.cpu;
    }

    /// Give back exactly what `reservation` recorded
    pub fn restore(&mut self, reservation: &Reservation) {
        self.memory.used = self.memory.used.saturating_sub(reservation.memory_mb);
        self.workers.used = self.workers.used.saturating_sub(reservation.workers);
        for (name, count) in &reservation.connections {
            if let Some(gauge) = self.connections.get_mut(name) {
                gauge.used = gauge.used.saturating_sub(*count);
            }
        }
        self.cpu_reserved = (self.cpu_reserved - reservation.cpu).max(0.0);
    }

    /// Zero every counter
    pub fn reset(&mut self) {
        self.memory.used = 0;
        self.workers.used = 0;
        for gauge in self.connections.values_mut() {
            gauge.used = 0;
        }
        self.cpu_reserved = 0.0;
    }

    /// Buckets strictly above their warning ratio
    #[must_use]
    pub fn pressure(&self, config: &ResourceConfig) -> Vec<Pressure> {
        let mut out = Vec::new();
        if self.memory.ratio() > config.memory_warn_ratio {
            out.push(Pressure {
                bucket: Bucket::Memory,
                ratio: self.memory.ratio(),
                threshold: config.memory_warn_ratio,
            });
        }
        if self.workers.ratio() > config.workers_warn_ratio {
            out.push(Pressure {
                bucket: Bucket::Workers,
                ratio: self.workers.ratio(),
                threshold: config.workers_warn_ratio,
            });
        }
        for (name, gauge) in &self.connections {
            if gauge.ratio() > config.connection_warn_ratio {
                out.push(Pressure {
                    bucket: Bucket::Connection(name.clone()),
                    ratio: gauge.ratio(),
                    threshold: config.connection_warn_ratio,
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ResourceConfig {
        ResourceConfig {
            memory_max_mb: 1_000,
            workers_max: 4,
            ..ResourceConfig::default()
        }
    }

    fn reservation(memory_mb: u64, connections: &[(&str, u32)]) -> Reservation {
        Reservation {
            memory_mb,
            workers: 1,
            connections: connections.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
            cpu: 0.0,
        }
    }

    #[test]
    fn test_gauge_ratio() {
        let gauge = Gauge::<u64> { max: 200, used: 50 };
        assert_eq!(gauge.ratio(), 0.25);
        assert_eq!(gauge.available(), 150);
        assert_eq!(Gauge::<u32>::default().ratio(), 0.0);
    }

    #[test]
    fn test_check_reports_first_short_bucket() {
        let mut budget = ResourceBudget::from_config(&config());
        assert!(budget.check(&reservation(1_000, &[])).is_ok());
        assert!(matches!(
            budget.check(&reservation(1_001, &[])),
            Err(Refusal::Memory { available_mb: 1_000, .. })
        ));

        budget.workers.used = 4;
        assert_eq!(budget.check(&reservation(1, &[])), Err(Refusal::Workers { max: 4 }));
    }

    #[test]
    fn test_unknown_connection_has_no_capacity() {
        let budget = ResourceBudget::from_config(&config());
        let err = budget.check(&reservation(1, &[("redis", 1)])).unwrap_err();
        assert_eq!(
            err,
            Refusal::Connection {
                name: "redis".to_string(),
                requested: 1,
                available: 0,
            }
        );
    }

    #[test]
    fn test_reserve_and_restore() {
        let mut budget = ResourceBudget::from_config(&config());
        let r = reservation(300, &[("database", 2)]);
        budget.reserve(&r);
        assert_eq!(budget.memory.used, 300);
        assert_eq!(budget.workers.used, 1);
        assert_eq!(budget.connections["database"].used, 2);

        budget.restore(&r);
        budget.restore(&r);
        assert_eq!(budget.memory.used, 0);
        assert_eq!(budget.workers.used, 0);
        assert_eq!(budget.connections["database"].used, 0);
    }

    #[test]
    fn test_pressure_thresholds_are_strict() {
        let config = config();
        let mut budget = ResourceBudget::from_config(&config);
        budget.memory.used = 800;
        assert!(budget.pressure(&config).is_empty());

        budget.memory.used = 801;
        budget.connections["database"].used = 5;
        let buckets: Vec<_> = budget.pressure(&config).into_iter().map(|p| p.bucket).collect();
        assert_eq!(buckets, vec![Bucket::Memory, Bucket::Connection("database".to_string())]);
    }
}
