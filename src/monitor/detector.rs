// src/monitor/detector.rs

//! Pure threshold logic applied to each sample.
//!
//! Detectors never sleep or do IO; the sampling loop in
//! [`super::watchdog`] feeds them one reading at a time, which keeps the
//! stall and low-resource rules testable with plain value sequences.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::format_bytes;

/// Derived state of a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFlag {
    Progressing,
    Stalled,
    Sufficient,
    Low,
}

/// A timestamped reading plus its derived flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSample {
    pub at: DateTime<Utc>,
    pub value: u64,
    pub flag: SampleFlag,
}

/// Advisory warnings attached to a stage result. They never fail a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorWarning {
    StallDetected {
        source: String,
        size: u64,
        samples: u32,
        at: DateTime<Utc>,
    },
    LowResource {
        source: String,
        available: u64,
        threshold: u64,
        critical: bool,
        at: DateTime<Utc>,
    },
}

impl fmt::Display for MonitorWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorWarning::StallDetected {
                source,
                size,
                samples,
                at,
            } => write!(
                f,
                "{source} stalled at {} for {samples} consecutive samples (since {})",
                format_bytes(*size),
                at.format("%H:%M:%S")
            ),
            MonitorWarning::LowResource {
                source,
                available,
                threshold,
                critical,
                at,
            } => write!(
                f,
                "{}{source} low: {} available, threshold {} (at {})",
                if *critical { "critically " } else { "" },
                format_bytes(*available),
                format_bytes(*threshold),
                at.format("%H:%M:%S")
            ),
        }
    }
}

/// What a detector made of one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub sample: MonitorSample,
    pub warning: Option<MonitorWarning>,
}

/// Stall detection for a value that should keep growing.
///
/// The first reading is the baseline. Each later reading that is not larger
/// than the previous one counts as non-growing; once `stall_samples` of them
/// occur in a row a single warning is raised. Growth resets the episode.
#[derive(Debug, Clone)]
pub struct GrowthDetector {
    stall_samples: u32,
    last: Option<u64>,
    non_growing: u32,
    warned: bool,
}

impl GrowthDetector {
    pub fn new(stall_samples: u32) -> Self {
        Self {
            stall_samples: stall_samples.max(1),
            last: None,
            non_growing: 0,
            warned: false,
        }
    }

    fn observe(&mut self, source: &str, at: DateTime<Utc>, value: u64) -> Observation {
        let grew = match self.last.replace(value) {
            None => true,
            Some(prev) => value > prev,
        };

        if grew {
            self.non_growing = 0;
            self.warned = false;
            return Observation {
                sample: MonitorSample {
                    at,
                    value,
                    flag: SampleFlag::Progressing,
                },
                warning: None,
            };
        }

        self.non_growing += 1;
        let warning = if self.non_growing >= self.stall_samples && !self.warned {
            self.warned = true;
            Some(MonitorWarning::StallDetected {
                source: source.to_string(),
                size: value,
                samples: self.non_growing,
                at,
            })
        } else {
            None
        };

        Observation {
            sample: MonitorSample {
                at,
                value,
                flag: SampleFlag::Stalled,
            },
            warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Sufficient,
    Low,
    Critical,
}

/// Low-resource detection against absolute and percentage thresholds.
///
/// A warning is raised whenever the level gets worse (sufficient → low,
/// low → critical). Returning to sufficient re-arms the detector.
#[derive(Debug, Clone)]
pub struct ResourceDetector {
    low_bytes: u64,
    critical_bytes: u64,
    low_percent: Option<f64>,
    level: Level,
}

impl ResourceDetector {
    pub fn new(low_bytes: u64, critical_bytes: u64) -> Self {
        Self {
            low_bytes,
            critical_bytes: critical_bytes.min(low_bytes),
            low_percent: None,
            level: Level::Sufficient,
        }
    }

    pub fn with_low_percent(mut self, percent: Option<f64>) -> Self {
        self.low_percent = percent;
        self
    }

    fn percent_threshold(&self, capacity: Option<u64>) -> Option<u64> {
        let pct = self.low_percent?;
        let total = capacity.filter(|t| *t > 0)?;
        Some((total as f64 * pct / 100.0) as u64)
    }

    fn classify(&self, value: u64, capacity: Option<u64>) -> (Level, u64) {
        if value < self.critical_bytes {
            return (Level::Critical, self.critical_bytes);
        }
        if value < self.low_bytes {
            return (Level::Low, self.low_bytes);
        }
        match self.percent_threshold(capacity) {
            Some(threshold) if value < threshold => (Level::Low, threshold),
            _ => (Level::Sufficient, self.low_bytes),
        }
    }

    fn observe(
        &mut self,
        source: &str,
        at: DateTime<Utc>,
        value: u64,
        capacity: Option<u64>,
    ) -> Observation {
        let (level, threshold) = self.classify(value, capacity);
        let previous = std::mem::replace(&mut self.level, level);

        let warning = (level > previous).then(|| MonitorWarning::LowResource {
            source: source.to_string(),
            available: value,
            threshold,
            critical: level == Level::Critical,
            at,
        });

        if level == Level::Sufficient && previous != Level::Sufficient {
            tracing::info!(source, available = %format_bytes(value), "resource level recovered");
        }

        let flag = match level {
            Level::Sufficient => SampleFlag::Sufficient,
            Level::Low | Level::Critical => SampleFlag::Low,
        };
        Observation {
            sample: MonitorSample { at, value, flag },
            warning,
        }
    }
}

/// The threshold rule a monitor applies to its signal.
#[derive(Debug, Clone)]
pub enum Detector {
    Growth(GrowthDetector),
    Resource(ResourceDetector),
}

impl Detector {
    pub fn growth(stall_samples: u32) -> Self {
        Detector::Growth(GrowthDetector::new(stall_samples))
    }

    pub fn resource(low_bytes: u64, critical_bytes: u64, low_percent: Option<f64>) -> Self {
        Detector::Resource(ResourceDetector::new(low_bytes, critical_bytes).with_low_percent(low_percent))
    }

    pub fn observe(
        &mut self,
        source: &str,
        at: DateTime<Utc>,
        value: u64,
        capacity: Option<u64>,
    ) -> Observation {
        match self {
            Detector::Growth(d) => d.observe(source, at, value),
            Detector::Resource(d) => d.observe(source, at, value, capacity),
        }
    }

    /// Growth signals are worth periodic progress lines; resource levels
    /// only matter when they cross a threshold.
    pub fn reports_progress(&self) -> bool {
        matches!(self, Detector::Growth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(detector: &mut Detector, values: &[u64]) -> Vec<(usize, MonitorWarning)> {
        values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| {
                detector
                    .observe("dump.sql", Utc::now(), *v, Some(1000))
                    .warning
                    .map(|w| (i + 1, w))
            })
            .collect()
    }

    #[test]
    fn flat_sequence_warns_on_fourth_sample() {
        let mut d = Detector::growth(3);
        let warnings = run(&mut d, &[0, 0, 0, 0, 0]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].0, 4);
        assert!(matches!(
            warnings[0].1,
            MonitorWarning::StallDetected { samples: 3, size: 0, .. }
        ));
    }

    #[test]
    fn growing_sequence_never_warns() {
        let mut d = Detector::growth(3);
        assert!(run(&mut d, &[0, 10, 25, 40]).is_empty());
    }

    #[test]
    fn growth_resets_stall_episode() {
        let mut d = Detector::growth(2);
        let warnings = run(&mut d, &[5, 5, 5, 5, 9, 9, 9]);
        let at: Vec<usize> = warnings.iter().map(|(i, _)| *i).collect();
        assert_eq!(at, vec![3, 7]);
    }

    #[test]
    fn first_sample_is_only_a_baseline() {
        let mut d = GrowthDetector::new(1);
        let obs = d.observe("f", Utc::now(), 0);
        assert_eq!(obs.sample.flag, SampleFlag::Progressing);
        assert!(obs.warning.is_none());
        let obs = d.observe("f", Utc::now(), 0);
        assert_eq!(obs.sample.flag, SampleFlag::Stalled);
        assert!(obs.warning.is_some());
    }

    #[test]
    fn resource_warns_on_each_worsening() {
        let mut d = Detector::resource(500, 250, None);
        let warnings = run(&mut d, &[900, 400, 300, 200, 100, 900, 450]);
        let summary: Vec<(usize, bool)> = warnings
            .iter()
            .map(|(i, w)| match w {
                MonitorWarning::LowResource { critical, .. } => (*i, *critical),
                other => panic!("unexpected warning {other:?}"),
            })
            .collect();
        assert_eq!(summary, vec![(2, false), (4, true), (7, false)]);
    }

    #[test]
    fn resource_percent_threshold_uses_capacity() {
        let mut d = ResourceDetector::new(0, 0).with_low_percent(Some(10.0));
        let obs = d.observe("memory", Utc::now(), 50, Some(1000));
        assert_eq!(obs.sample.flag, SampleFlag::Low);
        match obs.warning {
            Some(MonitorWarning::LowResource { threshold, critical, .. }) => {
                assert_eq!(threshold, 100);
                assert!(!critical);
            }
            other => panic!("expected LowResource, got {other:?}"),
        }

        let mut no_capacity = ResourceDetector::new(0, 0).with_low_percent(Some(10.0));
        let obs = no_capacity.observe("memory", Utc::now(), 50, None);
        assert_eq!(obs.sample.flag, SampleFlag::Sufficient);
    }

    #[test]
    fn warning_display_is_human_readable() {
        let w = MonitorWarning::LowResource {
            source: "memory".into(),
            available: 200 * 1024 * 1024,
            threshold: 250 * 1024 * 1024,
            critical: true,
            at: Utc::now(),
        };
        let text = w.to_string();
        assert!(text.starts_with("critically memory low: 200.00 MiB available"));
    }
}
