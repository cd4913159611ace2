use serde::{
    Deserialize,
    Serialize,
};
use tracing::warn;

use crate::library::ReferenceLibrary;

/// Retention-time window applied per scan, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RtFilter {
    /// Half-width of the acceptance window.
    pub window: f64,
    /// Offset added to every library retention time.
    #[serde(default)]
    pub adjust: f64,
}

/// Selects, per scan time, the references allowed into the fit.
#[derive(Debug, Clone)]
pub struct RtGate {
    retention_times: Vec<f64>,
    background: Option<usize>,
    filter: RtFilter,
}

impl RtGate {
    pub fn new(library: &ReferenceLibrary, filter: RtFilter) -> Self {
        let background = library.background_index();
        let retention_times = (0..library.len())
            .map(|i| {
                if Some(i) == background {
                    // Sentinel: the Background never passes the gate on its own.
                    return f64::INFINITY;
                }
                match library.retention_time(i) {
                    Some(rt) => rt,
                    None => {
                        warn!(
                            "{} has no usable RT metadata and is excluded from RT-gated fits",
                            library.names()[i]
                        );
                        f64::INFINITY
                    }
                }
            })
            .collect();
        Self {
            retention_times,
            background,
            filter,
        }
    }

    pub fn filter(&self) -> RtFilter {
        self.filter
    }

    /// Sorted indices of the active references at scan time `t`.
    ///
    /// The Background is appended whenever any other reference is active,
    /// and is the sole member when none is. An empty result means there is
    /// nothing to fit.
    pub fn active(&self, t: f64) -> Vec<usize> {
        let mut active: Vec<usize> = self
            .retention_times
            .iter()
            .enumerate()
            .filter(|&(_, &rt)| (rt + self.filter.adjust - t).abs() < self.filter.window)
            .map(|(i, _)| i)
            .collect();
        if let Some(bg) = self.background {
            // Background is the last library row, so the order stays sorted.
            active.push(bg);
        }
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodedRun;
    use crate::library::{
        BackgroundSpec,
        ParsedCompound,
        ReferenceFormat,
        ReferenceSet,
    };
    use crate::models::{
        Array2D,
        MassAxis,
    };
    use std::collections::HashMap;

    fn library(with_background: bool) -> ReferenceLibrary {
        let run = DecodedRun::new(
            vec![1.0, 2.0],
            MassAxis::new(50, 51).unwrap(),
            Array2D::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap(),
        )
        .unwrap();
        let compounds = [("a", Some("2.0")), ("b", Some("5.0")), ("c", None)]
            .into_iter()
            .map(|(name, rt)| ParsedCompound {
                name: name.to_string(),
                metadata: rt
                    .map(|rt| HashMap::from([("RT".to_string(), rt.to_string())]))
                    .unwrap_or_default(),
                peaks: vec![(50.0, 1.0)],
            })
            .collect();
        let set = ReferenceSet::from_compounds("mem", ReferenceFormat::Records, compounds).unwrap();
        let bg = with_background.then_some(BackgroundSpec {
            time: 1.0,
            normalization: Default::default(),
        });
        ReferenceLibrary::from_set(&set, &run, bg).unwrap()
    }

    #[test]
    fn test_gate_selects_by_window() {
        let gate = RtGate::new(
            &library(false),
            RtFilter {
                window: 0.5,
                adjust: 0.0,
            },
        );
        assert_eq!(gate.active(2.2), vec![0]);
        assert_eq!(gate.active(4.8), vec![1]);
        assert!(gate.active(3.5).is_empty());
        // Strict inequality at the window edge.
        assert!(gate.active(2.5).is_empty());
    }

    #[test]
    fn test_gate_applies_adjust() {
        let gate = RtGate::new(
            &library(false),
            RtFilter {
                window: 0.5,
                adjust: 1.0,
            },
        );
        assert_eq!(gate.active(3.1), vec![0]);
        assert!(gate.active(2.0).is_empty());
    }

    #[test]
    fn test_background_readmitted_and_fallback() {
        let gate = RtGate::new(
            &library(true),
            RtFilter {
                window: 0.5,
                adjust: 0.0,
            },
        );
        assert_eq!(gate.active(2.0), vec![0, 3]);
        assert_eq!(gate.active(10.0), vec![3]);
    }
}
