use serde::{
    Deserialize,
    Serialize,
};

/// Contiguous, inclusive range of integer mass bins.
///
/// Every dense structure of a run (intensity rows, reference spectra)
/// is indexed against the same axis, column `i` holding mass `min + i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MassAxis {
    min: i64,
    max: i64,
}

impl MassAxis {
    /// Returns `None` when `max < min`.
    pub fn new(min: i64, max: i64) -> Option<Self> {
        if max < min {
            return None;
        }
        Some(Self { min, max })
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn len(&self) -> usize {
        (self.max - self.min + 1) as usize
    }

    /// Never true, an axis holds at least one bin.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, mass: i64) -> bool {
        mass >= self.min && mass <= self.max
    }

    /// Column index of `mass`, if it is on the axis.
    pub fn index_of(&self, mass: i64) -> Option<usize> {
        if self.contains(mass) {
            Some((mass - self.min) as usize)
        } else {
            None
        }
    }

    pub fn masses(&self) -> impl Iterator<Item = i64> {
        self.min..=self.max
    }
}

/// Rounds a raw mass value to its integer bin.
///
/// Halves go to the even neighbour.
pub fn round_mass(mass: f64) -> i64 {
    mass.round_ties_even() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_indexing() {
        let axis = MassAxis::new(50, 52).unwrap();
        assert_eq!(axis.len(), 3);
        assert_eq!(axis.index_of(50), Some(0));
        assert_eq!(axis.index_of(52), Some(2));
        assert_eq!(axis.index_of(53), None);
        assert_eq!(axis.index_of(49), None);
        assert_eq!(axis.masses().collect::<Vec<_>>(), vec![50, 51, 52]);
    }

    #[test]
    fn test_inverted_axis_rejected() {
        assert!(MassAxis::new(10, 9).is_none());
        assert_eq!(MassAxis::new(10, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_round_mass_ties_to_even() {
        assert_eq!(round_mass(50.4), 50);
        assert_eq!(round_mass(50.6), 51);
        assert_eq!(round_mass(50.5), 50);
        assert_eq!(round_mass(51.5), 52);
    }
}
