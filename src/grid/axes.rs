use crate::pricing::types::PricingParameters;
use smallvec::SmallVec;

pub const SPOT_START: f64 = 0.8;
pub const SPOT_STEP: f64 = 0.04;
pub const VOL_START: f64 = 0.5;
pub const VOL_STEP: f64 = 0.05;
pub const DEFAULT_POINTS: usize = 11;

pub type Axis = SmallVec<[f64; DEFAULT_POINTS]>;

/// The two perturbation ranges of a heatmap sweep, derived deterministically
/// from a settled parameter set.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct GridAxes {
    pub spots: Axis,
    pub vols: Axis,
}

impl GridAxes {
    /// spot x (0.8 + 0.04 i) and volatility x (0.5 + 0.05 i) for i in 0..points.
    pub fn for_params(params: &PricingParameters, points: usize) -> Self {
        let spots = (0..points)
            .map(|i| params.spot * (SPOT_START + SPOT_STEP * i as f64))
            .collect();
        let vols = (0..points)
            .map(|i| params.volatility * (VOL_START + VOL_STEP * i as f64))
            .collect();
        Self { spots, vols }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.spots.len() * self.vols.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every (spot, volatility) pair, spot-major.
    pub fn cells(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.spots
            .iter()
            .flat_map(move |&s| self.vols.iter().map(move |&v| (s, v)))
    }

    pub fn contains(&self, spot: f64, volatility: f64) -> bool {
        self.spots.contains(&spot) && self.vols.contains(&volatility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_default_axes_endpoints() {
        let params = PricingParameters { spot: 100.0, volatility: 0.2, ..Default::default() };
        let axes = GridAxes::for_params(&params, DEFAULT_POINTS);
        assert_eq!(axes.spots.len(), 11);
        assert_eq!(axes.vols.len(), 11);
        assert!(close(axes.spots[0], 80.0));
        assert!(close(axes.spots[5], 100.0));
        assert!(close(axes.spots[10], 120.0));
        assert!(close(axes.vols[0], 0.1));
        assert!(close(axes.vols[10], 0.2));
        assert_eq!(axes.len(), 121);
    }

    #[test]
    fn test_cells_spot_major_and_complete() {
        let axes = GridAxes::for_params(&PricingParameters::default(), 3);
        let cells: Vec<_> = axes.cells().collect();
        assert_eq!(cells.len(), 9);
        assert_eq!(cells[0], (axes.spots[0], axes.vols[0]));
        assert_eq!(cells[1], (axes.spots[0], axes.vols[1]));
        assert_eq!(cells[3], (axes.spots[1], axes.vols[0]));
        assert!(cells.iter().all(|&(s, v)| axes.contains(s, v)));
    }

    #[test]
    fn test_axes_are_deterministic() {
        let p = PricingParameters { spot: 4321.5, volatility: 0.37, ..Default::default() };
        assert_eq!(GridAxes::for_params(&p, 11), GridAxes::for_params(&p, 11));
    }
}
