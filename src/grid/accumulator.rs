use super::axes::GridAxes;
use crate::pricing::types::{ContractSide, GridCell, PricingParameters};

/// Heatmap results for one parameter generation. Cells tagged with any other
/// generation are discarded, so a superseded sweep cannot leak into the
/// current one.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GridAccumulator {
    pub generation: u64,
    pub params: Option<PricingParameters>,
    pub axes: GridAxes,
    pub call: Vec<GridCell>,
    pub put: Vec<GridCell>,
}

impl GridAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts accumulating for a new generation, dropping everything before.
    pub fn begin(&mut self, generation: u64, params: PricingParameters, axes: GridAxes) {
        let capacity = axes.len();
        self.generation = generation;
        self.params = Some(params);
        self.axes = axes;
        self.call = Vec::with_capacity(capacity);
        self.put = Vec::with_capacity(capacity);
    }

    /// Records a cell. Returns false when the cell belongs to a stale generation.
    pub fn accept(&mut self, generation: u64, side: ContractSide, cell: GridCell) -> bool {
        if generation != self.generation || self.params.is_none() {
            return false;
        }
        let cells = match side {
            ContractSide::Call => &mut self.call,
            ContractSide::Put => &mut self.put,
        };
        match cells
            .iter_mut()
            .find(|c| c.spot == cell.spot && c.volatility == cell.volatility)
        {
            Some(existing) => *existing = cell,
            None => cells.push(cell),
        }
        true
    }

    #[inline]
    pub fn cells(&self, side: ContractSide) -> &[GridCell] {
        match side {
            ContractSide::Call => &self.call,
            ContractSide::Put => &self.put,
        }
    }

    #[inline]
    pub fn expected(&self) -> usize {
        self.axes.len()
    }

    pub fn is_complete(&self) -> bool {
        self.params.is_some()
            && self.call.len() == self.expected()
            && self.put.len() == self.expected()
    }

    /// Cells the server could not price.
    pub fn unknown(&self, side: ContractSide) -> usize {
        self.cells(side).iter().filter(|c| c.price.is_none()).count()
    }
}
