//! Live fare estimation from traveled distance.
//!
//! The displayed cost never decreases during an in-progress trip: the
//! backend-declared estimate acts as a floor, and out-of-band backend
//! refreshes are only adopted when they raise the figure.

use crate::models::TripCostState;

/// Fare parameters for one trip session.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    /// Flat price component for the vehicle type.
    pub base_price: f64,
    pub per_km_rate: f64,
    /// Backend-declared estimate; the displayed cost never drops below it.
    pub floor: f64,
}

impl CostModel {
    pub fn new(base_price: f64, per_km_rate: f64, floor: f64) -> Self {
        Self {
            base_price,
            per_km_rate,
            floor,
        }
    }

    /// Recompute the displayed cost from accrued distance. Clamped to the
    /// floor and to the previous value, so it is monotonic across ticks.
    pub fn tick(&self, state: &mut TripCostState) -> f64 {
        let computed = self.base_price + state.traveled_km * self.per_km_rate;
        state.current_cost = computed.max(self.floor).max(state.current_cost);
        state.current_cost
    }

    /// Reset accumulators on the PENDING -> IN_PROGRESS transition.
    pub fn reset(&self, state: &mut TripCostState) {
        state.traveled_km = 0.0;
        state.current_cost = self.base_price.max(self.floor);
    }

    /// Reconcile with a backend-computed cost read out-of-band.
    ///
    /// A larger backend figure is adopted and an equivalent traveled
    /// distance is derived so future local accrual continues from it; a
    /// smaller figure is ignored (monotonic guard). The derived distance is
    /// floored at the locally accrued value.
    pub fn adopt_backend_cost(&self, state: &mut TripCostState, backend_cost: f64) {
        if !backend_cost.is_finite() || backend_cost <= state.current_cost {
            return;
        }
        state.current_cost = backend_cost;
        if self.per_km_rate > 0.0 {
            let implied_km = (backend_cost - self.base_price) / self.per_km_rate;
            state.traveled_km = implied_km.max(state.traveled_km);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_is_enforced() {
        // Computed 100 + 40*8 = 420, floor 500.
        let model = CostModel::new(100.0, 8.0, 500.0);
        let mut state = TripCostState {
            traveled_km: 40.0,
            current_cost: 0.0,
        };
        assert_eq!(model.tick(&mut state), 500.0);
    }

    #[test]
    fn accrual_overtakes_floor() {
        let model = CostModel::new(100.0, 8.0, 500.0);
        let mut state = TripCostState {
            traveled_km: 60.0,
            current_cost: 0.0,
        };
        assert_eq!(model.tick(&mut state), 580.0);
    }

    #[test]
    fn cost_is_monotonic_across_ticks() {
        let model = CostModel::new(100.0, 8.0, 0.0);
        let mut state = TripCostState {
            traveled_km: 50.0,
            current_cost: 0.0,
        };
        let first = model.tick(&mut state);
        // Distance cannot regress in practice, but even if it did the
        // displayed cost must hold.
        state.traveled_km = 10.0;
        let second = model.tick(&mut state);
        assert!(second >= first);
        assert_eq!(second, 500.0);
    }

    #[test]
    fn reset_rebases_cost() {
        let model = CostModel::new(100.0, 8.0, 120.0);
        let mut state = TripCostState {
            traveled_km: 30.0,
            current_cost: 900.0,
        };
        model.reset(&mut state);
        assert_eq!(state.traveled_km, 0.0);
        assert_eq!(state.current_cost, 120.0);
    }

    #[test]
    fn larger_backend_cost_is_adopted_with_implied_distance() {
        let model = CostModel::new(100.0, 10.0, 0.0);
        let mut state = TripCostState {
            traveled_km: 5.0,
            current_cost: 150.0,
        };
        model.adopt_backend_cost(&mut state, 300.0);
        assert_eq!(state.current_cost, 300.0);
        // (300 - 100) / 10 = 20km implied, above the local 5km.
        assert_eq!(state.traveled_km, 20.0);
    }

    #[test]
    fn smaller_backend_cost_is_ignored() {
        let model = CostModel::new(100.0, 10.0, 0.0);
        let mut state = TripCostState {
            traveled_km: 50.0,
            current_cost: 600.0,
        };
        model.adopt_backend_cost(&mut state, 400.0);
        assert_eq!(state.current_cost, 600.0);
        assert_eq!(state.traveled_km, 50.0);
    }

    #[test]
    fn implied_distance_never_regresses() {
        let model = CostModel::new(100.0, 10.0, 0.0);
        let mut state = TripCostState {
            traveled_km: 50.0,
            current_cost: 300.0,
        };
        // Backend 310 implies 21km, below the local 50km; keep the local.
        model.adopt_backend_cost(&mut state, 310.0);
        assert_eq!(state.current_cost, 310.0);
        assert_eq!(state.traveled_km, 50.0);
    }
}
