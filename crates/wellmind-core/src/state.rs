//! Mutable simulation record: wells, psyche and the shared energy pool.
//!
//! Fields are private. Mutators are crate-private and expected to run inside
//! [`SimState::guarded`], which names the writer. A write outside a bracket is
//! reported (not refused) so stray write paths show up during development.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::WELL_COUNT;

/// Amount and spin held by a single well.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Well {
    pub amount: f64,
    pub spin: f64,
}

impl Well {
    #[must_use]
    pub const fn new(amount: f64, spin: f64) -> Self {
        Self { amount, spin }
    }

    /// Simulation flux (`amount * spin`), never special-cased.
    #[must_use]
    pub fn flux(&self) -> f64 {
        self.amount * self.spin
    }
}

/// The one shared mutable record of the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimState {
    wells: [Well; WELL_COUNT],
    psyche: [f64; WELL_COUNT],
    energy: f64,
    selected: Option<usize>,
    controls_revision: u64,
    scope: Option<&'static str>,
    unguarded_writes: u64,
}

impl SimState {
    pub(crate) fn new(wells: [Well; WELL_COUNT], psyche: [f64; WELL_COUNT], energy: f64) -> Self {
        Self {
            wells,
            psyche,
            energy,
            selected: None,
            controls_revision: 0,
            scope: None,
            unguarded_writes: 0,
        }
    }

    #[must_use]
    pub fn wells(&self) -> &[Well; WELL_COUNT] {
        &self.wells
    }

    /// Returns the well at `index`, if it exists.
    #[must_use]
    pub fn well(&self, index: usize) -> Option<Well> {
        self.wells.get(index).copied()
    }

    #[must_use]
    pub fn psyche(&self) -> &[f64; WELL_COUNT] {
        &self.psyche
    }

    #[must_use]
    pub const fn energy(&self) -> f64 {
        self.energy
    }

    /// Currently selected well (UI selection, not simulation state).
    #[must_use]
    pub const fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Bumped on every successful action so the UI knows to resync controls.
    #[must_use]
    pub const fn controls_revision(&self) -> u64 {
        self.controls_revision
    }

    /// Count of writes that happened outside an authorised bracket.
    #[must_use]
    pub const fn unguarded_writes(&self) -> u64 {
        self.unguarded_writes
    }

    /// Run `f` as an authorised mutation attributed to `label`.
    ///
    /// Brackets nest; the innermost label is reported and the outer one is
    /// restored when `f` returns.
    pub(crate) fn guarded<R>(&mut self, label: &'static str, f: impl FnOnce(&mut Self) -> R) -> R {
        let outer = self.scope.replace(label);
        let result = f(self);
        self.scope = outer;
        result
    }

    fn note_write(&mut self, field: &'static str) {
        match self.scope {
            Some(scope) => trace!(scope, field, "guarded write"),
            None => {
                self.unguarded_writes += 1;
                warn!(field, "simulation state written outside an authorised call");
            }
        }
    }

    pub(crate) fn set_amount(&mut self, index: usize, amount: f64) {
        self.note_write("amount");
        if let Some(well) = self.wells.get_mut(index) {
            well.amount = amount;
        }
    }

    pub(crate) fn set_spin(&mut self, index: usize, spin: f64) {
        self.note_write("spin");
        if let Some(well) = self.wells.get_mut(index) {
            well.spin = spin;
        }
    }

    pub(crate) fn set_psyche(&mut self, hue: usize, value: f64) {
        self.note_write("psyche");
        if let Some(slot) = self.psyche.get_mut(hue) {
            *slot = value;
        }
    }

    pub(crate) fn add_psyche(&mut self, hue: usize, delta: f64) {
        self.note_write("psyche");
        if let Some(slot) = self.psyche.get_mut(hue) {
            *slot += delta;
        }
    }

    /// Clamp every hue into `[0, cap]`.
    pub(crate) fn clamp_psyche(&mut self, cap: f64) {
        self.note_write("psyche");
        for value in &mut self.psyche {
            *value = value.clamp(0.0, cap);
        }
    }

    pub(crate) fn set_energy(&mut self, energy: f64) {
        self.note_write("energy");
        self.energy = energy;
    }

    pub(crate) fn select(&mut self, index: Option<usize>) {
        self.selected = index;
    }

    pub(crate) fn bump_controls_revision(&mut self) {
        self.controls_revision = self.controls_revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> SimState {
        SimState::new([Well::new(50.0, 10.0); WELL_COUNT], [100.0; WELL_COUNT], 40.0)
    }

    #[test]
    fn guarded_writes_are_not_flagged() {
        let mut state = sample_state();
        state.guarded("test", |s| {
            s.set_spin(1, 20.0);
            s.set_energy(10.0);
        });
        assert_eq!(state.unguarded_writes(), 0);
        assert_eq!(state.well(1).map(|w| w.spin), Some(20.0));
        assert_eq!(state.energy(), 10.0);
    }

    #[test]
    fn nested_brackets_restore_the_outer_label() {
        let mut state = sample_state();
        let before = state.clone();
        state.guarded("outer", |s| {
            assert_eq!(s.scope, Some("outer"));
            s.guarded("inner", |s| {
                assert_eq!(s.scope, Some("inner"));
                s.set_amount(2, 55.0);
            });
            assert_eq!(s.scope, Some("outer"));
            s.set_amount(2, 50.0);
        });
        assert_eq!(state.scope, None);
        assert_eq!(state.unguarded_writes(), 0);
        assert_eq!(state, before);

        state.set_energy(1.0);
        assert_eq!(state.unguarded_writes(), 1);
    }

    #[test]
    fn stray_writes_are_counted_but_applied() {
        let mut state = sample_state();
        state.set_amount(0, 70.0);
        state.add_psyche(2, 5.0);
        assert_eq!(state.unguarded_writes(), 2);
        assert_eq!(state.well(0).map(|w| w.amount), Some(70.0));
        assert_eq!(state.psyche()[2], 105.0);
    }

    #[test]
    fn selection_is_not_a_guarded_write() {
        let mut state = sample_state();
        state.select(Some(4));
        assert_eq!(state.selected(), Some(4));
        assert_eq!(state.unguarded_writes(), 0);
    }

    #[test]
    fn out_of_range_writes_are_ignored() {
        let mut state = sample_state();
        let before = *state.wells();
        state.guarded("test", |s| s.set_spin(9, 1.0));
        assert_eq!(*state.wells(), before);
    }
}
