//! Subsystem registry: one record per configured CAN id

use crate::error::UnknownIdError;
use crate::frame::Payload;
use crate::subsystem::{
    merge, EscARecord, EscBRecord, MergeReport, SubsystemKind, SubsystemRecord, SubsystemTable,
    TransmissionRecord, VdcRecord,
};
use serde::Serialize;

/// Copy of all four records taken at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RegistryView {
    pub esc_a: EscARecord,
    pub esc_b: EscBRecord,
    pub transmission: TransmissionRecord,
    pub vdc: VdcRecord,
}

impl RegistryView {
    pub fn record(&self, kind: SubsystemKind) -> SubsystemRecord {
        match kind {
            SubsystemKind::EscA => SubsystemRecord::EscA(self.esc_a),
            SubsystemKind::EscB => SubsystemRecord::EscB(self.esc_b),
            SubsystemKind::Transmission => SubsystemRecord::Transmission(self.transmission),
            SubsystemKind::Vdc => SubsystemRecord::Vdc(self.vdc),
        }
    }
}

/// Result of a successful apply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedId {
    pub id: i64,
    pub kind: SubsystemKind,
    pub report: MergeReport,
}

/// Holds the live subsystem records.
///
/// Mutation goes through `&mut self`, so whoever owns the registry is the
/// single writer. Readers work from [`RegistryView`] copies.
#[derive(Debug, Clone)]
pub struct SubsystemRegistry {
    table: SubsystemTable,
    records: RegistryView,
}

impl SubsystemRegistry {
    /// Create a registry with zeroed records
    pub fn new(table: SubsystemTable) -> Self {
        Self {
            table,
            records: RegistryView::default(),
        }
    }

    pub fn table(&self) -> &SubsystemTable {
        &self.table
    }

    /// Merge a validated payload into the record routed by `id`
    pub fn apply(&mut self, id: i64, payload: &Payload) -> Result<AppliedId, UnknownIdError> {
        let kind = self.table.kind_of(id).ok_or(UnknownIdError(id))?;
        let report = match kind {
            SubsystemKind::EscA => merge(&mut self.records.esc_a, payload),
            SubsystemKind::EscB => merge(&mut self.records.esc_b, payload),
            SubsystemKind::Transmission => merge(&mut self.records.transmission, payload),
            SubsystemKind::Vdc => merge(&mut self.records.vdc, payload),
        };
        Ok(AppliedId { id, kind, report })
    }

    /// Copy of the record behind `id`
    pub fn snapshot_of(&self, id: i64) -> Result<SubsystemRecord, UnknownIdError> {
        let kind = self.table.kind_of(id).ok_or(UnknownIdError(id))?;
        Ok(self.records.record(kind))
    }

    /// Copy of every record
    pub fn view(&self) -> RegistryView {
        self.records
    }
}

impl Default for SubsystemRegistry {
    fn default() -> Self {
        Self::new(SubsystemTable::mr17())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zeroed() {
        let registry = SubsystemRegistry::default();
        assert_eq!(registry.view(), RegistryView::default());
        assert_eq!(
            registry.snapshot_of(11).unwrap(),
            SubsystemRecord::Transmission(TransmissionRecord::default())
        );
    }

    #[test]
    fn test_apply_routes_by_id() {
        let mut registry = SubsystemRegistry::default();
        let applied = registry
            .apply(10, &Payload::new().with("left_brake", 33.0))
            .unwrap();
        assert_eq!(applied.kind, SubsystemKind::EscB);
        assert_eq!(applied.id, 10);
        assert_eq!(registry.view().esc_b.left_brake, 33.0);
        assert_eq!(registry.view().transmission, TransmissionRecord::default());
    }

    #[test]
    fn test_apply_unknown_id_mutates_nothing() {
        let mut registry = SubsystemRegistry::default();
        registry
            .apply(11, &Payload::new().with("engine_rpm", 2000))
            .unwrap();
        let before = registry.view();

        let err = registry
            .apply(99, &Payload::new().with("engine_rpm", 1))
            .unwrap_err();
        assert_eq!(err, UnknownIdError(99));
        assert_eq!(registry.view(), before);
        assert_eq!(registry.snapshot_of(99), Err(UnknownIdError(99)));
    }

    #[test]
    fn test_partial_updates_accumulate() {
        let mut registry = SubsystemRegistry::default();
        registry.apply(12, &Payload::new().with("velocity", 12.5)).unwrap();
        registry.apply(12, &Payload::new().with("cart_mode", 1)).unwrap();
        let vdc = registry.view().vdc;
        assert_eq!(vdc.velocity, 12.5);
        assert_eq!(vdc.cart_mode, 1);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut registry = SubsystemRegistry::default();
        let before = registry.snapshot_of(9).unwrap();
        registry.apply(9, &Payload::new().with("ballast_state", 2)).unwrap();
        assert_eq!(before, SubsystemRecord::EscA(EscARecord::default()));
        match registry.snapshot_of(9).unwrap() {
            SubsystemRecord::EscA(rec) => assert_eq!(rec.ballast_state, 2),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_custom_table() {
        let table = SubsystemTable::new(vec![
            (1, SubsystemKind::Transmission),
            (2, SubsystemKind::EscA),
            (3, SubsystemKind::EscB),
            (4, SubsystemKind::Vdc),
        ])
        .unwrap();
        let mut registry = SubsystemRegistry::new(table);
        assert!(registry.apply(11, &Payload::new()).is_err());
        let applied = registry.apply(1, &Payload::new().with("gear", 3)).unwrap();
        assert_eq!(applied.kind, SubsystemKind::Transmission);
        assert_eq!(registry.view().transmission.gear, 3);
    }
}
