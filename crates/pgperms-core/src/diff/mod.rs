//! The diff-and-emit half of the reconciler: given an actual and a desired
//! [`crate::model::Config`], decide which statements close the gap.
//!
//! Split into one module per object kind, mirroring the upstream
//! implementation's file layout, since each kind's reconciliation rules
//! (create/drop vs. attribute-delta vs. grant/revoke) are independent of
//! each other and are tested independently.

pub mod databases;
pub mod privileges;
pub mod roles;
pub mod schemas;
