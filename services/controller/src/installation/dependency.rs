//! Sibling dependency checks.
//!
//! An installation must not be torn down while a sibling still imports
//! something it exports.

use landform_api::Installation;

/// Kind of reference two siblings share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Data,
    Target,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Data => f.write_str("data"),
            ReferenceKind::Target => f.write_str("target"),
        }
    }
}

/// A sibling importing one of the installation's exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingConflict {
    pub sibling: String,
    pub reference: String,
    pub kind: ReferenceKind,
}

impl std::fmt::Display for SiblingConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sibling {} imports exported {} '{}'",
            self.sibling, self.kind, self.reference
        )
    }
}

/// Returns the first sibling that imports one of `installation`'s exports.
///
/// Siblings are checked in the given order; for each sibling, data exports
/// are checked before target exports.
///
/// Data exports only match data imports and target exports only match
/// target imports; a data import never blocks on a target of the same name.
pub fn find_blocking_sibling(
    installation: &Installation,
    siblings: &[Installation],
) -> Option<SiblingConflict> {
    let exports = &installation.spec.exports;
    for sibling in siblings {
        let conflict = |reference: &str, kind| SiblingConflict {
            sibling: sibling.metadata.name.clone(),
            reference: reference.to_string(),
            kind,
        };

        if let Some(export) = exports
            .data
            .iter()
            .find(|e| sibling.is_importing_data(&e.data_ref))
        {
            return Some(conflict(&export.data_ref, ReferenceKind::Data));
        }
        if let Some(export) = exports
            .targets
            .iter()
            .find(|e| sibling.is_importing_target(&e.target))
        {
            return Some(conflict(&export.target, ReferenceKind::Target));
        }
    }
    None
}

pub fn has_blocking_sibling_dependency(installation: &Installation, siblings: &[Installation]) -> bool {
    find_blocking_sibling(installation, siblings).is_some()
}
