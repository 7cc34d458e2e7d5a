//! Catalog of charge materials and their mass-fraction compositions.

use crate::composition::Composition;
use crate::zone::ZoneKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialSpec {
    pub canonical_id: &'static str,
    pub display_name: &'static str,
    pub aliases: &'static [&'static str],
    /// Species and mass fractions (normalized).
    pub species: &'static [(&'static str, f64)],
    /// Where an operator would normally charge this material.
    pub default_zone: ZoneKind,
}

impl MaterialSpec {
    pub fn matches(&self, query: &str) -> bool {
        let query = normalize(query);
        self.canonical_id == query || self.aliases.iter().any(|alias| *alias == query)
    }

    pub fn composition(&self) -> Composition {
        // Catalog entries are non-empty with positive fractions.
        Composition::from_mass_fractions(self.species.iter().copied())
            .unwrap_or_else(|_| Composition::pure(self.canonical_id))
    }
}

const CATALOG: [MaterialSpec; 5] = [
    MaterialSpec {
        canonical_id: "steel_scrap",
        display_name: "Steel Scrap",
        aliases: &["scrap"],
        species: &[("Fe", 0.98), ("C", 0.02)],
        default_zone: ZoneKind::LiquidMetal,
    },
    MaterialSpec {
        canonical_id: "dri",
        display_name: "Direct Reduced Iron",
        aliases: &["direct_reduced_iron", "sponge_iron"],
        species: &[("Fe", 0.92), ("C", 0.05), ("O", 0.03)],
        default_zone: ZoneKind::LiquidMetal,
    },
    MaterialSpec {
        canonical_id: "lime",
        display_name: "Lime",
        aliases: &["cao", "burnt_lime"],
        species: &[("CaO", 1.0)],
        default_zone: ZoneKind::Slag,
    },
    MaterialSpec {
        canonical_id: "dolomite",
        display_name: "Dolomite",
        aliases: &["doloma", "dololime"],
        species: &[("CaO", 0.58), ("MgO", 0.42)],
        default_zone: ZoneKind::Slag,
    },
    MaterialSpec {
        canonical_id: "carbon",
        display_name: "Injection Carbon",
        aliases: &["coke", "anthracite"],
        species: &[("C", 1.0)],
        default_zone: ZoneKind::LiquidMetal,
    },
];

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

/// All catalog entries.
pub fn catalog() -> &'static [MaterialSpec] {
    &CATALOG
}

pub fn lookup_material(name: &str) -> Option<&'static MaterialSpec> {
    CATALOG.iter().find(|spec| spec.matches(name))
}

/// Composition for a material name.
///
/// Names outside the catalog are charged as a single species keyed by the
/// trimmed name, so operators can add arbitrary alloying agents.
pub fn composition_for(name: &str) -> Composition {
    match lookup_material(name) {
        Some(spec) => spec.composition(),
        None => Composition::pure(name.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_entries_are_normalized() {
        for spec in catalog() {
            let comp = spec.composition();
            assert!(comp.is_normalized(), "{} not normalized", spec.canonical_id);
            assert_eq!(comp.len(), spec.species.len());
        }
    }

    #[test]
    fn lookup_by_alias_and_case() {
        assert_eq!(lookup_material("Steel Scrap").unwrap().canonical_id, "steel_scrap");
        assert_eq!(lookup_material("CaO").unwrap().canonical_id, "lime");
        assert!(lookup_material("unobtainium").is_none());
    }

    #[test]
    fn unknown_material_is_pure_species() {
        let comp = composition_for(" FeMn ");
        assert_eq!(comp.fraction("FeMn"), 1.0);
    }
}
