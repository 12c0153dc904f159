//! Density state: value, extent, view and region levers.

use crate::error::ValidationError;
use crate::model::facet::{lookup_facet, LatchAxis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value lever: individual rows or grouped cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueDensity {
    Leaf,
    #[default]
    Collapsed,
}

/// Extent lever: every domain combination or only populated ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentDensity {
    Sparse,
    #[default]
    PopulatedOnly,
}

/// Per-axis override of the global levers.
///
/// When `facet` is set the override only applies while that facet is the
/// grid column on `axis`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOverride {
    pub axis: LatchAxis,
    #[serde(default)]
    pub facet: Option<String>,
    #[serde(default)]
    pub value_mode: Option<ValueDensity>,
    #[serde(default)]
    pub extent_mode: Option<ExtentDensity>,
    #[serde(default)]
    pub granularity: Option<u8>,
}

impl RegionOverride {
    pub fn new(axis: LatchAxis) -> Self {
        Self {
            axis,
            facet: None,
            value_mode: None,
            extent_mode: None,
            granularity: None,
        }
    }

    pub fn for_facet(mut self, facet: impl Into<String>) -> Self {
        self.facet = Some(facet.into());
        self
    }

    pub fn value_mode(mut self, mode: ValueDensity) -> Self {
        self.value_mode = Some(mode);
        self
    }

    pub fn extent_mode(mut self, mode: ExtentDensity) -> Self {
        self.extent_mode = Some(mode);
        self
    }

    pub fn granularity(mut self, level: u8) -> Self {
        self.granularity = Some(level);
        self
    }

    fn applies_to(&self, axis: LatchAxis, facet: &str) -> bool {
        self.axis == axis && self.facet.as_deref().map_or(true, |scoped| scoped == facet)
    }
}

/// Levers resolved for one grid axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisDensity {
    pub value_mode: ValueDensity,
    pub extent_mode: ExtentDensity,
    pub level: u8,
}

/// Explicit density configuration passed into each aggregation call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityState {
    pub value_mode: ValueDensity,
    pub extent_mode: ExtentDensity,
    /// Rendering hint, passed through untouched.
    pub view_mode: String,
    pub axis_granularity: BTreeMap<LatchAxis, u8>,
    pub region_overrides: Vec<RegionOverride>,
}

impl DensityState {
    pub fn collapsed() -> Self {
        Self::default()
    }

    pub fn leaf() -> Self {
        Self {
            value_mode: ValueDensity::Leaf,
            ..Self::default()
        }
    }

    pub fn with_extent(mut self, mode: ExtentDensity) -> Self {
        self.extent_mode = mode;
        self
    }

    pub fn with_view_mode(mut self, view_mode: impl Into<String>) -> Self {
        self.view_mode = view_mode.into();
        self
    }

    pub fn with_granularity(mut self, axis: LatchAxis, level: u8) -> Self {
        self.axis_granularity.insert(axis, level);
        self
    }

    pub fn with_override(mut self, region: RegionOverride) -> Self {
        self.region_overrides.push(region);
        self
    }

    /// Checks granularity ranges and override scopes.
    ///
    /// # Errors
    /// - `GranularityOutOfRange` for any level above `max_level`.
    /// - `OverlappingRegionOverrides` when two overrides share an axis.
    /// - `UnknownFacet` / `FacetAxisMismatch` for a bad override facet.
    pub fn validate(&self, max_level: u8) -> Result<(), ValidationError> {
        for (axis, level) in &self.axis_granularity {
            check_level(*axis, *level, max_level)?;
        }

        for (index, region) in self.region_overrides.iter().enumerate() {
            if let Some(level) = region.granularity {
                check_level(region.axis, level, max_level)?;
            }
            if let Some(facet) = &region.facet {
                let column = lookup_facet(facet)
                    .ok_or_else(|| ValidationError::UnknownFacet(facet.clone()))?;
                if column.axis != region.axis {
                    return Err(ValidationError::FacetAxisMismatch {
                        facet: facet.clone(),
                        expected: region.axis,
                        actual: column.axis,
                    });
                }
            }
            // Scope is the axis: a facet-scoped override still claims its axis.
            if self.region_overrides[..index]
                .iter()
                .any(|earlier| earlier.axis == region.axis)
            {
                return Err(ValidationError::OverlappingRegionOverrides { axis: region.axis });
            }
        }
        Ok(())
    }

    /// Resolves the levers for `facet` on `axis`, applying a matching override.
    pub fn resolve(&self, axis: LatchAxis, facet: &str) -> AxisDensity {
        let base = AxisDensity {
            value_mode: self.value_mode,
            extent_mode: self.extent_mode,
            level: self.axis_granularity.get(&axis).copied().unwrap_or(0),
        };
        match self
            .region_overrides
            .iter()
            .find(|region| region.applies_to(axis, facet))
        {
            Some(region) => AxisDensity {
                value_mode: region.value_mode.unwrap_or(base.value_mode),
                extent_mode: region.extent_mode.unwrap_or(base.extent_mode),
                level: region.granularity.unwrap_or(base.level),
            },
            None => base,
        }
    }
}

fn check_level(axis: LatchAxis, level: u8, max: u8) -> Result<(), ValidationError> {
    if level > max {
        return Err(ValidationError::GranularityOutOfRange { axis, level, max });
    }
    Ok(())
}
