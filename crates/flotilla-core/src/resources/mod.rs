pub mod quantities;

pub use quantities::{Quantity, QuantityError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tolerance for floating-point share comparisons
pub const FLOAT_TOLERANCE: f64 = 1e-9;

/// Typed map from resource name (`cpu`, `memory`, `gpu`, ...) to a rational
/// quantity. Missing keys mean zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeResources(BTreeMap<String, Quantity>);

impl ComputeResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount of a resource; zero when absent
    pub fn get(&self, resource: &str) -> Quantity {
        self.0.get(resource).copied().unwrap_or(Quantity::ZERO)
    }

    /// Whether the map carries an entry for `resource` at all
    pub fn contains(&self, resource: &str) -> bool {
        self.0.contains_key(resource)
    }

    pub fn insert(&mut self, resource: impl Into<String>, amount: Quantity) {
        self.0.insert(resource.into(), amount);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Quantity)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every entry is zero (or the map is empty)
    pub fn is_zero(&self) -> bool {
        self.0.values().all(Quantity::is_zero)
    }

    /// Element-wise addition
    pub fn add(&mut self, other: &ComputeResources) {
        for (resource, amount) in other.iter() {
            let entry = self.0.entry(resource.clone()).or_insert(Quantity::ZERO);
            *entry += *amount;
        }
    }

    /// Element-wise subtraction, floored at zero per resource
    pub fn saturating_sub(&mut self, other: &ComputeResources) {
        for (resource, amount) in other.iter() {
            let entry = self.0.entry(resource.clone()).or_insert(Quantity::ZERO);
            *entry = entry.saturating_sub(*amount);
        }
    }

    /// True iff every requested resource is available in at least the
    /// requested amount. A nonzero request for a resource the available
    /// side does not carry at all does not fit.
    pub fn fits(&self, available: &ComputeResources) -> bool {
        self.iter()
            .all(|(resource, amount)| *amount <= available.get(resource))
    }

    /// True iff this request is at least `minimum` in every resource the
    /// minimum names
    pub fn meets_minimum(&self, minimum: &ComputeResources) -> bool {
        minimum
            .iter()
            .all(|(resource, amount)| self.get(resource) >= *amount)
    }

    /// Floating-point form for scheduling arithmetic
    pub fn to_float(&self) -> ComputeResourcesFloat {
        ComputeResourcesFloat(
            self.0
                .iter()
                .map(|(resource, amount)| (resource.clone(), amount.as_f64()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Quantity)> for ComputeResources {
    fn from_iter<I: IntoIterator<Item = (String, Quantity)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ComputeResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (resource, amount) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", resource, amount)?;
            first = false;
        }
        Ok(())
    }
}

/// Floating-point resource map used for all scheduling math
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeResourcesFloat(BTreeMap<String, f64>);

impl ComputeResourcesFloat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: &str) -> f64 {
        self.0.get(resource).copied().unwrap_or(0.0)
    }

    pub fn insert(&mut self, resource: impl Into<String>, amount: f64) {
        self.0.insert(resource.into(), amount);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when no entry is meaningfully above zero
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|v| *v <= FLOAT_TOLERANCE)
    }

    /// Element-wise addition
    pub fn add(&mut self, other: &ComputeResourcesFloat) {
        for (resource, amount) in other.iter() {
            *self.0.entry(resource.clone()).or_insert(0.0) += amount;
        }
    }

    /// Element-wise subtraction, floored at zero per resource
    pub fn sub(&mut self, other: &ComputeResourcesFloat) {
        for (resource, amount) in other.iter() {
            let entry = self.0.entry(resource.clone()).or_insert(0.0);
            *entry = (*entry - amount).max(0.0);
        }
    }

    /// Scale every entry by a non-negative factor
    pub fn mul(&self, factor: f64) -> ComputeResourcesFloat {
        ComputeResourcesFloat(
            self.0
                .iter()
                .map(|(resource, amount)| (resource.clone(), amount * factor))
                .collect(),
        )
    }

    /// Element-wise maximum over the union of keys
    pub fn max(&self, other: &ComputeResourcesFloat) -> ComputeResourcesFloat {
        let mut out = self.clone();
        for (resource, amount) in other.iter() {
            let entry = out.0.entry(resource.clone()).or_insert(0.0);
            *entry = entry.max(*amount);
        }
        out
    }

    /// Element-wise minimum over this map's keys
    pub fn min(&self, other: &ComputeResourcesFloat) -> ComputeResourcesFloat {
        ComputeResourcesFloat(
            self.0
                .iter()
                .map(|(resource, amount)| (resource.clone(), amount.min(other.get(resource))))
                .collect(),
        )
    }

    /// True iff every requested resource fits within `available`, up to
    /// floating-point tolerance
    pub fn fits(&self, available: &ComputeResourcesFloat) -> bool {
        self.iter()
            .all(|(resource, amount)| *amount <= available.get(resource) + FLOAT_TOLERANCE)
    }

    /// The dominant-resource share of this usage vector: the maximum over
    /// resources of `usage/capacity`, weighted by scarcity. Resources the
    /// capacity does not carry are skipped.
    pub fn dominant_resource_share(
        &self,
        capacity: &ComputeResourcesFloat,
        scarcity: &BTreeMap<String, f64>,
    ) -> f64 {
        let mut share: f64 = 0.0;
        for (resource, amount) in self.iter() {
            let available = capacity.get(resource);
            if available <= 0.0 {
                continue;
            }
            let weight = scarcity.get(resource).copied().unwrap_or(1.0);
            share = share.max(amount / available * weight);
        }
        share
    }
}

impl FromIterator<(String, f64)> for ComputeResourcesFloat {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ComputeResourcesFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (resource, amount) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={:.3}", resource, amount)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources(pairs: &[(&str, &str)]) -> ComputeResources {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Quantity::parse(v).unwrap()))
            .collect()
    }

    #[test]
    fn test_get_missing_is_zero() {
        let r = resources(&[("cpu", "1")]);
        assert_eq!(r.get("gpu"), Quantity::ZERO);
    }

    #[test]
    fn test_fits() {
        let available = resources(&[("cpu", "4"), ("memory", "8Gi")]);
        assert!(resources(&[("cpu", "1"), ("memory", "1Gi")]).fits(&available));
        assert!(resources(&[("cpu", "4")]).fits(&available));
        assert!(!resources(&[("cpu", "5")]).fits(&available));
        // Requesting a resource the available side has no capacity for
        assert!(!resources(&[("gpu", "1")]).fits(&available));
    }

    #[test]
    fn test_meets_minimum() {
        let min = resources(&[("cpu", "500m")]);
        assert!(resources(&[("cpu", "1")]).meets_minimum(&min));
        assert!(!resources(&[("cpu", "100m")]).meets_minimum(&min));
        assert!(resources(&[("cpu", "1")]).meets_minimum(&ComputeResources::new()));
    }

    #[test]
    fn test_add_and_sub() {
        let mut r = resources(&[("cpu", "1")]);
        r.add(&resources(&[("cpu", "500m"), ("memory", "1Gi")]));
        assert_eq!(r.get("cpu"), Quantity::parse("1500m").unwrap());
        assert_eq!(r.get("memory"), Quantity::parse("1Gi").unwrap());

        r.saturating_sub(&resources(&[("cpu", "2")]));
        assert_eq!(r.get("cpu"), Quantity::ZERO);
    }

    #[test]
    fn test_float_sub_floors_at_zero() {
        let mut a = resources(&[("cpu", "1")]).to_float();
        a.sub(&resources(&[("cpu", "3")]).to_float());
        assert_eq!(a.get("cpu"), 0.0);
    }

    #[test]
    fn test_float_mul_and_min() {
        let a = resources(&[("cpu", "10"), ("memory", "1Gi")]).to_float();
        let scaled = a.mul(0.5);
        assert_eq!(scaled.get("cpu"), 5.0);

        let capped = scaled.min(&resources(&[("cpu", "2")]).to_float());
        assert_eq!(capped.get("cpu"), 2.0);
        // memory capped against a map without a memory entry
        assert_eq!(capped.get("memory"), 0.0);
    }

    #[test]
    fn test_dominant_resource_share() {
        let capacity = resources(&[("cpu", "100"), ("gpu", "10")]).to_float();
        let scarcity = BTreeMap::from([("cpu".to_string(), 1.0), ("gpu".to_string(), 10.0)]);

        let usage = resources(&[("cpu", "50"), ("gpu", "1")]).to_float();
        // cpu: 0.5 * 1.0, gpu: 0.1 * 10.0 = 1.0 -> gpu dominates
        assert!((usage.dominant_resource_share(&capacity, &scarcity) - 1.0).abs() < 1e-9);

        // Resources with no capacity are skipped
        let orphan = resources(&[("tpu", "5")]).to_float();
        assert_eq!(orphan.dominant_resource_share(&capacity, &scarcity), 0.0);
    }
}
