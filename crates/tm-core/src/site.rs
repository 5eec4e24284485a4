use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TmError};

pub type SiteId = u32;

/// Read-only view of the host's active sites.
///
/// Implementations must answer from live host state on every call; callers
/// never hold on to the returned list across calls.
pub trait SiteSet {
    fn active_sites(&self) -> Vec<SiteId>;
}

/// A scalar carried independently per site.
///
/// A value is either *bound* to an explicit set of sites (reads and writes
/// outside that set fail with [`TmError::InvalidSiteAccess`]) or *open*,
/// where any site may be written and unwritten sites read the fill value.
/// Reading a site that has neither an entry nor a fill value is also an
/// invalid access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSiteValue<T> {
    values: BTreeMap<SiteId, T>,
    fill: Option<T>,
    bound: bool,
}

impl<T: Copy> MultiSiteValue<T> {
    /// Open value with no entries and no fill.
    pub fn unset() -> Self {
        Self {
            values: BTreeMap::new(),
            fill: None,
            bound: false,
        }
    }

    /// Open value where every site reads `value` until written.
    pub fn uniform(value: T) -> Self {
        Self {
            values: BTreeMap::new(),
            fill: Some(value),
            bound: false,
        }
    }

    /// Bound to `sites`, each starting at `value`.
    pub fn for_sites(sites: &[SiteId], value: T) -> Self {
        Self {
            values: sites.iter().map(|site| (*site, value)).collect(),
            fill: None,
            bound: true,
        }
    }

    pub fn get(&self, site: SiteId) -> Result<T> {
        self.values
            .get(&site)
            .copied()
            .or(if self.bound { None } else { self.fill })
            .ok_or(TmError::InvalidSiteAccess { site })
    }

    pub fn set(&mut self, site: SiteId, value: T) -> Result<()> {
        if self.bound && !self.values.contains_key(&site) {
            return Err(TmError::InvalidSiteAccess { site });
        }
        self.values.insert(site, value);
        Ok(())
    }

    pub fn contains(&self, site: SiteId) -> bool {
        self.values.contains_key(&site) || (!self.bound && self.fill.is_some())
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn fill(&self) -> Option<T> {
        self.fill
    }

    /// Explicitly stored entries, in site order.
    pub fn iter(&self) -> impl Iterator<Item = (SiteId, T)> + '_ {
        self.values.iter().map(|(site, value)| (*site, *value))
    }

    pub fn sites(&self) -> Vec<SiteId> {
        self.values.keys().copied().collect()
    }

    /// Applies `f` to every entry and to the fill, keeping the binding.
    pub fn map<U: Copy>(&self, mut f: impl FnMut(T) -> U) -> MultiSiteValue<U> {
        MultiSiteValue {
            values: self
                .values
                .iter()
                .map(|(site, value)| (*site, f(*value)))
                .collect(),
            fill: self.fill.map(&mut f),
            bound: self.bound,
        }
    }
}

impl<T: Copy> FromIterator<(SiteId, T)> for MultiSiteValue<T> {
    /// Collects into a value bound to exactly the given sites.
    fn from_iter<I: IntoIterator<Item = (SiteId, T)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
            fill: None,
            bound: true,
        }
    }
}

impl MultiSiteValue<i64> {
    pub fn to_double(&self) -> MultiSiteValue<f64> {
        self.map(|value| value as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_value_rejects_sites_outside_its_set() {
        let mut flags = MultiSiteValue::for_sites(&[0, 1], 1_i64);
        assert_eq!(flags.get(1).expect("site 1"), 1);
        let err = flags.set(4, 0).expect_err("site 4 is not bound");
        assert!(matches!(err, TmError::InvalidSiteAccess { site: 4 }));
        assert!(matches!(
            flags.get(4),
            Err(TmError::InvalidSiteAccess { site: 4 })
        ));
        assert_eq!(flags.sites(), vec![0, 1]);
    }

    #[test]
    fn uniform_value_reads_fill_until_written() {
        let mut passed = MultiSiteValue::uniform(true);
        assert!(passed.get(7).expect("fill"));
        passed.set(7, false).expect("open value accepts any site");
        assert!(!passed.get(7).expect("written"));
        assert!(passed.get(8).expect("fill"));
    }

    #[test]
    fn unset_value_fails_on_unwritten_site() {
        let mut value = MultiSiteValue::<f64>::unset();
        assert!(value.get(0).is_err());
        value.set(0, 2.5).expect("set");
        assert_eq!(value.get(0).expect("written"), 2.5);
        assert!(!value.contains(1));
    }

    #[test]
    fn long_values_convert_to_double_exactly() {
        let longs: MultiSiteValue<i64> = [(0, 3), (2, -9_007_199_254_740_992)]
            .into_iter()
            .collect();
        let doubles = longs.to_double();
        assert_eq!(doubles.get(0).expect("site 0"), 3.0);
        assert_eq!(doubles.get(2).expect("site 2"), -9_007_199_254_740_992.0);
        assert!(doubles.is_bound());
    }
}
