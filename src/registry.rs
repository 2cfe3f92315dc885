use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::instance::{Instance, InstanceData};

/// Named collection of instances, e.g. a benchmark set loaded once and solved many times.
///
/// # Example
/// ```
/// # extern crate testsched;
/// use testsched::registry::Registry;
/// use testsched::{Horizon, Instance, TestRequest};
/// let instance = Instance::builder(Horizon::new(0, 5))
///     .test(TestRequest::new(1, 0, 4, 0, 1, 0))
///     .vehicles(0, 1)
///     .build()
///     .unwrap();
///
/// let mut registry = Registry::new();
/// assert!(registry.insert("small", instance).is_none());
/// assert_eq!(registry.get("small").map(|i| i.num_tests()), Some(1));
/// assert!(registry.get("large").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    instances: BTreeMap<String, Instance>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance` under `id`, returning the instance it replaces.
    pub fn insert<S: Into<String>>(&mut self, id: S, instance: Instance) -> Option<Instance> {
        self.instances.insert(id.into(), instance)
    }

    /// Validate `data` and register the resulting instance under `id`.
    pub fn load<S: Into<String>>(&mut self, id: S, data: InstanceData) -> Result<&Instance> {
        let instance = Instance::try_from(data)?;
        match self.instances.entry(id.into()) {
            Entry::Occupied(mut e) => {
                e.insert(instance);
                Ok(e.into_mut())
            }
            Entry::Vacant(e) => Ok(e.insert(instance)),
        }
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Instance> {
        self.instances.remove(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Registered instances ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.instances.iter().map(|(id, i)| (id.as_str(), i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::instance::{FacilityCapacity, Horizon, TestRequest};

    fn data(deadline: i64) -> InstanceData {
        InstanceData {
            horizon: Horizon::new(0, 10),
            tests: vec![
                TestRequest::new(1, 0, deadline, 0, 1, 0),
                TestRequest::new(2, 0, deadline, 0, 1, 0),
            ],
            vehicle_releases: BTreeMap::from([(0, 2)]),
            compatible: vec![(1, 2)],
            facility: FacilityCapacity::unlimited(),
            vehicle_cost: 1.,
        }
    }

    #[test]
    fn load_and_replace() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());

        let instance = registry.load("a", data(5)).unwrap();
        assert!(instance.may_precede(1, 2));
        assert!(!instance.may_precede(2, 1));

        registry.load("b", data(7)).unwrap();
        let replaced = registry.load("a", data(9)).map(|i| i.tests()[0].deadline);
        assert_eq!(replaced.unwrap(), 9);

        assert_eq!(registry.len(), 2);
        let ids = registry.iter().map(|(id, _)| id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(registry.remove("b").is_some());
        assert!(registry.get("b").is_none());
    }

    #[test]
    fn rejects_invalid_data() {
        let mut registry = Registry::new();
        let mut invalid = data(5);
        invalid.compatible.push((1, 3));
        assert!(matches!(
            registry.load("x", invalid),
            Err(Error::UnknownTest(3))
        ));
        assert!(registry.is_empty());
    }
}
