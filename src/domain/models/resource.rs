//! Shared resource model.

use serde::{Deserialize, Serialize};

use super::task::ResourceType;

/// A named capacity unit in the shared pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Pool entry name (e.g. "cpu", "staging-db")
    pub name: String,
    /// Kind of resource
    pub resource_type: ResourceType,
    /// Total units available
    pub capacity: u32,
    /// Whether at most one holder is allowed at a time
    pub exclusive: bool,
}

impl Resource {
    pub fn new(name: impl Into<String>, resource_type: ResourceType, capacity: u32) -> Self {
        Self {
            name: name.into(),
            resource_type,
            capacity,
            exclusive: false,
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// Point-in-time utilization of one pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub name: String,
    pub capacity: u32,
    pub in_use: u32,
    /// Task currently holding the resource exclusively, if any
    pub exclusive_holder: Option<String>,
}

impl ResourceUtilization {
    /// Fraction of capacity in use, in [0, 1].
    pub fn ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        f64::from(self.in_use) / f64::from(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_builder() {
        let db = Resource::new("staging-db", ResourceType::Database, 1).exclusive();
        assert!(db.exclusive);
        assert_eq!(db.capacity, 1);
    }

    #[test]
    fn test_utilization_ratio() {
        let util = ResourceUtilization {
            name: "cpu".to_string(),
            capacity: 8,
            in_use: 2,
            exclusive_holder: None,
        };
        assert!((util.ratio() - 0.25).abs() < f64::EPSILON);
    }
}
