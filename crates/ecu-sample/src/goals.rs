//! Goals and module types shared by the sample's modules and router.

use ecu_framework::goal_enum;
use serde::{Deserialize, Serialize};

goal_enum! {
    /// Everything a job in this application can ask for.
    pub enum EcuGoal {
        Read,
        StoreReading,
    }
}

pub const SENSOR: &str = "sensor";
pub const LOGGER: &str = "logger";

/// One temperature sample, carried as the JSON payload of `store_reading` jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor: String,
    pub sample: u64,
    pub celsius: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_framework::Goal;

    #[test]
    fn goal_names_are_snake_case() {
        assert_eq!(EcuGoal::StoreReading.name(), "store_reading");
        assert_eq!(Goal::from(EcuGoal::Read), Goal::new("READ"));
        assert_eq!(EcuGoal::ALL.len(), 2);
    }
}
