// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use gantry_common::Machine;

/// A deployable component of the control-plane bundle.
///
/// The orchestrator treats the three lifecycle hooks as opaque: they
/// may block and they may fail, and a failure never propagates past
/// the orchestrator's per-charm handling.
pub trait Charm: Send + Sync {
    /// Service name this charm deploys as; also the key the
    /// orchestrator uses to find it in a snapshot.
    fn name(&self) -> &str;

    /// Lower priorities deploy first.
    fn deploy_priority(&self) -> i32;

    /// Whether additional units may be added after deployment.
    fn allow_multi_units(&self) -> bool {
        false
    }

    /// Deploy the charm onto the controller machine.
    fn setup(&self, machine: &Machine) -> Result<()>;

    /// Wire this charm's relations to its peers.
    fn set_relations(&self) -> Result<()>;

    /// Any one-time work after relations are in place.
    fn post_proc(&self) -> Result<()>;
}

impl fmt::Debug for dyn Charm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Charm")
            .field("name", &self.name())
            .field("deploy_priority", &self.deploy_priority())
            .finish()
    }
}

/// The fixed set of charms to install, sorted once at startup.
///
/// Iteration order is ascending deploy priority; equal priorities keep
/// their registration order (the sort is stable), so a given registry
/// always yields the same order.
#[derive(Debug, Clone)]
pub struct CharmRegistry {
    charms: Vec<Arc<dyn Charm>>,
}

impl CharmRegistry {
    pub fn new(mut charms: Vec<Arc<dyn Charm>>) -> CharmRegistry {
        charms.sort_by_key(|c| c.deploy_priority());
        CharmRegistry { charms }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Charm>> {
        self.charms.iter()
    }

    pub fn len(&self) -> usize {
        self.charms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charms.is_empty()
    }

    /// Charms that accept extra units, for `add-unit`.
    pub fn multi_unit_charms(&self) -> impl Iterator<Item = &Arc<dyn Charm>> {
        self.charms.iter().filter(|c| c.allow_multi_units())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Charm>> {
        self.charms.iter().find(|c| c.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inert(&'static str, i32);

    impl Charm for Inert {
        fn name(&self) -> &str {
            self.0
        }
        fn deploy_priority(&self) -> i32 {
            self.1
        }
        fn setup(&self, _machine: &Machine) -> Result<()> {
            Ok(())
        }
        fn set_relations(&self) -> Result<()> {
            Ok(())
        }
        fn post_proc(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn registry_orders_by_priority_then_registration() {
        let registry = CharmRegistry::new(vec![
            Arc::new(Inert("glance", 20)),
            Arc::new(Inert("mysql", 10)),
            Arc::new(Inert("keystone", 20)),
            Arc::new(Inert("rabbitmq-server", 10)),
        ]);
        let names: Vec<&str> =
            registry.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            ["mysql", "rabbitmq-server", "glance", "keystone"]
        );
    }
}
