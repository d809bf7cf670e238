//! Phase/authority finite-state machine.
//!
//! Gates every mutating repository access by the currently active phase
//! and, where relevant, which side owns authority over a component.

use std::collections::{HashMap, HashSet};

use crate::error::{EcsError, EcsResult};

/// What a phase permits a caller to do with a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    NoAccess,
    ReadOnly,
    /// Writable only where the caller holds authority over the component.
    ReadWriteOwned,
    /// Writable only where the caller does *not* hold authority (network
    /// receive applying remote-owned state).
    ReadWriteRemoteOnly,
    ReadWriteAll,
}

impl Permission {
    fn allows_read(self) -> bool {
        !matches!(self, Permission::NoAccess)
    }

    fn allows_write(self, has_authority: bool) -> bool {
        match self {
            Permission::NoAccess | Permission::ReadOnly => false,
            Permission::ReadWriteAll => true,
            Permission::ReadWriteOwned => has_authority,
            Permission::ReadWriteRemoteOnly => !has_authority,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseConfig {
    pub valid_transitions: HashMap<String, HashSet<String>>,
    pub permissions: HashMap<String, Permission>,
}

impl PhaseConfig {
    /// Strict chain: Initialization -> NetworkReceive -> Simulation ->
    /// NetworkSend -> Presentation, no skips.
    pub fn default_strict() -> Self {
        let chain = [
            "Initialization",
            "NetworkReceive",
            "Simulation",
            "NetworkSend",
            "Presentation",
        ];
        let mut valid_transitions = HashMap::new();
        for window in chain.windows(2) {
            let mut next = HashSet::new();
            next.insert(window[1].to_string());
            valid_transitions.insert(window[0].to_string(), next);
        }
        valid_transitions.insert("Presentation".to_string(), HashSet::new());

        let mut permissions = HashMap::new();
        permissions.insert("Initialization".to_string(), Permission::ReadWriteAll);
        permissions.insert(
            "NetworkReceive".to_string(),
            Permission::ReadWriteRemoteOnly,
        );
        permissions.insert("Simulation".to_string(), Permission::ReadWriteOwned);
        permissions.insert("NetworkSend".to_string(), Permission::ReadOnly);
        permissions.insert("Presentation".to_string(), Permission::ReadOnly);

        Self {
            valid_transitions,
            permissions,
        }
    }

    /// Any transition allowed, `ReadWriteAll` everywhere. Intended for
    /// tests and bootstrap scripts.
    pub fn relaxed(phase_names: &[&str]) -> Self {
        let mut valid_transitions = HashMap::new();
        let mut permissions = HashMap::new();
        let all: HashSet<String> = phase_names.iter().map(|s| s.to_string()).collect();
        for name in phase_names {
            valid_transitions.insert(name.to_string(), all.clone());
            permissions.insert(name.to_string(), Permission::ReadWriteAll);
        }
        Self {
            valid_transitions,
            permissions,
        }
    }
}

pub struct PhaseMachine {
    config: PhaseConfig,
    current: String,
}

impl PhaseMachine {
    pub fn new(config: PhaseConfig, initial: &str) -> Self {
        Self {
            config,
            current: initial.to_string(),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn set_phase(&mut self, target: &str) -> EcsResult<()> {
        let allowed = self
            .config
            .valid_transitions
            .get(&self.current)
            .map(|set| set.contains(target))
            .unwrap_or(false);
        if !allowed {
            return Err(EcsError::WrongPhaseTransition {
                from: self.current.clone(),
                to: target.to_string(),
            });
        }
        tracing::debug!(from = %self.current, to = %target, "phase transition");
        self.current = target.to_string();
        Ok(())
    }

    fn permission(&self) -> Permission {
        self.config
            .permissions
            .get(&self.current)
            .copied()
            .unwrap_or(Permission::NoAccess)
    }

    pub fn check_read(&self, type_name: &str) -> EcsResult<()> {
        if self.permission().allows_read() {
            Ok(())
        } else {
            Err(EcsError::PhaseViolation {
                access: "read",
                type_id: type_name.to_string(),
                phase: self.current.clone(),
                authority: false,
            })
        }
    }

    pub fn check_write(&self, type_name: &str, has_authority: bool) -> EcsResult<()> {
        if self.permission().allows_write(has_authority) {
            Ok(())
        } else {
            Err(EcsError::PhaseViolation {
                access: "write",
                type_id: type_name.to_string(),
                phase: self.current.clone(),
                authority: has_authority,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_chain_rejects_skips() {
        let mut machine = PhaseMachine::new(PhaseConfig::default_strict(), "Initialization");
        assert!(machine.set_phase("Simulation").is_err());
        assert!(machine.set_phase("NetworkReceive").is_ok());
        assert!(machine.set_phase("Simulation").is_ok());
    }

    #[test]
    fn presentation_rejects_every_write() {
        let mut machine = PhaseMachine::new(PhaseConfig::default_strict(), "Initialization");
        for phase in ["NetworkReceive", "Simulation", "NetworkSend", "Presentation"] {
            machine.set_phase(phase).unwrap();
        }
        assert!(machine.check_write("Position", true).is_err());
        assert!(machine.check_write("Position", false).is_err());
        assert!(machine.check_read("Position").is_ok());
    }

    #[test]
    fn simulation_rejects_remote_authority_writes() {
        let mut machine = PhaseMachine::new(PhaseConfig::default_strict(), "Initialization");
        machine.set_phase("NetworkReceive").unwrap();
        machine.set_phase("Simulation").unwrap();
        assert!(machine.check_write("Position", true).is_ok());
        assert!(machine.check_write("Position", false).is_err());
    }

    #[test]
    fn network_receive_only_writes_remote_owned() {
        let mut machine = PhaseMachine::new(PhaseConfig::default_strict(), "Initialization");
        machine.set_phase("NetworkReceive").unwrap();
        assert!(machine.check_write("Position", false).is_ok());
        assert!(machine.check_write("Position", true).is_err());
    }

    #[test]
    fn relaxed_config_allows_any_transition_and_access() {
        let names = ["A", "B", "C"];
        let mut machine = PhaseMachine::new(PhaseConfig::relaxed(&names), "A");
        assert!(machine.set_phase("C").is_ok());
        assert!(machine.check_write("Anything", false).is_ok());
    }
}
