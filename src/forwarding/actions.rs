//! Configuration action types.
//!
//! Actions are pure data. Applying them to a live network (namespaces,
//! `sysctl`, kernel routes) is the job of an external executor.

use ipnet::Ipv4Net;
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// One idempotent configuration step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConfigAction {
    /// Put an address on an interface
    AssignAddress {
        node: String,
        interface: String,
        address: Ipv4Net,
    },
    EnableForwarding {
        router: String,
    },
    DisableForwarding {
        router: String,
    },
    InstallRoute {
        router: String,
        destination: Ipv4Net,
        next_hop: Ipv4Addr,
        egress: String,
    },
    /// Point a host's default route at its LAN gateway
    SetDefaultRoute {
        host: String,
        gateway: Ipv4Addr,
        egress: String,
    },
}

/// Canonical command rendering; `replace` forms make re-application a no-op
impl fmt::Display for ConfigAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssignAddress { node, interface, address } => {
                write!(f, "{}: ip addr replace {} dev {}", node, address, interface)
            }
            Self::EnableForwarding { router } => {
                write!(f, "{}: sysctl -w net.ipv4.ip_forward=1", router)
            }
            Self::DisableForwarding { router } => {
                write!(f, "{}: sysctl -w net.ipv4.ip_forward=0", router)
            }
            Self::InstallRoute { router, destination, next_hop, egress } => {
                write!(f, "{}: ip route replace {} via {} dev {}", router, destination, next_hop, egress)
            }
            Self::SetDefaultRoute { host, gateway, egress } => {
                write!(f, "{}: ip route replace default via {} dev {}", host, gateway, egress)
            }
        }
    }
}

/// Ordered action list for a whole plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionList {
    pub actions: Vec<ConfigAction>,
}

impl ActionList {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// One canonical line per action
    pub fn render(&self) -> String {
        let mut out = String::new();
        for action in &self.actions {
            out.push_str(&action.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering() {
        let route = ConfigAction::InstallRoute {
            router: "rA".to_string(),
            destination: "20.10.172.0/25".parse().unwrap(),
            next_hop: Ipv4Addr::new(20, 10, 100, 2),
            egress: "rA-eth1".to_string(),
        };
        assert_eq!(
            route.to_string(),
            "rA: ip route replace 20.10.172.0/25 via 20.10.100.2 dev rA-eth1"
        );
        assert_eq!(
            ConfigAction::EnableForwarding { router: "rA".to_string() }.to_string(),
            "rA: sysctl -w net.ipv4.ip_forward=1"
        );
    }

    #[test]
    fn test_serialized_tag() {
        let action = ConfigAction::DisableForwarding { router: "r1".to_string() };
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, r#"{"action":"disable_forwarding","router":"r1"}"#);
    }

    #[test]
    fn test_render_one_line_per_action() {
        let list = ActionList {
            actions: vec![
                ConfigAction::EnableForwarding { router: "r1".to_string() },
                ConfigAction::EnableForwarding { router: "r2".to_string() },
            ],
        };
        assert_eq!(list.len(), 2);
        assert!(!list.is_empty());
        assert_eq!(list.render().lines().nth(1), Some("r2: sysctl -w net.ipv4.ip_forward=1"));
    }
}
