//! The routing graph (§4.C): a labeled directed multigraph on workers,
//! built as a plain name registry plus per-stanza route lists — the
//! Go original uses two hand-rolled maps rather than a graph library,
//! and this keeps that shape rather than pulling in `petgraph` for a
//! structure this simple.

use std::collections::{HashMap, HashSet};

use crate::config::PipelineStanza;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate stanza name: {0}")]
    DuplicateName(String),
    #[error("no routes defined in configuration")]
    NoRoutesDefined,
    #[error("stanza {stanza:?} routes to unknown peer {target:?}")]
    UnresolvedRoute { stanza: String, target: String },
    #[error("stanza {0:?} lists itself as a forward target")]
    SelfLoop(String),
}

/// Validated route lists for one stanza, resolved against the
/// registry of declared stanza names.
#[derive(Debug, Clone, Default)]
pub struct RouteSet {
    pub forward: Vec<String>,
    pub dropped: Vec<String>,
}

/// The graph's static shape: every declared name plus its resolved
/// forward/dropped edges. Built once at assembly time; topology is
/// immutable thereafter (§4.F: "topology itself is NOT mutated at
/// reload time").
#[derive(Debug, Clone, Default)]
pub struct RoutingGraph {
    routes: HashMap<String, RouteSet>,
}

impl RoutingGraph {
    /// Runs the pre-flight checks from §4.C/§4.D steps 1-2 and builds
    /// the resolved route table.
    pub fn build(stanzas: &[PipelineStanza]) -> Result<Self, GraphError> {
        let mut names = HashSet::new();
        for stanza in stanzas {
            if !names.insert(stanza.name.clone()) {
                return Err(GraphError::DuplicateName(stanza.name.clone()));
            }
        }

        let any_routes = stanzas.iter().any(|s| !s.routing_policy.is_empty());
        if !any_routes {
            return Err(GraphError::NoRoutesDefined);
        }

        let mut routes = HashMap::new();
        for stanza in stanzas {
            for target in &stanza.routing_policy.forward {
                if target == &stanza.name {
                    return Err(GraphError::SelfLoop(stanza.name.clone()));
                }
                if !names.contains(target) {
                    return Err(GraphError::UnresolvedRoute {
                        stanza: stanza.name.clone(),
                        target: target.clone(),
                    });
                }
            }
            for target in &stanza.routing_policy.dropped {
                if target == &stanza.name {
                    return Err(GraphError::SelfLoop(stanza.name.clone()));
                }
                if !names.contains(target) {
                    return Err(GraphError::UnresolvedRoute {
                        stanza: stanza.name.clone(),
                        target: target.clone(),
                    });
                }
            }

            routes.insert(
                stanza.name.clone(),
                RouteSet {
                    forward: stanza.routing_policy.forward.clone(),
                    dropped: stanza.routing_policy.dropped.clone(),
                },
            );
        }

        Ok(Self { routes })
    }

    pub fn routes_for(&self, name: &str) -> Option<&RouteSet> {
        self.routes.get(name)
    }

    pub fn stanza_names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Structural equality used by property 7 ("reload preserves
    /// topology"): a reload must not change any edge.
    pub fn topology_eq(&self, other: &RoutingGraph) -> bool {
        if self.routes.len() != other.routes.len() {
            return false;
        }
        self.routes.iter().all(|(name, set)| {
            other
                .routes
                .get(name)
                .is_some_and(|other_set| set.forward == other_set.forward && set.dropped == other_set.dropped)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingPolicy;

    fn stanza(name: &str, forward: &[&str], dropped: &[&str]) -> PipelineStanza {
        PipelineStanza {
            name: name.to_string(),
            params: HashMap::new(),
            transforms: HashMap::new(),
            routing_policy: RoutingPolicy {
                forward: forward.iter().map(|s| s.to_string()).collect(),
                dropped: dropped.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let stanzas = vec![stanza("a", &["b"], &[]), stanza("a", &[], &[])];
        assert_eq!(RoutingGraph::build(&stanzas).unwrap_err(), GraphError::DuplicateName("a".into()));
    }

    #[test]
    fn rejects_configs_with_no_routes() {
        let stanzas = vec![stanza("a", &[], &[]), stanza("b", &[], &[])];
        assert_eq!(RoutingGraph::build(&stanzas).unwrap_err(), GraphError::NoRoutesDefined);
    }

    #[test]
    fn rejects_unresolved_route_targets() {
        let stanzas = vec![stanza("a", &["ghost"], &[])];
        assert_eq!(
            RoutingGraph::build(&stanzas).unwrap_err(),
            GraphError::UnresolvedRoute {
                stanza: "a".into(),
                target: "ghost".into()
            }
        );
    }

    #[test]
    fn rejects_self_loops() {
        let stanzas = vec![stanza("a", &["a"], &[])];
        assert_eq!(RoutingGraph::build(&stanzas).unwrap_err(), GraphError::SelfLoop("a".into()));
    }

    #[test]
    fn general_cycles_are_permitted() {
        let stanzas = vec![stanza("a", &["b"], &[]), stanza("b", &["a"], &[])];
        assert!(RoutingGraph::build(&stanzas).is_ok());
    }

    #[test]
    fn valid_graph_resolves_routes() {
        let stanzas = vec![stanza("a", &["b"], &[]), stanza("b", &[], &[])];
        let graph = RoutingGraph::build(&stanzas).unwrap();
        assert_eq!(graph.routes_for("a").unwrap().forward, vec!["b".to_string()]);
    }

    #[test]
    fn reload_preserving_topology_is_equal() {
        let stanzas = vec![stanza("a", &["b"], &[]), stanza("b", &[], &[])];
        let g1 = RoutingGraph::build(&stanzas).unwrap();
        let g2 = RoutingGraph::build(&stanzas).unwrap();
        assert!(g1.topology_eq(&g2));
    }
}
