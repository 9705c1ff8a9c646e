// ABOUTME: Dependency ordering between catalog services
// ABOUTME: Expands requested services to their transitive dependencies in dependency-first order

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::NodeIndex;
use petgraph::Graph;
use std::collections::{HashMap, HashSet, VecDeque};

use super::error::{CatalogError, Result};
use super::registry::Catalog;
use super::service::ServiceDefinition;

pub struct DependencyGraph<'c> {
    graph: Graph<&'c ServiceDefinition, ()>,
}

impl<'c> DependencyGraph<'c> {
    /// Graph of `requested` and everything they transitively depend on.
    pub fn for_services(catalog: &'c Catalog, requested: &[String]) -> Result<Self> {
        let mut included: Vec<&'c ServiceDefinition> = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&'c ServiceDefinition> = VecDeque::new();

        for name in requested {
            let service = catalog.get(name)?;
            if seen.insert(service.name.as_str()) {
                queue.push_back(service);
            }
        }

        while let Some(service) = queue.pop_front() {
            included.push(service);
            for dependency in &service.dependencies {
                let dep = catalog
                    .get(dependency)
                    .map_err(|_| CatalogError::UnknownDependency {
                        service: service.name.clone(),
                        dependency: dependency.clone(),
                    })?;
                if seen.insert(dep.name.as_str()) {
                    queue.push_back(dep);
                }
            }
        }

        included.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));

        let mut graph = Graph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
        for service in &included {
            indices.insert(service.name.as_str(), graph.add_node(*service));
        }
        for service in &included {
            for dependency in &service.dependencies {
                // dependency -> dependent
                graph.add_edge(indices[dependency.as_str()], indices[service.name.as_str()], ());
            }
        }

        Ok(Self { graph })
    }

    /// Services in an order where every dependency precedes its dependents.
    pub fn ordered(&self) -> Result<Vec<&'c ServiceDefinition>> {
        let sorted = toposort(&self.graph, None).map_err(|_| CatalogError::CircularDependency {
            services: self.cycle_members(),
        })?;
        Ok(sorted.into_iter().map(|index| self.graph[index]).collect())
    }

    /// Names in the first strongly connected component that forms a cycle.
    fn cycle_members(&self) -> Vec<String> {
        let cycle = tarjan_scc(&self.graph).into_iter().find(|component| {
            component.len() > 1 || self.graph.contains_edge(component[0], component[0])
        });

        let mut members: Vec<String> = cycle
            .unwrap_or_default()
            .into_iter()
            .map(|index| self.graph[index].name.clone())
            .collect();
        members.sort();
        members
    }
}

impl Catalog {
    /// `names` plus their transitive dependencies, dependencies first.
    pub fn resolve_dependencies(&self, names: &[String]) -> Result<Vec<&ServiceDefinition>> {
        DependencyGraph::for_services(self, names)?.ordered()
    }
}
