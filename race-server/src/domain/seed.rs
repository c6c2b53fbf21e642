use std::collections::HashMap;
use uuid::Uuid;

/// A node in a seed's append-only DAG.
#[derive(Debug, Clone)]
pub struct SeedNode {
    pub id: String,
    pub tier: i32,
    pub kind: String,
    pub name: String,
}

/// An immutable, pre-generated seed artifact.
#[derive(Debug, Clone)]
pub struct Seed {
    pub id: Uuid,
    pub pool_name: String,
    pub nodes: Vec<SeedNode>,
    pub total_layers: i32,
}

impl Seed {
    pub fn tier_of(&self, node_id: &str) -> Option<i32> {
        self.nodes.iter().find(|n| n.id == node_id).map(|n| n.tier)
    }

    pub fn to_wire(&self) -> race_contracts::SeedInfoV1 {
        race_contracts::SeedInfoV1 {
            id: self.id,
            pool_name: self.pool_name.clone(),
            total_layers: self.total_layers,
            total_nodes: self.nodes.len() as i32,
            graph_json: self
                .nodes
                .iter()
                .map(|n| race_contracts::SeedNodeV1 {
                    id: n.id.clone(),
                    tier: n.tier,
                    kind: n.kind.clone(),
                    name: n.name.clone(),
                })
                .collect(),
        }
    }

    pub fn tier_lookup(&self) -> HashMap<String, i32> {
        self.nodes.iter().map(|n| (n.id.clone(), n.tier)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_of_finds_known_node() {
        let seed = Seed {
            id: Uuid::new_v4(),
            pool_name: "default".into(),
            total_layers: 2,
            nodes: vec![
                SeedNode { id: "start".into(), tier: 0, kind: "start".into(), name: "Start".into() },
                SeedNode { id: "z1".into(), tier: 1, kind: "zone".into(), name: "Zone 1".into() },
            ],
        };
        assert_eq!(seed.tier_of("z1"), Some(1));
        assert_eq!(seed.tier_of("missing"), None);
    }
}
