//! The partitioning/migration contract the adaptation pass consumes but
//! does not implement: balance, ghost exchange, pack. Expressed as a trait
//! so the pass is runnable and testable without an MPI transport, matching
//! the way the reference product's `GeometryKernel` trait lets tests supply
//! `TruckKernel`'s stand-in.

use crate::error::AdaptResult;
use crate::geom::GeomAssoc;
use crate::mesh::Mesh;
use crate::metric::MetricTensor;
use crate::node_store::GlobalId;
use crate::geometry::Point3;

pub trait PartitionService {
    /// Migrate node ownership to equalize counts across partitions.
    fn balance(&self, mesh: &mut Mesh) -> AdaptResult<()>;

    /// Ensure every locally-referenced non-owned node exists as an
    /// up-to-date ghost (coordinates, metric, geom associations).
    fn ghost(&self, mesh: &mut Mesh) -> AdaptResult<()>;

    /// Compact free-list slots and rewrite references accordingly.
    fn pack(&self, mesh: &mut Mesh) -> AdaptResult<()>;
}

/// The default, single-process partitioning: `balance`/`ghost` are no-ops
/// (there is nowhere else to migrate to), `pack` delegates to the stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct SinglePartition;

impl PartitionService for SinglePartition {
    fn balance(&self, _mesh: &mut Mesh) -> AdaptResult<()> {
        Ok(())
    }

    fn ghost(&self, _mesh: &mut Mesh) -> AdaptResult<()> {
        Ok(())
    }

    fn pack(&self, mesh: &mut Mesh) -> AdaptResult<()> {
        mesh.pack()
    }
}

/// Everything a ghost refresh carries for one node: enough for the
/// receiving partition to install or refresh a read-only replica without
/// talking to the owner again until the next refresh.
#[derive(Debug, Clone)]
pub struct GhostUpdate {
    pub global_id: GlobalId,
    pub xyz: Point3,
    pub metric: MetricTensor,
    pub owner_part: i32,
    pub associations: Vec<GeomAssoc>,
}

impl GhostUpdate {
    /// Build the update an owning partition would publish for `node`.
    pub fn from_mesh(mesh: &Mesh, node: crate::node_store::NodeIndex) -> Option<Self> {
        let n = mesh.nodes.get(node)?;
        Some(Self {
            global_id: n.global_id,
            xyz: n.xyz,
            metric: n.metric,
            owner_part: n.part,
            associations: mesh.geom.associations(node).to_vec(),
        })
    }

    /// Apply a received update to a (possibly empty) ghost mesh: insert the
    /// node at its global id's local slot if absent, otherwise refresh it in
    /// place.
    pub fn apply(&self, mesh: &mut Mesh) {
        use crate::node_store::Node;

        let node = Node::new(self.global_id, self.xyz, self.metric, self.owner_part);
        let index = match mesh.nodes.local_of(self.global_id) {
            Some(existing) => {
                if let Some(slot) = mesh.nodes.get_mut(existing) {
                    *slot = node;
                }
                existing
            }
            None => mesh.nodes.insert(node),
        };
        for assoc in &self.associations {
            mesh.geom.add(index, *assoc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3;
    use crate::node_store::{GlobalId, Node};

    #[test]
    fn single_partition_pack_delegates_to_mesh() {
        let mut mesh = Mesh::new();
        let n0 = mesh.nodes.insert(Node::new(GlobalId(0), Point3::origin(), MetricTensor::identity(), 0));
        mesh.nodes.remove(n0).unwrap();
        mesh.nodes.insert(Node::new(GlobalId(1), Point3::origin(), MetricTensor::identity(), 0));

        let service = SinglePartition;
        service.balance(&mut mesh).unwrap();
        service.ghost(&mut mesh).unwrap();
        service.pack(&mut mesh).unwrap();

        assert_eq!(mesh.nodes.capacity(), mesh.nodes.len());
    }

    #[test]
    fn ghost_update_round_trips_node_state() {
        let mut owner_mesh = Mesh::new();
        let idx = owner_mesh
            .nodes
            .insert(Node::new(GlobalId(42), Point3::new(1.0, 2.0, 3.0), MetricTensor::isotropic(0.5), 0));
        owner_mesh.geom.add(idx, GeomAssoc::vertex(9));

        let update = GhostUpdate::from_mesh(&owner_mesh, idx).unwrap();

        let mut ghost_mesh = Mesh::new();
        update.apply(&mut ghost_mesh);

        let local = ghost_mesh.nodes.local_of(GlobalId(42)).unwrap();
        let node = ghost_mesh.nodes.get(local).unwrap();
        assert_eq!(node.xyz, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(node.metric, MetricTensor::isotropic(0.5));
        assert_eq!(ghost_mesh.geom.associations(local).len(), 1);
    }
}
