//! Skeletons: joint lists and inverse bind matrices

use std::sync::Arc;

use crate::buffer::AccessorData;
use crate::scene::SceneNode;

/// Joint hierarchy of a skinned mesh
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    /// Joint nodes; vertex joint indices refer to positions in this list
    pub joints: Vec<Arc<SceneNode>>,
    /// One column-major matrix per joint
    pub inverse_bind_matrices: Vec<[f32; 16]>,
    pub root: Option<Arc<SceneNode>>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a joint with its inverse bind matrix
    pub fn add_joint(mut self, joint: Arc<SceneNode>, inverse_bind_matrix: [f32; 16]) -> Self {
        self.joints.push(joint);
        self.inverse_bind_matrices.push(inverse_bind_matrix);
        self
    }

    pub fn root(mut self, root: Arc<SceneNode>) -> Self {
        self.root = Some(root);
        self
    }

    /// Get joint count
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Exported joint index for each source joint; hidden joints map to `None`
    pub fn joint_map(&self) -> Vec<Option<u32>> {
        let mut next = 0;
        self.joints
            .iter()
            .map(|joint| {
                joint.visible.then(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect()
    }

    /// Number of joints that survive export
    pub fn exported_joint_count(&self) -> usize {
        self.joints.iter().filter(|joint| joint.visible).count()
    }

    /// Inverse bind matrices of the exported joints as MAT4 accessor data
    pub fn inverse_bind_data(&self) -> AccessorData {
        let flat: Vec<f32> = self
            .joints
            .iter()
            .zip(&self.inverse_bind_matrices)
            .filter(|(joint, _)| joint.visible)
            .flat_map(|(_, matrix)| matrix.iter().copied())
            .collect();
        AccessorData::from_f32(&flat, 16)
    }

    pub fn build(self) -> Arc<Skeleton> {
        Arc::new(self)
    }
}
