//! Joint hierarchy with per-joint local poses and skinning matrices

use cadence_core::{mat4_mul, CadenceError, Mat4, Result, Transform, IDENTITY_MAT4};
use std::collections::HashMap;

/// One joint of a skeleton
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    /// Index of the parent joint; always lower than this joint's index
    pub parent: Option<usize>,
    pub inverse_bind: Mat4,
}

impl Joint {
    pub fn new(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
            inverse_bind: IDENTITY_MAT4,
        }
    }

    pub fn with_inverse_bind(mut self, inverse_bind: Mat4) -> Self {
        self.inverse_bind = inverse_bind;
        self
    }
}

/// Skeleton pose state.
///
/// Animation writes `local_poses`; [`compute_bone_matrices`] then walks the
/// joints parents-first and stores `global * inverse_bind` per joint.
///
/// [`compute_bone_matrices`]: Skeleton::compute_bone_matrices
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    joints: Vec<Joint>,
    by_name: HashMap<String, usize>,
    pub local_poses: Vec<Transform>,
    pub bone_matrices: Vec<Mat4>,
}

impl Skeleton {
    /// Build a skeleton from joints listed parents before children
    pub fn new(joints: Vec<Joint>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(joints.len());
        for (index, joint) in joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                if parent >= index {
                    return Err(CadenceError::AnimationError(format!(
                        "joint '{}' ({}) must come after its parent ({})",
                        joint.name, index, parent
                    )));
                }
            }
            if by_name.insert(joint.name.clone(), index).is_some() {
                return Err(CadenceError::AnimationError(format!(
                    "duplicate joint name '{}'",
                    joint.name
                )));
            }
        }

        let count = joints.len();
        Ok(Self {
            joints,
            by_name,
            local_poses: vec![Transform::IDENTITY; count],
            bone_matrices: vec![IDENTITY_MAT4; count],
        })
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn compute_bone_matrices(&mut self) {
        let mut globals = vec![IDENTITY_MAT4; self.joints.len()];

        for (i, joint) in self.joints.iter().enumerate() {
            let local = self.local_poses[i].to_matrix();
            globals[i] = match joint.parent {
                Some(parent) => mat4_mul(&globals[parent], &local),
                None => local,
            };
            self.bone_matrices[i] = mat4_mul(&globals[i], &joint.inverse_bind);
        }
    }

    /// Copy local poses from `source` for every joint whose name exists in
    /// both skeletons. Returns how many joints were copied.
    pub fn copy_pose_from(&mut self, source: &Skeleton) -> usize {
        let mut copied = 0;
        for (i, joint) in self.joints.iter().enumerate() {
            if let Some(j) = source.joint_index(&joint.name) {
                self.local_poses[i] = source.local_poses[j];
                copied += 1;
            }
        }
        copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{mat4_approx_eq, mat4_translation, Vec3};

    fn arm() -> Skeleton {
        Skeleton::new(vec![
            Joint::new("root", None),
            Joint::new("elbow", Some(0)),
            Joint::new("hand", Some(1)),
        ])
        .unwrap()
    }

    #[test]
    fn test_identity_poses_give_identity_bones() {
        let mut skel = arm();
        skel.compute_bone_matrices();
        for bone in &skel.bone_matrices {
            assert!(mat4_approx_eq(bone, &IDENTITY_MAT4, 1e-6));
        }
    }

    #[test]
    fn test_translations_accumulate_down_the_chain() {
        let mut skel = arm();
        skel.local_poses[0].position = Vec3::new(1.0, 0.0, 0.0);
        skel.local_poses[1].position = Vec3::new(0.0, 2.0, 0.0);
        skel.local_poses[2].position = Vec3::new(0.0, 0.0, 3.0);
        skel.compute_bone_matrices();

        let hand = mat4_translation(&skel.bone_matrices[2]);
        assert!((hand.x - 1.0).abs() < 1e-5);
        assert!((hand.y - 2.0).abs() < 1e-5);
        assert!((hand.z - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_inverse_bind_is_applied_last() {
        let offset = Transform::from_position(Vec3::new(-1.0, 0.0, 0.0)).to_matrix();
        let mut skel = Skeleton::new(vec![Joint::new("root", None).with_inverse_bind(offset)]).unwrap();
        skel.local_poses[0].position = Vec3::new(1.0, 0.0, 0.0);
        skel.compute_bone_matrices();
        assert!(mat4_approx_eq(&skel.bone_matrices[0], &IDENTITY_MAT4, 1e-6));
    }

    #[test]
    fn test_rejects_child_before_parent() {
        let err = Skeleton::new(vec![Joint::new("a", Some(1)), Joint::new("b", None)]);
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let err = Skeleton::new(vec![Joint::new("a", None), Joint::new("a", Some(0))]);
        assert!(err.is_err());
    }

    #[test]
    fn test_copy_pose_matches_by_name() {
        let mut source = arm();
        source.local_poses[2].position = Vec3::new(5.0, 0.0, 0.0);

        let mut glove = Skeleton::new(vec![Joint::new("hand", None), Joint::new("thumb", Some(0))]).unwrap();
        assert_eq!(glove.copy_pose_from(&source), 1);
        assert_eq!(glove.local_poses[0].position, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(glove.local_poses[1], Transform::IDENTITY);
    }
}
