use cadence_animation::{
    AnimationClip, AnimationSystem, AnimationTrack, Interpolation, Joint, Keyframe, NodeAnimator,
    Skeleton, TrackProperty, TrackTarget,
};
use cadence_core::{Mat4, SchedulerConfig, Transform, Vec3};
use cadence_runtime::Scheduler;
use std::cell::RefCell;
use std::rc::Rc;

const RIGS: usize = 12;

fn keys(values: &[(f64, &[f32])]) -> Vec<Keyframe> {
    values
        .iter()
        .map(|(time, value)| Keyframe {
            time: *time,
            value: value.to_vec(),
        })
        .collect()
}

fn clips() -> Vec<AnimationClip> {
    vec![
        AnimationClip {
            name: "sway".into(),
            duration: 1.5,
            tracks: vec![
                AnimationTrack {
                    target: TrackTarget::Node,
                    property: TrackProperty::Translation,
                    interpolation: Interpolation::Linear,
                    keyframes: keys(&[(0.0, &[0.0, 0.0, 0.0]), (0.75, &[1.0, 0.5, 0.0]), (1.5, &[0.0, 0.0, 0.0])]),
                },
                AnimationTrack {
                    target: TrackTarget::Joint { name: "hand".into() },
                    property: TrackProperty::Rotation,
                    interpolation: Interpolation::Linear,
                    keyframes: keys(&[(0.0, &[0.0, 0.0, 0.0, 1.0]), (1.5, &[0.0, 0.7071, 0.0, 0.7071])]),
                },
                AnimationTrack {
                    target: TrackTarget::Joint { name: "elbow".into() },
                    property: TrackProperty::Translation,
                    interpolation: Interpolation::Step,
                    keyframes: keys(&[(0.0, &[0.0, 1.0, 0.0]), (0.5, &[0.0, 1.5, 0.0]), (1.0, &[0.0, 2.0, 0.0])]),
                },
            ],
        },
        AnimationClip {
            name: "spin".into(),
            duration: 0.8,
            tracks: vec![AnimationTrack {
                target: TrackTarget::Node,
                property: TrackProperty::Rotation,
                interpolation: Interpolation::Linear,
                keyframes: keys(&[(0.0, &[0.0, 0.0, 0.0, 1.0]), (0.8, &[0.0, 0.0, 1.0, 0.0])]),
            }],
        },
    ]
}

fn arm() -> Skeleton {
    Skeleton::new(vec![
        Joint::new("shoulder", None),
        Joint::new("elbow", Some(0)),
        Joint::new("hand", Some(1)),
    ])
    .unwrap()
}

#[derive(Debug, PartialEq)]
struct Snapshot {
    locals: Vec<(String, Transform)>,
    worlds: Vec<(String, Mat4)>,
    bones: Vec<(String, Vec<Mat4>)>,
    changes: usize,
}

fn run(workers: usize) -> Snapshot {
    let config = SchedulerConfig {
        worker_threads: Some(workers),
        ..SchedulerConfig::default()
    };
    let animation = Rc::new(RefCell::new(AnimationSystem::new()));
    let mut scheduler = Scheduler::builder(config)
        .with_shared_system(Rc::clone(&animation))
        .build()
        .unwrap();

    let mut names = Vec::new();
    {
        let world = scheduler.world_mut();
        let mut anim = animation.borrow_mut();
        for clip in clips() {
            anim.add_clip(clip);
        }

        for i in 0..RIGS {
            let offset = Transform::from_position(Vec3::new(i as f32 * 3.0, 0.0, 0.0));
            let body = world.scene.spawn_with_transform(format!("body{i}"), offset).unwrap();
            let arm_node = world
                .scene
                .spawn_child(format!("arm{i}"), body, Transform::from_position(Vec3::UP))
                .unwrap();
            let prop = world
                .scene
                .spawn_child(format!("prop{i}"), arm_node, Transform::IDENTITY)
                .unwrap();
            let glove = world
                .scene
                .spawn_child(format!("glove{i}"), body, Transform::IDENTITY)
                .unwrap();

            anim.attach_skeleton(body, arm());
            anim.play(body, NodeAnimator::new("sway").with_speed(1.0 + i as f64 * 0.1))
                .unwrap();
            anim.play(prop, NodeAnimator::new("spin")).unwrap();
            anim.bone_merge(
                glove,
                body,
                Skeleton::new(vec![Joint::new("elbow", None), Joint::new("hand", Some(0))]).unwrap(),
            )
            .unwrap();
            if i == 5 {
                anim.animator_mut(prop).unwrap().clip = "missing".into();
            }

            names.extend([format!("body{i}"), format!("prop{i}"), format!("glove{i}")]);
        }
        world.scene.take_transform_changes();
    }

    let mut changes = 0;
    for frame in 1..=45 {
        scheduler.frame(frame as f64 / 60.0);
        changes += scheduler.world_mut().scene.take_transform_changes().len();
    }

    let world = scheduler.world();
    let anim = animation.borrow();
    let mut snapshot = Snapshot {
        locals: Vec::new(),
        worlds: Vec::new(),
        bones: Vec::new(),
        changes,
    };
    for name in names {
        let entity = world.scene.find(&name).unwrap();
        snapshot
            .locals
            .push((name.clone(), world.scene.local_transform(entity).unwrap()));
        if let Some(matrix) = anim.world_matrix(entity) {
            snapshot.worlds.push((name.clone(), matrix));
        }
        if let Some(skeleton) = anim.skeleton(entity) {
            snapshot.bones.push((name, skeleton.bone_matrices.clone()));
        }
    }
    snapshot
}

#[test]
fn test_one_and_eight_workers_produce_identical_poses() {
    let one = run(1);
    let eight = run(8);
    assert_eq!(one.bones.len(), RIGS * 2);
    assert!(one.changes > 0);
    assert_eq!(one, eight);
}

#[test]
fn test_failing_subtree_does_not_disturb_its_siblings() {
    let snapshot = run(4);
    let local = |name: &str| {
        snapshot
            .locals
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
            .unwrap()
    };
    assert_eq!(local("body5"), Transform::IDENTITY.with_position(Vec3::new(15.0, 0.0, 0.0)));
    assert_eq!(local("prop5"), Transform::IDENTITY);
    assert_ne!(local("prop4").rotation, Transform::IDENTITY.rotation);
}
