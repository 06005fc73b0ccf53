//! Keyframe sampling: lerp for vectors, shortest-path slerp for rotations

use crate::clip::{AnimationTrack, Interpolation, TrackProperty};
use cadence_core::{Transform, Vec3};

/// Sample a track at `time`, clamped to its first and last keyframes.
///
/// Returns 3 floats for translation/scale tracks and 4 for rotation tracks.
pub fn sample_track(track: &AnimationTrack, time: f64) -> Vec<f32> {
    let keyframes = &track.keyframes;
    let Some(first) = keyframes.first() else {
        return identity_value(track.property);
    };
    if time <= first.time {
        return first.value.clone();
    }
    let last = &keyframes[keyframes.len() - 1];
    if time >= last.time {
        return last.value.clone();
    }

    let idx = match keyframes.binary_search_by(|kf| kf.time.total_cmp(&time)) {
        Ok(i) => return keyframes[i].value.clone(),
        Err(i) => i,
    };
    let prev = &keyframes[idx - 1];
    let next = &keyframes[idx];

    let span = next.time - prev.time;
    if span <= 0.0 || track.interpolation == Interpolation::Step {
        return prev.value.clone();
    }
    let t = ((time - prev.time) / span) as f32;

    match track.property {
        TrackProperty::Rotation => quat_slerp(&prev.value, &next.value, t),
        TrackProperty::Translation | TrackProperty::Scale => lerp_vec(&prev.value, &next.value, t),
    }
}

/// Write a sampled value into the matching field of `transform`
pub fn apply_sample(transform: &mut Transform, property: TrackProperty, value: &[f32]) {
    match (property, value) {
        (TrackProperty::Translation, [x, y, z, ..]) => transform.position = Vec3::new(*x, *y, *z),
        (TrackProperty::Scale, [x, y, z, ..]) => transform.scale = Vec3::new(*x, *y, *z),
        (TrackProperty::Rotation, [x, y, z, w, ..]) => transform.rotation = [*x, *y, *z, *w],
        _ => {}
    }
}

fn identity_value(property: TrackProperty) -> Vec<f32> {
    match property {
        TrackProperty::Translation => vec![0.0; 3],
        TrackProperty::Scale => vec![1.0; 3],
        TrackProperty::Rotation => vec![0.0, 0.0, 0.0, 1.0],
    }
}

fn lerp_vec(a: &[f32], b: &[f32], t: f32) -> Vec<f32> {
    a.iter().zip(b).map(|(a, b)| a + (b - a) * t).collect()
}

/// Quaternion slerp (xyzw) taking the shorter arc. The result is normalized.
pub fn quat_slerp(a: &[f32], b: &[f32], t: f32) -> Vec<f32> {
    let (&[ax, ay, az, aw, ..], &[bx, by, bz, bw, ..]) = (a, b) else {
        return vec![0.0, 0.0, 0.0, 1.0];
    };

    let mut dot = ax * bx + ay * by + az * bz + aw * bw;
    let sign = if dot < 0.0 {
        dot = -dot;
        -1.0
    } else {
        1.0
    };

    // Nearly parallel: plain lerp avoids dividing by sin(~0)
    let (scale_a, scale_b) = if dot > 0.9995 {
        (1.0 - t, t * sign)
    } else {
        let theta = dot.acos();
        let sin_theta = theta.sin();
        (
            ((1.0 - t) * theta).sin() / sin_theta,
            (t * theta).sin() / sin_theta * sign,
        )
    };

    let r = [
        scale_a * ax + scale_b * bx,
        scale_a * ay + scale_b * by,
        scale_a * az + scale_b * bz,
        scale_a * aw + scale_b * bw,
    ];
    let len = r.iter().map(|c| c * c).sum::<f32>().sqrt();
    if len < 1e-10 {
        return vec![0.0, 0.0, 0.0, 1.0];
    }
    r.iter().map(|c| c / len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{Keyframe, TrackTarget};

    fn track(property: TrackProperty, interpolation: Interpolation, keys: &[(f64, &[f32])]) -> AnimationTrack {
        AnimationTrack {
            target: TrackTarget::Node,
            property,
            interpolation,
            keyframes: keys
                .iter()
                .map(|(time, value)| Keyframe {
                    time: *time,
                    value: value.to_vec(),
                })
                .collect(),
        }
    }

    fn length(q: &[f32]) -> f32 {
        q.iter().map(|c| c * c).sum::<f32>().sqrt()
    }

    #[test]
    fn test_linear_translation_midpoint() {
        let t = track(
            TrackProperty::Translation,
            Interpolation::Linear,
            &[(0.0, &[0.0, 0.0, 0.0]), (2.0, &[4.0, 6.0, 8.0])],
        );
        let v = sample_track(&t, 1.0);
        assert!((v[0] - 2.0).abs() < 1e-4);
        assert!((v[1] - 3.0).abs() < 1e-4);
        assert!((v[2] - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_clamps_outside_keyframes() {
        let t = track(
            TrackProperty::Scale,
            Interpolation::Linear,
            &[(1.0, &[1.0, 1.0, 1.0]), (2.0, &[3.0, 3.0, 3.0])],
        );
        assert_eq!(sample_track(&t, 0.0), vec![1.0, 1.0, 1.0]);
        assert_eq!(sample_track(&t, 5.0), vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_step_holds_previous_value() {
        let t = track(
            TrackProperty::Translation,
            Interpolation::Step,
            &[(0.0, &[1.0, 2.0, 3.0]), (1.0, &[4.0, 5.0, 6.0])],
        );
        assert_eq!(sample_track(&t, 0.5), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_slerp_hits_endpoints() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let b = [0.0, 0.7071, 0.0, 0.7071];
        let r0 = quat_slerp(&a, &b, 0.0);
        let r1 = quat_slerp(&a, &b, 1.0);
        for i in 0..4 {
            assert!((r0[i] - a[i]).abs() < 1e-3);
            assert!((r1[i] - b[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_slerp_takes_shortest_path() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let neg_a = [0.0, 0.0, 0.0, -1.0];
        let r = quat_slerp(&a, &neg_a, 0.5);
        assert!((length(&r) - 1.0).abs() < 1e-5);
        assert!((r[3].abs() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_rotation_track_stays_normalized() {
        let t = track(
            TrackProperty::Rotation,
            Interpolation::Linear,
            &[(0.0, &[0.0, 0.0, 0.0, 1.0]), (1.0, &[0.0, 1.0, 0.0, 0.0])],
        );
        let mid = sample_track(&t, 0.5);
        assert_eq!(mid.len(), 4);
        assert!((length(&mid) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_apply_writes_matching_field() {
        let mut transform = Transform::IDENTITY;
        apply_sample(&mut transform, TrackProperty::Translation, &[1.0, 2.0, 3.0]);
        apply_sample(&mut transform, TrackProperty::Rotation, &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(transform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.rotation, [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(transform.scale, Vec3::ONE);

        apply_sample(&mut transform, TrackProperty::Scale, &[2.0]);
        assert_eq!(transform.scale, Vec3::ONE);
    }
}
