use crate::types::DetectedHand;

pub const NUM_LANDMARKS: usize = 21;
pub const HAND_SLOTS: usize = 2;
pub const HAND_KEYPOINTS: usize = NUM_LANDMARKS * 3;
pub const KEYPOINT_LEN: usize = HAND_SLOTS * HAND_KEYPOINTS;

/// Translation and scale invariant feature vector for a static pose.
///
/// Every point is expressed relative to the first one (the wrist), the pairs
/// are flattened in landmark order, and the whole vector is divided by its
/// largest absolute component. A degenerate input where every component is
/// zero after translation yields all zeros.
pub fn normalize_landmarks(points: &[[f32; 2]]) -> Vec<f32> {
    let Some(&[base_x, base_y]) = points.first() else {
        return Vec::new();
    };

    let relative: Vec<f32> = points
        .iter()
        .flat_map(|&[x, y]| [x - base_x, y - base_y])
        .collect();

    let max_value = relative.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()));
    if max_value == 0.0 {
        return vec![0.0; relative.len()];
    }

    relative.into_iter().map(|v| v / max_value).collect()
}

/// Projects normalized landmarks onto integer pixel positions, clamped to
/// the last row and column.
pub fn pixel_landmarks(points: &[[f32; 3]], width: u32, height: u32) -> Vec<[f32; 2]> {
    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;
    points
        .iter()
        .map(|&[x, y, _z]| {
            [
                (x * width as f32).trunc().min(max_x),
                (y * height as f32).trunc().min(max_y),
            ]
        })
        .collect()
}

/// Projects normalized landmarks to sub-pixel positions for drawing.
pub fn overlay_points(points: &[[f32; 3]], width: u32, height: u32) -> Vec<(f32, f32)> {
    points
        .iter()
        .map(|&[x, y, _z]| (x * width as f32, y * height as f32))
        .collect()
}

/// Keypoints for up to two hands laid out as `[hand0 | hand1]`, each slot
/// holding x, y, z for 21 landmarks. Missing hands leave their slot zeroed.
pub fn keypoint_vector(hands: &[DetectedHand]) -> Vec<f32> {
    let mut keypoints = vec![0.0_f32; KEYPOINT_LEN];
    for (slot, hand) in hands.iter().take(HAND_SLOTS).enumerate() {
        let offset = slot * HAND_KEYPOINTS;
        for (idx, point) in hand.points.iter().take(NUM_LANDMARKS).enumerate() {
            let at = offset + idx * 3;
            keypoints[at..at + 3].copy_from_slice(point);
        }
    }
    keypoints
}
