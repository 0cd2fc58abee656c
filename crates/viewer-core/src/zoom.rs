//! Zoom, rotation and page-number arithmetic for the viewer commands.

/// Applies one zoom step and clamps to `[min, max]`. The result is rounded to
/// two decimals so repeated steps do not accumulate float drift.
pub fn step_zoom(scale: f32, step: f32, min: f32, max: f32) -> f32 {
    let next = ((scale + step) * 100.0).round() / 100.0;
    clamp_zoom(next, min, max)
}

/// Clamps `scale` to `[min, max]`. NaN maps to `min`, and an inverted range
/// collapses to `max`.
pub fn clamp_zoom(scale: f32, min: f32, max: f32) -> f32 {
    if scale.is_nan() {
        return min.min(max);
    }
    scale.max(min).min(max)
}

/// Normalizes any multiple of 90 degrees into `0..360`.
pub fn normalize_rotation(degrees: i32) -> u16 {
    let snapped = (degrees as f32 / 90.0).round() as i32 * 90;
    snapped.rem_euclid(360) as u16
}

pub fn rotate_by(rotation: u16, delta: i32) -> u16 {
    normalize_rotation(rotation as i32 + delta)
}

/// Clamps a requested 1-based page number into `[1, page_count]`. Returns
/// `None` when there are no pages.
pub fn clamp_page(requested: i64, page_count: u32) -> Option<u32> {
    if page_count == 0 {
        return None;
    }

    Some(requested.clamp(1, page_count as i64) as u32)
}

/// Swaps width and height for quarter-turn rotations.
pub fn rotated_size(width: f32, height: f32, rotation: u16) -> (f32, f32) {
    if rotation % 180 == 90 {
        (height, width)
    } else {
        (width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_in_stops_at_max() {
        let mut scale = 1.0;
        for _ in 0..20 {
            scale = step_zoom(scale, 0.2, 0.5, 3.0);
        }
        assert_eq!(scale, 3.0);
    }

    #[test]
    fn zoom_out_stops_at_min() {
        let mut scale = 1.0;
        for _ in 0..20 {
            scale = step_zoom(scale, -0.2, 0.5, 3.0);
        }
        assert_eq!(scale, 0.5);
    }

    #[test]
    fn zoom_steps_do_not_drift() {
        let scale = (0..5).fold(1.0, |s, _| step_zoom(s, 0.2, 0.5, 3.0));
        assert_eq!(scale, 2.0);
    }

    #[test]
    fn inverted_range_collapses_instead_of_panicking() {
        assert_eq!(clamp_zoom(1.0, 4.0, 3.0), 3.0);
        assert_eq!(step_zoom(1.0, 0.2, 4.0, 3.0), 3.0);
        assert_eq!(clamp_zoom(f32::NAN, 4.0, 3.0), 3.0);
    }

    #[test]
    fn nan_zoom_falls_back_to_min() {
        assert_eq!(clamp_zoom(f32::NAN, 0.5, 3.0), 0.5);
        assert_eq!(clamp_zoom(9.0, 0.5, 3.0), 3.0);
    }

    #[test]
    fn rotation_wraps_in_both_directions() {
        assert_eq!(rotate_by(0, -90), 270);
        assert_eq!(rotate_by(270, 90), 0);
        assert_eq!(rotate_by(180, 90), 270);
        assert_eq!(normalize_rotation(-450), 270);
        assert_eq!(normalize_rotation(720), 0);
    }

    #[test]
    fn page_is_clamped_to_document() {
        assert_eq!(clamp_page(0, 7), Some(1));
        assert_eq!(clamp_page(12, 7), Some(7));
        assert_eq!(clamp_page(-3, 7), Some(1));
        assert_eq!(clamp_page(4, 7), Some(4));
        assert_eq!(clamp_page(1, 0), None);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        assert_eq!(rotated_size(612.0, 792.0, 90), (792.0, 612.0));
        assert_eq!(rotated_size(612.0, 792.0, 180), (612.0, 792.0));
    }
}
